pub mod cli;
pub mod config;
pub mod engines;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod search;
pub mod service;
pub mod walker;

pub use crate::error::{BridgeError, Result};
pub use clap::Parser;
pub use cli::{Cli, Commands};
pub use config::Config;
pub use engines::{Engine, EngineDescriptor, EngineMetadata};
pub use protocol::{RpcError, RpcRequest, RpcResponse, RpcServer};
pub use registry::Registry;
pub use search::{AggregatedResponse, SearchCache, SearchEngine, SearchRequest, SearchResult};
pub use service::EngineService;

use crate::engines::MusicBrainz;
use crate::metrics::Metrics;
use crate::search::{Fetcher, HttpFetcher};
use std::sync::Arc;

/// Build the registry described by `config`: descriptor engines from the
/// engines directory, then the builtins, then the configured disabled list.
pub fn build_registry(config: &Config) -> Result<Registry> {
    let mut registry = Registry::new();
    if config.engines.dir.is_dir() {
        registry.load_dir(&config.engines.dir, &config.upstream)?;
    } else {
        log::warn!(
            "Engines directory {:?} not found, no descriptor engines loaded",
            config.engines.dir
        );
    }

    if config.engines.builtin {
        if let Err(e) = registry.register(Arc::new(MusicBrainz::new())) {
            log::warn!("Builtin engine not registered: {}", e);
        }
    }

    for name in &config.engines.disabled {
        if let Err(e) = registry.disable(name) {
            log::warn!("Cannot disable engine from config: {}", e);
        }
    }
    Ok(registry)
}

/// Wire registry, cache, fetcher and metrics into a dispatch engine.
pub fn build_engine(config: &Config, fetcher: Option<Arc<dyn Fetcher>>) -> Result<SearchEngine> {
    let registry = build_registry(config)?;
    let fetcher = match fetcher {
        Some(fetcher) => fetcher,
        None => Arc::new(HttpFetcher::new(&config.upstream)?),
    };
    Ok(SearchEngine::new(
        Arc::new(registry),
        Arc::new(SearchCache::from_config(&config.cache)),
        fetcher,
        Arc::new(Metrics::new()),
        &config.dispatch,
    ))
}
