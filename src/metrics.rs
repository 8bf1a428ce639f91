use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub searches: IntCounter,
    pub cache_hits: IntCounter,
    pub cache_misses: IntCounter,
    pub engine_requests: IntCounterVec,
    registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let searches =
            IntCounter::with_opts(Opts::new("searches_total", "Number of searches dispatched"))
                .unwrap();
        let cache_hits =
            IntCounter::with_opts(Opts::new("cache_hits_total", "Number of result cache hits"))
                .unwrap();
        let cache_misses = IntCounter::with_opts(Opts::new(
            "cache_misses_total",
            "Number of result cache misses",
        ))
        .unwrap();
        let engine_requests = IntCounterVec::new(
            Opts::new(
                "engine_requests_total",
                "Number of adapter pipelines run, by engine and outcome",
            ),
            &["engine", "status"],
        )
        .unwrap();

        registry.register(Box::new(searches.clone())).ok();
        registry.register(Box::new(cache_hits.clone())).ok();
        registry.register(Box::new(cache_misses.clone())).ok();
        registry.register(Box::new(engine_requests.clone())).ok();

        Metrics {
            searches,
            cache_hits,
            cache_misses,
            engine_requests,
            registry: Arc::new(registry),
        }
    }

    pub fn record_engine(&self, engine: &str, status: &str) {
        self.engine_requests
            .with_label_values(&[engine, status])
            .inc();
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
