#![allow(dead_code)]

use async_trait::async_trait;
use engine_bridge::engines::{OutboundRequest, RawResponse};
use engine_bridge::protocol::{RpcId, RpcRequest, RpcResponse, RpcServer};
use engine_bridge::search::fetch::{FetchError, Fetcher};
use engine_bridge::{build_engine, Config, EngineService};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TIMEOUT_MS: u64 = 200;

/// How the fake network answers requests for one host.
#[derive(Clone, Debug)]
pub enum Route {
    Results(usize),
    Hang,
    Status(u16),
}

/// Fetcher that answers from a fixed routing table keyed by host name.
#[derive(Default)]
pub struct ScriptedFetcher {
    routes: Vec<(String, Route)>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, host: &str, route: Route) -> Self {
        self.routes.push((host.to_string(), route));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &OutboundRequest) -> Result<RawResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let route = self
            .routes
            .iter()
            .find(|(host, _)| request.url.contains(&format!("//{host}.test/")))
            .map(|(host, route)| (host.clone(), route.clone()));

        match route {
            Some((host, Route::Results(count))) => {
                let results: Vec<Value> = (0..count)
                    .map(|i| {
                        json!({
                            "url": format!("https://{host}.test/item/{i}"),
                            "title": format!("{host} result {i}"),
                            "content": "snippet",
                        })
                    })
                    .collect();
                let mut response = RawResponse::json(json!({ "results": results }).to_string());
                response.url = request.url.clone();
                Ok(response)
            }
            Some((_, Route::Hang)) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(FetchError::Transport("hung up".to_string()))
            }
            Some((_, Route::Status(status))) => Err(FetchError::Status { status }),
            None => Err(FetchError::Status { status: 404 }),
        }
    }
}

pub fn descriptor(host: &str) -> String {
    format!(
        "categories = [\"music\"]\n\n[request]\nurl = \"https://{host}.test/api\"\nparams = {{ q = \"{{query}}\" }}\n\n[response]\nresults_path = \"results\"\n"
    )
}

/// Descriptor directory with one valid engine per name plus one broken file.
pub fn engines_dir(names: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        fs::write(dir.path().join(format!("{name}.toml")), descriptor(name)).unwrap();
    }
    fs::write(dir.path().join("broken.toml"), "categories = [\"music\"\n[request").unwrap();
    dir
}

pub fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.engines.dir = dir.to_path_buf();
    config.engines.builtin = false;
    config.dispatch.timeout_ms = TIMEOUT_MS;
    config
}

pub fn server_with(config: &Config, fetcher: Arc<ScriptedFetcher>) -> RpcServer {
    let engine = build_engine(config, Some(fetcher)).unwrap();
    EngineService::new(Arc::new(engine)).into_server()
}

pub async fn call(server: &RpcServer, method: &str, params: Value) -> RpcResponse {
    server
        .dispatch(RpcRequest::new(method, params, Some(RpcId::from(7))))
        .await
        .expect("request with an id gets a response")
}

pub async fn result(server: &RpcServer, method: &str, params: Value) -> Value {
    let response = call(server, method, params).await;
    assert!(response.error.is_none(), "{method} failed: {:?}", response.error);
    response.result.unwrap()
}
