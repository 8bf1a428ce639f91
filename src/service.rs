//! RPC method table over the registry, dispatch engine and cache.
use crate::protocol::{parse_params, RpcError, RpcServer};
use crate::search::{SearchEngine, SearchRequest};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct EngineParams {
    engine: String,
}

fn default_page() -> u32 {
    1
}

/// Named parameters shared by `search` and `search_all`.
#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    engine: Option<String>,
    query: String,
    #[serde(default = "default_page", alias = "pageno")]
    page: u32,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, alias = "timeRange")]
    time_range: Option<String>,
    #[serde(default, alias = "safeSearch", alias = "safesearch")]
    safe_search: Option<u8>,
    #[serde(default)]
    engines: Option<Vec<String>>,
    #[serde(default)]
    categories: Option<Vec<String>>,
}

impl SearchParams {
    fn to_request(&self) -> Result<SearchRequest, RpcError> {
        let mut request = SearchRequest::new(self.query.clone())?
            .with_page(self.page)?
            .with_time_range(self.time_range.clone());
        if let Some(language) = &self.language {
            request = request.with_language(language.clone());
        }
        if let Some(level) = self.safe_search {
            request = request.with_safe_search(level);
        }
        if let Some(engines) = &self.engines {
            request = request.with_engines(engines.iter().cloned());
        }
        if let Some(categories) = &self.categories {
            request = request.with_categories(categories.iter().cloned());
        }
        Ok(request)
    }
}

#[derive(Debug, Default, Deserialize)]
struct InvalidateParams {
    #[serde(default)]
    pattern: Option<String>,
}

/// Methods exposed over the RPC loop.
pub struct EngineService {
    engine: Arc<SearchEngine>,
}

impl EngineService {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        Self { engine }
    }

    pub fn ping(&self) -> Value {
        let now = chrono::Utc::now();
        json!({
            "status": "ok",
            "timestamp": now.timestamp_millis() as f64 / 1000.0,
            "enginesCount": self.engine.registry().len(),
            "version": env!("CARGO_PKG_VERSION"),
        })
    }

    pub fn list_engines(&self) -> Result<Value, RpcError> {
        Ok(serde_json::to_value(self.engine.registry().list())?)
    }

    fn get_engine_info(&self, params: Value) -> Result<Value, RpcError> {
        let EngineParams { engine } = parse_params(params)?;
        let descriptor = self
            .engine
            .registry()
            .get(&engine)
            .ok_or(RpcError::EngineNotFound(engine))?;
        Ok(json!({ "engine": descriptor }))
    }

    fn set_enabled(&self, params: Value, enabled: bool) -> Result<Value, RpcError> {
        let EngineParams { engine } = parse_params(params)?;
        self.engine.registry().set_enabled(&engine, enabled)?;
        Ok(json!({ "engine": engine, "enabled": enabled }))
    }

    async fn search(&self, params: Value) -> Result<Value, RpcError> {
        let params: SearchParams = parse_params(params)?;
        let engine = params
            .engine
            .clone()
            .ok_or_else(|| RpcError::InvalidParams("missing field `engine`".to_string()))?;
        let request = params.to_request()?;
        let outcome = self.engine.search_single(&engine, &request).await?;
        Ok(serde_json::to_value(outcome)?)
    }

    async fn search_all(&self, params: Value) -> Result<Value, RpcError> {
        let params: SearchParams = parse_params(params)?;
        let request = params.to_request()?;
        let response = self.engine.search(&request).await;
        Ok(serde_json::to_value(response)?)
    }

    fn cache_stats(&self) -> Result<Value, RpcError> {
        Ok(serde_json::to_value(self.engine.cache().stats())?)
    }

    fn invalidate_cache(&self, params: Value) -> Result<Value, RpcError> {
        let InvalidateParams { pattern } = parse_params(params)?;
        let removed = self.engine.cache().invalidate(pattern.as_deref());
        Ok(json!({ "invalidated": removed }))
    }

    fn metrics(&self) -> Value {
        Value::String(self.engine.metrics().gather())
    }

    /// Build the RPC server with every method bound to this service.
    pub fn into_server(self) -> RpcServer {
        let service = Arc::new(self);
        let mut server = RpcServer::new();

        bind(&mut server, &service, "ping", |s, _| async move { Ok::<_, RpcError>(s.ping()) });
        bind(&mut server, &service, "list_engines", |s, _| async move {
            s.list_engines()
        });
        bind(&mut server, &service, "get_engine_info", |s, p| async move {
            s.get_engine_info(p)
        });
        bind(&mut server, &service, "enable_engine", |s, p| async move {
            s.set_enabled(p, true)
        });
        bind(&mut server, &service, "disable_engine", |s, p| async move {
            s.set_enabled(p, false)
        });
        bind(&mut server, &service, "search", |s, p| async move { s.search(p).await });
        bind(&mut server, &service, "search_all", |s, p| async move {
            s.search_all(p).await
        });
        bind(&mut server, &service, "cache_stats", |s, _| async move {
            s.cache_stats()
        });
        bind(&mut server, &service, "invalidate_cache", |s, p| async move {
            s.invalidate_cache(p)
        });
        bind(&mut server, &service, "metrics", |s, _| async move { Ok::<_, RpcError>(s.metrics()) });

        server
    }
}

fn bind<F, Fut>(server: &mut RpcServer, service: &Arc<EngineService>, method: &str, f: F)
where
    F: Fn(Arc<EngineService>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, RpcError>> + Send + 'static,
{
    let service = service.clone();
    server.register_handler(method, move |params| f(service.clone(), params));
}
