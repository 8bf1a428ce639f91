//! Core search engine: resolves target engines, consults the cache and fans
//! a query out to every target adapter in parallel.
use crate::config::DispatchConfig;
use crate::engines::{Engine, EngineError};
use crate::metrics::Metrics;
use crate::registry::Registry;
use crate::search::cache::SearchCache;
use crate::search::fetch::{FetchError, Fetcher};
use crate::search::{
    AggregatedResponse, DispatchError, EngineReport, EngineSearch, EngineStatus, SearchRequest,
    SearchResult,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
enum PipelineError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Results and report of one adapter pipeline.
#[derive(Debug, Clone)]
struct EngineRun {
    results: Vec<SearchResult>,
    report: EngineReport,
}

impl EngineRun {
    fn failed(status: EngineStatus, error: String, elapsed: Duration) -> Self {
        Self {
            results: Vec::new(),
            report: EngineReport {
                status,
                error: Some(error),
                elapsed_ms: elapsed.as_millis() as u64,
                count: 0,
            },
        }
    }
}

async fn pipeline(
    engine: &dyn Engine,
    fetcher: &dyn Fetcher,
    request: &SearchRequest,
) -> Result<Vec<SearchResult>, PipelineError> {
    let outbound = engine.build_request(request)?;
    let raw = fetcher.fetch(&outbound).await?;
    if !raw.is_success() {
        return Err(FetchError::Status { status: raw.status }.into());
    }
    Ok(engine.parse_response(&raw)?)
}

/// Build, fetch and parse for one adapter under its own hard timeout, then
/// stamp every result with the adapter's name.
async fn run_engine(
    engine: Arc<dyn Engine>,
    fetcher: Arc<dyn Fetcher>,
    request: SearchRequest,
    timeout: Duration,
) -> EngineRun {
    let started = Instant::now();
    let outcome = tokio::time::timeout(
        timeout,
        pipeline(engine.as_ref(), fetcher.as_ref(), &request),
    )
    .await;
    let elapsed = started.elapsed();
    let name = engine.name();

    match outcome {
        Ok(Ok(mut results)) => {
            for result in &mut results {
                result.engine = name.to_string();
            }
            log::debug!(
                "Engine '{}' returned {} results in {:?}",
                name,
                results.len(),
                elapsed
            );
            EngineRun {
                report: EngineReport {
                    status: EngineStatus::Success,
                    error: None,
                    elapsed_ms: elapsed.as_millis() as u64,
                    count: results.len(),
                },
                results,
            }
        }
        Ok(Err(e)) => {
            log::warn!("Engine '{}' failed: {}", name, e);
            EngineRun::failed(EngineStatus::Error, e.to_string(), elapsed)
        }
        Err(_) => {
            log::warn!("Engine '{}' timed out after {:?}", name, timeout);
            EngineRun::failed(
                EngineStatus::Timeout,
                format!("timed out after {}ms", timeout.as_millis()),
                elapsed,
            )
        }
    }
}

/// Main search engine that coordinates registry, cache and adapters
pub struct SearchEngine {
    registry: Arc<Registry>,
    cache: Arc<SearchCache>,
    fetcher: Arc<dyn Fetcher>,
    metrics: Arc<Metrics>,
    config: DispatchConfig,
}

impl SearchEngine {
    pub fn new(
        registry: Arc<Registry>,
        cache: Arc<SearchCache>,
        fetcher: Arc<dyn Fetcher>,
        metrics: Arc<Metrics>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            registry,
            cache,
            fetcher,
            metrics,
            config: config.clone(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Target engines for `request`, in the order their results are merged.
    ///
    /// An explicit engine list is filtered to registered, enabled names; no
    /// list means every enabled engine. A category filter then keeps engines
    /// declaring at least one of the requested categories.
    pub fn resolve(&self, request: &SearchRequest) -> Vec<Arc<dyn Engine>> {
        let mut engines: Vec<Arc<dyn Engine>> = match request.engines() {
            Some(names) => {
                let mut seen = Vec::new();
                names
                    .iter()
                    .filter(|name| {
                        if seen.contains(name) {
                            return false;
                        }
                        seen.push(*name);
                        true
                    })
                    .filter(|name| self.registry.is_enabled(name) == Some(true))
                    .filter_map(|name| self.registry.engine(name))
                    .collect()
            }
            None => self.registry.enabled_engines(),
        };

        if let Some(categories) = request.categories() {
            engines.retain(|engine| engine.metadata().supports_any_category(categories));
        }
        if let Some(max) = self.config.max_engines {
            engines.truncate(max);
        }
        engines
    }

    fn timeout_for(&self, engine: &dyn Engine) -> Duration {
        engine
            .metadata()
            .timeout
            .unwrap_or_else(|| self.config.timeout())
    }

    /// Run every engine concurrently and wait for all of them to settle.
    async fn fan_out(
        &self,
        request: &SearchRequest,
        engines: &[Arc<dyn Engine>],
    ) -> Vec<(String, EngineRun)> {
        let started = Instant::now();
        let handles: Vec<_> = engines
            .iter()
            .map(|engine| {
                tokio::spawn(run_engine(
                    engine.clone(),
                    self.fetcher.clone(),
                    request.clone(),
                    self.timeout_for(engine.as_ref()),
                ))
            })
            .collect();

        let mut runs = Vec::with_capacity(engines.len());
        for (engine, handle) in engines.iter().zip(handles) {
            let run = match handle.await {
                Ok(run) => run,
                Err(e) => {
                    log::error!("Engine '{}' task aborted: {}", engine.name(), e);
                    EngineRun::failed(
                        EngineStatus::Error,
                        format!("adapter task aborted: {e}"),
                        started.elapsed(),
                    )
                }
            };
            self.metrics
                .record_engine(engine.name(), run.report.status.as_str());
            runs.push((engine.name().to_string(), run));
        }
        runs
    }

    fn merge(
        query: &str,
        runs: Vec<(String, EngineRun)>,
        elapsed: Duration,
    ) -> AggregatedResponse {
        let mut response = AggregatedResponse::empty(query);
        for (name, run) in runs {
            response.results.extend(run.results.iter().cloned());
            if run.report.status == EngineStatus::Success {
                response.results_by_engine.insert(name.clone(), run.results);
            }
            response.per_engine_status.insert(name, run.report);
        }
        response.total_count = response.results.len();
        response.engine_count = response.results_by_engine.len();
        response.elapsed_ms = elapsed.as_millis() as u64;
        response
    }

    fn lookup_cache(&self, request: &SearchRequest, names: &[String]) -> Option<AggregatedResponse> {
        if !self.cache.is_enabled() {
            return None;
        }
        let hit = self.cache.get(request, names);
        if hit.is_some() {
            self.metrics.cache_hits.inc();
        } else {
            self.metrics.cache_misses.inc();
        }
        hit
    }

    /// Search every resolved engine and merge the results.
    ///
    /// Never fails: adapter errors and timeouts are reported per engine in
    /// `per_engine_status` and contribute no results.
    pub async fn search(&self, request: &SearchRequest) -> AggregatedResponse {
        let started = Instant::now();
        self.metrics.searches.inc();

        let engines = self.resolve(request);
        if engines.is_empty() {
            log::info!("No engines to search for query: {}", request.query());
            return AggregatedResponse::empty(request.query());
        }
        let names: Vec<String> = engines.iter().map(|e| e.name().to_string()).collect();

        if let Some(hit) = self.lookup_cache(request, &names) {
            return hit;
        }

        let runs = self.fan_out(request, &engines).await;
        let response = Self::merge(request.query(), runs, started.elapsed());
        log::info!(
            "Query '{}' returned {} results from {} engines in {}ms",
            request.query(),
            response.total_count,
            names.len(),
            response.elapsed_ms
        );

        if response.any_success() {
            self.cache.set(request, &names, &response);
        }
        response
    }

    /// Search one named engine, bypassing the default fan-out set.
    pub async fn search_single(
        &self,
        engine_name: &str,
        request: &SearchRequest,
    ) -> Result<EngineSearch, DispatchError> {
        let engine = self
            .registry
            .engine(engine_name)
            .ok_or_else(|| DispatchError::EngineNotFound(engine_name.to_string()))?;
        if self.registry.is_enabled(engine_name) != Some(true) {
            return Err(DispatchError::EngineDisabled(engine_name.to_string()));
        }
        self.metrics.searches.inc();

        let names = vec![engine_name.to_string()];
        let cached = self.lookup_cache(request, &names);
        let (response, cached) = match cached {
            Some(hit) => (hit, true),
            None => {
                let started = Instant::now();
                let runs = self.fan_out(request, &[engine]).await;
                let response = Self::merge(request.query(), runs, started.elapsed());
                if response.any_success() {
                    self.cache.set(request, &names, &response);
                }
                (response, false)
            }
        };

        let report = response
            .per_engine_status
            .get(engine_name)
            .cloned()
            .unwrap_or(EngineReport {
                status: EngineStatus::Success,
                error: None,
                elapsed_ms: response.elapsed_ms,
                count: response.results.len(),
            });
        Ok(EngineSearch {
            engine: engine_name.to_string(),
            query: request.query().to_string(),
            results: response.results,
            report,
            cached,
        })
    }
}
