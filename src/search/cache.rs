//! TTL result cache keyed by a fingerprint of the normalized search parameters
use crate::config::CacheConfig;
use crate::search::{AggregatedResponse, SearchRequest};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Prefix of every result entry. Bump the version when the key or payload
/// format changes so stale entries are never read back.
pub const KEY_PREFIX: &str = "search:v1:";
const STATS_KEY: &str = "cache:stats";
const POPULAR_KEY: &str = "popular:queries";
/// Floor on per-hash fields and per-set members kept by [`MemoryBackend`].
const MIN_MEMBER_LIMIT: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid key pattern: {0}")]
    Pattern(String),
}

/// Key-value store with per-key TTL, counters and pattern enumeration.
pub trait CacheBackend: Send + Sync {
    fn ping(&self) -> Result<(), CacheError>;
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;
    fn delete(&self, keys: &[String]) -> Result<usize, CacheError>;
    /// Live keys matching a glob pattern (`*` and `?`).
    fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError>;
    fn hincr(&self, hash: &str, field: &str, by: u64) -> Result<u64, CacheError>;
    fn hgetall(&self, hash: &str) -> Result<HashMap<String, u64>, CacheError>;
    fn zincr(&self, set: &str, member: &str, by: u64) -> Result<u64, CacheError>;
    /// Highest scored members, best first.
    fn ztop(&self, set: &str, limit: usize) -> Result<Vec<(String, u64)>, CacheError>;
}

pub fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| CacheError::Pattern(e.to_string()))
}

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process backend. Entries are bounded by an LRU and expire passively:
/// an expired entry is dropped the next time it is touched.
///
/// Hashes and sorted sets hold at most `member_limit` fields each. Going over
/// the limit keeps the higher-scored half.
pub struct MemoryBackend {
    entries: Mutex<LruCache<String, StoredValue>>,
    hashes: Mutex<HashMap<String, HashMap<String, u64>>>,
    sorted_sets: Mutex<HashMap<String, HashMap<String, u64>>>,
    member_limit: usize,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        Self::with_member_limit(capacity, capacity.max(MIN_MEMBER_LIMIT))
    }

    pub fn with_member_limit(capacity: usize, member_limit: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hashes: Mutex::new(HashMap::new()),
            sorted_sets: Mutex::new(HashMap::new()),
            member_limit: member_limit.max(1),
        }
    }
}

fn increment(scores: &mut HashMap<String, u64>, member: &str, by: u64, limit: usize) -> u64 {
    let score = scores.entry(member.to_string()).or_insert(0);
    *score = score.saturating_add(by);
    let score = *score;

    if scores.len() > limit {
        let mut ranked: Vec<(String, u64)> = scores.drain().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate((limit / 2).max(1));
        scores.extend(ranked);
    }
    score
}

impl CacheBackend for MemoryBackend {
    fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(key) {
            Some(stored) if !stored.is_expired() => return Ok(Some(stored.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().put(
            key.to_string(),
            StoredValue {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|key| entries.pop(key))
            .filter(|stored| !stored.is_expired())
            .count())
    }

    fn keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, stored)| stored.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        Ok(entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| matcher.is_match(key))
            .cloned()
            .collect())
    }

    fn hincr(&self, hash: &str, field: &str, by: u64) -> Result<u64, CacheError> {
        let mut hashes = self.hashes.lock();
        let fields = hashes.entry(hash.to_string()).or_default();
        Ok(increment(fields, field, by, self.member_limit))
    }

    fn hgetall(&self, hash: &str) -> Result<HashMap<String, u64>, CacheError> {
        Ok(self.hashes.lock().get(hash).cloned().unwrap_or_default())
    }

    fn zincr(&self, set: &str, member: &str, by: u64) -> Result<u64, CacheError> {
        let mut sets = self.sorted_sets.lock();
        let scores = sets.entry(set.to_string()).or_default();
        Ok(increment(scores, member, by, self.member_limit))
    }

    fn ztop(&self, set: &str, limit: usize) -> Result<Vec<(String, u64)>, CacheError> {
        let sets = self.sorted_sets.lock();
        let mut members: Vec<(String, u64)> = sets
            .get(set)
            .map(|scores| scores.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        members.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        members.truncate(limit);
        Ok(members)
    }
}

/// Derive the cache key for a query against a resolved engine set.
///
/// The query and category names are trimmed and lower-cased and both name
/// lists are sorted, so requests differing only in case or ordering share a
/// key.
pub fn cache_key(query: &str, engines: &[String], categories: Option<&[String]>) -> String {
    fn joined(names: Option<&[String]>) -> String {
        match names {
            Some(names) if !names.is_empty() => {
                let mut sorted = names.to_vec();
                sorted.sort();
                sorted.join(",")
            }
            _ => "all".to_string(),
        }
    }

    let categories: Option<Vec<String>> = categories
        .map(|names| names.iter().map(|name| name.trim().to_lowercase()).collect());
    let composite = format!(
        "query:{}|engines:{}|categories:{}",
        query.trim().to_lowercase(),
        joined(Some(engines)),
        joined(categories.as_deref())
    );
    let digest = sha256::digest(composite.as_str());
    format!("{KEY_PREFIX}{}", &digest[..16])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedEntry {
    cache_key: String,
    cached_at: DateTime<Utc>,
    cache_ttl: u64,
    payload: AggregatedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCount {
    pub query: String,
    pub count: u64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub status: String,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub hit_rate: f64,
    pub entry_count: usize,
    pub top_queries: Vec<QueryCount>,
}

impl CacheStats {
    fn disabled() -> Self {
        Self {
            status: "disabled".to_string(),
            hits: 0,
            misses: 0,
            sets: 0,
            hit_rate: 0.0,
            entry_count: 0,
            top_queries: Vec::new(),
        }
    }
}

/// Search result cache.
///
/// Backend failures are logged and otherwise ignored: a failing read is a
/// miss and a failing write is a no-op, so callers never see cache errors.
pub struct SearchCache {
    backend: Option<Arc<dyn CacheBackend>>,
    config: CacheConfig,
}

impl SearchCache {
    /// Wrap `backend`, falling back to pass-through mode when it does not
    /// answer a ping.
    pub fn new(backend: Arc<dyn CacheBackend>, config: CacheConfig) -> Self {
        let backend = match backend.ping() {
            Ok(()) => Some(backend),
            Err(e) => {
                log::error!("Result cache disabled: {}", e);
                None
            }
        };
        Self { backend, config }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(Arc::new(MemoryBackend::new(config.capacity)), config)
    }

    pub fn disabled() -> Self {
        Self {
            backend: None,
            config: CacheConfig::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        if config.enabled {
            Self::in_memory(config.clone())
        } else {
            Self::disabled()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    fn record<T>(&self, op: &str, result: Result<T, CacheError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                log::error!("Cache {} error: {}", op, e);
                None
            }
        }
    }

    /// Look up a previously stored response for `request` against `engines`.
    pub fn get(&self, request: &SearchRequest, engines: &[String]) -> Option<AggregatedResponse> {
        let backend = self.backend.as_ref()?;
        let key = cache_key(request.query(), engines, request.categories());

        let cached = self.record("get", backend.get(&key)).flatten().and_then(|raw| {
            match serde_json::from_str::<CachedEntry>(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    log::warn!("Discarding unreadable cache entry {}: {}", key, e);
                    None
                }
            }
        });

        match cached {
            Some(entry) => {
                log::info!("Cache hit for query: {}", request.query());
                self.record("stats", backend.hincr(STATS_KEY, "hits", 1));
                let mut payload = entry.payload;
                payload.cached = true;
                Some(payload)
            }
            None => {
                self.record("stats", backend.hincr(STATS_KEY, "misses", 1));
                None
            }
        }
    }

    pub fn set(
        &self,
        request: &SearchRequest,
        engines: &[String],
        response: &AggregatedResponse,
    ) -> bool {
        self.set_with_ttl(request, engines, response, self.config.ttl())
    }

    /// Store `response`, capping its merged result list at the configured
    /// maximum and flagging it as truncated when the cap applies.
    pub fn set_with_ttl(
        &self,
        request: &SearchRequest,
        engines: &[String],
        response: &AggregatedResponse,
        ttl: Duration,
    ) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        let key = cache_key(request.query(), engines, request.categories());

        let mut payload = response.clone();
        payload.cached = false;
        if payload.results.len() > self.config.max_results {
            payload.results.truncate(self.config.max_results);
            payload.truncated = true;
        }

        let entry = CachedEntry {
            cache_key: key.clone(),
            cached_at: Utc::now(),
            cache_ttl: ttl.as_secs(),
            payload,
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(raw) => raw,
            Err(e) => {
                log::error!("Cache set error: {}", e);
                return false;
            }
        };

        if self.record("set", backend.set_ex(&key, raw, ttl)).is_none() {
            return false;
        }
        self.record("stats", backend.hincr(STATS_KEY, "sets", 1));
        self.record("stats", backend.zincr(POPULAR_KEY, request.query(), 1));
        log::info!(
            "Cached results for query: {} (TTL: {}s)",
            request.query(),
            ttl.as_secs()
        );
        true
    }

    /// Remove entries matching `pattern`, or every result entry when no
    /// pattern is given. Returns how many live entries were removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let Some(backend) = self.backend.as_ref() else {
            return 0;
        };
        let default_pattern = format!("{KEY_PREFIX}*");
        let pattern = pattern.unwrap_or(default_pattern.as_str());
        let keys = self.record("invalidate", backend.keys(pattern)).unwrap_or_default();
        if keys.is_empty() {
            return 0;
        }
        self.record("invalidate", backend.delete(&keys)).unwrap_or(0)
    }

    pub fn stats(&self) -> CacheStats {
        let Some(backend) = self.backend.as_ref() else {
            return CacheStats::disabled();
        };

        let counters = self.record("stats", backend.hgetall(STATS_KEY)).unwrap_or_default();
        let hits = counters.get("hits").copied().unwrap_or(0);
        let misses = counters.get("misses").copied().unwrap_or(0);
        let sets = counters.get("sets").copied().unwrap_or(0);
        let lookups = hits + misses;
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        };

        let entry_count = self
            .record("stats", backend.keys(&format!("{KEY_PREFIX}*")))
            .map(|keys| keys.len())
            .unwrap_or(0);
        let top_queries = self
            .record("stats", backend.ztop(POPULAR_KEY, self.config.top_queries))
            .unwrap_or_default()
            .into_iter()
            .map(|(query, count)| QueryCount { query, count })
            .collect();

        CacheStats {
            status: "connected".to_string(),
            hits,
            misses,
            sets,
            hit_rate,
            entry_count,
            top_queries,
        }
    }
}
