//! Search data model, result cache, upstream fetching and the dispatch engine
pub mod cache;
pub mod engine;
pub mod fetch;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use cache::{CacheStats, SearchCache};
pub use engine::SearchEngine;
pub use fetch::{Fetcher, HttpFetcher};

/// Domain errors surfaced to callers. Adapter failures never appear here,
/// they are reported per engine in [`AggregatedResponse::per_engine_status`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Engine '{0}' not found")]
    EngineNotFound(String),

    #[error("Engine '{0}' is disabled")]
    EngineDisabled(String),

    #[error("Query must not be empty")]
    EmptyQuery,

    #[error("Page must be at least 1, got {0}")]
    InvalidPage(u32),
}

/// One logical search as issued by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    query: String,
    engines: Option<Vec<String>>,
    categories: Option<Vec<String>>,
    page: u32,
    language: String,
    time_range: Option<String>,
    safe_search: u8,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Result<Self, DispatchError> {
        let query = query.into();
        if query.trim().is_empty() {
            return Err(DispatchError::EmptyQuery);
        }
        Ok(Self {
            query,
            engines: None,
            categories: None,
            page: 1,
            language: "all".to_string(),
            time_range: None,
            safe_search: 0,
        })
    }

    pub fn with_engines<I, S>(mut self, engines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engines: Vec<String> = engines.into_iter().map(Into::into).collect();
        self.engines = if engines.is_empty() { None } else { Some(engines) };
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let categories: Vec<String> = categories.into_iter().map(Into::into).collect();
        self.categories = if categories.is_empty() {
            None
        } else {
            Some(categories)
        };
        self
    }

    pub fn with_page(mut self, page: u32) -> Result<Self, DispatchError> {
        if page < 1 {
            return Err(DispatchError::InvalidPage(page));
        }
        self.page = page;
        Ok(self)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_time_range(mut self, time_range: Option<String>) -> Self {
        self.time_range = time_range.filter(|t| !t.is_empty());
        self
    }

    pub fn with_safe_search(mut self, safe_search: u8) -> Self {
        self.safe_search = safe_search;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn engines(&self) -> Option<&[String]> {
        self.engines.as_deref()
    }

    pub fn categories(&self) -> Option<&[String]> {
        self.categories.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn time_range(&self) -> Option<&str> {
        self.time_range.as_deref()
    }

    pub fn safe_search(&self) -> u8 {
        self.safe_search
    }
}

/// A single hit in the uniform result shape. `engine` is stamped by the
/// dispatch engine after parsing; adapters leave it empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub engine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    Success,
    Error,
    Timeout,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Success => "success",
            EngineStatus::Error => "error",
            EngineStatus::Timeout => "timeout",
        }
    }
}

/// Outcome of one adapter pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineReport {
    pub status: EngineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub results_by_engine: BTreeMap<String, Vec<SearchResult>>,
    pub total_count: usize,
    pub engine_count: usize,
    pub per_engine_status: BTreeMap<String, EngineReport>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl AggregatedResponse {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            results: Vec::new(),
            results_by_engine: BTreeMap::new(),
            total_count: 0,
            engine_count: 0,
            per_engine_status: BTreeMap::new(),
            truncated: false,
            cached: false,
            elapsed_ms: 0,
        }
    }

    pub fn any_success(&self) -> bool {
        self.per_engine_status
            .values()
            .any(|report| report.status == EngineStatus::Success)
    }
}

/// Results and status of a search restricted to one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSearch {
    pub engine: String,
    pub query: String,
    pub results: Vec<SearchResult>,
    pub report: EngineReport,
    #[serde(default)]
    pub cached: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_rejects_blank_query() {
        assert_eq!(SearchRequest::new("   "), Err(DispatchError::EmptyQuery));
    }

    #[test]
    fn request_rejects_page_zero() {
        let request = SearchRequest::new("rock").unwrap();
        assert_eq!(request.with_page(0), Err(DispatchError::InvalidPage(0)));
    }

    #[test]
    fn empty_engine_list_means_unspecified() {
        let request = SearchRequest::new("rock")
            .unwrap()
            .with_engines(Vec::<String>::new());
        assert!(request.engines().is_none());
    }

    #[test]
    fn result_serializes_camel_case_and_skips_missing_extras() {
        let mut result = SearchResult::new("https://example.org", "Example");
        result.published_date = Some("2024-01-01".to_string());
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["publishedDate"], "2024-01-01");
        assert!(value.get("artist").is_none());
    }
}
