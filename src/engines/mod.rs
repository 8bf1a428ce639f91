//! Search adapters: the contract every engine implements and the adapters shipped with the bridge
pub mod declarative;
pub mod musicbrainz;
pub mod parse;

use crate::search::{SearchRequest, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub use declarative::{DeclarativeEngine, EngineSpec};
pub use musicbrainz::MusicBrainz;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to build request: {0}")]
    Request(String),

    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Trait for search adapters.
///
/// Both operations are synchronous; the network round trip between them is
/// owned by the dispatch engine.
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> &EngineMetadata;

    /// Translate a normalized search into this provider's outbound request.
    fn build_request(&self, request: &SearchRequest) -> Result<OutboundRequest, EngineError>;

    /// Parse the provider's raw payload into uniform results.
    fn parse_response(&self, response: &RawResponse) -> Result<Vec<SearchResult>, EngineError>;
}

/// Static metadata an adapter declares about itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineMetadata {
    pub categories: Vec<String>,
    pub paging: bool,
    pub time_range_support: bool,
    pub about: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl EngineMetadata {
    pub fn supports_any_category(&self, wanted: &[String]) -> bool {
        wanted
            .iter()
            .any(|category| self.categories.iter().any(|c| c.eq_ignore_ascii_case(category)))
    }
}

/// Serializable view of a registered engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineDescriptor {
    pub name: String,
    pub categories: Vec<String>,
    pub supports_paging: bool,
    pub supports_time_range: bool,
    pub about: BTreeMap<String, String>,
    pub enabled: bool,
}

impl EngineDescriptor {
    pub fn from_engine(engine: &dyn Engine, enabled: bool) -> Self {
        let metadata = engine.metadata();
        Self {
            name: engine.name().to_string(),
            categories: metadata.categories.clone(),
            supports_paging: metadata.paging,
            supports_time_range: metadata.time_range_support,
            about: metadata.about.clone(),
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// What an adapter wants fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Payload handed back to an adapter's parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            url: String::new(),
            content_type: Some("application/json".to_string()),
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            url: String::new(),
            content_type: Some("text/html".to_string()),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Guess whether the body is JSON from the content type, falling back to
    /// the first non-blank character.
    pub fn looks_like_json(&self) -> bool {
        if let Some(content_type) = &self.content_type {
            if content_type.contains("json") {
                return true;
            }
            if content_type.contains("html") {
                return false;
            }
        }
        matches!(self.body.trim_start().chars().next(), Some('{') | Some('['))
    }
}
