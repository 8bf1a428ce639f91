//! Adapters described by data files instead of code.
//!
//! A descriptor names the engine, declares its metadata and gives two
//! sections: `request` (how to build the outbound call) and `response` (how
//! to map the payload onto results). Descriptors missing either section do
//! not satisfy the adapter contract and are rejected.
//!
//! ```toml
//! name = "bandcamp"
//! categories = ["music"]
//! paging = true
//!
//! [about]
//! website = "https://bandcamp.com"
//!
//! [request]
//! url = "https://bandcamp.com/api/search"
//! params = { q = "{query}", page = "{pageno}" }
//!
//! [response]
//! results_path = "results"
//! fields = { content = "description", thumbnail = "img_src" }
//! ```
//!
//! Without a `request.url` the engine is routed through the upstream search
//! backend, asking it for this engine by name.
use crate::config::UpstreamConfig;
use crate::engines::parse::{self, HtmlRules};
use crate::engines::{
    Engine, EngineError, EngineMetadata, HttpMethod, OutboundRequest, RawResponse,
};
use crate::search::{SearchRequest, SearchResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecError {
    #[error("unsupported descriptor format '{0}'")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Syntax(String),

    #[error("missing [request] section")]
    MissingRequest,

    #[error("missing [response] section")]
    MissingResponse,

    #[error("invalid engine name '{0}'")]
    InvalidName(String),

    #[error("invalid HTML pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn default_categories() -> Vec<String> {
    vec!["general".to_string()]
}

/// On-disk engine descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default)]
    pub paging: bool,
    #[serde(default)]
    pub time_range_support: bool,
    #[serde(default)]
    pub about: BTreeMap<String, Value>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub request: Option<RequestSpec>,
    #[serde(default)]
    pub response: Option<ResponseSpec>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestSpec {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseSpec {
    #[serde(default = "default_results_path")]
    pub results_path: String,
    #[serde(default)]
    pub fields: FieldMap,
    #[serde(default)]
    pub html: Option<HtmlSpec>,
}

fn default_results_path() -> String {
    "results".to_string()
}

/// JSON paths, relative to one result item, for each result field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub url: String,
    pub title: String,
    pub content: String,
    pub artist: String,
    pub album: String,
    pub duration: String,
    pub thumbnail: String,
    pub published_date: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            url: "url".to_string(),
            title: "title".to_string(),
            content: "content".to_string(),
            artist: "artist".to_string(),
            album: "album".to_string(),
            duration: "duration".to_string(),
            thumbnail: "thumbnail".to_string(),
            published_date: "publishedDate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlSpec {
    pub item: String,
    pub link: String,
    #[serde(default)]
    pub content: Option<String>,
}

impl EngineSpec {
    /// Read a descriptor, choosing the parser from the file extension.
    pub fn from_path(path: &Path) -> Result<Self, SpecError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let content = fs::read_to_string(path)?;
        match extension.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| SpecError::Syntax(e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| SpecError::Syntax(e.to_string()))
            }
            "json" => serde_json::from_str(&content).map_err(|e| SpecError::Syntax(e.to_string())),
            other => Err(SpecError::UnsupportedFormat(other.to_string())),
        }
    }
}

pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[derive(Debug)]
pub struct DeclarativeEngine {
    name: String,
    metadata: EngineMetadata,
    request: RequestSpec,
    fields: FieldMap,
    results_path: String,
    html: HtmlRules,
    upstream: UpstreamConfig,
}

impl DeclarativeEngine {
    /// Validate `spec` against the adapter contract. `fallback_name` is used
    /// when the descriptor does not name itself.
    pub fn from_spec(
        spec: EngineSpec,
        fallback_name: &str,
        upstream: &UpstreamConfig,
    ) -> Result<Self, SpecError> {
        let name = spec
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| fallback_name.to_string());
        if !is_valid_name(&name) {
            return Err(SpecError::InvalidName(name));
        }
        let request = spec.request.ok_or(SpecError::MissingRequest)?;
        let response = spec.response.ok_or(SpecError::MissingResponse)?;
        let html = match &response.html {
            Some(html) => HtmlRules::new(&html.item, &html.link, html.content.as_deref())?,
            None => HtmlRules::searx(),
        };

        let about = spec
            .about
            .into_iter()
            .filter_map(|(key, value)| parse::scalar_text(&value).map(|v| (key, v)))
            .collect();

        Ok(Self {
            name,
            metadata: EngineMetadata {
                categories: spec.categories,
                paging: spec.paging,
                time_range_support: spec.time_range_support,
                about,
                timeout: spec.timeout_ms.map(Duration::from_millis),
            },
            request,
            fields: response.fields,
            results_path: response.results_path,
            html,
            upstream: upstream.clone(),
        })
    }

    pub fn load(path: &Path, upstream: &UpstreamConfig) -> Result<Self, SpecError> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        Self::from_spec(EngineSpec::from_path(path)?, &stem, upstream)
    }

    fn render(template: &str, request: &SearchRequest) -> String {
        template
            .replace("{query}", request.query())
            .replace("{pageno}", &request.page().to_string())
            .replace("{language}", request.language())
            .replace("{time_range}", request.time_range().unwrap_or_default())
            .replace("{safesearch}", &request.safe_search().to_string())
    }

    fn upstream_request(&self, request: &SearchRequest) -> OutboundRequest {
        let mut outbound = OutboundRequest::get(self.upstream.url.clone())
            .param("q", request.query())
            .param("format", self.upstream.format.clone())
            .param("engines", self.name.clone())
            .param("pageno", request.page().to_string())
            .param("language", request.language());
        if let Some(time_range) = request.time_range() {
            outbound = outbound.param("time_range", time_range);
        }
        outbound
            .param("safesearch", request.safe_search().to_string())
            .header("User-Agent", self.upstream.user_agent.clone())
    }

    fn map_item(&self, item: &Value) -> Option<SearchResult> {
        let url = parse::field(item, &self.fields.url)?;
        let title = parse::field(item, &self.fields.title).unwrap_or_else(|| url.clone());
        Some(SearchResult {
            url,
            title,
            content: parse::field(item, &self.fields.content).unwrap_or_default(),
            engine: String::new(),
            artist: parse::field(item, &self.fields.artist),
            album: parse::field(item, &self.fields.album),
            duration: parse::field(item, &self.fields.duration),
            thumbnail: parse::field(item, &self.fields.thumbnail),
            published_date: parse::field(item, &self.fields.published_date),
        })
    }
}

impl Engine for DeclarativeEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> &EngineMetadata {
        &self.metadata
    }

    fn build_request(&self, request: &SearchRequest) -> Result<OutboundRequest, EngineError> {
        let Some(url) = &self.request.url else {
            let mut outbound = self.upstream_request(request);
            for (key, template) in &self.request.params {
                outbound = outbound.param(key.clone(), Self::render(template, request));
            }
            return Ok(outbound);
        };

        let url = Self::render(url, request);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::Request(format!("unsupported URL '{url}'")));
        }
        let mut outbound = OutboundRequest::get(url);
        outbound.method = self.request.method;
        for (key, template) in &self.request.params {
            let value = Self::render(template, request);
            if !value.is_empty() {
                outbound = outbound.param(key.clone(), value);
            }
        }
        for (key, template) in &self.request.headers {
            outbound = outbound.header(key.clone(), Self::render(template, request));
        }
        Ok(outbound)
    }

    fn parse_response(&self, response: &RawResponse) -> Result<Vec<SearchResult>, EngineError> {
        if response.looks_like_json() {
            let document = parse::parse_json(&response.body)?;
            let items = parse::json_items(&document, &self.results_path)?;
            return Ok(items.iter().filter_map(|item| self.map_item(item)).collect());
        }

        Ok(self
            .html
            .hits(&response.body)
            .into_iter()
            .map(|hit| SearchResult::new(hit.url, hit.title).with_content(hit.content))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(toml_text: &str) -> EngineSpec {
        toml::from_str(toml_text).unwrap()
    }

    fn direct_engine() -> DeclarativeEngine {
        DeclarativeEngine::from_spec(
            spec(
                r#"
                categories = ["music"]
                paging = true
                [about]
                website = "https://bandcamp.com"
                require_api_key = false
                [request]
                url = "https://bandcamp.com/api/search"
                params = { q = "{query}", page = "{pageno}", range = "{time_range}" }
                [response]
                results_path = "data.items"
                fields = { content = "description", thumbnail = "img_src" }
                "#,
            ),
            "bandcamp",
            &UpstreamConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn name_falls_back_to_file_stem() {
        let engine = direct_engine();
        assert_eq!(engine.name(), "bandcamp");
        assert_eq!(engine.metadata().categories, vec!["music".to_string()]);
        assert_eq!(engine.metadata().about["require_api_key"], "false");
    }

    #[test]
    fn missing_sections_fail_the_contract() {
        let no_response = DeclarativeEngine::from_spec(
            spec("[request]\nurl = \"https://example.org\"\n"),
            "x",
            &UpstreamConfig::default(),
        );
        assert!(matches!(no_response, Err(SpecError::MissingResponse)));

        let no_request =
            DeclarativeEngine::from_spec(spec("[response]\n"), "x", &UpstreamConfig::default());
        assert!(matches!(no_request, Err(SpecError::MissingRequest)));
    }

    #[test]
    fn rejects_bad_names_and_patterns() {
        let bad_name = DeclarativeEngine::from_spec(
            spec("name = \"a b\"\n[request]\n[response]\n"),
            "x",
            &UpstreamConfig::default(),
        );
        assert!(matches!(bad_name, Err(SpecError::InvalidName(_))));

        let bad_pattern = DeclarativeEngine::from_spec(
            spec("[request]\n[response]\nhtml = { item = \"(\", link = \"a\" }\n"),
            "x",
            &UpstreamConfig::default(),
        );
        assert!(matches!(bad_pattern, Err(SpecError::Pattern(_))));
    }

    #[test]
    fn direct_request_renders_templates_and_drops_empty_params() {
        let request = SearchRequest::new("black metal")
            .unwrap()
            .with_page(2)
            .unwrap();
        let outbound = direct_engine().build_request(&request).unwrap();

        assert_eq!(outbound.url, "https://bandcamp.com/api/search");
        assert_eq!(
            outbound.query,
            vec![
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "black metal".to_string()),
            ]
        );
    }

    #[test]
    fn upstream_request_names_the_engine() {
        let engine = DeclarativeEngine::from_spec(
            spec("[request]\n[response]\n"),
            "discogs",
            &UpstreamConfig::default(),
        )
        .unwrap();
        let request = SearchRequest::new("jazz")
            .unwrap()
            .with_time_range(Some("month".to_string()));
        let outbound = engine.build_request(&request).unwrap();

        assert_eq!(outbound.url, "http://localhost:8888/search");
        assert!(outbound.query.contains(&("engines".to_string(), "discogs".to_string())));
        assert!(outbound.query.contains(&("format".to_string(), "json".to_string())));
        assert!(outbound.query.contains(&("time_range".to_string(), "month".to_string())));
        assert!(outbound.query.contains(&("pageno".to_string(), "1".to_string())));
    }

    #[test]
    fn parses_json_with_field_mapping() {
        let body = r#"{"data": {"items": [
            {"url": "https://a.example", "title": "A", "description": "first", "img_src": "https://a.example/t.jpg", "duration": 180},
            {"title": "no url, skipped"},
            {"url": "https://b.example"}
        ]}}"#;
        let results = direct_engine()
            .parse_response(&RawResponse::json(body))
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "first");
        assert_eq!(results[0].thumbnail.as_deref(), Some("https://a.example/t.jpg"));
        assert_eq!(results[0].duration.as_deref(), Some("180"));
        assert_eq!(results[1].title, "https://b.example");
        assert!(results.iter().all(|r| r.engine.is_empty()));
    }

    #[test]
    fn json_without_results_array_is_a_parse_error() {
        let err = direct_engine()
            .parse_response(&RawResponse::json("{\"data\": {}}"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn falls_back_to_html() {
        let body = r#"<article class="result"><h3><a href="https://c.example">C</a></h3>
            <p class="content">from html</p></article>"#;
        let results = direct_engine()
            .parse_response(&RawResponse::html(body))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://c.example");
        assert_eq!(results[0].content, "from html");
    }
}
