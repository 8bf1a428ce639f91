//! MusicBrainz release search over the public JSON web service
use crate::engines::parse;
use crate::engines::{Engine, EngineError, EngineMetadata, OutboundRequest, RawResponse};
use crate::search::{SearchRequest, SearchResult};
use serde_json::Value;
use std::collections::BTreeMap;

const BASE_URL: &str = "https://musicbrainz.org";
const PAGE_SIZE: u32 = 25;

pub struct MusicBrainz {
    metadata: EngineMetadata,
}

impl Default for MusicBrainz {
    fn default() -> Self {
        Self::new()
    }
}

impl MusicBrainz {
    pub fn new() -> Self {
        let about = BTreeMap::from([
            ("website".to_string(), BASE_URL.to_string()),
            (
                "official_api_documentation".to_string(),
                "https://musicbrainz.org/doc/MusicBrainz_API".to_string(),
            ),
            ("use_official_api".to_string(), "true".to_string()),
            ("require_api_key".to_string(), "false".to_string()),
            ("results".to_string(), "JSON".to_string()),
        ]);
        Self {
            metadata: EngineMetadata {
                categories: vec!["music".to_string()],
                paging: true,
                time_range_support: false,
                about,
                timeout: None,
            },
        }
    }

    fn map_release(release: &Value) -> Option<SearchResult> {
        let id = parse::field(release, "id")?;
        let title = parse::field(release, "title")?;
        let artist = release
            .get("artist-credit")
            .and_then(Value::as_array)
            .map(|credits| {
                credits
                    .iter()
                    .filter_map(|credit| parse::field(credit, "name"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .filter(|names| !names.is_empty());

        let mut content = Vec::new();
        if let Some(artist) = &artist {
            content.push(artist.clone());
        }
        if let Some(country) = parse::field(release, "country") {
            content.push(country);
        }
        if let Some(disambiguation) = parse::field(release, "disambiguation") {
            content.push(disambiguation);
        }

        Some(SearchResult {
            url: format!("{BASE_URL}/release/{id}"),
            title,
            content: content.join(" · "),
            engine: String::new(),
            artist,
            album: parse::field(release, "release-group.title"),
            duration: None,
            thumbnail: Some(format!("https://coverartarchive.org/release/{id}/front-250")),
            published_date: parse::field(release, "date"),
        })
    }
}

impl Engine for MusicBrainz {
    fn name(&self) -> &str {
        "musicbrainz"
    }

    fn metadata(&self) -> &EngineMetadata {
        &self.metadata
    }

    fn build_request(&self, request: &SearchRequest) -> Result<OutboundRequest, EngineError> {
        let offset = (request.page() - 1)
            .checked_mul(PAGE_SIZE)
            .ok_or_else(|| EngineError::Request(format!("page {} is out of range", request.page())))?;
        Ok(OutboundRequest::get(format!("{BASE_URL}/ws/2/release/"))
            .param("query", request.query())
            .param("fmt", "json")
            .param("limit", PAGE_SIZE.to_string())
            .param("offset", offset.to_string())
            .header("Accept", "application/json"))
    }

    fn parse_response(&self, response: &RawResponse) -> Result<Vec<SearchResult>, EngineError> {
        let document = parse::parse_json(&response.body)?;
        let releases = parse::json_items(&document, "releases")?;
        Ok(releases.iter().filter_map(Self::map_release).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_by_offset() {
        let request = SearchRequest::new("nevermind")
            .unwrap()
            .with_page(3)
            .unwrap();
        let outbound = MusicBrainz::new().build_request(&request).unwrap();

        assert!(outbound.url.ends_with("/ws/2/release/"));
        assert!(outbound.query.contains(&("offset".to_string(), "50".to_string())));
        assert!(outbound.query.contains(&("query".to_string(), "nevermind".to_string())));
    }

    #[test]
    fn rejects_page_past_offset_range() {
        let request = SearchRequest::new("nevermind")
            .unwrap()
            .with_page(u32::MAX)
            .unwrap();
        let err = MusicBrainz::new().build_request(&request).unwrap_err();
        assert!(matches!(err, EngineError::Request(_)));
    }

    #[test]
    fn maps_releases() {
        let body = r#"{"releases": [
            {"id": "b1", "title": "Nevermind", "date": "1991-09-24", "country": "US",
             "artist-credit": [{"name": "Nirvana"}],
             "release-group": {"title": "Nevermind"}},
            {"title": "no id"}
        ]}"#;
        let results = MusicBrainz::new()
            .parse_response(&RawResponse::json(body))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://musicbrainz.org/release/b1");
        assert_eq!(results[0].artist.as_deref(), Some("Nirvana"));
        assert_eq!(results[0].album.as_deref(), Some("Nevermind"));
        assert_eq!(results[0].published_date.as_deref(), Some("1991-09-24"));
        assert_eq!(results[0].content, "Nirvana · US");
    }

    #[test]
    fn html_error_page_is_a_parse_error() {
        let err = MusicBrainz::new()
            .parse_response(&RawResponse::html("<html>rate limited</html>"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse(_)));
    }
}
