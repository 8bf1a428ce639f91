//! Helpers shared by adapters for turning JSON or HTML payloads into results
use crate::engines::EngineError;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Follow a dotted path (`data.items`) into a JSON document. An empty path
/// returns the document itself.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render scalars as text; objects, arrays and null yield `None`.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn field(item: &Value, path: &str) -> Option<String> {
    lookup(item, path).and_then(scalar_text)
}

pub fn parse_json(body: &str) -> Result<Value, EngineError> {
    serde_json::from_str(body).map_err(|e| EngineError::Parse(format!("invalid JSON: {e}")))
}

/// Items under `path`, which must point at an array.
pub fn json_items<'a>(document: &'a Value, path: &str) -> Result<&'a [Value], EngineError> {
    match lookup(document, path) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(EngineError::Parse(format!("'{path}' is not an array"))),
        None => Err(EngineError::Parse(format!("missing '{path}' in response"))),
    }
}

fn tag_regex() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

fn whitespace_regex() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Strip markup, decode the common entities and collapse whitespace.
pub fn html_text(fragment: &str) -> String {
    let stripped = tag_regex().replace_all(fragment, " ");
    let decoded = decode_entities(&stripped);
    whitespace_regex()
        .replace_all(decoded.trim(), " ")
        .into_owned()
}

pub fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Result block of a SearXNG-style results page.
pub const DEFAULT_HTML_ITEM: &str =
    r#"(?s)<article[^>]*class="[^"]*result[^"]*"[^>]*>(.*?)</article>"#;
/// Link inside a result block, exposing `url` and `title` groups.
pub const DEFAULT_HTML_LINK: &str =
    r#"(?s)<h3[^>]*>\s*<a[^>]*href="(?P<url>[^"]+)"[^>]*>(?P<title>.*?)</a>"#;
/// Snippet inside a result block, exposing a `content` group.
pub const DEFAULT_HTML_CONTENT: &str =
    r#"(?s)<p[^>]*class="[^"]*content[^"]*"[^>]*>(?P<content>.*?)</p>"#;

/// Compiled patterns for scraping results out of an HTML page. Each result
/// block is matched by `item`, then `link` and `content` are applied inside it.
#[derive(Debug, Clone)]
pub struct HtmlRules {
    pub item: Regex,
    pub link: Regex,
    pub content: Option<Regex>,
}

impl HtmlRules {
    pub fn new(item: &str, link: &str, content: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            item: Regex::new(item)?,
            link: Regex::new(link)?,
            content: content.map(Regex::new).transpose()?,
        })
    }

    pub fn searx() -> Self {
        Self::new(
            DEFAULT_HTML_ITEM,
            DEFAULT_HTML_LINK,
            Some(DEFAULT_HTML_CONTENT),
        )
        .expect("static regex")
    }

    pub fn hits(&self, body: &str) -> Vec<HtmlHit> {
        self.item
            .captures_iter(body)
            .filter_map(|block| {
                let block = block.get(1).or_else(|| block.get(0))?.as_str();
                let link = self.link.captures(block)?;
                let url = decode_entities(link.name("url")?.as_str().trim());
                if url.is_empty() {
                    return None;
                }
                let title = link
                    .name("title")
                    .map(|m| html_text(m.as_str()))
                    .unwrap_or_default();
                let content = self
                    .content
                    .as_ref()
                    .and_then(|re| re.captures(block))
                    .and_then(|caps| caps.name("content").map(|m| html_text(m.as_str())))
                    .unwrap_or_default();
                Some(HtmlHit {
                    url,
                    title,
                    content,
                })
            })
            .collect()
    }
}

/// A single extracted HTML hit before it is mapped onto a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlHit {
    pub url: String,
    pub title: String,
    pub content: String,
}
