use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default)]
    pub engines: EnginesConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub dir: PathBuf,
    pub builtin: bool,
    pub disabled: Vec<String>,
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("engines"),
            builtin: true,
            disabled: Vec::new(),
        }
    }
}

/// Backend that descriptor engines without their own endpoint are routed through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub url: String,
    pub format: String,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8888/search".to_string(),
            format: "json".to_string(),
            user_agent: concat!("engine-bridge/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_engines: Option<usize>,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_engines: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_top_queries")]
    pub top_queries: usize,
}

fn default_cache_enabled() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    3600
}
fn default_max_results() -> usize {
    100
}
fn default_capacity() -> usize {
    1000
}
fn default_top_queries() -> usize {
    10
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_ttl_secs(),
            max_results: default_max_results(),
            capacity: default_capacity(),
            top_queries: default_top_queries(),
        }
    }
}

impl Config {
    /// Loads `path` when given, otherwise the first config file found in the
    /// usual locations, otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_path(),
        };
        match config_path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Some(xdg_config) = dirs::config_dir() {
            let xdg_path = xdg_config.join("engine-bridge/config.toml");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let home_path = home.join(".engine-bridge.toml");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        let current_path = Path::new(".engine-bridge.toml");
        if current_path.exists() {
            return Some(current_path.to_path_buf());
        }

        None
    }
}
