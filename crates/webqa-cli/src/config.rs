//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$WEBQA_CONFIG` environment variable
//! 2. `~/.config/webqa/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use webqa_core::RankingPolicy;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub ranking: RankingPolicy,
    pub search: SearchConfig,
    pub services: ServicesConfig,
}

/// Search result cache settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Shard directory. Default: platform-specific cache dir.
    pub dir: Option<String>,
    /// Own-shard flush cadence, in cache additions.
    pub flush_interval: usize,
}

/// Query and web search settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Also search the diacritic-free form of each query.
    pub strip_diacritics: bool,
    /// Market code sent with every search.
    pub market: String,
    /// Environment variable holding the search API key.
    pub key_env: String,
}

/// Collaborator service endpoints.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub analyzer_url: String,
    pub search_url: String,
    pub extractor_url: String,
    /// Per-request timeout for every service call.
    pub timeout_secs: u64,
}

// --- Defaults ---

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            flush_interval: webqa_cache::DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strip_diacritics: true,
            market: "RO".into(),
            key_env: "BING_SEARCH_V7_KEY".into(),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            analyzer_url: "http://relate.racai.ro:5000/process".into(),
            search_url: "https://api.bing.microsoft.com/v7.0/search".into(),
            extractor_url: "http://127.0.0.1:31415/predict".into(),
            timeout_secs: 30,
        }
    }
}

impl Config {
    /// The search API key. Missing or empty is a startup error.
    pub fn search_key(&self) -> Result<String> {
        let key = std::env::var(&self.search.key_env).unwrap_or_default();
        if key.trim().is_empty() {
            bail!(
                "no search API key found in environment variable {}",
                self.search.key_env
            );
        }
        Ok(key)
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("WEBQA_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/webqa/config.toml
    dirs_home().map(|home| home.join(".config").join("webqa").join("config.toml"))
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `webqa config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}
