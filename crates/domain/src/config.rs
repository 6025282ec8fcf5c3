//! Explicit startup configuration (§9 "implicit runtime configuration").
//!
//! One `Config` is built once at process start (TOML file + env overrides)
//! and passed by `Arc` into every component. Nothing below reads
//! `std::env` itself; `reportdeck-cli` is the only place environment and
//! file config are resolved.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub state_dir: StateDirConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            summarizer: SummarizerConfig::default(),
            image: ImageConfig::default(),
            deck: DeckConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            data: DataConfig::default(),
            state_dir: StateDirConfig::default(),
        }
    }
}

impl Config {
    /// Load from a TOML file at `path`. Missing sections fall back to their
    /// field-level defaults (every section is `#[serde(default)]`).
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::error::Error::bad_request(format!("config: {e}")))?;
        Ok(config)
    }

    /// Load from `path` if it exists and parses; otherwise defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDirConfig {
    #[serde(default = "d_out_dir")]
    pub out_dir: PathBuf,
}

fn d_out_dir() -> PathBuf {
    PathBuf::from("out")
}

impl Default for StateDirConfig {
    fn default() -> Self {
        Self {
            out_dir: d_out_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "d_max_bullets")]
    pub max_bullets: usize,
    #[serde(default = "d_max_script_chars")]
    pub max_script_chars: usize,
    #[serde(default = "d_max_sections")]
    pub max_sections: usize,
    #[serde(default = "d_model_id")]
    pub model_id: String,
    /// Base URL of the summarization backend (an external collaborator,
    /// §1). Empty means no live backend is wired — callers should use a
    /// `Mock*` adapter instead (see `reportdeck-tools::mock`).
    #[serde(default)]
    pub base_url: String,
}

fn d_max_bullets() -> usize {
    5
}
fn d_max_script_chars() -> usize {
    700
}
fn d_max_sections() -> usize {
    10
}
fn d_model_id() -> String {
    "summarizer-default".to_string()
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            max_bullets: d_max_bullets(),
            max_script_chars: d_max_script_chars(),
            max_sections: d_max_sections(),
            model_id: d_model_id(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "d_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub shared_public_default: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub upload_base_url: String,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            model_id: d_model_id(),
            shared_public_default: true,
            base_url: String::new(),
            upload_base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default = "d_aspect")]
    pub default_aspect: String,
    #[serde(default)]
    pub base_url: String,
}

fn d_aspect() -> String {
    "16:9".to_string()
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            default_aspect: d_aspect(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_cache_ttl_secs")]
    pub ttl_secs: i64,
}

fn d_cache_ttl_secs() -> i64 {
    6 * 3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: d_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "d_attempts")]
    pub attempts: u32,
    #[serde(default = "d_base_secs")]
    pub base_secs: f64,
    #[serde(default = "d_cap_secs")]
    pub cap_secs: f64,
}

fn d_attempts() -> u32 {
    4
}
fn d_base_secs() -> f64 {
    0.6
}
fn d_cap_secs() -> f64 {
    30.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: d_attempts(),
            base_secs: d_base_secs(),
            cap_secs: d_cap_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "d_limit_rows")]
    pub default_limit_rows: u64,
    #[serde(default = "d_max_limit_rows")]
    pub max_limit_rows: u64,
}

fn d_limit_rows() -> u64 {
    100_000
}
fn d_max_limit_rows() -> u64 {
    100_000
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            default_limit_rows: d_limit_rows(),
            max_limit_rows: d_max_limit_rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let c = Config::default();
        assert_eq!(c.summarizer.max_script_chars, 700);
        assert_eq!(c.retry.attempts, 4);
        assert_eq!(c.retry.base_secs, 0.6);
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let toml_str = r#"
            [retry]
            attempts = 6
        "#;
        let c: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(c.retry.attempts, 6);
        assert_eq!(c.retry.base_secs, 0.6);
        assert_eq!(c.cache.ttl_secs, 6 * 3600);
    }
}
