//! Process configuration for the cache-bridge binary.
//!
//! Loads configuration from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Default document path when `CACHE_BRIDGE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "cache-bridge.json";

/// Binary configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// JSON document holding the cache declarations.
    pub config_path: PathBuf,

    /// Manager to resolve. `None` is the default manager.
    pub manager: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config_path = env::var("CACHE_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        if !config_path.is_file() {
            bail!(
                "cache configuration {} not found (set CACHE_BRIDGE_CONFIG)",
                config_path.display()
            );
        }

        Ok(Self {
            config_path,
            manager: parse_manager(env::var("CACHE_BRIDGE_MANAGER").ok()),
        })
    }

    /// Read the configured document.
    pub fn read_document(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(&self.config_path)
            .with_context(|| format!("reading {}", self.config_path.display()))
    }
}

// Blank or "default" means the default manager.
fn parse_manager(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("default"))
}
