use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::ingest::IngestOptions;
use crate::scraping::base::DEFAULT_USER_AGENT;
use crate::sources::{self, Source};
use crate::utils;

const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_CONCURRENCY: usize = 4;
const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_RENDERERS: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: Option<PathBuf>,
    pub interval_secs: u64,
    pub max_concurrent_sources: usize,
    pub source_timeout_secs: u64,
    pub renderer_url: Option<String>,
    pub renderer_token: Option<String>,
    pub max_renderers: usize,
    pub user_agent: String,
    pub use_fixtures: bool,
    pub sources: Vec<Source>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
            max_concurrent_sources: DEFAULT_MAX_CONCURRENCY,
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
            renderer_url: None,
            renderer_token: None,
            max_renderers: DEFAULT_MAX_RENDERERS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            use_fixtures: false,
            sources: sources::default_sources(),
        }
    }
}

impl AppConfig {
    /// Reads `config.json` from the data directory (if present), then applies environment
    /// overrides.
    pub fn load() -> Result<Self, String> {
        let mut config = read_config(&utils::config_path())?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(path) = get("EVENT_CATALOG_DB") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(secs) = get("EVENT_CATALOG_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.interval_secs = secs;
        }
        if let Some(n) = get("EVENT_CATALOG_MAX_CONCURRENCY").and_then(|s| s.parse().ok()) {
            self.max_concurrent_sources = n;
        }
        if let Some(secs) = get("EVENT_CATALOG_SOURCE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.source_timeout_secs = secs;
        }
        if let Some(url) = get("EVENT_CATALOG_RENDERER_URL") {
            self.renderer_url = Some(url);
        }
        if let Some(token) = get("EVENT_CATALOG_RENDERER_TOKEN") {
            self.renderer_token = Some(token);
        }
        if let Some(n) = get("EVENT_CATALOG_MAX_RENDERERS").and_then(|s| s.parse().ok()) {
            self.max_renderers = n;
        }
        if let Some(agent) = get("EVENT_CATALOG_USER_AGENT") {
            self.user_agent = agent;
        }
        if let Some(flag) = get("EVENT_CATALOG_FIXTURES") {
            self.use_fixtures = matches!(flag.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs.max(1))
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            max_concurrent_sources: self.max_concurrent_sources.max(1),
            source_timeout: self.source_timeout(),
        }
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| format!("{}: {err}", path.display()))
}
