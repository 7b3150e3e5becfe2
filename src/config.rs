use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Ingestion interval in minutes. No scheduler runs when unset.
    #[serde(default)]
    pub refresh_interval: Option<u64>,
    pub feed: FeedConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    /// Label used as both `author` and `source` of ingested records
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_source() -> String {
    "서울경제".to_string()
}

fn default_user_agent() -> String {
    "Next-RSS-Reader/1.0".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
    Rest,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub rest_token: Option<String>,
}

fn default_namespace() -> String {
    "news".to_string()
}

fn default_database_url() -> String {
    "sqlite:live_news.db?mode=rwc".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            namespace: default_namespace(),
            database_url: default_database_url(),
            rest_url: None,
            rest_token: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Check settings that depend on each other. Run after env overrides.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.feed.url.trim().is_empty() {
            anyhow::bail!("feed.url must not be empty");
        }
        if self.store.namespace.is_empty() || self.store.namespace.contains(':') {
            anyhow::bail!("store.namespace must be non-empty and must not contain ':'");
        }
        if self.store.backend == StoreBackend::Rest {
            if self.store.rest_url.is_none() {
                anyhow::bail!("store.rest_url is required for the rest backend");
            }
            if self.store.rest_token.is_none() {
                anyhow::bail!("store.rest_token is required for the rest backend");
            }
        }
        if self.refresh_interval == Some(0) {
            anyhow::bail!("refresh_interval must be positive");
        }
        Ok(())
    }
}
