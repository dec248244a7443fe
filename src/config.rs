// src/config.rs
//! Service configuration and connector construction.
//!
//! Loaded from TOML with the usual resolution order:
//! 1) `$NEWSWIRE_CONFIG_PATH`
//! 2) `config/newswire.toml`
//! 3) built-in defaults (no connectors enabled)

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::connector::channel::ChannelConnector;
use crate::connector::reddit::RedditConnector;
use crate::connector::registry::ConnectorRegistry;
use crate::connector::rss::RssConnector;

const ENV_PATH: &str = "NEWSWIRE_CONFIG_PATH";
const DEFAULT_PATH: &str = "config/newswire.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub ingest: IngestConfig,
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Deadline for one connector fetch; exceeding it fails the run.
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            user_agent: "Mozilla/5.0 (compatible; newswire/0.1)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectorsConfig {
    pub rss: RssSection,
    pub reddit: RedditSection,
    pub channel: ChannelSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RssSection {
    pub enabled: bool,
    pub feeds: Vec<NamedSource>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RedditSection {
    pub enabled: bool,
    pub subreddits: Vec<SubredditEntry>,
    pub settings: RedditSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubredditEntry {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedditSettings {
    pub limit: usize,
    pub sort: String,
}

impl Default for RedditSettings {
    fn default() -> Self {
        Self {
            limit: 25,
            sort: "new".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    pub enabled: bool,
    pub channels: Vec<NamedSource>,
}

/// A sub-source with a display name and its poll URL.
#[derive(Debug, Clone, Deserialize)]
pub struct NamedSource {
    pub name: String,
    pub url: String,
}

/// Load configuration from an explicit TOML path.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
}

/// Load configuration using the env var + fallbacks.
pub fn load_default() -> Result<AppConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        }
        return Err(anyhow!("NEWSWIRE_CONFIG_PATH points to non-existent path"));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    if default.exists() {
        return load_from(&default);
    }
    Ok(AppConfig::default())
}

/// Construct every enabled connector and register it.
pub fn build_registry(cfg: &AppConfig) -> Result<ConnectorRegistry> {
    let client = reqwest::Client::builder()
        .user_agent(&cfg.ingest.user_agent)
        .build()
        .context("building http client")?;

    let mut registry = ConnectorRegistry::new();
    let c = &cfg.connectors;

    if c.rss.enabled {
        for feed in &c.rss.feeds {
            registry.register(Arc::new(RssConnector::from_url(
                feed.name.as_str(),
                feed.name.as_str(),
                feed.url.as_str(),
                client.clone(),
            )))?;
        }
    }
    if c.reddit.enabled {
        for sub in &c.reddit.subreddits {
            registry.register(Arc::new(RedditConnector::from_listing(
                sub.name.as_str(),
                &c.reddit.settings.sort,
                c.reddit.settings.limit,
                client.clone(),
            )))?;
        }
    }
    if c.channel.enabled {
        for ch in &c.channel.channels {
            registry.register(Arc::new(ChannelConnector::from_url(
                ch.name.as_str(),
                ch.url.as_str(),
                client.clone(),
            )))?;
        }
    }

    tracing::info!(connectors = registry.len(), "connector registry built");
    Ok(registry)
}
