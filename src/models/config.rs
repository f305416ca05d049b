//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Variant;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Worker pool and status settings
    #[serde(default)]
    pub harvester: HarvesterConfig,

    /// HTTP client behavior shared by all connectors
    #[serde(default)]
    pub http: HttpConfig,

    /// Destination service
    #[serde(default)]
    pub sink: SinkConfig,

    /// OAI-PMH source definitions
    #[serde(default)]
    pub sources: Vec<PmhSourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.harvester.threads == 0 {
            return Err(AppError::validation("harvester.threads must be > 0"));
        }
        if self.harvester.status_interval == 0 {
            return Err(AppError::validation(
                "harvester.status_interval must be > 0",
            ));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.sink.endpoint.trim().is_empty() {
            return Err(AppError::validation("sink.endpoint is empty"));
        }
        url::Url::parse(&self.sink.endpoint)?;

        let mut keys = std::collections::HashSet::new();
        for source in &self.sources {
            if source.key.trim().is_empty() {
                return Err(AppError::validation("source key is empty"));
            }
            if source.key == "all" {
                return Err(AppError::validation("source key 'all' is reserved"));
            }
            if !keys.insert(source.key.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate source key '{}'",
                    source.key
                )));
            }
            url::Url::parse(&source.endpoint)?;
        }
        Ok(())
    }
}

/// Worker pool and status reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvesterConfig {
    /// Number of concurrent workers per harvest
    #[serde(default = "defaults::threads")]
    pub threads: usize,

    /// Push a status update to the sink every this many claimed entities
    #[serde(default = "defaults::status_interval")]
    pub status_interval: usize,

    /// Stop after this many entities
    #[serde(default)]
    pub max_entities: Option<u64>,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            threads: defaults::threads(),
            status_interval: defaults::status_interval(),
            max_entities: None,
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Whole-request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
        }
    }
}

/// Destination service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "defaults::sink_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::sink_endpoint(),
            username: None,
            password: None,
        }
    }
}

/// Name-composition rule for metadata elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PmhFormat {
    /// Element name plus text, e.g. `oai_dc`
    #[default]
    Simple,
    /// Name built from schema/element/qualifier attributes, e.g. DSpace `dim`
    Qualified,
}

/// One OAI-PMH source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PmhSourceConfig {
    pub key: String,

    pub name: String,

    /// Base URL of the OAI-PMH endpoint
    pub endpoint: String,

    #[serde(default = "defaults::metadata_prefix")]
    pub metadata_prefix: String,

    /// Restrict the harvest to one set
    #[serde(default)]
    pub set: Option<String>,

    #[serde(default)]
    pub format: PmhFormat,

    #[serde(default)]
    pub variant: Variant,

    /// Template for parent URIs, with a `{handle}` placeholder
    #[serde(default)]
    pub set_uri_template: Option<String>,

    /// Attempts per page before the list is given up
    #[serde(default = "defaults::max_page_failures")]
    pub max_page_failures: u32,
}

mod defaults {
    pub fn threads() -> usize {
        4
    }

    pub fn status_interval() -> usize {
        25
    }

    pub fn user_agent() -> String {
        format!("harvester/{}", env!("CARGO_PKG_VERSION"))
    }

    pub fn timeout() -> u64 {
        60
    }

    pub fn connect_timeout() -> u64 {
        10
    }

    pub fn sink_endpoint() -> String {
        "http://localhost:3000/api/v1".to_string()
    }

    pub fn metadata_prefix() -> String {
        "oai_dc".to_string()
    }

    pub fn max_page_failures() -> u32 {
        3
    }
}
