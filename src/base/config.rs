//! Load configuration via `config` crate with env-override support.

use std::{ops::Deref, sync::Arc};

use serde::Deserialize;

use super::types::Res;

/// Default bus endpoint to subscribe to.
fn default_bus_endpoint() -> String {
    "tcp://127.0.0.1:5570".to_string()
}

/// Default long-poll timeout for the inbound sync listener.
fn default_sync_timeout_secs() -> u64 {
    30
}

/// Configuration for the mirk relay.
#[derive(Debug, Clone)]
pub struct Config {
    pub inner: Arc<ConfigInner>,
}

impl Deref for Config {
    type Target = ConfigInner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConfigInner {
    /// Matrix homeserver URL (`MIRK_HOST`).
    pub host: String,
    /// Matrix username (`MIRK_USERNAME`).
    pub username: String,
    /// Matrix password (`MIRK_PASSWORD`).
    pub password: String,
    /// Room IDs or aliases to publish into, in publish order (`MIRK_ROOMS`, comma-separated).
    pub rooms: Vec<String>,
    /// Base URL of the job web view, injected into templates as `webview_url` (`MIRK_WEBVIEW_URL`).
    #[serde(default)]
    pub webview_url: String,
    /// Base URL of the software view, injected into templates as `webswview_url` (`MIRK_WEBSWVIEW_URL`).
    #[serde(default)]
    pub webswview_url: String,
    /// ZeroMQ endpoint of the event publisher (`MIRK_BUS_ENDPOINT`).
    #[serde(default = "default_bus_endpoint")]
    pub bus_endpoint: String,
    /// Topic prefixes to subscribe to; empty subscribes to everything (`MIRK_BUS_TOPICS`, comma-separated).
    #[serde(default)]
    pub bus_topics: Vec<String>,
    /// Long-poll timeout in seconds for the inbound sync listener (`MIRK_SYNC_TIMEOUT_SECS`).
    #[serde(default = "default_sync_timeout_secs")]
    pub sync_timeout_secs: u64,
    /// Extra or overriding message templates.
    #[serde(default)]
    pub templates: Vec<TemplateOverride>,
}

/// A message template supplied through configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TemplateOverride {
    /// Tag variant the template applies to, e.g. `_lk.job.package-build-failed`.
    pub tag: String,
    /// Template body with `{placeholder}` fields.
    pub body: String,
}

impl Config {
    pub fn load(explicit_path: Option<&std::path::Path>) -> Res<Self> {
        let mut cfg = config::Config::builder().add_source(
            config::Environment::default()
                .prefix("MIRK")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("rooms")
                .with_list_parse_key("bus_topics"),
        );

        if let Some(p) = explicit_path {
            cfg = cfg.add_source(config::File::from(p.to_path_buf()));
        } else if std::path::Path::new(".hidden/config.toml").exists() {
            cfg = cfg.add_source(config::File::with_name(".hidden/config.toml"));
        }

        Self::from_builder(cfg)
    }

    /// Build and validate a configuration from a prepared builder.
    pub fn from_builder(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Res<Self> {
        let result = Config {
            inner: Arc::new(builder.build()?.try_deserialize()?),
        };

        result.validate()?;

        Ok(result)
    }

    fn validate(&self) -> Res<()> {
        if self.host.trim().is_empty() {
            return Err(anyhow::anyhow!("Matrix host must be set."));
        }

        if self.username.trim().is_empty() {
            return Err(anyhow::anyhow!("Matrix username must be set."));
        }

        if self.rooms.is_empty() {
            return Err(anyhow::anyhow!("At least one room must be configured."));
        }

        if self.rooms.iter().any(|r| r.trim().is_empty()) {
            return Err(anyhow::anyhow!("Room identifiers must not be empty."));
        }

        if self.sync_timeout_secs < 1 || self.sync_timeout_secs > 300 {
            return Err(anyhow::anyhow!("Sync timeout must be between 1 and 300 seconds."));
        }

        Ok(())
    }
}

// Tests.
