//! Tunable settings, loaded from an optional TOML file
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::sync::entity::{EntityConfig, ProtectedKeys};

pub const DEFAULT_JOB_NAME: &str = "hmpps-sharepoint-discovery";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SLACK_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name of the scheduled-jobs entry in the catalogue
    pub job_name: String,
    pub request_timeout_secs: u64,
    /// Strapi page size used while reading collections
    pub page_size: u32,
    pub graph_base_url: String,
    pub login_base_url: String,
    pub slack_base_url: String,
    /// Catalogue endpoint -> key prefixes never deleted (replaces the built-in list)
    pub protected_prefixes: HashMap<String, Vec<String>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            request_timeout_secs: 10,
            page_size: 100,
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            login_base_url: DEFAULT_LOGIN_BASE_URL.to_string(),
            slack_base_url: DEFAULT_SLACK_BASE_URL.to_string(),
            protected_prefixes: HashMap::new(),
        }
    }
}

impl Settings {
    #[cfg(test)]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        if settings.page_size == 0 {
            anyhow::bail!("page_size must be greater than zero");
        }
        Ok(settings)
    }

    /// Apply per-endpoint overrides to an entity configuration
    pub fn apply(&self, mut config: EntityConfig) -> EntityConfig {
        if let Some(prefixes) = self.protected_prefixes.get(config.kind.endpoint()) {
            config.protected = ProtectedKeys::prefixes(prefixes.iter().cloned());
        }
        config
    }
}

/// Builder for [`Settings`], for tests that point clients at mock servers
#[cfg(test)]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

#[cfg(test)]
impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_name(mut self, name: impl Into<String>) -> Self {
        self.settings.job_name = name.into();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.settings.request_timeout_secs = secs;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.settings.page_size = size;
        self
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.graph_base_url = url.into();
        self
    }

    pub fn login_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.login_base_url = url.into();
        self
    }

    pub fn slack_base_url(mut self, url: impl Into<String>) -> Self {
        self.settings.slack_base_url = url.into();
        self
    }

    pub fn protected_prefixes<I, S>(mut self, endpoint: &str, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.protected_prefixes.insert(
            endpoint.to_string(),
            prefixes.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn build(self) -> Settings {
        self.settings
    }
}
