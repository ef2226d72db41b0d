//! Environment-backed credentials plus file-backed settings

pub mod settings;

pub use settings::Settings;

use anyhow::{Result, anyhow};

/// Service Catalogue (Strapi) connection
#[derive(Debug, Clone)]
pub struct CatalogueConfig {
    pub url: String,
    pub key: String,
    /// Extra Strapi query appended to every collection read, e.g. `filters[name][$contains]=x`
    pub filter: String,
}

/// SharePoint app registration
#[derive(Debug, Clone)]
pub struct SharePointConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub site_id: String,
}

/// Slack bot; no token means notifications are only logged
#[derive(Debug, Clone, Default)]
pub struct SlackConfig {
    pub bot_token: Option<String>,
    pub notify_channel: String,
    pub alert_channel: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub catalogue: CatalogueConfig,
    pub sharepoint: SharePointConfig,
    pub slack: SlackConfig,
    pub log_level: Option<String>,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through a variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow!("Missing required environment variable {}", name))
        };
        let optional = |name: &str| -> Option<String> {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let catalogue = CatalogueConfig {
            url: required("SERVICE_CATALOGUE_API_ENDPOINT")?
                .trim_end_matches('/')
                .to_string(),
            key: required("SERVICE_CATALOGUE_API_KEY")?,
            filter: optional("SC_FILTER").unwrap_or_default(),
        };

        let sharepoint = SharePointConfig {
            tenant_id: required("AZ_TENANT_ID")?,
            client_id: required("SP_CLIENT_ID")?,
            client_secret: required("SP_CLIENT_SECRET")?,
            site_id: required("SP_SITE_ID")?,
        };

        let slack = SlackConfig {
            bot_token: optional("SLACK_BOT_TOKEN"),
            notify_channel: optional("SLACK_NOTIFY_CHANNEL").unwrap_or_default(),
            alert_channel: optional("SLACK_ALERT_CHANNEL").unwrap_or_default(),
        };

        Ok(Self {
            catalogue,
            sharepoint,
            slack,
            log_level: optional("LOG_LEVEL"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        env(&[
            ("SERVICE_CATALOGUE_API_ENDPOINT", "https://sc.example/"),
            ("SERVICE_CATALOGUE_API_KEY", "key"),
            ("AZ_TENANT_ID", "tenant"),
            ("SP_CLIENT_ID", "client"),
            ("SP_CLIENT_SECRET", "secret"),
            ("SP_SITE_ID", "site"),
        ])
    }

    #[test]
    fn test_from_lookup_complete() {
        let vars = complete();
        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.catalogue.url, "https://sc.example");
        assert_eq!(config.catalogue.filter, "");
        assert_eq!(config.sharepoint.site_id, "site");
        assert!(config.slack.bot_token.is_none());
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_missing_variable_is_named() {
        let mut vars = complete();
        vars.remove("SP_CLIENT_SECRET");

        let err = Config::from_lookup(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("SP_CLIENT_SECRET"));
    }

    #[test]
    fn test_blank_counts_as_missing() {
        let mut vars = complete();
        vars.insert("SERVICE_CATALOGUE_API_KEY".into(), "  ".into());

        assert!(Config::from_lookup(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_optional_slack_settings() {
        let mut vars = complete();
        vars.insert("SLACK_BOT_TOKEN".into(), "xoxb".into());
        vars.insert("SLACK_NOTIFY_CHANNEL".into(), "C1".into());
        vars.insert("LOG_LEVEL".into(), "debug".into());

        let config = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.slack.bot_token.as_deref(), Some("xoxb"));
        assert_eq!(config.slack.notify_channel, "C1");
        assert_eq!(config.slack.alert_channel, "");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }
}
