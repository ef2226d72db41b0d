//! HTTP collaborators: SharePoint (Microsoft Graph), the Service Catalogue
//! (Strapi) and Slack

pub mod catalogue;
pub mod sharepoint;
pub mod slack;

pub use catalogue::ServiceCatalogueClient;
pub use sharepoint::SharePointClient;
pub use slack::SlackClient;

use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::config::Settings;

/// Shared HTTP client with the configured request timeout
pub fn http_client(settings: &Settings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .user_agent(concat!("sharepoint-discovery/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Turn a non-2xx response into an error carrying the status and body
pub(crate) async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    bail!("{} failed ({}): {}", what, status, body.trim())
}
