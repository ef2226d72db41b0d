//! SharePoint lists through Microsoft Graph

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;

use super::ensure_success;
use crate::config::{SharePointConfig, Settings};
use crate::sync::ports::{ListItem, ListSource};

const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// One page of a Graph collection
#[derive(Debug, Deserialize)]
struct GraphPage<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListInfo {
    id: String,
    display_name: String,
}

/// Client-credential Graph client for one SharePoint site.
///
/// The token and the site's list directory are fetched once per run.
pub struct SharePointClient {
    http: reqwest::Client,
    config: SharePointConfig,
    graph_base_url: String,
    login_base_url: String,
    token: OnceCell<String>,
    lists: OnceCell<Vec<ListInfo>>,
}

impl SharePointClient {
    pub fn new(http: reqwest::Client, config: &SharePointConfig, settings: &Settings) -> Self {
        Self {
            http,
            config: config.clone(),
            graph_base_url: settings.graph_base_url.trim_end_matches('/').to_string(),
            login_base_url: settings.login_base_url.trim_end_matches('/').to_string(),
            token: OnceCell::new(),
            lists: OnceCell::new(),
        }
    }

    fn lists_url(&self) -> String {
        format!("{}/sites/{}/lists", self.graph_base_url, self.config.site_id)
    }

    async fn token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/{}/oauth2/v2.0/token",
                    self.login_base_url, self.config.tenant_id
                );
                let response = self
                    .http
                    .post(&url)
                    .form(&[
                        ("client_id", self.config.client_id.as_str()),
                        ("client_secret", self.config.client_secret.as_str()),
                        ("scope", GRAPH_SCOPE),
                        ("grant_type", "client_credentials"),
                    ])
                    .send()
                    .await
                    .context("Token request failed")?;
                let response = ensure_success(response, "Token request").await?;
                let body: TokenResponse = response.json().await.context("Invalid token response")?;
                log::debug!("Obtained Graph access token");
                Ok::<String, anyhow::Error>(body.access_token)
            })
            .await?;
        Ok(token.as_str())
    }

    /// Every page of a Graph collection, following `@odata.nextLink`
    async fn get_all<T>(&self, first_url: String) -> Result<Vec<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let token = self.token().await?;
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            log::debug!("GET {}", url);
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .header("Accept", "application/json")
                .send()
                .await
                .with_context(|| format!("Graph request failed: {}", url))?;
            let response = ensure_success(response, "Graph request").await?;
            let page: GraphPage<T> = response
                .json()
                .await
                .with_context(|| format!("Invalid Graph response from {}", url))?;
            items.extend(page.value);
            next = page.next_link;
        }

        Ok(items)
    }

    async fn lists(&self) -> Result<&[ListInfo]> {
        let lists = self
            .lists
            .get_or_try_init(|| async { self.get_all::<ListInfo>(self.lists_url()).await })
            .await?;
        Ok(lists.as_slice())
    }

    async fn list_id(&self, list_name: &str) -> Result<String> {
        self.lists()
            .await?
            .iter()
            .find(|l| l.display_name == list_name)
            .map(|l| l.id.clone())
            .ok_or_else(|| anyhow!("List {} not found in SharePoint", list_name))
    }
}

#[async_trait]
impl ListSource for SharePointClient {
    async fn check_connection(&self) -> Result<()> {
        log::info!("Testing connection to SharePoint - {}", self.lists_url());
        let lists = self
            .lists()
            .await
            .context("Unable to connect to SharePoint")?;
        log::info!("Connected to SharePoint, {} lists available", lists.len());
        Ok(())
    }

    async fn fetch_list(&self, list_name: &str) -> Result<Vec<ListItem>> {
        let list_id = self.list_id(list_name).await?;
        let url = format!("{}/{}/items?expand=fields", self.lists_url(), list_id);
        let items: Vec<ListItem> = self
            .get_all(url)
            .await
            .with_context(|| format!("Failed to retrieve items from {} list", list_name))?;
        log::debug!("Retrieved {} items from {}", items.len(), list_name);
        Ok(items)
    }
}
