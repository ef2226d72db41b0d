//! Service Catalogue (Strapi) REST client

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};

use super::ensure_success;
use crate::config::CatalogueConfig;
use crate::sync::entity::EntityKind;
use crate::sync::ports::{Catalogue, CatalogueRecord, JobStatusStore};
use crate::sync::report::JobStatus;

const SCHEDULED_JOBS: &str = "scheduled-jobs";

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Vec<JsonValue>,
    meta: Option<Meta>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    page: u32,
    page_count: u32,
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    data: JsonValue,
}

pub struct ServiceCatalogueClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
    filter: String,
    page_size: u32,
}

impl ServiceCatalogueClient {
    pub fn new(http: reqwest::Client, config: &CatalogueConfig, page_size: u32) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            key: config.key.clone(),
            filter: config
                .filter
                .trim_start_matches(['&', '?'])
                .to_string(),
            page_size: page_size.max(1),
        }
    }

    fn collection_url(&self, endpoint: &str) -> String {
        format!("{}/v1/{}", self.base_url, endpoint)
    }

    fn record_url(&self, endpoint: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, endpoint, urlencoding::encode(id))
    }

    /// Collection URL for one page, with the kind's populate query and the filter
    fn page_url(&self, endpoint: &str, read_query: Option<&str>, page: u32) -> String {
        let mut params: Vec<String> = Vec::new();
        if let Some(query) = read_query {
            params.push(query.to_string());
        }
        if !self.filter.is_empty() {
            params.push(self.filter.clone());
        }
        params.push(format!("pagination[page]={}", page));
        params.push(format!("pagination[pageSize]={}", self.page_size));
        format!("{}?{}", self.collection_url(endpoint), params.join("&"))
    }

    async fn fetch_pages(&self, endpoint: &str, read_query: Option<&str>) -> Result<Vec<JsonValue>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let url = self.page_url(endpoint, read_query, page);
            log::debug!("GET {}", url);

            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.key)
                .send()
                .await
                .with_context(|| format!("Failed to read {} from the Service Catalogue", endpoint))?;
            let response = ensure_success(response, &format!("Reading {}", endpoint)).await?;
            let body: ListResponse = response
                .json()
                .await
                .with_context(|| format!("Invalid response while reading {}", endpoint))?;

            records.extend(body.data);

            let page_count = body
                .meta
                .and_then(|m| m.pagination)
                .map(|p| {
                    log::debug!("Got page {} of {} for {}", p.page, p.page_count, endpoint);
                    p.page_count
                })
                .unwrap_or(1);

            if page >= page_count {
                break;
            }
            page += 1;
        }

        Ok(records)
    }

    async fn find_job(&self, job_name: &str) -> Result<CatalogueRecord> {
        let url = format!(
            "{}?filters[name][$eq]={}",
            self.collection_url(SCHEDULED_JOBS),
            urlencoding::encode(job_name)
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.key)
            .send()
            .await
            .context("Failed to read scheduled jobs")?;
        let response = ensure_success(response, "Reading scheduled jobs").await?;
        let body: ListResponse = response.json().await.context("Invalid scheduled jobs response")?;

        body.data
            .into_iter()
            .find_map(CatalogueRecord::from_json)
            .ok_or_else(|| anyhow!("Job {} not found in the Service Catalogue", job_name))
    }

    async fn put(&self, endpoint: &str, id: &str, data: &Map<String, JsonValue>) -> Result<()> {
        let response = self
            .http
            .put(self.record_url(endpoint, id))
            .bearer_auth(&self.key)
            .json(&json!({ "data": data }))
            .send()
            .await
            .with_context(|| format!("Failed to update {} {}", endpoint, id))?;
        ensure_success(response, &format!("Updating {} {}", endpoint, id)).await?;
        Ok(())
    }
}

#[async_trait]
impl Catalogue for ServiceCatalogueClient {
    async fn check_connection(&self) -> Result<()> {
        log::info!("Testing connection to the Service Catalogue - {}", self.base_url);
        let response = self
            .http
            .head(&self.base_url)
            .bearer_auth(&self.key)
            .send()
            .await
            .with_context(|| format!("Unable to connect to the Service Catalogue - {}", self.base_url))?;
        log::info!(
            "Connected to the Service Catalogue - {} ({})",
            self.base_url,
            response.status()
        );
        Ok(())
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<CatalogueRecord>> {
        let raw = self.fetch_pages(kind.endpoint(), kind.read_query()).await?;
        Ok(raw.into_iter().filter_map(CatalogueRecord::from_json).collect())
    }

    async fn create(&self, kind: EntityKind, data: &Map<String, JsonValue>) -> Result<CatalogueRecord> {
        let endpoint = kind.endpoint();
        let response = self
            .http
            .post(self.collection_url(endpoint))
            .bearer_auth(&self.key)
            .json(&json!({ "data": data }))
            .send()
            .await
            .with_context(|| format!("Failed to add a record to {}", endpoint))?;
        let response = ensure_success(response, &format!("Adding to {}", endpoint)).await?;
        let body: SingleResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid response while adding to {}", endpoint))?;

        CatalogueRecord::from_json(body.data)
            .ok_or_else(|| anyhow!("Service Catalogue returned no record for the new {}", kind.label()))
    }

    async fn update(&self, kind: EntityKind, id: &str, data: &Map<String, JsonValue>) -> Result<()> {
        self.put(kind.endpoint(), id, data).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let endpoint = kind.endpoint();
        let response = self
            .http
            .delete(self.record_url(endpoint, id))
            .bearer_auth(&self.key)
            .send()
            .await
            .with_context(|| format!("Failed to delete {} {}", endpoint, id))?;
        ensure_success(response, &format!("Deleting {} {}", endpoint, id)).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStatusStore for ServiceCatalogueClient {
    async fn record_job_status(&self, job_name: &str, status: JobStatus, errors: &[String]) -> Result<()> {
        let job = self.find_job(job_name).await?;
        let id = job
            .target_id()
            .ok_or_else(|| anyhow!("Job {} has no id in the Service Catalogue", job_name))?;

        let now = chrono::Utc::now().to_rfc3339();
        let mut data = Map::new();
        data.insert("last_scheduled_run".into(), JsonValue::String(now.clone()));
        data.insert("result".into(), JsonValue::String(status.as_str().to_string()));
        data.insert("error_details".into(), json!(errors));
        if status == JobStatus::Succeeded {
            data.insert("last_successful_run".into(), JsonValue::String(now));
        }

        self.put(SCHEDULED_JOBS, &id, &data).await?;
        log::info!("Recorded job status {} for {}", status, job_name);
        Ok(())
    }
}
