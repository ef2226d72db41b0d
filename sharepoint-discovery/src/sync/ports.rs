//! Collaborator seams and the raw shapes that cross them
//!
//! The engine never talks HTTP itself. SharePoint, the Service Catalogue,
//! Slack and the job-status store are reached through these traits so the
//! engine can be driven by in-memory doubles in tests.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::entity::EntityKind;
use super::path::{FieldPath, PathLookup, resolve_path};
use super::report::JobStatus;

/// One SharePoint list item with its expanded field bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    /// Source-internal item id (what `*LookupId` columns point at)
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, JsonValue>,
}

impl ListItem {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, fields: JsonValue) -> Self {
        Self {
            id: id.into(),
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }
}

/// Lookup table for one list: lookup id -> item
pub type LookupTable = HashMap<String, ListItem>;

/// Index list items by id
pub fn lookup_table(items: &[ListItem]) -> LookupTable {
    lookup_table_by(items, None)
}

/// Index list items by the scalar at `key`, or by item id without one.
///
/// Items with no string or number at `key` are left out.
pub fn lookup_table_by(items: &[ListItem], key: Option<&FieldPath>) -> LookupTable {
    let Some(key) = key else {
        return items.iter().map(|item| (item.id.clone(), item.clone())).collect();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = match resolve_path(&item.fields, key) {
                PathLookup::Found(JsonValue::String(s)) => s.trim().to_string(),
                PathLookup::Found(JsonValue::Number(n)) => n.to_string(),
                _ => return None,
            };
            Some((id, item.clone()))
        })
        .collect()
}

/// A record as returned by the catalogue, flattened to one field map.
///
/// Strapi 5 returns flat records carrying a `documentId`; Strapi 4 wraps the
/// fields in an `attributes` object next to a numeric `id`. Both are accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogueRecord {
    pub fields: Map<String, JsonValue>,
}

impl CatalogueRecord {
    /// Flatten a record from either response shape
    pub fn from_json(value: JsonValue) -> Option<Self> {
        let JsonValue::Object(mut obj) = value else {
            return None;
        };

        if let Some(JsonValue::Object(attributes)) = obj.remove("attributes") {
            for (k, v) in attributes {
                obj.entry(k).or_insert(v);
            }
        }

        Some(Self { fields: obj })
    }

    /// Identifier used to address the record in update/delete calls
    pub fn target_id(&self) -> Option<String> {
        match self.fields.get("documentId") {
            Some(JsonValue::String(id)) if !id.is_empty() => return Some(id.clone()),
            _ => {}
        }
        match self.fields.get("id")? {
            JsonValue::String(id) if !id.is_empty() => Some(id.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }
}

/// Read-only access to the source system's lists
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Cheap reachability probe, run once before anything else
    async fn check_connection(&self) -> Result<()>;

    /// All items of a list, with fields expanded
    async fn fetch_list(&self, list_name: &str) -> Result<Vec<ListItem>>;

    /// A list indexed by item id, for relation lookups
    async fn fetch_lookup_table(&self, list_name: &str) -> Result<LookupTable> {
        let items = self.fetch_list(list_name).await?;
        Ok(lookup_table(&items))
    }
}

/// The target catalogue
#[async_trait]
pub trait Catalogue: Send + Sync {
    async fn check_connection(&self) -> Result<()>;

    /// Every record of a kind, pagination handled inside
    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<CatalogueRecord>>;

    async fn create(&self, kind: EntityKind, data: &Map<String, JsonValue>)
    -> Result<CatalogueRecord>;

    async fn update(&self, kind: EntityKind, id: &str, data: &Map<String, JsonValue>)
    -> Result<()>;

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;
}

/// Where run summaries and failure alerts go
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
    async fn alert(&self, message: &str) -> Result<()>;
}

/// Notifier that only logs; used when no Slack token is configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        log::info!("Notification (not sent):\n{}", message);
        Ok(())
    }

    async fn alert(&self, message: &str) -> Result<()> {
        log::warn!("Alert (not sent): {}", message);
        Ok(())
    }
}

/// Records the terminal status of a scheduled run
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    async fn record_job_status(
        &self,
        job_name: &str,
        status: JobStatus,
        errors: &[String],
    ) -> Result<()>;
}
