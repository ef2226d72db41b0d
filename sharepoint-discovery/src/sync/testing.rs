//! In-memory collaborators for engine and orchestrator tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use super::entities::config_for;
use super::entity::EntityKind;
use super::ports::{Catalogue, CatalogueRecord, JobStatusStore, ListItem, ListSource, Notifier};
use super::report::JobStatus;

/// SharePoint lists held in memory
#[derive(Default)]
pub struct MemorySource {
    lists: HashMap<String, Vec<ListItem>>,
    failing: HashSet<String>,
    unreachable: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_list(mut self, name: &str, items: Vec<ListItem>) -> Self {
        self.lists.insert(name.to_string(), items);
        self
    }

    pub fn failing_list(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }
}

#[async_trait]
impl ListSource for MemorySource {
    async fn check_connection(&self) -> Result<()> {
        if self.unreachable {
            bail!("SharePoint unreachable");
        }
        Ok(())
    }

    async fn fetch_list(&self, list_name: &str) -> Result<Vec<ListItem>> {
        if self.failing.contains(list_name) {
            bail!("list '{}' failed to load", list_name);
        }
        Ok(self.lists.get(list_name).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
struct CatalogueState {
    records: HashMap<EntityKind, Vec<Map<String, JsonValue>>>,
    next_id: usize,
    update_calls: usize,
}

/// A Strapi-like catalogue held in memory.
///
/// Records get `documentId`s of the form `<endpoint>-<n>`. Relation fields
/// holding another record's `documentId` are populated on read the way
/// `populate=*` does it.
#[derive(Default)]
pub struct MemoryCatalogue {
    state: Mutex<CatalogueState>,
    fail_keys: Mutex<HashSet<String>>,
    failing_kinds: Mutex<HashSet<EntityKind>>,
    unreachable: bool,
    statuses: Mutex<Vec<(String, JobStatus, Vec<String>)>>,
}

impl MemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    /// Insert a record directly, returning its id
    pub fn seed(&self, kind: EntityKind, fields: JsonValue) -> String {
        let mut state = self.state.lock().unwrap();
        let mut fields = fields.as_object().cloned().unwrap_or_default();
        state.next_id += 1;
        let id = format!("{}-{}", kind.endpoint(), state.next_id);
        fields.insert("documentId".into(), JsonValue::String(id.clone()));
        state.records.entry(kind).or_default().push(fields);
        id
    }

    /// Fail any mutation whose payload or id carries this value
    pub fn fail_on(&self, value: &str) {
        self.fail_keys.lock().unwrap().insert(value.to_string());
    }

    /// Fail `fetch_all` for a kind
    pub fn fail_fetch(&self, kind: EntityKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    /// Stored records, as sent
    pub fn records(&self, kind: EntityKind) -> Vec<Map<String, JsonValue>> {
        self.state
            .lock()
            .unwrap()
            .records
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Records as `fetch_all` returns them: every mapped field is present,
    /// unset ones as `null`
    pub fn fetch_records(&self, kind: EntityKind) -> Vec<CatalogueRecord> {
        let config = config_for(kind);
        let mapped: Vec<String> = config
            .fields
            .iter()
            .map(|f| f.target.clone())
            .chain(config.relations.iter().map(|r| r.target.clone()))
            .collect();
        let state = self.state.lock().unwrap();
        let by_id: HashMap<&str, &Map<String, JsonValue>> = state
            .records
            .values()
            .flatten()
            .filter_map(|r| Some((r.get("documentId")?.as_str()?, r)))
            .collect();

        state
            .records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .map(|record| {
                        let mut populated: Map<String, JsonValue> = record
                            .iter()
                            .map(|(field, value)| {
                                let linked = match value {
                                    JsonValue::String(id) if field != "documentId" => by_id.get(id.as_str()),
                                    _ => None,
                                };
                                let value = match linked {
                                    Some(other) => serde_json::json!({
                                        "documentId": other["documentId"],
                                        "name": other.get("name").cloned().unwrap_or(JsonValue::Null),
                                    }),
                                    None => value.clone(),
                                };
                                (field.clone(), value)
                            })
                            .collect();
                        for field in &mapped {
                            populated.entry(field.clone()).or_insert(JsonValue::Null);
                        }
                        CatalogueRecord {
                            fields: populated,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn statuses(&self) -> Vec<(String, JobStatus, Vec<String>)> {
        self.statuses.lock().unwrap().clone()
    }

    fn check_failure(&self, values: impl IntoIterator<Item = String>) -> Result<()> {
        let fail_keys = self.fail_keys.lock().unwrap();
        for value in values {
            if fail_keys.contains(&value) {
                bail!("rejected by catalogue: {}", value);
            }
        }
        Ok(())
    }
}

fn string_values(data: &Map<String, JsonValue>) -> Vec<String> {
    data.values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

#[async_trait]
impl Catalogue for MemoryCatalogue {
    async fn check_connection(&self) -> Result<()> {
        if self.unreachable {
            bail!("Service Catalogue unreachable");
        }
        Ok(())
    }

    async fn fetch_all(&self, kind: EntityKind) -> Result<Vec<CatalogueRecord>> {
        if self.failing_kinds.lock().unwrap().contains(&kind) {
            bail!("fetching {} failed", kind);
        }
        Ok(self.fetch_records(kind))
    }

    async fn create(&self, kind: EntityKind, data: &Map<String, JsonValue>) -> Result<CatalogueRecord> {
        self.check_failure(string_values(data))?;
        let id = self.seed(kind, JsonValue::Object(data.clone()));
        let mut fields = data.clone();
        fields.insert("documentId".into(), JsonValue::String(id));
        Ok(CatalogueRecord { fields })
    }

    async fn update(&self, kind: EntityKind, id: &str, data: &Map<String, JsonValue>) -> Result<()> {
        self.check_failure(string_values(data).into_iter().chain([id.to_string()]))?;
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        let record = state
            .records
            .get_mut(&kind)
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|r| r.get("documentId").and_then(|v| v.as_str()) == Some(id))
            })
            .ok_or_else(|| anyhow!("{} {} not found", kind, id))?;
        for (field, value) in data {
            record.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.check_failure([id.to_string()])?;
        let mut state = self.state.lock().unwrap();
        let records = state.records.entry(kind).or_default();
        let before = records.len();
        records.retain(|r| r.get("documentId").and_then(|v| v.as_str()) != Some(id));
        if records.len() == before {
            bail!("{} {} not found", kind, id);
        }
        Ok(())
    }
}

#[async_trait]
impl JobStatusStore for MemoryCatalogue {
    async fn record_job_status(&self, job_name: &str, status: JobStatus, errors: &[String]) -> Result<()> {
        if self.unreachable {
            bail!("Service Catalogue unreachable");
        }
        self.statuses
            .lock()
            .unwrap()
            .push((job_name.to_string(), status, errors.to_vec()));
        Ok(())
    }
}

/// Captures notifications and alerts
#[derive(Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        self.notifications.lock().unwrap().push(message.to_string());
        Ok(())
    }

    async fn alert(&self, message: &str) -> Result<()> {
        self.alerts.lock().unwrap().push(message.to_string());
        Ok(())
    }
}
