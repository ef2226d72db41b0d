//! Sync executor: applies decisions to the catalogue

use serde_json::{Map, Value as JsonValue};

use super::diff::{Decision, FieldChange};
use super::entity::EntityConfig;
use super::ports::Catalogue;
use super::record::EntityRecord;
use super::report::{ChangeLog, ErrorCollector};
use super::resolver::{ReferenceIndex, ReferenceIndexes, ResolveError};
use super::value::FieldValue;

/// A reference to a record of the same kind that did not exist when the
/// indices were built; linked once this pass has created it
#[derive(Debug)]
struct PendingLink {
    key: String,
    target_id: String,
    field: String,
    name: String,
}

/// Applies one entity type's decisions, one record at a time.
///
/// A failing record is logged, recorded and written to the change log as an
/// error line; the remaining decisions still run. References to records of
/// the executor's own kind that only appear during the pass are written in a
/// follow-up update against a freshly built index.
pub struct SyncExecutor<'a> {
    catalogue: &'a dyn Catalogue,
    config: &'a EntityConfig,
    indexes: &'a ReferenceIndexes,
    dry_run: bool,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(
        catalogue: &'a dyn Catalogue,
        config: &'a EntityConfig,
        indexes: &'a ReferenceIndexes,
    ) -> Self {
        Self {
            catalogue,
            config,
            indexes,
            dry_run: false,
        }
    }

    /// Log what would change without calling the catalogue
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Execute decisions in order and return the change log
    pub async fn execute(&self, decisions: &[Decision], errors: &mut ErrorCollector) -> ChangeLog {
        let mut log = ChangeLog::new();
        let mut pending = Vec::new();
        log.push(format!("** Processing {} **", self.config.kind.title()));

        for decision in decisions {
            match decision {
                Decision::Create { key, record } => {
                    self.create(key, record, &mut pending, &mut log, errors).await
                }
                Decision::Update {
                    key,
                    target_id,
                    changes,
                } => {
                    self.update(key, target_id, changes, &mut pending, &mut log, errors)
                        .await
                }
                Decision::Delete { key, target_id } => {
                    self.delete(key, target_id, &mut log, errors).await
                }
                Decision::Unchanged { .. } => {}
            }
        }

        if !pending.is_empty() {
            self.link(pending, &mut log, errors).await;
        }

        log.push(format!(
            "{} in Service Catalogue processed: {}",
            self.config.kind.title(),
            log.change_count()
        ));
        log
    }

    async fn create(
        &self,
        key: &str,
        record: &EntityRecord,
        pending: &mut Vec<PendingLink>,
        log: &mut ChangeLog,
        errors: &mut ErrorCollector,
    ) {
        let label = self.config.kind.label();
        let mut unresolved = Vec::new();
        let payload = self.payload(key, record.iter(), &mut unresolved, errors);

        if self.dry_run {
            log.push_change(format!("[dry-run] Would add {} {}: {}", label, key, record.summary()));
            return;
        }

        match self.catalogue.create(self.config.kind, &payload).await {
            Ok(created) => {
                let id = created.target_id().unwrap_or_default();
                log.push_change(format!("Added {} {} ({}): {}", label, key, id, record.summary()));
                pending.extend(unresolved.into_iter().map(|(field, name)| PendingLink {
                    key: key.to_string(),
                    target_id: id.clone(),
                    field,
                    name,
                }));
            }
            Err(e) => self.failed("add", key, &e, log, errors),
        }
    }

    async fn update(
        &self,
        key: &str,
        target_id: &str,
        changes: &[FieldChange],
        pending: &mut Vec<PendingLink>,
        log: &mut ChangeLog,
        errors: &mut ErrorCollector,
    ) {
        let label = self.config.kind.label();
        let mut unresolved = Vec::new();
        let payload = self.payload(
            key,
            changes.iter().map(|c| (c.field.as_str(), &c.after)),
            &mut unresolved,
            errors,
        );
        if !self.dry_run {
            pending.extend(unresolved.into_iter().map(|(field, name)| PendingLink {
                key: key.to_string(),
                target_id: target_id.to_string(),
                field,
                name,
            }));
        }

        // Only the key survived reference resolution
        if payload.len() <= 1 {
            if pending.iter().all(|link| link.key != key) {
                log::warn!(
                    "Nothing left to update on {} {} after dropping unresolved references",
                    label,
                    key
                );
            }
            return;
        }

        let description = changes
            .iter()
            .filter(|c| payload.contains_key(&c.field))
            .map(|c| format!("{} '{}' -> '{}'", c.field, c.before, c.after))
            .collect::<Vec<_>>()
            .join(", ");

        if self.dry_run {
            log.push_change(format!("[dry-run] Would update {} {}: {}", label, key, description));
            return;
        }

        match self.catalogue.update(self.config.kind, target_id, &payload).await {
            Ok(()) => log.push_change(format!("Updated {} {}: {}", label, key, description)),
            Err(e) => self.failed("update", key, &e, log, errors),
        }
    }

    async fn delete(
        &self,
        key: &str,
        target_id: &str,
        log: &mut ChangeLog,
        errors: &mut ErrorCollector,
    ) {
        let label = self.config.kind.label();

        if self.dry_run {
            log.push_change(format!("[dry-run] Would delete {} {} ({})", label, key, target_id));
            return;
        }

        match self.catalogue.delete(self.config.kind, target_id).await {
            Ok(()) => log.push_change(format!("Deleted {} {} ({})", label, key, target_id)),
            Err(e) => self.failed("delete", key, &e, log, errors),
        }
    }

    /// Write the pending same-kind references against a rebuilt index
    async fn link(
        &self,
        pending: Vec<PendingLink>,
        log: &mut ChangeLog,
        errors: &mut ErrorCollector,
    ) {
        let kind = self.config.kind;
        let label = kind.label();

        let index = match self.catalogue.fetch_all(kind).await {
            Ok(records) => ReferenceIndex::build(kind, &records, kind.display_field()),
            Err(e) => {
                errors.record(format!(
                    "Failed to refresh {} for {} pending reference(s): {:#}",
                    kind.title(),
                    pending.len(),
                    e
                ));
                return;
            }
        };

        for link in pending {
            let Some(id) = index.resolve(&link.name) else {
                let err = ResolveError::NotFound {
                    kind,
                    name: link.name.clone(),
                };
                errors.record(format!(
                    "Dropping {} on {} {}: {}",
                    link.field, label, link.key, err
                ));
                continue;
            };

            let mut payload = Map::new();
            payload.insert(
                self.config.key_field().to_string(),
                JsonValue::String(link.key.clone()),
            );
            payload.insert(link.field.clone(), JsonValue::String(id.to_string()));

            match self.catalogue.update(kind, &link.target_id, &payload).await {
                Ok(()) => log.push_change(format!(
                    "Linked {} {}: {} -> '{}'",
                    label, link.key, link.field, link.name
                )),
                Err(e) => self.failed("link", &link.key, &e, log, errors),
            }
        }
    }

    fn failed(
        &self,
        action: &str,
        key: &str,
        err: &anyhow::Error,
        log: &mut ChangeLog,
        errors: &mut ErrorCollector,
    ) {
        let line = format!(
            "Error: failed to {} {} {}: {:#}",
            action,
            self.config.kind.label(),
            key,
            err
        );
        errors.record(line.clone());
        log.push_error(line);
    }

    /// Request body with the natural key and the given fields.
    ///
    /// Reference fields are swapped for target ids. `Null` clears the
    /// relation; a name that cannot be resolved is left out and reported.
    /// Unknown names of the executor's own kind are returned in `unresolved`
    /// instead, since the record may be created later in the pass.
    fn payload<'f>(
        &self,
        key: &str,
        fields: impl Iterator<Item = (&'f str, &'f FieldValue)>,
        unresolved: &mut Vec<(String, String)>,
        errors: &mut ErrorCollector,
    ) -> Map<String, JsonValue> {
        let mut payload = Map::new();
        payload.insert(
            self.config.key_field().to_string(),
            JsonValue::String(key.to_string()),
        );

        for (field, value) in fields {
            if field == self.config.key_field() {
                continue;
            }

            let reference = self.config.relation(field).and_then(|r| r.reference);
            let json = match (reference, value) {
                (Some(_), FieldValue::Null) | (None, _) => value.to_json(),
                (Some(kind), value) => {
                    let name = value.to_string();
                    match self.indexes.resolve(kind, &name) {
                        Ok(id) => JsonValue::String(id),
                        Err(ResolveError::NotFound { .. }) if kind == self.config.kind => {
                            unresolved.push((field.to_string(), name));
                            continue;
                        }
                        Err(e) => {
                            errors.record(format!(
                                "Dropping {} on {} {}: {}",
                                field,
                                self.config.kind.label(),
                                key,
                                e
                            ));
                            continue;
                        }
                    }
                }
            };
            payload.insert(field.to_string(), json);
        }

        payload
    }
}
