//! Diff engine: source records vs. catalogue records -> decisions
//!
//! Both sides are matched by natural key. Only fields present on both sides
//! are compared, so a field the extractor deliberately omitted never shows up
//! as a change. Decisions come out in source order, then deletions in target
//! order, which keeps change logs deterministic from run to run.

use std::collections::{HashMap, HashSet};

use super::entity::EntityConfig;
use super::record::{EntityRecord, TargetRecord};
use super::value::{FieldValue, values_equal};

/// One changed field on an update
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub before: FieldValue,
    pub after: FieldValue,
}

/// What to do with one natural key
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Key is only in the source
    Create { key: String, record: EntityRecord },
    /// Key is on both sides and at least one compared field differs
    Update {
        key: String,
        target_id: String,
        changes: Vec<FieldChange>,
    },
    /// Key is on both sides and nothing differs
    Unchanged { key: String },
    /// Key is only in the catalogue and not protected
    Delete { key: String, target_id: String },
}

#[cfg(test)]
impl Decision {
    pub fn key(&self) -> &str {
        match self {
            Decision::Create { key, .. }
            | Decision::Update { key, .. }
            | Decision::Unchanged { key }
            | Decision::Delete { key, .. } => key,
        }
    }

    /// Whether executing this decision mutates the catalogue
    pub fn is_change(&self) -> bool {
        !matches!(self, Decision::Unchanged { .. })
    }
}

/// Decision counts for log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub create: usize,
    pub update: usize,
    pub unchanged: usize,
    pub delete: usize,
}

impl DiffSummary {
    pub fn of(decisions: &[Decision]) -> Self {
        let mut summary = Self::default();
        for decision in decisions {
            match decision {
                Decision::Create { .. } => summary.create += 1,
                Decision::Update { .. } => summary.update += 1,
                Decision::Unchanged { .. } => summary.unchanged += 1,
                Decision::Delete { .. } => summary.delete += 1,
            }
        }
        summary
    }

    pub fn changes(&self) -> usize {
        self.create + self.update + self.delete
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} create, {} update, {} unchanged, {} delete",
            self.create, self.update, self.unchanged, self.delete
        )
    }
}

/// Compute the decisions that converge the catalogue onto the source
pub fn diff(source: &[EntityRecord], target: &[TargetRecord], config: &EntityConfig) -> Vec<Decision> {
    let key_field = config.key_field();

    // Source: first occurrence fixes the order, last occurrence supplies the values
    let mut source_order: Vec<String> = Vec::with_capacity(source.len());
    let mut source_index: HashMap<String, &EntityRecord> = HashMap::with_capacity(source.len());
    for record in source {
        let Some(key) = record.key(key_field) else {
            log::warn!(
                "Ignoring {} source record without {}: {}",
                config.kind.label(),
                key_field,
                record.summary()
            );
            continue;
        };
        if source_index.insert(key.clone(), record).is_some() {
            log::warn!(
                "Duplicate {} {} '{}' in source records, using the later one",
                config.kind.label(),
                key_field,
                key
            );
        } else {
            source_order.push(key);
        }
    }

    let mut target_index: HashMap<&str, &TargetRecord> = HashMap::with_capacity(target.len());
    for record in target {
        if target_index.contains_key(record.key.as_str()) {
            log::warn!(
                "Duplicate {} {} '{}' in the Service Catalogue (id {}), ignoring it",
                config.kind.label(),
                key_field,
                record.key,
                record.target_id
            );
            continue;
        }
        target_index.insert(record.key.as_str(), record);
    }

    let mut decisions = Vec::with_capacity(source_order.len() + target.len());

    for key in &source_order {
        let record = source_index[key];
        let decision = match target_index.get(key.as_str()) {
            None => {
                log::debug!("{} {}: not in the Service Catalogue, create", config.kind.label(), key);
                Decision::Create {
                    key: key.clone(),
                    record: record.clone(),
                }
            }
            Some(existing) => {
                let changes = diff_fields(record, &existing.record, config);
                if changes.is_empty() {
                    Decision::Unchanged { key: key.clone() }
                } else {
                    log::debug!(
                        "{} {}: {} field(s) changed, update",
                        config.kind.label(),
                        key,
                        changes.len()
                    );
                    Decision::Update {
                        key: key.clone(),
                        target_id: existing.target_id.clone(),
                        changes,
                    }
                }
            }
        };
        decisions.push(decision);
    }

    let mut seen_deletes: HashSet<&str> = HashSet::new();
    for record in target {
        if source_index.contains_key(&record.key) || !seen_deletes.insert(record.key.as_str()) {
            continue;
        }
        if config.protected.is_protected(&record.key) {
            log::debug!(
                "{} {}: absent from source but protected, keeping",
                config.kind.label(),
                record.key
            );
            continue;
        }
        decisions.push(Decision::Delete {
            key: record.key.clone(),
            target_id: record.target_id.clone(),
        });
    }

    log::info!(
        "Diff for {}: {}",
        config.kind.title(),
        DiffSummary::of(&decisions)
    );

    decisions
}

/// Changed fields between a source record and its catalogue counterpart
pub fn diff_fields(source: &EntityRecord, target: &EntityRecord, config: &EntityConfig) -> Vec<FieldChange> {
    let key_field = config.key_field();

    source
        .iter()
        .filter(|(field, _)| *field != key_field && !config.immutable.iter().any(|f| f == field))
        .filter_map(|(field, after)| {
            let Some(before) = target.get(field) else {
                log::debug!(
                    "{} has no '{}' in the Service Catalogue, not compared",
                    config.kind.label(),
                    field
                );
                return None;
            };
            if values_equal(before, after, config.compare_rules(field)) {
                None
            } else {
                Some(FieldChange {
                    field: field.to_string(),
                    before: before.clone(),
                    after: after.clone(),
                })
            }
        })
        .collect()
}
