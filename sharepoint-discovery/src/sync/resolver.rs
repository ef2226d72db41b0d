//! Reference resolution: display name -> catalogue identifier
//!
//! SharePoint expresses relations as list-internal lookup ids, which the
//! extractor turns into display names. The catalogue wants its own record
//! identifiers. A [`ReferenceIndex`] is built per run from the catalogue's
//! current records of the referenced kind and thrown away afterwards, since
//! catalogue ids are not stable across runs.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::entity::EntityKind;
use super::ports::CatalogueRecord;
use super::value::normalize_str;

/// Name -> target id lookup for one entity kind
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    kind: Option<EntityKind>,
    table: HashMap<String, String>,
}

impl ReferenceIndex {
    /// Build an index from catalogue records.
    ///
    /// Names are normalized (entity-decoded, trimmed). When two records share
    /// a name the later one wins and a warning is logged.
    pub fn build(kind: EntityKind, records: &[CatalogueRecord], name_field: &str) -> Self {
        let mut table: HashMap<String, String> = HashMap::new();
        let mut duplicate_count = 0usize;

        for record in records {
            let Some(target_id) = record.target_id() else {
                continue;
            };
            let Some(JsonValue::String(name)) = record.get(name_field) else {
                continue;
            };

            let normalized = normalize_str(name);
            if normalized.is_empty() {
                continue;
            }

            if let Some(previous) = table.insert(normalized.clone(), target_id.clone()) {
                duplicate_count += 1;
                log::warn!(
                    "Ambiguous {} name '{}': {} replaces {} (last one wins)",
                    kind.label(),
                    normalized,
                    target_id,
                    previous
                );
            }
        }

        if duplicate_count > 0 {
            log::warn!(
                "Reference index for {} has {} duplicate names in field '{}'",
                kind,
                duplicate_count,
                name_field
            );
        }

        log::debug!(
            "Reference index for {} built with {} unique names",
            kind,
            table.len()
        );

        Self {
            kind: Some(kind),
            table,
        }
    }

    /// Exact match after normalization
    pub fn resolve(&self, display_name: &str) -> Option<&str> {
        let normalized = normalize_str(display_name);
        if normalized.is_empty() {
            return None;
        }
        self.table.get(&normalized).map(|id| id.as_str())
    }

    pub fn kind(&self) -> Option<EntityKind> {
        self.kind
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// The indices available during one entity sync, keyed by referenced kind
#[derive(Debug, Default)]
pub struct ReferenceIndexes {
    indexes: HashMap<EntityKind, ReferenceIndex>,
}

/// Why a reference could not be resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No index was built for the referenced kind
    NoIndex { kind: EntityKind },
    /// The name is not in the index
    NotFound { kind: EntityKind, name: String },
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NoIndex { kind } => {
                write!(f, "no reference index available for {}", kind)
            }
            ResolveError::NotFound { kind, name } => {
                write!(f, "no {} named '{}' in the Service Catalogue", kind.label(), name)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

impl ReferenceIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: ReferenceIndex) {
        if let Some(kind) = index.kind() {
            self.indexes.insert(kind, index);
        }
    }

    pub fn get(&self, kind: EntityKind) -> Option<&ReferenceIndex> {
        self.indexes.get(&kind)
    }

    /// Resolve a display name of the given kind to its target id
    pub fn resolve(&self, kind: EntityKind, display_name: &str) -> Result<String, ResolveError> {
        let index = self.get(kind).ok_or(ResolveError::NoIndex { kind })?;
        index
            .resolve(display_name)
            .map(|id| id.to_string())
            .ok_or_else(|| ResolveError::NotFound {
                kind,
                name: normalize_str(display_name),
            })
    }
}
