//! Record extraction: SharePoint list items -> normalized entity records
//!
//! Applies an [`EntityConfig`]'s field map and relation mappings to each list
//! item. Incomplete drafts (no natural key) and retired entries are skipped
//! quietly; an entry that cannot be read is logged with its key, recorded in
//! the error collector and skipped. One bad entry never stops the batch.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::entity::{EntityConfig, FieldMapping, Presence, RelationMapping, Transform};
use super::path::{PathLookup, resolve_path};
use super::ports::{CatalogueRecord, ListItem, LookupTable};
use super::record::{EntityRecord, TargetRecord};
use super::report::ErrorCollector;
use super::value::{FieldValue, normalize, normalize_str, parse_bool_like};

/// Source lookup tables keyed by the relation's catalogue field
pub type SourceLookups = HashMap<String, LookupTable>;

/// Why a single list item could not be extracted
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractError {
    /// A required field is absent
    MissingField { field: String },
    /// A path walked through a value that is not an object
    NotAnObject { path: String, segment: String },
    /// The value is an array or object where a scalar was expected
    NotScalar { field: String },
    /// A yes/no field holds something that is neither
    NotBoolean { field: String, value: String },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::MissingField { field } => {
                write!(f, "required field '{}' is missing", field)
            }
            ExtractError::NotAnObject { path, segment } => write!(
                f,
                "cannot read '{}': '{}' is not an object",
                path, segment
            ),
            ExtractError::NotScalar { field } => {
                write!(f, "field '{}' is not a scalar value", field)
            }
            ExtractError::NotBoolean { field, value } => {
                write!(f, "field '{}' has non yes/no value '{}'", field, value)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extract records from a batch of list items.
///
/// The result holds at most one record per natural key; a later duplicate
/// replaces the earlier one in place and a warning is logged.
pub fn extract(
    entries: &[ListItem],
    config: &EntityConfig,
    lookups: &SourceLookups,
    errors: &mut ErrorCollector,
) -> Vec<EntityRecord> {
    let key_field = config.key_field();
    let mut records: Vec<EntityRecord> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut skipped = 0usize;

    for entry in entries {
        let record = match extract_entry(entry, config, lookups) {
            Ok(Some(record)) => record,
            Ok(None) => {
                skipped += 1;
                continue;
            }
            Err(err) => {
                let key = entry_key(entry, &config.key)
                    .unwrap_or_else(|| format!("item {}", entry.id));
                errors.record(format!(
                    "Skipping {} {} from SharePoint list '{}': {}",
                    config.kind.label(),
                    key,
                    config.source_list,
                    err
                ));
                skipped += 1;
                continue;
            }
        };

        // extract_entry only returns records that carry a key
        let Some(key) = record.key(key_field) else {
            continue;
        };

        if let Some(pattern) = &config.key_pattern {
            if !pattern.is_match(&key) {
                // Reported but still synced
                errors.record(format!(
                    "Invalid {} {} '{}' in SharePoint list '{}'",
                    config.kind.label(),
                    key_field,
                    key,
                    config.source_list
                ));
            }
        }

        match positions.get(&key) {
            Some(&idx) => {
                log::warn!(
                    "Duplicate {} {} '{}' in SharePoint list '{}', using the later entry",
                    config.kind.label(),
                    key_field,
                    key,
                    config.source_list
                );
                records[idx] = record;
            }
            None => {
                positions.insert(key, records.len());
                records.push(record);
            }
        }
    }

    log::info!(
        "Extracted {} {} records from '{}' ({} skipped)",
        records.len(),
        config.kind.label(),
        config.source_list,
        skipped
    );

    records
}

/// Extract one list item.
///
/// `Ok(None)` means the item is deliberately left out: it has no natural key
/// yet, or it is flagged as retired.
pub fn extract_entry(
    entry: &ListItem,
    config: &EntityConfig,
    lookups: &SourceLookups,
) -> Result<Option<EntityRecord>, ExtractError> {
    let key = match read_scalar(entry, &config.key)? {
        Some(value) => match normalize(&value) {
            FieldValue::String(s) if !s.is_empty() => s,
            FieldValue::Int(i) => i.to_string(),
            _ => String::new(),
        },
        None => String::new(),
    };

    if key.is_empty() {
        log::debug!(
            "Item {} in '{}' has no {}, treating as draft",
            entry.id,
            config.source_list,
            config.key_field()
        );
        return Ok(None);
    }

    if is_retired(entry, config) {
        log::info!(
            "Skipping retired {} {} from '{}'",
            config.kind.label(),
            key,
            config.source_list
        );
        return Ok(None);
    }

    let mut record = EntityRecord::new();
    record.set(config.key_field(), FieldValue::String(key));

    for mapping in &config.fields {
        if let Some(value) = read_field(entry, mapping)? {
            record.set(mapping.target.clone(), value);
        }
    }

    for relation in &config.relations {
        let value = read_relation(entry, relation, lookups)?;
        record.set(relation.target.clone(), value);
    }

    Ok(Some(record))
}

/// Natural key of an item for log lines, if readable
fn entry_key(entry: &ListItem, key: &FieldMapping) -> Option<String> {
    match read_scalar(entry, key).ok()?? {
        FieldValue::String(s) if !s.trim().is_empty() => Some(normalize_str(&s)),
        FieldValue::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

/// Read a mapping's raw scalar; `None` when absent
fn read_scalar(entry: &ListItem, mapping: &FieldMapping) -> Result<Option<FieldValue>, ExtractError> {
    match resolve_path(&entry.fields, &mapping.source) {
        PathLookup::Missing => Ok(None),
        PathLookup::NotAnObject { segment } => Err(ExtractError::NotAnObject {
            path: mapping.source.to_string(),
            segment,
        }),
        PathLookup::Found(json) => FieldValue::from_json(json)
            .map(Some)
            .ok_or_else(|| ExtractError::NotScalar {
                field: mapping.target.clone(),
            }),
    }
}

/// Read a mapped field; `None` when the field is omitted from the record
fn read_field(entry: &ListItem, mapping: &FieldMapping) -> Result<Option<FieldValue>, ExtractError> {
    let raw = read_scalar(entry, mapping)?.map(|v| normalize(&v));

    match &mapping.transform {
        Transform::None => match (raw, mapping.presence) {
            (None | Some(FieldValue::Null), Presence::Required) => {
                Err(ExtractError::MissingField {
                    field: mapping.source.to_string(),
                })
            }
            (None | Some(FieldValue::Null), Presence::OmitIfNull) => Ok(None),
            (None, Presence::Nullable) => Ok(Some(FieldValue::Null)),
            (Some(value), _) => Ok(Some(value)),
        },
        // Absent yes/no columns read as false
        Transform::YesNo => {
            let value = raw.unwrap_or(FieldValue::Null);
            match value.coerce_bool() {
                Some(b) => Ok(Some(FieldValue::Bool(b))),
                None => Err(ExtractError::NotBoolean {
                    field: mapping.target.clone(),
                    value: value.to_string(),
                }),
            }
        }
        Transform::Equals(expected) => {
            let matched = match raw {
                Some(FieldValue::String(s)) => s.eq_ignore_ascii_case(expected),
                _ => false,
            };
            Ok(Some(FieldValue::Bool(matched)))
        }
    }
}

/// Follow a lookup id into its list and read the display value.
///
/// An absent id, an id with no matching item, or an item without the display
/// field all give `Null`.
fn read_relation(
    entry: &ListItem,
    relation: &RelationMapping,
    lookups: &SourceLookups,
) -> Result<FieldValue, ExtractError> {
    let lookup_id = match entry.fields.get(&relation.lookup_id) {
        None | Some(JsonValue::Null) => return Ok(FieldValue::Null),
        Some(JsonValue::String(s)) => s.trim().to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(_) => {
            return Err(ExtractError::NotScalar {
                field: relation.lookup_id.clone(),
            });
        }
    };

    if lookup_id.is_empty() {
        return Ok(FieldValue::Null);
    }

    let Some(target_item) = lookups
        .get(&relation.target)
        .and_then(|table| table.get(&lookup_id))
    else {
        log::debug!(
            "Lookup id {} for '{}' not found in '{}'",
            lookup_id,
            relation.target,
            relation.lookup_list
        );
        return Ok(FieldValue::Null);
    };

    match resolve_path(&target_item.fields, &relation.display) {
        PathLookup::Found(json) => match FieldValue::from_json(json) {
            Some(value) => Ok(normalize(&value)),
            None => Err(ExtractError::NotScalar {
                field: relation.target.clone(),
            }),
        },
        PathLookup::Missing => Ok(FieldValue::Null),
        PathLookup::NotAnObject { segment } => Err(ExtractError::NotAnObject {
            path: relation.display.to_string(),
            segment,
        }),
    }
}

/// Normalize catalogue records into the same shape the extractor produces.
///
/// Only mapped fields are kept. Relation fields are rendered as the related
/// record's display name so they compare against extracted display values.
/// Records with no natural key or no target id are skipped with a warning.
pub fn target_records(records: &[CatalogueRecord], config: &EntityConfig) -> Vec<TargetRecord> {
    let key_field = config.key_field();
    let mut out = Vec::with_capacity(records.len());

    for catalogue_record in records {
        let Some(target_id) = catalogue_record.target_id() else {
            log::warn!(
                "Skipping {} record without an id in the Service Catalogue",
                config.kind.label()
            );
            continue;
        };

        let mut record = EntityRecord::new();
        let mapped = std::iter::once(key_field).chain(config.fields.iter().map(|f| f.target.as_str()));
        for field in mapped {
            match catalogue_record.get(field).map(FieldValue::from_json) {
                Some(Some(value)) => record.set(field, normalize(&value)),
                Some(None) => log::debug!(
                    "Ignoring non-scalar '{}' on {} {}",
                    field,
                    config.kind.label(),
                    target_id
                ),
                None => {}
            }
        }

        for relation in &config.relations {
            if let Some(json) = catalogue_record.get(&relation.target) {
                record.set(relation.target.clone(), relation_display(json));
            }
        }

        let Some(key) = record.key(key_field) else {
            log::warn!(
                "Skipping {} {} in the Service Catalogue: no {}",
                config.kind.label(),
                target_id,
                key_field
            );
            continue;
        };

        out.push(TargetRecord {
            key,
            target_id,
            record,
        });
    }

    out
}

/// Display value of a relation as the catalogue returns it.
///
/// Handles plain scalars, populated Strapi 5 objects (`{name: ..}`) and
/// Strapi 4 envelopes (`{data: {attributes: {name: ..}}}` or `{data: null}`).
fn relation_display(json: &JsonValue) -> FieldValue {
    match json {
        JsonValue::Object(obj) => {
            if let Some(data) = obj.get("data") {
                return relation_display(data);
            }
            match obj.get("attributes") {
                Some(JsonValue::Object(attributes)) => display_name(attributes),
                _ => display_name(obj),
            }
        }
        JsonValue::Array(items) => items.first().map(relation_display).unwrap_or_default(),
        scalar => FieldValue::from_json(scalar)
            .map(|v| normalize(&v))
            .unwrap_or_default(),
    }
}

fn display_name(obj: &serde_json::Map<String, JsonValue>) -> FieldValue {
    match obj.get("name").and_then(FieldValue::from_json) {
        Some(value) => normalize(&value),
        None => FieldValue::Null,
    }
}

fn is_retired(entry: &ListItem, config: &EntityConfig) -> bool {
    let Some(flag) = &config.retired else {
        return false;
    };
    let Some(value) = entry.fields.get(&flag.field).and_then(FieldValue::from_json) else {
        return false;
    };

    match normalize(&value) {
        FieldValue::String(s) => {
            flag.values.iter().any(|v| v.eq_ignore_ascii_case(&s))
                || parse_bool_like(&s) == Some(true)
        }
        other => other.coerce_bool() == Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::entities;
    use crate::sync::ports::{lookup_table, lookup_table_by};
    use serde_json::json;

    fn item(id: &str, fields: JsonValue) -> ListItem {
        ListItem::new(id, fields)
    }

    fn no_lookups() -> SourceLookups {
        SourceLookups::new()
    }

    #[test]
    fn test_extract_team() {
        let entries = vec![item("1", json!({"TeamID": "T1", "Team": " Alpha "}))];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::teams(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0], EntityRecord::new().with("t_id", "T1").with("name", "Alpha"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_entries_without_key_are_dropped_silently() {
        let entries = vec![
            item("1", json!({"Team": "Draft"})),
            item("2", json!({"TeamID": "", "Team": "Blank"})),
            item("3", json!({"TeamID": "T3", "Team": "Gamma"})),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::teams(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key("t_id"), Some("T3".to_string()));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_one_malformed_entry_does_not_stop_the_batch() {
        let mut config = entities::teams();
        config.fields.push(crate::sync::entity::FieldMapping::new("link", "Link.Url"));

        let entries = vec![
            item("1", json!({"TeamID": "T1", "Team": "A"})),
            item("2", json!({"TeamID": "T2", "Team": "B"})),
            item("3", json!({"TeamID": "T3", "Team": "C", "Link": "not-an-object"})),
            item("4", json!({"TeamID": "T4", "Team": "D"})),
            item("5", json!({"TeamID": "T5", "Team": "E"})),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &config, &no_lookups(), &mut errors);

        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.key("t_id").as_deref() != Some("T3")));
        assert_eq!(errors.len(), 1);
        assert!(errors.messages()[0].contains("T3"));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let entries = vec![
            item("1", json!({"TeamID": "T1", "Team": "First"})),
            item("2", json!({"TeamID": "T2", "Team": "Other"})),
            item("3", json!({"TeamID": "T1", "Team": "Second"})),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::teams(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name"), Some(&FieldValue::from("Second")));
        assert_eq!(records[1].key("t_id"), Some("T2".to_string()));
    }

    fn product_lookups() -> SourceLookups {
        let mut lookups = SourceLookups::new();
        lookups.insert(
            "team".to_string(),
            lookup_table(&[item("10", json!({"TeamID": "T1", "Team": "Alpha"}))]),
        );
        lookups.insert(
            "parent".to_string(),
            lookup_table(&[item("50", json!({"ProductID": "ABC1", "Product": "Parent Product"}))]),
        );
        lookups.insert(
            "lead_developer".to_string(),
            lookup_table(&[item("7", json!({"Title": "Jo Bloggs"}))]),
        );
        lookups
    }

    #[test]
    fn test_service_owner_matched_on_lookup_field() {
        let config = entities::service_areas();
        let owners = vec![item(
            "5",
            json!({"ServiceOwnerLookupId": "12", "ServiceOwnerName": "Jo Owner"}),
        )];
        let owner = config.relation("owner").unwrap();
        let mut lookups = SourceLookups::new();
        lookups.insert(
            "owner".to_string(),
            lookup_table_by(&owners, owner.lookup_key.as_ref()),
        );

        let entries = vec![
            item(
                "1",
                json!({"ServiceAreaID": "SA1", "ServiceArea": "Courts", "ServiceOwnerLookupId": "12"}),
            ),
            // Matching the item id instead would find the owner here
            item(
                "2",
                json!({"ServiceAreaID": "SA2", "ServiceArea": "Prisons", "ServiceOwnerLookupId": "5"}),
            ),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &config, &lookups, &mut errors);

        assert_eq!(records[0].get("owner"), Some(&FieldValue::from("Jo Owner")));
        assert_eq!(records[1].get("owner"), Some(&FieldValue::Null));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_extract_product_with_relations() {
        let entries = vec![item(
            "51",
            json!({
                "ProductID": "ABC2",
                "Product": "Child Product",
                "ProductType": "Subproduct",
                "ParentProductLookupId": "50",
                "TeamLookupId": 10,
                "LeadDeveloperLookupId": "7",
                "ServiceAreaLookupId": "999",
                "field_7": "Live",
            }),
        )];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &product_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        let product = &records[0];
        assert_eq!(product.get("subproduct"), Some(&FieldValue::Bool(true)));
        assert_eq!(product.get("parent"), Some(&FieldValue::from("Parent Product")));
        assert_eq!(product.get("team"), Some(&FieldValue::from("Alpha")));
        assert_eq!(product.get("lead_developer"), Some(&FieldValue::from("Jo Bloggs")));
        // Unknown lookup id and missing lookup column both become null
        assert_eq!(product.get("service_area"), Some(&FieldValue::Null));
        assert_eq!(product.get("product_set"), Some(&FieldValue::Null));
        assert_eq!(product.get("description"), Some(&FieldValue::Null));
        assert_eq!(product.get("phase"), Some(&FieldValue::from("Live")));
        // Omitted when absent
        assert!(!product.contains("slack_channel_id"));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_absent_boolean_reads_false() {
        let entries = vec![item("1", json!({"ProductID": "ABC1", "Product": "P"}))];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &no_lookups(), &mut errors);

        assert_eq!(records[0].get("subproduct"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn test_yes_no_transform() {
        let mapping = FieldMapping::new("enabled", "Enabled").transform(Transform::YesNo);

        let yes = item("1", json!({"Enabled": "Yes"}));
        assert_eq!(read_field(&yes, &mapping), Ok(Some(FieldValue::Bool(true))));

        let absent = item("2", json!({}));
        assert_eq!(read_field(&absent, &mapping), Ok(Some(FieldValue::Bool(false))));

        let junk = item("3", json!({"Enabled": "sometimes"}));
        assert!(matches!(
            read_field(&junk, &mapping),
            Err(ExtractError::NotBoolean { .. })
        ));
    }

    #[test]
    fn test_retired_products_are_excluded() {
        let entries = vec![
            item("1", json!({"ProductID": "ABC1", "Product": "Live", "Decommissioned": "No"})),
            item("2", json!({"ProductID": "ABC2", "Product": "Gone", "Decommissioned": "Yes"})),
            item("3", json!({"ProductID": "ABC3", "Product": "Gone", "Decommissioned": true})),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key("p_id"), Some("ABC1".to_string()));
    }

    #[test]
    fn test_invalid_key_format_is_reported_but_kept() {
        let entries = vec![item("1", json!({"ProductID": "bad-id", "Product": "P"}))];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors.messages()[0].contains("bad-id"));
    }

    #[test]
    fn test_required_field_missing_skips_entry() {
        let entries = vec![
            item("1", json!({"ProductID": "ABC1"})),
            item("2", json!({"ProductID": "ABC2", "Product": "Named"})),
        ];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &no_lookups(), &mut errors);

        assert_eq!(records.len(), 1);
        assert_eq!(errors.len(), 1);
        assert!(errors.messages()[0].contains("ABC1"));
    }

    #[test]
    fn test_target_records_render_relations_as_names() {
        let records = vec![
            CatalogueRecord::from_json(json!({
                "id": 1,
                "documentId": "p1",
                "p_id": "ABC1",
                "name": "Parent &amp; Co",
                "subproduct": false,
                "team": {"id": 4, "documentId": "t1", "name": "Alpha"},
                "parent": null,
                "createdAt": "2024-01-01T00:00:00Z",
            }))
            .unwrap(),
            CatalogueRecord::from_json(json!({
                "id": 2,
                "attributes": {
                    "p_id": "ABC2",
                    "name": "Child",
                    "team": {"data": {"id": 4, "attributes": {"name": "Alpha"}}},
                    "service_area": {"data": null},
                }
            }))
            .unwrap(),
        ];

        let targets = target_records(&records, &entities::products());

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].key, "ABC1");
        assert_eq!(targets[0].target_id, "p1");
        assert_eq!(targets[0].record.get("name"), Some(&FieldValue::from("Parent & Co")));
        assert_eq!(targets[0].record.get("team"), Some(&FieldValue::from("Alpha")));
        assert_eq!(targets[0].record.get("parent"), Some(&FieldValue::Null));
        assert!(!targets[0].record.contains("createdAt"));

        assert_eq!(targets[1].target_id, "2");
        assert_eq!(targets[1].record.get("team"), Some(&FieldValue::from("Alpha")));
        assert_eq!(targets[1].record.get("service_area"), Some(&FieldValue::Null));
        assert!(!targets[1].record.contains("product_set"));
    }

    #[test]
    fn test_target_records_without_key_are_skipped() {
        let records = vec![
            CatalogueRecord::from_json(json!({"documentId": "t1", "name": "No key"})).unwrap(),
            CatalogueRecord::from_json(json!({"t_id": "T2", "name": "No id"})).unwrap(),
            CatalogueRecord::from_json(json!({"documentId": "t3", "t_id": "T3", "name": "Ok"})).unwrap(),
        ];

        let targets = target_records(&records, &entities::teams());

        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].key, "T3");
    }

    #[test]
    fn test_slack_channel_kept_when_present() {
        let entries = vec![item(
            "1",
            json!({"ProductID": "ABC1", "Product": "P", "slackChannelId": "C123"}),
        )];
        let mut errors = ErrorCollector::new();

        let records = extract(&entries, &entities::products(), &no_lookups(), &mut errors);

        assert_eq!(records[0].get("slack_channel_id"), Some(&FieldValue::from("C123")));
    }
}
