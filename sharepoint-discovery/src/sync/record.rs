//! Normalized entity records shared by the extractor, diff engine and executor

use super::value::FieldValue;

/// An entity record: ordered field name -> normalized value.
///
/// Field order follows the entity's field map so payloads and change log
/// lines come out in a stable, readable order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityRecord {
    fields: Vec<(String, FieldValue)>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, keeping its original position on replace
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        let field = field.into();
        match self.fields.iter_mut().find(|(name, _)| *name == field) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((field, value)),
        }
    }

    /// Builder-style [`set`](Self::set)
    #[cfg(test)]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    #[cfg(test)]
    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Natural key value as a string, if the key field holds a usable value
    pub fn key(&self, key_field: &str) -> Option<String> {
        match self.get(key_field)? {
            FieldValue::String(s) if !s.is_empty() => Some(s.clone()),
            FieldValue::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Compact `field=value` rendering for log lines
    pub fn summary(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A record currently held by the catalogue, addressed by its target id
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRecord {
    /// Natural key
    pub key: String,
    /// Target-system identifier used for update/delete calls
    pub target_id: String,
    /// Normalized fields, relations rendered as display names
    pub record: EntityRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut record = EntityRecord::new().with("t_id", "T1").with("name", "Alpha");
        record.set("t_id", FieldValue::from("T2"));

        let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["t_id", "name"]);
        assert_eq!(record.key("t_id"), Some("T2".to_string()));
    }

    #[test]
    fn test_key_rejects_blank_and_null() {
        let blank = EntityRecord::new().with("t_id", "");
        assert_eq!(blank.key("t_id"), None);

        let null = EntityRecord::new().with("t_id", FieldValue::Null);
        assert_eq!(null.key("t_id"), None);

        let numeric = EntityRecord::new().with("t_id", 42i64);
        assert_eq!(numeric.key("t_id"), Some("42".to_string()));
    }

    #[test]
    fn test_summary_keeps_field_order() {
        let record = EntityRecord::new()
            .with("p_id", "DPS1")
            .with("subproduct", false)
            .with("parent", FieldValue::Null);

        assert_eq!(record.summary(), "p_id=DPS1, subproduct=false, parent=(null)");
    }
}
