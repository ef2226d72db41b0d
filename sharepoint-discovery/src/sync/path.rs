//! Dotted paths into a SharePoint list item's field bag

use serde_json::{Map, Value as JsonValue};

/// Path to a value inside a field bag.
///
/// `"Team"` reads `fields["Team"]`; `"gDriveLink.Url"` reads
/// `fields["gDriveLink"]["Url"]` for hyperlink columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

/// Outcome of walking a path
#[derive(Debug, PartialEq)]
pub enum PathLookup<'a> {
    /// Value found (may be JSON null)
    Found(&'a JsonValue),
    /// Some segment is absent
    Missing,
    /// An intermediate segment is not an object
    NotAnObject { segment: String },
}

/// Resolve a path against a field bag
pub fn resolve_path<'a>(fields: &'a Map<String, JsonValue>, path: &FieldPath) -> PathLookup<'a> {
    let Some((first, rest)) = path.segments().split_first() else {
        return PathLookup::Missing;
    };

    let Some(mut current) = fields.get(first) else {
        return PathLookup::Missing;
    };

    let mut walked = first.as_str();
    for segment in rest {
        let Some(obj) = current.as_object() else {
            // A null column simply has no nested value
            if current.is_null() {
                return PathLookup::Missing;
            }
            return PathLookup::NotAnObject {
                segment: walked.to_string(),
            };
        };
        match obj.get(segment) {
            Some(val) => current = val,
            None => return PathLookup::Missing,
        }
        walked = segment.as_str();
    }

    PathLookup::Found(current)
}
