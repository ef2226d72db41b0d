//! Scalar field values and their canonical form
//!
//! Both SharePoint and the Service Catalogue hand us loosely typed JSON.
//! Everything that takes part in a comparison is first squeezed into a
//! [`FieldValue`] and normalized, so that `Alpha &amp; Beta ` on one side and
//! `Alpha & Beta` on the other compare equal.

use serde::{Deserialize, Serialize};

/// A normalized scalar held by an entity record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Null/empty value
    #[default]
    Null,
    /// Boolean (yes/no column)
    Bool(bool),
    /// Whole number
    Int(i64),
    /// Text value
    String(String),
}

impl FieldValue {
    /// Parse from a JSON scalar.
    ///
    /// Returns `None` for arrays and objects, which are not scalars.
    pub fn from_json(json: &serde_json::Value) -> Option<Self> {
        let value = match json {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        FieldValue::Int(f as i64)
                    } else {
                        FieldValue::String(f.to_string())
                    }
                } else {
                    FieldValue::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => FieldValue::String(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => return None,
        };
        Some(value)
    }

    /// Convert to JSON value for API calls
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::json!(*i),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Coerce to a boolean the way SharePoint yes/no columns are read.
    ///
    /// `Null` is `false`; strings that are not boolean-like yield `None`.
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Null => Some(false),
            FieldValue::Bool(b) => Some(*b),
            FieldValue::Int(i) => Some(*i != 0),
            FieldValue::String(s) => parse_bool_like(s),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "(null)"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

/// Parse "yes"/"no"/"true"/"false"/"1"/"0", case-insensitive
pub fn parse_bool_like(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "y" => Some(true),
        "no" | "false" | "0" | "n" | "" => Some(false),
        _ => None,
    }
}

/// Canonicalize a value for comparison.
///
/// Strings are HTML-entity decoded (full HTML5 table) and trimmed until
/// nothing changes, so the result is a fixed point; other scalars pass
/// through untouched.
pub fn normalize(value: &FieldValue) -> FieldValue {
    match value {
        FieldValue::String(s) => FieldValue::String(normalize_str(s)),
        other => other.clone(),
    }
}

/// String half of [`normalize`]
pub fn normalize_str(s: &str) -> String {
    let mut current = s.trim().to_string();
    loop {
        // Every decode that changes the string removes at least one '&'
        let next = html_escape::decode_html_entities(&current).trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Comparison rules for one field
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareRules {
    /// Field holds a yes/no value; compare after boolean coercion
    pub boolean: bool,
    /// Treat an empty string and null as the same value
    pub blank_is_null: bool,
}

/// Whether two values are equal for diffing purposes
pub fn values_equal(a: &FieldValue, b: &FieldValue, rules: CompareRules) -> bool {
    let a = normalize(a);
    let b = normalize(b);

    if rules.boolean {
        if let (Some(x), Some(y)) = (a.coerce_bool(), b.coerce_bool()) {
            return x == y;
        }
    }

    if rules.blank_is_null {
        return blank_to_null(a) == blank_to_null(b);
    }

    a == b
}

fn blank_to_null(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::String(s) if s.is_empty() => FieldValue::Null,
        other => other,
    }
}
