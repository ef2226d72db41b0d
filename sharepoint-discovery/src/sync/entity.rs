//! Declarative per-entity configuration
//!
//! One [`EntityConfig`] describes everything the shared engine needs to know
//! about an entity type: where its source list lives, how each catalogue field
//! is pulled out of a list item, which fields are relations, which fields are
//! never compared and which keys are never deleted.

use regex::Regex;

use super::path::FieldPath;
use super::value::CompareRules;

/// The entity types mirrored into the catalogue, in processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum EntityKind {
    #[value(name = "teams")]
    Team,
    #[value(name = "product-sets")]
    ProductSet,
    #[value(name = "service-areas")]
    ServiceArea,
    #[value(name = "products")]
    Product,
}

impl EntityKind {
    /// All kinds in dependency order: products reference the other three
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Team,
        EntityKind::ProductSet,
        EntityKind::ServiceArea,
        EntityKind::Product,
    ];

    /// Catalogue collection endpoint
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Team => "teams",
            Self::ProductSet => "product-sets",
            Self::ServiceArea => "service-areas",
            Self::Product => "products",
        }
    }

    /// Extra query needed when reading the collection (relations are not
    /// returned by Strapi unless populated)
    pub fn read_query(&self) -> Option<&'static str> {
        match self {
            Self::Product => Some("populate=*"),
            _ => None,
        }
    }

    /// Field other records use to refer to this entity by name
    pub fn display_field(&self) -> &'static str {
        "name"
    }

    /// Singular label for change log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::ProductSet => "product set",
            Self::ServiceArea => "service area",
            Self::Product => "product",
        }
    }

    /// Plural title for banners and summaries
    pub fn title(&self) -> &'static str {
        match self {
            Self::Team => "Teams",
            Self::ProductSet => "Product Sets",
            Self::ServiceArea => "Service Areas",
            Self::Product => "Products",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

/// Scalar conversion applied after reading a source value
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Transform {
    /// Keep the value as read
    #[default]
    None,
    /// Yes/no column; absent means `false`
    YesNo,
    /// `true` when the value equals the literal (case-insensitive), else `false`
    Equals(String),
}

impl Transform {
    pub fn is_boolean(&self) -> bool {
        !matches!(self, Transform::None)
    }
}

/// What to do when the source value is absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Absent becomes null
    #[default]
    Nullable,
    /// Absent or null leaves the field out of the record entirely
    OmitIfNull,
    /// Absent is an extraction failure for the entry
    Required,
}

/// How one catalogue field is read from a list item
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub target: String,
    pub source: FieldPath,
    pub transform: Transform,
    pub presence: Presence,
}

impl FieldMapping {
    pub fn new(target: &str, source: &str) -> Self {
        Self {
            target: target.to_string(),
            source: FieldPath::parse(source),
            transform: Transform::None,
            presence: Presence::Nullable,
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }
}

/// A field whose source value is a lookup id into another SharePoint list
#[derive(Debug, Clone)]
pub struct RelationMapping {
    /// Catalogue field to populate
    pub target: String,
    /// Field on the list item holding the source-internal lookup id
    pub lookup_id: String,
    /// SharePoint list the id points into
    pub lookup_list: String,
    /// Path of the display value inside the looked-up item
    pub display: FieldPath,
    /// Field of the looked-up items the lookup id is matched against;
    /// `None` matches the item id
    pub lookup_key: Option<FieldPath>,
    /// When set, the display value names a catalogue entity of this kind and
    /// must be swapped for its target id before it is sent
    pub reference: Option<EntityKind>,
}

impl RelationMapping {
    /// Relation flattened to a display string (people columns)
    pub fn lookup(target: &str, lookup_id: &str, lookup_list: &str, display: &str) -> Self {
        Self {
            target: target.to_string(),
            lookup_id: lookup_id.to_string(),
            lookup_list: lookup_list.to_string(),
            display: FieldPath::parse(display),
            lookup_key: None,
            reference: None,
        }
    }

    /// Match lookup ids against a field of the looked-up items
    pub fn keyed_by(mut self, path: &str) -> Self {
        self.lookup_key = Some(FieldPath::parse(path));
        self
    }

    /// Relation resolved to a catalogue entity
    pub fn reference(
        target: &str,
        lookup_id: &str,
        lookup_list: &str,
        display: &str,
        kind: EntityKind,
    ) -> Self {
        Self {
            reference: Some(kind),
            ..Self::lookup(target, lookup_id, lookup_list, display)
        }
    }
}

/// Marks source entries that are decommissioned and must not be mirrored
#[derive(Debug, Clone)]
pub struct RetiredFlag {
    pub field: String,
    /// Values (case-insensitive) that mean retired, besides boolean true
    pub values: Vec<String>,
}

/// Keys that are never deleted from the catalogue even when absent at source
#[derive(Debug, Clone, Default)]
pub struct ProtectedKeys {
    pub prefixes: Vec<String>,
}

impl ProtectedKeys {
    pub fn prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_protected(&self, key: &str) -> bool {
        self.prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// Everything the engine needs for one entity type
#[derive(Debug, Clone)]
pub struct EntityConfig {
    pub kind: EntityKind,
    /// SharePoint list holding the source entries
    pub source_list: String,
    /// Natural key mapping
    pub key: FieldMapping,
    /// Accepted natural key format; mismatches are reported, not rejected
    pub key_pattern: Option<Regex>,
    pub fields: Vec<FieldMapping>,
    pub relations: Vec<RelationMapping>,
    pub retired: Option<RetiredFlag>,
    /// Audit/internal fields never compared
    pub immutable: Vec<String>,
    pub protected: ProtectedKeys,
    /// Treat empty strings and nulls as equal when comparing
    pub blank_is_null: bool,
}

impl EntityConfig {
    pub fn key_field(&self) -> &str {
        &self.key.target
    }

    /// Comparison rules for a field
    pub fn compare_rules(&self, field: &str) -> CompareRules {
        CompareRules {
            boolean: self
                .fields
                .iter()
                .any(|f| f.target == field && f.transform.is_boolean()),
            blank_is_null: self.blank_is_null,
        }
    }

    /// Kinds whose target records are needed to resolve references
    pub fn referenced_kinds(&self) -> Vec<EntityKind> {
        let mut kinds: Vec<EntityKind> =
            self.relations.iter().filter_map(|r| r.reference).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Relation mapping for a catalogue field, if it is one
    pub fn relation(&self, field: &str) -> Option<&RelationMapping> {
        self.relations.iter().find(|r| r.target == field)
    }
}
