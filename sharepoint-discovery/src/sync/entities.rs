//! Built-in configurations for the four mirrored entity types

use once_cell::sync::Lazy;
use regex::Regex;

use super::entity::{
    EntityConfig, EntityKind, FieldMapping, Presence, ProtectedKeys, RelationMapping,
    RetiredFlag, Transform,
};

/// SharePoint list names
pub mod lists {
    pub const TEAMS: &str = "Teams";
    pub const PRODUCT_SETS: &str = "Product Set";
    pub const SERVICE_AREAS: &str = "Service Areas";
    pub const PRODUCTS: &str = "Products and Teams Main List";
    pub const SERVICE_OWNERS: &str = "Service Owners";
    pub const DELIVERY_MANAGERS: &str = "Delivery Managers";
    pub const PRODUCT_MANAGERS: &str = "Product Managers";
    pub const LEAD_DEVELOPERS: &str = "Lead Developers";
}

static PRODUCT_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3,4}[0-9]{0,5}$").expect("static pattern is valid"));

/// Configuration for an entity kind
pub fn config_for(kind: EntityKind) -> EntityConfig {
    match kind {
        EntityKind::Team => teams(),
        EntityKind::ProductSet => product_sets(),
        EntityKind::ServiceArea => service_areas(),
        EntityKind::Product => products(),
    }
}

pub fn teams() -> EntityConfig {
    EntityConfig {
        kind: EntityKind::Team,
        source_list: lists::TEAMS.to_string(),
        key: FieldMapping::new("t_id", "TeamID"),
        key_pattern: None,
        fields: vec![FieldMapping::new("name", "Team")],
        relations: vec![],
        retired: None,
        immutable: vec![],
        protected: ProtectedKeys::default(),
        blank_is_null: false,
    }
}

pub fn product_sets() -> EntityConfig {
    EntityConfig {
        kind: EntityKind::ProductSet,
        source_list: lists::PRODUCT_SETS.to_string(),
        key: FieldMapping::new("ps_id", "ProductSetID"),
        key_pattern: None,
        fields: vec![FieldMapping::new("name", "ProductSet")],
        relations: vec![RelationMapping::lookup(
            "lead_developer",
            "LeadDeveloperLookupId",
            lists::LEAD_DEVELOPERS,
            "Title",
        )],
        retired: None,
        immutable: vec![],
        protected: ProtectedKeys::default(),
        blank_is_null: false,
    }
}

pub fn service_areas() -> EntityConfig {
    EntityConfig {
        kind: EntityKind::ServiceArea,
        source_list: lists::SERVICE_AREAS.to_string(),
        key: FieldMapping::new("sa_id", "ServiceAreaID"),
        key_pattern: None,
        fields: vec![FieldMapping::new("name", "ServiceArea")],
        // Service Owners items carry the id areas point at in their own field
        relations: vec![
            RelationMapping::lookup(
                "owner",
                "ServiceOwnerLookupId",
                lists::SERVICE_OWNERS,
                "ServiceOwnerName",
            )
            .keyed_by("ServiceOwnerLookupId"),
        ],
        retired: None,
        immutable: vec![],
        // Catalogue-only service areas are maintained by hand
        protected: ProtectedKeys::prefixes(["SP"]),
        blank_is_null: false,
    }
}

pub fn products() -> EntityConfig {
    EntityConfig {
        kind: EntityKind::Product,
        source_list: lists::PRODUCTS.to_string(),
        key: FieldMapping::new("p_id", "ProductID"),
        key_pattern: Some(PRODUCT_ID_PATTERN.clone()),
        fields: vec![
            FieldMapping::new("name", "Product").presence(Presence::Required),
            FieldMapping::new("subproduct", "ProductType")
                .transform(Transform::Equals("Subproduct".to_string())),
            FieldMapping::new("description", "Description_x0028_SourceData_x00"),
            FieldMapping::new("phase", "field_7"),
            FieldMapping::new("slack_channel_id", "slackChannelId")
                .presence(Presence::OmitIfNull),
        ],
        relations: vec![
            RelationMapping::reference(
                "parent",
                "ParentProductLookupId",
                lists::PRODUCTS,
                "Product",
                EntityKind::Product,
            ),
            RelationMapping::reference(
                "team",
                "TeamLookupId",
                lists::TEAMS,
                "Team",
                EntityKind::Team,
            ),
            RelationMapping::reference(
                "product_set",
                "ProductSetLookupId",
                lists::PRODUCT_SETS,
                "ProductSet",
                EntityKind::ProductSet,
            ),
            RelationMapping::reference(
                "service_area",
                "ServiceAreaLookupId",
                lists::SERVICE_AREAS,
                "ServiceArea",
                EntityKind::ServiceArea,
            ),
            RelationMapping::lookup(
                "delivery_manager",
                "DeliveryManagerLookupId",
                lists::DELIVERY_MANAGERS,
                "DeliveryManagerName",
            ),
            RelationMapping::lookup(
                "product_manager",
                "ProductManagerLookupId",
                lists::PRODUCT_MANAGERS,
                "ProductManagerName",
            ),
            RelationMapping::lookup(
                "lead_developer",
                "LeadDeveloperLookupId",
                lists::LEAD_DEVELOPERS,
                "Title",
            ),
        ],
        retired: Some(RetiredFlag {
            field: "Decommissioned".to_string(),
            values: vec!["decommissioned".to_string(), "retired".to_string()],
        }),
        immutable: vec!["updated_by_id".to_string()],
        protected: ProtectedKeys::default(),
        blank_is_null: true,
    }
}
