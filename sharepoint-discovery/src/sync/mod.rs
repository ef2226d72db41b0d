//! Reconciliation of SharePoint lists into the Service Catalogue
//!
//! One engine, parameterized per entity type by an [`EntityConfig`]:
//!
//! ```text
//! list items -> extract -> EntityRecord ─┐
//!                                         ├─ diff -> Decision -> execute -> ChangeLog
//! catalogue records -> target_records ───┘
//! ```

pub mod diff;
pub mod entities;
pub mod entity;
pub mod execute;
pub mod extract;
pub mod path;
pub mod pipeline;
pub mod ports;
pub mod record;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use entity::{EntityConfig, EntityKind};
pub use pipeline::SyncPhase;
pub use ports::{LogNotifier, Notifier};
pub use runner::{Discovery, RunOptions};
