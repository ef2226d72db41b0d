//! Per-entity sync pipeline
//!
//! `FetchSource -> FetchTarget -> BuildIndices -> Extract -> Diff -> Execute -> Done`.
//! A failure while fetching stops this entity type only: it is recorded in
//! the outcome's error collector and the orchestrator moves on.

use std::collections::HashMap;

use anyhow::{Context, Result, bail};

use super::diff::{DiffSummary, diff};
use super::entity::EntityConfig;
use super::execute::SyncExecutor;
use super::extract::{SourceLookups, extract, target_records};
use super::ports::{Catalogue, CatalogueRecord, ListItem, ListSource, lookup_table_by};
use super::report::{ChangeLog, ErrorCollector};
use super::resolver::{ReferenceIndex, ReferenceIndexes};

/// Where an entity sync is, or where it stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    FetchSource,
    FetchTarget,
    BuildIndices,
    Extract,
    Diff,
    Execute,
    Done,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SyncPhase::FetchSource => "fetch source",
            SyncPhase::FetchTarget => "fetch target",
            SyncPhase::BuildIndices => "build indices",
            SyncPhase::Extract => "extract",
            SyncPhase::Diff => "diff",
            SyncPhase::Execute => "execute",
            SyncPhase::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Result of one entity type's sync
#[derive(Debug)]
pub struct EntityOutcome {
    pub log: ChangeLog,
    pub errors: ErrorCollector,
    /// Phase reached; anything but `Done` means the sync stopped early
    pub phase: SyncPhase,
    pub summary: DiffSummary,
}

impl EntityOutcome {
    pub fn completed(&self) -> bool {
        self.phase == SyncPhase::Done
    }

    /// Catalogue mutations that went through
    pub fn change_count(&self) -> usize {
        self.log.change_count()
    }
}

/// Syncs one entity type from SharePoint into the catalogue
pub struct EntitySync<'a> {
    source: &'a dyn ListSource,
    catalogue: &'a dyn Catalogue,
    config: &'a EntityConfig,
    dry_run: bool,
}

impl<'a> EntitySync<'a> {
    pub fn new(
        source: &'a dyn ListSource,
        catalogue: &'a dyn Catalogue,
        config: &'a EntityConfig,
    ) -> Self {
        Self {
            source,
            catalogue,
            config,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub async fn run(&self) -> EntityOutcome {
        let mut phase = SyncPhase::FetchSource;
        let mut errors = ErrorCollector::new();
        let mut summary = DiffSummary::default();

        let log = match self.run_phases(&mut phase, &mut summary, &mut errors).await {
            Ok(log) => log,
            Err(e) => {
                errors.record(format!(
                    "{} sync stopped at {}: {:#}",
                    self.config.kind.title(),
                    phase,
                    e
                ));
                ChangeLog::new()
            }
        };

        EntityOutcome {
            log,
            errors,
            phase,
            summary,
        }
    }

    async fn run_phases(
        &self,
        phase: &mut SyncPhase,
        summary: &mut DiffSummary,
        errors: &mut ErrorCollector,
    ) -> Result<ChangeLog> {
        let config = self.config;
        let kind = config.kind;

        enter(phase, SyncPhase::FetchSource, config);
        let entries = self
            .source
            .fetch_list(&config.source_list)
            .await
            .with_context(|| format!("Failed to fetch SharePoint list '{}'", config.source_list))?;
        log::info!("Fetched {} items from '{}'", entries.len(), config.source_list);

        enter(phase, SyncPhase::FetchTarget, config);
        let target_raw = self
            .catalogue
            .fetch_all(kind)
            .await
            .with_context(|| format!("Failed to fetch {} from the Service Catalogue", kind))?;
        log::info!("Fetched {} {} from the Service Catalogue", target_raw.len(), kind);

        enter(phase, SyncPhase::BuildIndices, config);
        let mut indexes = ReferenceIndexes::new();
        for referenced in config.referenced_kinds() {
            let fetched: Vec<CatalogueRecord>;
            let records: &[CatalogueRecord] = if referenced == kind {
                &target_raw
            } else {
                fetched = self.catalogue.fetch_all(referenced).await.with_context(|| {
                    format!("Failed to fetch {} from the Service Catalogue", referenced)
                })?;
                &fetched
            };
            indexes.insert(ReferenceIndex::build(
                referenced,
                records,
                referenced.display_field(),
            ));
        }

        let lookups = build_lookups(self.source, config, &entries).await?;

        enter(phase, SyncPhase::Extract, config);
        let source_records = extract(&entries, config, &lookups, errors);
        if source_records.is_empty() {
            // A broken or empty list must not wipe the catalogue
            bail!(
                "no {} records extracted from SharePoint list '{}'",
                config.kind.label(),
                config.source_list
            );
        }
        let targets = target_records(&target_raw, config);

        enter(phase, SyncPhase::Diff, config);
        let decisions = diff(&source_records, &targets, config);
        *summary = DiffSummary::of(&decisions);
        if summary.changes() == 0 {
            log::info!("{} already match SharePoint", kind.title());
        }

        enter(phase, SyncPhase::Execute, config);
        let log = SyncExecutor::new(self.catalogue, config, &indexes)
            .dry_run(self.dry_run)
            .execute(&decisions, errors)
            .await;

        enter(phase, SyncPhase::Done, config);
        Ok(log)
    }
}

/// One lookup table per relation, keyed the way the relation matches ids.
///
/// The entity's own list is reused rather than fetched again.
async fn build_lookups(
    source: &dyn ListSource,
    config: &EntityConfig,
    entries: &[ListItem],
) -> Result<SourceLookups> {
    let mut lookups: SourceLookups = HashMap::new();
    for relation in &config.relations {
        let list = relation.lookup_list.as_str();
        let key = relation.lookup_key.as_ref();
        let table = if list == config.source_list {
            lookup_table_by(entries, key)
        } else if key.is_none() {
            source
                .fetch_lookup_table(list)
                .await
                .with_context(|| format!("Failed to fetch SharePoint list '{}'", list))?
        } else {
            let items = source
                .fetch_list(list)
                .await
                .with_context(|| format!("Failed to fetch SharePoint list '{}'", list))?;
            lookup_table_by(&items, key)
        };
        lookups.insert(relation.target.clone(), table);
    }
    Ok(lookups)
}

fn enter(phase: &mut SyncPhase, next: SyncPhase, config: &EntityConfig) {
    log::debug!("{}: {} -> {}", config.kind.title(), phase, next);
    *phase = next;
}
