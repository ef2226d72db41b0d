//! Run orchestrator: connectivity check, entity syncs in order, summary and status

use super::diff::DiffSummary;
use super::entity::{EntityConfig, EntityKind};
use super::pipeline::{EntitySync, SyncPhase};
use super::ports::{Catalogue, JobStatusStore, ListSource, Notifier};
use super::report::{ChangeLog, ErrorCollector, JobStatus};
use crate::config::settings::DEFAULT_JOB_NAME;

/// Heading of the Slack run summary
pub const SUMMARY_HEADING: &str = "*SharePoint Discovery Summary*";

/// A run that could not start
#[derive(Debug)]
pub enum RunError {
    /// The Service Catalogue did not answer the connectivity check
    CatalogueUnreachable(anyhow::Error),
    /// SharePoint did not answer the connectivity check
    SourceUnreachable(anyhow::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::CatalogueUnreachable(e) => {
                write!(f, "unable to connect to the Service Catalogue: {:#}", e)
            }
            RunError::SourceUnreachable(e) => write!(f, "unable to connect to SharePoint: {:#}", e),
        }
    }
}

impl std::error::Error for RunError {}

/// Knobs for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Name of the scheduled-jobs entry to update
    pub job_name: String,
    /// Log changes without applying them; also skips Slack and job status
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            job_name: DEFAULT_JOB_NAME.to_string(),
            dry_run: false,
        }
    }
}

/// How one entity type's sync ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub phase: SyncPhase,
    pub summary: DiffSummary,
    pub changes: usize,
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct RunReport {
    pub log: ChangeLog,
    pub errors: ErrorCollector,
    pub entities: Vec<EntityReport>,
    pub status: JobStatus,
}

impl RunReport {
    pub fn change_count(&self) -> usize {
        self.log.change_count()
    }

    /// Slack message body
    pub fn summary_message(&self) -> String {
        let mut message = String::from(SUMMARY_HEADING);
        for line in self.log.entries() {
            message.push('\n');
            message.push_str(line);
        }
        message
    }
}

/// The collaborators a run talks to
pub struct Discovery<'a> {
    pub source: &'a dyn ListSource,
    pub catalogue: &'a dyn Catalogue,
    pub notifier: &'a dyn Notifier,
    pub status: &'a dyn JobStatusStore,
}

impl<'a> Discovery<'a> {
    /// Run every configured entity type in dependency order.
    ///
    /// Only an unreachable system aborts the run. Everything else is
    /// collected into the report and decides the terminal job status.
    pub async fn run(
        &self,
        configs: &[EntityConfig],
        options: &RunOptions,
    ) -> Result<RunReport, RunError> {
        log::info!("Checking connectivity to the Service Catalogue and SharePoint");

        if let Err(e) = self.catalogue.check_connection().await {
            let err = RunError::CatalogueUnreachable(e);
            self.fail(&err, options, false).await;
            return Err(err);
        }

        if let Err(e) = self.source.check_connection().await {
            let err = RunError::SourceUnreachable(e);
            self.fail(&err, options, true).await;
            return Err(err);
        }

        let mut ordered: Vec<&EntityConfig> = configs.iter().collect();
        ordered.sort_by_key(|c| c.kind);

        let mut log = ChangeLog::new();
        let mut errors = ErrorCollector::new();
        let mut entities = Vec::with_capacity(ordered.len());

        for config in ordered {
            log::info!("Syncing {} from '{}'", config.kind.title(), config.source_list);
            let outcome = EntitySync::new(self.source, self.catalogue, config)
                .dry_run(options.dry_run)
                .run()
                .await;
            if !outcome.completed() {
                log::warn!("{} stopped at {}", config.kind.title(), outcome.phase);
            }

            entities.push(EntityReport {
                kind: config.kind,
                phase: outcome.phase,
                summary: outcome.summary,
                changes: outcome.change_count(),
            });
            log.extend(outcome.log);
            errors.merge(outcome.errors);
        }

        let status = JobStatus::from_errors(&errors);
        let report = RunReport {
            log,
            errors,
            entities,
            status,
        };

        log::info!(
            "SharePoint discovery finished: {} change(s), {} error(s), status {}",
            report.change_count(),
            report.errors.len(),
            report.status
        );

        if options.dry_run {
            log::info!("Dry run: not notifying Slack or updating job status");
            return Ok(report);
        }

        if report.change_count() > 0 {
            if let Err(e) = self.notifier.notify(&report.summary_message()).await {
                log::error!("Failed to send discovery summary: {:#}", e);
            }
        } else {
            log::info!("No changes, skipping summary notification");
        }

        if let Err(e) = self
            .status
            .record_job_status(&options.job_name, report.status, report.errors.messages())
            .await
        {
            log::error!("Failed to update job status for {}: {:#}", options.job_name, e);
        }

        Ok(report)
    }

    async fn fail(&self, err: &RunError, options: &RunOptions, catalogue_reachable: bool) {
        log::error!("SharePoint discovery aborted: {}", err);

        if let Err(e) = self
            .notifier
            .alert(&format!("SharePoint discovery failed: {}", err))
            .await
        {
            log::error!("Failed to send alert: {:#}", e);
        }

        if catalogue_reachable && !options.dry_run {
            let details = [err.to_string()];
            if let Err(e) = self
                .status
                .record_job_status(&options.job_name, JobStatus::Failed, &details)
                .await
            {
                log::error!("Failed to update job status for {}: {:#}", options.job_name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::entities::{self, lists};
    use crate::sync::ports::ListItem;
    use crate::sync::testing::{MemoryCatalogue, MemoryNotifier, MemorySource};
    use serde_json::json;

    fn source() -> MemorySource {
        MemorySource::new()
            .with_list(
                lists::TEAMS,
                vec![ListItem::new("1", json!({"TeamID": "T1", "Team": "Alpha"}))],
            )
            .with_list(
                lists::PRODUCT_SETS,
                vec![ListItem::new("1", json!({"ProductSetID": "PS1", "ProductSet": "Set"}))],
            )
            .with_list(
                lists::SERVICE_AREAS,
                vec![ListItem::new("1", json!({"ServiceAreaID": "SA1", "ServiceArea": "Area"}))],
            )
            .with_list(
                lists::PRODUCTS,
                vec![ListItem::new(
                    "1",
                    json!({"ProductID": "ABC1", "Product": "P", "ServiceAreaLookupId": 1}),
                )],
            )
    }

    fn all_configs() -> Vec<EntityConfig> {
        // Deliberately out of order
        vec![
            entities::products(),
            entities::teams(),
            entities::service_areas(),
            entities::product_sets(),
        ]
    }

    #[tokio::test]
    async fn test_full_run_syncs_in_order_and_notifies() {
        let source = source();
        let catalogue = MemoryCatalogue::new();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };

        let report = discovery
            .run(&all_configs(), &RunOptions::default())
            .await
            .unwrap();

        let kinds: Vec<EntityKind> = report.entities.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, EntityKind::ALL.to_vec());
        assert_eq!(report.status, JobStatus::Succeeded);
        assert_eq!(report.change_count(), 4);

        // The product's service area was created earlier in the same run
        let products = catalogue.records(EntityKind::Product);
        let areas = catalogue.records(EntityKind::ServiceArea);
        assert_eq!(products[0]["service_area"], areas[0]["documentId"]);

        let notifications = notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert!(notifications[0].starts_with(SUMMARY_HEADING));
        assert!(notifications[0].contains("Added team T1"));

        let statuses = catalogue.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_second_run_is_quiet() {
        let source = source();
        let catalogue = MemoryCatalogue::new();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };

        discovery.run(&all_configs(), &RunOptions::default()).await.unwrap();
        let second = discovery.run(&all_configs(), &RunOptions::default()).await.unwrap();

        assert_eq!(second.change_count(), 0);
        assert_eq!(notifier.notifications().len(), 1);
        assert_eq!(catalogue.statuses().len(), 2);
    }

    #[tokio::test]
    async fn test_entity_failure_does_not_stop_others() {
        let source = source().failing_list(lists::PRODUCT_SETS);
        let catalogue = MemoryCatalogue::new();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };

        let report = discovery.run(&all_configs(), &RunOptions::default()).await.unwrap();

        assert_eq!(report.status, JobStatus::Errors);
        assert_eq!(report.entities[1].phase, SyncPhase::FetchSource);
        assert!(report.entities.iter().filter(|e| e.phase == SyncPhase::Done).count() == 3);
        assert_eq!(catalogue.records(EntityKind::ServiceArea).len(), 1);

        let statuses = catalogue.statuses();
        assert_eq!(statuses[0].1, JobStatus::Errors);
        assert!(!statuses[0].2.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_source_aborts_with_alert() {
        let source = source().unreachable();
        let catalogue = MemoryCatalogue::new();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };

        let result = discovery.run(&all_configs(), &RunOptions::default()).await;

        assert!(matches!(result, Err(RunError::SourceUnreachable(_))));
        assert_eq!(notifier.alerts().len(), 1);
        assert!(catalogue.records(EntityKind::Team).is_empty());
        assert_eq!(catalogue.statuses()[0].1, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreachable_catalogue_aborts_without_status() {
        let source = source();
        let catalogue = MemoryCatalogue::unreachable();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };

        let result = discovery.run(&all_configs(), &RunOptions::default()).await;

        assert!(matches!(result, Err(RunError::CatalogueUnreachable(_))));
        assert_eq!(notifier.alerts().len(), 1);
        assert!(catalogue.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_is_silent() {
        let source = source();
        let catalogue = MemoryCatalogue::new();
        let notifier = MemoryNotifier::new();
        let discovery = Discovery {
            source: &source,
            catalogue: &catalogue,
            notifier: &notifier,
            status: &catalogue,
        };
        let options = RunOptions {
            dry_run: true,
            ..RunOptions::default()
        };

        let report = discovery.run(&all_configs(), &options).await.unwrap();

        assert!(report.change_count() > 0);
        assert!(notifier.notifications().is_empty());
        assert!(catalogue.statuses().is_empty());
        assert!(catalogue.records(EntityKind::Team).is_empty());
    }
}
