//! sharepoint-discovery - mirror SharePoint product lists into the Service Catalogue
//!
//! One run reconciles teams, product sets, service areas and products, posts a
//! Slack summary when anything changed and records the job status in the
//! catalogue's `scheduled-jobs` collection.

use anyhow::Result;
use clap::Parser;

mod api;
mod cli;
mod config;
mod health;
mod logging;
mod sync;

use api::{ServiceCatalogueClient, SharePointClient, SlackClient};
use cli::Cli;
use config::{Config, Settings};
use sync::entities::config_for;
use sync::{Discovery, EntityConfig, LogNotifier, Notifier, RunOptions, SyncPhase};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env();
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().and_then(|c| c.log_level.clone()));
    logging::init(level.as_deref());

    let config = config?;
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    let _health = match cli.health_port {
        Some(port) => Some(health::spawn(port).await?),
        None => None,
    };

    let http = api::http_client(&settings)?;
    let catalogue = ServiceCatalogueClient::new(http.clone(), &config.catalogue, settings.page_size);
    let sharepoint = SharePointClient::new(http.clone(), &config.sharepoint, &settings);
    let notifier: Box<dyn Notifier> =
        match SlackClient::from_config(http, &config.slack, &settings.slack_base_url) {
            Some(slack) => Box::new(slack),
            None => {
                log::warn!("SLACK_BOT_TOKEN not set, notifications will only be logged");
                Box::new(LogNotifier)
            }
        };

    let configs: Vec<EntityConfig> = cli
        .selected_kinds()
        .into_iter()
        .map(|kind| settings.apply(config_for(kind)))
        .collect();
    let options = RunOptions {
        job_name: settings.job_name.clone(),
        dry_run: cli.dry_run,
    };

    if options.dry_run {
        log::info!("Dry run: no changes will be written to the Service Catalogue");
    }

    let discovery = Discovery {
        source: &sharepoint,
        catalogue: &catalogue,
        notifier: notifier.as_ref(),
        status: &catalogue,
    };

    match discovery.run(&configs, &options).await {
        Ok(report) => {
            for entity in report.entities.iter().filter(|e| e.phase == SyncPhase::Done) {
                log::info!(
                    "{}: {}, {} change(s)",
                    entity.kind.title(),
                    entity.summary,
                    entity.changes
                );
            }
            Ok(())
        }
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    }
}
