//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

use crate::sync::EntityKind;

/// Mirror SharePoint lists into the Service Catalogue
#[derive(Debug, Parser)]
#[command(name = "sharepoint-discovery")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML settings file
    #[arg(short, long, value_name = "PATH", env = "SHAREPOINT_DISCOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log the changes that would be made without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Only sync these entity types (repeatable; default is all)
    #[arg(short, long = "entity", value_enum, value_name = "ENTITY")]
    pub entities: Vec<EntityKind>,

    /// Serve a liveness endpoint on this port while running
    #[arg(long, value_name = "PORT")]
    pub health_port: Option<u16>,

    /// Log level, overrides LOG_LEVEL
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Requested entity kinds in processing order, without duplicates
    pub fn selected_kinds(&self) -> Vec<EntityKind> {
        if self.entities.is_empty() {
            return EntityKind::ALL.to_vec();
        }
        let mut kinds = self.entities.clone();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}
