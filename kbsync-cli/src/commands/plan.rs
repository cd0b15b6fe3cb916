//! `kbsync plan`: resolve manifests and diff against the cache, offline.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use kbsync_sync::{
    executor::document_title,
    pipeline::{prepare, title_roots},
    CacheStore, PlanCounts, SyncPlan,
};

use crate::GlobalArgs;

/// Arguments for `kbsync plan`.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Plan a full resync.
    #[arg(long)]
    pub force: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Extra manifest file, in addition to the definitions directory.
    #[arg(long = "manifest", value_name = "PATH")]
    pub manifests: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    counts: PlanCounts,
    actions: Vec<PlannedAction>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct PlannedAction {
    action: &'static str,
    collection: String,
    title: String,
    #[tabled(display_with = "display_path")]
    path: PathBuf,
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

impl PlanArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut config = global.load_config()?;
        config.extra_manifests.extend(self.manifests.iter().cloned());

        let store = CacheStore::new(&config.cache_file);
        let prepared = prepare(&config, &store).with_context(|| {
            format!(
                "cannot resolve manifests in {}",
                config.definitions_dir.display()
            )
        })?;
        let plan = prepared.plan(self.force, None);
        let report = PlanReport {
            counts: plan.counts(),
            actions: actions(&plan, &title_roots(&config)),
            warnings: prepared.warnings(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(report);
        }
        Ok(())
    }
}

fn actions(plan: &SyncPlan, roots: &[PathBuf]) -> Vec<PlannedAction> {
    let writes = plan
        .create
        .iter()
        .map(|w| ("create", &w.file))
        .chain(plan.update.iter().map(|w| ("update", &w.file)));
    let mut actions: Vec<PlannedAction> = writes
        .map(|(action, file)| PlannedAction {
            action,
            collection: file.collection().unwrap_or_default().to_string(),
            title: document_title(&file.path, roots),
            path: file.path.clone(),
        })
        .collect();
    actions.extend(plan.delete.iter().map(|d| {
        let path = d.path();
        PlannedAction {
            action: "delete",
            collection: d.entry.collection.clone().unwrap_or_default(),
            title: document_title(&path, roots),
            path,
        }
    }));
    actions
}

fn print_report(report: PlanReport) {
    let PlanCounts {
        create,
        update,
        delete,
        unchanged,
    } = report.counts;
    println!("{create} to create, {update} to update, {delete} to delete, {unchanged} unchanged");
    if !report.actions.is_empty() {
        let mut table = Table::new(report.actions);
        table.with(Style::rounded());
        println!("{table}");
    }
    for warning in &report.warnings {
        println!("{} {warning}", "warning:".yellow());
    }
}
