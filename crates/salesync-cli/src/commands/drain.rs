//! Drain command - Process every due request once, then exit
//!
//! Useful from cron or after `salesync retry --all` when no daemon runs.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use salesync_sync::{BatchSummary, SyncWorker};

use super::{CliContext, Stores};
use crate::output::{get_formatter, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct DrainCommand {
    /// Reconciles to run in parallel (defaults to worker.concurrency)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DrainReport {
    pub pushed: u32,
    pub skipped: u32,
    pub deleted: u32,
    pub busy: u32,
    pub deferred: u32,
    pub failed: u32,
    pub errors: u32,
}

impl From<BatchSummary> for DrainReport {
    fn from(s: BatchSummary) -> Self {
        Self {
            pushed: s.pushed,
            skipped: s.skipped,
            deleted: s.deleted,
            busy: s.busy,
            deferred: s.deferred,
            failed: s.failed,
            errors: s.errors,
        }
    }
}

impl DrainCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let Some(stores) = ctx.open_existing_stores().await? else {
            formatter.error(&format!(
                "No database found at {}",
                ctx.database_path().display()
            ));
            return Ok(());
        };

        let summary = self.run(&stores, ctx).await;
        stores.db.close().await;
        let report = DrainReport::from(summary?);

        if format.is_json() {
            formatter.print_json(&to_json(&report)?);
            return Ok(());
        }

        formatter.success("Queue drained");
        formatter.field("Pushed", &report.pushed.to_string());
        formatter.field("Skipped", &report.skipped.to_string());
        formatter.field("Deleted", &report.deleted.to_string());
        formatter.field("Busy", &report.busy.to_string());
        formatter.field("Deferred", &report.deferred.to_string());
        formatter.field("Failed", &report.failed.to_string());
        if report.errors > 0 {
            formatter.warn(&format!(
                "{} request(s) aborted, see the log for details",
                report.errors
            ));
        }
        Ok(())
    }

    pub async fn run(&self, stores: &Stores, ctx: &CliContext) -> Result<BatchSummary> {
        let engine = Arc::new(stores.engine(&ctx.config)?);
        let mut worker_config = ctx.config.worker.clone();
        if let Some(concurrency) = self.concurrency {
            worker_config.concurrency = concurrency;
        }
        let worker = SyncWorker::new(engine, stores.queue.clone(), &worker_config);
        worker.drain().await
    }
}
