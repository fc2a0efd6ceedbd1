//! Retry command - Re-queue failed sync requests
//!
//! A retried request returns to `pending` with its attempt counter reset.
//! A request whose key already has a newer pending request stays failed;
//! the newer request carries the same work.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use salesync_core::domain::{RequestStatus, SyncRequestId};
use salesync_core::ports::{ISyncRequestQueue, RequestFilter};

use super::{CliContext, Stores};
use crate::output::{get_formatter, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct RetryCommand {
    /// Id of the failed request to re-queue
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub id: Option<i64>,

    /// Re-queue every failed request
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct RetryReport {
    pub requeued: Vec<i64>,
    /// Requests left failed, with the reason
    pub skipped: Vec<(i64, String)>,
}

impl RetryCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let Some(stores) = ctx.open_existing_stores().await? else {
            formatter.error(&format!(
                "No database found at {}",
                ctx.database_path().display()
            ));
            return Ok(());
        };

        let report = self.run(&stores).await;
        stores.db.close().await;
        let report = report?;

        if format.is_json() {
            formatter.print_json(&to_json(&report)?);
            return Ok(());
        }

        for (id, reason) in &report.skipped {
            formatter.warn(&format!("Request {id} not re-queued: {reason}"));
        }
        match report.requeued.len() {
            0 => formatter.info("Nothing to retry"),
            1 if !self.all => {
                formatter.success(&format!("Re-queued request {}", report.requeued[0]))
            }
            n => formatter.success(&format!("Re-queued {n} request(s)")),
        }

        Ok(())
    }

    pub async fn run(&self, stores: &Stores) -> Result<RetryReport> {
        let mut report = RetryReport::default();

        if !self.all {
            let Some(raw) = self.id else {
                bail!("Either a request id or --all is required");
            };
            let id = SyncRequestId::new(raw)?;
            stores
                .queue
                .retry(id)
                .await
                .with_context(|| format!("Failed to retry request {id}"))?;
            report.requeued.push(raw);
            return Ok(report);
        }

        let failed = stores
            .queue
            .query(&RequestFilter::new().with_status(RequestStatus::Failed))
            .await
            .context("Failed to query failed sync requests")?;

        for request in failed {
            let id = request.id();
            match stores.queue.retry(id).await {
                Ok(()) => report.requeued.push(id.get()),
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Request not re-queued");
                    report.skipped.push((id.get(), e.to_string()));
                }
            }
        }

        info!(
            requeued = report.requeued.len(),
            skipped = report.skipped.len(),
            "Retried failed requests"
        );
        Ok(report)
    }
}
