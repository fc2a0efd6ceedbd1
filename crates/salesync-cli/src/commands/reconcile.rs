//! Reconcile command - Synchronize one triple now
//!
//! Enqueues a signal for the triple and executes the resulting request in
//! this process, so the request is settled exactly as the daemon would.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use salesync_core::ports::ISyncRequestQueue;
use salesync_sync::{ReconcileOutcome, SignalKind, SyncSignal};

use super::{CliContext, Stores, TripleArgs};
use crate::output::{get_formatter, or_dash, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct ReconcileCommand {
    #[command(flatten)]
    pub triple: TripleArgs,

    /// Signal to reconcile with
    #[arg(long, default_value = "update_remote_product")]
    pub kind: SignalKind,
}

#[derive(Debug, Serialize)]
pub struct ReconcileReport {
    pub key: String,
    pub request_id: i64,
    pub outcome: String,
    pub remote_id: Option<String>,
    pub detail: Option<String>,
    pub retry_at: Option<String>,
}

impl ReconcileReport {
    fn new(key: String, request_id: i64, outcome: &ReconcileOutcome) -> Self {
        let (remote_id, detail, retry_at) = match outcome {
            ReconcileOutcome::Pushed { remote_id } => {
                (remote_id.as_ref().map(|r| r.as_str().to_string()), None, None)
            }
            ReconcileOutcome::Deferred {
                reason, retry_at, ..
            } => (None, Some(reason.clone()), retry_at.map(|t| t.to_rfc3339())),
            ReconcileOutcome::Failed { reason } => (None, Some(reason.clone()), None),
            _ => (None, None, None),
        };
        Self {
            key,
            request_id,
            outcome: outcome.label().to_string(),
            remote_id,
            detail,
            retry_at,
        }
    }
}

impl ReconcileCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let stores = ctx.open_stores().await?;
        let report = self.run(&stores, ctx).await;
        stores.db.close().await;
        let report = report?;

        if format.is_json() {
            formatter.print_json(&to_json(&report)?);
            return Ok(());
        }

        match report.outcome.as_str() {
            "pushed" | "skipped" | "deleted" => {
                formatter.success(&format!("{}: {}", report.key, report.outcome))
            }
            "failed" => formatter.error(&format!("{}: failed", report.key)),
            _ => formatter.warn(&format!("{}: {}", report.key, report.outcome)),
        }
        formatter.field("Request", &report.request_id.to_string());
        formatter.field("Remote id", &or_dash(report.remote_id.as_deref()));
        if let Some(detail) = &report.detail {
            formatter.field("Detail", detail);
        }
        if let Some(retry_at) = &report.retry_at {
            formatter.field("Retry at", retry_at);
        }
        Ok(())
    }

    pub async fn run(&self, stores: &Stores, ctx: &CliContext) -> Result<ReconcileReport> {
        let engine = stores.engine(&ctx.config)?;

        let mut signal = SyncSignal::new(
            self.kind,
            self.triple.entity_id()?,
            self.triple.channel_id()?,
        );
        if let Some(view) = self.triple.view_id()? {
            signal = signal.with_view(view);
        }
        let key = signal.mirror_key();

        let enqueued = stores.dispatcher().dispatch(&signal).await?;
        let request = stores
            .queue
            .get(enqueued.id)
            .await?
            .with_context(|| format!("Sync request {} vanished", enqueued.id))?;

        info!(key = %key, request_id = %enqueued.id, "Reconciling");
        let outcome = engine.process(&request).await?;

        Ok(ReconcileReport::new(
            key.to_string(),
            enqueued.id.get(),
            &outcome,
        ))
    }
}
