//! Failed command - List sync requests that need an operator

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use salesync_core::domain::{RequestStatus, SyncRequest, SyncType};
use salesync_core::ports::{ISyncRequestQueue, RequestFilter};

use super::{CliContext, Stores};
use crate::output::{get_formatter, or_dash, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct FailedCommand {
    /// Only show requests of this sync type (product, price, content, ...)
    #[arg(long = "type")]
    pub sync_type: Option<String>,

    /// Maximum number of requests to show
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}

/// One failed request as printed
#[derive(Debug, Serialize)]
pub struct FailedRow {
    pub id: i64,
    pub mirror_id: i64,
    pub sync_type: String,
    pub view_id: Option<i64>,
    pub attempts: u32,
    pub error: Option<String>,
    pub updated_at: String,
}

impl From<&SyncRequest> for FailedRow {
    fn from(request: &SyncRequest) -> Self {
        let key = request.key();
        Self {
            id: request.id().get(),
            mirror_id: key.remote_product_id.get(),
            sync_type: key.sync_type.to_string(),
            view_id: key.view_id.map(|v| v.get()),
            attempts: request.attempts(),
            error: request.error_detail().map(str::to_string),
            updated_at: request.updated_at().to_rfc3339(),
        }
    }
}

impl FailedCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let Some(stores) = ctx.open_existing_stores().await? else {
            formatter.error(&format!(
                "No database found at {}",
                ctx.database_path().display()
            ));
            return Ok(());
        };

        let rows = self.collect(&stores).await?;
        stores.db.close().await;

        if format.is_json() {
            formatter.print_json(&to_json(&rows)?);
            return Ok(());
        }

        if rows.is_empty() {
            formatter.success("No failed sync requests");
            return Ok(());
        }

        formatter.warn(&format!("{} failed sync request(s)", rows.len()));
        for row in &rows {
            formatter.info("");
            formatter.field("Request", &row.id.to_string());
            formatter.field("Mirror", &row.mirror_id.to_string());
            formatter.field("Type", &row.sync_type);
            formatter.field("View", &or_dash(row.view_id));
            formatter.field("Attempts", &row.attempts.to_string());
            formatter.field("Error", row.error.as_deref().unwrap_or("-"));
            formatter.field("Updated", &row.updated_at);
        }
        formatter.info("");
        formatter.info("Re-queue with 'salesync retry <id>' or 'salesync retry --all'.");

        Ok(())
    }

    pub async fn collect(&self, stores: &Stores) -> Result<Vec<FailedRow>> {
        let mut filter = RequestFilter::new()
            .with_status(RequestStatus::Failed)
            .with_limit(self.limit);
        if let Some(sync_type) = &self.sync_type {
            let sync_type: SyncType = sync_type.parse()?;
            filter = filter.with_sync_type(sync_type);
        }

        let requests = stores
            .queue
            .query(&filter)
            .await
            .context("Failed to query failed sync requests")?;
        Ok(requests.iter().map(FailedRow::from).collect())
    }
}
