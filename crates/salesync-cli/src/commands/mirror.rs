//! Mirror command - Inspect mirror records
//!
//! `salesync mirror show` prints the record of one triple;
//! `salesync mirror list` filters records by channel and status;
//! `salesync mirror link` adopts a product that already exists on the
//! channel, so the first push updates it instead of creating a duplicate.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;

use salesync_core::domain::{ChannelId, MirrorRecord, MirrorStatus, RemoteId};
use salesync_core::ports::{IMirrorStore, MirrorFilter};

use super::{CliContext, Stores, TripleArgs};
use crate::output::{get_formatter, or_dash, to_json, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum MirrorCommand {
    /// Show the mirror record of one (entity, channel, view) triple
    Show(TripleArgs),
    /// List mirror records
    List {
        /// Only records of this channel
        #[arg(long)]
        channel: Option<i64>,
        /// Only records in this status (pending, synced, failed)
        #[arg(long)]
        status: Option<MirrorStatus>,
        /// Maximum number of records to show
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Record an existing remote product as the counterpart of a triple
    Link {
        #[command(flatten)]
        triple: TripleArgs,
        /// Identifier of the product on the channel
        remote_id: String,
    },
}

/// A mirror record as printed
#[derive(Debug, Serialize)]
pub struct MirrorRow {
    pub id: i64,
    pub key: String,
    pub status: String,
    pub remote_id: Option<String>,
    pub last_synced_hash: Option<String>,
    pub error: Option<String>,
    pub updated_at: String,
}

impl From<&MirrorRecord> for MirrorRow {
    fn from(record: &MirrorRecord) -> Self {
        Self {
            id: record.id().get(),
            key: record.key().to_string(),
            status: record.status().to_string(),
            remote_id: record.remote_id().map(|r| r.as_str().to_string()),
            last_synced_hash: record.last_synced_hash().map(|h| h.as_str().to_string()),
            error: record.error_detail().map(str::to_string),
            updated_at: record.updated_at().to_rfc3339(),
        }
    }
}

/// Result of `salesync mirror link`
#[derive(Debug, Serialize)]
pub struct LinkReport {
    /// False when the record already had a remote id, which was kept
    pub linked: bool,
    pub record: MirrorRow,
}

impl MirrorCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        if let MirrorCommand::Link { triple, remote_id } = self {
            let stores = ctx.open_stores().await?;
            let report = link(&stores, triple, remote_id).await;
            stores.db.close().await;
            let report = report?;

            if format.is_json() {
                formatter.print_json(&to_json(&report)?);
                return Ok(());
            }
            if report.linked {
                formatter.success(&format!("Linked {} to {remote_id}", report.record.key));
            } else {
                formatter.warn(&format!(
                    "{} already has a remote id, left unchanged",
                    report.record.key
                ));
            }
            print_row(&*formatter, &report.record);
            return Ok(());
        }

        let Some(stores) = ctx.open_existing_stores().await? else {
            formatter.error(&format!(
                "No database found at {}",
                ctx.database_path().display()
            ));
            return Ok(());
        };

        let rows = self.collect(&stores).await;
        stores.db.close().await;
        let rows = rows?;

        if format.is_json() {
            let json = match self {
                MirrorCommand::Show(_) | MirrorCommand::Link { .. } => match rows.first() {
                    Some(row) => to_json(row)?,
                    None => serde_json::Value::Null,
                },
                MirrorCommand::List { .. } => to_json(&rows)?,
            };
            formatter.print_json(&json);
            return Ok(());
        }

        if rows.is_empty() {
            match self {
                MirrorCommand::Show(triple) | MirrorCommand::Link { triple, .. } => formatter
                    .error(&format!("No mirror record for {}", triple.mirror_key()?)),
                MirrorCommand::List { .. } => formatter.info("No mirror records"),
            }
            return Ok(());
        }

        for row in &rows {
            print_row(&*formatter, row);
        }
        Ok(())
    }

    pub async fn collect(&self, stores: &Stores) -> Result<Vec<MirrorRow>> {
        match self {
            MirrorCommand::Show(triple) | MirrorCommand::Link { triple, .. } => {
                let key = triple.mirror_key()?;
                let record = stores
                    .mirrors
                    .find(&key)
                    .await
                    .with_context(|| format!("Failed to look up mirror record {key}"))?;
                Ok(record.iter().map(MirrorRow::from).collect())
            }
            MirrorCommand::List {
                channel,
                status,
                limit,
            } => {
                let mut filter = MirrorFilter::new().with_limit(*limit);
                if let Some(channel) = channel {
                    filter = filter.with_channel(ChannelId::new(*channel)?);
                }
                if let Some(status) = status {
                    filter = filter.with_status(*status);
                }
                let records = stores
                    .mirrors
                    .query(&filter)
                    .await
                    .context("Failed to query mirror records")?;
                Ok(records.iter().map(MirrorRow::from).collect())
            }
        }
    }
}

/// Adopts `remote_id` for the triple, creating its mirror record if needed
pub async fn link(stores: &Stores, triple: &TripleArgs, remote_id: &str) -> Result<LinkReport> {
    let key = triple.mirror_key()?;
    let remote_id = RemoteId::new(remote_id)?;
    let linked = stores
        .mirrors
        .link_remote(&key, &remote_id)
        .await
        .with_context(|| format!("Failed to link mirror record {key}"))?;
    let record = stores
        .mirrors
        .find(&key)
        .await?
        .with_context(|| format!("Mirror record {key} vanished"))?;
    Ok(LinkReport {
        linked,
        record: MirrorRow::from(&record),
    })
}

fn print_row(formatter: &dyn OutputFormatter, row: &MirrorRow) {
    formatter.success(&format!("Mirror {} ({})", row.id, row.key));
    formatter.field("Status", &row.status);
    formatter.field("Remote id", &or_dash(row.remote_id.as_deref()));
    formatter.field("Synced hash", &or_dash(row.last_synced_hash.as_deref()));
    if let Some(error) = &row.error {
        formatter.field("Error", error);
    }
    formatter.field("Updated", &row.updated_at);
    formatter.info("");
}
