//! Status command - Queue and mirror overview
//!
//! Provides the `salesync status` CLI command which shows:
//! 1. Sync request counts by status
//! 2. Mirror record counts by status
//! 3. The configured channels

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use salesync_core::config::Config;
use salesync_core::domain::{MirrorStatus, RequestStatus};
use salesync_core::ports::{IMirrorStore, ISyncRequestQueue};

use super::{CliContext, Stores};
use crate::output::{get_formatter, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusCommand {}

#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub id: i64,
    pub channel_type: String,
    pub base_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub requests: BTreeMap<String, u64>,
    pub mirrors: BTreeMap<String, u64>,
    pub channels: Vec<ChannelSummary>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let Some(stores) = ctx.open_existing_stores().await? else {
            formatter.error(&format!(
                "No database found at {}. Start salesyncd or run 'salesync enqueue' first.",
                ctx.database_path().display()
            ));
            return Ok(());
        };

        info!(db_path = %ctx.database_path().display(), "Showing status");
        let report = collect_status(&stores, &ctx.config).await?;
        stores.db.close().await;

        if format.is_json() {
            formatter.print_json(&to_json(&report)?);
            return Ok(());
        }

        formatter.success("Salesync Status");
        formatter.info("");
        formatter.info("Sync requests:");
        for status in RequestStatus::ALL {
            let count = report.requests.get(status.as_str()).copied().unwrap_or(0);
            formatter.field(&format!("  {status}"), &count.to_string());
        }
        formatter.info("");
        formatter.info("Mirror records:");
        for (status, count) in &report.mirrors {
            formatter.field(&format!("  {status}"), &count.to_string());
        }
        formatter.info("");
        if report.channels.is_empty() {
            formatter.warn("No channels configured");
        } else {
            formatter.info("Channels:");
            for channel in &report.channels {
                formatter.info(&format!(
                    "  [{}] {} {}",
                    channel.id, channel.channel_type, channel.base_url
                ));
            }
        }

        Ok(())
    }
}

/// Gathers the counts shown by `salesync status`
pub async fn collect_status(stores: &Stores, config: &Config) -> Result<StatusReport> {
    let mut requests: BTreeMap<String, u64> = RequestStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let counts = stores
        .queue
        .count_by_status()
        .await
        .context("Failed to count sync requests")?;
    requests.extend(counts);

    let mut mirrors: BTreeMap<String, u64> = MirrorStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let counts = stores
        .mirrors
        .count_by_status()
        .await
        .context("Failed to count mirror records")?;
    mirrors.extend(counts);

    let channels = config
        .channels
        .iter()
        .map(|c| ChannelSummary {
            id: c.id.get(),
            channel_type: c.channel_type.to_string(),
            base_url: c.base_url.clone(),
        })
        .collect();

    Ok(StatusReport {
        requests,
        mirrors,
        channels,
    })
}
