//! Enqueue command - Emit a sync signal by hand
//!
//! Goes through the same dispatcher as the business system's signals, so a
//! manual enqueue collapses into an already pending request for the key.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use salesync_core::ports::Enqueued;
use salesync_sync::{SignalKind, SyncSignal};

use super::{CliContext, Stores, TripleArgs};
use crate::output::{get_formatter, to_json, OutputFormat};

#[derive(Debug, Args)]
pub struct EnqueueCommand {
    /// Signal kind, e.g. update_remote_price or delete_remote_product
    pub kind: SignalKind,

    #[command(flatten)]
    pub triple: TripleArgs,

    /// Task arguments as a JSON object
    #[arg(long)]
    pub kwargs: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueReport {
    pub request_id: i64,
    pub created: bool,
    pub signal: String,
    pub sync_type: String,
}

impl EnqueueCommand {
    pub async fn execute(&self, ctx: &CliContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format);

        let stores = ctx.open_stores().await?;
        let enqueued = self.run(&stores).await;
        stores.db.close().await;
        let enqueued = enqueued?;

        let report = EnqueueReport {
            request_id: enqueued.id.get(),
            created: enqueued.created,
            signal: self.kind.to_string(),
            sync_type: self.kind.sync_type().to_string(),
        };

        if format.is_json() {
            formatter.print_json(&to_json(&report)?);
        } else if report.created {
            formatter.success(&format!(
                "Enqueued {} request {}",
                report.sync_type, report.request_id
            ));
        } else {
            formatter.success(&format!(
                "Merged into pending {} request {}",
                report.sync_type, report.request_id
            ));
        }
        Ok(())
    }

    pub fn signal(&self) -> Result<SyncSignal> {
        let mut signal = SyncSignal::new(
            self.kind,
            self.triple.entity_id()?,
            self.triple.channel_id()?,
        );
        if let Some(view) = self.triple.view_id()? {
            signal = signal.with_view(view);
        }
        if let Some(raw) = &self.kwargs {
            let kwargs: Value =
                serde_json::from_str(raw).context("--kwargs must be valid JSON")?;
            signal = signal.with_kwargs(kwargs);
        }
        Ok(signal)
    }

    pub async fn run(&self, stores: &Stores) -> Result<Enqueued> {
        let signal = self.signal()?;
        Ok(stores.dispatcher().dispatch(&signal).await?)
    }
}

#[cfg(test)]
mod tests {
    use salesync_core::domain::SyncType;
    use salesync_core::ports::ISyncRequestQueue;
    use serde_json::json;

    use super::*;

    fn command(kind: SignalKind, kwargs: Option<&str>) -> EnqueueCommand {
        EnqueueCommand {
            kind,
            triple: TripleArgs {
                entity: 10,
                channel: 2,
                view: Some(4),
            },
            kwargs: kwargs.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_enqueue_collapses_repeated_signals() {
        let stores = Stores::in_memory().await.unwrap();

        let first = command(SignalKind::UpdateRemotePrice, Some(r#"{"rev": 1}"#))
            .run(&stores)
            .await
            .unwrap();
        let second = command(SignalKind::UpdateRemotePrice, Some(r#"{"rev": 2}"#))
            .run(&stores)
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let request = stores.queue.get(first.id).await.unwrap().unwrap();
        assert_eq!(request.key().sync_type, SyncType::Price);
        assert_eq!(request.key().view_id.map(|v| v.get()), Some(4));
        assert_eq!(request.task_kwargs(), &json!({"rev": 2}));
    }

    #[tokio::test]
    async fn test_delete_signal_carries_flag() {
        let stores = Stores::in_memory().await.unwrap();
        let enqueued = command(SignalKind::DeleteRemoteProduct, None)
            .run(&stores)
            .await
            .unwrap();
        let request = stores.queue.get(enqueued.id).await.unwrap().unwrap();
        assert_eq!(request.task_kwargs(), &json!({"delete": true}));
    }

    #[test]
    fn test_invalid_kwargs_rejected() {
        let cmd = command(SignalKind::UpdateRemoteContent, Some("{not json"));
        let err = cmd.signal().unwrap_err();
        assert!(err.to_string().contains("--kwargs"));
    }
}
