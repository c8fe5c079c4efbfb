//! AlertEnricher - joins feed diffs with reporter profiles
//!
//! Sits between the feed subscriber and the coordinator loop. Each diff
//! batch becomes one `Ingest` request so the coordinator re-sorts once per
//! batch. Connectivity events become feed-status updates.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::coordinator::{CoordRequest, FeedStatus};
use crate::domain::TriageEntry;
use crate::feed::{FeedDiff, FeedEvent, FeedOp};
use crate::profile::ProfileResolver;
use crate::queue::QueueOp;

pub struct AlertEnricher {
    resolver: ProfileResolver,
}

impl AlertEnricher {
    pub fn new(resolver: ProfileResolver) -> Self {
        Self { resolver }
    }

    /// Turn diffs into queue ops, preserving delivery order
    pub async fn enrich(&mut self, diffs: Vec<FeedDiff>) -> Vec<QueueOp> {
        debug!(diffs = diffs.len(), "enrich: called");
        let mut ops = Vec::with_capacity(diffs.len());
        for diff in diffs {
            match diff.op {
                FeedOp::Remove => ops.push(QueueOp::Remove(diff.alert.id)),
                FeedOp::Add | FeedOp::Update => {
                    let reporter = self.resolver.resolve(&diff.alert.reporter_id).await;
                    ops.push(QueueOp::Upsert(TriageEntry::new(diff.alert, reporter)));
                }
            }
        }
        ops
    }

    /// Forward feed events to the coordinator until either side closes
    pub async fn run(mut self, mut rx: mpsc::Receiver<FeedEvent>, tx: mpsc::Sender<CoordRequest>) {
        info!("AlertEnricher started");
        while let Some(event) = rx.recv().await {
            let request = match event {
                FeedEvent::Connected => CoordRequest::FeedStatus(FeedStatus::Live),
                FeedEvent::Batch(diffs) => CoordRequest::Ingest(self.enrich(diffs).await),
                FeedEvent::Error { attempt, message, .. } => {
                    CoordRequest::FeedStatus(FeedStatus::Degraded { attempt, message })
                }
                FeedEvent::Exhausted => CoordRequest::FeedStatus(FeedStatus::Offline),
            };
            if tx.send(request).await.is_err() {
                debug!("run: coordinator closed");
                break;
            }
        }
        info!("AlertEnricher stopped");
    }
}
