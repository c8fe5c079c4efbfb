//! ChangeFeedSubscriber - turns raw feed batches into deduplicated diffs
//!
//! Owns the subscription for its whole lifetime: opens the source, converts
//! each delivered batch into ADD/UPDATE/REMOVE diffs against the last-known
//! record per id, and reconnects with capped exponential backoff when
//! delivery is interrupted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ChangeFeedSource, FeedDiff, FeedError, FeedEvent, FeedFilter, RawChange};
use crate::config::FeedConfig;
use crate::domain::{Alert, AlertId, AlertStatus};

/// Subscriber task state
pub struct ChangeFeedSubscriber {
    source: Arc<dyn ChangeFeedSource>,
    filter: FeedFilter,
    config: FeedConfig,

    /// Last-known record per id, as last emitted downstream
    known: HashMap<AlertId, Alert>,

    /// Ids that were dispatched or removed; later records for them are dropped
    retired: HashSet<AlertId>,
}

impl ChangeFeedSubscriber {
    pub fn new(source: Arc<dyn ChangeFeedSource>, filter: FeedFilter, config: FeedConfig) -> Self {
        debug!(?filter, "ChangeFeedSubscriber::new: called");
        Self {
            source,
            filter,
            config,
            known: HashMap::new(),
            retired: HashSet::new(),
        }
    }

    /// Run the subscription until the receiver goes away or retries run out
    pub async fn run(mut self, tx: mpsc::Sender<FeedEvent>) {
        info!(filter = %self.filter.query(), "ChangeFeedSubscriber started");
        let mut attempt: u32 = 0;

        loop {
            let failure = match self.source.open(&self.filter).await {
                Ok(mut stream) => {
                    debug!("run: feed opened");
                    if tx.send(FeedEvent::Connected).await.is_err() {
                        break;
                    }

                    let mut snapshot = true;
                    loop {
                        match stream.next().await {
                            Some(Ok(changes)) => {
                                let diffs = self.apply_batch(changes, snapshot);
                                if snapshot {
                                    // A delivered snapshot counts as a successful reconnect
                                    attempt = 0;
                                    snapshot = false;
                                }
                                if !diffs.is_empty() && tx.send(FeedEvent::Batch(diffs)).await.is_err() {
                                    info!("ChangeFeedSubscriber stopped: receiver closed");
                                    return;
                                }
                            }
                            Some(Err(e)) => break e,
                            None => break FeedError::Stream("feed closed by source".to_string()),
                        }
                    }
                }
                Err(e) => e,
            };

            attempt += 1;
            if attempt > self.config.max_retries {
                warn!(attempt, error = %failure, "ChangeFeedSubscriber giving up");
                let _ = tx.send(FeedEvent::Exhausted).await;
                return;
            }

            let retry_in = self.retry_delay(attempt);
            warn!(
                attempt,
                error = %failure,
                retry_in_ms = retry_in.as_millis() as u64,
                "Feed interrupted, reconnecting"
            );
            let event = FeedEvent::Error {
                attempt,
                message: failure.to_string(),
                retry_in,
            };
            if tx.send(event).await.is_err() {
                break;
            }
            tokio::time::sleep(retry_in).await;
        }

        info!("ChangeFeedSubscriber stopped");
    }

    /// Backoff for the attempt plus up to 25% random jitter
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_for(attempt);
        let max_jitter = (base.as_millis() as u64) / 4;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::rng().random_range(0..=max_jitter)
        };
        base + Duration::from_millis(jitter)
    }

    /// Convert one delivered batch into diffs, updating last-known state
    ///
    /// A snapshot batch also reconciles: any known id absent from it has
    /// left the filtered set while the stream was down and is removed.
    pub fn apply_batch(&mut self, changes: Vec<RawChange>, snapshot: bool) -> Vec<FeedDiff> {
        debug!(changes = changes.len(), snapshot, "apply_batch: called");
        let mut diffs = Vec::new();
        let mut seen = HashSet::new();

        for change in changes {
            match change {
                RawChange::Added(raw) | RawChange::Modified(raw) => {
                    // A malformed record still counts as present in a snapshot
                    if let Some(raw_id) = raw.id.as_deref() {
                        seen.insert(AlertId::new(raw_id));
                    }
                    let alert = match Alert::try_from(raw) {
                        Ok(alert) => alert,
                        Err(e) => {
                            warn!(error = %e, "Dropping feed record");
                            continue;
                        }
                    };
                    seen.insert(alert.id.clone());
                    if let Some(diff) = self.observe(alert) {
                        diffs.push(diff);
                    }
                }
                RawChange::Removed(id) => {
                    self.retired.insert(id.clone());
                    match self.known.remove(&id) {
                        Some(prev) => diffs.push(FeedDiff::remove(prev)),
                        None => debug!(%id, "apply_batch: remove of unknown id"),
                    }
                }
            }
        }

        if snapshot {
            let vanished: Vec<AlertId> = self.known.keys().filter(|id| !seen.contains(*id)).cloned().collect();
            for id in vanished {
                if let Some(prev) = self.known.remove(&id) {
                    debug!(%id, "apply_batch: absent from snapshot");
                    self.retired.insert(id);
                    diffs.push(FeedDiff::remove(prev));
                }
            }
        }

        diffs
    }

    fn observe(&mut self, alert: Alert) -> Option<FeedDiff> {
        let id = alert.id.clone();

        if self.retired.contains(&id) {
            debug!(%id, status = %alert.status, "observe: dropping record for retired id");
            return None;
        }
        if alert.status == AlertStatus::Dispatched {
            self.retired.insert(id.clone());
        }

        if !self.filter.matches(&alert) {
            return match self.known.remove(&id) {
                Some(_) => {
                    debug!(%id, status = %alert.status, "observe: left filtered set");
                    Some(FeedDiff::remove(alert))
                }
                None => {
                    debug!(%id, status = %alert.status, "observe: ignoring unmatched record");
                    None
                }
            };
        }

        let known = match self.known.get(&id) {
            Some(prev) if alert.created_at < prev.created_at => {
                debug!(%id, "observe: dropping stale record");
                return None;
            }
            Some(prev) if *prev == alert => {
                debug!(%id, "observe: duplicate suppressed");
                return None;
            }
            Some(_) => true,
            None => false,
        };

        self.known.insert(id, alert.clone());
        if known {
            Some(FeedDiff::update(alert))
        } else {
            Some(FeedDiff::add(alert))
        }
    }
}
