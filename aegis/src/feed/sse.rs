//! Server-sent-events change feed
//!
//! Subscribes to `GET {base}{feed-path}?status=PENDING`. Each SSE message
//! carries one batch:
//!
//! ```json
//! {"changes": [{"type": "added", "id": "a1", "data": {...}}, {"type": "removed", "id": "a2"}]}
//! ```

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource, retry};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{ChangeFeedSource, ChangeStream, FeedError, FeedFilter, RawAlertRecord, RawChange};
use crate::config::StoreConfig;
use crate::domain::AlertId;

#[derive(Debug, Deserialize)]
struct WireBatch {
    changes: Vec<WireChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Deserialize)]
struct WireChange {
    #[serde(rename = "type")]
    kind: WireKind,
    id: String,
    #[serde(default)]
    data: Option<RawAlertRecord>,
}

impl From<WireChange> for RawChange {
    fn from(change: WireChange) -> Self {
        let WireChange { kind, id, data } = change;
        match kind {
            WireKind::Added => RawChange::Added(data.unwrap_or_default().with_id(&id)),
            WireKind::Modified => RawChange::Modified(data.unwrap_or_default().with_id(&id)),
            WireKind::Removed => RawChange::Removed(AlertId::new(id)),
        }
    }
}

/// Parse one SSE message body into a batch
fn parse_batch(data: &str) -> Result<Vec<RawChange>, FeedError> {
    let batch: WireBatch = serde_json::from_str(data).map_err(|e| FeedError::Integrity(e.to_string()))?;
    Ok(batch.changes.into_iter().map(RawChange::from).collect())
}

/// Change feed over server-sent events
pub struct SseFeedSource {
    http: Client,
    url: String,
}

impl SseFeedSource {
    pub fn from_config(config: &StoreConfig) -> Self {
        debug!(base_url = %config.base_url, feed_path = %config.feed_path, "SseFeedSource::from_config: called");
        Self {
            // No overall timeout: the stream is long-lived
            http: Client::new(),
            url: format!("{}{}", config.base_url.trim_end_matches('/'), config.feed_path),
        }
    }
}

#[async_trait]
impl ChangeFeedSource for SseFeedSource {
    async fn open(&self, filter: &FeedFilter) -> Result<ChangeStream, FeedError> {
        let url = format!("{}?{}", self.url, filter.query());
        debug!(%url, "SseFeedSource::open: called");

        let request = self.http.get(url).header("accept", "text/event-stream");
        let mut es = EventSource::new(request).map_err(|e| FeedError::Connect(e.to_string()))?;
        // Reconnects are driven by the subscriber's own backoff
        es.set_retry_policy(Box::new(retry::Never));

        match es.next().await {
            Some(Ok(Event::Open)) => debug!("open: connected"),
            Some(Ok(Event::Message(msg))) => {
                warn!(event = %msg.event, "open: message before open");
            }
            Some(Err(e)) => {
                es.close();
                return Err(FeedError::Connect(e.to_string()));
            }
            None => return Err(FeedError::Connect("event source closed before open".to_string())),
        }

        let stream = es.filter_map(|event| {
            let item = match event {
                Ok(Event::Open) => None,
                Ok(Event::Message(msg)) => match parse_batch(&msg.data) {
                    Ok(changes) => Some(Ok(changes)),
                    Err(e) => {
                        warn!(error = %e, "Dropping malformed feed message");
                        None
                    }
                },
                Err(e) => Some(Err(FeedError::Stream(e.to_string()))),
            };
            futures::future::ready(item)
        });

        Ok(stream.boxed())
    }
}
