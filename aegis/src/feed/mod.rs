//! Live alert change feed
//!
//! A [`ChangeFeedSource`] delivers raw record batches; the
//! [`ChangeFeedSubscriber`] turns them into ordered, deduplicated diffs.

mod source;
mod sse;
mod subscriber;
mod types;

pub use source::{ChangeFeedSource, ChangeStream};
pub use sse::SseFeedSource;
pub use subscriber::ChangeFeedSubscriber;
pub use types::{FeedDiff, FeedError, FeedEvent, FeedFilter, FeedOp, RawAlertRecord, RawChange};
