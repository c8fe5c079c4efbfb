//! Change feed source trait

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::{FeedError, FeedFilter, RawChange};

/// Stream of change batches from one subscription
pub type ChangeStream = BoxStream<'static, Result<Vec<RawChange>, FeedError>>;

/// A subscribable feed of alert record changes
///
/// The first batch of every opened stream is the full snapshot of records
/// matching the filter, delivered as `Added` changes. The stream ends or
/// yields an error when delivery is interrupted.
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
    async fn open(&self, filter: &FeedFilter) -> Result<ChangeStream, FeedError>;
}
