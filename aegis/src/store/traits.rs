//! Record store collaborator traits

use async_trait::async_trait;

use super::StoreError;
use crate::domain::{AlertId, AlertStatus, ReporterId, ReporterProfile};

/// Point lookups of reporter profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch a profile; `Ok(None)` when the reporter has no profile
    async fn get_profile(&self, reporter_id: &ReporterId) -> Result<Option<ReporterProfile>, StoreError>;
}

/// Status mutations on alert records
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Set an alert's status. Atomic and idempotent: re-applying the same
    /// status is a successful no-op.
    async fn set_status(&self, alert_id: &AlertId, status: AlertStatus) -> Result<(), StoreError>;
}
