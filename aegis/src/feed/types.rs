//! Change feed records, diffs and events

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{Alert, AlertId, AlertStatus, AlertType, RiskLevel};

/// Errors raised by the change feed
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Feed connect failed: {0}")]
    Connect(String),

    #[error("Feed stream interrupted: {0}")]
    Stream(String),

    #[error("Record failed integrity check: {0}")]
    Integrity(String),
}

impl FeedError {
    /// Check if this error is retryable by reconnecting
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::Connect(_) => true,
            FeedError::Stream(_) => true,
            FeedError::Integrity(_) => false,
        }
    }
}

/// Alert record as delivered by the store, before integrity checks
///
/// Every field is optional on the wire; conversion into [`Alert`] rejects
/// records missing the ones the queue cannot do without.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawAlertRecord {
    pub id: Option<String>,

    #[serde(rename = "userId", alias = "reporter_id")]
    pub reporter_id: Option<String>,

    pub alert_type: Option<String>,
    pub details: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: Option<String>,
    pub risk_level: Option<String>,
    pub risk_reason: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl RawAlertRecord {
    /// Fill in the id from the envelope when the body omits it
    pub fn with_id(mut self, id: &str) -> Self {
        if self.id.as_deref().is_none_or(str::is_empty) {
            self.id = Some(id.to_string());
        }
        self
    }
}

impl From<&Alert> for RawAlertRecord {
    fn from(alert: &Alert) -> Self {
        Self {
            id: Some(alert.id.to_string()),
            reporter_id: Some(alert.reporter_id.to_string()),
            alert_type: Some(alert.alert_type.to_string()),
            details: Some(alert.details.clone()),
            latitude: Some(alert.latitude),
            longitude: Some(alert.longitude),
            status: Some(alert.status.to_string()),
            risk_level: alert.risk_level.map(|l| l.to_string()),
            risk_reason: Some(alert.risk_reason.clone()),
            created_at: Some(alert.created_at),
        }
    }
}

fn required<T>(value: Option<T>, field: &str, id: &str) -> Result<T, FeedError> {
    value.ok_or_else(|| FeedError::Integrity(format!("alert {} missing {}", id, field)))
}

impl TryFrom<RawAlertRecord> for Alert {
    type Error = FeedError;

    fn try_from(raw: RawAlertRecord) -> Result<Self, FeedError> {
        let id = raw
            .id
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FeedError::Integrity("record missing id".to_string()))?;

        let reporter_id = required(raw.reporter_id.filter(|s| !s.is_empty()), "reporter id", &id)?;
        let latitude = required(raw.latitude, "latitude", &id)?;
        let longitude = required(raw.longitude, "longitude", &id)?;
        let created_at = required(raw.created_at, "created_at", &id)?;
        let status = required(raw.status, "status", &id)?;

        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(FeedError::Integrity(format!("alert {} latitude out of range: {}", id, latitude)));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(FeedError::Integrity(format!(
                "alert {} longitude out of range: {}",
                id, longitude
            )));
        }

        let status: AlertStatus = status.parse().map_err(FeedError::Integrity)?;

        // Unrecognised static risk ranks as unset rather than rejecting the alert
        let risk_level = raw.risk_level.and_then(|s| match s.parse::<RiskLevel>() {
            Ok(level) => Some(level),
            Err(e) => {
                debug!(%id, error = %e, "Alert::try_from: unrecognised static risk");
                None
            }
        });

        Ok(Alert {
            id: AlertId::new(id),
            reporter_id: reporter_id.into(),
            alert_type: raw.alert_type.map(AlertType::from).unwrap_or_default(),
            details: raw.details.unwrap_or_default(),
            latitude,
            longitude,
            status,
            risk_level,
            risk_reason: raw.risk_reason.unwrap_or_default(),
            created_at,
        })
    }
}

/// One change as delivered by a feed source
#[derive(Debug, Clone, PartialEq)]
pub enum RawChange {
    Added(RawAlertRecord),
    Modified(RawAlertRecord),
    Removed(AlertId),
}

/// Subscription predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedFilter {
    pub status: AlertStatus,
}

impl FeedFilter {
    /// Only alerts awaiting dispatch
    pub fn pending() -> Self {
        Self {
            status: AlertStatus::Pending,
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        alert.status == self.status
    }

    /// Query-string form, e.g. `status=PENDING`
    pub fn query(&self) -> String {
        format!("status={}", self.status)
    }
}

impl Default for FeedFilter {
    fn default() -> Self {
        Self::pending()
    }
}

/// Diff operation emitted by the subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeedOp {
    Add,
    Update,
    Remove,
}

impl std::fmt::Display for FeedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "ADD"),
            Self::Update => write!(f, "UPDATE"),
            Self::Remove => write!(f, "REMOVE"),
        }
    }
}

/// A coherent change to one alert
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDiff {
    pub op: FeedOp,
    pub alert: Alert,
}

impl FeedDiff {
    pub fn add(alert: Alert) -> Self {
        Self { op: FeedOp::Add, alert }
    }

    pub fn update(alert: Alert) -> Self {
        Self {
            op: FeedOp::Update,
            alert,
        }
    }

    pub fn remove(alert: Alert) -> Self {
        Self {
            op: FeedOp::Remove,
            alert,
        }
    }

    pub fn id(&self) -> &AlertId {
        &self.alert.id
    }
}

/// Events emitted by the subscriber task
///
/// Connectivity problems travel as their own variants and never as diffs.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// Stream opened; the snapshot batch follows
    Connected,

    /// Diffs from one delivered batch, in delivery order
    Batch(Vec<FeedDiff>),

    /// Delivery interrupted; reconnecting after `retry_in`
    Error {
        attempt: u32,
        message: String,
        retry_in: Duration,
    },

    /// Reconnect attempts exhausted; the subscriber has stopped
    Exhausted,
}
