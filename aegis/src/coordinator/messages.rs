//! Message types for the Coordinator

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::briefing::{BriefingState, BriefingTicketState, SelectionView};
use crate::dispatch::{DispatchError, DispatchOutcome, DispatchTicket};
use crate::domain::{AlertId, LiveRiskAssessment, TriageEntry};
use crate::queue::{QueueChanges, QueueOp};
use crate::risk::RiskError;

/// Errors returned to coordinator callers
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Alert not found: {0}")]
    NotFound(AlertId),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error(transparent)]
    Risk(#[from] RiskError),

    #[error("Coordinator channel closed")]
    ChannelClosed,
}

/// Connectivity of the live alert feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FeedStatus {
    Connecting,
    Live,
    Degraded { attempt: u32, message: String },
    Offline,
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Live => write!(f, "LIVE"),
            Self::Degraded { attempt, message } => write!(f, "DEGRADED (attempt {}: {})", attempt, message),
            Self::Offline => write!(f, "OFFLINE"),
        }
    }
}

/// Everything the dashboard renders, captured in one loop turn
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    /// Active alerts in triage order
    pub entries: Vec<TriageEntry>,

    pub selection: Option<SelectionView>,
    pub feed: FeedStatus,

    /// Command-center local time as of the last tick
    pub clock: DateTime<FixedOffset>,

    /// Alerts with a dispatch awaiting the store
    pub staged: Vec<AlertId>,
}

impl DashboardSnapshot {
    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.id().as_str()).collect()
    }

    pub fn is_staged(&self, id: &AlertId) -> bool {
        self.staged.contains(id)
    }
}

/// State-change notifications broadcast by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum TriageEvent {
    QueueChanged(QueueChanges),
    SelectionChanged(Option<AlertId>),
    LiveRiskUpdated { id: AlertId, assessment: LiveRiskAssessment },
    BriefingUpdated { id: AlertId, state: BriefingState },
    Dispatched(AlertId),
    DispatchFailed { id: AlertId, message: String },
    FeedStatusChanged(FeedStatus),
}

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Enriched feed batch; applied and re-sorted as one unit
    Ingest(Vec<QueueOp>),

    /// Feed connectivity changed
    FeedStatus(FeedStatus),

    /// A map marker was clicked
    MarkerClicked(AlertId),

    Select {
        id: AlertId,
        reply_tx: oneshot::Sender<Result<(), CoordinatorError>>,
    },

    ClearSelection {
        reply_tx: oneshot::Sender<()>,
    },

    Dispatch {
        id: AlertId,
        reply_tx: oneshot::Sender<Result<DispatchOutcome, DispatchError>>,
    },

    /// Store write for a staged dispatch finished (internal)
    DispatchResolved {
        ticket: DispatchTicket,
        result: Result<(), DispatchError>,
        reply_tx: oneshot::Sender<Result<DispatchOutcome, DispatchError>>,
    },

    RequestBriefing {
        reply_tx: oneshot::Sender<Result<BriefingTicketState, CoordinatorError>>,
    },

    /// Live risk response, tagged with the selection generation (internal)
    LiveRiskResolved {
        generation: u64,
        assessment: LiveRiskAssessment,
    },

    /// Briefing response, tagged with the selection generation (internal)
    BriefingResolved {
        generation: u64,
        result: Result<String, String>,
    },

    StandardProcedure {
        query: String,
        reply_tx: oneshot::Sender<Result<String, CoordinatorError>>,
    },

    Snapshot {
        reply_tx: oneshot::Sender<DashboardSnapshot>,
    },

    /// Release the map and stop the loop
    Shutdown,
}
