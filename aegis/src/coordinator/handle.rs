//! CoordinatorHandle - Client interface for the triage loop

use eyre::{Result, eyre};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use super::messages::{CoordRequest, CoordinatorError, DashboardSnapshot, TriageEvent};
use crate::briefing::BriefingTicketState;
use crate::dispatch::{DispatchError, DispatchOutcome};
use crate::domain::AlertId;

/// Handle for operator surfaces to drive the Coordinator
///
/// Cloneable; every operation is a message to the Coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// Source for event subscriptions
    events: broadcast::Sender<TriageEvent>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, events: broadcast::Sender<TriageEvent>) -> Self {
        debug!("CoordinatorHandle::new: called");
        Self { tx, events }
    }

    /// Raw request sender, for feed tasks and map callbacks
    pub fn sender(&self) -> mpsc::Sender<CoordRequest> {
        self.tx.clone()
    }

    /// Subscribe to triage events
    pub fn subscribe_events(&self) -> broadcast::Receiver<TriageEvent> {
        debug!("CoordinatorHandle::subscribe_events: called");
        self.events.subscribe()
    }

    /// Capture the current dashboard state
    pub async fn snapshot(&self) -> Result<DashboardSnapshot> {
        debug!("CoordinatorHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Snapshot { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator dropped snapshot request"))
    }

    /// Select an alert in the queue
    pub async fn select(&self, id: &AlertId) -> Result<(), CoordinatorError> {
        debug!(%id, "CoordinatorHandle::select: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Select {
                id: id.clone(),
                reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;

        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    pub async fn clear_selection(&self) -> Result<()> {
        debug!("CoordinatorHandle::clear_selection: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::ClearSelection { reply_tx })
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator dropped clear request"))
    }

    /// Dispatch an alert and wait for the store write to settle
    ///
    /// Conflicts (already dispatched, already in flight, gone from the
    /// queue) are reported as `DispatchOutcome::Conflict`, not errors.
    pub async fn dispatch(&self, id: &AlertId) -> Result<DispatchOutcome, DispatchError> {
        debug!(%id, "CoordinatorHandle::dispatch: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::Dispatch {
                id: id.clone(),
                reply_tx,
            })
            .await
            .map_err(|_| DispatchError::ChannelClosed)?;

        reply_rx.await.map_err(|_| DispatchError::ChannelClosed)?
    }

    /// Request a briefing for the selected alert
    pub async fn request_briefing(&self) -> Result<BriefingTicketState, CoordinatorError> {
        debug!("CoordinatorHandle::request_briefing: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::RequestBriefing { reply_tx })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;

        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Look up a standard operating procedure in the configured language
    pub async fn standard_procedure(&self, query: &str) -> Result<String, CoordinatorError> {
        debug!(%query, "CoordinatorHandle::standard_procedure: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CoordRequest::StandardProcedure {
                query: query.to_string(),
                reply_tx,
            })
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;

        reply_rx.await.map_err(|_| CoordinatorError::ChannelClosed)?
    }

    /// Stop the Coordinator and release the map
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))?;
        Ok(())
    }
}
