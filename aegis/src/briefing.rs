//! BriefingCoordinator - live risk and briefing requests for the selection
//!
//! Every selection change bumps a generation counter. Outbound requests
//! capture the generation they were issued under and post it back with the
//! response; a response whose generation is no longer current is dropped.
//! Superseded tasks are also aborted so they stop consuming the service.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::coordinator::{CoordRequest, CoordinatorError};
use crate::domain::{AlertId, LiveRiskAssessment, TriageEntry};
use crate::risk::{BriefingRequest, RiskClient, RiskRequest, assess_live_risk};

/// Live risk for the current selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LiveRiskState {
    Idle,
    Loading,
    Ready(LiveRiskAssessment),
}

/// Briefing for the current selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BriefingState {
    Idle,
    InFlight,
    Ready(String),
    Failed(String),
}

/// What an accepted briefing request did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BriefingTicketState {
    /// Request sent to the briefing service
    Sent,

    /// Waiting for live risk; sent as soon as it resolves
    AwaitingLiveRisk,
}

/// Read-only view of the selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionView {
    pub entry: TriageEntry,
    pub generation: u64,
    pub live_risk: LiveRiskState,
    pub briefing: BriefingState,
}

impl SelectionView {
    pub fn id(&self) -> &AlertId {
        self.entry.id()
    }
}

struct Selection {
    entry: TriageEntry,
    live_risk: LiveRiskState,
    briefing: BriefingState,
    briefing_deferred: bool,
}

pub struct BriefingCoordinator {
    client: Arc<dyn RiskClient>,
    tx: mpsc::Sender<CoordRequest>,
    generation: u64,
    selection: Option<Selection>,
    tasks: Vec<JoinHandle<()>>,
}

impl BriefingCoordinator {
    pub fn new(client: Arc<dyn RiskClient>, tx: mpsc::Sender<CoordRequest>) -> Self {
        Self {
            client,
            tx,
            generation: 0,
            selection: None,
            tasks: Vec::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn selected_id(&self) -> Option<&AlertId> {
        self.selection.as_ref().map(|s| s.entry.id())
    }

    /// True when the selection's live risk resolved to ERROR
    pub fn live_risk_failed(&self) -> bool {
        matches!(
            self.selection.as_ref().map(|s| &s.live_risk),
            Some(LiveRiskState::Ready(assessment)) if assessment.is_error()
        )
    }

    pub fn view(&self) -> Option<SelectionView> {
        self.selection.as_ref().map(|s| SelectionView {
            entry: s.entry.clone(),
            generation: self.generation,
            live_risk: s.live_risk.clone(),
            briefing: s.briefing.clone(),
        })
    }

    /// Select an alert: cancel outstanding work and request fresh live risk
    pub fn select(&mut self, entry: TriageEntry) {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        debug!(id = %entry.id(), generation, "select: called");

        let request = RiskRequest::for_entry(&entry);
        let client = self.client.clone();
        let tx = self.tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let assessment = assess_live_risk(client.as_ref(), request).await;
            let _ = tx.send(CoordRequest::LiveRiskResolved { generation, assessment }).await;
        }));

        self.selection = Some(Selection {
            entry,
            live_risk: LiveRiskState::Loading,
            briefing: BriefingState::Idle,
            briefing_deferred: false,
        });
    }

    /// Drop the selection and anything in flight for it
    pub fn clear(&mut self) {
        debug!(generation = self.generation, "clear: called");
        self.cancel();
        self.generation += 1;
        self.selection = None;
    }

    /// Keep the selected entry in step with queue updates
    pub fn refresh(&mut self, entry: &TriageEntry) {
        if let Some(selection) = self.selection.as_mut()
            && selection.entry.id() == entry.id()
        {
            selection.entry = entry.clone();
        }
    }

    /// Apply a live risk response. Returns false for superseded responses.
    pub fn on_live_risk(&mut self, generation: u64, assessment: LiveRiskAssessment) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, "on_live_risk: dropping stale response");
            return false;
        }
        let Some(selection) = self.selection.as_mut() else {
            return false;
        };

        debug!(id = %selection.entry.id(), level = %assessment.level, "on_live_risk: applied");
        selection.live_risk = LiveRiskState::Ready(assessment);
        if selection.briefing_deferred {
            selection.briefing_deferred = false;
            self.spawn_briefing();
        }
        true
    }

    /// Request a briefing for the selection
    ///
    /// At most one briefing is outstanding per selection; a second request
    /// while one is in flight is rejected.
    pub fn request_briefing(&mut self) -> Result<BriefingTicketState, CoordinatorError> {
        let Some(selection) = self.selection.as_mut() else {
            return Err(CoordinatorError::Rejected("no alert selected".to_string()));
        };
        if selection.briefing == BriefingState::InFlight {
            debug!(id = %selection.entry.id(), "request_briefing: already in flight");
            return Err(CoordinatorError::Rejected("briefing already in flight".to_string()));
        }

        selection.briefing = BriefingState::InFlight;
        if selection.live_risk == LiveRiskState::Loading {
            debug!(id = %selection.entry.id(), "request_briefing: waiting for live risk");
            selection.briefing_deferred = true;
            return Ok(BriefingTicketState::AwaitingLiveRisk);
        }

        self.spawn_briefing();
        Ok(BriefingTicketState::Sent)
    }

    fn spawn_briefing(&mut self) {
        let Some(selection) = self.selection.as_ref() else {
            return;
        };
        let live = match &selection.live_risk {
            LiveRiskState::Ready(assessment) => Some(assessment),
            _ => None,
        };
        let request = BriefingRequest::new(&selection.entry, live);
        let generation = self.generation;
        debug!(id = %request.id, generation, "spawn_briefing: called");

        let client = self.client.clone();
        let tx = self.tx.clone();
        self.tasks.push(tokio::spawn(async move {
            let result = client.generate_briefing(request).await.map_err(|e| e.to_string());
            let _ = tx.send(CoordRequest::BriefingResolved { generation, result }).await;
        }));
    }

    /// Apply a briefing response. Returns false for superseded responses.
    pub fn on_briefing(&mut self, generation: u64, result: Result<String, String>) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, "on_briefing: dropping stale response");
            return false;
        }
        let Some(selection) = self.selection.as_mut() else {
            return false;
        };

        selection.briefing = match result {
            Ok(text) => BriefingState::Ready(text),
            Err(message) => {
                warn!(id = %selection.entry.id(), error = %message, "Briefing failed");
                BriefingState::Failed(message)
            }
        };
        true
    }

    /// Abort outstanding requests
    pub fn cancel(&mut self) {
        self.tasks.retain(|t| !t.is_finished());
        if !self.tasks.is_empty() {
            debug!(tasks = self.tasks.len(), "cancel: aborting in-flight requests");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for BriefingCoordinator {
    fn drop(&mut self) {
        self.cancel();
    }
}
