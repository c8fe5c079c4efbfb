//! Main Coordinator task implementation
//!
//! One task owns the queue, the dispatch state machine, the selection and the
//! map. Feed batches, operator commands, service responses and clock ticks
//! all arrive as `CoordRequest`s on one channel and are handled one at a
//! time, so a batch is applied, re-sorted and mirrored to the map within a
//! single turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{CoordRequest, CoordinatorError, DashboardSnapshot, FeedStatus, TriageEvent};
use crate::briefing::{BriefingCoordinator, BriefingState};
use crate::config::{ClockConfig, Config, FeedConfig};
use crate::dispatch::{DispatchConflict, DispatchCoordinator, DispatchError, DispatchOutcome, DispatchTicket};
use crate::domain::{AlertId, AlertStatus};
use crate::enricher::AlertEnricher;
use crate::feed::{ChangeFeedSource, ChangeFeedSubscriber, FeedFilter};
use crate::geo::{GeoError, GeoSync, MapProvider};
use crate::profile::ProfileResolver;
use crate::queue::{QueueOp, TriageQueue};
use crate::risk::{RiskClient, RiskError, SopRequest};
use crate::store::{AlertStore, ProfileStore, StoreError};

/// The triage coordinator
pub struct Coordinator {
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
    events: broadcast::Sender<TriageEvent>,

    queue: TriageQueue,
    dispatch: DispatchCoordinator,
    briefing: BriefingCoordinator,
    geo: GeoSync,

    alerts: Arc<dyn AlertStore>,
    risk: Arc<dyn RiskClient>,
    language: String,

    feed_status: FeedStatus,
    feed_tasks: Vec<JoinHandle<()>>,

    clock_config: ClockConfig,
    offset: FixedOffset,
    clock: DateTime<FixedOffset>,
}

impl Coordinator {
    /// Create a coordinator and acquire the map
    pub fn new(
        config: &Config,
        alerts: Arc<dyn AlertStore>,
        risk: Arc<dyn RiskClient>,
        map: &dyn MapProvider,
    ) -> Result<Self, GeoError> {
        let coordinator: &CoordinatorConfig = &config.coordinator;
        debug!(?coordinator, "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(coordinator.channel_buffer.max(1));
        let (events, _) = broadcast::channel(coordinator.event_buffer.max(1));

        let geo = GeoSync::attach(map, &config.map, tx.clone())?;
        let briefing = BriefingCoordinator::new(risk.clone(), tx.clone());

        let offset = config.clock.offset().unwrap_or_else(|| {
            warn!(minutes = config.clock.utc_offset_minutes, "Clock offset out of range, using UTC");
            Utc.fix()
        });

        Ok(Self {
            tx,
            rx,
            events,
            queue: TriageQueue::new(),
            dispatch: DispatchCoordinator::new(),
            briefing,
            geo,
            alerts,
            risk,
            language: config.risk.language.clone(),
            feed_status: FeedStatus::Connecting,
            feed_tasks: Vec::new(),
            clock_config: config.clock.clone(),
            offset,
            clock: Utc::now().with_timezone(&offset),
        })
    }

    /// Get a sender for creating handles
    pub fn sender(&self) -> mpsc::Sender<CoordRequest> {
        self.tx.clone()
    }

    /// Create a handle for callers
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.events.clone())
    }

    /// Subscribe to the live feed: spawns the subscriber and enricher tasks
    ///
    /// They are aborted when the coordinator stops.
    pub fn attach_feed(
        &mut self,
        source: Arc<dyn ChangeFeedSource>,
        profiles: Arc<dyn ProfileStore>,
        feed: &FeedConfig,
    ) {
        debug!("attach_feed: called");
        let (feed_tx, feed_rx) = mpsc::channel(feed.channel_buffer.max(1));
        let subscriber = ChangeFeedSubscriber::new(source, FeedFilter::pending(), feed.clone());
        let enricher = AlertEnricher::new(ProfileResolver::new(profiles));

        self.feed_tasks.push(tokio::spawn(subscriber.run(feed_tx)));
        self.feed_tasks.push(tokio::spawn(enricher.run(feed_rx, self.tx.clone())));
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(self.clock_config.tick().max(Duration::from_millis(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Coordinator started");

        loop {
            tokio::select! {
                req = self.rx.recv() => match req {
                    Some(CoordRequest::Shutdown) | None => {
                        debug!("run: shutdown requested");
                        break;
                    }
                    Some(req) => self.handle_request(req),
                },
                _ = tick.tick() => {
                    self.clock = Utc::now().with_timezone(&self.offset);
                }
            }
        }

        self.stop();
        info!("Coordinator stopped");
    }

    fn stop(&mut self) {
        for task in self.feed_tasks.drain(..) {
            task.abort();
        }
        self.briefing.cancel();
        self.geo.release();
    }

    fn emit(&self, event: TriageEvent) {
        debug!(?event, "emit: called");
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn handle_request(&mut self, req: CoordRequest) {
        match req {
            CoordRequest::Ingest(ops) => self.ingest(ops),

            CoordRequest::FeedStatus(status) => {
                if status != self.feed_status {
                    info!(%status, "Feed status changed");
                    self.feed_status = status.clone();
                    self.emit(TriageEvent::FeedStatusChanged(status));
                }
            }

            CoordRequest::MarkerClicked(id) => {
                debug!(%id, "MarkerClicked");
                if let Err(e) = self.select(&id) {
                    warn!(%id, error = %e, "Marker click ignored");
                }
            }

            CoordRequest::Select { id, reply_tx } => {
                let _ = reply_tx.send(self.select(&id));
            }

            CoordRequest::ClearSelection { reply_tx } => {
                self.clear_selection();
                let _ = reply_tx.send(());
            }

            CoordRequest::Dispatch { id, reply_tx } => self.begin_dispatch(id, reply_tx),

            CoordRequest::DispatchResolved {
                ticket,
                result,
                reply_tx,
            } => {
                let outcome = self.finish_dispatch(ticket, result);
                let _ = reply_tx.send(outcome);
            }

            CoordRequest::RequestBriefing { reply_tx } => {
                let result = self.briefing.request_briefing();
                if result.is_ok()
                    && let Some(id) = self.briefing.selected_id().cloned()
                {
                    self.emit(TriageEvent::BriefingUpdated {
                        id,
                        state: BriefingState::InFlight,
                    });
                }
                let _ = reply_tx.send(result);
            }

            CoordRequest::LiveRiskResolved { generation, assessment } => {
                if self.briefing.on_live_risk(generation, assessment.clone())
                    && let Some(id) = self.briefing.selected_id().cloned()
                {
                    self.emit(TriageEvent::LiveRiskUpdated { id, assessment });
                }
            }

            CoordRequest::BriefingResolved { generation, result } => {
                if self.briefing.on_briefing(generation, result)
                    && let Some(view) = self.briefing.view()
                {
                    self.emit(TriageEvent::BriefingUpdated {
                        id: view.id().clone(),
                        state: view.briefing,
                    });
                }
            }

            CoordRequest::StandardProcedure { query, reply_tx } => self.standard_procedure(query, reply_tx),

            CoordRequest::Snapshot { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }

            CoordRequest::Shutdown => {}
        }
    }

    /// Apply one enriched batch and re-sort once
    fn ingest(&mut self, ops: Vec<QueueOp>) {
        debug!(ops = ops.len(), "ingest: called");
        for op in ops {
            if !self.dispatch.admits(&op) {
                continue;
            }
            if let QueueOp::Upsert(entry) = &op {
                self.briefing.refresh(entry);
            }
            self.queue.apply(op);
        }
        self.commit_queue();
    }

    /// Re-sort, drop a selection that left the queue, and mirror to the map
    fn commit_queue(&mut self) {
        let changes = self.queue.commit();
        if changes.is_empty() {
            return;
        }

        if let Some(selected) = self.briefing.selected_id().cloned()
            && !self.queue.contains(&selected)
        {
            debug!(id = %selected, "commit_queue: selected alert left the queue");
            self.clear_selection();
        }

        self.geo.reconcile(self.queue.entries());
        self.emit(TriageEvent::QueueChanged(changes));
    }

    fn select(&mut self, id: &AlertId) -> Result<(), CoordinatorError> {
        debug!(%id, "select: called");
        let entry = self
            .queue
            .get(id)
            .cloned()
            .ok_or_else(|| CoordinatorError::NotFound(id.clone()))?;

        if self.briefing.selected_id() == Some(id) {
            if !self.briefing.live_risk_failed() {
                debug!(%id, "select: already selected");
                return Ok(());
            }
            info!(%id, "Re-selected after live risk failure, retrying");
        }

        self.geo.focus(&entry);
        self.briefing.select(entry);
        self.emit(TriageEvent::SelectionChanged(Some(id.clone())));
        Ok(())
    }

    fn clear_selection(&mut self) {
        if self.briefing.selected_id().is_some() {
            self.briefing.clear();
            self.emit(TriageEvent::SelectionChanged(None));
        }
    }

    fn begin_dispatch(&mut self, id: AlertId, reply_tx: oneshot::Sender<Result<DispatchOutcome, DispatchError>>) {
        debug!(%id, "begin_dispatch: called");
        let ticket = match self.dispatch.stage(&id, &self.queue) {
            Ok(ticket) => ticket,
            Err(conflict) => {
                info!(%id, %conflict, "Dispatch conflict");
                let _ = reply_tx.send(Ok(DispatchOutcome::Conflict(conflict)));
                return;
            }
        };

        let alerts = self.alerts.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = alerts
                .set_status(&ticket.id, AlertStatus::Dispatched)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound(_) => DispatchError::NotFound { id: ticket.id.clone() },
                    e => DispatchError::Store {
                        id: ticket.id.clone(),
                        message: e.to_string(),
                        retryable: e.is_retryable(),
                    },
                });
            let _ = tx
                .send(CoordRequest::DispatchResolved {
                    ticket,
                    result,
                    reply_tx,
                })
                .await;
        });
    }

    fn finish_dispatch(
        &mut self,
        ticket: DispatchTicket,
        result: Result<(), DispatchError>,
    ) -> Result<DispatchOutcome, DispatchError> {
        debug!(id = %ticket.id, ok = result.is_ok(), "finish_dispatch: called");
        match result {
            Ok(()) => {
                if !self.dispatch.commit(&ticket, &mut self.queue) {
                    return Ok(DispatchOutcome::Conflict(DispatchConflict::Vanished));
                }
                info!(id = %ticket.id, "Alert dispatched");
                self.commit_queue();
                self.emit(TriageEvent::Dispatched(ticket.id));
                Ok(DispatchOutcome::Dispatched)
            }
            Err(DispatchError::NotFound { .. }) => {
                self.dispatch.rollback(&ticket);
                info!(id = %ticket.id, "Dispatch target gone from the store, awaiting feed removal");
                Ok(DispatchOutcome::Conflict(DispatchConflict::Vanished))
            }
            Err(e) => {
                self.dispatch.rollback(&ticket);
                warn!(id = %ticket.id, error = %e, "Dispatch failed, alert remains pending");
                self.emit(TriageEvent::DispatchFailed {
                    id: ticket.id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn standard_procedure(&self, query: String, reply_tx: oneshot::Sender<Result<String, CoordinatorError>>) {
        debug!(%query, "standard_procedure: called");
        if query.trim().is_empty() {
            let err = RiskError::InvalidRequest("SOP query is empty".to_string());
            let _ = reply_tx.send(Err(err.into()));
            return;
        }

        let request = SopRequest {
            query,
            language: self.language.clone(),
        };
        let risk = self.risk.clone();
        tokio::spawn(async move {
            let result = risk.standard_procedure(request).await.map_err(CoordinatorError::from);
            let _ = reply_tx.send(result);
        });
    }

    fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            entries: self.queue.snapshot(),
            selection: self.briefing.view(),
            feed: self.feed_status.clone(),
            clock: self.clock,
            staged: self.dispatch.staged_ids(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::briefing::LiveRiskState;
    use crate::domain::{Alert, AlertType, LiveRiskAssessment, ReporterProfile, RiskLevel, TriageEntry};
    use crate::geo::HeadlessMapProvider;
    use crate::risk::client::mock::{MockRiskClient, Scripted};
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    struct Harness {
        handle: CoordinatorHandle,
        store: Arc<MemoryStore>,
        risk: Arc<MockRiskClient>,
        map: HeadlessMapProvider,
        task: JoinHandle<()>,
    }

    fn start() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let risk = Arc::new(MockRiskClient::new());
        let map = HeadlessMapProvider::new();
        let coord = Coordinator::new(&Config::default(), store.clone(), risk.clone(), &map).unwrap();
        let handle = coord.handle();
        let task = tokio::spawn(coord.run());
        Harness {
            handle,
            store,
            risk,
            map,
            task,
        }
    }

    fn entry(id: &str, level: RiskLevel, t: i64) -> TriageEntry {
        let lat = 13.0 + t as f64 / 100.0;
        let alert = Alert::new(id, "u1", AlertType::Fire, lat, 80.0, Utc.timestamp_opt(t, 0).unwrap())
            .with_risk(level, "static");
        TriageEntry::new(alert, ReporterProfile::default())
    }

    async fn ingest(h: &Harness, ops: Vec<QueueOp>) {
        // Snapshot round-trip orders after the ingest
        h.handle.sender().send(CoordRequest::Ingest(ops)).await.unwrap();
        h.handle.snapshot().await.unwrap();
    }

    async fn seed(h: &Harness, entries: &[TriageEntry]) {
        for e in entries {
            h.store.insert_alert(e.alert.clone());
        }
        ingest(h, entries.iter().cloned().map(QueueOp::Upsert).collect()).await;
    }

    #[tokio::test]
    async fn test_ingest_orders_and_mirrors_to_map() {
        let h = start();
        ingest(&h, vec![QueueOp::Upsert(entry("a1", RiskLevel::High, 1))]).await;
        ingest(&h, vec![QueueOp::Upsert(entry("a2", RiskLevel::Medium, 2))]).await;
        ingest(&h, vec![QueueOp::Upsert(entry("a3", RiskLevel::High, 3))]).await;

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.ids(), vec!["a1", "a3", "a2"]);
        assert_eq!(h.map.view().marker_ids().len(), 3);
        assert_eq!(snap.feed, FeedStatus::Connecting);

        h.handle.shutdown().await.unwrap();
        h.task.await.unwrap();
        assert!(!h.map.view().is_acquired());
    }

    #[tokio::test]
    async fn test_dispatch_removes_entry_and_marker() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1), entry("a2", RiskLevel::Low, 2)]).await;
        let id = AlertId::new("a1");

        let outcome = h.handle.dispatch(&id).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Dispatched);

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.ids(), vec!["a2"]);
        assert!(h.map.view().marker(&id).is_none());
        assert_eq!(h.store.alert(&id).unwrap().status, AlertStatus::Dispatched);

        // Again: benign no-op
        let outcome = h.handle.dispatch(&id).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Conflict(DispatchConflict::AlreadyDispatched));
        assert_eq!(h.handle.snapshot().await.unwrap().ids(), vec!["a2"]);
        assert_eq!(h.store.status_writes(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_rolls_back() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;
        let mut events = h.handle.subscribe_events();
        h.store.fail_next_status_write("store unavailable");
        let id = AlertId::new("a1");

        let err = h.handle.dispatch(&id).await.unwrap_err();
        assert!(err.is_retryable());

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.ids(), vec!["a1"]);
        assert!(snap.staged.is_empty());
        assert_eq!(h.store.alert(&id).unwrap().status, AlertStatus::Pending);

        match events.recv().await.unwrap() {
            TriageEvent::DispatchFailed { id: failed, .. } => assert_eq!(failed, id),
            other => panic!("expected DispatchFailed, got {:?}", other),
        }

        // A fresh attempt succeeds
        assert_eq!(h.handle.dispatch(&id).await.unwrap(), DispatchOutcome::Dispatched);
    }

    #[tokio::test]
    async fn test_entry_stays_visible_while_staged() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;
        h.store.set_status_delay(Duration::from_millis(100));
        let id = AlertId::new("a1");

        let handle = h.handle.clone();
        let pending = tokio::spawn({
            let id = id.clone();
            async move { handle.dispatch(&id).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let snap = h.handle.snapshot().await.unwrap();
        assert_eq!(snap.ids(), vec!["a1"]);
        assert!(snap.is_staged(&id));

        // A second operator click while in flight
        assert_eq!(
            h.handle.dispatch(&id).await.unwrap(),
            DispatchOutcome::Conflict(DispatchConflict::InFlight)
        );

        assert_eq!(pending.await.unwrap().unwrap(), DispatchOutcome::Dispatched);
        assert!(h.handle.snapshot().await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn test_dispatched_alert_never_reenters() {
        let h = start();
        let e = entry("a1", RiskLevel::High, 1);
        seed(&h, std::slice::from_ref(&e)).await;
        h.handle.dispatch(e.id()).await.unwrap();

        // Stale ADD replay
        ingest(&h, vec![QueueOp::Upsert(e.clone())]).await;
        assert!(h.handle.snapshot().await.unwrap().entries.is_empty());
        assert!(h.map.view().marker_ids().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_clears_selection() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;
        let id = AlertId::new("a1");

        h.handle.select(&id).await.unwrap();
        h.handle.dispatch(&id).await.unwrap();
        assert!(h.handle.snapshot().await.unwrap().selection.is_none());
    }

    #[tokio::test]
    async fn test_select_focuses_map_and_loads_live_risk() {
        let h = start();
        let e = entry("a1", RiskLevel::High, 1);
        h.risk.script(e.alert.latitude, Scripted::Respond(RiskLevel::Low, "calm".to_string()));
        seed(&h, std::slice::from_ref(&e)).await;

        h.handle.select(e.id()).await.unwrap();
        assert_eq!(h.map.view().zoom(), 15);
        assert_eq!(h.map.view().center(), e.alert.coordinates());

        let snap = wait_for(&h.handle, |s| {
            matches!(s.selection.as_ref().map(|v| &v.live_risk), Some(LiveRiskState::Ready(_)))
        })
        .await;
        let view = snap.selection.unwrap();
        assert_eq!(view.live_risk, LiveRiskState::Ready(LiveRiskAssessment::new(RiskLevel::Low, "calm")));
        // Static risk unchanged by the live assessment
        assert_eq!(snap.entries[0].alert.risk_level, Some(RiskLevel::High));
    }

    #[tokio::test]
    async fn test_late_live_risk_for_previous_selection_ignored() {
        let h = start();
        let a = entry("a", RiskLevel::High, 1);
        let b = entry("b", RiskLevel::High, 2);
        h.risk.script(
            a.alert.latitude,
            Scripted::Delayed(Duration::from_millis(80), RiskLevel::High, "for a".to_string()),
        );
        h.risk.script(b.alert.latitude, Scripted::Respond(RiskLevel::Low, "for b".to_string()));
        seed(&h, &[a.clone(), b.clone()]).await;

        h.handle.select(a.id()).await.unwrap();
        h.handle.select(b.id()).await.unwrap();

        // Let A's delayed response (if it survived) arrive
        tokio::time::sleep(Duration::from_millis(150)).await;
        let view = h.handle.snapshot().await.unwrap().selection.unwrap();
        assert_eq!(view.id(), b.id());
        assert_eq!(view.live_risk, LiveRiskState::Ready(LiveRiskAssessment::new(RiskLevel::Low, "for b")));
    }

    #[tokio::test]
    async fn test_reselect_retries_failed_live_risk() {
        let h = start();
        let e = entry("a1", RiskLevel::High, 1);
        h.risk.script(e.alert.latitude, Scripted::Fail("service down".to_string()));
        seed(&h, std::slice::from_ref(&e)).await;

        h.handle.select(e.id()).await.unwrap();
        wait_for(&h.handle, |s| {
            matches!(s.selection.as_ref().map(|v| &v.live_risk), Some(LiveRiskState::Ready(a)) if a.is_error())
        })
        .await;

        h.risk.script(e.alert.latitude, Scripted::Respond(RiskLevel::Low, "recovered".to_string()));
        h.handle.select(e.id()).await.unwrap();
        let snap = wait_for(&h.handle, |s| {
            matches!(s.selection.as_ref().map(|v| &v.live_risk), Some(LiveRiskState::Ready(a)) if !a.is_error())
        })
        .await;
        let view = snap.selection.unwrap();
        assert_eq!(view.live_risk, LiveRiskState::Ready(LiveRiskAssessment::new(RiskLevel::Low, "recovered")));
    }

    #[tokio::test]
    async fn test_reselect_keeps_healthy_live_risk() {
        let h = start();
        let e = entry("a1", RiskLevel::High, 1);
        h.risk.script(e.alert.latitude, Scripted::Respond(RiskLevel::Low, "calm".to_string()));
        seed(&h, std::slice::from_ref(&e)).await;

        h.handle.select(e.id()).await.unwrap();
        let before = wait_for(&h.handle, |s| {
            matches!(s.selection.as_ref().map(|v| &v.live_risk), Some(LiveRiskState::Ready(_)))
        })
        .await;

        h.handle.select(e.id()).await.unwrap();
        let after = h.handle.snapshot().await.unwrap();
        assert_eq!(after.selection.unwrap().generation, before.selection.unwrap().generation);
    }

    #[tokio::test]
    async fn test_dispatch_of_alert_missing_from_store_is_vanished() {
        let h = start();
        // In the queue but never written to the store
        ingest(&h, vec![QueueOp::Upsert(entry("a1", RiskLevel::High, 1))]).await;
        let mut events = h.handle.subscribe_events();
        let id = AlertId::new("a1");

        let outcome = h.handle.dispatch(&id).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Conflict(DispatchConflict::Vanished));

        let snap = h.handle.snapshot().await.unwrap();
        assert!(snap.staged.is_empty());
        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, TriageEvent::DispatchFailed { .. }), "unexpected {:?}", event);
        }
    }

    #[tokio::test]
    async fn test_select_unknown_is_not_found() {
        let h = start();
        let err = h.handle.select(&AlertId::new("ghost")).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_marker_click_selects() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;

        assert!(h.map.view().click(&AlertId::new("a1")));
        let snap = wait_for(&h.handle, |s| s.selection.is_some()).await;
        assert_eq!(snap.selection.unwrap().id().as_str(), "a1");
    }

    #[tokio::test]
    async fn test_feed_removal_of_selected_clears_selection() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;
        h.handle.select(&AlertId::new("a1")).await.unwrap();

        ingest(&h, vec![QueueOp::Remove(AlertId::new("a1"))]).await;
        let snap = h.handle.snapshot().await.unwrap();
        assert!(snap.selection.is_none());
        assert!(snap.entries.is_empty());
    }

    #[tokio::test]
    async fn test_briefing_flow() {
        let h = start();
        seed(&h, &[entry("a1", RiskLevel::High, 1)]).await;
        h.risk.set_briefing_delay(Duration::from_millis(50));
        h.handle.select(&AlertId::new("a1")).await.unwrap();

        h.handle.request_briefing().await.unwrap();
        let second = h.handle.request_briefing().await;
        assert!(matches!(second, Err(CoordinatorError::Rejected(_))));

        let snap = wait_for(&h.handle, |s| {
            matches!(s.selection.as_ref().map(|v| &v.briefing), Some(BriefingState::Ready(_)))
        })
        .await;
        assert_eq!(
            snap.selection.unwrap().briefing,
            BriefingState::Ready("Briefing for a1".to_string())
        );
        assert_eq!(h.risk.briefing_calls(), 1);
    }

    #[tokio::test]
    async fn test_standard_procedure() {
        let h = start();
        assert_eq!(h.handle.standard_procedure("flood").await.unwrap(), "1. Assess flood");
        assert!(matches!(
            h.handle.standard_procedure("  ").await,
            Err(CoordinatorError::Risk(RiskError::InvalidRequest(_)))
        ));
    }

    #[tokio::test]
    async fn test_feed_status_events() {
        let h = start();
        let mut events = h.handle.subscribe_events();
        h.handle
            .sender()
            .send(CoordRequest::FeedStatus(FeedStatus::Live))
            .await
            .unwrap();

        assert_eq!(events.recv().await.unwrap(), TriageEvent::FeedStatusChanged(FeedStatus::Live));
        assert_eq!(h.handle.snapshot().await.unwrap().feed, FeedStatus::Live);
    }

    #[tokio::test]
    async fn test_attached_feed_populates_queue() {
        let store = Arc::new(MemoryStore::new());
        store.insert_alert(entry("a1", RiskLevel::Medium, 1).alert);
        let map = HeadlessMapProvider::new();
        let mut coord = Coordinator::new(
            &Config::default(),
            store.clone(),
            Arc::new(MockRiskClient::new()),
            &map,
        )
        .unwrap();
        coord.attach_feed(store.clone(), store.clone(), &FeedConfig::default());
        let handle = coord.handle();
        tokio::spawn(coord.run());

        let snap = wait_for(&handle, |s| s.entries.len() == 1 && s.feed == FeedStatus::Live).await;
        assert_eq!(snap.ids(), vec!["a1"]);
        handle.shutdown().await.unwrap();
    }

    async fn wait_for(handle: &CoordinatorHandle, pred: impl Fn(&DashboardSnapshot) -> bool) -> DashboardSnapshot {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let snap = handle.snapshot().await.unwrap();
            if pred(&snap) {
                return snap;
            }
            assert!(tokio::time::Instant::now() < deadline, "condition not reached");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
