//! Integration tests for Aegis
//!
//! These drive the full pipeline: in-memory store feed, subscriber,
//! enricher, coordinator and headless map, through the public handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use aegis::briefing::{BriefingState, LiveRiskState};
use aegis::config::Config;
use aegis::coordinator::{Coordinator, CoordinatorHandle, DashboardSnapshot, FeedStatus, TriageEvent};
use aegis::dispatch::{DispatchConflict, DispatchOutcome};
use aegis::domain::{
    Alert, AlertId, AlertStatus, AlertType, LiveRiskAssessment, ReporterProfile, RiskLevel, VulnerabilityStatus,
};
use aegis::feed::{RawAlertRecord, RawChange};
use aegis::geo::HeadlessMapProvider;
use aegis::risk::{BriefingRequest, RiskClient, RiskError, RiskRequest, RiskResponse, SopRequest};
use aegis::store::{AlertStore, MemoryStore};

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Clone)]
enum Behaviour {
    Respond(RiskLevel, &'static str),
    Delayed(Duration, RiskLevel, &'static str),
    TimedOut,
}

/// Risk service scripted per latitude
#[derive(Default)]
struct ScriptedRisk {
    by_lat: Mutex<HashMap<String, Behaviour>>,
    briefings: Mutex<Vec<BriefingRequest>>,
}

impl ScriptedRisk {
    fn script(&self, lat: f64, behaviour: Behaviour) {
        self.by_lat.lock().unwrap().insert(format!("{:.4}", lat), behaviour);
    }

    fn briefings(&self) -> Vec<BriefingRequest> {
        self.briefings.lock().unwrap().clone()
    }
}

#[async_trait]
impl RiskClient for ScriptedRisk {
    async fn assess(&self, request: RiskRequest) -> Result<RiskResponse, RiskError> {
        let behaviour = self.by_lat.lock().unwrap().get(&format!("{:.4}", request.lat)).cloned();
        match behaviour {
            Some(Behaviour::Respond(risk_level, reason)) => Ok(RiskResponse {
                risk_level,
                risk_reason: reason.to_string(),
            }),
            Some(Behaviour::Delayed(delay, risk_level, reason)) => {
                tokio::time::sleep(delay).await;
                Ok(RiskResponse {
                    risk_level,
                    risk_reason: reason.to_string(),
                })
            }
            Some(Behaviour::TimedOut) => Err(RiskError::Timeout(Duration::from_secs(5))),
            None => Ok(RiskResponse {
                risk_level: RiskLevel::Medium,
                risk_reason: "default".to_string(),
            }),
        }
    }

    async fn generate_briefing(&self, request: BriefingRequest) -> Result<String, RiskError> {
        let text = format!("Briefing {}", request.id);
        self.briefings.lock().unwrap().push(request);
        Ok(text)
    }

    async fn standard_procedure(&self, request: SopRequest) -> Result<String, RiskError> {
        Ok(format!("SOP[{}]: {}", request.language, request.query))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    risk: Arc<ScriptedRisk>,
    map: HeadlessMapProvider,
    handle: CoordinatorHandle,
    task: tokio::task::JoinHandle<()>,
}

fn fast_config() -> Config {
    let mut config = Config::default();
    config.feed.initial_backoff_ms = 10;
    config.feed.max_backoff_ms = 40;
    config.feed.max_retries = 3;
    config.clock.tick_ms = 50;
    config
}

fn start(store: MemoryStore, risk: ScriptedRisk) -> Harness {
    let config = fast_config();
    let store = Arc::new(store);
    let risk = Arc::new(risk);
    let map = HeadlessMapProvider::new();

    let mut coordinator = Coordinator::new(&config, store.clone(), risk.clone(), &map).expect("map available");
    coordinator.attach_feed(store.clone(), store.clone(), &config.feed);
    let handle = coordinator.handle();
    let task = tokio::spawn(coordinator.run());

    Harness {
        store,
        risk,
        map,
        handle,
        task,
    }
}

fn alert(id: &str, reporter: &str, level: RiskLevel, t: i64) -> Alert {
    Alert::new(
        id,
        reporter,
        AlertType::Flood,
        13.0 + t as f64 / 100.0,
        80.25,
        Utc.timestamp_opt(t, 0).unwrap(),
    )
    .with_risk(level, "static")
}

async fn wait_for(handle: &CoordinatorHandle, pred: impl Fn(&DashboardSnapshot) -> bool) -> DashboardSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let snap = handle.snapshot().await.expect("coordinator running");
        if pred(&snap) {
            return snap;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached; last snapshot: {:?}",
            snap.ids()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =============================================================================
// Queue ordering and idempotence
// =============================================================================

#[tokio::test]
async fn test_feed_adds_are_ordered_by_risk_then_arrival() {
    let h = start(MemoryStore::new(), ScriptedRisk::default());
    wait_for(&h.handle, |s| s.feed == FeedStatus::Live).await;

    h.store.insert_alert(alert("a1", "u1", RiskLevel::High, 1));
    h.store.insert_alert(alert("a2", "u1", RiskLevel::Medium, 2));
    h.store.insert_alert(alert("a3", "u1", RiskLevel::High, 3));

    let snap = wait_for(&h.handle, |s| s.entries.len() == 3).await;
    assert_eq!(snap.ids(), vec!["a1", "a3", "a2"]);
    assert_eq!(h.map.view().marker_ids().len(), 3);
}

#[tokio::test]
async fn test_redelivered_add_is_idempotent() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    store.insert_alert(alert("a2", "u1", RiskLevel::Low, 2));
    let h = start(store, ScriptedRisk::default());

    let before = wait_for(&h.handle, |s| s.entries.len() == 2).await;
    let marker_calls = h.map.view().call_counts();

    h.store.inject(vec![RawChange::Added(RawAlertRecord::from(&a1))]);
    h.store.inject(vec![RawChange::Added(RawAlertRecord::from(&a1))]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let after = h.handle.snapshot().await.unwrap();
    assert_eq!(after.entries, before.entries);
    assert_eq!(h.map.view().call_counts(), marker_calls);
}

#[tokio::test]
async fn test_modified_alert_updates_in_place() {
    let store = MemoryStore::new();
    store.insert_alert(alert("a1", "u1", RiskLevel::Low, 1));
    store.insert_alert(alert("a2", "u1", RiskLevel::Medium, 2));
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.ids() == vec!["a2", "a1"]).await;

    h.store.insert_alert(alert("a1", "u1", RiskLevel::High, 1).with_details("water at chest height"));

    let snap = wait_for(&h.handle, |s| s.ids() == vec!["a1", "a2"]).await;
    assert_eq!(snap.entries[0].alert.details, "water at chest height");
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_dispatch_removes_alert_and_marker_then_noop() {
    let store = MemoryStore::new();
    store.insert_alert(alert("a1", "u1", RiskLevel::High, 1));
    store.insert_alert(alert("a2", "u1", RiskLevel::Medium, 2));
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 2).await;
    let id = AlertId::new("a1");

    assert_eq!(h.handle.dispatch(&id).await.unwrap(), DispatchOutcome::Dispatched);
    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.ids(), vec!["a2"]);
    assert!(h.map.view().marker(&id).is_none());
    assert_eq!(h.store.alert(&id).unwrap().status, AlertStatus::Dispatched);

    let again = h.handle.dispatch(&id).await.unwrap();
    assert_eq!(again, DispatchOutcome::Conflict(DispatchConflict::AlreadyDispatched));
    assert_eq!(h.handle.snapshot().await.unwrap().ids(), vec!["a2"]);
}

#[tokio::test]
async fn test_dispatched_alert_never_reappears() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 1).await;

    h.handle.dispatch(&AlertId::new("a1")).await.unwrap();

    // Replay the pre-dispatch record, as a lagging replica would
    h.store.inject(vec![RawChange::Added(RawAlertRecord::from(&a1))]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.handle.snapshot().await.unwrap().entries.is_empty());
    assert!(h.map.view().marker_ids().is_empty());
}

#[tokio::test]
async fn test_alert_dispatched_elsewhere_never_reappears() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 1).await;

    // Another operator dispatches straight at the store
    h.store.set_status(&AlertId::new("a1"), AlertStatus::Dispatched).await.unwrap();
    wait_for(&h.handle, |s| s.entries.is_empty()).await;

    h.store.inject(vec![RawChange::Added(RawAlertRecord::from(&a1))]);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.handle.snapshot().await.unwrap().entries.is_empty());
    assert!(h.map.view().marker_ids().is_empty());
}

#[tokio::test]
async fn test_failed_dispatch_keeps_alert_pending() {
    let store = MemoryStore::new();
    store.insert_alert(alert("a1", "u1", RiskLevel::High, 1));
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 1).await;

    let mut events = h.handle.subscribe_events();
    h.store.fail_next_status_write("write quorum lost");
    let err = h.handle.dispatch(&AlertId::new("a1")).await.unwrap_err();
    assert!(err.to_string().contains("write quorum lost"));

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.ids(), vec!["a1"]);
    assert!(snap.staged.is_empty());
    assert!(h.map.view().marker(&AlertId::new("a1")).is_some());

    loop {
        if let TriageEvent::DispatchFailed { id, .. } = events.recv().await.unwrap() {
            assert_eq!(id.as_str(), "a1");
            break;
        }
    }
}

// =============================================================================
// Enrichment
// =============================================================================

#[tokio::test]
async fn test_profile_failure_uses_default_profile() {
    let store = MemoryStore::new();
    store.put_profile("u1", ReporterProfile::new("Priya", VulnerabilityStatus::Wheelchair));
    store.fail_profile_lookups("u2");
    store.insert_alert(alert("a1", "u1", RiskLevel::High, 1));
    store.insert_alert(alert("a2", "u2", RiskLevel::Medium, 2));
    let h = start(store, ScriptedRisk::default());

    let snap = wait_for(&h.handle, |s| s.entries.len() == 2).await;
    assert_eq!(snap.entries[0].reporter.display_name, "Priya");

    let a2 = &snap.entries[1];
    assert_eq!(a2.id().as_str(), "a2");
    assert_eq!(a2.reporter.display_name, "");
    assert_eq!(a2.reporter.vulnerability, VulnerabilityStatus::None);
}

// =============================================================================
// Selection, live risk and briefing
// =============================================================================

#[tokio::test]
async fn test_late_live_risk_does_not_overwrite_new_selection() {
    let store = MemoryStore::new();
    let a = alert("a", "u1", RiskLevel::High, 1);
    let b = alert("b", "u1", RiskLevel::High, 2);
    store.insert_alert(a.clone());
    store.insert_alert(b.clone());

    let risk = ScriptedRisk::default();
    risk.script(a.latitude, Behaviour::Delayed(Duration::from_millis(100), RiskLevel::High, "stale"));
    risk.script(b.latitude, Behaviour::Respond(RiskLevel::Low, "fresh"));
    let h = start(store, risk);
    wait_for(&h.handle, |s| s.entries.len() == 2).await;

    h.handle.select(&a.id).await.unwrap();
    h.handle.select(&b.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let view = h.handle.snapshot().await.unwrap().selection.unwrap();
    assert_eq!(view.id(), &b.id);
    assert_eq!(
        view.live_risk,
        LiveRiskState::Ready(LiveRiskAssessment::new(RiskLevel::Low, "fresh"))
    );
}

#[tokio::test]
async fn test_live_risk_timeout_shows_error_and_keeps_order() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    store.insert_alert(alert("a2", "u1", RiskLevel::Medium, 2));

    let risk = ScriptedRisk::default();
    risk.script(a1.latitude, Behaviour::TimedOut);
    let h = start(store, risk);
    wait_for(&h.handle, |s| s.entries.len() == 2).await;

    h.handle.select(&a1.id).await.unwrap();
    let snap = wait_for(&h.handle, |s| {
        matches!(s.selection.as_ref().map(|v| &v.live_risk), Some(LiveRiskState::Ready(_)))
    })
    .await;

    let LiveRiskState::Ready(assessment) = snap.selection.clone().unwrap().live_risk else {
        unreachable!()
    };
    assert_eq!(assessment.level, RiskLevel::Error);
    assert!(!assessment.reason.is_empty());
    assert_eq!(snap.ids(), vec!["a1", "a2"]);
    assert_eq!(snap.entries[0].alert.risk_level, Some(RiskLevel::High));
}

#[tokio::test]
async fn test_marker_click_selects_and_focuses() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 1).await;

    assert!(h.map.view().click(&a1.id));
    wait_for(&h.handle, |s| s.selection.is_some()).await;
    assert_eq!(h.map.view().center(), a1.coordinates());
    assert_eq!(h.map.view().zoom(), 15);
}

#[tokio::test]
async fn test_briefing_carries_live_risk() {
    let store = MemoryStore::new();
    let a1 = alert("a1", "u1", RiskLevel::High, 1);
    store.insert_alert(a1.clone());
    let risk = ScriptedRisk::default();
    risk.script(a1.latitude, Behaviour::Respond(RiskLevel::Medium, "receding"));
    let h = start(store, risk);
    wait_for(&h.handle, |s| s.entries.len() == 1).await;

    h.handle.select(&a1.id).await.unwrap();
    h.handle.request_briefing().await.unwrap();

    let snap = wait_for(&h.handle, |s| {
        matches!(s.selection.as_ref().map(|v| &v.briefing), Some(BriefingState::Ready(_)))
    })
    .await;
    assert_eq!(snap.selection.unwrap().briefing, BriefingState::Ready("Briefing a1".to_string()));

    let sent = h.risk.briefings();
    assert_eq!(sent.len(), 1);
    let live = sent[0].live_ml_risk.as_ref().expect("live risk resolved before briefing");
    assert_eq!(live.risk_reason, "receding");
}

#[tokio::test]
async fn test_standard_procedure_uses_configured_language() {
    let h = start(MemoryStore::new(), ScriptedRisk::default());
    let sop = h.handle.standard_procedure("cyclone shelter").await.unwrap();
    assert_eq!(sop, "SOP[en]: cyclone shelter");
    assert!(h.handle.standard_procedure("").await.is_err());
}

// =============================================================================
// Feed connectivity
// =============================================================================

#[tokio::test]
async fn test_reconnect_reconciles_missed_removals() {
    let store = MemoryStore::new();
    store.insert_alert(alert("a1", "u1", RiskLevel::High, 1));
    store.insert_alert(alert("a2", "u1", RiskLevel::Medium, 2));
    let h = start(store, ScriptedRisk::default());
    wait_for(&h.handle, |s| s.entries.len() == 2 && s.feed == FeedStatus::Live).await;

    // Lose the connection, then miss a deletion while disconnected
    h.store.fail_next_opens(1);
    h.store.disconnect_feeds();
    h.store.delete_alert(&AlertId::new("a2"));

    let snap = wait_for(&h.handle, |s| s.ids() == vec!["a1"] && s.feed == FeedStatus::Live).await;
    assert!(h.map.view().marker(&AlertId::new("a2")).is_none());
    assert_eq!(snap.entries.len(), 1);
}

#[tokio::test]
async fn test_feed_goes_offline_after_exhausting_retries() {
    let store = MemoryStore::new();
    store.fail_next_opens(10);
    let h = start(store, ScriptedRisk::default());

    wait_for(&h.handle, |s| s.feed == FeedStatus::Offline).await;
    // Operator commands still work without a feed
    assert!(h.handle.snapshot().await.unwrap().entries.is_empty());
}

#[tokio::test]
async fn test_shutdown_releases_map() {
    let h = start(MemoryStore::new(), ScriptedRisk::default());
    assert!(h.map.view().is_acquired());

    h.handle.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), h.task)
        .await
        .expect("coordinator stops")
        .unwrap();
    assert!(!h.map.view().is_acquired());
    assert!(h.handle.snapshot().await.is_err());
}
