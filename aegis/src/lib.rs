//! Aegis - Real-time alert triage and dispatch coordinator
//!
//! Aegis sits between a live feed of citizen-reported emergencies and the
//! operators of a command center. It keeps a priority-ordered queue of
//! pending alerts, mirrors it onto a map, fetches live risk and briefings
//! for the selected alert, and dispatches responders.
//!
//! # Core Concepts
//!
//! - **Single owner**: one coordinator task owns the queue, dispatch state,
//!   selection and map; everything else talks to it through messages
//! - **Explicit feed**: changes arrive as typed diff batches from a
//!   reconnecting subscriber, not as render callbacks
//! - **Staged dispatch**: stage, then commit on store success or roll back
//! - **Generation tokens**: responses for a superseded selection are dropped
//!
//! # Modules
//!
//! - [`feed`] - Change feed source, subscriber and diff types
//! - [`enricher`] - Joins alerts with reporter profiles
//! - [`queue`] - Priority-ordered triage queue
//! - [`dispatch`] - Staged/committed dispatch state machine
//! - [`geo`] - Map capability and marker reconciliation
//! - [`briefing`] - Live risk and briefing requests for the selection
//! - [`coordinator`] - The event loop and its handle
//! - [`console`] - Operator console

pub mod briefing;
pub mod cli;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod dispatch;
pub mod domain;
pub mod enricher;
pub mod feed;
pub mod geo;
pub mod profile;
pub mod queue;
pub mod risk;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{
    CoordRequest, Coordinator, CoordinatorConfig, CoordinatorError, CoordinatorHandle, DashboardSnapshot, FeedStatus,
    TriageEvent,
};
pub use dispatch::{DispatchConflict, DispatchError, DispatchOutcome};
pub use domain::{
    Alert, AlertId, AlertStatus, AlertType, LiveRiskAssessment, ReporterId, ReporterProfile, RiskLevel, TriageEntry,
    VulnerabilityStatus,
};
pub use geo::{GeoSync, HeadlessMapProvider, MapProvider, MapWidget};
pub use queue::{QueueOp, TriageQueue};
pub use risk::{HttpRiskClient, RiskClient, RiskError};
pub use store::{AlertStore, HttpRecordStore, MemoryStore, ProfileStore, StoreError};
