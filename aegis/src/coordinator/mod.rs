//! Triage coordinator
//!
//! A single task owns the queue, dispatch state, selection and map mirror.
//! Everything that changes them arrives as a message:
//! - **Ingest:** enriched feed batches
//! - **Operator:** select, dispatch, briefing and SOP requests
//! - **Resolved:** responses from the store and the risk service

mod config;
mod core;
mod handle;
mod messages;

pub use config::CoordinatorConfig;
pub use core::Coordinator;
pub use handle::CoordinatorHandle;
pub use messages::{CoordRequest, CoordinatorError, DashboardSnapshot, FeedStatus, TriageEvent};
