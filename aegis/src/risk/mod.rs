//! Risk-scoring and briefing service client
//!
//! Provides live risk scoring, dispatch briefings and SOP lookups.

pub mod client;
mod error;
mod http;
mod types;

pub use client::{RiskClient, assess_live_risk};
pub use error::RiskError;
pub use http::HttpRiskClient;
pub use types::{BriefingRequest, BriefingResponse, LiveRiskPayload, RiskRequest, RiskResponse, SopRequest, SopResponse};
