//! RiskClient trait definition

use async_trait::async_trait;
use tracing::debug;

use super::{BriefingRequest, RiskError, RiskRequest, RiskResponse, SopRequest};
use crate::domain::LiveRiskAssessment;

/// Stateless client for the risk-scoring and briefing service
///
/// Each call is an independent request/response; the client holds no
/// per-alert state. Cancellation of superseded requests is the caller's job.
#[async_trait]
pub trait RiskClient: Send + Sync {
    /// Score live risk for a location and reporter vulnerability
    async fn assess(&self, request: RiskRequest) -> Result<RiskResponse, RiskError>;

    /// Generate a dispatch briefing for an alert
    async fn generate_briefing(&self, request: BriefingRequest) -> Result<String, RiskError>;

    /// Look up a standard operating procedure
    async fn standard_procedure(&self, request: SopRequest) -> Result<String, RiskError>;
}

/// Score live risk, folding any failure into an ERROR assessment
pub async fn assess_live_risk(client: &dyn RiskClient, request: RiskRequest) -> LiveRiskAssessment {
    debug!(lat = request.lat, lon = request.lon, "assess_live_risk: called");
    match client.assess(request).await {
        Ok(response) => {
            debug!(level = %response.risk_level, "assess_live_risk: success");
            response.into()
        }
        Err(e) => {
            debug!(error = %e, "assess_live_risk: request failed");
            LiveRiskAssessment::failed(e.to_string())
        }
    }
}
