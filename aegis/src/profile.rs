//! ProfileResolver - cache-or-fetch reporter profiles

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{ReporterId, ReporterProfile};
use crate::store::ProfileStore;

/// Resolves reporter profiles, caching found profiles for the session
///
/// Never fails: a missing profile or a failed lookup yields the default
/// profile. Only found profiles are cached, so a reporter whose lookup
/// failed is retried the next time one of their alerts arrives.
pub struct ProfileResolver {
    store: Arc<dyn ProfileStore>,
    cache: HashMap<ReporterId, ReporterProfile>,
}

impl ProfileResolver {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        debug!("ProfileResolver::new: called");
        Self {
            store,
            cache: HashMap::new(),
        }
    }

    pub async fn resolve(&mut self, reporter_id: &ReporterId) -> ReporterProfile {
        if let Some(profile) = self.cache.get(reporter_id) {
            debug!(%reporter_id, "resolve: cache hit");
            return profile.clone();
        }

        debug!(%reporter_id, "resolve: fetching");
        match self.store.get_profile(reporter_id).await {
            Ok(Some(profile)) => {
                self.cache.insert(reporter_id.clone(), profile.clone());
                profile
            }
            Ok(None) => {
                debug!(%reporter_id, "resolve: no profile, using default");
                ReporterProfile::default()
            }
            Err(e) => {
                warn!(%reporter_id, error = %e, "Profile lookup failed, using default");
                ReporterProfile::default()
            }
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
