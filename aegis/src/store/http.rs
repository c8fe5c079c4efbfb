//! HTTP record store
//!
//! Profiles are read from `GET {base}/users/{id}`; status writes go to
//! `PATCH {base}/alerts/{id}`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use super::{AlertStore, ProfileStore, StoreError};
use crate::config::StoreConfig;
use crate::domain::{AlertId, AlertStatus, ReporterId, ReporterProfile};

/// Record store reached over HTTP
#[derive(Clone)]
pub struct HttpRecordStore {
    base_url: String,
    http: Client,
}

impl HttpRecordStore {
    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        debug!(base_url = %config.base_url, "HttpRecordStore::from_config: called");
        let http = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn api_error(response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::ApiError { status, message }
    }
}

#[async_trait]
impl ProfileStore for HttpRecordStore {
    async fn get_profile(&self, reporter_id: &ReporterId) -> Result<Option<ReporterProfile>, StoreError> {
        debug!(%reporter_id, "HttpRecordStore::get_profile: called");
        let response = self.http.get(self.url(&format!("/users/{}", reporter_id))).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%reporter_id, "get_profile: no profile");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let bytes = response.bytes().await?;
        let profile: ReporterProfile =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::InvalidRecord(e.to_string()))?;
        Ok(Some(profile))
    }
}

#[async_trait]
impl AlertStore for HttpRecordStore {
    async fn set_status(&self, alert_id: &AlertId, status: AlertStatus) -> Result<(), StoreError> {
        debug!(%alert_id, %status, "HttpRecordStore::set_status: called");
        let response = self
            .http
            .patch(self.url(&format!("/alerts/{}", alert_id)))
            .json(&json!({ "status": status }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%alert_id, "set_status: no such alert");
            return Err(StoreError::NotFound(format!("alert {}", alert_id)));
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        debug!(%alert_id, "set_status: written");
        Ok(())
    }
}
