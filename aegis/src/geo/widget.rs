//! Map capability traits
//!
//! The map is an injected capability: a [`MapProvider`] hands out a
//! [`MapWidget`] on acquire, and the widget is released explicitly when the
//! coordinator shuts down.

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::MapConfig;
use crate::coordinator::CoordRequest;
use crate::domain::AlertId;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Map unavailable: {0}")]
    Unavailable(String),
}

/// Click handler attached to a marker
///
/// Firing posts a selection request into the coordinator loop.
#[derive(Debug, Clone)]
pub struct MarkerClick {
    id: AlertId,
    tx: mpsc::Sender<CoordRequest>,
}

impl MarkerClick {
    pub fn new(id: AlertId, tx: mpsc::Sender<CoordRequest>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> &AlertId {
        &self.id
    }

    /// Raise `select(id)`. Returns false if the loop is gone or saturated.
    pub fn fire(&self) -> bool {
        debug!(id = %self.id, "MarkerClick::fire: called");
        self.tx.try_send(CoordRequest::MarkerClicked(self.id.clone())).is_ok()
    }
}

/// A live map view
pub trait MapWidget: Send {
    fn add_marker(&mut self, id: &AlertId, lat: f64, lon: f64, on_click: MarkerClick);
    fn update_marker(&mut self, id: &AlertId, lat: f64, lon: f64);
    fn remove_marker(&mut self, id: &AlertId);
    fn pan_to(&mut self, lat: f64, lon: f64);
    fn set_zoom(&mut self, level: u8);

    /// Tear down the view; no calls follow
    fn release(&mut self);
}

/// Hands out map widgets
pub trait MapProvider: Send + Sync {
    fn acquire(&self, view: &MapConfig) -> Result<Box<dyn MapWidget>, GeoError>;
}
