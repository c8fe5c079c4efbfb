//! GeoSync - mirrors queue membership onto map markers
//!
//! Reconciles the marker set against the committed queue order after every
//! queue change: markers for departed ids are removed, new ids get a marker
//! with a click handler, and moved alerts have their marker updated in place.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{GeoError, MapProvider, MapWidget, MarkerClick};
use crate::config::MapConfig;
use crate::coordinator::CoordRequest;
use crate::domain::{AlertId, TriageEntry};

pub struct GeoSync {
    widget: Option<Box<dyn MapWidget>>,

    /// Marker coordinates by alert id, as last pushed to the widget
    markers: HashMap<AlertId, (f64, f64)>,

    clicks: mpsc::Sender<CoordRequest>,
    focus_zoom: u8,
}

impl GeoSync {
    /// Acquire a widget and set the initial view
    pub fn attach(
        provider: &dyn MapProvider,
        config: &MapConfig,
        clicks: mpsc::Sender<CoordRequest>,
    ) -> Result<Self, GeoError> {
        debug!(?config, "GeoSync::attach: called");
        let mut widget = provider.acquire(config)?;
        widget.pan_to(config.center_lat, config.center_lon);
        widget.set_zoom(config.default_zoom);
        info!("Map acquired");

        Ok(Self {
            widget: Some(widget),
            markers: HashMap::new(),
            clicks,
            focus_zoom: config.focus_zoom,
        })
    }

    /// Bring the markers in line with the queue snapshot
    pub fn reconcile<'a>(&mut self, entries: impl IntoIterator<Item = &'a TriageEntry>) {
        let Some(widget) = self.widget.as_mut() else {
            debug!("reconcile: map released");
            return;
        };

        let desired: Vec<(&AlertId, (f64, f64))> =
            entries.into_iter().map(|e| (e.id(), e.alert.coordinates())).collect();
        let wanted: HashSet<&AlertId> = desired.iter().map(|(id, _)| *id).collect();

        let mut departed: Vec<AlertId> = self
            .markers
            .keys()
            .filter(|id| !wanted.contains(id))
            .cloned()
            .collect();
        departed.sort();
        for id in departed {
            debug!(%id, "reconcile: removing marker");
            widget.remove_marker(&id);
            self.markers.remove(&id);
        }

        for (id, (lat, lon)) in desired {
            match self.markers.get(id) {
                None => {
                    debug!(%id, lat, lon, "reconcile: adding marker");
                    widget.add_marker(id, lat, lon, MarkerClick::new(id.clone(), self.clicks.clone()));
                    self.markers.insert(id.clone(), (lat, lon));
                }
                Some(&current) if current != (lat, lon) => {
                    debug!(%id, lat, lon, "reconcile: moving marker");
                    widget.update_marker(id, lat, lon);
                    self.markers.insert(id.clone(), (lat, lon));
                }
                Some(_) => {}
            }
        }
    }

    /// Pan and zoom to a selected alert
    pub fn focus(&mut self, entry: &TriageEntry) {
        if let Some(widget) = self.widget.as_mut() {
            let (lat, lon) = entry.alert.coordinates();
            debug!(id = %entry.id(), lat, lon, "focus: called");
            widget.pan_to(lat, lon);
            widget.set_zoom(self.focus_zoom);
        }
    }

    /// Release the widget; later calls are no-ops
    pub fn release(&mut self) {
        if let Some(mut widget) = self.widget.take() {
            info!("Map released");
            widget.release();
            self.markers.clear();
        }
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl Drop for GeoSync {
    fn drop(&mut self) {
        self.release();
    }
}
