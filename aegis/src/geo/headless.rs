//! Headless map widget
//!
//! Keeps marker state in memory instead of drawing it. The console binary
//! uses it, and tests inspect it through [`HeadlessView`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::{GeoError, MapProvider, MapWidget, MarkerClick};
use crate::config::MapConfig;
use crate::domain::AlertId;

#[derive(Debug, Clone)]
struct Marker {
    lat: f64,
    lon: f64,
    on_click: MarkerClick,
}

#[derive(Debug, Default)]
struct State {
    markers: BTreeMap<AlertId, Marker>,
    center: (f64, f64),
    zoom: u8,
    acquired: bool,
    added: Vec<AlertId>,
    updates: usize,
    removes: usize,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Provider of headless widgets sharing one inspectable state
#[derive(Debug, Clone, Default)]
pub struct HeadlessMapProvider {
    state: Arc<Mutex<State>>,
}

impl HeadlessMapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the widget state
    pub fn view(&self) -> HeadlessView {
        HeadlessView {
            state: self.state.clone(),
        }
    }
}

impl MapProvider for HeadlessMapProvider {
    fn acquire(&self, view: &MapConfig) -> Result<Box<dyn MapWidget>, GeoError> {
        debug!(?view, "HeadlessMapProvider::acquire: called");
        let mut state = lock(&self.state);
        if state.acquired {
            return Err(GeoError::Unavailable("map already acquired".to_string()));
        }
        state.acquired = true;
        state.markers.clear();
        Ok(Box::new(HeadlessMap {
            state: self.state.clone(),
        }))
    }
}

struct HeadlessMap {
    state: Arc<Mutex<State>>,
}

impl MapWidget for HeadlessMap {
    fn add_marker(&mut self, id: &AlertId, lat: f64, lon: f64, on_click: MarkerClick) {
        debug!(%id, lat, lon, "HeadlessMap::add_marker: called");
        let mut state = lock(&self.state);
        state.added.push(id.clone());
        state.markers.insert(id.clone(), Marker { lat, lon, on_click });
    }

    fn update_marker(&mut self, id: &AlertId, lat: f64, lon: f64) {
        debug!(%id, lat, lon, "HeadlessMap::update_marker: called");
        let mut state = lock(&self.state);
        state.updates += 1;
        if let Some(marker) = state.markers.get_mut(id) {
            marker.lat = lat;
            marker.lon = lon;
        }
    }

    fn remove_marker(&mut self, id: &AlertId) {
        debug!(%id, "HeadlessMap::remove_marker: called");
        let mut state = lock(&self.state);
        state.removes += 1;
        state.markers.remove(id);
    }

    fn pan_to(&mut self, lat: f64, lon: f64) {
        lock(&self.state).center = (lat, lon);
    }

    fn set_zoom(&mut self, level: u8) {
        lock(&self.state).zoom = level;
    }

    fn release(&mut self) {
        debug!("HeadlessMap::release: called");
        let mut state = lock(&self.state);
        state.markers.clear();
        state.acquired = false;
    }
}

/// Inspection handle for a headless map
#[derive(Debug, Clone)]
pub struct HeadlessView {
    state: Arc<Mutex<State>>,
}

impl HeadlessView {
    pub fn marker_ids(&self) -> Vec<AlertId> {
        lock(&self.state).markers.keys().cloned().collect()
    }

    pub fn marker(&self, id: &AlertId) -> Option<(f64, f64)> {
        lock(&self.state).markers.get(id).map(|m| (m.lat, m.lon))
    }

    pub fn center(&self) -> (f64, f64) {
        lock(&self.state).center
    }

    pub fn zoom(&self) -> u8 {
        lock(&self.state).zoom
    }

    pub fn is_acquired(&self) -> bool {
        lock(&self.state).acquired
    }

    /// Counts of (add, update, remove) calls
    pub fn call_counts(&self) -> (usize, usize, usize) {
        let state = lock(&self.state);
        (state.added.len(), state.updates, state.removes)
    }

    /// Ids passed to `add_marker`, in call order
    pub fn added_order(&self) -> Vec<AlertId> {
        lock(&self.state).added.clone()
    }

    /// Simulate a click on a marker. Returns false if there is no such marker
    /// or the click could not be delivered.
    pub fn click(&self, id: &AlertId) -> bool {
        let on_click = lock(&self.state).markers.get(id).map(|m| m.on_click.clone());
        on_click.is_some_and(|c| c.fire())
    }
}
