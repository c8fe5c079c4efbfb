//! Geospatial view of the triage queue

mod headless;
mod sync;
mod widget;

pub use headless::{HeadlessMapProvider, HeadlessView};
pub use sync::GeoSync;
pub use widget::{GeoError, MapProvider, MapWidget, MarkerClick};
