pub mod config;
pub mod constants;
pub mod geo;

// Re-export main types
pub use config::{MapControls, MapOptions, MapType, ProviderConfig};
pub use geo::{LatLng, LatLngBounds};
