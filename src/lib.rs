//! # Maplet Bridge
//!
//! Bridges declaratively described map content (markers, shapes, heat layers,
//! remotely sourced feature collections) to a stateful, imperative mapping SDK.
//!
//! The crate is built around four pieces:
//!
//! - [`SdkBootstrap`] loads the external SDK at most once per process and
//!   shares the pending result between every waiter.
//! - [`MapProvider`] owns one map instance per mount and publishes a
//!   [`MapContext`] to descendants.
//! - [`OverlayController`] diffs an [`OverlayDescriptor`] against the last
//!   applied snapshot and issues only the setter calls that are needed.
//! - [`DataLayerController`] fetches, parses and renders a mutable feature
//!   collection, and fans native events back out to handler props.

pub mod core;
pub mod data;
pub mod events;
pub mod overlays;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod sdk;
pub mod style;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    config::{MapControls, MapOptions, MapType, ProviderConfig},
    geo::{LatLng, LatLngBounds},
};

pub use sdk::{
    bootstrap::{BootstrapRegistry, BootstrapStatus, PendingLoad, SdkBootstrap, SdkHandle},
    headless::{HeadlessEngine, HeadlessLoader},
    native::{MapEngine, NativeDataLayer, NativeEvent, NativeMap, NativeOverlay, SdkLoader},
};

pub use provider::{
    context::{ContextSnapshot, MapContext, SdkStatus},
    handle::{MapHandle, MapRef},
    MapProvider, ProviderCallbacks,
};

pub use overlays::{
    controller::{OverlayController, OverlayState},
    descriptor::{OverlayDescriptor, OverlayGeometry, OverlayKind},
};

pub use data::{
    counters::{CounterSnapshot, DataLayerCounters},
    feature::{Feature, FeatureId, Geometry, Position},
    fetch::{DocumentFetcher, HttpFetcher, MemoryFetcher},
    formats::FeatureCollection,
    layer::{DataLayerController, DataLayerProps},
    source::{DataSource, DataStatus},
};

pub use events::{Handler, HandlerSet};
pub use style::Style;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, MapError>;

/// Common error types
///
/// Errors are shared between every waiter of a bootstrap attempt and stored in
/// the provider context, so the payloads are plain strings and the type is
/// `Clone`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("SDK load timed out after {0} ms")]
    Timeout(u64),

    #[error("Stale handle: {0}")]
    StaleHandle(String),

    #[error("SDK load failed: {0}")]
    Load(String),

    #[error("Invalid mount target: {0}")]
    InvalidTarget(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Duplicate feature id: {0}")]
    DuplicateFeature(String),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Coarse error classes observed by callers and conformance checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Parse,
    Timeout,
    StaleHandle,
    Other,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Network => write!(f, "NetworkError"),
            ErrorKind::Parse => write!(f, "ParseError"),
            ErrorKind::Timeout => write!(f, "TimeoutError"),
            ErrorKind::StaleHandle => write!(f, "StaleHandleError"),
            ErrorKind::Other => write!(f, "Error"),
        }
    }
}

impl MapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapError::Network(_) => ErrorKind::Network,
            MapError::Parse(_) => ErrorKind::Parse,
            MapError::Timeout(_) => ErrorKind::Timeout,
            MapError::StaleHandle(_) => ErrorKind::StaleHandle,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn stale(what: impl Into<String>) -> Self {
        MapError::StaleHandle(what.into())
    }
}

impl From<reqwest::Error> for MapError {
    fn from(err: reqwest::Error) -> Self {
        MapError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for MapError {
    fn from(err: serde_json::Error) -> Self {
        MapError::Parse(err.to_string())
    }
}

impl From<quick_xml::Error> for MapError {
    fn from(err: quick_xml::Error) -> Self {
        MapError::Parse(err.to_string())
    }
}

/// Error type alias for convenience
pub type Error = MapError;

/// Installs `env_logger` as the `log` backend, honouring `RUST_LOG`.
#[cfg(feature = "debug")]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
