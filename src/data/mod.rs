//! Remotely sourced feature collections: fetching, parsing, state and the
//! controller that renders them on a map

pub mod counters;
pub mod feature;
pub mod fetch;
pub mod formats;
pub mod layer;
pub mod source;

pub use counters::{CounterSnapshot, DataLayerCounters};
pub use feature::{Feature, FeatureId, Geometry, Position};
pub use fetch::{DocumentFetcher, HttpFetcher, MemoryFetcher};
pub use formats::{DocumentFormat, FeatureCollection};
pub use layer::{DataLayerController, DataLayerEvent, DataLayerEventKind, DataLayerProps};
pub use source::{DataSource, DataStatus, FeatureStore, LoadDiff, PropertyChange};
