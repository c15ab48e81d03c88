//! Prelude module for common maplet-bridge types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use maplet_bridge::prelude::*;`

pub use crate::core::{
    config::{MapControls, MapOptions, MapType, ProviderConfig},
    geo::{LatLng, LatLngBounds},
};

pub use crate::sdk::{
    bootstrap::{BootstrapRegistry, BootstrapStatus, SdkBootstrap, SdkHandle},
    headless::{HeadlessEngine, HeadlessLoader, NativeCall},
    native::{
        EventTarget, ListenerId, MapEngine, NativeDataLayer, NativeEvent, NativeId, NativeListener,
        NativeMap, NativeOverlay, OverlayInit, SdkLoader,
    },
};

pub use crate::provider::{
    context::{ContextSnapshot, MapContext, SdkStatus},
    handle::{MapHandle, MapRef, MountTarget},
    MapProvider, ProviderCallbacks,
};

pub use crate::overlays::{
    controller::{OverlayController, OverlayEvent, OverlayState},
    descriptor::{OverlayDescriptor, OverlayGeometry, OverlayKind},
    diff::OverlayDiff,
    registry::{OverlayEntry, OverlayId, OverlayRegistry},
};

pub use crate::data::{
    counters::{CounterSnapshot, DataLayerCounters},
    feature::{Feature, FeatureId, Geometry, Position},
    fetch::{DocumentFetcher, HttpFetcher, MemoryFetcher},
    formats::{DocumentFormat, FeatureCollection},
    layer::{DataLayerController, DataLayerEvent, DataLayerEventKind, DataLayerProps},
    source::{DataSource, DataStatus},
};

pub use crate::events::{EventBindings, Handler, HandlerSet};
pub use crate::style::Style;
pub use crate::traits::Configurable;

pub use crate::runtime::{runtime, spawn, AsyncHandle, AsyncSpawner};

pub use crate::{Error as MapError, ErrorKind, Result};

pub use std::{
    pin::Pin,
    sync::{Arc, Mutex, Weak},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use futures::Future;
