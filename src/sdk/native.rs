//! Imperative surface of the external mapping SDK
//!
//! Everything the bridge does to the engine goes through these traits. A real
//! SDK binding implements them on top of its own objects; [`super::headless`]
//! implements them in-process.

use crate::core::{
    config::{MapControls, MapOptions, MapType, ProviderConfig},
    geo::{LatLng, LatLngBounds},
};
use crate::data::feature::{Feature, FeatureId};
use crate::overlays::descriptor::{OverlayGeometry, OverlayKind};
use crate::prelude::Arc;
use crate::provider::handle::MountTarget;
use crate::style::Style;
use crate::Result;
use async_trait::async_trait;

/// Engine-assigned identity of a native object
pub type NativeId = u64;

/// Identity of a registered listener, used to unbind it
pub type ListenerId = u64;

/// Callback invoked by the engine when it dispatches an event
pub type NativeListener = Arc<dyn Fn(&NativeEvent) + Send + Sync>;

/// Event as dispatched by the engine
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    /// Engine event name, e.g. `click` or `mouseover`
    pub name: String,
    /// Pointer position, when the event has one
    pub lat_lng: Option<LatLng>,
    /// Feature the event targets (data layers only)
    pub feature: Option<Feature>,
}

impl NativeEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lat_lng: None,
            feature: None,
        }
    }

    pub fn at(mut self, lat_lng: LatLng) -> Self {
        self.lat_lng = Some(lat_lng);
        self
    }

    pub fn on_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }
}

/// Object that accepts event listeners
pub trait EventTarget {
    fn add_listener(&mut self, event: &str, listener: NativeListener) -> ListenerId;

    /// Returns `false` when the listener was not registered
    fn remove_listener(&mut self, id: ListenerId) -> bool;

    fn listener_count(&self) -> usize;
}

/// Initial state of a native overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayInit {
    pub geometry: OverlayGeometry,
    pub style: Style,
    pub visible: bool,
    pub content: Option<String>,
}

/// Native map instance
pub trait NativeMap: Send {
    fn native_id(&self) -> NativeId;

    fn center(&self) -> LatLng;
    fn set_center(&mut self, center: LatLng);

    fn zoom(&self) -> f64;
    fn set_zoom(&mut self, zoom: f64);

    fn map_type(&self) -> MapType;
    fn set_map_type(&mut self, map_type: MapType);

    fn bounds(&self) -> LatLngBounds;
    fn fit_bounds(&mut self, bounds: LatLngBounds);

    fn set_zoom_range(&mut self, min_zoom: f64, max_zoom: f64);

    fn set_controls(&mut self, controls: &MapControls);

    fn create_overlay(
        &mut self,
        kind: OverlayKind,
        init: &OverlayInit,
    ) -> Result<Box<dyn NativeOverlay>>;

    fn create_data_layer(&mut self) -> Result<Box<dyn NativeDataLayer>>;

    /// Tears the map down; objects created from it become unusable
    fn destroy(&mut self);
}

/// Native marker, shape, info window or heat layer
pub trait NativeOverlay: EventTarget + Send {
    fn native_id(&self) -> NativeId;
    fn set_geometry(&mut self, geometry: &OverlayGeometry);
    fn set_style(&mut self, style: &Style);
    fn set_visible(&mut self, visible: bool);
    fn set_content(&mut self, content: Option<&str>);
    fn dispose(&mut self);
}

/// Native feature-collection layer
pub trait NativeDataLayer: EventTarget + Send {
    fn native_id(&self) -> NativeId;
    fn add_feature(&mut self, feature: &Feature);
    fn remove_feature(&mut self, id: &FeatureId);
    /// Replaces a feature's stored copy, e.g. after a property change
    fn update_feature(&mut self, feature: &Feature);
    fn set_feature_style(&mut self, id: &FeatureId, style: &Style);
    fn set_visible(&mut self, visible: bool);
    fn release(&mut self);
}

/// Loaded SDK: creates maps against mount targets
pub trait MapEngine: Send + Sync {
    fn name(&self) -> &str;

    fn create_map(&self, target: &MountTarget, options: &MapOptions) -> Result<Box<dyn NativeMap>>;
}

/// Acquires the SDK resource
///
/// Called at most once per bootstrap attempt; concurrency and deadlines are the
/// bootstrap's business.
#[async_trait]
pub trait SdkLoader: Send + Sync {
    async fn load(&self, config: &ProviderConfig) -> Result<Arc<dyn MapEngine>>;
}
