//! In-process mapping engine
//!
//! Implements every trait in [`super::native`] without any rendering: objects
//! keep their state in a shared table, every imperative call is appended to a
//! journal, and callers dispatch native events by hand. Used by the demo binary
//! and by the scenario tests.

use crate::core::{
    config::{MapControls, MapOptions, MapType, ProviderConfig},
    constants::{DEFAULT_VIEWPORT_PX, MAX_ZOOM, MIN_ZOOM, TILE_SIZE},
    geo::{LatLng, LatLngBounds},
};
use crate::data::feature::{Feature, FeatureId};
use crate::overlays::descriptor::{OverlayGeometry, OverlayKind};
use crate::prelude::{Arc, Duration, HashMap, Mutex};
use crate::provider::handle::MountTarget;
use crate::sdk::native::{
    EventTarget, ListenerId, MapEngine, NativeDataLayer, NativeEvent, NativeId, NativeListener,
    NativeMap, NativeOverlay, OverlayInit, SdkLoader,
};
use crate::style::Style;
use crate::{MapError, Result};
use async_trait::async_trait;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One imperative call received by the headless engine
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCall {
    CreateMap { map: NativeId, target: String },
    SetCenter { map: NativeId, center: LatLng },
    SetZoom { map: NativeId, zoom: f64 },
    SetMapType { map: NativeId, map_type: MapType },
    SetZoomRange { map: NativeId, min_zoom: f64, max_zoom: f64 },
    SetControls { map: NativeId },
    FitBounds { map: NativeId, bounds: LatLngBounds },
    DestroyMap { map: NativeId },

    CreateOverlay { map: NativeId, overlay: NativeId, kind: OverlayKind },
    SetGeometry { overlay: NativeId },
    SetStyle { overlay: NativeId },
    SetVisible { overlay: NativeId, visible: bool },
    SetContent { overlay: NativeId },
    DisposeOverlay { overlay: NativeId },

    CreateDataLayer { map: NativeId, layer: NativeId },
    AddFeature { layer: NativeId, feature: FeatureId },
    RemoveFeature { layer: NativeId, feature: FeatureId },
    UpdateFeature { layer: NativeId, feature: FeatureId },
    SetFeatureStyle { layer: NativeId, feature: FeatureId, style: Style },
    SetLayerVisible { layer: NativeId, visible: bool },
    ReleaseLayer { layer: NativeId },

    AddListener { target: NativeId, event: String, listener: ListenerId },
    RemoveListener { target: NativeId, listener: ListenerId },
}

impl NativeCall {
    /// Native object the call was made on
    pub fn target(&self) -> NativeId {
        match self {
            NativeCall::CreateMap { map, .. }
            | NativeCall::SetCenter { map, .. }
            | NativeCall::SetZoom { map, .. }
            | NativeCall::SetMapType { map, .. }
            | NativeCall::SetZoomRange { map, .. }
            | NativeCall::SetControls { map }
            | NativeCall::FitBounds { map, .. }
            | NativeCall::DestroyMap { map }
            | NativeCall::CreateOverlay { map, .. }
            | NativeCall::CreateDataLayer { map, .. } => *map,
            NativeCall::SetGeometry { overlay }
            | NativeCall::SetStyle { overlay }
            | NativeCall::SetVisible { overlay, .. }
            | NativeCall::SetContent { overlay }
            | NativeCall::DisposeOverlay { overlay } => *overlay,
            NativeCall::AddFeature { layer, .. }
            | NativeCall::RemoveFeature { layer, .. }
            | NativeCall::UpdateFeature { layer, .. }
            | NativeCall::SetFeatureStyle { layer, .. }
            | NativeCall::SetLayerVisible { layer, .. }
            | NativeCall::ReleaseLayer { layer } => *layer,
            NativeCall::AddListener { target, .. } | NativeCall::RemoveListener { target, .. } => {
                *target
            }
        }
    }
}

/// Current state of a headless map
#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    pub target: String,
    pub center: LatLng,
    pub zoom: f64,
    pub map_type: MapType,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub controls: MapControls,
    pub destroyed: bool,
}

/// Current state of a headless overlay
#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySnapshot {
    pub map: NativeId,
    pub kind: OverlayKind,
    pub geometry: OverlayGeometry,
    pub style: Style,
    pub visible: bool,
    pub content: Option<String>,
    pub disposed: bool,
}

/// Current state of a headless data layer
#[derive(Debug, Clone, PartialEq)]
pub struct DataLayerSnapshot {
    pub map: NativeId,
    /// Features in insertion order
    pub features: Vec<Feature>,
    pub feature_styles: HashMap<FeatureId, Style>,
    pub visible: bool,
    pub released: bool,
}

struct ListenerRecord {
    id: ListenerId,
    target: NativeId,
    event: String,
    listener: NativeListener,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    journal: Vec<NativeCall>,
    /// Registration order is dispatch order
    listeners: Vec<ListenerRecord>,
    maps: HashMap<NativeId, MapState>,
    overlays: HashMap<NativeId, OverlaySnapshot>,
    layers: HashMap<NativeId, DataLayerSnapshot>,
    map_creation_failure: Option<String>,
}

impl EngineState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Headless [`MapEngine`]; clones share the same object table
#[derive(Clone, Default)]
pub struct HeadlessEngine {
    state: Arc<Mutex<EngineState>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        match self.state.lock() {
            Ok(mut guard) => f(&mut *guard),
            Err(poisoned) => f(&mut *poisoned.into_inner()),
        }
    }

    fn record(&self, call: NativeCall) {
        log::trace!("headless call: {:?}", call);
        self.with_state(|state| state.journal.push(call));
    }

    /// Makes every following `create_map` fail with `message`
    pub fn fail_map_creation(&self, message: Option<&str>) {
        self.with_state(|state| state.map_creation_failure = message.map(str::to_string));
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<NativeCall> {
        self.with_state(|state| state.journal.clone())
    }

    pub fn calls_for(&self, target: NativeId) -> Vec<NativeCall> {
        self.with_state(|state| {
            state
                .journal
                .iter()
                .filter(|call| call.target() == target)
                .cloned()
                .collect()
        })
    }

    pub fn count_calls(&self, predicate: impl Fn(&NativeCall) -> bool) -> usize {
        self.with_state(|state| state.journal.iter().filter(|call| predicate(call)).count())
    }

    pub fn clear_calls(&self) {
        self.with_state(|state| state.journal.clear());
    }

    pub fn map_state(&self, map: NativeId) -> Option<MapState> {
        self.with_state(|state| state.maps.get(&map).cloned())
    }

    pub fn overlay_state(&self, overlay: NativeId) -> Option<OverlaySnapshot> {
        self.with_state(|state| state.overlays.get(&overlay).cloned())
    }

    pub fn layer_state(&self, layer: NativeId) -> Option<DataLayerSnapshot> {
        self.with_state(|state| state.layers.get(&layer).cloned())
    }

    /// Ids of the features the layer currently renders, in insertion order
    pub fn layer_features(&self, layer: NativeId) -> Vec<FeatureId> {
        self.with_state(|state| {
            state
                .layers
                .get(&layer)
                .map(|l| l.features.iter().map(|f| f.id.clone()).collect())
                .unwrap_or_default()
        })
    }

    /// Style last applied to a feature of `layer`
    pub fn feature_style(&self, layer: NativeId, feature: &FeatureId) -> Option<Style> {
        self.with_state(|state| {
            state
                .layers
                .get(&layer)
                .and_then(|l| l.feature_styles.get(feature).cloned())
        })
    }

    /// Live listeners on `target`, across all event names
    pub fn listeners_on(&self, target: NativeId) -> usize {
        self.with_state(|state| state.listeners.iter().filter(|l| l.target == target).count())
    }

    pub fn total_listeners(&self) -> usize {
        self.with_state(|state| state.listeners.len())
    }

    /// Dispatches `event` to every listener registered for its name on
    /// `target`, in registration order; returns the number of listeners run
    ///
    /// Listeners run without the engine lock held, so they may call back into
    /// the engine.
    pub fn dispatch(&self, target: NativeId, event: NativeEvent) -> usize {
        let listeners: Vec<NativeListener> = self.with_state(|state| {
            state
                .listeners
                .iter()
                .filter(|l| l.target == target && l.event == event.name)
                .map(|l| Arc::clone(&l.listener))
                .collect()
        });
        for listener in &listeners {
            listener(&event);
        }
        listeners.len()
    }

    /// Dispatches a pointer event on one feature of a data layer
    pub fn dispatch_feature_event(
        &self,
        layer: NativeId,
        event: &str,
        feature: &FeatureId,
    ) -> Result<usize> {
        let found = self.with_state(|state| {
            state
                .layers
                .get(&layer)
                .and_then(|l| l.features.iter().find(|f| &f.id == feature).cloned())
        });
        match found {
            Some(found) => Ok(self.dispatch(layer, NativeEvent::new(event).on_feature(found))),
            None => Err(MapError::FeatureNotFound(feature.to_string())),
        }
    }

    fn add_listener(&self, target: NativeId, event: &str, listener: NativeListener) -> ListenerId {
        let id = self.with_state(|state| {
            let id = state.next_id();
            state.listeners.push(ListenerRecord {
                id,
                target,
                event: event.to_string(),
                listener,
            });
            id
        });
        self.record(NativeCall::AddListener {
            target,
            event: event.to_string(),
            listener: id,
        });
        id
    }

    fn remove_listener(&self, target: NativeId, listener: ListenerId) -> bool {
        let removed = self.with_state(|state| {
            let before = state.listeners.len();
            state
                .listeners
                .retain(|l| !(l.id == listener && l.target == target));
            before != state.listeners.len()
        });
        if removed {
            self.record(NativeCall::RemoveListener { target, listener });
        }
        removed
    }
}

impl MapEngine for HeadlessEngine {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_map(&self, target: &MountTarget, options: &MapOptions) -> Result<Box<dyn NativeMap>> {
        let id = self.with_state(|state| {
            if let Some(message) = &state.map_creation_failure {
                return Err(MapError::Engine(message.clone()));
            }
            let id = state.next_id();
            state.maps.insert(
                id,
                MapState {
                    target: target.as_str().to_string(),
                    center: options.center,
                    zoom: options.zoom,
                    map_type: options.map_type,
                    min_zoom: options.effective_min_zoom(),
                    max_zoom: options.effective_max_zoom(),
                    controls: options.controls.clone(),
                    destroyed: false,
                },
            );
            Ok(id)
        })?;
        self.record(NativeCall::CreateMap {
            map: id,
            target: target.as_str().to_string(),
        });
        Ok(Box::new(HeadlessMap {
            id,
            engine: self.clone(),
        }))
    }
}

struct HeadlessMap {
    id: NativeId,
    engine: HeadlessEngine,
}

impl HeadlessMap {
    fn read<R: Default>(&self, f: impl FnOnce(&MapState) -> R) -> R {
        self.engine
            .with_state(|state| state.maps.get(&self.id).map(f).unwrap_or_default())
    }

    fn write(&self, f: impl FnOnce(&mut MapState)) {
        self.engine.with_state(|state| {
            if let Some(map) = state.maps.get_mut(&self.id) {
                f(map);
            }
        });
    }

    fn is_destroyed(&self) -> bool {
        self.engine.with_state(|state| {
            state
                .maps
                .get(&self.id)
                .map_or(true, |map| map.destroyed)
        })
    }
}

impl NativeMap for HeadlessMap {
    fn native_id(&self) -> NativeId {
        self.id
    }

    fn center(&self) -> LatLng {
        self.read(|map| map.center)
    }

    fn set_center(&mut self, center: LatLng) {
        self.write(|map| map.center = center);
        self.engine.record(NativeCall::SetCenter {
            map: self.id,
            center,
        });
    }

    fn zoom(&self) -> f64 {
        self.read(|map| map.zoom)
    }

    fn set_zoom(&mut self, zoom: f64) {
        let mut applied = zoom;
        self.write(|map| {
            applied = zoom.clamp(map.min_zoom, map.max_zoom);
            map.zoom = applied;
        });
        self.engine.record(NativeCall::SetZoom {
            map: self.id,
            zoom: applied,
        });
    }

    fn map_type(&self) -> MapType {
        self.read(|map| map.map_type)
    }

    fn set_map_type(&mut self, map_type: MapType) {
        self.write(|map| map.map_type = map_type);
        self.engine.record(NativeCall::SetMapType {
            map: self.id,
            map_type,
        });
    }

    fn bounds(&self) -> LatLngBounds {
        self.engine.with_state(|state| match state.maps.get(&self.id) {
            Some(map) => viewport_bounds(map.center, map.zoom),
            None => LatLngBounds::new(LatLng::default(), LatLng::default()),
        })
    }

    fn fit_bounds(&mut self, bounds: LatLngBounds) {
        self.write(|map| {
            map.center = bounds.center();
            map.zoom = fit_zoom(&bounds, map.min_zoom, map.max_zoom);
        });
        self.engine.record(NativeCall::FitBounds {
            map: self.id,
            bounds,
        });
    }

    fn set_zoom_range(&mut self, min_zoom: f64, max_zoom: f64) {
        self.write(|map| {
            map.min_zoom = min_zoom;
            map.max_zoom = max_zoom;
            map.zoom = map.zoom.clamp(min_zoom, max_zoom);
        });
        self.engine.record(NativeCall::SetZoomRange {
            map: self.id,
            min_zoom,
            max_zoom,
        });
    }

    fn set_controls(&mut self, controls: &MapControls) {
        self.write(|map| map.controls = controls.clone());
        self.engine.record(NativeCall::SetControls { map: self.id });
    }

    fn create_overlay(
        &mut self,
        kind: OverlayKind,
        init: &OverlayInit,
    ) -> Result<Box<dyn NativeOverlay>> {
        if self.is_destroyed() {
            return Err(MapError::stale("map was destroyed"));
        }
        if !init.geometry.fits(kind) {
            return Err(MapError::Engine(format!(
                "geometry {:?} cannot back a {}",
                init.geometry, kind
            )));
        }
        let map = self.id;
        let id = self.engine.with_state(|state| {
            let id = state.next_id();
            state.overlays.insert(
                id,
                OverlaySnapshot {
                    map,
                    kind,
                    geometry: init.geometry.clone(),
                    style: init.style.clone(),
                    visible: init.visible,
                    content: init.content.clone(),
                    disposed: false,
                },
            );
            id
        });
        self.engine.record(NativeCall::CreateOverlay {
            map,
            overlay: id,
            kind,
        });
        Ok(Box::new(HeadlessOverlay {
            id,
            engine: self.engine.clone(),
        }))
    }

    fn create_data_layer(&mut self) -> Result<Box<dyn NativeDataLayer>> {
        if self.is_destroyed() {
            return Err(MapError::stale("map was destroyed"));
        }
        let map = self.id;
        let id = self.engine.with_state(|state| {
            let id = state.next_id();
            state.layers.insert(
                id,
                DataLayerSnapshot {
                    map,
                    features: Vec::new(),
                    feature_styles: HashMap::default(),
                    visible: true,
                    released: false,
                },
            );
            id
        });
        self.engine
            .record(NativeCall::CreateDataLayer { map, layer: id });
        Ok(Box::new(HeadlessDataLayer {
            id,
            engine: self.engine.clone(),
        }))
    }

    fn destroy(&mut self) {
        self.write(|map| map.destroyed = true);
        self.engine.record(NativeCall::DestroyMap { map: self.id });
    }
}

struct HeadlessOverlay {
    id: NativeId,
    engine: HeadlessEngine,
}

impl HeadlessOverlay {
    fn write(&self, f: impl FnOnce(&mut OverlaySnapshot)) {
        self.engine.with_state(|state| {
            if let Some(overlay) = state.overlays.get_mut(&self.id) {
                f(overlay);
            }
        });
    }
}

impl EventTarget for HeadlessOverlay {
    fn add_listener(&mut self, event: &str, listener: NativeListener) -> ListenerId {
        self.engine.add_listener(self.id, event, listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.engine.remove_listener(self.id, id)
    }

    fn listener_count(&self) -> usize {
        self.engine.listeners_on(self.id)
    }
}

impl NativeOverlay for HeadlessOverlay {
    fn native_id(&self) -> NativeId {
        self.id
    }

    fn set_geometry(&mut self, geometry: &OverlayGeometry) {
        self.write(|overlay| overlay.geometry = geometry.clone());
        self.engine
            .record(NativeCall::SetGeometry { overlay: self.id });
    }

    fn set_style(&mut self, style: &Style) {
        self.write(|overlay| overlay.style = style.clone());
        self.engine.record(NativeCall::SetStyle { overlay: self.id });
    }

    fn set_visible(&mut self, visible: bool) {
        self.write(|overlay| overlay.visible = visible);
        self.engine.record(NativeCall::SetVisible {
            overlay: self.id,
            visible,
        });
    }

    fn set_content(&mut self, content: Option<&str>) {
        self.write(|overlay| overlay.content = content.map(str::to_string));
        self.engine
            .record(NativeCall::SetContent { overlay: self.id });
    }

    fn dispose(&mut self) {
        self.write(|overlay| overlay.disposed = true);
        self.engine
            .record(NativeCall::DisposeOverlay { overlay: self.id });
    }
}

struct HeadlessDataLayer {
    id: NativeId,
    engine: HeadlessEngine,
}

impl HeadlessDataLayer {
    fn write(&self, f: impl FnOnce(&mut DataLayerSnapshot)) {
        self.engine.with_state(|state| {
            if let Some(layer) = state.layers.get_mut(&self.id) {
                f(layer);
            }
        });
    }
}

impl EventTarget for HeadlessDataLayer {
    fn add_listener(&mut self, event: &str, listener: NativeListener) -> ListenerId {
        self.engine.add_listener(self.id, event, listener)
    }

    fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.engine.remove_listener(self.id, id)
    }

    fn listener_count(&self) -> usize {
        self.engine.listeners_on(self.id)
    }
}

impl NativeDataLayer for HeadlessDataLayer {
    fn native_id(&self) -> NativeId {
        self.id
    }

    fn add_feature(&mut self, feature: &Feature) {
        self.write(|layer| {
            layer.features.retain(|f| f.id != feature.id);
            layer.features.push(feature.clone());
        });
        self.engine.record(NativeCall::AddFeature {
            layer: self.id,
            feature: feature.id.clone(),
        });
    }

    fn remove_feature(&mut self, id: &FeatureId) {
        self.write(|layer| {
            layer.features.retain(|f| &f.id != id);
            layer.feature_styles.remove(id);
        });
        self.engine.record(NativeCall::RemoveFeature {
            layer: self.id,
            feature: id.clone(),
        });
    }

    fn update_feature(&mut self, feature: &Feature) {
        self.write(|layer| {
            if let Some(slot) = layer.features.iter_mut().find(|f| f.id == feature.id) {
                *slot = feature.clone();
            }
        });
        self.engine.record(NativeCall::UpdateFeature {
            layer: self.id,
            feature: feature.id.clone(),
        });
    }

    fn set_feature_style(&mut self, id: &FeatureId, style: &Style) {
        self.write(|layer| {
            layer.feature_styles.insert(id.clone(), style.clone());
        });
        self.engine.record(NativeCall::SetFeatureStyle {
            layer: self.id,
            feature: id.clone(),
            style: style.clone(),
        });
    }

    fn set_visible(&mut self, visible: bool) {
        self.write(|layer| layer.visible = visible);
        self.engine.record(NativeCall::SetLayerVisible {
            layer: self.id,
            visible,
        });
    }

    fn release(&mut self) {
        self.write(|layer| {
            layer.released = true;
            layer.features.clear();
            layer.feature_styles.clear();
        });
        self.engine.record(NativeCall::ReleaseLayer { layer: self.id });
    }
}

/// Web Mercator projection to world pixels at `zoom`
fn project(lat_lng: &LatLng, zoom: f64) -> (f64, f64) {
    let scale = TILE_SIZE as f64 * 2_f64.powf(zoom);
    let x = (lat_lng.lng + 180.0) / 360.0 * scale;
    let sin = lat_lng.lat.to_radians().sin().clamp(-0.9999, 0.9999);
    let y = (0.5 - ((1.0 + sin) / (1.0 - sin)).ln() / (4.0 * PI)) * scale;
    (x, y)
}

fn unproject(x: f64, y: f64, zoom: f64) -> LatLng {
    let scale = TILE_SIZE as f64 * 2_f64.powf(zoom);
    let lng = x / scale * 360.0 - 180.0;
    let n = PI - 2.0 * PI * y / scale;
    let lat = n.sinh().atan().to_degrees();
    LatLng::new(lat, lng)
}

fn viewport_bounds(center: LatLng, zoom: f64) -> LatLngBounds {
    let (width, height) = (DEFAULT_VIEWPORT_PX.0 as f64, DEFAULT_VIEWPORT_PX.1 as f64);
    let (cx, cy) = project(&center, zoom);
    let nw = unproject(cx - width / 2.0, cy - height / 2.0, zoom);
    let se = unproject(cx + width / 2.0, cy + height / 2.0, zoom);
    LatLngBounds::new(LatLng::new(se.lat, nw.lng), LatLng::new(nw.lat, se.lng))
}

/// Highest whole zoom level at which `bounds` fits the viewport
fn fit_zoom(bounds: &LatLngBounds, min_zoom: f64, max_zoom: f64) -> f64 {
    let (width, height) = (DEFAULT_VIEWPORT_PX.0 as f64, DEFAULT_VIEWPORT_PX.1 as f64);
    let min = min_zoom.max(MIN_ZOOM);
    let max = max_zoom.min(MAX_ZOOM);
    let mut best = min;

    for zoom in (min.ceil() as i32)..=(max.floor() as i32) {
        let zoom = zoom as f64;
        let nw = project(
            &LatLng::new(bounds.north_east.lat, bounds.south_west.lng),
            zoom,
        );
        let se = project(
            &LatLng::new(bounds.south_west.lat, bounds.north_east.lng),
            zoom,
        );
        if (se.0 - nw.0).abs() <= width && (se.1 - nw.1).abs() <= height {
            best = zoom;
        } else {
            break;
        }
    }
    best
}

/// [`SdkLoader`] handing out a [`HeadlessEngine`]
///
/// Can be slowed down and made to reject its first attempts, which is what the
/// bootstrap tests need to exercise waiters, timeouts and retries.
pub struct HeadlessLoader {
    engine: HeadlessEngine,
    delay: Option<Duration>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

impl HeadlessLoader {
    pub fn new(engine: HeadlessEngine) -> Self {
        Self {
            engine,
            delay: None,
            failures: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Rejects the first `attempts` loads
    pub fn failing_first(self, attempts: usize) -> Self {
        self.failures.store(attempts, Ordering::SeqCst);
        self
    }

    /// Number of load attempts started
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> &HeadlessEngine {
        &self.engine
    }
}

#[async_trait]
impl SdkLoader for HeadlessLoader {
    async fn load(&self, config: &ProviderConfig) -> Result<Arc<dyn MapEngine>> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!(
            "headless SDK load #{} for key {}",
            attempt,
            config.api_key_id
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let rejected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(MapError::Load(format!("headless load #{} rejected", attempt)));
        }
        Ok(Arc::new(self.engine.clone()))
    }
}
