//! Data layer: a remotely sourced, mutable feature collection on a map
//!
//! The controller shares the overlay lifecycle (`Unmounted -> Pending ->
//! Attached -> Disposed`) and adds a load pipeline on top of it. Every load
//! attempt is tagged with a generation; the fetch+parse task posts its outcome
//! back over a channel and the controller applies it from [`poll`] or
//! [`settle`], dropping outcomes whose generation is no longer current.
//!
//! [`poll`]: DataLayerController::poll
//! [`settle`]: DataLayerController::settle

use crate::core::geo::{LatLng, LatLngBounds};
use crate::data::counters::DataLayerCounters;
use crate::data::feature::{Feature, FeatureId};
use crate::data::fetch::DocumentFetcher;
use crate::data::formats::{self, FeatureCollection};
use crate::data::source::{DataSource, DataStatus, PropertyChange};
use crate::events::{EventBindings, Handler, HandlerSet};
use crate::overlays::{
    controller::OverlayState,
    descriptor::OverlayKind,
    registry::{OverlayEntry, OverlayId},
};
use crate::prelude::{Arc, HashSet};
use crate::provider::{context::MapContext, handle::MapRef};
use crate::sdk::native::{NativeDataLayer, NativeEvent, NativeId};
use crate::style::Style;
use crate::{MapError, Result};
use serde_json::Value;
use tokio::sync::mpsc;

/// Events a data layer forwards to its handler props
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLayerEventKind {
    Click,
    DblClick,
    RightClick,
    MouseDown,
    MouseUp,
    MouseOver,
    MouseOut,
    AddFeature,
    RemoveFeature,
    PropertyChanged,
}

impl DataLayerEventKind {
    /// Pointer events, dispatched by the engine per feature
    pub const POINTER: [DataLayerEventKind; 7] = [
        DataLayerEventKind::Click,
        DataLayerEventKind::DblClick,
        DataLayerEventKind::RightClick,
        DataLayerEventKind::MouseDown,
        DataLayerEventKind::MouseUp,
        DataLayerEventKind::MouseOver,
        DataLayerEventKind::MouseOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataLayerEventKind::Click => "click",
            DataLayerEventKind::DblClick => "dblclick",
            DataLayerEventKind::RightClick => "rightclick",
            DataLayerEventKind::MouseDown => "mousedown",
            DataLayerEventKind::MouseUp => "mouseup",
            DataLayerEventKind::MouseOver => "mouseover",
            DataLayerEventKind::MouseOut => "mouseout",
            DataLayerEventKind::AddFeature => "addfeature",
            DataLayerEventKind::RemoveFeature => "removefeature",
            DataLayerEventKind::PropertyChanged => "property_changed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "click" => Some(DataLayerEventKind::Click),
            "dblclick" => Some(DataLayerEventKind::DblClick),
            "rightclick" => Some(DataLayerEventKind::RightClick),
            "mousedown" => Some(DataLayerEventKind::MouseDown),
            "mouseup" => Some(DataLayerEventKind::MouseUp),
            "mouseover" => Some(DataLayerEventKind::MouseOver),
            "mouseout" => Some(DataLayerEventKind::MouseOut),
            "addfeature" => Some(DataLayerEventKind::AddFeature),
            "removefeature" => Some(DataLayerEventKind::RemoveFeature),
            "property_changed" => Some(DataLayerEventKind::PropertyChanged),
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        Self::POINTER.contains(self)
    }
}

impl std::fmt::Display for DataLayerEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload handed to data-layer handler props
#[derive(Debug, Clone, PartialEq)]
pub struct DataLayerEvent {
    pub kind: DataLayerEventKind,
    /// Affected feature
    pub feature: Feature,
    /// Pointer position, pointer events only
    pub lat_lng: Option<LatLng>,
    /// Set for `property_changed`
    pub property: Option<PropertyChange>,
}

fn translate(event: &NativeEvent) -> Option<DataLayerEvent> {
    let kind = DataLayerEventKind::from_name(&event.name).filter(DataLayerEventKind::is_pointer)?;
    Some(DataLayerEvent {
        kind,
        feature: event.feature.clone()?,
        lat_lng: event.lat_lng,
        property: None,
    })
}

fn is_pointer_event(name: &str) -> bool {
    DataLayerEventKind::from_name(name).map_or(false, |kind| kind.is_pointer())
}

type ReadyCallback = Arc<dyn Fn(&[Feature]) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&MapError) + Send + Sync>;
type DestroyCallback = Arc<dyn Fn() + Send + Sync>;

/// Declarative configuration of a data layer
#[derive(Clone)]
pub struct DataLayerProps {
    pub url: Option<String>,
    /// Patch over the default base style
    pub style: Style,
    pub visible: bool,
    pub handlers: HandlerSet<DataLayerEvent>,
    pub on_data_ready: Option<ReadyCallback>,
    pub on_data_error: Option<ErrorCallback>,
    pub on_data_destroy: Option<DestroyCallback>,
    /// Shared across mounts; pass the same `Arc` to keep counting
    pub counters: Arc<DataLayerCounters>,
}

impl Default for DataLayerProps {
    fn default() -> Self {
        Self {
            url: None,
            style: Style::default(),
            visible: true,
            handlers: HandlerSet::new(),
            on_data_ready: None,
            on_data_error: None,
            on_data_destroy: None,
            counters: Arc::new(DataLayerCounters::new()),
        }
    }
}

impl DataLayerProps {
    pub fn new(url: impl Into<String>) -> Self {
        Self::default().url(url)
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn on(mut self, kind: DataLayerEventKind, handler: Handler<DataLayerEvent>) -> Self {
        self.handlers.insert(kind.as_str(), handler);
        self
    }

    pub fn on_data_ready<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Feature]) + Send + Sync + 'static,
    {
        self.on_data_ready = Some(Arc::new(f));
        self
    }

    pub fn on_data_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapError) + Send + Sync + 'static,
    {
        self.on_data_error = Some(Arc::new(f));
        self
    }

    pub fn on_data_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_data_destroy = Some(Arc::new(f));
        self
    }

    pub fn counters(mut self, counters: Arc<DataLayerCounters>) -> Self {
        self.counters = counters;
        self
    }
}

impl std::fmt::Debug for DataLayerProps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayerProps")
            .field("url", &self.url)
            .field("style", &self.style)
            .field("visible", &self.visible)
            .field("handlers", &self.handlers)
            .finish()
    }
}

/// Result of one fetch+parse task
struct LoadOutcome {
    generation: u64,
    result: Result<Vec<Feature>>,
}

/// Delivers exactly one outcome for a generation; a task that ends without
/// sending (panic, abort) reports a failure from `drop`
struct OutcomeSender {
    generation: u64,
    tx: Option<mpsc::UnboundedSender<LoadOutcome>>,
}

impl OutcomeSender {
    fn send(mut self, result: Result<Vec<Feature>>) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: Result<Vec<Feature>>) {
        if let Some(tx) = self.tx.take() {
            // The receiver is gone once the controller was dropped
            let _ = tx.send(LoadOutcome {
                generation: self.generation,
                result,
            });
        }
    }
}

impl Drop for OutcomeSender {
    fn drop(&mut self) {
        if self.tx.is_some() {
            log::warn!("load task for generation {} ended without a result", self.generation);
            self.deliver(Err(MapError::Network(
                "load task ended without a result".to_string(),
            )));
        }
    }
}

async fn fetch_and_parse(fetcher: &dyn DocumentFetcher, url: &str) -> Result<Vec<Feature>> {
    let body = fetcher.fetch(url).await.map_err(|err| match err {
        MapError::Network(_) => err,
        other => MapError::Network(other.to_string()),
    })?;
    formats::parse_document(&body)
}

pub struct DataLayerController {
    id: OverlayId,
    state: OverlayState,
    context: Option<MapContext>,
    map: Option<MapRef>,
    props: DataLayerProps,
    source: DataSource,
    /// Accumulated `set_style` patches, layered over the declared style
    style_patches: Style,
    native: Option<Box<dyn NativeDataLayer>>,
    bindings: EventBindings<DataLayerEvent>,
    fetcher: Arc<dyn DocumentFetcher>,
    outcome_tx: mpsc::UnboundedSender<LoadOutcome>,
    outcomes: mpsc::UnboundedReceiver<LoadOutcome>,
}

impl DataLayerController {
    pub fn new(props: DataLayerProps, fetcher: Arc<dyn DocumentFetcher>) -> Self {
        let (outcome_tx, outcomes) = mpsc::unbounded_channel();
        let source = DataSource::new(Style::base().merged(&props.style));
        Self {
            id: OverlayId::next(),
            state: OverlayState::Unmounted,
            context: None,
            map: None,
            props,
            source,
            style_patches: Style::default(),
            native: None,
            bindings: EventBindings::new(translate),
            fetcher,
            outcome_tx,
            outcomes,
        }
    }

    pub fn id(&self) -> OverlayId {
        self.id
    }

    pub fn state(&self) -> OverlayState {
        self.state
    }

    pub fn props(&self) -> &DataLayerProps {
        &self.props
    }

    pub fn status(&self) -> DataStatus {
        self.source.status()
    }

    pub fn generation(&self) -> u64 {
        self.source.generation()
    }

    pub fn url(&self) -> Option<&str> {
        self.source.url()
    }

    pub fn last_error(&self) -> Option<&MapError> {
        self.source.last_error()
    }

    pub fn counters(&self) -> &Arc<DataLayerCounters> {
        &self.props.counters
    }

    /// Whether the layer currently has a native object on a live map
    pub fn is_bound(&self) -> bool {
        self.state == OverlayState::Attached && self.native.is_some() && self.map_alive()
    }

    fn map_alive(&self) -> bool {
        self.map.as_ref().map_or(false, MapRef::is_alive)
    }

    /// Abandons the current load once the owning map was torn down; `true`
    /// when the map is gone
    fn abandon_if_orphaned(&mut self) -> bool {
        if self.map_alive() {
            return false;
        }
        if self.source.cancel_load() {
            log::debug!("{} abandoned its load, the map was torn down", self.id);
        }
        true
    }

    pub fn mount(&mut self, context: MapContext) -> Result<OverlayState> {
        match self.state {
            OverlayState::Unmounted => {}
            OverlayState::Disposed => {
                return Err(MapError::stale(format!("{} was disposed", self.id)));
            }
            _ => return Ok(self.state),
        }
        self.context = Some(context);
        self.state = OverlayState::Pending;
        self.sync()
    }

    /// Attaches if the map became ready, then applies finished loads
    pub fn sync(&mut self) -> Result<OverlayState> {
        if self.state == OverlayState::Pending {
            let map = self.context.as_ref().and_then(MapContext::map);
            if let Some(map) = map {
                self.attach(map)?;
            }
        }
        self.poll();
        Ok(self.state)
    }

    /// Waits for the map and attaches
    pub async fn attached(&mut self) -> Result<()> {
        match self.state {
            OverlayState::Attached => return Ok(()),
            OverlayState::Pending => {}
            state => return Err(MapError::stale(format!("{} is {}", self.id, state))),
        }
        let context = match &self.context {
            Some(context) => context.clone(),
            None => return Err(MapError::stale(format!("{} has no map context", self.id))),
        };
        let map = context.ready().await?;
        if self.state != OverlayState::Pending {
            return self.check_bound();
        }
        self.attach(map)
    }

    fn attach(&mut self, map: MapRef) -> Result<()> {
        let mut native = map.create_data_layer()?;
        if !self.props.visible {
            native.set_visible(false);
        }
        let pointer = self.props.handlers.filtered(is_pointer_event);
        self.bindings.sync(&mut *native, &pointer);
        map.register_overlay(OverlayEntry {
            id: self.id,
            kind: OverlayKind::DataLayer,
            native_id: native.native_id(),
            z_index: self.source.base_style().z_index.unwrap_or(0),
        })?;
        log::debug!("{} attached as data layer #{}", self.id, native.native_id());

        self.native = Some(native);
        self.map = Some(map);
        self.state = OverlayState::Attached;

        if let Some(url) = self.props.url.clone() {
            self.start_load(url);
        }
        Ok(())
    }

    fn start_load(&mut self, url: String) {
        let generation = self.source.begin_load(url.clone());
        log::debug!("{} loading {} (generation {})", self.id, url, generation);

        let fetcher = Arc::clone(&self.fetcher);
        let sender = OutcomeSender {
            generation,
            tx: Some(self.outcome_tx.clone()),
        };
        crate::runtime::spawn(async move {
            let result = fetch_and_parse(&*fetcher, &url).await;
            sender.send(result);
        });
    }

    /// Applies every load outcome that already arrived; returns how many were
    /// current
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.outcomes.try_recv() {
            if self.apply_outcome(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Waits until the current load finished and applies it
    pub async fn settle(&mut self) -> Result<DataStatus> {
        self.check_bound()?;
        self.poll();
        while self.source.status() == DataStatus::Loading {
            match self.outcomes.recv().await {
                Some(outcome) => {
                    self.apply_outcome(outcome);
                }
                None => break,
            }
        }
        Ok(self.source.status())
    }

    fn apply_outcome(&mut self, outcome: LoadOutcome) -> bool {
        if self.state != OverlayState::Attached || self.abandon_if_orphaned() {
            return false;
        }
        let LoadOutcome { generation, result } = outcome;
        match result {
            Ok(features) => self.apply_loaded(generation, features),
            Err(err) => self.apply_failed(generation, err),
        }
    }

    fn apply_loaded(&mut self, generation: u64, features: Vec<Feature>) -> bool {
        let Some(diff) = self.source.apply_loaded(generation, features) else {
            log::debug!("{} dropped stale load (generation {})", self.id, generation);
            return false;
        };

        if let Some(native) = self.native.as_mut() {
            for feature in &diff.removed {
                native.remove_feature(&feature.id);
            }
            for feature in &diff.added {
                native.add_feature(feature);
                if let Some(style) = self.source.effective_style(&feature.id) {
                    native.set_feature_style(&feature.id, &style);
                }
            }
        }

        let counters = Arc::clone(&self.props.counters);
        counters.record_removed(diff.removed.len());
        counters.record_added(diff.added.len());
        counters.record_ready();
        log::debug!(
            "{} ready with {} feature(s), {} removed",
            self.id,
            diff.added.len(),
            diff.removed.len()
        );

        if let Some(on_data_ready) = &self.props.on_data_ready {
            on_data_ready(&self.source.all());
        }
        for feature in diff.removed {
            self.emit(DataLayerEventKind::RemoveFeature, feature, None);
        }
        for feature in diff.added {
            self.emit(DataLayerEventKind::AddFeature, feature, None);
        }
        true
    }

    fn apply_failed(&mut self, generation: u64, err: MapError) -> bool {
        let Some(cleared) = self.source.apply_failed(generation, err.clone()) else {
            log::debug!("{} dropped stale failure (generation {})", self.id, generation);
            return false;
        };
        log::warn!("{} failed to load {:?}: {}", self.id, self.source.url(), err);

        if let Some(native) = self.native.as_mut() {
            for feature in &cleared {
                native.remove_feature(&feature.id);
            }
        }
        let counters = Arc::clone(&self.props.counters);
        counters.record_removed(cleared.len());
        counters.record_error(err.to_string());

        for feature in cleared {
            self.emit(DataLayerEventKind::RemoveFeature, feature, None);
        }
        if let Some(on_data_error) = &self.props.on_data_error {
            on_data_error(&err);
        }
        true
    }

    fn emit(&self, kind: DataLayerEventKind, feature: Feature, property: Option<PropertyChange>) {
        if let Some(handler) = self.props.handlers.get(kind.as_str()) {
            handler.call(&DataLayerEvent {
                kind,
                feature,
                lat_lng: None,
                property,
            });
        }
    }

    /// Declares new props
    ///
    /// A changed url starts a new generation; a changed style rebuilds the
    /// base style from the declaration; pointer handlers are rebound by
    /// identity. Ignored after disposal.
    pub fn update(&mut self, props: DataLayerProps) -> Result<()> {
        if self.state == OverlayState::Disposed {
            log::debug!("ignoring update of disposed {}", self.id);
            return Ok(());
        }
        let previous = std::mem::replace(&mut self.props, props);
        if self.state != OverlayState::Attached {
            if previous.style != self.props.style {
                let base = self.resolved_base();
                self.source.replace_base_style(base);
            }
            return Ok(());
        }
        self.check_bound()?;

        if let Some(native) = self.native.as_mut() {
            let pointer = self.props.handlers.filtered(is_pointer_event);
            self.bindings.sync(&mut **native, &pointer);
            if previous.visible != self.props.visible {
                native.set_visible(self.props.visible);
            }
        }
        if previous.style != self.props.style {
            self.restyle();
        }
        if previous.url != self.props.url {
            match self.props.url.clone() {
                Some(url) => self.start_load(url),
                None => self.clear(),
            }
        }
        Ok(())
    }

    /// Drops the url and every feature
    fn clear(&mut self) {
        let removed = self.source.reset();
        if let Some(native) = self.native.as_mut() {
            for feature in &removed {
                native.remove_feature(&feature.id);
            }
        }
        self.props.counters.record_removed(removed.len());
        for feature in removed {
            self.emit(DataLayerEventKind::RemoveFeature, feature, None);
        }
    }

    fn check_bound(&self) -> Result<()> {
        if !self.is_bound() {
            return Err(MapError::stale(format!("{} is {}", self.id, self.state)));
        }
        match &self.map {
            Some(map) if map.is_alive() => Ok(()),
            _ => Err(MapError::stale(format!("map of {} was torn down", self.id))),
        }
    }

    pub fn native_id(&self) -> Result<NativeId> {
        self.check_bound()?;
        self.native
            .as_ref()
            .map(|native| native.native_id())
            .ok_or_else(|| MapError::stale(format!("{} has no native layer", self.id)))
    }

    /// Ordered snapshot of every feature
    pub fn get_all_features(&self) -> Result<Vec<Feature>> {
        self.check_bound()?;
        Ok(self.source.all())
    }

    pub fn get_feature_by_id(&self, id: &FeatureId) -> Result<Option<Feature>> {
        self.check_bound()?;
        Ok(self.source.get(id).cloned())
    }

    /// Inserts a feature; its id must not be present yet
    pub fn add_feature(&mut self, feature: Feature) -> Result<()> {
        self.check_bound()?;
        self.source.add_feature(feature.clone())?;
        if let Some(native) = self.native.as_mut() {
            native.add_feature(&feature);
            native.set_feature_style(&feature.id, self.source.base_style());
        }
        self.props.counters.record_added(1);
        self.emit(DataLayerEventKind::AddFeature, feature, None);
        Ok(())
    }

    pub fn remove_feature(&mut self, id: &FeatureId) -> Result<Feature> {
        self.check_bound()?;
        let feature = self.source.remove_feature(id)?;
        if let Some(native) = self.native.as_mut() {
            native.remove_feature(id);
        }
        self.props.counters.record_removed(1);
        self.emit(DataLayerEventKind::RemoveFeature, feature.clone(), None);
        Ok(feature)
    }

    /// Merges an inline GeoJSON document into the layer; returns the number of
    /// features added. Nothing is added when any id collides.
    pub fn add_geojson(&mut self, document: &str) -> Result<usize> {
        self.check_bound()?;
        let features = formats::parse_geojson(document)?;
        let mut seen = HashSet::default();
        for feature in &features {
            if !seen.insert(&feature.id) || self.source.get(&feature.id).is_some() {
                return Err(MapError::DuplicateFeature(feature.id.to_string()));
            }
        }
        let count = features.len();
        for feature in features {
            self.add_feature(feature)?;
        }
        Ok(count)
    }

    pub fn set_property(&mut self, id: &FeatureId, name: &str, value: Value) -> Result<()> {
        self.check_bound()?;
        let (feature, change) = self.source.set_property(id, name, value)?;
        if let Some(native) = self.native.as_mut() {
            native.update_feature(&feature);
        }
        self.emit(DataLayerEventKind::PropertyChanged, feature, Some(change));
        Ok(())
    }

    /// Merges `patch` into the base style and restyles every feature without
    /// an override
    ///
    /// Patches stay layered over the declared style, so a later change of
    /// `props.style` keeps them.
    pub fn set_style(&mut self, patch: &Style) -> Result<()> {
        self.check_bound()?;
        self.style_patches.merge(patch);
        self.restyle();
        Ok(())
    }

    /// Defaults, then the declared style, then `set_style` patches
    fn resolved_base(&self) -> Style {
        Style::base()
            .merged(&self.props.style)
            .merged(&self.style_patches)
    }

    fn restyle(&mut self) {
        let base = self.resolved_base();
        let restyled = self.source.replace_base_style(base);
        if let Some(native) = self.native.as_mut() {
            let base = self.source.base_style();
            for id in &restyled {
                native.set_feature_style(id, base);
            }
        }
    }

    /// Current base style
    pub fn get_style(&self) -> Result<Style> {
        self.check_bound()?;
        Ok(self.source.base_style().clone())
    }

    /// Replaces the feature's override with the base style merged with `patch`
    pub fn override_style(&mut self, id: &FeatureId, patch: &Style) -> Result<()> {
        self.check_bound()?;
        let resolved = self.source.override_style(id, patch)?;
        if let Some(native) = self.native.as_mut() {
            native.set_feature_style(id, &resolved);
        }
        Ok(())
    }

    /// Restores the base style of a feature; no-op without an override
    pub fn revert_style(&mut self, id: &FeatureId) -> Result<()> {
        self.check_bound()?;
        if !self.source.revert_style(id) {
            return Ok(());
        }
        if let Some(native) = self.native.as_mut() {
            native.set_feature_style(id, self.source.base_style());
        }
        Ok(())
    }

    pub fn effective_style(&self, id: &FeatureId) -> Result<Option<Style>> {
        self.check_bound()?;
        Ok(self.source.effective_style(id))
    }

    pub fn to_geojson(&self) -> Result<FeatureCollection> {
        self.check_bound()?;
        Ok(self.source.to_geojson())
    }

    pub fn bounds(&self) -> Result<Option<LatLngBounds>> {
        self.check_bound()?;
        Ok(self.source.bounds())
    }

    pub fn set_visible(&mut self, visible: bool) -> Result<()> {
        self.check_bound()?;
        self.props.visible = visible;
        if let Some(native) = self.native.as_mut() {
            native.set_visible(visible);
        }
        Ok(())
    }

    /// Tears the layer down; a second call does nothing
    ///
    /// In-flight loads become stale, handlers are unbound, `on_data_destroy`
    /// runs, and only then is the native layer released. A layer whose map
    /// was already torn down skips the release.
    pub fn dispose(&mut self) {
        if self.state == OverlayState::Disposed {
            return;
        }
        let was_mounted = self.state != OverlayState::Unmounted;
        let map_alive = self.map_alive();
        self.source.reset();

        let mut native = self.native.take();
        if let Some(native) = native.as_mut() {
            let unbound = self.bindings.unbind_all(&mut **native);
            log::debug!("{} unbound {} handler(s)", self.id, unbound);
        }
        if was_mounted {
            self.props.counters.record_destroy();
            if let Some(on_data_destroy) = &self.props.on_data_destroy {
                on_data_destroy();
            }
        }
        if let Some(mut native) = native.filter(|_| map_alive) {
            native.release();
        }
        if let Some(map) = self.map.take() {
            map.deregister_overlay(self.id);
        }
        self.context = None;
        self.state = OverlayState::Disposed;
        log::debug!("{} disposed", self.id);
    }
}

impl Drop for DataLayerController {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DataLayerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataLayerController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("status", &self.source.status())
            .field("generation", &self.source.generation())
            .field("features", &self.source.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{MapOptions, ProviderConfig};
    use crate::data::fetch::MemoryFetcher;
    use crate::prelude::Mutex;
    use crate::provider::{handle::MountTarget, MapProvider};
    use crate::sdk::{
        bootstrap::SdkBootstrap,
        headless::{HeadlessEngine, HeadlessLoader, NativeCall},
    };

    const TWO_POINTS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","id":"a","geometry":{"type":"Point","coordinates":[127.0,37.5]},"properties":{}},
        {"type":"Feature","id":"b","geometry":{"type":"Point","coordinates":[126.9,37.4]},"properties":{}}
    ]}"#;

    async fn mounted_provider(engine: &HeadlessEngine) -> MapProvider {
        let bootstrap = SdkBootstrap::new(Arc::new(HeadlessLoader::new(engine.clone())));
        let mut provider = MapProvider::new(
            bootstrap,
            ProviderConfig::new("key"),
            MapOptions::default(),
        );
        provider
            .mount(MountTarget::new("map").unwrap())
            .await
            .unwrap();
        provider
    }

    fn fetcher() -> Arc<MemoryFetcher> {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("/two.geojson", TWO_POINTS);
        Arc::new(fetcher)
    }

    struct PanickingFetcher;

    #[async_trait::async_trait]
    impl DocumentFetcher for PanickingFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            panic!("fetcher blew up on {}", url);
        }
    }

    #[test]
    fn test_event_names() {
        for kind in DataLayerEventKind::POINTER {
            assert_eq!(DataLayerEventKind::from_name(kind.as_str()), Some(kind));
        }
        assert!(!DataLayerEventKind::AddFeature.is_pointer());
        assert_eq!(
            DataLayerEventKind::from_name("property_changed"),
            Some(DataLayerEventKind::PropertyChanged)
        );
        assert_eq!(DataLayerEventKind::from_name("drag"), None);
    }

    #[tokio::test]
    async fn test_ref_surface_fails_before_attach() {
        let mut layer = DataLayerController::new(DataLayerProps::new("/two.geojson"), fetcher());
        assert!(!layer.is_bound());
        let err = layer.get_all_features().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StaleHandle);
        assert!(layer.add_feature(Feature::new("x", None)).is_err());
        assert!(layer.settle().await.is_err());
    }

    #[tokio::test]
    async fn test_load_applies_features_and_styles() {
        let engine = HeadlessEngine::new();
        let provider = mounted_provider(&engine).await;
        let mut layer = DataLayerController::new(
            DataLayerProps::new("/two.geojson").style(Style::default().stroke("#000", 1.0)),
            fetcher(),
        );
        layer.mount(provider.context()).unwrap();
        assert_eq!(layer.status(), DataStatus::Loading);
        assert_eq!(layer.settle().await.unwrap(), DataStatus::Ready);

        let native = layer.native_id().unwrap();
        assert_eq!(
            engine.layer_features(native),
            vec![FeatureId::from("a"), FeatureId::from("b")]
        );
        let style = engine.feature_style(native, &FeatureId::from("a")).unwrap();
        assert_eq!(style.stroke_color.as_deref(), Some("#000"));
        assert_eq!(layer.counters().data_ready_count(), 1);
        assert_eq!(layer.counters().features_added_count(), 2);
    }

    #[tokio::test]
    async fn test_mutation_events_reach_handlers() {
        let engine = HeadlessEngine::new();
        let provider = mounted_provider(&engine).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let record = Handler::new(move |event: &DataLayerEvent| {
            sink.lock()
                .unwrap()
                .push((event.kind, event.feature.id.to_string()));
        });
        let props = DataLayerProps::default()
            .on(DataLayerEventKind::AddFeature, record.clone())
            .on(DataLayerEventKind::RemoveFeature, record.clone())
            .on(DataLayerEventKind::PropertyChanged, record);
        let mut layer = DataLayerController::new(props, fetcher());
        layer.mount(provider.context()).unwrap();

        layer.add_feature(Feature::new("x", None)).unwrap();
        layer
            .set_property(&FeatureId::from("x"), "name", Value::from("X"))
            .unwrap();
        layer.remove_feature(&FeatureId::from("x")).unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                (DataLayerEventKind::AddFeature, "x".to_string()),
                (DataLayerEventKind::PropertyChanged, "x".to_string()),
                (DataLayerEventKind::RemoveFeature, "x".to_string()),
            ]
        );
        // Mutation handlers are not bound on the engine
        assert_eq!(engine.listeners_on(layer.native_id().unwrap()), 0);
    }

    #[tokio::test]
    async fn test_settle_returns_when_load_task_panics() {
        let engine = HeadlessEngine::new();
        let provider = mounted_provider(&engine).await;
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let props = DataLayerProps::new("/boom.geojson").on_data_error(move |err| {
            sink.lock().unwrap().push(err.clone());
        });
        let mut layer = DataLayerController::new(props, Arc::new(PanickingFetcher));
        layer.mount(provider.context()).unwrap();

        let status = tokio::time::timeout(std::time::Duration::from_secs(1), layer.settle())
            .await
            .expect("settle must not hang")
            .unwrap();
        assert_eq!(status, DataStatus::Error);
        assert_eq!(layer.last_error().unwrap().kind(), crate::ErrorKind::Network);
        assert_eq!(errors.lock().unwrap().len(), 1);
        assert_eq!(layer.counters().error_count(), 1);
    }

    #[tokio::test]
    async fn test_add_geojson_rejects_collisions_atomically() {
        let engine = HeadlessEngine::new();
        let provider = mounted_provider(&engine).await;
        let mut layer = DataLayerController::new(DataLayerProps::default(), fetcher());
        layer.mount(provider.context()).unwrap();

        assert_eq!(layer.add_geojson(TWO_POINTS).unwrap(), 2);
        let err = layer.add_geojson(TWO_POINTS).unwrap_err();
        assert!(matches!(err, MapError::DuplicateFeature(_)));
        assert_eq!(layer.get_all_features().unwrap().len(), 2);
        assert!(layer.bounds().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dispose_releases_after_destroy_callback() {
        let engine = HeadlessEngine::new();
        let provider = mounted_provider(&engine).await;
        let journal = engine.clone();
        let released_at_destroy = Arc::new(Mutex::new(None));
        let slot = released_at_destroy.clone();
        let props = DataLayerProps::default()
            .on(DataLayerEventKind::Click, Handler::new(|_: &DataLayerEvent| {}))
            .on_data_destroy(move || {
                let released = journal.count_calls(|c| matches!(c, NativeCall::ReleaseLayer { .. }));
                *slot.lock().unwrap() = Some((released, journal.total_listeners()));
            });
        let mut layer = DataLayerController::new(props, fetcher());
        layer.mount(provider.context()).unwrap();
        assert_eq!(engine.total_listeners(), 1);

        layer.dispose();
        layer.dispose();
        assert_eq!(*released_at_destroy.lock().unwrap(), Some((0, 0)));
        assert_eq!(
            engine.count_calls(|c| matches!(c, NativeCall::ReleaseLayer { .. })),
            1
        );
        assert_eq!(layer.counters().data_destroy_count(), 1);
        assert!(!layer.is_bound());
        assert!(layer.update(DataLayerProps::new("/two.geojson")).is_ok());
    }
}
