use crate::core::{
    config::{MapControls, MapType},
    geo::{LatLng, LatLngBounds},
};
use crate::overlays::{
    descriptor::OverlayKind,
    registry::{OverlayEntry, OverlayId, OverlayRegistry},
};
use crate::prelude::{Arc, Mutex, Weak};
use crate::sdk::native::{NativeDataLayer, NativeId, NativeMap, NativeOverlay, OverlayInit};
use crate::{MapError, Result};

/// Element a map is created against
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountTarget(String);

impl MountTarget {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(MapError::InvalidTarget("mount target id is empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MountTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct MapInner {
    target: MountTarget,
    engine: String,
    /// `None` once the map was destroyed
    native: Mutex<Option<Box<dyn NativeMap>>>,
    overlays: Mutex<OverlayRegistry>,
}

/// Owning handle to a created map, held only by its provider
pub struct MapHandle {
    inner: Arc<MapInner>,
}

impl MapHandle {
    pub(crate) fn new(native: Box<dyn NativeMap>, target: MountTarget, engine: &str) -> Self {
        Self {
            inner: Arc::new(MapInner {
                target,
                engine: engine.to_string(),
                native: Mutex::new(Some(native)),
                overlays: Mutex::new(OverlayRegistry::new()),
            }),
        }
    }

    /// Non-owning reference handed to descendants
    pub fn downgrade(&self) -> MapRef {
        MapRef {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn target(&self) -> &MountTarget {
        &self.inner.target
    }

    /// Destroys the native map; every outstanding [`MapRef`] turns stale
    pub(crate) fn destroy(self) {
        let native = match self.inner.native.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(mut native) = native {
            native.destroy();
            log::info!("destroyed map on {}", self.inner.target);
        }
        if let Ok(mut overlays) = self.inner.overlays.lock() {
            if !overlays.is_empty() {
                log::debug!(
                    "{} overlay(s) still registered at map teardown",
                    overlays.len()
                );
            }
            overlays.clear();
        }
    }
}

impl std::fmt::Debug for MapHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapHandle")
            .field("target", &self.inner.target)
            .field("engine", &self.inner.engine)
            .finish()
    }
}

/// Non-owning reference to a provider's map
///
/// Every operation fails with [`MapError::StaleHandle`] once the provider has
/// unmounted.
#[derive(Clone)]
pub struct MapRef {
    inner: Weak<MapInner>,
}

impl MapRef {
    fn upgrade(&self) -> Result<Arc<MapInner>> {
        self.inner
            .upgrade()
            .ok_or_else(|| MapError::stale("map provider was unmounted"))
    }

    fn with_native<R>(&self, f: impl FnOnce(&mut dyn NativeMap) -> R) -> Result<R> {
        let inner = self.upgrade()?;
        let mut guard = inner
            .native
            .lock()
            .map_err(|_| MapError::Engine("map lock poisoned".into()))?;
        match guard.as_mut() {
            Some(native) => Ok(f(&mut **native)),
            None => Err(MapError::stale("map was destroyed")),
        }
    }

    fn with_overlays<R>(&self, f: impl FnOnce(&mut OverlayRegistry) -> R) -> Result<R> {
        let inner = self.upgrade()?;
        let mut guard = inner
            .overlays
            .lock()
            .map_err(|_| MapError::Engine("overlay registry lock poisoned".into()))?;
        Ok(f(&mut *guard))
    }

    pub fn is_alive(&self) -> bool {
        self.with_native(|_| ()).is_ok()
    }

    /// Whether both references point at the same map
    pub fn same_map(&self, other: &MapRef) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }

    pub fn native_id(&self) -> Result<NativeId> {
        self.with_native(|map| map.native_id())
    }

    pub fn target(&self) -> Result<MountTarget> {
        Ok(self.upgrade()?.target.clone())
    }

    pub fn engine_name(&self) -> Result<String> {
        Ok(self.upgrade()?.engine.clone())
    }

    pub fn center(&self) -> Result<LatLng> {
        self.with_native(|map| map.center())
    }

    pub fn zoom(&self) -> Result<f64> {
        self.with_native(|map| map.zoom())
    }

    pub fn bounds(&self) -> Result<LatLngBounds> {
        self.with_native(|map| map.bounds())
    }

    pub fn map_type(&self) -> Result<MapType> {
        self.with_native(|map| map.map_type())
    }

    pub fn set_center(&self, center: LatLng) -> Result<()> {
        if !center.is_valid() {
            return Err(MapError::InvalidUpdate(format!(
                "center ({}, {}) is out of range",
                center.lat, center.lng
            )));
        }
        self.with_native(|map| map.set_center(center))
    }

    pub fn set_zoom(&self, zoom: f64) -> Result<()> {
        self.with_native(|map| map.set_zoom(zoom))
    }

    pub fn set_map_type(&self, map_type: MapType) -> Result<()> {
        self.with_native(|map| map.set_map_type(map_type))
    }

    pub fn set_zoom_range(&self, min_zoom: f64, max_zoom: f64) -> Result<()> {
        if min_zoom > max_zoom {
            return Err(MapError::InvalidUpdate(format!(
                "min zoom {} exceeds max zoom {}",
                min_zoom, max_zoom
            )));
        }
        self.with_native(|map| map.set_zoom_range(min_zoom, max_zoom))
    }

    pub fn set_controls(&self, controls: &MapControls) -> Result<()> {
        self.with_native(|map| map.set_controls(controls))
    }

    /// Moves the center without touching the zoom level
    pub fn pan_to(&self, center: LatLng) -> Result<()> {
        log::debug!("pan to ({}, {})", center.lat, center.lng);
        self.set_center(center)
    }

    pub fn fit_bounds(&self, bounds: LatLngBounds) -> Result<()> {
        self.with_native(|map| map.fit_bounds(bounds))
    }

    pub fn overlay_count(&self) -> Result<usize> {
        self.with_overlays(|registry| registry.len())
    }

    pub fn overlay(&self, id: OverlayId) -> Result<Option<OverlayEntry>> {
        self.with_overlays(|registry| registry.get(&id).cloned())
    }

    /// Attached overlays, bottom-most first
    pub fn overlays(&self) -> Result<Vec<OverlayEntry>> {
        self.with_overlays(|registry| registry.entries().into_iter().cloned().collect())
    }

    pub fn overlay_count_of(&self, kind: OverlayKind) -> Result<usize> {
        self.with_overlays(|registry| registry.count_of(kind))
    }

    pub(crate) fn create_overlay(
        &self,
        kind: OverlayKind,
        init: &OverlayInit,
    ) -> Result<Box<dyn NativeOverlay>> {
        self.with_native(|map| map.create_overlay(kind, init))?
    }

    pub(crate) fn create_data_layer(&self) -> Result<Box<dyn NativeDataLayer>> {
        self.with_native(|map| map.create_data_layer())?
    }

    pub(crate) fn register_overlay(&self, entry: OverlayEntry) -> Result<()> {
        self.with_overlays(|registry| registry.register(entry))
    }

    /// No-op when the map is already gone
    pub(crate) fn deregister_overlay(&self, id: OverlayId) -> bool {
        self.with_overlays(|registry| registry.remove(&id).is_some())
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for MapRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.inner.upgrade() {
            Some(inner) => write!(f, "MapRef({})", inner.target),
            None => write!(f, "MapRef(<stale>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::MapOptions;
    use crate::sdk::headless::HeadlessEngine;
    use crate::sdk::native::MapEngine;

    fn handle() -> MapHandle {
        let engine = HeadlessEngine::new();
        let target = MountTarget::new("map").unwrap();
        let native = engine
            .create_map(&target, &MapOptions::new(LatLng::new(37.5, 127.0), 11.0))
            .unwrap();
        MapHandle::new(native, target, engine.name())
    }

    #[test]
    fn test_mount_target_rejects_empty_id() {
        assert!(matches!(
            MountTarget::new("  "),
            Err(MapError::InvalidTarget(_))
        ));
        assert_eq!(MountTarget::new("map").unwrap().to_string(), "#map");
    }

    #[test]
    fn test_ref_reads_and_commands() {
        let handle = handle();
        let map = handle.downgrade();
        assert_eq!(map.center().unwrap(), LatLng::new(37.5, 127.0));
        assert_eq!(map.zoom().unwrap(), 11.0);

        map.set_zoom(14.0).unwrap();
        map.pan_to(LatLng::new(35.0, 129.0)).unwrap();
        map.set_map_type(MapType::Terrain).unwrap();
        assert_eq!(map.zoom().unwrap(), 14.0);
        assert_eq!(map.center().unwrap(), LatLng::new(35.0, 129.0));
        assert_eq!(map.map_type().unwrap(), MapType::Terrain);
        assert!(map.set_center(LatLng::new(95.0, 0.0)).is_err());
    }

    #[test]
    fn test_ref_turns_stale_after_destroy() {
        let handle = handle();
        let map = handle.downgrade();
        let other = map.clone();
        assert!(map.same_map(&other));
        assert!(map.is_alive());

        handle.destroy();
        assert!(!map.is_alive());
        assert_eq!(
            map.zoom().unwrap_err().kind(),
            crate::ErrorKind::StaleHandle
        );
        assert!(map.overlay_count().is_err());
        assert!(!map.deregister_overlay(OverlayId::next()));
        assert_eq!(format!("{:?}", map), "MapRef(<stale>)");
    }
}
