//! Map provider: owns one map per mount and publishes it to descendants

pub mod context;
pub mod handle;

pub use context::{ContextSnapshot, MapContext, SdkStatus};
pub use handle::{MapHandle, MapRef, MountTarget};

use crate::core::config::{MapOptions, ProviderConfig};
use crate::prelude::Arc;
use crate::sdk::bootstrap::SdkBootstrap;
use crate::traits::Configurable;
use crate::{MapError, Result};
use tokio::sync::watch;

type ReadyCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&MapError) + Send + Sync>;

/// The provider's `onReady()` / `onError(error)` options
#[derive(Clone, Default)]
pub struct ProviderCallbacks {
    on_ready: Option<ReadyCallback>,
    on_error: Option<ErrorCallback>,
}

impl ProviderCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_ready = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&MapError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    fn ready(&self) {
        if let Some(on_ready) = &self.on_ready {
            on_ready();
        }
    }

    fn error(&self, error: &MapError) {
        if let Some(on_error) = &self.on_error {
            on_error(error);
        }
    }
}

impl std::fmt::Debug for ProviderCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCallbacks")
            .field("on_ready", &self.on_ready.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Owns one map instance per mount
///
/// The map is created once the bootstrap is ready and destroyed on
/// [`unmount`](MapProvider::unmount) (or drop). Descendants observe progress
/// through [`MapContext`] and only ever hold a [`MapRef`].
pub struct MapProvider {
    bootstrap: Arc<SdkBootstrap>,
    config: ProviderConfig,
    options: MapOptions,
    callbacks: ProviderCallbacks,
    context: watch::Sender<ContextSnapshot>,
    handle: Option<MapHandle>,
    unmounted: bool,
}

impl MapProvider {
    pub fn new(bootstrap: Arc<SdkBootstrap>, config: ProviderConfig, options: MapOptions) -> Self {
        let (context, _) = watch::channel(ContextSnapshot::default());
        Self {
            bootstrap,
            config,
            options,
            callbacks: ProviderCallbacks::default(),
            context,
            handle: None,
            unmounted: false,
        }
    }

    pub fn with_callbacks(mut self, callbacks: ProviderCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Context for descendants; it follows every later transition
    pub fn context(&self) -> MapContext {
        MapContext::new(self.context.subscribe())
    }

    pub fn status(&self) -> SdkStatus {
        self.context.borrow().sdk_status
    }

    pub fn error(&self) -> Option<MapError> {
        self.context.borrow().sdk_error.clone()
    }

    /// Reference to the live map, if there is one
    pub fn handle(&self) -> Option<MapRef> {
        self.handle.as_ref().map(MapHandle::downgrade)
    }

    pub fn provider_config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn is_mounted(&self) -> bool {
        self.handle.is_some()
    }

    /// Waits for the SDK, then creates the map against `target`
    ///
    /// A no-op returning the existing map when already mounted. After a failed
    /// attempt, calling it again retries the bootstrap. Fails with
    /// `StaleHandle` once the provider was unmounted.
    pub async fn mount(&mut self, target: MountTarget) -> Result<MapRef> {
        if self.unmounted {
            return Err(MapError::stale("map provider was unmounted"));
        }
        if let Some(handle) = &self.handle {
            log::debug!("map on {} already created", handle.target());
            return Ok(handle.downgrade());
        }
        if let Err(err) = self.options.validate() {
            return Err(self.fail(err));
        }

        self.publish(ContextSnapshot::loading());
        let sdk = match self.bootstrap.request_load(&self.config).await {
            Ok(sdk) => sdk,
            Err(err) => return Err(self.fail(err)),
        };

        let native = match sdk.engine().create_map(&target, &self.options) {
            Ok(native) => native,
            Err(err) => return Err(self.fail(err)),
        };
        let handle = MapHandle::new(native, target, sdk.engine().name());
        let map = handle.downgrade();
        log::info!(
            "created map on {} with {} engine",
            handle.target(),
            sdk.engine().name()
        );

        self.handle = Some(handle);
        self.publish(ContextSnapshot::ready(map.clone()));
        self.callbacks.ready();
        Ok(map)
    }

    /// Destroys the map and tears the context down; idempotent
    pub fn unmount(&mut self) {
        if self.unmounted {
            log::debug!("map provider already unmounted");
            return;
        }
        self.unmounted = true;

        let status = self.status();
        if let Some(handle) = self.handle.take() {
            handle.destroy();
        }
        self.publish(ContextSnapshot::torn_down(status));
    }

    fn publish(&self, snapshot: ContextSnapshot) {
        log::debug!("map context -> {}", snapshot.sdk_status);
        self.context.send_replace(snapshot);
    }

    fn fail(&self, err: MapError) -> MapError {
        log::warn!("map provider failed: {}", err);
        self.publish(ContextSnapshot::failed(err.clone()));
        self.callbacks.error(&err);
        err
    }
}

impl Configurable for MapProvider {
    type Config = MapOptions;

    fn config(&self) -> &MapOptions {
        &self.options
    }

    /// Stores the options and pushes the changed fields to the live map
    fn set_config(&mut self, config: MapOptions) -> Result<()> {
        Self::validate_config(&config)?;
        if let Some(map) = self.handle() {
            let previous = &self.options;
            if previous.min_zoom != config.min_zoom || previous.max_zoom != config.max_zoom {
                map.set_zoom_range(config.effective_min_zoom(), config.effective_max_zoom())?;
            }
            if previous.center != config.center {
                map.set_center(config.center)?;
            }
            if previous.zoom != config.zoom {
                map.set_zoom(config.zoom)?;
            }
            if previous.map_type != config.map_type {
                map.set_map_type(config.map_type)?;
            }
            if previous.controls != config.controls {
                map.set_controls(&config.controls)?;
            }
        }
        self.options = config;
        Ok(())
    }

    fn validate_config(config: &MapOptions) -> Result<()> {
        config.validate()
    }
}

impl Drop for MapProvider {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl std::fmt::Debug for MapProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapProvider")
            .field("status", &self.status())
            .field("handle", &self.handle)
            .field("unmounted", &self.unmounted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::MapType, geo::LatLng};
    use crate::sdk::headless::{HeadlessEngine, HeadlessLoader, NativeCall};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn provider(engine: &HeadlessEngine) -> MapProvider {
        let bootstrap = SdkBootstrap::new(Arc::new(HeadlessLoader::new(engine.clone())));
        MapProvider::new(
            bootstrap,
            ProviderConfig::new("key"),
            MapOptions::new(LatLng::new(37.5, 127.0), 10.0),
        )
    }

    #[tokio::test]
    async fn test_mount_is_idempotent() {
        let engine = HeadlessEngine::new();
        let ready_calls = Arc::new(AtomicUsize::new(0));
        let counter = ready_calls.clone();
        let mut provider = provider(&engine).with_callbacks(ProviderCallbacks::new().on_ready(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        ));

        let first = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        let second = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        assert!(first.same_map(&second));
        assert_eq!(ready_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            engine.count_calls(|c| matches!(c, NativeCall::CreateMap { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_set_config_applies_only_changed_fields() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        let map = provider.mount(MountTarget::new("map").unwrap()).await.unwrap();
        engine.clear_calls();

        provider
            .update_config(|options| options.map_type = MapType::Satellite)
            .unwrap();
        assert_eq!(map.map_type().unwrap(), MapType::Satellite);
        assert_eq!(engine.calls().len(), 1);

        assert!(provider.update_config(|options| options.zoom = 99.0).is_err());
        assert_eq!(provider.config().zoom, 10.0);
    }

    #[tokio::test]
    async fn test_mount_after_unmount_is_stale() {
        let engine = HeadlessEngine::new();
        let mut provider = provider(&engine);
        provider.unmount();
        provider.unmount();
        let err = provider
            .mount(MountTarget::new("map").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StaleHandle);
        assert!(provider.context().is_torn_down());
    }
}
