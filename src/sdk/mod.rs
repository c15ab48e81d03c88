//! External mapping SDK: its imperative surface, the one-time bootstrap that
//! loads it, and an in-process engine implementing that surface.

pub mod bootstrap;
pub mod headless;
pub mod native;

pub use bootstrap::{
    BootstrapRegistry, BootstrapStatus, EngineFactory, HttpSdkLoader, PendingLoad, SdkBootstrap,
    SdkHandle,
};
pub use headless::{HeadlessEngine, HeadlessLoader, NativeCall};
pub use native::{
    EventTarget, ListenerId, MapEngine, NativeDataLayer, NativeEvent, NativeId, NativeListener,
    NativeMap, NativeOverlay, OverlayInit, SdkLoader,
};
