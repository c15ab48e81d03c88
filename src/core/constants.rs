//! Engine-wide defaults for SDK bootstrap, map creation and feature styling.
//! Keeping them in a single place makes it easier to tweak bridge-wide magic numbers.

/// Deadline for loading the external SDK when the provider config omits one.
pub const DEFAULT_SDK_TIMEOUT_MS: u64 = 10_000;

/// Endpoint used by the HTTP SDK loader when no `sdk_url` is configured.
pub const DEFAULT_SDK_URL: &str = "https://oapi.map.naver.com/openapi/v3/maps.js";

/// Initial zoom of a freshly created map.
pub const DEFAULT_ZOOM: f64 = 10.0;

/// Zoom limits accepted by the engine.
pub const MIN_ZOOM: f64 = 0.0;
pub const MAX_ZOOM: f64 = 21.0;

/// Viewport size (CSS pixels) assumed when an engine cannot measure its mount target.
pub const DEFAULT_VIEWPORT_PX: (u32, u32) = (800, 600);

/// Default square tile size in pixels.
pub const TILE_SIZE: u32 = 256;

/// Base style applied to data-layer features before any `set_style` call.
pub const DEFAULT_STROKE_COLOR: &str = "#3388ff";
pub const DEFAULT_STROKE_WEIGHT: f64 = 3.0;
pub const DEFAULT_STROKE_OPACITY: f64 = 1.0;
pub const DEFAULT_FILL_COLOR: &str = "#3388ff";
pub const DEFAULT_FILL_OPACITY: f64 = 0.2;

/// Prefix of ids assigned to parsed features that carry no id of their own.
pub const GENERATED_FEATURE_ID_PREFIX: &str = "feature-";
