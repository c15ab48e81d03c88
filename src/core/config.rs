//! Configuration for the SDK bootstrap and for map creation
//!
//! `ProviderConfig` describes how the external SDK is acquired and is shared by
//! every provider in the process. `MapOptions` is the declarative description of
//! one map instance and is re-applied field by field when it changes.

use crate::core::{
    constants::{DEFAULT_SDK_TIMEOUT_MS, DEFAULT_ZOOM, MAX_ZOOM, MIN_ZOOM},
    geo::LatLng,
};
use crate::{MapError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_timeout_ms() -> u64 {
    DEFAULT_SDK_TIMEOUT_MS
}

/// Options recognised by the provider when it requests the SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Client key passed to the SDK endpoint
    pub api_key_id: String,
    /// Deadline for the whole load, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides the SDK endpoint used by HTTP loaders
    #[serde(default)]
    pub sdk_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(api_key_id: impl Into<String>) -> Self {
        Self {
            api_key_id: api_key_id.into(),
            timeout_ms: DEFAULT_SDK_TIMEOUT_MS,
            sdk_url: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_sdk_url(mut self, url: impl Into<String>) -> Self {
        self.sdk_url = Some(url.into());
        self
    }

    /// Parses a JSON object such as `{"apiKeyId": "abc", "timeoutMs": 5000}`
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| MapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key_id.trim().is_empty() {
            return Err(MapError::Config("apiKeyId must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(MapError::Config("timeoutMs must be positive".into()));
        }
        Ok(())
    }
}

/// Base map imagery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    #[default]
    Normal,
    Satellite,
    Hybrid,
    Terrain,
}

impl std::fmt::Display for MapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapType::Normal => write!(f, "normal"),
            MapType::Satellite => write!(f, "satellite"),
            MapType::Hybrid => write!(f, "hybrid"),
            MapType::Terrain => write!(f, "terrain"),
        }
    }
}

/// Control and interaction flags of a map instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapControls {
    pub zoom_control: bool,
    pub map_type_control: bool,
    pub scale_control: bool,
    pub fullscreen_control: bool,
    pub dragging: bool,
    pub scroll_wheel_zoom: bool,
}

impl Default for MapControls {
    fn default() -> Self {
        Self {
            zoom_control: true,
            map_type_control: false,
            scale_control: true,
            fullscreen_control: false,
            dragging: true,
            scroll_wheel_zoom: true,
        }
    }
}

/// Initial declarative configuration of a map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapOptions {
    pub center: LatLng,
    pub zoom: f64,
    pub map_type: MapType,
    pub min_zoom: Option<f64>,
    pub max_zoom: Option<f64>,
    pub controls: MapControls,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            center: LatLng::default(),
            zoom: DEFAULT_ZOOM,
            map_type: MapType::Normal,
            min_zoom: None,
            max_zoom: None,
            controls: MapControls::default(),
        }
    }
}

impl MapOptions {
    pub fn new(center: LatLng, zoom: f64) -> Self {
        Self {
            center,
            zoom,
            ..Self::default()
        }
    }

    pub fn with_map_type(mut self, map_type: MapType) -> Self {
        self.map_type = map_type;
        self
    }

    pub fn with_controls(mut self, controls: MapControls) -> Self {
        self.controls = controls;
        self
    }

    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = Some(min_zoom);
        self.max_zoom = Some(max_zoom);
        self
    }

    pub fn effective_min_zoom(&self) -> f64 {
        self.min_zoom.unwrap_or(MIN_ZOOM)
    }

    pub fn effective_max_zoom(&self) -> f64 {
        self.max_zoom.unwrap_or(MAX_ZOOM)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.center.is_valid() {
            return Err(MapError::Config(format!(
                "center ({}, {}) is out of range",
                self.center.lat, self.center.lng
            )));
        }
        let (min, max) = (self.effective_min_zoom(), self.effective_max_zoom());
        if min > max {
            return Err(MapError::Config(format!(
                "min zoom {} exceeds max zoom {}",
                min, max
            )));
        }
        if self.zoom < min || self.zoom > max {
            return Err(MapError::Config(format!(
                "zoom {} outside [{}, {}]",
                self.zoom, min, max
            )));
        }
        Ok(())
    }
}
