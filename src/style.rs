use crate::core::constants::{
    DEFAULT_FILL_COLOR, DEFAULT_FILL_OPACITY, DEFAULT_STROKE_COLOR, DEFAULT_STROKE_OPACITY,
    DEFAULT_STROKE_WEIGHT,
};
use serde::{Deserialize, Serialize};

/// Visual style of an overlay or a data-layer feature
///
/// Every field is optional so the same type doubles as a patch: merging only
/// overwrites the fields the patch sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke_opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clickable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i32>,
}

impl Style {
    /// Default base style of data layers
    pub fn base() -> Self {
        Self {
            stroke_color: Some(DEFAULT_STROKE_COLOR.to_string()),
            stroke_weight: Some(DEFAULT_STROKE_WEIGHT),
            stroke_opacity: Some(DEFAULT_STROKE_OPACITY),
            fill_color: Some(DEFAULT_FILL_COLOR.to_string()),
            fill_opacity: Some(DEFAULT_FILL_OPACITY),
            icon: None,
            clickable: Some(true),
            z_index: None,
        }
    }

    pub fn stroke(mut self, color: impl Into<String>, weight: f64) -> Self {
        self.stroke_color = Some(color.into());
        self.stroke_weight = Some(weight);
        self
    }

    pub fn fill(mut self, color: impl Into<String>, opacity: f64) -> Self {
        self.fill_color = Some(color.into());
        self.fill_opacity = Some(opacity);
        self
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn z_index(mut self, z_index: i32) -> Self {
        self.z_index = Some(z_index);
        self
    }

    /// Overwrites every field that `patch` sets
    pub fn merge(&mut self, patch: &Style) {
        fn take<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.stroke_color, &patch.stroke_color);
        take(&mut self.stroke_weight, &patch.stroke_weight);
        take(&mut self.stroke_opacity, &patch.stroke_opacity);
        take(&mut self.fill_color, &patch.fill_color);
        take(&mut self.fill_opacity, &patch.fill_opacity);
        take(&mut self.icon, &patch.icon);
        take(&mut self.clickable, &patch.clickable);
        take(&mut self.z_index, &patch.z_index);
    }

    /// Non-mutating form of [`Style::merge`]
    pub fn merged(&self, patch: &Style) -> Style {
        let mut style = self.clone();
        style.merge(patch);
        style
    }

    pub fn is_empty(&self) -> bool {
        *self == Style::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_only_overwrites_set_fields() {
        let base = Style::base();
        let patch = Style::default().fill("#ff0000", 0.5);
        let merged = base.merged(&patch);

        assert_eq!(merged.fill_color.as_deref(), Some("#ff0000"));
        assert_eq!(merged.fill_opacity, Some(0.5));
        assert_eq!(merged.stroke_color, base.stroke_color);
        assert_eq!(merged.stroke_weight, base.stroke_weight);
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let base = Style::base();
        assert_eq!(base.merged(&Style::default()), base);
        assert!(Style::default().is_empty());
        assert!(!base.is_empty());
    }

    #[test]
    fn test_serialized_keys_are_camel_case() {
        let style = Style::default().stroke("#000", 2.0);
        let json = serde_json::to_value(&style).unwrap();
        assert_eq!(json["strokeColor"], "#000");
        assert_eq!(json["strokeWeight"], 2.0);
        assert!(json.get("fillColor").is_none());
    }
}
