//! State of one data layer, independent of any native object
//!
//! Every mutation reports what changed so the controller can mirror it onto the
//! native layer and fan the matching events out.

use crate::core::geo::LatLngBounds;
use crate::data::feature::{Feature, FeatureId};
use crate::data::formats::FeatureCollection;
use crate::prelude::{HashMap, HashSet};
use crate::style::Style;
use crate::{MapError, Result};
use serde_json::Value;

/// Load state of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataStatus {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

impl std::fmt::Display for DataStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataStatus::Idle => write!(f, "idle"),
            DataStatus::Loading => write!(f, "loading"),
            DataStatus::Ready => write!(f, "ready"),
            DataStatus::Error => write!(f, "error"),
        }
    }
}

/// Features keyed by id, iterated in insertion order
#[derive(Debug, Clone, Default)]
pub struct FeatureStore {
    order: Vec<FeatureId>,
    features: HashMap<FeatureId, Feature>,
}

impl FeatureStore {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.features.contains_key(id)
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    fn get_mut(&mut self, id: &FeatureId) -> Option<&mut Feature> {
        self.features.get_mut(id)
    }

    pub fn insert(&mut self, feature: Feature) -> Result<()> {
        if self.features.contains_key(&feature.id) {
            return Err(MapError::DuplicateFeature(feature.id.to_string()));
        }
        self.order.push(feature.id.clone());
        self.features.insert(feature.id.clone(), feature);
        Ok(())
    }

    pub fn remove(&mut self, id: &FeatureId) -> Option<Feature> {
        let feature = self.features.remove(id)?;
        self.order.retain(|other| other != id);
        Some(feature)
    }

    /// Empties the store, returning the features in insertion order
    pub fn drain(&mut self) -> Vec<Feature> {
        let mut features = std::mem::take(&mut self.features);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|id| features.remove(&id))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.order.iter().filter_map(|id| self.features.get(id))
    }

    pub fn ids(&self) -> impl Iterator<Item = &FeatureId> {
        self.order.iter()
    }
}

/// What a successful load changed
#[derive(Debug, Clone, Default)]
pub struct LoadDiff {
    /// Previous features whose id is absent from the new set
    pub removed: Vec<Feature>,
    /// Every feature of the new set, in document order
    pub added: Vec<Feature>,
}

/// Old and new value of a changed property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Url, load status, features and styling of one data layer
#[derive(Debug, Clone)]
pub struct DataSource {
    url: Option<String>,
    status: DataStatus,
    base_style: Style,
    /// Resolved style per overridden feature; one slot each
    overrides: HashMap<FeatureId, Style>,
    features: FeatureStore,
    last_error: Option<MapError>,
    generation: u64,
}

impl DataSource {
    pub fn new(base_style: Style) -> Self {
        Self {
            url: None,
            status: DataStatus::Idle,
            base_style,
            overrides: HashMap::default(),
            features: FeatureStore::default(),
            last_error: None,
            generation: 0,
        }
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn status(&self) -> DataStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_error(&self) -> Option<&MapError> {
        self.last_error.as_ref()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Starts a new load attempt for `url`; returns its generation
    pub fn begin_load(&mut self, url: impl Into<String>) -> u64 {
        self.generation += 1;
        self.url = Some(url.into());
        self.status = DataStatus::Loading;
        self.generation
    }

    /// Makes every outstanding generation stale
    pub fn invalidate(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Abandons the load in flight, if any, without touching the features
    pub fn cancel_load(&mut self) -> bool {
        if self.status != DataStatus::Loading {
            return false;
        }
        self.invalidate();
        self.status = DataStatus::Idle;
        true
    }

    /// Drops the url and every feature; returns the removed features
    pub fn reset(&mut self) -> Vec<Feature> {
        self.invalidate();
        self.url = None;
        self.status = DataStatus::Idle;
        self.last_error = None;
        self.overrides.clear();
        self.features.drain()
    }

    /// Applies the features loaded for `generation`; `None` when stale
    pub fn apply_loaded(&mut self, generation: u64, features: Vec<Feature>) -> Option<LoadDiff> {
        if !self.is_current(generation) {
            return None;
        }

        let incoming: HashSet<&FeatureId> = features.iter().map(|f| &f.id).collect();
        let removed: Vec<Feature> = self
            .features
            .drain()
            .into_iter()
            .filter(|old| !incoming.contains(&old.id))
            .collect();
        for feature in &removed {
            self.overrides.remove(&feature.id);
        }

        let mut store = FeatureStore::default();
        for feature in &features {
            // Ids are unique per document; a repeat keeps the first occurrence
            if store.insert(feature.clone()).is_err() {
                log::warn!("duplicate feature id {} in loaded set", feature.id);
            }
        }
        self.features = store;
        self.status = DataStatus::Ready;
        self.last_error = None;

        Some(LoadDiff {
            removed,
            added: features,
        })
    }

    /// Records a failed load for `generation`; returns the cleared features,
    /// `None` when stale
    pub fn apply_failed(&mut self, generation: u64, error: MapError) -> Option<Vec<Feature>> {
        if !self.is_current(generation) {
            return None;
        }
        self.status = DataStatus::Error;
        self.last_error = Some(error);
        self.overrides.clear();
        Some(self.features.drain())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn get(&self, id: &FeatureId) -> Option<&Feature> {
        self.features.get(id)
    }

    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Ordered snapshot of every feature
    pub fn all(&self) -> Vec<Feature> {
        self.features.iter().cloned().collect()
    }

    pub fn add_feature(&mut self, feature: Feature) -> Result<()> {
        self.features.insert(feature)
    }

    pub fn remove_feature(&mut self, id: &FeatureId) -> Result<Feature> {
        let feature = self
            .features
            .remove(id)
            .ok_or_else(|| MapError::FeatureNotFound(id.to_string()))?;
        self.overrides.remove(id);
        Ok(feature)
    }

    /// Sets one property; returns the updated feature and the change
    pub fn set_property(
        &mut self,
        id: &FeatureId,
        name: &str,
        value: Value,
    ) -> Result<(Feature, PropertyChange)> {
        let feature = self
            .features
            .get_mut(id)
            .ok_or_else(|| MapError::FeatureNotFound(id.to_string()))?;
        let old_value = feature.properties.insert(name.to_string(), value.clone());
        Ok((
            feature.clone(),
            PropertyChange {
                name: name.to_string(),
                old_value,
                new_value: value,
            },
        ))
    }

    pub fn base_style(&self) -> &Style {
        &self.base_style
    }

    /// Replaces the base style outright; returns the features without an
    /// override, which now render with it
    pub fn replace_base_style(&mut self, style: Style) -> Vec<FeatureId> {
        self.base_style = style;
        self.features
            .ids()
            .filter(|id| !self.overrides.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Fills the feature's override slot with the base style merged with
    /// `patch`, replacing any previous override; returns the resolved style
    pub fn override_style(&mut self, id: &FeatureId, patch: &Style) -> Result<Style> {
        if !self.features.contains(id) {
            return Err(MapError::FeatureNotFound(id.to_string()));
        }
        let resolved = self.base_style.merged(patch);
        self.overrides.insert(id.clone(), resolved.clone());
        Ok(resolved)
    }

    /// Clears the feature's override slot; `true` if there was one
    pub fn revert_style(&mut self, id: &FeatureId) -> bool {
        self.overrides.remove(id).is_some()
    }

    pub fn has_override(&self, id: &FeatureId) -> bool {
        self.overrides.contains_key(id)
    }

    /// Style the feature renders with, `None` for unknown ids
    pub fn effective_style(&self, id: &FeatureId) -> Option<Style> {
        if !self.features.contains(id) {
            return None;
        }
        Some(
            self.overrides
                .get(id)
                .cloned()
                .unwrap_or_else(|| self.base_style.clone()),
        )
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        FeatureCollection::from_features(self.features.iter())
    }

    /// Bounds of every feature that has a geometry
    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.features
            .iter()
            .filter_map(Feature::bounds)
            .reduce(|acc, bounds| acc.union(&bounds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::LatLng;
    use crate::data::feature::Geometry;

    fn point(id: &str, lat: f64, lng: f64) -> Feature {
        Feature::new(id, Some(Geometry::point(LatLng::new(lat, lng))))
    }

    fn ids(source: &DataSource) -> Vec<String> {
        source.features().map(|f| f.id.to_string()).collect()
    }

    #[test]
    fn test_store_keeps_insertion_order() {
        let mut store = FeatureStore::default();
        for id in ["c", "a", "b"] {
            store.insert(point(id, 0.0, 0.0)).unwrap();
        }
        assert!(matches!(
            store.insert(point("a", 1.0, 1.0)),
            Err(MapError::DuplicateFeature(_))
        ));
        store.remove(&FeatureId::from("a"));
        let ids: Vec<_> = store.ids().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(store.drain().len(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stale_generation_is_ignored() {
        let mut source = DataSource::new(Style::base());
        let first = source.begin_load("/a.gpx");
        let second = source.begin_load("/b.gpx");

        assert!(source.apply_loaded(first, vec![point("a", 0.0, 0.0)]).is_none());
        assert!(source
            .apply_failed(first, MapError::Network("late".into()))
            .is_none());
        assert_eq!(source.status(), DataStatus::Loading);
        assert!(source.is_empty());

        let diff = source.apply_loaded(second, vec![point("b", 0.0, 0.0)]).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(source.status(), DataStatus::Ready);
        assert_eq!(source.url(), Some("/b.gpx"));
    }

    #[test]
    fn test_cancel_load_keeps_features() {
        let mut source = DataSource::new(Style::base());
        let first = source.begin_load("/a.gpx");
        source.apply_loaded(first, vec![point("a", 0.0, 0.0)]);
        assert!(!source.cancel_load());

        let second = source.begin_load("/b.gpx");
        assert!(source.cancel_load());
        assert_eq!(source.status(), DataStatus::Idle);
        assert!(source.apply_loaded(second, vec![]).is_none());
        assert_eq!(ids(&source), vec!["a"]);
    }

    #[test]
    fn test_reload_reports_removed_ids() {
        let mut source = DataSource::new(Style::base());
        let generation = source.begin_load("/a");
        source.apply_loaded(generation, vec![point("1", 0.0, 0.0), point("2", 0.0, 0.0)]);

        let generation = source.begin_load("/b");
        let diff = source
            .apply_loaded(generation, vec![point("2", 1.0, 1.0), point("3", 0.0, 0.0)])
            .unwrap();
        let removed: Vec<_> = diff.removed.iter().map(|f| f.id.to_string()).collect();
        assert_eq!(removed, vec!["1"]);
        assert_eq!(ids(&source), vec!["2", "3"]);
        assert_eq!(source.to_geojson().len(), source.len());
    }

    #[test]
    fn test_failure_clears_features() {
        let mut source = DataSource::new(Style::base());
        let generation = source.begin_load("/a");
        source.apply_loaded(generation, vec![point("1", 0.0, 0.0)]);

        let generation = source.begin_load("/broken");
        let cleared = source
            .apply_failed(generation, MapError::Parse("bad".into()))
            .unwrap();
        assert_eq!(cleared.len(), 1);
        assert_eq!(source.status(), DataStatus::Error);
        assert_eq!(source.last_error().map(MapError::kind), Some(crate::ErrorKind::Parse));
        assert!(source.is_empty());
    }

    #[test]
    fn test_override_slot_is_single_and_revertible() {
        let mut source = DataSource::new(Style::base());
        source.add_feature(point("a", 0.0, 0.0)).unwrap();
        source.add_feature(point("b", 0.0, 0.0)).unwrap();
        let id = FeatureId::from("a");
        let before = source.effective_style(&id).unwrap();

        source
            .override_style(&id, &Style::default().fill("#ff0000", 1.0))
            .unwrap();
        source
            .override_style(&id, &Style::default().stroke("#00ff00", 5.0))
            .unwrap();
        let overridden = source.effective_style(&id).unwrap();
        // Last write wins; the first patch is gone
        assert_eq!(overridden.fill_color, before.fill_color);
        assert_eq!(overridden.stroke_color.as_deref(), Some("#00ff00"));

        let restyled = source.replace_base_style(Style::base().z_index(4));
        assert_eq!(restyled, vec![FeatureId::from("b")]);
        assert_eq!(source.base_style().z_index, Some(4));
        assert_eq!(source.effective_style(&id).unwrap().z_index, None);

        assert!(source.revert_style(&id));
        assert!(!source.revert_style(&id));
        assert_eq!(source.effective_style(&id), Some(source.base_style().clone()));
        assert!(source
            .override_style(&FeatureId::from("zz"), &Style::default())
            .is_err());
    }

    #[test]
    fn test_set_property_and_bounds() {
        let mut source = DataSource::new(Style::base());
        source.add_feature(point("a", 1.0, 2.0)).unwrap();
        source.add_feature(point("b", 3.0, 4.0)).unwrap();
        source.add_feature(Feature::new("empty", None)).unwrap();

        let (feature, change) = source
            .set_property(&FeatureId::from("a"), "name", Value::from("A"))
            .unwrap();
        assert_eq!(feature.property("name"), Some(&Value::from("A")));
        assert_eq!(change.old_value, None);

        assert_eq!(
            source.bounds(),
            Some(LatLngBounds::from_coords(1.0, 2.0, 3.0, 4.0))
        );
        assert!(source.remove_feature(&FeatureId::from("missing")).is_err());
    }
}
