use crate::core::geo::{LatLng, LatLngBounds};
use crate::events::{Handler, HandlerSet};
use crate::overlays::controller::OverlayEvent;
use crate::sdk::native::OverlayInit;
use crate::style::Style;

/// Kind of native object backing an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Marker,
    InfoWindow,
    Polyline,
    Polygon,
    Circle,
    Rectangle,
    HeatLayer,
    DataLayer,
}

impl std::fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverlayKind::Marker => write!(f, "marker"),
            OverlayKind::InfoWindow => write!(f, "info-window"),
            OverlayKind::Polyline => write!(f, "polyline"),
            OverlayKind::Polygon => write!(f, "polygon"),
            OverlayKind::Circle => write!(f, "circle"),
            OverlayKind::Rectangle => write!(f, "rectangle"),
            OverlayKind::HeatLayer => write!(f, "heat-layer"),
            OverlayKind::DataLayer => write!(f, "data-layer"),
        }
    }
}

/// Geometry props of an overlay
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayGeometry {
    Position(LatLng),
    Path(Vec<LatLng>),
    /// Outer ring followed by holes
    Paths(Vec<Vec<LatLng>>),
    Circle { center: LatLng, radius_m: f64 },
    Bounds(LatLngBounds),
    /// Heat layer samples with their weight
    Weighted(Vec<(LatLng, f64)>),
}

impl OverlayGeometry {
    /// Whether this geometry variant can back an overlay of `kind`
    pub fn fits(&self, kind: OverlayKind) -> bool {
        matches!(
            (kind, self),
            (OverlayKind::Marker, OverlayGeometry::Position(_))
                | (OverlayKind::InfoWindow, OverlayGeometry::Position(_))
                | (OverlayKind::Polyline, OverlayGeometry::Path(_))
                | (OverlayKind::Polygon, OverlayGeometry::Path(_))
                | (OverlayKind::Polygon, OverlayGeometry::Paths(_))
                | (OverlayKind::Circle, OverlayGeometry::Circle { .. })
                | (OverlayKind::Rectangle, OverlayGeometry::Bounds(_))
                | (OverlayKind::HeatLayer, OverlayGeometry::Weighted(_))
        )
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        match self {
            OverlayGeometry::Position(p) => Some(LatLngBounds::new(*p, *p)),
            OverlayGeometry::Path(path) => LatLngBounds::from_points(path),
            OverlayGeometry::Paths(paths) => LatLngBounds::from_points(paths.iter().flatten()),
            OverlayGeometry::Circle { center, .. } => Some(LatLngBounds::new(*center, *center)),
            OverlayGeometry::Bounds(bounds) => Some(*bounds),
            OverlayGeometry::Weighted(samples) => {
                LatLngBounds::from_points(samples.iter().map(|(p, _)| p))
            }
        }
    }
}

/// Declarative description of one overlay, rebuilt on every render
#[derive(Debug, Clone)]
pub struct OverlayDescriptor {
    pub kind: OverlayKind,
    pub geometry: OverlayGeometry,
    pub style: Style,
    pub visible: bool,
    /// Child visual content (marker label, info window body)
    pub content: Option<String>,
    pub handlers: HandlerSet<OverlayEvent>,
}

impl OverlayDescriptor {
    pub fn new(kind: OverlayKind, geometry: OverlayGeometry) -> Self {
        Self {
            kind,
            geometry,
            style: Style::default(),
            visible: true,
            content: None,
            handlers: HandlerSet::new(),
        }
    }

    pub fn marker(position: LatLng) -> Self {
        Self::new(OverlayKind::Marker, OverlayGeometry::Position(position))
    }

    pub fn polyline(path: Vec<LatLng>) -> Self {
        Self::new(OverlayKind::Polyline, OverlayGeometry::Path(path))
    }

    pub fn polygon(paths: Vec<Vec<LatLng>>) -> Self {
        Self::new(OverlayKind::Polygon, OverlayGeometry::Paths(paths))
    }

    pub fn circle(center: LatLng, radius_m: f64) -> Self {
        Self::new(OverlayKind::Circle, OverlayGeometry::Circle { center, radius_m })
    }

    pub fn rectangle(bounds: LatLngBounds) -> Self {
        Self::new(OverlayKind::Rectangle, OverlayGeometry::Bounds(bounds))
    }

    pub fn heat_layer(samples: Vec<(LatLng, f64)>) -> Self {
        Self::new(OverlayKind::HeatLayer, OverlayGeometry::Weighted(samples))
    }

    pub fn info_window(position: LatLng, content: impl Into<String>) -> Self {
        Self::new(OverlayKind::InfoWindow, OverlayGeometry::Position(position)).content(content)
    }

    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, handler: Handler<OverlayEvent>) -> Self {
        self.handlers.insert(event, handler);
        self
    }

    pub fn with_geometry(mut self, geometry: OverlayGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub(crate) fn init(&self) -> OverlayInit {
        OverlayInit {
            geometry: self.geometry.clone(),
            style: self.style.clone(),
            visible: self.visible,
            content: self.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_fits_kind() {
        let marker = OverlayDescriptor::marker(LatLng::new(1.0, 2.0));
        assert!(marker.geometry.fits(marker.kind));
        assert!(!OverlayGeometry::Path(vec![]).fits(OverlayKind::Marker));
        assert!(OverlayGeometry::Path(vec![]).fits(OverlayKind::Polygon));
        assert!(!OverlayGeometry::Position(LatLng::default()).fits(OverlayKind::DataLayer));
    }

    #[test]
    fn test_geometry_bounds() {
        let heat = OverlayGeometry::Weighted(vec![
            (LatLng::new(0.0, 0.0), 1.0),
            (LatLng::new(2.0, 3.0), 0.5),
        ]);
        assert_eq!(heat.bounds(), Some(LatLngBounds::from_coords(0.0, 0.0, 2.0, 3.0)));
        assert_eq!(OverlayGeometry::Path(vec![]).bounds(), None);
    }

    #[test]
    fn test_builder() {
        let window = OverlayDescriptor::info_window(LatLng::new(1.0, 1.0), "hello")
            .visible(false)
            .style(Style::default().z_index(3));
        assert_eq!(window.kind, OverlayKind::InfoWindow);
        assert_eq!(window.content.as_deref(), Some("hello"));
        assert!(!window.visible);
        assert_eq!(window.init().style.z_index, Some(3));
    }
}
