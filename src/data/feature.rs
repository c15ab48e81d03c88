use crate::core::geo::{LatLng, LatLngBounds};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a feature, unique within its data source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// GeoJSON allows string or numeric ids; both collapse to the textual form
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeatureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// GeoJSON position: `[lng, lat]` plus optional trailing values such as
/// altitude, which are kept as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Position(Vec<f64>);

impl Position {
    pub fn new(lng: f64, lat: f64) -> Self {
        Self(vec![lng, lat])
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.0.truncate(2);
        self.0.push(altitude);
        self
    }

    pub fn lng(&self) -> f64 {
        self.0[0]
    }

    pub fn lat(&self) -> f64 {
        self.0[1]
    }

    pub fn altitude(&self) -> Option<f64> {
        self.0.get(2).copied()
    }

    pub fn to_lat_lng(&self) -> LatLng {
        LatLng::new(self.lat(), self.lng())
    }
}

impl TryFrom<Vec<f64>> for Position {
    type Error = String;

    fn try_from(values: Vec<f64>) -> std::result::Result<Self, Self::Error> {
        if values.len() < 2 {
            return Err(format!(
                "a position needs at least 2 elements, got {}",
                values.len()
            ));
        }
        Ok(Self(values))
    }
}

impl From<Position> for Vec<f64> {
    fn from(position: Position) -> Self {
        position.0
    }
}

impl From<LatLng> for Position {
    fn from(lat_lng: LatLng) -> Self {
        Self::new(lat_lng.lng, lat_lng.lat)
    }
}

impl From<[f64; 2]> for Position {
    fn from([lng, lat]: [f64; 2]) -> Self {
        Self::new(lng, lat)
    }
}

/// GeoJSON geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: Position,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

impl Geometry {
    pub fn point(position: LatLng) -> Self {
        Geometry::Point {
            coordinates: position.into(),
        }
    }

    pub fn line_string(path: &[LatLng]) -> Self {
        Geometry::LineString {
            coordinates: path.iter().copied().map(Position::from).collect(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Every vertex of the geometry (polygon holes included)
    pub fn to_lat_lng_points(&self) -> Vec<LatLng> {
        let convert = Position::to_lat_lng;
        match self {
            Geometry::Point { coordinates } => vec![convert(coordinates)],
            Geometry::LineString { coordinates } | Geometry::MultiPoint { coordinates } => {
                coordinates.iter().map(convert).collect()
            }
            Geometry::Polygon { coordinates } | Geometry::MultiLineString { coordinates } => {
                coordinates.iter().flatten().map(convert).collect()
            }
            Geometry::MultiPolygon { coordinates } => {
                coordinates.iter().flatten().flatten().map(convert).collect()
            }
            Geometry::GeometryCollection { geometries } => geometries
                .iter()
                .flat_map(Geometry::to_lat_lng_points)
                .collect(),
        }
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        LatLngBounds::from_points(&self.to_lat_lng_points())
    }
}

/// One addressable geometry + properties record of a data layer
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>, geometry: Option<Geometry>) -> Self {
        Self {
            id: id.into(),
            geometry,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn bounds(&self) -> Option<LatLngBounds> {
        self.geometry.as_ref().and_then(Geometry::bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_id_from_json() {
        assert_eq!(
            FeatureId::from_json(&serde_json::json!("a")),
            Some(FeatureId::from("a"))
        );
        assert_eq!(
            FeatureId::from_json(&serde_json::json!(42)),
            Some(FeatureId::from("42"))
        );
        assert_eq!(FeatureId::from_json(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_point_geometry() {
        let geometry = Geometry::point(LatLng::new(40.7128, -74.0060));
        let points = geometry.to_lat_lng_points();
        assert_eq!(points, vec![LatLng::new(40.7128, -74.0060)]);
        assert_eq!(geometry.type_name(), "Point");
    }

    #[test]
    fn test_geometry_serializes_as_geojson() {
        let geometry = Geometry::line_string(&[LatLng::new(1.0, 2.0), LatLng::new(3.0, 4.0)]);
        let json = serde_json::to_value(&geometry).unwrap();
        assert_eq!(json["type"], "LineString");
        assert_eq!(json["coordinates"][1][0], 4.0);
    }

    #[test]
    fn test_polygon_bounds() {
        let geometry = Geometry::Polygon {
            coordinates: vec![[[0.0, 0.0], [4.0, 0.0], [4.0, 2.0], [0.0, 0.0]]
                .into_iter()
                .map(Position::from)
                .collect()],
        };
        let bounds = geometry.bounds().unwrap();
        assert_eq!(bounds.north_east, LatLng::new(2.0, 4.0));
        assert_eq!(bounds.south_west, LatLng::new(0.0, 0.0));
    }

    #[test]
    fn test_position_keeps_altitude() {
        let position: Position = serde_json::from_str("[126.978, 37.5665, 38.5]").unwrap();
        assert_eq!(position.to_lat_lng(), LatLng::new(37.5665, 126.978));
        assert_eq!(position.altitude(), Some(38.5));
        assert_eq!(serde_json::to_string(&position).unwrap(), "[126.978,37.5665,38.5]");

        assert!(serde_json::from_str::<Position>("[126.978]").is_err());
        assert_eq!(Position::from(LatLng::new(1.0, 2.0)), Position::new(2.0, 1.0));
    }

    #[test]
    fn test_feature_properties() {
        let feature = Feature::new("trk-1", None).with_property("name", "Morning run");
        assert_eq!(feature.property("name"), Some(&serde_json::json!("Morning run")));
        assert!(feature.bounds().is_none());
    }
}
