//! Parsing of remote documents into features and serialization back to GeoJSON
//!
//! Two source formats are understood: GeoJSON (a `FeatureCollection` or a single
//! `Feature`) and GPX (waypoints, routes and tracks). The format is detected from
//! the document content, not from the url.

use crate::core::{constants::GENERATED_FEATURE_ID_PREFIX, geo::LatLng};
use crate::data::feature::{Feature, FeatureId, Geometry, Position};
use crate::prelude::HashSet;
use crate::{MapError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Supported source document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    GeoJson,
    Gpx,
}

fn feature_kind() -> String {
    "Feature".to_string()
}

/// GeoJSON feature as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoJsonFeature {
    // Defaulted: the document-level tag consumes `type` for single features
    #[serde(rename = "type", default = "feature_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
}

/// Serialized interop document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<GeoJsonFeature>,
}

impl FeatureCollection {
    pub fn from_features<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features: features.into_iter().map(GeoJsonFeature::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl From<&Feature> for GeoJsonFeature {
    fn from(feature: &Feature) -> Self {
        Self {
            kind: "Feature".to_string(),
            id: Some(Value::String(feature.id.to_string())),
            geometry: feature.geometry.clone(),
            properties: Some(feature.properties.clone()),
        }
    }
}

/// Detects the format of a raw document
pub fn detect_format(data: &str) -> Option<DocumentFormat> {
    let trimmed = data.trim_start();
    if trimmed.starts_with('{') {
        return Some(DocumentFormat::GeoJson);
    }
    if trimmed.starts_with('<') && trimmed.contains("<gpx") {
        return Some(DocumentFormat::Gpx);
    }
    None
}

/// Parses a raw document into a normalized, id-unique feature list
pub fn parse_document(data: &str) -> Result<Vec<Feature>> {
    let features = match detect_format(data) {
        Some(DocumentFormat::GeoJson) => parse_geojson(data)?,
        Some(DocumentFormat::Gpx) => parse_gpx(data)?,
        None => {
            return Err(MapError::Parse(
                "document is neither GeoJSON nor GPX".to_string(),
            ))
        }
    };
    ensure_unique_ids(&features)?;
    Ok(features)
}

fn ensure_unique_ids(features: &[Feature]) -> Result<()> {
    let mut seen = HashSet::default();
    for feature in features {
        if !seen.insert(&feature.id) {
            return Err(MapError::Parse(format!(
                "duplicate feature id '{}' in document",
                feature.id
            )));
        }
    }
    Ok(())
}

fn generated_id(index: usize) -> FeatureId {
    FeatureId::new(format!("{}{}", GENERATED_FEATURE_ID_PREFIX, index))
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeoJsonDocument {
    FeatureCollection { features: Vec<GeoJsonFeature> },
    Feature(GeoJsonFeature),
}

/// Parses GeoJSON into features
pub fn parse_geojson(data: &str) -> Result<Vec<Feature>> {
    let document: GeoJsonDocument = serde_json::from_str(data)
        .map_err(|e| MapError::Parse(format!("Invalid GeoJSON: {}", e)))?;

    let raw = match document {
        GeoJsonDocument::FeatureCollection { features } => features,
        GeoJsonDocument::Feature(feature) => vec![feature],
    };

    raw.into_iter()
        .enumerate()
        .map(|(index, feature)| convert_geojson_feature(index, feature))
        .collect()
}

fn convert_geojson_feature(index: usize, feature: GeoJsonFeature) -> Result<Feature> {
    let id = match &feature.id {
        Some(value) => FeatureId::from_json(value)
            .ok_or_else(|| MapError::Parse(format!("feature {} has a non-scalar id", index)))?,
        None => generated_id(index),
    };
    Ok(Feature {
        id,
        geometry: feature.geometry,
        properties: feature.properties.unwrap_or_default(),
    })
}

// One open GPX record (wpt / rte / trk) while the reader walks the document
#[derive(Default)]
struct GpxRecord {
    kind: &'static str,
    position: Option<LatLng>,
    segments: Vec<Vec<Position>>,
    properties: Map<String, Value>,
}

impl GpxRecord {
    fn new(kind: &'static str) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    fn into_feature(self, index: usize) -> Feature {
        let geometry = match self.kind {
            "wpt" => self.position.map(Geometry::point),
            _ => {
                let mut segments: Vec<_> =
                    self.segments.into_iter().filter(|s| !s.is_empty()).collect();
                match segments.len() {
                    0 => None,
                    1 => segments.pop().map(|coordinates| Geometry::LineString { coordinates }),
                    _ => Some(Geometry::MultiLineString {
                        coordinates: segments,
                    }),
                }
            }
        };
        let mut properties = self.properties;
        properties.insert("gpxType".to_string(), Value::String(self.kind.to_string()));
        Feature {
            id: generated_id(index),
            geometry,
            properties,
        }
    }
}

fn gpx_point(element: &BytesStart<'_>) -> Result<LatLng> {
    let coordinate = |name: &str| -> Result<f64> {
        let attribute = element
            .try_get_attribute(name)
            .map_err(|e| MapError::Parse(e.to_string()))?
            .ok_or_else(|| MapError::Parse(format!("GPX point without '{}' attribute", name)))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| MapError::Parse(e.to_string()))?;
        value
            .trim()
            .parse::<f64>()
            .map_err(|_| MapError::Parse(format!("GPX '{}' is not a number: {}", name, value)))
    };
    let lat = coordinate("lat")?;
    let lon = coordinate("lon")?;
    let point = LatLng::new(lat, lon);
    if !point.is_valid() {
        return Err(MapError::Parse(format!(
            "GPX point ({}, {}) is out of range",
            lat, lon
        )));
    }
    Ok(point)
}

/// Parses GPX waypoints, routes and tracks into features
pub fn parse_gpx(data: &str) -> Result<Vec<Feature>> {
    let mut reader = Reader::from_str(data);
    reader.config_mut().trim_text(true);

    let mut features = Vec::new();
    let mut saw_root = false;
    let mut record: Option<GpxRecord> = None;
    // Name of the innermost text-bearing element we are inside of
    let mut text_tag: Option<String> = None;
    let mut in_point = false;

    loop {
        let event = reader.read_event().map_err(|e| {
            MapError::Parse(format!(
                "Invalid GPX at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;
        match event {
            Event::Start(ref element) | Event::Empty(ref element) => {
                let is_empty = matches!(event, Event::Empty(_));
                let local = element.local_name();
                match local.as_ref() {
                    b"gpx" => saw_root = true,
                    b"wpt" => {
                        let mut wpt = GpxRecord::new("wpt");
                        wpt.position = Some(gpx_point(element)?);
                        if is_empty {
                            features.push(wpt.into_feature(features.len()));
                        } else {
                            record = Some(wpt);
                        }
                    }
                    b"rte" => {
                        let mut rte = GpxRecord::new("rte");
                        rte.segments.push(Vec::new());
                        record = Some(rte);
                    }
                    b"trk" => record = Some(GpxRecord::new("trk")),
                    b"trkseg" => {
                        if let Some(trk) = record.as_mut() {
                            trk.segments.push(Vec::new());
                        }
                    }
                    b"rtept" | b"trkpt" => {
                        let point = gpx_point(element)?;
                        if let Some(segment) =
                            record.as_mut().and_then(|r| r.segments.last_mut())
                        {
                            segment.push(Position::from(point));
                        }
                        in_point = !is_empty;
                    }
                    b"name" | b"desc" | b"ele" | b"time" | b"type" if !is_empty => {
                        text_tag = Some(String::from_utf8_lossy(local.as_ref()).into_owned());
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if let (Some(tag), Some(open)) = (text_tag.as_ref(), record.as_mut()) {
                    let value = text
                        .unescape()
                        .map_err(|e| MapError::Parse(e.to_string()))?;
                    if !in_point {
                        open.properties
                            .entry(tag.clone())
                            .or_insert_with(|| Value::String(value.into_owned()));
                    } else if tag == "ele" {
                        // Point elevation becomes the position's altitude
                        let altitude = value.trim().parse::<f64>().map_err(|_| {
                            MapError::Parse(format!("GPX 'ele' is not a number: {}", value))
                        })?;
                        if let Some(position) = open
                            .segments
                            .last_mut()
                            .and_then(|segment| segment.last_mut())
                        {
                            *position = position.clone().with_altitude(altitude);
                        }
                    }
                }
            }
            Event::End(ref element) => match element.local_name().as_ref() {
                b"wpt" | b"rte" | b"trk" => {
                    if let Some(done) = record.take() {
                        features.push(done.into_feature(features.len()));
                    }
                }
                b"rtept" | b"trkpt" => in_point = false,
                b"name" | b"desc" | b"ele" | b"time" | b"type" => text_tag = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(MapError::Parse("GPX document has no <gpx> root".to_string()));
    }
    if record.is_some() {
        return Err(MapError::Parse("GPX document ended inside a record".to_string()));
    }
    Ok(features)
}
