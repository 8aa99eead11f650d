use geo::{BoundingRect, Contains, Coord, MapCoordsInPlace, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DistrictNameError {
    #[error("district name is empty")]
    Empty,
}

/// District identifier used as the join key between geometry and tabular rows.
///
/// Surrounding whitespace is dropped when parsing; comparison and hashing use
/// the lowercased form, while `as_str` keeps the source spelling for display.
#[derive(Debug, Clone)]
pub struct DistrictName {
    display: String,
    key: String,
}

impl DistrictName {
    pub fn parse(raw: &str) -> Result<Self, DistrictNameError> {
        let display = raw.trim();
        if display.is_empty() {
            return Err(DistrictNameError::Empty);
        }
        Ok(Self {
            display: display.to_string(),
            key: display.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl FromStr for DistrictName {
    type Err = DistrictNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for DistrictName {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DistrictName {}

impl Hash for DistrictName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for DistrictName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Serialize for DistrictName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

/// Boundary geometry of a district. The source shape (single or multi part) is kept as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum DistrictGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl DistrictGeometry {
    pub fn map_coords_in_place(&mut self, func: impl Fn(Coord<f64>) -> Coord<f64> + Copy) {
        match self {
            DistrictGeometry::Polygon(p) => p.map_coords_in_place(func),
            DistrictGeometry::MultiPolygon(mp) => mp.map_coords_in_place(func),
        }
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            DistrictGeometry::Polygon(p) => p.bounding_rect(),
            DistrictGeometry::MultiPolygon(mp) => mp.bounding_rect(),
        }
    }

    pub fn contains_point(&self, point: &Point<f64>) -> bool {
        match self {
            DistrictGeometry::Polygon(p) => p.contains(point),
            DistrictGeometry::MultiPolygon(mp) => mp.contains(point),
        }
    }

    pub fn to_geojson(&self) -> geojson::Geometry {
        let value = match self {
            DistrictGeometry::Polygon(p) => geojson::Value::from(p),
            DistrictGeometry::MultiPolygon(mp) => geojson::Value::from(mp),
        };
        geojson::Geometry::new(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistrictFeature {
    pub name: DistrictName,
    pub geometry: DistrictGeometry,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<DistrictFeature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<DistrictFeature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Derives a subset holding only the named features, in source order.
    pub fn filter(&self, names: &[DistrictName]) -> FeatureCollection {
        FeatureCollection {
            features: self
                .features
                .iter()
                .filter(|f| names.contains(&f.name))
                .cloned()
                .collect(),
        }
    }

    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .features
            .iter()
            .map(|f| f.name.as_str().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn to_geojson(&self, property: &str) -> geojson::FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| {
                let mut properties = serde_json::Map::new();
                properties.insert(
                    property.to_string(),
                    serde_json::Value::String(f.name.as_str().to_string()),
                );
                geojson::Feature {
                    bbox: None,
                    geometry: Some(f.geometry.to_geojson()),
                    id: None,
                    properties: Some(properties),
                    foreign_members: None,
                }
            })
            .collect();

        geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown metric field: {0}")]
pub struct FieldParseError(pub String);

/// Metric column shown in hover text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetricField {
    #[default]
    #[serde(rename = "none")]
    None,
    Temperature,
    Population,
    Births,
    Deaths,
}

impl MetricField {
    pub const ALL: [MetricField; 5] = [
        MetricField::None,
        MetricField::Temperature,
        MetricField::Population,
        MetricField::Births,
        MetricField::Deaths,
    ];

    /// CSV column backing this field, `None` for the sentinel.
    pub fn column(self) -> Option<&'static str> {
        match self {
            MetricField::None => None,
            MetricField::Temperature => Some("Temperature"),
            MetricField::Population => Some("Population"),
            MetricField::Births => Some("Births"),
            MetricField::Deaths => Some("Deaths"),
        }
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column().unwrap_or("none"))
    }
}

impl FromStr for MetricField {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        MetricField::ALL
            .into_iter()
            .find(|field| field.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| FieldParseError(s.to_string()))
    }
}

/// One spreadsheet line: the district plus every column as raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRow {
    pub district: DistrictName,
    pub fields: HashMap<String, String>,
}

impl TabularRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(String::as_str)
    }

    /// Value shown for a metric; absent cells render as `undefined`.
    pub fn metric(&self, field: MetricField) -> &str {
        field
            .column()
            .and_then(|c| self.get(c))
            .unwrap_or("undefined")
    }
}
