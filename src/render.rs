use crate::config::StyleConfig;
use crate::join::lookup_name;
use crate::types::{DistrictFeature, DistrictName, FeatureCollection, MetricField, TabularRow};
use geo::{Coord, Rect};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    pub fill_color: String,
    pub color: String,
    pub weight: f64,
    pub fill_opacity: f64,
}

#[derive(Debug, Clone)]
pub struct Styles {
    pub base: ShapeStyle,
    pub hover: ShapeStyle,
    pub selected: ShapeStyle,
}

impl From<&StyleConfig> for Styles {
    fn from(config: &StyleConfig) -> Self {
        let base = ShapeStyle {
            fill_color: config.base_fill.clone(),
            color: config.base_stroke.clone(),
            weight: config.base_weight,
            fill_opacity: config.base_opacity,
        };
        let hover = ShapeStyle {
            fill_color: config.hover_fill.clone(),
            fill_opacity: config.hover_opacity,
            ..base.clone()
        };
        let selected = ShapeStyle {
            fill_color: config.selected_fill.clone(),
            fill_opacity: config.selected_opacity,
            ..base.clone()
        };
        Styles { base, hover, selected }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeState {
    Base,
    Hover,
    Selected,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tooltip {
    pub text: String,
    pub sticky: bool,
}

/// Popup content listing every metric of one district.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Popup {
    pub district: String,
    pub temperature: String,
    pub population: String,
    pub births: String,
    pub deaths: String,
}

impl Popup {
    fn new(name: &DistrictName, row: Option<&TabularRow>) -> Self {
        let value = |field: MetricField| row.map_or("undefined", |r| r.metric(field)).to_string();
        Popup {
            district: name.to_string(),
            temperature: value(MetricField::Temperature),
            population: value(MetricField::Population),
            births: value(MetricField::Births),
            deaths: value(MetricField::Deaths),
        }
    }

    pub fn html(&self) -> String {
        format!(
            "<b>{}</b><hr>Temp: {}<br>Pop: {}<br>Births: {}<br>Deaths: {}",
            escape_html(&self.district),
            escape_html(&self.temperature),
            escape_html(&self.population),
            escape_html(&self.births),
            escape_html(&self.deaths),
        )
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Text shown while the pointer is over a district.
pub fn hover_text(name: &DistrictName, field: MetricField, rows: &[TabularRow]) -> String {
    match (field, lookup_name(rows, name)) {
        (MetricField::None, _) | (_, None) => name.to_string(),
        (field, Some(row)) => format!("{}, {}: {}", name, field, row.metric(field)),
    }
}

#[derive(Debug, Clone)]
pub struct Shape {
    pub feature: DistrictFeature,
    pub state: ShapeState,
    pub tooltip: Option<Tooltip>,
    pub popup: Option<Popup>,
}

/// Shapes currently mounted on the map, one per rendered feature.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    pub shapes: Vec<Shape>,
}

impl Overlay {
    pub fn names(&self) -> Vec<&str> {
        self.shapes.iter().map(|s| s.feature.name.as_str()).collect()
    }

    pub fn shape(&self, name: &DistrictName) -> Option<&Shape> {
        self.shapes.iter().find(|s| &s.feature.name == name)
    }

    /// Union of the shapes' bounding boxes in lon/lat.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.shapes
            .iter()
            .filter_map(|s| s.feature.geometry.bounding_rect())
            .reduce(|acc, r| {
                Rect::new(
                    Coord { x: acc.min().x.min(r.min().x), y: acc.min().y.min(r.min().y) },
                    Coord { x: acc.max().x.max(r.max().x), y: acc.max().y.max(r.max().y) },
                )
            })
    }
}

/// Property carrying the district name in the exported overlay, whatever the source attribute was called.
pub const OVERLAY_NAME_KEY: &str = "district";

/// Owns the mounted overlay and applies hover/highlight interactions to it.
#[derive(Debug)]
pub struct MapRenderer {
    styles: Styles,
    overlay: Overlay,
}

impl MapRenderer {
    pub fn new(styles: Styles) -> Self {
        MapRenderer {
            styles,
            overlay: Overlay::default(),
        }
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    /// Unmounts the previous overlay and mounts one base-styled shape per feature.
    pub fn render(&mut self, collection: &FeatureCollection) {
        debug!("Replacing overlay of {} shapes with {}", self.overlay.shapes.len(), collection.len());
        self.overlay = Overlay {
            shapes: collection
                .features
                .iter()
                .map(|feature| Shape {
                    feature: feature.clone(),
                    state: ShapeState::Base,
                    tooltip: None,
                    popup: None,
                })
                .collect(),
        };
    }

    pub fn pointer_enter(&mut self, name: &DistrictName, field: MetricField, rows: &[TabularRow]) -> Option<Tooltip> {
        let shape = self.overlay.shapes.iter_mut().find(|s| &s.feature.name == name)?;
        let tooltip = Tooltip {
            text: hover_text(&shape.feature.name, field, rows),
            sticky: true,
        };
        shape.tooltip = Some(tooltip.clone());
        shape.state = ShapeState::Hover;
        Some(tooltip)
    }

    pub fn pointer_leave(&mut self, name: &DistrictName) -> bool {
        match self.overlay.shapes.iter_mut().find(|s| &s.feature.name == name) {
            Some(shape) => {
                shape.state = ShapeState::Base;
                true
            }
            None => false,
        }
    }

    /// Marks the named shape selected with a popup and reverts every other shape.
    ///
    /// Returns `None` when the district is not mounted; the other shapes are
    /// still reverted in that case.
    pub fn highlight(&mut self, name: &DistrictName, rows: &[TabularRow]) -> Option<Popup> {
        let mut opened = None;
        for shape in &mut self.overlay.shapes {
            if &shape.feature.name == name {
                let popup = Popup::new(name, lookup_name(rows, name));
                shape.state = ShapeState::Selected;
                shape.popup = Some(popup.clone());
                opened = Some(popup);
            } else {
                shape.state = ShapeState::Base;
                shape.popup = None;
            }
        }
        opened
    }

    pub fn style_for(&self, state: ShapeState) -> &ShapeStyle {
        match state {
            ShapeState::Base => &self.styles.base,
            ShapeState::Hover => &self.styles.hover,
            ShapeState::Selected => &self.styles.selected,
        }
    }

    /// Mounted overlay as GeoJSON with style and popup properties for the browser.
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        let features = self
            .overlay
            .shapes
            .iter()
            .map(|shape| {
                let mut properties = serde_json::Map::new();
                properties.insert(
                    OVERLAY_NAME_KEY.to_string(),
                    serde_json::Value::String(shape.feature.name.to_string()),
                );
                properties.insert("state".to_string(), serde_json::json!(shape.state));
                properties.insert("style".to_string(), serde_json::json!(self.style_for(shape.state)));
                if let Some(popup) = &shape.popup {
                    properties.insert("popup".to_string(), serde_json::Value::String(popup.html()));
                }
                geojson::Feature {
                    bbox: None,
                    geometry: Some(shape.feature.geometry.to_geojson()),
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
