use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub projection: ProjectionConfig,
    pub map: MapConfig,
    pub style: StyleConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub geometry: PathBuf,
    pub join_column_shape: String,
    pub join_column_csv: String,
    pub sheet_csv_url: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            geometry: PathBuf::from("TS_DISTRICTS_UTM.geojson"),
            join_column_shape: "District".to_string(),
            join_column_csv: "District".to_string(),
            sheet_csv_url: "https://docs.google.com/spreadsheets/d/e/2PACX-1vSg7I76jd8Qx5hBdnMvQ4giwsbTaVfqvuYb_Igtt1L_pt1QHYt5cNMezVMr5pLGiXFbhXOr9i--oK6v/pub?output=csv".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProjectionConfig {
    pub utm_zone: u8,
    pub northern: bool,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self { utm_zone: 44, northern: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    /// Overview center as [lat, lon].
    pub center: [f64; 2],
    pub zoom: u8,
    /// Padding in pixels used when fitting the viewport to a filtered subset.
    pub fit_padding: [u32; 2],
    /// When false, changing the metric field keeps the active district filter.
    pub field_change_resets_filter: bool,
    pub tile_url: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: [17.8, 79.1],
            zoom: 7,
            fit_padding: [40, 40],
            field_change_resets_filter: true,
            tile_url: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StyleConfig {
    pub base_fill: String, // Hex code
    pub base_stroke: String,
    pub base_weight: f64,
    pub base_opacity: f64,
    pub hover_fill: String,
    pub hover_opacity: f64,
    pub selected_fill: String,
    pub selected_opacity: f64,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            base_fill: "#3498db".to_string(),
            base_stroke: "white".to_string(),
            base_weight: 1.5,
            base_opacity: 0.6,
            hover_fill: "#2ecc71".to_string(),
            hover_opacity: 0.8,
            selected_fill: "#e74c3c".to_string(),
            selected_opacity: 0.9,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub fetch_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000, fetch_timeout_secs: 30 }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }

    /// Loads the file when it exists, otherwise falls back to the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::warn!("Config file {:?} not found, using defaults", path);
            Ok(Self::default())
        }
    }
}
