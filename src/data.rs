use crate::config::InputConfig;
use crate::types::{DistrictFeature, DistrictGeometry, DistrictName, FeatureCollection, TabularRow};
use anyhow::{Context, Result, anyhow};
use csv::{ReaderBuilder, Trim};
use geo::MultiPolygon;
use geojson::GeoJson;
use shapefile::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Loads district boundaries from a GeoJSON or shapefile, still in source coordinates.
pub fn load_geometry(config: &InputConfig) -> Result<FeatureCollection> {
    let path = &config.geometry;
    let extension = path.extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let collection = match extension.as_str() {
        "shp" => load_shapefile(path, &config.join_column_shape)?,
        "json" | "geojson" => load_geojson(path, &config.join_column_shape)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    info!("Loaded geometry for {} districts from {:?}", collection.len(), path);
    Ok(collection)
}

fn load_geojson(path: &Path, name_property: &str) -> Result<FeatureCollection> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    features_from_geojson(geojson, name_property)
}

pub fn features_from_geojson(geojson: GeoJson, name_property: &str) -> Result<FeatureCollection> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut features = Vec::new();

    for (index, feature) in collection.features.into_iter().enumerate() {
        let raw_name = feature.properties.as_ref()
            .and_then(|props| props.get(name_property))
            .and_then(|v| v.as_str());

        let name = match raw_name.map(DistrictName::parse) {
            Some(Ok(name)) => name,
            _ => {
                warn!("Skipping feature {} without a usable '{}' property", index, name_property);
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;

                match geo_geom {
                    geo::Geometry::Polygon(p) => DistrictGeometry::Polygon(p),
                    geo::Geometry::MultiPolygon(mp) => DistrictGeometry::MultiPolygon(mp),
                    _ => {
                        warn!("Skipping district {}: geometry is not polygonal", name);
                        continue;
                    }
                }
            }
            None => {
                warn!("Skipping district {}: no geometry", name);
                continue;
            }
        };

        features.push(DistrictFeature { name, geometry });
    }

    Ok(FeatureCollection::new(features))
}

fn load_shapefile(path: &Path, name_field: &str) -> Result<FeatureCollection> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let name = match record.get(name_field) {
            Some(shapefile::dbase::FieldValue::Character(Some(s))) => match DistrictName::parse(s) {
                Ok(name) => name,
                Err(_) => {
                    warn!("Skipping shape with blank '{}' field", name_field);
                    continue;
                }
            },
            Some(shapefile::dbase::FieldValue::Character(None)) => continue,
            Some(_) => return Err(anyhow!("Shapefile column '{}' must be a string", name_field)),
            None => return Err(anyhow!("Column '{}' not found in Shapefile", name_field)),
        };

        let multi: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => {
                warn!("Skipping district {}: shape is not polygonal", name);
                continue;
            }
        };

        // Shapefiles do not distinguish single from multi part polygons
        let geometry = if multi.0.len() == 1 {
            DistrictGeometry::Polygon(multi.0.into_iter().next().ok_or_else(|| anyhow!("empty polygon"))?)
        } else {
            DistrictGeometry::MultiPolygon(multi)
        };

        features.push(DistrictFeature { name, geometry });
    }

    Ok(FeatureCollection::new(features))
}

/// Parses the published sheet. The first line names the columns; blank lines are skipped.
pub fn parse_csv(text: &str, join_column: &str) -> Result<Vec<TabularRow>> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();

    let join_col_idx = headers.iter().position(|h| h == join_column)
        .ok_or_else(|| anyhow!("Join column '{}' not found in CSV", join_column))?;

    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let district = match DistrictName::parse(record.get(join_col_idx).unwrap_or("")) {
            Ok(name) => name,
            Err(e) => {
                warn!("Skipping CSV line {}: {}", line, e);
                continue;
            }
        };

        let fields: HashMap<String, String> = headers.iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();

        rows.push(TabularRow { district, fields });
    }

    debug!("Parsed {} CSV rows", rows.len());
    Ok(rows)
}

pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Downloads the CSV export of the spreadsheet.
pub async fn fetch_csv(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client.get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch {}", url))?
        .error_for_status()
        .context("Spreadsheet server returned an error status")?;
    response.text().await.context("Failed to read CSV body")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = "District,Temperature,Population,Births,Deaths\n\
        Adilabad,31.2,708972,1200,400\n\
        \n\
        Hyderabad ,34.0,3943323,5100,2100\n\
        ,30.0,1,1,1\n\
        Unknown District,29.5,1000\n";

    #[test]
    fn csv_rows_keep_order_and_skip_blank_lines() {
        let rows = parse_csv(SHEET, "District").unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.district.as_str()).collect();
        assert_eq!(names, vec!["Adilabad", "Hyderabad", "Unknown District"]);
        assert_eq!(rows[1].get("Population"), Some("3943323"));
    }

    #[test]
    fn short_rows_are_best_effort() {
        let rows = parse_csv(SHEET, "District").unwrap();
        let unknown = &rows[2];
        assert_eq!(unknown.get("Population"), Some("1000"));
        assert_eq!(unknown.get("Deaths"), None);
    }

    #[test]
    fn missing_join_column_is_an_error() {
        let err = parse_csv("Name,Temperature\nAdilabad,30\n", "District").unwrap_err();
        assert!(err.to_string().contains("District"));
    }

    #[test]
    fn padded_headers_are_trimmed() {
        let rows = parse_csv(" District , Temperature \nNirmal,28\n", "District").unwrap();
        assert_eq!(rows[0].get("Temperature"), Some("28"));
    }

    #[test]
    fn geojson_features_keep_shape_kind() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"District": "Adilabad"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type": "Feature", "properties": {"District": "Hyderabad"},
                 "geometry": {"type": "MultiPolygon", "coordinates": [[[[0,0],[1,0],[1,1],[0,0]]], [[[2,2],[3,2],[3,3],[2,2]]]]}},
                {"type": "Feature", "properties": {"Name": "Orphan"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}},
                {"type": "Feature", "properties": {"District": "Point Town"},
                 "geometry": {"type": "Point", "coordinates": [0,0]}}
            ]
        }"#;
        let geojson: GeoJson = text.parse().unwrap();
        let collection = features_from_geojson(geojson, "District").unwrap();

        assert_eq!(collection.len(), 2);
        assert!(matches!(collection.features[0].geometry, DistrictGeometry::Polygon(_)));
        match &collection.features[1].geometry {
            DistrictGeometry::MultiPolygon(mp) => assert_eq!(mp.0.len(), 2),
            other => panic!("expected multipolygon, got {:?}", other),
        }
    }

    #[test]
    fn geojson_must_be_a_collection() {
        let geojson: GeoJson = r#"{"type": "Point", "coordinates": [0, 0]}"#.parse().unwrap();
        assert!(features_from_geojson(geojson, "District").is_err());
    }
}
