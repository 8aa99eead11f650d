use crate::types::{DistrictFeature, DistrictName, FeatureCollection, TabularRow};
use geo::{Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;
use std::collections::HashSet;

/// First row whose district matches `name` ignoring case and surrounding whitespace.
pub fn lookup<'a>(rows: &'a [TabularRow], name: &str) -> Option<&'a TabularRow> {
    let name = DistrictName::parse(name).ok()?;
    lookup_name(rows, &name)
}

pub fn lookup_name<'a>(rows: &'a [TabularRow], name: &DistrictName) -> Option<&'a TabularRow> {
    rows.iter().find(|row| &row.district == name)
}

pub fn find_feature<'a>(collection: &'a FeatureCollection, name: &str) -> Option<&'a DistrictFeature> {
    let name = DistrictName::parse(name).ok()?;
    collection.features.iter().find(|f| f.name == name)
}

/// Which names join and which exist on only one side.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct JoinReport {
    pub matched: Vec<String>,
    pub geometry_only: Vec<String>,
    pub table_only: Vec<String>,
}

impl JoinReport {
    pub fn build(collection: &FeatureCollection, rows: &[TabularRow]) -> Self {
        let mut report = JoinReport::default();
        let mut seen = HashSet::new();

        for feature in &collection.features {
            if lookup_name(rows, &feature.name).is_some() {
                report.matched.push(feature.name.to_string());
            } else {
                report.geometry_only.push(feature.name.to_string());
            }
        }

        for row in rows {
            let in_geometry = collection.features.iter().any(|f| f.name == row.district);
            if !in_geometry && seen.insert(row.district.clone()) {
                report.table_only.push(row.district.to_string());
            }
        }

        report
    }
}

// Wrapper for RTree indexing
struct FeatureIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for FeatureIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Bounding-box index over a collection for point-in-district queries.
pub struct SpatialIndex {
    tree: RTree<FeatureIndex>,
}

impl SpatialIndex {
    pub fn new(collection: &FeatureCollection) -> Self {
        let items: Vec<FeatureIndex> = collection.features.iter().enumerate()
            .filter_map(|(i, feature)| {
                let rect: Rect<f64> = feature.geometry.bounding_rect()?;
                Some(FeatureIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        SpatialIndex { tree: RTree::bulk_load(items) }
    }

    /// District of `collection` containing the point. The index must have been built from it.
    pub fn locate<'a>(&self, collection: &'a FeatureCollection, lon: f64, lat: f64) -> Option<&'a DistrictFeature> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| collection.features.get(candidate.index))
            .find(|feature| feature.geometry.contains_point(&point))
    }
}
