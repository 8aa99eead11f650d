use crate::config::ProjectionConfig;
use crate::types::FeatureCollection;
use geo::Coord;
use rayon::prelude::*;
use tracing::info;

// WGS84 ellipsoid
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
const FLATTENING: f64 = 1.0 / 298.257_223_563;

const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Universal Transverse Mercator zone on the WGS84 datum, metre units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub zone: u8,
    pub northern: bool,
}

impl From<&ProjectionConfig> for Utm {
    fn from(config: &ProjectionConfig) -> Self {
        Utm { zone: config.utm_zone, northern: config.northern }
    }
}

impl Utm {
    fn central_meridian(&self) -> f64 {
        (f64::from(self.zone) * 6.0 - 183.0).to_radians()
    }

    fn false_northing(&self) -> f64 {
        if self.northern { 0.0 } else { FALSE_NORTHING_SOUTH }
    }

    /// Easting/northing in metres to (longitude, latitude) in degrees.
    pub fn to_lon_lat(&self, easting: f64, northing: f64) -> (f64, f64) {
        let a = SEMI_MAJOR_AXIS;
        let e2 = FLATTENING * (2.0 - FLATTENING);
        let ep2 = e2 / (1.0 - e2);

        let x = easting - FALSE_EASTING;
        let y = northing - self.false_northing();

        // Footpoint latitude from the meridian arc
        let m = y / SCALE_FACTOR;
        let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));
        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());
        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let (sin1, cos1) = phi1.sin_cos();
        let tan1 = phi1.tan();
        let c1 = ep2 * cos1 * cos1;
        let t1 = tan1 * tan1;
        let w = 1.0 - e2 * sin1 * sin1;
        let n1 = a / w.sqrt();
        let r1 = a * (1.0 - e2) / w.powf(1.5);
        let d = x / (n1 * SCALE_FACTOR);

        let lat = phi1
            - (n1 * tan1 / r1)
                * (d.powi(2) / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2 - 3.0 * c1.powi(2))
                        * d.powi(6)
                        / 720.0);
        let lon = self.central_meridian()
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                    * d.powi(5)
                    / 120.0)
                / cos1;

        (lon.to_degrees(), lat.to_degrees())
    }

    /// (longitude, latitude) in degrees to easting/northing in metres.
    pub fn from_lon_lat(&self, lon: f64, lat: f64) -> (f64, f64) {
        let a = SEMI_MAJOR_AXIS;
        let e2 = FLATTENING * (2.0 - FLATTENING);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let phi = lat.to_radians();
        let (sin, cos) = phi.sin_cos();
        let tan = phi.tan();
        let n = a / (1.0 - e2 * sin * sin).sqrt();
        let t = tan * tan;
        let c = ep2 * cos * cos;
        let big_a = (lon.to_radians() - self.central_meridian()) * cos;

        let m = a
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let easting = SCALE_FACTOR
            * n
            * (big_a
                + (1.0 - t + c) * big_a.powi(3) / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * big_a.powi(5) / 120.0)
            + FALSE_EASTING;
        let northing = SCALE_FACTOR
            * (m + n
                * tan
                * (big_a.powi(2) / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * big_a.powi(4) / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * big_a.powi(6) / 720.0))
            + self.false_northing();

        (easting, northing)
    }

    fn coord_to_geographic(&self, coord: Coord<f64>) -> Coord<f64> {
        let (x, y) = self.to_lon_lat(coord.x, coord.y);
        Coord { x, y }
    }
}

/// Rewrites every coordinate of the collection from UTM metres to lon/lat degrees.
///
/// Ring and part structure is untouched; only coordinate values change.
pub fn reproject_collection(collection: &mut FeatureCollection, utm: Utm) {
    info!(
        "Reprojecting {} features from UTM zone {}{}",
        collection.len(),
        utm.zone,
        if utm.northern { "N" } else { "S" }
    );

    collection.features.par_iter_mut().for_each(|feature| {
        feature
            .geometry
            .map_coords_in_place(|c| utm.coord_to_geographic(c));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DistrictFeature, DistrictGeometry, DistrictName};
    use geo::{polygon, CoordsIter, MultiPolygon};

    const ZONE_44N: Utm = Utm { zone: 44, northern: true };

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn central_meridian_at_equator() {
        let (lon, lat) = ZONE_44N.to_lon_lat(500_000.0, 0.0);
        assert!(close(lon, 81.0, 1e-12));
        assert!(close(lat, 0.0, 1e-12));
    }

    #[test]
    fn known_points_in_zone_44() {
        // Reference values from an independent Krueger series implementation
        let (lon, lat) = ZONE_44N.to_lon_lat(217_000.0, 1_924_000.0);
        assert!(close(lon, 78.336_614_739, 1e-6), "lon {lon}");
        assert!(close(lat, 17.383_981_316, 1e-6), "lat {lat}");

        let (lon, lat) = ZONE_44N.to_lon_lat(450_000.0, 1_970_000.0);
        assert!(close(lon, 80.528_178_463, 1e-6), "lon {lon}");
        assert!(close(lat, 17.816_979_065, 1e-6), "lat {lat}");
    }

    #[test]
    fn forward_inverts_inverse() {
        let (lon, lat) = ZONE_44N.to_lon_lat(300_000.0, 2_000_000.0);
        let (e, n) = ZONE_44N.from_lon_lat(lon, lat);
        assert!(close(e, 300_000.0, 0.01), "easting {e}");
        assert!(close(n, 2_000_000.0, 0.01), "northing {n}");
    }

    #[test]
    fn southern_hemisphere_uses_false_northing() {
        let south = Utm { zone: 44, northern: false };
        let (lon, lat) = south.to_lon_lat(500_000.0, 10_000_000.0);
        assert!(close(lon, 81.0, 1e-12));
        assert!(close(lat, 0.0, 1e-9));
    }

    #[test]
    fn reprojection_preserves_structure() {
        let exterior = vec![
            (200_000.0, 1_900_000.0),
            (260_000.0, 1_900_000.0),
            (260_000.0, 1_960_000.0),
            (200_000.0, 1_900_000.0),
        ];
        let hole = vec![
            (220_000.0, 1_920_000.0),
            (230_000.0, 1_920_000.0),
            (230_000.0, 1_930_000.0),
            (220_000.0, 1_920_000.0),
        ];
        let with_hole = geo::Polygon::new(exterior.into(), vec![hole.into()]);
        let island = polygon![
            (x: 300_000.0, y: 2_000_000.0),
            (x: 310_000.0, y: 2_000_000.0),
            (x: 310_000.0, y: 2_010_000.0),
            (x: 300_000.0, y: 2_000_000.0),
        ];

        let mut collection = FeatureCollection::new(vec![
            DistrictFeature {
                name: DistrictName::parse("Adilabad").unwrap(),
                geometry: DistrictGeometry::Polygon(with_hole.clone()),
            },
            DistrictFeature {
                name: DistrictName::parse("Hyderabad").unwrap(),
                geometry: DistrictGeometry::MultiPolygon(MultiPolygon::new(vec![
                    with_hole.clone(),
                    island,
                ])),
            },
        ]);
        let before = collection.clone();

        reproject_collection(&mut collection, ZONE_44N);

        assert_eq!(collection.len(), before.len());
        for (after, before) in collection.features.iter().zip(&before.features) {
            assert_eq!(after.name, before.name);
            match (&after.geometry, &before.geometry) {
                (DistrictGeometry::Polygon(a), DistrictGeometry::Polygon(b)) => {
                    assert_eq!(a.interiors().len(), b.interiors().len());
                    assert_eq!(a.coords_count(), b.coords_count());
                }
                (DistrictGeometry::MultiPolygon(a), DistrictGeometry::MultiPolygon(b)) => {
                    assert_eq!(a.0.len(), b.0.len());
                    for (pa, pb) in a.0.iter().zip(&b.0) {
                        assert_eq!(pa.interiors().len(), pb.interiors().len());
                        assert_eq!(pa.exterior().0.len(), pb.exterior().0.len());
                    }
                }
                _ => panic!("geometry kind changed"),
            }
            assert_ne!(after.geometry, before.geometry);
        }

        // Coordinates land in lon/lat range and keep their order
        if let DistrictGeometry::Polygon(p) = &collection.features[0].geometry {
            let first = p.exterior().0[0];
            let (lon, lat) = ZONE_44N.to_lon_lat(200_000.0, 1_900_000.0);
            assert!(close(first.x, lon, 1e-12));
            assert!(close(first.y, lat, 1e-12));
            assert!((70.0..90.0).contains(&first.x));
        }
    }
}
