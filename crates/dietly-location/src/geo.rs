//! Great-circle math and coordinate conversion.

use std::f64::consts::PI;

use crate::types::{Coordinates, NearbyPlace};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// Krasovsky 1940 ellipsoid, used by the GCJ-02 transform.
const KRASOVSKY_A: f64 = 6_378_245.0;
const KRASOVSKY_EE: f64 = 0.006_693_421_622_965_943;

// Padding around framed points so edge markers stay on screen.
const VIEW_MARGIN_DEGREES: f64 = 0.002;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub southwest: Coordinates,
    pub northeast: Coordinates,
}

impl Bounds {
    /// Grow each side by `margin` degrees.
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            southwest: Coordinates::new(self.southwest.lng - margin, self.southwest.lat - margin),
            northeast: Coordinates::new(self.northeast.lng + margin, self.northeast.lat + margin),
        }
    }
}

/// Haversine distance in meters.
pub fn distance_meters(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Initial bearing from `start` to `end`, degrees in [0, 360).
pub fn bearing_degrees(start: Coordinates, end: Coordinates) -> f64 {
    let d_lng = (end.lng - start.lng).to_radians();
    let lat1 = start.lat.to_radians();
    let lat2 = end.lat.to_radians();

    let y = d_lng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lng.cos();

    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Arithmetic mean of the points; `None` for an empty slice.
pub fn center(points: &[Coordinates]) -> Option<Coordinates> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lng, lat) = points
        .iter()
        .fold((0.0, 0.0), |(lng, lat), p| (lng + p.lng, lat + p.lat));
    Some(Coordinates::new(lng / n, lat / n))
}

/// Smallest box containing every point; `None` for an empty slice.
pub fn bounds(points: &[Coordinates]) -> Option<Bounds> {
    let first = *points.first()?;
    let init = Bounds {
        southwest: first,
        northeast: first,
    };
    Some(points.iter().fold(init, |b, p| Bounds {
        southwest: Coordinates::new(b.southwest.lng.min(p.lng), b.southwest.lat.min(p.lat)),
        northeast: Coordinates::new(b.northeast.lng.max(p.lng), b.northeast.lat.max(p.lat)),
    }))
}

/// Map zoom level that fits a span of `distance` meters.
pub fn zoom_level_for(distance: f64) -> u8 {
    const STEPS: [(f64, u8); 10] = [
        (100.0, 18),
        (500.0, 17),
        (1_000.0, 16),
        (2_000.0, 15),
        (5_000.0, 14),
        (10_000.0, 13),
        (20_000.0, 12),
        (50_000.0, 11),
        (100_000.0, 10),
        (f64::INFINITY, 9),
    ];
    STEPS
        .iter()
        .find(|(limit, _)| distance < *limit)
        .map_or(9, |(_, zoom)| *zoom)
}

/// Eight-point compass name for a bearing in degrees.
pub fn compass_point(bearing: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let index = ((bearing.rem_euclid(360.0) + 22.5) / 45.0) as usize % POINTS.len();
    POINTS[index]
}

/// Where to centre a map and how far to zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapView {
    pub center: Coordinates,
    pub zoom: u8,
}

/// Frame `origin` together with every place that has a position.
pub fn map_view(origin: Coordinates, places: &[NearbyPlace]) -> MapView {
    let points: Vec<Coordinates> = std::iter::once(origin)
        .chain(places.iter().filter_map(|place| place.position))
        .collect();

    let span = bounds(&points)
        .map(|b| b.expand(VIEW_MARGIN_DEGREES))
        .map_or(0.0, |b| distance_meters(b.southwest, b.northeast));

    MapView {
        center: center(&points).unwrap_or(origin),
        zoom: zoom_level_for(span),
    }
}

/// "850 m", "1.2 km", "15 km".
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{} m", meters.round() as i64)
    } else if meters < 10_000.0 {
        format!("{:.1} km", meters / 1_000.0)
    } else {
        format!("{} km", (meters / 1_000.0).round() as i64)
    }
}

/// Places within `radius_meters` of `origin`, nearest first.
///
/// Distances are recomputed from `position` when the place has one.
pub fn within_radius(
    origin: Coordinates,
    places: Vec<NearbyPlace>,
    radius_meters: u32,
) -> Vec<NearbyPlace> {
    let mut kept: Vec<NearbyPlace> = places
        .into_iter()
        .map(|mut place| {
            if let Some(pos) = place.position {
                place.distance_meters = distance_meters(origin, pos).round() as u32;
            }
            place
        })
        .filter(|place| place.distance_meters <= radius_meters)
        .collect();
    kept.sort_by_key(|place| place.distance_meters);
    kept
}

/// Outside this box GCJ-02 equals WGS84.
pub fn out_of_china(point: Coordinates) -> bool {
    !(72.004..=137.8347).contains(&point.lng) || !(0.8293..=55.8271).contains(&point.lat)
}

/// Convert a WGS84 fix to GCJ-02, the datum Chinese map providers use.
pub fn wgs84_to_gcj02(point: Coordinates) -> Coordinates {
    if out_of_china(point) {
        return point;
    }

    let mut d_lat = transform_lat(point.lng - 105.0, point.lat - 35.0);
    let mut d_lng = transform_lng(point.lng - 105.0, point.lat - 35.0);
    let rad_lat = point.lat / 180.0 * PI;
    let magic = 1.0 - KRASOVSKY_EE * rad_lat.sin().powi(2);
    let sqrt_magic = magic.sqrt();
    d_lat = (d_lat * 180.0) / ((KRASOVSKY_A * (1.0 - KRASOVSKY_EE)) / (magic * sqrt_magic) * PI);
    d_lng = (d_lng * 180.0) / (KRASOVSKY_A / sqrt_magic * rad_lat.cos() * PI);

    Coordinates::new(point.lng + d_lng, point.lat + d_lat)
}

fn transform_lat(x: f64, y: f64) -> f64 {
    let mut ret = -100.0 + 2.0 * x + 3.0 * y + 0.2 * y * y + 0.1 * x * y + 0.2 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (y * PI).sin() + 40.0 * (y / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (160.0 * (y / 12.0 * PI).sin() + 320.0 * (y * PI / 30.0).sin()) * 2.0 / 3.0;
    ret
}

fn transform_lng(x: f64, y: f64) -> f64 {
    let mut ret = 300.0 + x + 2.0 * y + 0.1 * x * x + 0.1 * x * y + 0.1 * x.abs().sqrt();
    ret += (20.0 * (6.0 * x * PI).sin() + 20.0 * (2.0 * x * PI).sin()) * 2.0 / 3.0;
    ret += (20.0 * (x * PI).sin() + 40.0 * (x / 3.0 * PI).sin()) * 2.0 / 3.0;
    ret += (150.0 * (x / 12.0 * PI).sin() + 300.0 * (x / 30.0 * PI).sin()) * 2.0 / 3.0;
    ret
}
