//! # Geographic Utilities
//!
//! Geographic computations used by the consolidation pipeline.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`track_bounds`] | Bounding rectangle of a GPS track |
//! | [`parse_coordinates`] | Parse a KML `lon,lat[,alt]` tuple |
//!
//! ## Example
//!
//! ```rust
//! use track_merger::{GpsPoint, geo_utils};
//!
//! let a = GpsPoint::new(0.0, 0.0);
//! let b = GpsPoint::new(0.0, 1.0);
//!
//! let dist = geo_utils::haversine_distance(&a, &b);
//! assert!((dist - 111_195.0).abs() < 1_112.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine formula on a spherical Earth of radius
//! [`EARTH_RADIUS_METERS`]. Culling thresholds are expressed against this
//! radius, so it is fixed here rather than taken from an ellipsoid model.
//!
//! Reference: [Haversine formula (Wikipedia)](https://en.wikipedia.org/wiki/Haversine_formula)

use geo::{BoundingRect, Coord, LineString, Rect};

use crate::error::{Result, TrackMergeError};
use crate::GpsPoint;

/// Spherical Earth radius used for all distance computations.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters along the surface of a sphere with radius
/// [`EARTH_RADIUS_METERS`].
///
/// # Example
///
/// ```rust
/// use track_merger::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let phi1 = p1.latitude.to_radians();
    let phi2 = p2.latitude.to_radians();
    let d_phi = (p2.latitude - p1.latitude).to_radians();
    let d_lambda = (p2.longitude - p1.longitude).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Calculate the total length of a polyline (GPS track) in meters.
///
/// Sums the haversine distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Bounding rectangle of a track, with x = longitude and y = latitude.
///
/// Returns `None` for an empty track.
pub fn track_bounds(points: &[GpsPoint]) -> Option<Rect<f64>> {
    let line: LineString<f64> = points
        .iter()
        .map(|p| Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();
    line.bounding_rect()
}

// =============================================================================
// Coordinate Parsing
// =============================================================================

/// Parse a KML coordinate tuple `lon,lat[,alt]` into a [`GpsPoint`].
///
/// Surrounding whitespace is ignored. When the text holds several tuples only
/// the first is read. Altitude is accepted but not interpreted.
///
/// ```rust
/// use track_merger::geo_utils::parse_coordinates;
///
/// let p = parse_coordinates(" -0.1278,51.5074,12.0 ").unwrap();
/// assert_eq!(p.latitude, 51.5074);
/// assert_eq!(p.longitude, -0.1278);
/// ```
pub fn parse_coordinates(text: &str) -> Result<GpsPoint> {
    let invalid = || TrackMergeError::InvalidCoordinates(text.trim().to_string());

    let tuple = text.split_whitespace().next().ok_or_else(invalid)?;
    let mut parts = tuple.split(',');

    let mut component = || -> Result<f64> {
        let value: f64 = parts
            .next()
            .and_then(|s| s.trim().parse().ok())
            .ok_or_else(invalid)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid())
        }
    };

    let longitude = component()?;
    let latitude = component()?;
    Ok(GpsPoint::new(latitude, longitude))
}

// =============================================================================
// Unit Tests
// =============================================================================
