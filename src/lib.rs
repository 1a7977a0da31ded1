//! # Track Merger
//!
//! Consolidates GPS track exports (KML location markers) from many files into a
//! single deduplicated, chronologically ordered and optionally culled track, then
//! lays the result out for presentation.
//!
//! This library provides:
//! - Track point extraction from KML `Placemark` records
//! - Cross-file deduplication keyed by the point's `id` data field (first seen wins)
//! - Chronological sequencing and distance-based culling
//! - Reassembly of the output document (one path, then flat or grouped points)
//! - Interval diagnostics over recorded timestamps
//!
//! ## Features
//!
//! - **`parallel`** - Parse and extract source files in parallel with rayon.
//!   Merge insertion still happens serially in file order.
//!
//! ## Quick Start
//!
//! ```rust
//! use track_merger::{
//!     cull_by_distance, extract_track_points, reassemble, sort_chronologically,
//!     CullConfig, KmlDocument, ReassemblyConfig, TrackIndex,
//! };
//!
//! let xml = r#"<kml><Document>
//!   <Placemark><LineString><coordinates></coordinates></LineString></Placemark>
//!   <Placemark>
//!     <TimeStamp><when>2026-01-11T14:33:00Z</when></TimeStamp>
//!     <ExtendedData><Data name="id"><value>1</value></Data></ExtendedData>
//!     <Point><coordinates>-0.1278,51.5074,0</coordinates></Point>
//!   </Placemark>
//! </Document></kml>"#;
//!
//! let doc = KmlDocument::parse(xml).unwrap();
//! let mut index = TrackIndex::new();
//! index.extend(extract_track_points(&doc).unwrap());
//!
//! let track = sort_chronologically(index.into_points());
//! let culled = cull_by_distance(track, &CullConfig::default());
//! let output = reassemble(&culled.kept, &doc, &ReassemblyConfig::default()).unwrap();
//! assert_eq!(output.path_coordinates(), vec!["-0.1278,51.5074,0"]);
//! ```

use chrono::{DateTime, FixedOffset};

pub mod cull;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod geo_utils;
pub mod kml;
pub mod merge;
pub mod pipeline;
pub mod reassemble;

pub use cull::{cull_by_distance, CullConfig, CullResult};
pub use diagnostics::{interval_stats, IntervalConfig, IntervalStats};
pub use discovery::discover_inputs;
pub use error::{Result, TrackMergeError};
pub use extract::{extract_track_points, parse_timestamp};
pub use kml::{Element, KmlDocument, WriteOptions, KML_NAMESPACE};
pub use merge::{merge_files, sort_chronologically, LoadedSource, MergedTrack, TrackIndex};
pub use reassemble::{reassemble, OutputDocument, PointLayout, ReassemblyConfig};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_merger::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Anything with a position on the globe.
pub trait Positioned {
    fn position(&self) -> GpsPoint;
}

/// A located record backed by an original KML marker.
///
/// The reassembler builds path geometry from [`coordinates`](Self::coordinates)
/// and re-emits [`marker`](Self::marker) unchanged.
pub trait MarkerRecord: Positioned {
    /// Coordinate tuple text exactly as found in the source (trimmed)
    fn coordinates(&self) -> &str;
    /// The original `Placemark`
    fn marker(&self) -> &Element;
}

impl Positioned for GpsPoint {
    fn position(&self) -> GpsPoint {
        *self
    }
}

/// A single recorded fix with a stable identity.
///
/// Created by [`extract_track_points`]; only markers that carry a point
/// geometry, an `id` data field and a parseable timestamp become track points.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackPoint {
    /// Value of the `id` data field, the deduplication key
    pub identity: String,
    pub timestamp: DateTime<FixedOffset>,
    pub position: GpsPoint,
    /// Coordinate tuple text of the point geometry (trimmed)
    pub coordinates: String,
    /// The source `Placemark`, kept for re-emission with its styling
    pub marker: Element,
}

impl Positioned for TrackPoint {
    fn position(&self) -> GpsPoint {
        self.position
    }
}

impl MarkerRecord for TrackPoint {
    fn coordinates(&self) -> &str {
        &self.coordinates
    }

    fn marker(&self) -> &Element {
        &self.marker
    }
}

/// Any marker with a point geometry, identity not required.
///
/// Used by the standalone cull and finalize stages, which work on documents
/// that were already merged.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMarker {
    /// Parsed `TimeStamp/when`, if present and valid
    pub timestamp: Option<DateTime<FixedOffset>>,
    pub position: GpsPoint,
    pub coordinates: String,
    pub marker: Element,
}

impl Positioned for PointMarker {
    fn position(&self) -> GpsPoint {
        self.position
    }
}

impl MarkerRecord for PointMarker {
    fn coordinates(&self) -> &str {
        &self.coordinates
    }

    fn marker(&self) -> &Element {
        &self.marker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _: fn() -> TrackIndex = TrackIndex::new;
        let _: fn() -> CullConfig = CullConfig::default;
        let _: fn() -> ReassemblyConfig = ReassemblyConfig::default;
        let _: fn() -> WriteOptions = WriteOptions::default;
    }

    #[test]
    fn test_gps_point_is_positioned() {
        let p = GpsPoint::new(1.0, 2.0);
        assert_eq!(p.position(), p);
    }
}
