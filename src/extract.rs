//! Track point extraction from KML markers.
//!
//! A marker is a candidate track point only when it carries both a `Point`
//! geometry and an `ExtendedData` block; this separates recorded fixes from the
//! path `LineString` marker that exports also contain. Markers missing the `id`
//! field or the `TimeStamp/when` field are skipped quietly. Timestamps or
//! coordinates that fail to parse are logged and the marker is skipped.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use log::{debug, warn};

use crate::error::{Result, TrackMergeError};
use crate::geo_utils::parse_coordinates;
use crate::kml::{classify, Element, KmlDocument, MarkerKind};
use crate::{PointMarker, TrackPoint};

/// Name of the `ExtendedData/Data` field holding the point identity.
pub const IDENTITY_FIELD: &str = "id";

/// ISO-8601 forms with an explicit offset, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// ISO-8601 forms without an offset; read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp. A trailing `Z` means UTC; timestamps without
/// any offset are read as UTC. Seconds may be omitted, the date and time may be
/// separated by a space, and a bare date means midnight UTC.
///
/// ```rust
/// use track_merger::parse_timestamp;
///
/// let a = parse_timestamp("2026-01-11T14:33:00Z").unwrap();
/// let b = parse_timestamp("2026-01-11T15:33:00+01:00").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn parse_timestamp(text: &str) -> Result<DateTime<FixedOffset>> {
    let trimmed = text.trim();
    let normalized = match trimmed.strip_suffix('Z') {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_string(),
    };

    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|err| parse_iso_fallback(&normalized).ok_or(err))
        .map_err(|source| TrackMergeError::InvalidTimestamp {
            value: trimmed.to_string(),
            source,
        })
}

fn parse_iso_fallback(text: &str) -> Option<DateTime<FixedOffset>> {
    let with_offset = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok());
    if with_offset.is_some() {
        return with_offset;
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Yield the track points of one document, in document order.
///
/// Fails only when the document has no `Document` element; problems with
/// individual markers never abort the file.
pub fn extract_track_points(
    document: &KmlDocument,
) -> Result<impl Iterator<Item = TrackPoint> + '_> {
    let markers = document.markers()?;
    Ok(markers.into_iter().filter_map(track_point_from_marker))
}

/// Build a [`TrackPoint`] from one marker, or `None` if it does not qualify.
pub fn track_point_from_marker(marker: &Element) -> Option<TrackPoint> {
    let point = marker.child("Point")?;
    let extended_data = marker.child("ExtendedData")?;

    let identity = identity_of(extended_data).filter(|id| !id.is_empty())?;
    let when = timestamp_text(marker).filter(|t| !t.is_empty())?;

    let timestamp = match parse_timestamp(&when) {
        Ok(ts) => ts,
        Err(e) => {
            warn!("[Extract] Error parsing date for point {identity}: {e}");
            return None;
        }
    };

    let coordinates = point
        .child("coordinates")
        .map(|c| c.text().trim().to_string())
        .unwrap_or_default();
    let position = match parse_coordinates(&coordinates) {
        Ok(p) => p,
        Err(e) => {
            warn!("[Extract] Skipping point {identity}: {e}");
            return None;
        }
    };

    Some(TrackPoint {
        identity,
        timestamp,
        position,
        coordinates,
        marker: marker.clone(),
    })
}

/// Value of the first `Data` entry named `id`. Later entries with the same
/// name are not consulted, even when the first one has no value.
fn identity_of(extended_data: &Element) -> Option<String> {
    extended_data
        .children_named("Data")
        .find(|data| data.attribute("name") == Some(IDENTITY_FIELD))
        .and_then(|data| data.child("value"))
        .map(|value| value.text())
}

fn timestamp_text(marker: &Element) -> Option<String> {
    marker.find(&["TimeStamp", "when"]).map(|when| when.text())
}

/// Collect every marker with a point geometry, in document order.
///
/// Unlike [`extract_track_points`] no identity or timestamp is required; an
/// unparseable timestamp is recorded as `None`. Markers whose coordinates cannot
/// be read are skipped with a warning.
pub fn collect_point_markers(document: &KmlDocument) -> Result<Vec<PointMarker>> {
    let mut points = Vec::new();
    for marker in document.markers()? {
        if classify(marker) != MarkerKind::Point {
            continue;
        }

        let coordinates = marker
            .find(&["Point", "coordinates"])
            .map(|c| c.text().trim().to_string())
            .unwrap_or_default();
        let position = match parse_coordinates(&coordinates) {
            Ok(p) => p,
            Err(e) => {
                warn!("[Extract] Skipping point marker: {e}");
                continue;
            }
        };

        let timestamp = timestamp_text(marker).and_then(|text| match parse_timestamp(&text) {
            Ok(ts) => Some(ts),
            Err(e) => {
                debug!("[Extract] Ignoring timestamp: {e}");
                None
            }
        });

        points.push(PointMarker {
            timestamp,
            position,
            coordinates,
            marker: marker.clone(),
        });
    }
    Ok(points)
}

/// Parse the `TimeStamp/when` of every marker in the document, in document
/// order. Unparseable values are ignored.
pub fn collect_timestamps(document: &KmlDocument) -> Result<Vec<DateTime<FixedOffset>>> {
    Ok(document
        .markers()?
        .into_iter()
        .filter_map(timestamp_text)
        .filter_map(|text| parse_timestamp(&text).ok())
        .collect())
}
