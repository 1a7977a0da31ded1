//! Cross-file deduplication and chronological sequencing.
//!
//! Source files are loaded (optionally in parallel with the `parallel` feature),
//! then their track points are inserted into a [`TrackIndex`] one file at a
//! time, in the order the files were given. The first point seen for an
//! identity is kept; any later point with the same identity is dropped, even if
//! it has a different position or timestamp.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::error::{Result, TrackMergeError};
use crate::extract::extract_track_points;
use crate::kml::KmlDocument;
use crate::TrackPoint;

// ============================================================================
// Deduplication Index
// ============================================================================

/// Identity-keyed set of track points that keeps the first occurrence.
///
/// Points are stored in insertion order, so sorting the result with a stable
/// sort breaks timestamp ties by the order points were first seen.
#[derive(Debug, Clone, Default)]
pub struct TrackIndex {
    /// identity -> position in `points`
    slots: HashMap<String, usize>,
    points: Vec<TrackPoint>,
    duplicates: usize,
}

impl TrackIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a point unless its identity is already present.
    ///
    /// Returns `true` if the point was inserted.
    pub fn insert(&mut self, point: TrackPoint) -> bool {
        if self.slots.contains_key(&point.identity) {
            self.duplicates += 1;
            debug!("[Merge] Dropping duplicate point {}", point.identity);
            return false;
        }
        self.slots.insert(point.identity.clone(), self.points.len());
        self.points.push(point);
        true
    }

    /// Insert points in iteration order. Returns how many were new.
    pub fn extend<I: IntoIterator<Item = TrackPoint>>(&mut self, points: I) -> usize {
        let mut added = 0;
        for point in points {
            if self.insert(point) {
                added += 1;
            }
        }
        added
    }

    pub fn get(&self, identity: &str) -> Option<&TrackPoint> {
        self.slots.get(identity).map(|&i| &self.points[i])
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.slots.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points rejected because their identity was already present.
    pub fn duplicates_dropped(&self) -> usize {
        self.duplicates
    }

    /// The unique points in first-seen order.
    pub fn into_points(self) -> Vec<TrackPoint> {
        self.points
    }
}

// ============================================================================
// Sequencing
// ============================================================================

/// Sort points ascending by timestamp. Equal timestamps keep their input order.
pub fn sort_chronologically(mut points: Vec<TrackPoint>) -> Vec<TrackPoint> {
    points.sort_by_key(|p| p.timestamp);
    points
}

// ============================================================================
// Multi-file Merge
// ============================================================================

/// A parsed source file together with its extracted track points.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub path: PathBuf,
    pub document: KmlDocument,
    pub points: Vec<TrackPoint>,
}

impl LoadedSource {
    /// Extract the track points of an already parsed document.
    ///
    /// Fails if the document has no `Document` element.
    pub fn from_document(path: impl Into<PathBuf>, document: KmlDocument) -> Result<Self> {
        let points: Vec<TrackPoint> = extract_track_points(&document)?.collect();
        Ok(Self {
            path: path.into(),
            document,
            points,
        })
    }

    /// Read, parse and extract one file.
    pub fn load(path: &Path) -> Result<Self> {
        let document = KmlDocument::read(path)?;
        Self::from_document(path, document)
    }
}

/// The consolidated result of a merge.
#[derive(Debug, Clone)]
pub struct MergedTrack {
    /// Unique points sorted by timestamp
    pub track: Vec<TrackPoint>,
    /// First usable source, supplies styles and the path marker for the output
    pub template: KmlDocument,
    pub template_path: PathBuf,
    pub files_merged: usize,
    pub duplicates_dropped: usize,
}

/// Load every file, skipping (and logging) those that cannot be read, parsed,
/// or lack a `Document` element. The result keeps the order of `paths`.
pub fn load_sources(paths: &[PathBuf]) -> Vec<LoadedSource> {
    #[cfg(feature = "parallel")]
    let results: Vec<(&PathBuf, Result<LoadedSource>)> = {
        use rayon::prelude::*;
        paths
            .par_iter()
            .map(|path| (path, LoadedSource::load(path)))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let results: Vec<(&PathBuf, Result<LoadedSource>)> = paths
        .iter()
        .map(|path| (path, LoadedSource::load(path)))
        .collect();

    results
        .into_iter()
        .filter_map(|(path, result)| match result {
            Ok(source) => {
                info!(
                    "[Merge] Processed {}: {} track points",
                    path.display(),
                    source.points.len()
                );
                Some(source)
            }
            Err(e) => {
                warn!("[Merge] Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Merge loaded sources in the given order.
///
/// The first source becomes the template. Fails with
/// [`TrackMergeError::NoUsableInput`] when `sources` is empty.
pub fn merge_sources(sources: Vec<LoadedSource>) -> Result<MergedTrack> {
    let files_merged = sources.len();
    let mut index = TrackIndex::new();
    let mut template: Option<(PathBuf, KmlDocument)> = None;

    for source in sources {
        index.extend(source.points);
        if template.is_none() {
            template = Some((source.path, source.document));
        }
    }

    let (template_path, template) = template.ok_or(TrackMergeError::NoUsableInput)?;
    let duplicates_dropped = index.duplicates_dropped();
    info!(
        "[Merge] Total unique points found: {} ({} duplicates dropped)",
        index.len(),
        duplicates_dropped
    );

    Ok(MergedTrack {
        track: sort_chronologically(index.into_points()),
        template,
        template_path,
        files_merged,
        duplicates_dropped,
    })
}

/// Load and merge files in the given order.
pub fn merge_files(paths: &[PathBuf]) -> Result<MergedTrack> {
    merge_sources(load_sources(paths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_timestamp;
    use crate::kml::Element;
    use crate::GpsPoint;

    fn point(id: &str, when: &str, lat: f64) -> TrackPoint {
        TrackPoint {
            identity: id.to_string(),
            timestamp: parse_timestamp(when).unwrap(),
            position: GpsPoint::new(lat, 0.0),
            coordinates: format!("0,{lat}"),
            marker: Element::new("Placemark"),
        }
    }

    fn source(name: &str, points: Vec<TrackPoint>) -> LoadedSource {
        LoadedSource {
            path: PathBuf::from(name),
            document: KmlDocument::parse("<kml><Document/></kml>").unwrap(),
            points,
        }
    }

    #[test]
    fn test_index_first_seen_wins() {
        let mut index = TrackIndex::new();
        assert!(index.insert(point("x", "2026-01-11T10:00:00Z", 1.0)));
        assert!(!index.insert(point("x", "2026-01-11T09:00:00Z", 2.0)));

        assert_eq!(index.len(), 1);
        assert_eq!(index.duplicates_dropped(), 1);
        assert_eq!(index.get("x").unwrap().position.latitude, 1.0);
        assert!(index.contains("x"));
        assert!(!index.contains("y"));
    }

    #[test]
    fn test_index_extend_counts_new() {
        let mut index = TrackIndex::new();
        let added = index.extend(vec![
            point("a", "2026-01-11T10:00:00Z", 1.0),
            point("b", "2026-01-11T10:00:10Z", 1.0),
            point("a", "2026-01-11T10:00:20Z", 1.0),
        ]);
        assert_eq!(added, 2);
        let ids: Vec<_> = index.into_points().into_iter().map(|p| p.identity).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let sorted = sort_chronologically(vec![
            point("late", "2026-01-11T10:05:00Z", 0.0),
            point("tie-1", "2026-01-11T10:00:00Z", 0.0),
            point("early", "2026-01-11T09:00:00Z", 0.0),
            point("tie-2", "2026-01-11T11:00:00+01:00", 0.0),
        ]);
        let ids: Vec<_> = sorted.iter().map(|p| p.identity.as_str()).collect();
        assert_eq!(ids, vec!["early", "tie-1", "tie-2", "late"]);
        assert!(sorted.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_merge_sources_prefers_earlier_file() {
        let a = source("a.kml", vec![point("x", "2026-01-11T10:00:00Z", 1.0)]);
        let b = source(
            "b.kml",
            vec![
                point("x", "2026-01-11T08:00:00Z", 2.0),
                point("y", "2026-01-11T09:00:00Z", 3.0),
            ],
        );

        let merged = merge_sources(vec![a, b]).unwrap();
        assert_eq!(merged.files_merged, 2);
        assert_eq!(merged.duplicates_dropped, 1);
        assert_eq!(merged.template_path, PathBuf::from("a.kml"));

        let ids: Vec<_> = merged.track.iter().map(|p| p.identity.as_str()).collect();
        assert_eq!(ids, vec!["y", "x"]);
        assert_eq!(merged.track[1].position.latitude, 1.0);
    }

    #[test]
    fn test_merge_sources_empty() {
        assert!(matches!(
            merge_sources(Vec::new()),
            Err(TrackMergeError::NoUsableInput)
        ));
    }

    #[test]
    fn test_load_sources_skips_missing_files() {
        let sources = load_sources(&[PathBuf::from("/definitely/not/here.kml")]);
        assert!(sources.is_empty());
    }
}
