//! Stage drivers: merge, cull, finalize, analyze, and the chained run.
//!
//! Each stage reads its input, builds the whole output in memory, and only
//! then writes the output file, so a failing stage leaves no partial file.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use geo::Rect;
use log::info;

use crate::cull::{cull_by_distance, CullConfig};
use crate::diagnostics::{interval_stats, IntervalConfig, IntervalStats};
use crate::discovery::discover_inputs;
use crate::error::{Result, TrackMergeError};
use crate::extract::{collect_point_markers, collect_timestamps};
use crate::geo_utils::{polyline_length, track_bounds};
use crate::kml::{KmlDocument, WriteOptions};
use crate::merge::merge_files;
use crate::reassemble::{reassemble, OutputDocument, PointLayout, ReassemblyConfig};

/// Settings for a full merge -> cull -> finalize run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory, glob pattern or single file. Default: "input"
    pub input: String,
    /// Default: "output/merged.kml"
    pub merged_output: PathBuf,
    /// Default: "output/culled.kml"
    pub culled_output: PathBuf,
    /// Default: "output/final_track.kml"
    pub final_output: PathBuf,
    /// `None` skips culling; finalize then reads the merged file.
    /// Default: 50 m culling
    pub cull: Option<CullConfig>,
    /// Default: points grouped under "Data Points", path named "Track Path"
    pub finalize: ReassemblyConfig,
    pub write: WriteOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: "input".to_string(),
            merged_output: PathBuf::from("output/merged.kml"),
            culled_output: PathBuf::from("output/culled.kml"),
            final_output: PathBuf::from("output/final_track.kml"),
            cull: Some(CullConfig::default()),
            finalize: ReassemblyConfig::finalize(false),
            write: WriteOptions::default(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Outcome of the merge stage.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub files_found: usize,
    pub files_merged: usize,
    pub unique_points: usize,
    pub duplicates_dropped: usize,
    pub has_path: bool,
    /// Length of the merged track in meters
    pub track_length_meters: f64,
    /// x = longitude, y = latitude
    pub bounds: Option<Rect<f64>>,
    pub output: PathBuf,
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged {} of {} files", self.files_merged, self.files_found)?;
        writeln!(
            f,
            "Total unique points found: {} ({} duplicates dropped)",
            self.unique_points, self.duplicates_dropped
        )?;
        writeln!(f, "Track length: {:.2} km", self.track_length_meters / 1000.0)?;
        if let Some(b) = &self.bounds {
            writeln!(
                f,
                "Bounds: {:.5}..{:.5} N, {:.5}..{:.5} E",
                b.min().y,
                b.max().y,
                b.min().x,
                b.max().x
            )?;
        }
        if !self.has_path {
            writeln!(f, "Warning: no LineString path in template, points only")?;
        }
        write!(f, "Successfully wrote {}", self.output.display())
    }
}

/// Outcome of the cull stage.
#[derive(Debug, Clone)]
pub struct CullReport {
    pub input_points: usize,
    pub kept_points: usize,
    pub min_distance_meters: f64,
    /// `None` when there were no input points
    pub reduction_percent: Option<f64>,
    pub output: PathBuf,
}

impl fmt::Display for CullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total input points: {}", self.input_points)?;
        writeln!(
            f,
            "Points kept after {}m culling: {}",
            self.min_distance_meters, self.kept_points
        )?;
        match self.reduction_percent {
            Some(pct) => writeln!(f, "Reduction: {pct:.1}%")?,
            None => writeln!(f, "Reduction: n/a (no points)")?,
        }
        write!(f, "Written to {}", self.output.display())
    }
}

/// Outcome of the finalize stage.
#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub has_path: bool,
    pub points: usize,
    pub layout: PointLayout,
    pub output: PathBuf,
}

impl fmt::Display for FinalizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_path {
            writeln!(f, "Warning: No LineString path found.")?;
        }
        match &self.layout {
            PointLayout::Grouped { label } if self.points > 0 => {
                writeln!(f, "Moved {} points into '{}' folder.", self.points, label)?
            }
            PointLayout::Grouped { .. } => {}
            PointLayout::Flat => writeln!(f, "Kept {} points.", self.points)?,
            PointLayout::Suppressed => writeln!(f, "Removed {} points.", self.points)?,
        }
        write!(f, "Written to {}", self.output.display())
    }
}

/// Outcome of the analyze stage.
#[derive(Debug, Clone)]
pub struct AnalyzeReport {
    pub input: PathBuf,
    /// `None` when no positive interval exists
    pub stats: Option<IntervalStats>,
}

impl fmt::Display for AnalyzeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Analyzing {}...", self.input.display())?;
        match &self.stats {
            Some(stats) => write!(f, "{stats}"),
            None => write!(f, "No time intervals found."),
        }
    }
}

/// Reports of a chained run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub merge: MergeReport,
    pub cull: Option<CullReport>,
    pub finalize: FinalizeReport,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.merge)?;
        if let Some(cull) = &self.cull {
            writeln!(f, "{cull}")?;
        }
        write!(f, "{}", self.finalize)
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Merge all KML files named by `input` into `output`.
///
/// Files are processed in sorted path order; `output` itself is never read as
/// an input. Fails with [`TrackMergeError::NoUsableInput`] (and writes
/// nothing) if no file could be used.
pub fn merge(input: &str, output: &Path, options: &WriteOptions) -> Result<MergeReport> {
    let files = discover_inputs(input, Some(output))?;
    info!("[Merge] Found {} input files", files.len());
    if files.is_empty() {
        return Err(TrackMergeError::NoUsableInput);
    }

    let merged = merge_files(&files)?;
    info!("[Merge] Using {} as template", merged.template_path.display());

    let document = reassemble(&merged.track, &merged.template, &ReassemblyConfig::flat())?;
    write_output(output, &document, options)?;

    let positions: Vec<_> = merged.track.iter().map(|p| p.position).collect();
    Ok(MergeReport {
        files_found: files.len(),
        files_merged: merged.files_merged,
        unique_points: merged.track.len(),
        duplicates_dropped: merged.duplicates_dropped,
        has_path: document.path().is_some(),
        track_length_meters: polyline_length(&positions),
        bounds: track_bounds(&positions),
        output: output.to_path_buf(),
    })
}

/// Cull the point markers of `input` and write the result to `output`.
///
/// Points are ordered by timestamp first (stable; points without a usable
/// timestamp go first), so the stage also works on files not produced by
/// [`merge`].
pub fn cull(
    input: &Path,
    output: &Path,
    config: &CullConfig,
    options: &WriteOptions,
) -> Result<CullReport> {
    info!("[Cull] Reading {}", input.display());
    let template = KmlDocument::read(input)?;

    let mut points = collect_point_markers(&template)?;
    points.sort_by_key(|p| p.timestamp);

    let result = cull_by_distance(points, config);
    let document = reassemble(&result.kept, &template, &ReassemblyConfig::flat())?;
    write_output(output, &document, options)?;

    Ok(CullReport {
        input_points: result.input_count,
        kept_points: result.kept_count(),
        min_distance_meters: config.min_distance_meters,
        reduction_percent: result.reduction_percent(),
        output: output.to_path_buf(),
    })
}

/// Lay out `input` for presentation and write it to `output`.
///
/// Point markers keep their document order. The path is rebuilt from them only
/// when `config.rebuild_path` is set.
pub fn finalize(
    input: &Path,
    output: &Path,
    config: &ReassemblyConfig,
    options: &WriteOptions,
) -> Result<FinalizeReport> {
    info!("[Finalize] Reading {}", input.display());
    let template = KmlDocument::read(input)?;

    let points = collect_point_markers(&template)?;
    let document = reassemble(&points, &template, config)?;
    write_output(output, &document, options)?;

    Ok(FinalizeReport {
        has_path: document.path().is_some(),
        points: points.len(),
        layout: config.layout.clone(),
        output: output.to_path_buf(),
    })
}

/// Interval statistics over every marker timestamp in `input`, sorted
/// chronologically.
pub fn analyze(input: &Path, config: &IntervalConfig) -> Result<AnalyzeReport> {
    let document = KmlDocument::read(input)?;
    let mut timestamps = collect_timestamps(&document)?;
    timestamps.sort();

    Ok(AnalyzeReport {
        input: input.to_path_buf(),
        stats: interval_stats(&timestamps, config),
    })
}

/// Merge, optionally cull, then finalize, each stage reading the previous
/// stage's file.
pub fn run(config: &PipelineConfig) -> Result<RunReport> {
    let merge_report = merge(&config.input, &config.merged_output, &config.write)?;

    let (cull_report, finalize_input) = match &config.cull {
        Some(cull_config) => {
            let report = cull(
                &config.merged_output,
                &config.culled_output,
                cull_config,
                &config.write,
            )?;
            (Some(report), config.culled_output.as_path())
        }
        None => (None, config.merged_output.as_path()),
    };

    let finalize_report = finalize(
        finalize_input,
        &config.final_output,
        &config.finalize,
        &config.write,
    )?;

    Ok(RunReport {
        merge: merge_report,
        cull: cull_report,
        finalize: finalize_report,
    })
}

fn write_output(path: &Path, document: &OutputDocument, options: &WriteOptions) -> Result<()> {
    let bytes = document.to_bytes(options)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| TrackMergeError::io(dir, e))?;
    }
    fs::write(path, bytes).map_err(|e| TrackMergeError::io(path, e))?;
    info!("[Pipeline] Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_file(dir: &Path, name: &str, points: &[(&str, &str, f64)]) -> PathBuf {
        let placemarks: String = points
            .iter()
            .map(|(id, when, lng)| {
                format!(
                    r#"<Placemark><TimeStamp><when>{when}</when></TimeStamp>
                    <ExtendedData><Data name="id"><value>{id}</value></Data></ExtendedData>
                    <Point><coordinates>{lng},0,0</coordinates></Point></Placemark>"#
                )
            })
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
<Placemark><LineString><coordinates>0,0,0</coordinates></LineString></Placemark>
{placemarks}
</Document></kml>"#
        );
        let path = dir.join(name);
        fs::write(&path, xml).unwrap();
        path
    }

    #[test]
    fn test_merge_no_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out/merged.kml");
        let input = dir.path().join("empty");
        fs::create_dir(&input).unwrap();

        let result = merge(input.to_str().unwrap(), &output, &WriteOptions::default());
        assert!(matches!(result, Err(TrackMergeError::NoUsableInput)));
        assert!(!output.exists());
    }

    #[test]
    fn test_merge_skips_unparseable_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a_broken.kml"), "<kml><Document>").unwrap();
        track_file(dir.path(), "b_good.kml", &[("1", "2026-01-11T10:00:00Z", 0.0)]);
        let output = dir.path().join("merged.kml");

        let report = merge(dir.path().to_str().unwrap(), &output, &WriteOptions::default()).unwrap();
        assert_eq!(report.files_found, 2);
        assert_eq!(report.files_merged, 1);
        assert_eq!(report.unique_points, 1);
        assert!(report.has_path);
        assert!(output.exists());
    }

    #[test]
    fn test_cull_report_on_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let input = track_file(dir.path(), "empty.kml", &[]);
        let output = dir.path().join("culled.kml");

        let report = cull(&input, &output, &CullConfig::default(), &WriteOptions::default()).unwrap();
        assert_eq!(report.input_points, 0);
        assert_eq!(report.reduction_percent, None);
        assert!(report.to_string().contains("n/a"));
    }

    #[test]
    fn test_analyze_sorts_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let input = track_file(
            dir.path(),
            "t.kml",
            &[
                ("3", "2026-01-11T10:01:10Z", 0.0),
                ("1", "2026-01-11T10:00:00Z", 0.0),
                ("2", "2026-01-11T10:00:10Z", 0.0),
            ],
        );
        let report = analyze(&input, &IntervalConfig::default()).unwrap();
        let stats = report.stats.unwrap();
        assert_eq!(stats.min_seconds, 10.0);
        assert_eq!(stats.max_seconds, 60.0);
    }

    #[test]
    fn test_analyze_without_intervals() {
        let dir = tempfile::tempdir().unwrap();
        let input = track_file(dir.path(), "one.kml", &[("1", "2026-01-11T10:00:00Z", 0.0)]);
        let report = analyze(&input, &IntervalConfig::default()).unwrap();
        assert!(report.stats.is_none());
        assert!(report.to_string().contains("No time intervals found."));
    }
}
