//! Input file discovery.
//!
//! The input may be a directory (all `*.kml` files directly inside it), a glob
//! pattern, or a single file. Results are sorted by path so that the
//! first-seen rule of the merge does not depend on file-system enumeration
//! order.

use std::path::{Path, PathBuf};

use glob::Pattern;
use log::{debug, warn};

use crate::error::Result;

fn is_pattern(input: &str) -> bool {
    input.contains(['*', '?', '['])
}

/// Find the KML files named by `input`, sorted, with `exclude` (typically the
/// output file) left out.
///
/// A directory or pattern that matches nothing yields an empty list; only a
/// malformed pattern is an error.
pub fn discover_inputs(input: &str, exclude: Option<&Path>) -> Result<Vec<PathBuf>> {
    let candidate = Path::new(input);
    let pattern = if is_pattern(input) {
        input.to_string()
    } else if candidate.is_file() {
        return Ok(filter_excluded(vec![candidate.to_path_buf()], exclude));
    } else {
        format!("{}/*.kml", Pattern::escape(input.trim_end_matches('/')))
    };

    debug!("[Discovery] Matching {pattern}");
    let mut files: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("[Discovery] Cannot read {}: {}", e.path().display(), e.error());
                None
            }
        })
        .filter(|path| path.is_file())
        .collect();
    files.sort();

    Ok(filter_excluded(files, exclude))
}

fn filter_excluded(files: Vec<PathBuf>, exclude: Option<&Path>) -> Vec<PathBuf> {
    let Some(exclude) = exclude.and_then(|p| std::path::absolute(p).ok()) else {
        return files;
    };
    files
        .into_iter()
        .filter(|f| std::path::absolute(f).map_or(true, |abs| abs != exclude))
        .collect()
}
