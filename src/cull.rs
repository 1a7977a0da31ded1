//! Distance-based culling of an ordered track.
//!
//! Single pass, single anchor: the first point is always kept and becomes the
//! anchor; every later point is kept only when it lies at least
//! `min_distance_meters` from the current anchor, and then becomes the new
//! anchor. Dropped points never move the anchor.
//!
//! This samples points, it does not preserve the polyline shape. A point just
//! short of the threshold is dropped even if the next kept point is far away.

use log::debug;

use crate::geo_utils::haversine_distance;
use crate::{GpsPoint, Positioned};

/// Default minimum spacing between kept points.
pub const DEFAULT_MIN_DISTANCE_METERS: f64 = 50.0;

/// Configuration for culling.
#[derive(Debug, Clone)]
pub struct CullConfig {
    /// Minimum great-circle distance from the last kept point.
    /// Default: 50.0 meters
    pub min_distance_meters: f64,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            min_distance_meters: DEFAULT_MIN_DISTANCE_METERS,
        }
    }
}

/// Points kept by [`cull_by_distance`].
#[derive(Debug, Clone)]
pub struct CullResult<T> {
    pub kept: Vec<T>,
    /// Number of points fed in
    pub input_count: usize,
}

impl<T> CullResult<T> {
    pub fn kept_count(&self) -> usize {
        self.kept.len()
    }

    pub fn dropped_count(&self) -> usize {
        self.input_count - self.kept.len()
    }

    /// Share of input points dropped, in percent. `None` for empty input.
    pub fn reduction_percent(&self) -> Option<f64> {
        if self.input_count == 0 {
            return None;
        }
        Some((1.0 - self.kept.len() as f64 / self.input_count as f64) * 100.0)
    }
}

/// Keep only points at least `config.min_distance_meters` from the previously
/// kept point. The first point is always kept.
///
/// # Example
/// ```
/// use track_merger::{cull_by_distance, CullConfig, GpsPoint};
///
/// let track = vec![
///     GpsPoint::new(0.0, 0.0),
///     GpsPoint::new(0.0, 0.0001), // ~11 m
///     GpsPoint::new(0.0, 0.001),  // ~111 m
/// ];
/// let result = cull_by_distance(track, &CullConfig::default());
/// assert_eq!(result.kept.len(), 2);
/// assert_eq!(result.reduction_percent().map(|p| p.round()), Some(33.0));
/// ```
pub fn cull_by_distance<T, I>(points: I, config: &CullConfig) -> CullResult<T>
where
    T: Positioned,
    I: IntoIterator<Item = T>,
{
    let mut kept = Vec::new();
    let mut anchor: Option<GpsPoint> = None;
    let mut input_count = 0;

    for point in points {
        input_count += 1;
        let position = point.position();
        let keep = match anchor {
            None => true,
            Some(last) => haversine_distance(&last, &position) >= config.min_distance_meters,
        };
        if keep {
            anchor = Some(position);
            kept.push(point);
        }
    }

    debug!(
        "[Cull] Kept {} of {} points at {}m",
        kept.len(),
        input_count,
        config.min_distance_meters
    );

    CullResult { kept, input_count }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::{haversine_distance, EARTH_RADIUS_METERS};

    /// Point `meters` east of the origin along the equator.
    fn east(meters: f64) -> GpsPoint {
        GpsPoint::new(0.0, (meters / EARTH_RADIUS_METERS).to_degrees())
    }

    fn config(min_distance_meters: f64) -> CullConfig {
        CullConfig {
            min_distance_meters,
        }
    }

    #[test]
    fn test_empty_input() {
        let result = cull_by_distance(Vec::<GpsPoint>::new(), &CullConfig::default());
        assert!(result.kept.is_empty());
        assert_eq!(result.input_count, 0);
        assert_eq!(result.reduction_percent(), None);
    }

    #[test]
    fn test_single_point_kept() {
        let result = cull_by_distance(vec![east(0.0)], &CullConfig::default());
        assert_eq!(result.kept, vec![east(0.0)]);
        assert_eq!(result.reduction_percent(), Some(0.0));
    }

    #[test]
    fn test_anchor_does_not_advance_on_drop() {
        // 0, 10, 80 from origin: the 10 m point is dropped, 80 m is kept
        let track = vec![east(0.0), east(10.0), east(80.0)];
        let result = cull_by_distance(track.clone(), &config(50.0));
        assert_eq!(result.kept, vec![track[0], track[2]]);
        assert_eq!(result.dropped_count(), 1);
    }

    #[test]
    fn test_drops_measured_from_anchor_not_neighbour() {
        // Each step is 30 m, so each point is < 50 m from its neighbour but
        // every second point is >= 50 m from the anchor.
        let track: Vec<_> = (0..5).map(|i| east(30.0 * i as f64)).collect();
        let result = cull_by_distance(track.clone(), &config(50.0));
        assert_eq!(result.kept, vec![track[0], track[2], track[4]]);
    }

    #[test]
    fn test_kept_points_respect_threshold() {
        let track: Vec<_> = (0..200)
            .map(|i| GpsPoint::new(51.5 + (i as f64 * 0.37).sin() * 0.001, -0.12 + i as f64 * 0.0001))
            .collect();
        let result = cull_by_distance(track.clone(), &config(50.0));

        assert_eq!(result.kept[0], track[0]);
        assert!(result
            .kept
            .windows(2)
            .all(|w| haversine_distance(&w[0], &w[1]) >= 50.0));
    }

    #[test]
    fn test_higher_threshold_never_keeps_more() {
        let track: Vec<_> = (0..100).map(|i| east(7.0 * i as f64)).collect();
        let mut previous = usize::MAX;
        for threshold in [0.0, 5.0, 20.0, 50.0, 120.0, 1000.0] {
            let kept = cull_by_distance(track.clone(), &config(threshold)).kept_count();
            assert!(kept <= track.len());
            assert!(kept <= previous, "threshold {threshold} kept {kept} > {previous}");
            previous = kept;
        }
    }

    #[test]
    fn test_zero_threshold_keeps_everything() {
        let track = vec![east(0.0), east(0.0), east(1.0)];
        assert_eq!(cull_by_distance(track, &config(0.0)).kept_count(), 3);
    }
}
