//! Screen-space error metric driving split/merge decisions.

use terra_config::LodConfig;

/// Projects a node's geometric error onto the screen and compares it with a
/// pixel tolerance.
///
/// `rho = geometric_error(level) / max(1, distance) * k`, where `k` is the
/// number of pixels one world unit subtends at unit distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenErrorMetric {
    k: f32,
    tolerance: f32,
}

impl ScreenErrorMetric {
    /// Build the metric from display width and vertical field of view.
    #[must_use]
    pub fn from_projection(display_width: u32, fov_y_radians: f32, tolerance: f32) -> Self {
        let k = display_width as f32 / (2.0 * (fov_y_radians * 0.5).tan());
        Self::with_constant(k, tolerance)
    }

    /// Build the metric from an explicit projection constant.
    ///
    /// # Panics
    ///
    /// Panics if `k` or `tolerance` is not positive.
    #[must_use]
    pub fn with_constant(k: f32, tolerance: f32) -> Self {
        assert!(k > 0.0, "projection constant must be positive");
        assert!(tolerance > 0.0, "pixel tolerance must be positive");
        Self { k, tolerance }
    }

    #[must_use]
    pub fn from_config(config: &LodConfig) -> Self {
        Self::from_projection(
            config.display_width,
            config.fov_y_degrees.to_radians(),
            config.pixel_tolerance,
        )
    }

    /// World-space error of a node at `level`. Coarser levels are penalized more.
    #[must_use]
    pub fn geometric_error(level: u8) -> f32 {
        (1u32 << level) as f32
    }

    /// Screen-space error in pixels of drawing a node at `level` seen from `distance`.
    #[must_use]
    pub fn screen_error(&self, level: u8, distance: f32) -> f32 {
        Self::geometric_error(level) / distance.max(1.0) * self.k
    }

    /// Whether a node at `level` and `distance` may be drawn at its own resolution.
    #[must_use]
    pub fn accepts(&self, level: u8, distance: f32) -> bool {
        level == 0 || self.screen_error(level, distance) <= self.tolerance
    }

    #[must_use]
    pub fn projection_constant(&self) -> f32 {
        self.k
    }

    #[must_use]
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_constant() {
        // tan(45deg) == 1, so k == width / 2
        let metric = ScreenErrorMetric::from_projection(800, 90f32.to_radians(), 1.0);
        assert!((metric.projection_constant() - 400.0).abs() < 1e-3);
    }

    #[test]
    fn test_geometric_error_doubles_per_level() {
        assert_eq!(ScreenErrorMetric::geometric_error(0), 1.0);
        assert_eq!(ScreenErrorMetric::geometric_error(3), 8.0);
    }

    /// Distances below one unit are clamped so the error stays finite.
    #[test]
    fn test_distance_clamped_to_one() {
        let metric = ScreenErrorMetric::with_constant(100.0, 10.0);
        assert_eq!(metric.screen_error(2, 0.0), 400.0);
        assert_eq!(metric.screen_error(2, 0.5), 400.0);
        assert_eq!(metric.screen_error(2, 40.0), 10.0);
    }

    #[test]
    fn test_accepts_at_tolerance_boundary() {
        let metric = ScreenErrorMetric::with_constant(100.0, 10.0);
        assert!(metric.accepts(2, 40.0));
        assert!(!metric.accepts(2, 39.0));
    }

    #[test]
    fn test_finest_level_always_accepted() {
        let metric = ScreenErrorMetric::with_constant(1000.0, 0.5);
        assert!(metric.accepts(0, 0.0));
    }

    /// Error decreases monotonically with distance.
    #[test]
    fn test_error_monotonic_in_distance() {
        let metric = ScreenErrorMetric::from_config(&LodConfig::default());
        let mut prev = f32::INFINITY;
        for d in [0.0, 1.0, 10.0, 100.0, 1000.0, 10_000.0] {
            let rho = metric.screen_error(3, d);
            assert!(rho <= prev, "error must not grow with distance: d={d}, rho={rho}");
            prev = rho;
        }
    }

    #[test]
    #[should_panic(expected = "tolerance must be positive")]
    fn test_zero_tolerance_panics() {
        let _ = ScreenErrorMetric::with_constant(1.0, 0.0);
    }
}
