//! Medical windowing and intensity mapping.
//!
//! All functions here are pure; applying the same window twice to the same
//! raw sample yields the same result.

/// Window/level parameters plus the modality rescale transform applied
/// before windowing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowParams {
    pub level: f32,
    pub width: f32,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
}

impl WindowParams {
    pub fn new(level: f32, width: f32) -> Self {
        Self {
            level,
            width,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
        }
    }

    pub fn with_rescale(mut self, slope: f32, intercept: f32) -> Self {
        self.rescale_slope = slope;
        self.rescale_intercept = intercept;
        self
    }

    /// Map a raw sample to a display intensity in [0, 1].
    pub fn apply(&self, sample: f32) -> f32 {
        let hounsfield = sample * self.rescale_slope + self.rescale_intercept;
        window_normalize(hounsfield, self.level, self.width)
    }

    /// Stable bit pattern for cache keying.
    pub(crate) fn key_bits(&self) -> [u32; 4] {
        [
            self.level.to_bits(),
            self.width.to_bits(),
            self.rescale_slope.to_bits(),
            self.rescale_intercept.to_bits(),
        ]
    }
}

/// Normalize a Hounsfield value against `[level - width/2, level + width/2]`,
/// clamped to [0, 1].
pub fn window_normalize(hounsfield: f32, level: f32, width: f32) -> f32 {
    let lower = level - width / 2.0;
    ((hounsfield - lower) / width).clamp(0.0, 1.0)
}

/// Approximate Hounsfield value for a normalized density sample.
///
/// Placeholder linear mapping used by the ray marcher; the calibrated
/// slope/intercept path belongs to MPR windowing.
pub fn density_to_hounsfield(density: f32) -> f32 {
    (density - 0.5) * 2000.0 - 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn window_center_maps_to_half() {
        assert_relative_eq!(window_normalize(40.0, 40.0, 400.0), 0.5);
    }

    #[test]
    fn window_clamps_to_unit_range() {
        assert_eq!(window_normalize(-5000.0, 40.0, 400.0), 0.0);
        assert_eq!(window_normalize(5000.0, 40.0, 400.0), 1.0);
    }

    #[test]
    fn windowing_is_idempotent_per_parameters() {
        let params = WindowParams::new(100.0, 200.0).with_rescale(2.0, -1024.0);
        let raw = 587.5;
        assert_eq!(params.apply(raw), params.apply(raw));
    }

    #[test]
    fn density_mapping_covers_hounsfield_range() {
        assert_relative_eq!(density_to_hounsfield(0.0), -2000.0);
        assert_relative_eq!(density_to_hounsfield(0.5), -1000.0);
        assert_relative_eq!(density_to_hounsfield(1.0), 0.0);
    }
}
