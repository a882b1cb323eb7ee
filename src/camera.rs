use nalgebra::{Point3, Unit, Vector3};
use thiserror::Error;

use crate::ray::Ray;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera position and target coincide")]
    DegenerateView,

    #[error("up vector is parallel to the view direction")]
    DegenerateUp,

    #[error("field of view must lie in (0, 180) degrees")]
    InvalidFov,

    #[error("near plane must be positive and closer than the far plane")]
    InvalidClipPlanes,
}

/// Pinhole camera descriptor for full-image renders.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
    /// Vertical field of view in degrees.
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Validate the descriptor and derive the view basis.
    ///
    /// # Errors
    ///
    /// Degenerate geometry (coincident position/target, up parallel to the
    /// view direction, out-of-range field of view or clip planes) is
    /// rejected here rather than silently normalized.
    pub fn look_at(
        position: Point3<f32>,
        target: Point3<f32>,
        up: Vector3<f32>,
        fov_deg: f32,
    ) -> Result<Self, CameraError> {
        let camera = Self {
            position,
            target,
            up,
            fov_deg,
            near: 0.1,
            far: 1e4,
        };
        camera.basis()?;
        Ok(camera)
    }

    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Result<Self, CameraError> {
        if near <= 0.0 || far <= near {
            return Err(CameraError::InvalidClipPlanes);
        }
        self.near = near;
        self.far = far;
        Ok(self)
    }

    /// Orthonormal view basis (forward, right, up).
    pub(crate) fn basis(
        &self,
    ) -> Result<(Unit<Vector3<f32>>, Unit<Vector3<f32>>, Unit<Vector3<f32>>), CameraError> {
        if !(self.fov_deg > 0.0 && self.fov_deg < 180.0) {
            return Err(CameraError::InvalidFov);
        }
        if self.near <= 0.0 || self.far <= self.near {
            return Err(CameraError::InvalidClipPlanes);
        }
        let forward = Unit::try_new(self.target - self.position, 1e-6)
            .ok_or(CameraError::DegenerateView)?;
        let right = Unit::try_new(forward.cross(&self.up), 1e-6)
            .ok_or(CameraError::DegenerateUp)?;
        let true_up = Unit::new_normalize(right.cross(&forward.into_inner()));
        Ok((forward, right, true_up))
    }

    /// Generate the primary ray through pixel `(px, py)`.
    ///
    /// `jitter` is a sub-pixel offset in `[0, 1)^2`; pass `(0.5, 0.5)` for
    /// the pixel center.
    pub(crate) fn primary_ray(
        &self,
        px: u32,
        py: u32,
        width: u32,
        height: u32,
        jitter: (f32, f32),
        basis: (Unit<Vector3<f32>>, Unit<Vector3<f32>>, Unit<Vector3<f32>>),
    ) -> Ray {
        let (forward, right, up) = basis;
        let aspect = width as f32 / height as f32;
        let half_h = (self.fov_deg.to_radians() * 0.5).tan();
        let half_w = half_h * aspect;

        // NDC in [-1, 1] with y up.
        let ndc_x = 2.0 * (px as f32 + jitter.0) / width as f32 - 1.0;
        let ndc_y = 1.0 - 2.0 * (py as f32 + jitter.1) / height as f32;

        let dir = forward.into_inner()
            + right.into_inner() * (ndc_x * half_w)
            + up.into_inner() * (ndc_y * half_h);
        Ray::new(self.position, dir).with_range(self.near, self.far)
    }
}

/// Deterministic per-pixel jitter sequence for antialiasing.
///
/// A tiny xorshift keeps renders reproducible without pulling in an RNG
/// dependency for two floats per sample.
pub(crate) struct JitterSequence {
    state: u32,
}

impl JitterSequence {
    pub(crate) fn for_pixel(px: u32, py: u32) -> Self {
        let seed = px.wrapping_mul(0x9E37_79B9) ^ py.wrapping_mul(0x85EB_CA6B);
        Self {
            state: seed | 1,
        }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Next offset pair in `[0, 1)^2`.
    pub(crate) fn next_offset(&mut self) -> (f32, f32) {
        let a = (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32;
        let b = (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32;
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_coincident_position_and_target() {
        let result = Camera::look_at(
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(1.0, 2.0, 3.0),
            Vector3::y(),
            45.0,
        );
        assert!(matches!(result, Err(CameraError::DegenerateView)));
    }

    #[test]
    fn rejects_up_parallel_to_view() {
        let result = Camera::look_at(
            Point3::origin(),
            Point3::new(0.0, 5.0, 0.0),
            Vector3::y(),
            45.0,
        );
        assert!(matches!(result, Err(CameraError::DegenerateUp)));
    }

    #[test]
    fn rejects_out_of_range_fov() {
        let result = Camera::look_at(Point3::origin(), Point3::new(0.0, 0.0, -1.0), Vector3::y(), 0.0);
        assert!(matches!(result, Err(CameraError::InvalidFov)));
    }

    #[test]
    fn center_ray_points_at_target() {
        let camera = Camera::look_at(
            Point3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            Vector3::y(),
            60.0,
        )
        .unwrap();
        let basis = camera.basis().unwrap();
        let ray = camera.primary_ray(50, 50, 101, 101, (0.0, 0.0), basis);
        assert_relative_eq!(ray.dir.z, -1.0, epsilon = 1e-2);
        assert_relative_eq!(ray.dir.x, 0.0, epsilon = 1e-2);
    }

    #[test]
    fn jitter_is_deterministic_per_pixel() {
        let a: Vec<_> = {
            let mut seq = JitterSequence::for_pixel(3, 7);
            (0..4).map(|_| seq.next_offset()).collect()
        };
        let b: Vec<_> = {
            let mut seq = JitterSequence::for_pixel(3, 7);
            (0..4).map(|_| seq.next_offset()).collect()
        };
        assert_eq!(a, b);
        for (x, y) in a {
            assert!((0.0..1.0).contains(&x) && (0.0..1.0).contains(&y));
        }
    }
}
