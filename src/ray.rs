use nalgebra::{Point3, Unit, Vector3};

use crate::material::MedicalMaterial;

/// A parametric ray through world space.
///
/// Valid hits lie within `[t_min, t_max]`. Rays are constructed per sample
/// and never persisted.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub dir: Unit<Vector3<f32>>,
    pub t_min: f32,
    pub t_max: f32,
}

impl Ray {
    pub fn new(origin: Point3<f32>, dir: Vector3<f32>) -> Self {
        Self {
            origin,
            dir: Unit::new_normalize(dir),
            t_min: 1e-4,
            t_max: 1e9,
        }
    }

    pub fn with_range(mut self, t_min: f32, t_max: f32) -> Self {
        self.t_min = t_min;
        self.t_max = t_max;
        self
    }

    #[inline]
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.dir.into_inner() * t
    }

    /// Mirror reflection `R = I - 2(I.N)N` about a surface normal, starting
    /// just off the surface to avoid self-intersection.
    pub fn reflect(&self, point: Point3<f32>, normal: Unit<Vector3<f32>>) -> Self {
        let incident = self.dir.into_inner();
        let normal = normal.into_inner();
        let reflected = incident - normal * (2.0 * incident.dot(&normal));
        Self::new(point + reflected * 1e-3, reflected)
    }

    /// Whether the parametric range contains any traversable span.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.t_max < self.t_min
    }
}

/// Result of marching a ray through a volume.
#[derive(Clone, Debug)]
pub struct HitInfo {
    /// Parametric distance at which the march terminated.
    pub t: f32,
    pub point: Point3<f32>,
    pub normal: Unit<Vector3<f32>>,
    /// Material resolved for the dominant sample along the march.
    pub material: MedicalMaterial,
    /// Total density accumulated before termination.
    pub accumulated_density: f32,
    /// Density-weighted color accumulated along the march.
    pub accumulated_color: [f32; 3],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn direction_is_normalized() {
        let ray = Ray::new(Point3::origin(), Vector3::new(0.0, 0.0, 10.0));
        assert_relative_eq!(ray.dir.norm(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn point_at_walks_the_ray() {
        let ray = Ray::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 0.0));
        let p = ray.point_at(2.5);
        assert_relative_eq!(p.y, 2.5);
        assert_relative_eq!(p.x, 1.0);
    }

    #[test]
    fn reflection_mirrors_about_the_normal() {
        let ray = Ray::new(Point3::new(0.0, 1.0, 0.0), Vector3::new(1.0, -1.0, 0.0));
        let normal = Unit::new_normalize(Vector3::new(0.0, 1.0, 0.0));
        let bounced = ray.reflect(Point3::origin(), normal);
        assert_relative_eq!(bounced.dir.x, ray.dir.x, epsilon = 1e-6);
        assert_relative_eq!(bounced.dir.y, -ray.dir.y, epsilon = 1e-6);
    }

    #[test]
    fn inverted_range_is_degenerate() {
        let ray = Ray::new(Point3::origin(), Vector3::x()).with_range(5.0, 1.0);
        assert!(ray.is_degenerate());
    }
}
