use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use image::{ImageBuffer, Rgba};
use nalgebra::{Point3, Unit, Vector3};
use rayon::prelude::*;
use web_time::Instant;

use crate::camera::{Camera, CameraError, JitterSequence};
use crate::enums::{Interpolation, RenderQuality};
use crate::material::{MaterialTable, MedicalMaterial};
use crate::ray::{HitInfo, Ray};
use crate::sampler::Sampler;
use crate::volume::{VolumeGrid, VolumeStore};
use crate::windowing::density_to_hounsfield;

/// Linear RGBA float image produced by [`RayTracer::render_image`].
pub type RgbaFloatImage = ImageBuffer<Rgba<f32>, Vec<f32>>;

/// Accumulated density at which a march stops early.
const DENSITY_SATURATION: f32 = 0.95;
/// Minimum accumulated density for a march to count as a hit.
const DENSITY_VISIBILITY: f32 = 0.01;
/// Reflection contribution scale for glossy tissue.
const REFLECTION_SCALE: f32 = 0.1;
/// Ambient floor so unlit tissue stays readable.
const AMBIENT: f32 = 0.2;

/// Tuning knobs for a full-image render.
#[derive(Clone, Copy, Debug)]
pub struct RenderConfig {
    /// Reflection bounce budget; marching always terminates within this
    /// many traces per primary ray.
    pub max_ray_depth: u32,
    pub samples_per_pixel: u32,
    /// March step length in world units.
    pub step_size: f32,
    /// Enables the reflective bounce pass.
    pub global_illumination: bool,
    pub quality: RenderQuality,
    pub background: [f32; 4],
    /// Direction the key light travels, toward the scene.
    pub key_light_dir: Vector3<f32>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_ray_depth: 3,
            samples_per_pixel: 1,
            step_size: 0.5,
            global_illumination: true,
            quality: RenderQuality::Standard,
            background: [0.05, 0.05, 0.08, 1.0],
            key_light_dir: Vector3::new(-0.5, -1.0, -0.3),
        }
    }
}

/// Diagnostics snapshot populated by the most recent render.
#[derive(Clone, Copy, Debug, Default)]
pub struct RenderMetrics {
    pub rays_traced: u64,
    pub duration: Duration,
    /// Output buffer plus referenced volume data, in bytes.
    pub buffer_bytes: usize,
}

/// Cooperative cancellation handle checked between pixel-row batches.
///
/// A cancelled render discards its partial image; callers never observe
/// torn output.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Result of tracing one primary ray.
#[derive(Clone, Debug)]
pub struct Traced {
    pub color: [f32; 4],
    /// Distance to the first hit, infinite on a miss.
    pub depth: f32,
    pub normal: Option<Unit<Vector3<f32>>>,
    pub material: Option<MedicalMaterial>,
}

/// Volumetric ray tracer over the shared volume store and material table.
///
/// Stateless per call except for the metrics snapshot; pixel rows render in
/// parallel against read-only volume data.
pub struct RayTracer {
    config: RenderConfig,
    key_light: Unit<Vector3<f32>>,
    metrics: RenderMetrics,
}

impl RayTracer {
    pub fn new(config: RenderConfig) -> Self {
        let key_light = Unit::new_normalize(config.key_light_dir);
        Self {
            config,
            key_light,
            metrics: RenderMetrics::default(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Metrics from the most recent completed render.
    pub fn metrics(&self) -> RenderMetrics {
        self.metrics
    }

    /// Render a full image through the camera.
    ///
    /// Returns `Ok(None)` when the render was cancelled; partial images are
    /// never returned. An empty store yields a uniform background image of
    /// the requested dimensions.
    ///
    /// # Errors
    ///
    /// Fails when the camera geometry is degenerate.
    pub fn render_image(
        &mut self,
        store: &VolumeStore,
        materials: &MaterialTable,
        width: u32,
        height: u32,
        camera: &Camera,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<RgbaFloatImage>, CameraError> {
        let basis = camera.basis()?;
        let spp = (self.config.samples_per_pixel * self.config.quality.sample_multiplier()).max(1);
        let started = Instant::now();
        let ray_counter = AtomicU64::new(0);

        log::debug!(
            "render {}x{} at {} spp over {} volume(s)",
            width,
            height,
            spp,
            store.len()
        );

        let rows: Option<Vec<Vec<f32>>> = (0..height)
            .into_par_iter()
            .map(|py| {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    return None;
                }
                let mut row = Vec::with_capacity(width as usize * 4);
                let mut rays_in_row = 0u64;
                for px in 0..width {
                    let mut accum = [0.0f32; 4];
                    let mut jitter = JitterSequence::for_pixel(px, py);
                    for sample in 0..spp {
                        let offset = if spp == 1 && sample == 0 {
                            (0.5, 0.5)
                        } else {
                            jitter.next_offset()
                        };
                        let ray = camera.primary_ray(px, py, width, height, offset, basis);
                        let (traced, spawned) = self.trace_inner(store, materials, ray);
                        rays_in_row += spawned;
                        for (slot, channel) in accum.iter_mut().zip(traced.color) {
                            *slot += channel;
                        }
                    }
                    row.extend(accum.map(|c| c / spp as f32));
                }
                ray_counter.fetch_add(rays_in_row, Ordering::Relaxed);
                Some(row)
            })
            .collect();

        let Some(rows) = rows else {
            log::debug!("render cancelled after {:?}", started.elapsed());
            return Ok(None);
        };

        let pixels: Vec<f32> = rows.into_iter().flatten().collect();
        let volume_bytes: usize = store.iter().map(|(_, grid)| grid.byte_size()).sum();
        self.metrics = RenderMetrics {
            rays_traced: ray_counter.load(Ordering::Relaxed),
            duration: started.elapsed(),
            buffer_bytes: pixels.len() * size_of::<f32>() + volume_bytes,
        };

        // from_raw only fails on a length mismatch, which the row loop rules out.
        Ok(ImageBuffer::from_raw(width, height, pixels))
    }

    /// Trace one ray to a final color.
    ///
    /// Reflection is an explicit depth-bounded loop: the mirror chain is
    /// linear, so each bounce folds its shaded color into the running total
    /// with weight `(1 - roughness) * 0.1` relative to its predecessor.
    pub fn trace_ray(&self, store: &VolumeStore, materials: &MaterialTable, ray: Ray) -> Traced {
        self.trace_inner(store, materials, ray).0
    }

    fn trace_inner(
        &self,
        store: &VolumeStore,
        materials: &MaterialTable,
        mut ray: Ray,
    ) -> (Traced, u64) {
        let background = self.config.background;
        let mut color = [0.0f32; 3];
        let mut alpha = background[3];
        let mut weight = 1.0f32;
        let mut traced = Traced {
            color: background,
            depth: f32::INFINITY,
            normal: None,
            material: None,
        };
        let mut rays_spawned = 0u64;

        for bounce in 0..self.config.max_ray_depth.max(1) {
            rays_spawned += 1;
            let Some(hit) = self.march(store, materials, &ray) else {
                for (slot, channel) in color.iter_mut().zip(&background[..3]) {
                    *slot += weight * channel;
                }
                break;
            };

            let shaded = self.shade(&hit);
            for (slot, channel) in color.iter_mut().zip(shaded) {
                *slot += weight * channel;
            }

            if bounce == 0 {
                alpha = 1.0;
                traced.depth = hit.t;
                traced.normal = Some(hit.normal);
                traced.material = Some(hit.material.clone());
            }

            if !self.config.global_illumination {
                break;
            }
            let next_weight = weight * (1.0 - hit.material.roughness) * REFLECTION_SCALE;
            if next_weight <= 1e-3 {
                break;
            }
            ray = ray.reflect(hit.point, hit.normal);
            weight = next_weight;
        }

        traced.color = [color[0], color[1], color[2], alpha];
        (traced, rays_spawned)
    }

    /// March the ray through every loaded volume and keep the nearest hit.
    fn march(
        &self,
        store: &VolumeStore,
        materials: &MaterialTable,
        ray: &Ray,
    ) -> Option<HitInfo> {
        if ray.is_degenerate() {
            return None;
        }
        let mut nearest: Option<HitInfo> = None;
        for (_, grid) in store.iter() {
            if let Some(hit) = self.march_volume(grid, materials, ray)
                && nearest.as_ref().is_none_or(|best| hit.t < best.t)
            {
                nearest = Some(hit);
            }
        }
        nearest
    }

    fn march_volume(
        &self,
        grid: &VolumeGrid,
        materials: &MaterialTable,
        ray: &Ray,
    ) -> Option<HitInfo> {
        let (t_entry, t_exit) = intersect_aabb(grid, ray)?;
        let step = self.config.step_size.max(1e-3);

        let mut accumulated_density = 0.0f32;
        let mut accumulated_color = [0.0f32; 3];
        let mut dominant: Option<(f32, MedicalMaterial)> = None;
        let mut t = t_entry;
        let mut stop_t = t_exit;

        while t <= t_exit {
            let point = ray.point_at(t);
            let uvw = grid.world_to_texture(&point);
            if let Some(raw) = Sampler::sample(grid, uvw, Interpolation::Trilinear) {
                let density = grid.normalized(raw);
                if density > 0.0 {
                    let hounsfield = density_to_hounsfield(density);
                    let material = materials.classify(hounsfield);
                    let contribution = density * step;
                    for (slot, albedo) in accumulated_color.iter_mut().zip(material.albedo) {
                        *slot += albedo * contribution;
                    }
                    accumulated_density += contribution;
                    if dominant.as_ref().is_none_or(|(best, _)| density > *best) {
                        dominant = Some((density, material.clone()));
                    }
                    if accumulated_density >= DENSITY_SATURATION {
                        stop_t = t;
                        break;
                    }
                }
            }
            t += step;
        }

        if accumulated_density <= DENSITY_VISIBILITY {
            return None;
        }
        let (_, material) = dominant?;
        let point = ray.point_at(stop_t);
        let normal = self.density_gradient_normal(grid, &point, ray);
        Some(HitInfo {
            t: stop_t,
            point,
            normal,
            material,
            accumulated_density,
            accumulated_color,
        })
    }

    /// Surface normal from the negated central-difference density gradient.
    fn density_gradient_normal(
        &self,
        grid: &VolumeGrid,
        point: &Point3<f32>,
        ray: &Ray,
    ) -> Unit<Vector3<f32>> {
        let spacing = grid.spacing();
        let eps = spacing.min() * 0.5;
        let mut gradient = Vector3::zeros();
        for axis in 0..3 {
            let mut offset = Vector3::zeros();
            offset[axis] = eps;
            let ahead = self.density_at(grid, &(point + offset));
            let behind = self.density_at(grid, &(point - offset));
            gradient[axis] = (ahead - behind) / (2.0 * eps);
        }
        // Flat density fields have no usable gradient; face the viewer.
        Unit::try_new(-gradient, 1e-6)
            .unwrap_or_else(|| Unit::new_normalize(-ray.dir.into_inner()))
    }

    #[inline]
    fn density_at(&self, grid: &VolumeGrid, point: &Point3<f32>) -> f32 {
        let uvw = grid.world_to_texture(point);
        Sampler::sample(grid, uvw, Interpolation::Trilinear)
            .map(|raw| grid.normalized(raw))
            .unwrap_or(0.0)
    }

    /// Lambertian shading against the fixed key light, with the albedo
    /// brightened by clinical relevance.
    fn shade(&self, hit: &HitInfo) -> [f32; 3] {
        let emphasis = 1.0 + hit.material.clinical_relevance * 0.2;
        let lambert = hit
            .normal
            .dot(&-self.key_light.into_inner())
            .max(0.0);
        let lighting = AMBIENT + (1.0 - AMBIENT) * lambert;
        hit.material
            .albedo
            .map(|channel| (channel * emphasis * lighting).clamp(0.0, 1.0))
    }
}

/// Slab test clipping the ray's parametric range to the volume bounds.
fn intersect_aabb(grid: &VolumeGrid, ray: &Ray) -> Option<(f32, f32)> {
    let (min, max) = grid.bounds();
    let mut t0 = ray.t_min;
    let mut t1 = ray.t_max;
    for axis in 0..3 {
        let dir = ray.dir[axis];
        let origin = ray.origin[axis];
        if dir.abs() < 1e-9 {
            if origin < min[axis] || origin > max[axis] {
                return None;
            }
            continue;
        }
        let inv = 1.0 / dir;
        let mut near = (min[axis] - origin) * inv;
        let mut far = (max[axis] - origin) * inv;
        if near > far {
            std::mem::swap(&mut near, &mut far);
        }
        t0 = t0.max(near);
        t1 = t1.min(far);
        if t0 > t1 {
            return None;
        }
    }
    Some((t0, t1))
}
