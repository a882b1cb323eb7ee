//! Multi-planar reconstruction.
//!
//! Planes are created against the shared volume store, carry a derived
//! local-to-world transform, and render to windowed intensity/alpha slices.
//! Rendered slices are cached per (plane, window, kernel) with a short TTL;
//! any plane mutation evicts that plane's entries before the call returns,
//! so a reader never pairs new geometry with a stale image.

use std::collections::HashMap;
use std::time::Duration;

use image::{ImageBuffer, Luma, LumaA};
use nalgebra::{Matrix4, Point3, Unit, Vector3, Vector4};
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

use crate::enums::{Interpolation, PlaneKind};
use crate::sampler::Sampler;
use crate::volume::{VolumeGrid, VolumeId, VolumeStore};
use crate::windowing::WindowParams;

/// Intensity + alpha slice buffer.
pub type SliceImage = ImageBuffer<LumaA<f32>, Vec<f32>>;

/// Cached slices older than this are recomputed.
const SLICE_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PlaneError {
    #[error("plane normal or up vector is degenerate or parallel")]
    DegenerateOrientation,

    #[error("plane output dimensions must be non-zero")]
    EmptyOutput,

    #[error("pixel spacing must be positive")]
    NonPositiveSpacing,

    #[error("curved reformation needs at least two control points")]
    TooFewControlPoints,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlaneId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CurveId(u32);

/// Caller-facing plane description.
#[derive(Clone, Debug)]
pub struct PlaneConfig {
    pub kind: PlaneKind,
    pub position: Point3<f32>,
    pub normal: Vector3<f32>,
    pub up: Vector3<f32>,
    /// Output slice size in pixels.
    pub width: u32,
    pub height: u32,
    /// Slab thickness in world units; recorded on the slice metadata.
    pub thickness: f32,
    /// World units per output pixel.
    pub pixel_spacing: f32,
    pub opacity: f32,
    pub interpolation: Interpolation,
}

impl PlaneConfig {
    /// Axis-aligned starter config looking along the anatomical axis.
    pub fn axis_aligned(kind: PlaneKind, position: Point3<f32>, width: u32, height: u32) -> Self {
        let (normal, up) = match kind {
            PlaneKind::Sagittal => (Vector3::x(), Vector3::z()),
            PlaneKind::Coronal => (-Vector3::y(), Vector3::z()),
            _ => (Vector3::z(), Vector3::y()),
        };
        Self {
            kind,
            position,
            normal,
            up,
            width,
            height,
            thickness: 1.0,
            pixel_spacing: 1.0,
            opacity: 1.0,
            interpolation: Interpolation::default(),
        }
    }
}

/// Partial plane mutation; unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct PlaneUpdate {
    pub position: Option<Point3<f32>>,
    pub normal: Option<Vector3<f32>>,
    pub up: Option<Vector3<f32>>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thickness: Option<f32>,
    pub pixel_spacing: Option<f32>,
    pub visible: Option<bool>,
    pub opacity: Option<f32>,
    pub interpolation: Option<Interpolation>,
}

/// A reconstruction plane with its derived transform.
#[derive(Clone, Debug)]
pub struct MprPlane {
    id: PlaneId,
    kind: PlaneKind,
    position: Point3<f32>,
    normal: Unit<Vector3<f32>>,
    up: Unit<Vector3<f32>>,
    width: u32,
    height: u32,
    thickness: f32,
    pixel_spacing: f32,
    visible: bool,
    opacity: f32,
    interpolation: Interpolation,
    local_to_world: Matrix4<f32>,
}

impl MprPlane {
    fn from_config(id: PlaneId, config: &PlaneConfig) -> Result<Self, PlaneError> {
        if config.width == 0 || config.height == 0 {
            return Err(PlaneError::EmptyOutput);
        }
        if config.pixel_spacing <= 0.0 {
            return Err(PlaneError::NonPositiveSpacing);
        }
        let (normal, up) = orthonormal_orientation(config.normal, config.up)?;
        let mut plane = Self {
            id,
            kind: config.kind,
            position: config.position,
            normal,
            up,
            width: config.width,
            height: config.height,
            thickness: config.thickness.max(0.0),
            pixel_spacing: config.pixel_spacing,
            visible: true,
            opacity: config.opacity.clamp(0.0, 1.0),
            interpolation: config.interpolation,
            local_to_world: Matrix4::identity(),
        };
        plane.recompute_transform();
        Ok(plane)
    }

    /// Rebuild the 4x4 local-to-world transform from the orientation fields.
    /// Must run after every orientation mutation.
    fn recompute_transform(&mut self) {
        let right = Unit::new_normalize(self.up.cross(&self.normal.into_inner()));
        let true_up = Unit::new_normalize(self.normal.cross(&right.into_inner()));
        self.local_to_world = Matrix4::from_columns(&[
            right.into_inner().push(0.0),
            true_up.into_inner().push(0.0),
            self.normal.into_inner().push(0.0),
            self.position.coords.push(1.0),
        ]);
    }

    /// Map plane-local pixel coordinates to a world point.
    #[inline]
    fn pixel_to_world(&self, px: u32, py: u32) -> Point3<f32> {
        let lx = (px as f32 + 0.5 - self.width as f32 / 2.0) * self.pixel_spacing;
        let ly = (py as f32 + 0.5 - self.height as f32 / 2.0) * self.pixel_spacing;
        let world = self.local_to_world * Vector4::new(lx, ly, 0.0, 1.0);
        Point3::new(world.x, world.y, world.z)
    }

    pub fn id(&self) -> PlaneId {
        self.id
    }

    pub fn kind(&self) -> PlaneKind {
        self.kind
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn normal(&self) -> Unit<Vector3<f32>> {
        self.normal
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn local_to_world(&self) -> &Matrix4<f32> {
        &self.local_to_world
    }
}

fn orthonormal_orientation(
    normal: Vector3<f32>,
    up: Vector3<f32>,
) -> Result<(Unit<Vector3<f32>>, Unit<Vector3<f32>>), PlaneError> {
    let normal = Unit::try_new(normal, 1e-6).ok_or(PlaneError::DegenerateOrientation)?;
    let up = Unit::try_new(up, 1e-6).ok_or(PlaneError::DegenerateOrientation)?;
    if normal.cross(&up.into_inner()).norm() < 1e-6 {
        return Err(PlaneError::DegenerateOrientation);
    }
    Ok((normal, up))
}

/// Reconstructed slice plus its acquisition metadata.
#[derive(Clone, Debug)]
pub struct MprSlice {
    pub plane_id: PlaneId,
    pub image: SliceImage,
    pub position: Point3<f32>,
    pub orientation: Unit<Vector3<f32>>,
    pub pixel_spacing: f32,
    pub thickness: f32,
    pub window_level: f32,
    pub window_width: f32,
    pub interpolation: Interpolation,
    pub render_duration: Duration,
}

impl MprSlice {
    /// 8-bit grayscale export of the windowed intensities.
    pub fn to_luma8(&self) -> ImageBuffer<Luma<u8>, Vec<u8>> {
        let (width, height) = self.image.dimensions();
        let pixels: Vec<u8> = self
            .image
            .pixels()
            .map(|p| (p.0[0] * 255.0).clamp(0.0, 255.0) as u8)
            .collect();
        ImageBuffer::from_raw(width, height, pixels)
            .unwrap_or_else(|| ImageBuffer::new(width, height))
    }
}

/// Sampling path that is not a flat plane.
///
/// The path is piecewise-linear between control points (C0 across spans);
/// each path point carries a local frame for column sampling.
#[derive(Clone, Debug)]
pub struct CurveConfig {
    pub control_points: Vec<Point3<f32>>,
    /// Interpolated points per control-point span.
    pub segments_per_span: u32,
    /// Output image height in pixels.
    pub output_height: u32,
    /// World units between vertical samples.
    pub sample_spacing: f32,
    /// Hint for the vertical axis of each local frame.
    pub up_hint: Vector3<f32>,
    pub interpolation: Interpolation,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            control_points: Vec::new(),
            segments_per_span: 16,
            output_height: 64,
            sample_spacing: 1.0,
            up_hint: Vector3::z(),
            interpolation: Interpolation::default(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct SliceKey {
    plane: PlaneId,
    window: [u32; 4],
    interpolation: Interpolation,
}

struct CachedSlice {
    stamp: Instant,
    slice: MprSlice,
}

/// The reconstruction engine: plane registry, slice cache, curved paths.
#[derive(Default)]
pub struct MprEngine {
    planes: HashMap<PlaneId, MprPlane>,
    curves: HashMap<CurveId, CurveConfig>,
    cache: HashMap<SliceKey, CachedSlice>,
    target: Option<VolumeId>,
    next_plane: u32,
    next_curve: u32,
}

impl MprEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine seeded with axial, sagittal, and coronal planes centered on
    /// the store's active volume.
    pub fn with_default_planes(store: &VolumeStore) -> Self {
        let mut engine = Self::new();
        let Some((id, grid)) = store.active() else {
            return engine;
        };
        engine.target = Some(id);
        let centroid = grid.centroid();
        let size = grid.physical_size();
        let spacing = grid.spacing().min();

        for kind in [PlaneKind::Axial, PlaneKind::Sagittal, PlaneKind::Coronal] {
            let (w, h) = match kind {
                PlaneKind::Axial => (size.x, size.y),
                PlaneKind::Sagittal => (size.y, size.z),
                _ => (size.x, size.z),
            };
            let mut config = PlaneConfig::axis_aligned(
                kind,
                centroid,
                (w / spacing).round().max(1.0) as u32,
                (h / spacing).round().max(1.0) as u32,
            );
            config.pixel_spacing = spacing;
            // Orientation defaults are axis-aligned and valid.
            if let Ok(plane_id) = engine.create_plane(config) {
                log::debug!("default {kind:?} plane {plane_id:?} at {centroid:?}");
            }
        }
        engine
    }

    /// Pin reconstruction to one volume instead of the store's active one.
    pub fn set_target_volume(&mut self, id: VolumeId) {
        self.target = Some(id);
    }

    pub fn create_plane(&mut self, config: PlaneConfig) -> Result<PlaneId, PlaneError> {
        let id = PlaneId(self.next_plane);
        let plane = MprPlane::from_config(id, &config)?;
        self.next_plane += 1;
        self.planes.insert(id, plane);
        Ok(id)
    }

    pub fn plane(&self, id: PlaneId) -> Option<&MprPlane> {
        self.planes.get(&id)
    }

    pub fn plane_ids(&self) -> impl Iterator<Item = PlaneId> + '_ {
        self.planes.keys().copied()
    }

    /// Apply a partial update, recompute the transform, and evict the
    /// plane's cached slices in one step. Returns `Ok(false)` for an
    /// unknown id.
    ///
    /// # Errors
    ///
    /// Rejects updates that would leave the orientation degenerate or the
    /// output empty; the plane is left unchanged in that case.
    pub fn update_plane(&mut self, id: PlaneId, update: PlaneUpdate) -> Result<bool, PlaneError> {
        let Some(plane) = self.planes.get_mut(&id) else {
            return Ok(false);
        };

        let normal = update.normal.unwrap_or_else(|| plane.normal.into_inner());
        let up = update.up.unwrap_or_else(|| plane.up.into_inner());
        let (normal, up) = orthonormal_orientation(normal, up)?;
        let width = update.width.unwrap_or(plane.width);
        let height = update.height.unwrap_or(plane.height);
        if width == 0 || height == 0 {
            return Err(PlaneError::EmptyOutput);
        }
        let pixel_spacing = update.pixel_spacing.unwrap_or(plane.pixel_spacing);
        if pixel_spacing <= 0.0 {
            return Err(PlaneError::NonPositiveSpacing);
        }

        plane.normal = normal;
        plane.up = up;
        plane.width = width;
        plane.height = height;
        plane.pixel_spacing = pixel_spacing;
        if let Some(position) = update.position {
            plane.position = position;
        }
        if let Some(thickness) = update.thickness {
            plane.thickness = thickness.max(0.0);
        }
        if let Some(visible) = update.visible {
            plane.visible = visible;
        }
        if let Some(opacity) = update.opacity {
            plane.opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(interpolation) = update.interpolation {
            plane.interpolation = interpolation;
        }
        plane.recompute_transform();

        self.evict_plane(id);
        Ok(true)
    }

    /// Remove a plane and its cached slices.
    pub fn remove_plane(&mut self, id: PlaneId) -> bool {
        let removed = self.planes.remove(&id).is_some();
        if removed {
            self.evict_plane(id);
        }
        removed
    }

    fn evict_plane(&mut self, id: PlaneId) {
        self.cache.retain(|key, _| key.plane != id);
    }

    fn target_grid<'a>(&self, store: &'a VolumeStore) -> Option<&'a VolumeGrid> {
        match self.target {
            Some(id) => store.get(id),
            None => store.active().map(|(_, grid)| grid),
        }
    }

    /// Reconstruct a windowed slice for the plane.
    ///
    /// Returns `None` for an unknown or invisible plane or when no volume is
    /// loaded. A fresh cache entry is returned verbatim, so repeated calls
    /// with unchanged parameters yield bit-identical images.
    pub fn render_slice(
        &mut self,
        store: &VolumeStore,
        id: PlaneId,
        window: WindowParams,
    ) -> Option<MprSlice> {
        let plane = self.planes.get(&id)?;
        if !plane.visible {
            log::trace!("plane {id:?} invisible, skipping reconstruction");
            return None;
        }
        let grid = self.target_grid(store)?;

        let key = SliceKey {
            plane: id,
            window: window.key_bits(),
            interpolation: plane.interpolation,
        };
        if let Some(cached) = self.cache.get(&key)
            && cached.stamp.elapsed() < SLICE_TTL
        {
            log::trace!("slice cache hit for plane {id:?}");
            return Some(cached.slice.clone());
        }

        let started = Instant::now();
        let slice = reconstruct_slice(plane, grid, window, started);
        self.cache.insert(
            key,
            CachedSlice {
                stamp: started,
                slice: slice.clone(),
            },
        );
        Some(slice)
    }

    pub fn create_curved_reformation(&mut self, config: CurveConfig) -> Result<CurveId, PlaneError> {
        if config.control_points.len() < 2 {
            return Err(PlaneError::TooFewControlPoints);
        }
        if config.output_height == 0 {
            return Err(PlaneError::EmptyOutput);
        }
        if config.sample_spacing <= 0.0 {
            return Err(PlaneError::NonPositiveSpacing);
        }
        let id = CurveId(self.next_curve);
        self.next_curve += 1;
        self.curves.insert(id, config);
        Ok(id)
    }

    pub fn remove_curved_reformation(&mut self, id: CurveId) -> bool {
        self.curves.remove(&id).is_some()
    }

    /// Render a curved reformation: path points become image columns, each
    /// sampled along its local vertical axis.
    pub fn render_curved_reformation(
        &self,
        store: &VolumeStore,
        id: CurveId,
        window: WindowParams,
    ) -> Option<SliceImage> {
        let config = self.curves.get(&id)?;
        let grid = self.target_grid(store)?;

        let path = sample_path(&config.control_points, config.segments_per_span);
        let frames = local_frames(&path, config.up_hint);
        let width = frames.len() as u32;
        let height = config.output_height;

        let pixels: Vec<f32> = (0..height)
            .into_par_iter()
            .flat_map_iter(|py| {
                let config = &config;
                let frames = &frames;
                (0..width).flat_map(move |px| {
                    let (center, vertical) = frames[px as usize];
                    let offset =
                        (py as f32 + 0.5 - height as f32 / 2.0) * config.sample_spacing;
                    let world = center + vertical * offset;
                    let uvw = grid.world_to_texture(&world);
                    match Sampler::sample(grid, uvw, config.interpolation) {
                        Some(raw) => [window.apply(raw), 1.0],
                        None => [0.0, 0.0],
                    }
                })
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixels)
    }

    #[cfg(test)]
    fn cached_plane_ids(&self) -> Vec<PlaneId> {
        self.cache.keys().map(|key| key.plane).collect()
    }
}

fn reconstruct_slice(
    plane: &MprPlane,
    grid: &VolumeGrid,
    window: WindowParams,
    started: Instant,
) -> MprSlice {
    let (width, height) = (plane.width, plane.height);
    let pixels: Vec<f32> = (0..height)
        .into_par_iter()
        .flat_map_iter(|py| {
            (0..width).flat_map(move |px| {
                let world = plane.pixel_to_world(px, py);
                let uvw = grid.world_to_texture(&world);
                match Sampler::sample(grid, uvw, plane.interpolation) {
                    // Out-of-bounds samples contribute nothing, not zero.
                    Some(raw) => [window.apply(raw), plane.opacity],
                    None => [0.0, 0.0],
                }
            })
        })
        .collect();

    // Length is width * height * 2 by construction.
    let image = ImageBuffer::from_raw(width, height, pixels)
        .unwrap_or_else(|| ImageBuffer::new(width, height));

    MprSlice {
        plane_id: plane.id,
        image,
        position: plane.position,
        orientation: plane.normal,
        pixel_spacing: plane.pixel_spacing,
        thickness: plane.thickness,
        window_level: window.level,
        window_width: window.width,
        interpolation: plane.interpolation,
        render_duration: started.elapsed(),
    }
}

/// Piecewise-linear path through the control points: `segments` samples per
/// span plus the final endpoint.
fn sample_path(control_points: &[Point3<f32>], segments_per_span: u32) -> Vec<Point3<f32>> {
    let segments = segments_per_span.max(1);
    let mut path = Vec::with_capacity(control_points.len() * segments as usize);
    for pair in control_points.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for step in 0..segments {
            let t = step as f32 / segments as f32;
            path.push(a + (b - a) * t);
        }
    }
    if let Some(last) = control_points.last() {
        path.push(*last);
    }
    path
}

/// Per-point sampling frames: path point plus a vertical axis orthogonal to
/// the local tangent.
fn local_frames(path: &[Point3<f32>], up_hint: Vector3<f32>) -> Vec<(Point3<f32>, Vector3<f32>)> {
    let hint = if up_hint.norm() > 1e-6 {
        up_hint.normalize()
    } else {
        Vector3::z()
    };
    path.iter()
        .enumerate()
        .map(|(i, &point)| {
            let tangent = if i + 1 < path.len() {
                path[i + 1] - point
            } else if i > 0 {
                point - path[i - 1]
            } else {
                Vector3::x()
            };
            let tangent = Unit::try_new(tangent, 1e-6)
                .map(Unit::into_inner)
                .unwrap_or_else(Vector3::x);
            let mut vertical = hint - tangent * hint.dot(&tangent);
            if vertical.norm() < 1e-6 {
                // Hint parallel to the tangent; pick any perpendicular.
                let alt = if tangent.x.abs() < 0.9 {
                    Vector3::x()
                } else {
                    Vector3::y()
                };
                vertical = alt - tangent * alt.dot(&tangent);
            }
            (point, vertical.normalize())
        })
        .collect()
}
