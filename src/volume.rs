use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use ndarray::Array3;
use thiserror::Error;

use crate::enums::{Modality, VoxelType};

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("volume dimensions must all be non-zero")]
    EmptyDimensions,

    #[error("spacing components must all be positive")]
    NonPositiveSpacing,
}

/// Handle to a volume owned by a [`VolumeStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VolumeId(u32);

/// A dense 3D grid of scalar intensity samples with physical placement.
///
/// Data is stored in `(depth, height, width)` index order, i.e. `(z, y, x)`.
/// The grid is immutable once constructed; both engines hold only a shared
/// reference for the duration of a render call.
pub struct VolumeGrid {
    data: Array3<f32>,
    spacing: Vector3<f32>,
    origin: Point3<f32>,
    voxel_type: VoxelType,
    modality: Modality,
    min_value: f32,
    max_value: f32,
    window_width: f32,
    window_level: f32,
}

impl VolumeGrid {
    /// Wrap a dense sample array with its physical placement.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero or any spacing component is
    /// not strictly positive.
    pub fn new(
        data: Array3<f32>,
        spacing: Vector3<f32>,
        origin: Point3<f32>,
        modality: Modality,
    ) -> Result<Self, VolumeError> {
        let (depth, height, width) = data.dim();
        if depth == 0 || height == 0 || width == 0 {
            return Err(VolumeError::EmptyDimensions);
        }
        if spacing.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(VolumeError::NonPositiveSpacing);
        }

        let mut min_value = f32::INFINITY;
        let mut max_value = f32::NEG_INFINITY;
        for &v in data.iter() {
            min_value = min_value.min(v);
            max_value = max_value.max(v);
        }

        let (window_width, window_level) = modality.default_window();
        Ok(Self {
            data,
            spacing,
            origin,
            voxel_type: VoxelType::default(),
            modality,
            min_value,
            max_value,
            window_width,
            window_level,
        })
    }

    pub fn with_voxel_type(mut self, voxel_type: VoxelType) -> Self {
        self.voxel_type = voxel_type;
        self
    }

    pub fn with_default_window(mut self, width: f32, level: f32) -> Self {
        self.window_width = width;
        self.window_level = level;
        self
    }

    /// Uniform cube filled with one intensity. Intended for tests and
    /// calibration scenes.
    pub fn uniform(side: usize, value: f32) -> Result<Self, VolumeError> {
        Self::new(
            Array3::from_elem((side, side, side), value),
            Vector3::new(1.0, 1.0, 1.0),
            Point3::origin(),
            Modality::Unknown,
        )
    }

    /// Cube whose intensity ramps linearly along the x axis.
    pub fn gradient_x(side: usize, low: f32, high: f32) -> Result<Self, VolumeError> {
        let step = (high - low) / (side.max(2) - 1) as f32;
        Self::new(
            Array3::from_shape_fn((side, side, side), |(_, _, x)| low + step * x as f32),
            Vector3::new(1.0, 1.0, 1.0),
            Point3::origin(),
            Modality::Unknown,
        )
    }

    /// Dimensions in `(depth, height, width)` order.
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn spacing(&self) -> Vector3<f32> {
        self.spacing
    }

    pub fn origin(&self) -> Point3<f32> {
        self.origin
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn voxel_type(&self) -> VoxelType {
        self.voxel_type
    }

    pub fn value_range(&self) -> (f32, f32) {
        (self.min_value, self.max_value)
    }

    pub fn default_window(&self) -> (f32, f32) {
        (self.window_width, self.window_level)
    }

    /// Stored intensity at integer voxel coordinates `(x, y, z)`.
    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[[z, y, x]]
    }

    /// Physical extent of the grid per axis.
    pub fn physical_size(&self) -> Vector3<f32> {
        let (depth, height, width) = self.data.dim();
        Vector3::new(
            width as f32 * self.spacing.x,
            height as f32 * self.spacing.y,
            depth as f32 * self.spacing.z,
        )
    }

    /// World-space axis-aligned bounds as `(min, max)` corners.
    pub fn bounds(&self) -> (Point3<f32>, Point3<f32>) {
        (self.origin, self.origin + self.physical_size())
    }

    /// World-space center of the bounding box.
    pub fn centroid(&self) -> Point3<f32> {
        self.origin + self.physical_size() * 0.5
    }

    /// Map a world point into normalized `[0, 1]^3` texture coordinates.
    /// Values outside the unit cube indicate the point lies outside the
    /// volume.
    #[inline]
    pub fn world_to_texture(&self, point: &Point3<f32>) -> Vector3<f32> {
        let size = self.physical_size();
        let rel = point - self.origin;
        Vector3::new(rel.x / size.x, rel.y / size.y, rel.z / size.z)
    }

    /// Intensity normalized by the grid's value range, for density-driven
    /// marching. A constant grid has no contrast and reads as zero density.
    #[inline]
    pub fn normalized(&self, raw: f32) -> f32 {
        let range = self.max_value - self.min_value;
        if range <= f32::EPSILON {
            0.0
        } else {
            (raw - self.min_value) / range
        }
    }

    /// Approximate memory footprint of the sample buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len() * size_of::<f32>()
    }
}

struct StoredVolume {
    grid: VolumeGrid,
    window_override: Option<(f32, f32)>,
}

/// Shared ownership point for loaded volumes.
///
/// Both engines read through this store; the caller owns it and must not
/// remove a volume while a render referencing it is in flight.
#[derive(Default)]
pub struct VolumeStore {
    volumes: HashMap<VolumeId, StoredVolume>,
    next_id: u32,
}

impl VolumeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a grid and return its handle.
    pub fn load(&mut self, grid: VolumeGrid) -> VolumeId {
        let id = VolumeId(self.next_id);
        self.next_id += 1;
        log::debug!(
            "loaded volume {:?}: dim {:?}, modality {:?}",
            id,
            grid.dim(),
            grid.modality()
        );
        self.volumes.insert(
            id,
            StoredVolume {
                grid,
                window_override: None,
            },
        );
        id
    }

    pub fn get(&self, id: VolumeId) -> Option<&VolumeGrid> {
        self.volumes.get(&id).map(|stored| &stored.grid)
    }

    pub fn remove(&mut self, id: VolumeId) -> bool {
        self.volumes.remove(&id).is_some()
    }

    /// Override the display window for a loaded volume. Returns false when
    /// the id is unknown.
    pub fn set_windowing(&mut self, id: VolumeId, width: f32, level: f32) -> bool {
        match self.volumes.get_mut(&id) {
            Some(stored) => {
                stored.window_override = Some((width, level));
                true
            }
            None => false,
        }
    }

    /// Effective (width, level) for a volume: the override if one was set,
    /// else the grid's default.
    pub fn windowing(&self, id: VolumeId) -> Option<(f32, f32)> {
        self.volumes
            .get(&id)
            .map(|stored| stored.window_override.unwrap_or(stored.grid.default_window()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (VolumeId, &VolumeGrid)> {
        self.volumes.iter().map(|(id, stored)| (*id, &stored.grid))
    }

    /// The volume with the lowest id, used as the default target for plane
    /// placement.
    pub fn active(&self) -> Option<(VolumeId, &VolumeGrid)> {
        self.volumes
            .iter()
            .min_by_key(|(id, _)| **id)
            .map(|(id, stored)| (*id, &stored.grid))
    }

    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_non_positive_spacing() {
        let data = Array3::zeros((2, 2, 2));
        let result = VolumeGrid::new(
            data,
            Vector3::new(1.0, 0.0, 1.0),
            Point3::origin(),
            Modality::Ct,
        );
        assert!(matches!(result, Err(VolumeError::NonPositiveSpacing)));
    }

    #[test]
    fn rejects_empty_dimensions() {
        let data = Array3::zeros((0, 2, 2));
        let result = VolumeGrid::new(
            data,
            Vector3::new(1.0, 1.0, 1.0),
            Point3::origin(),
            Modality::Ct,
        );
        assert!(matches!(result, Err(VolumeError::EmptyDimensions)));
    }

    #[test]
    fn voxel_accessor_uses_xyz_order() {
        let mut data = Array3::zeros((2, 3, 4));
        data[[1, 2, 3]] = 7.0;
        let grid = VolumeGrid::new(
            data,
            Vector3::new(1.0, 1.0, 1.0),
            Point3::origin(),
            Modality::Unknown,
        )
        .unwrap();
        assert_relative_eq!(grid.voxel(3, 2, 1), 7.0);
    }

    #[test]
    fn value_range_tracks_data() {
        let grid = VolumeGrid::gradient_x(4, -100.0, 300.0).unwrap();
        let (min, max) = grid.value_range();
        assert_relative_eq!(min, -100.0);
        assert_relative_eq!(max, 300.0);
    }

    #[test]
    fn centroid_is_half_physical_size() {
        let grid = VolumeGrid::new(
            Array3::zeros((4, 4, 4)),
            Vector3::new(0.5, 0.5, 2.0),
            Point3::new(10.0, 0.0, 0.0),
            Modality::Ct,
        )
        .unwrap();
        let c = grid.centroid();
        assert_relative_eq!(c.x, 11.0);
        assert_relative_eq!(c.y, 1.0);
        assert_relative_eq!(c.z, 4.0);
    }

    #[test]
    fn store_load_get_remove() {
        let mut store = VolumeStore::new();
        let id = store.load(VolumeGrid::uniform(2, 1.0).unwrap());
        assert!(store.get(id).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.remove(id));
        assert!(!store.remove(id));
        assert!(store.get(id).is_none());
    }

    #[test]
    fn windowing_override_and_unknown_id() {
        let mut store = VolumeStore::new();
        let id = store.load(VolumeGrid::uniform(2, 1.0).unwrap());
        assert_eq!(store.windowing(id), Some(Modality::Unknown.default_window()));
        assert!(store.set_windowing(id, 400.0, 40.0));
        assert_eq!(store.windowing(id), Some((400.0, 40.0)));

        store.remove(id);
        assert!(!store.set_windowing(id, 1.0, 0.0));
        assert_eq!(store.windowing(id), None);
    }

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut store = VolumeStore::new();
        let first = store.load(VolumeGrid::uniform(2, 0.0).unwrap());
        store.remove(first);
        let second = store.load(VolumeGrid::uniform(2, 0.0).unwrap());
        assert_ne!(first, second);
    }
}
