//! # scanvol
//!
//! Reconstruction and rendering of diagnostic views from volumetric medical
//! scan data (CT/MRI-style intensity grids).
//!
//! The crate is built around two engines sharing one data model:
//!  - a volumetric ray tracer ([`RayTracer`]) that marches camera rays
//!    through loaded volumes, classifies tissue per sample via a Hounsfield
//!    threshold ladder, and shades hits with a bounded reflective bounce
//!    pass, and
//!  - a multi-planar reconstruction engine ([`MprEngine`]) that extracts
//!    axial, sagittal, coronal, oblique, and curved slices with a
//!    selectable interpolation kernel and medical windowing.
//!
//! Volumes live in a caller-owned [`VolumeStore`]; the [`MaterialTable`]
//! maps intensity bands to optical tissue properties. Both engines treat
//! those as read-only inputs, so pixel rows render in parallel via rayon.
//!
//! There is no file or network surface here: volumes are handed over as
//! in-memory grids with known spacing and origin, and results come back as
//! `image` buffers for the surrounding application to display or export.
//!
//! # Examples
//!
//! Reconstruct the axial center slice of a synthetic volume:
//!
//! ```
//! use scanvol::{MprEngine, VolumeGrid, VolumeStore, WindowParams};
//!
//! let mut store = VolumeStore::new();
//! store.load(VolumeGrid::uniform(16, 100.0).expect("valid grid"));
//!
//! let mut engine = MprEngine::with_default_planes(&store);
//! let axial = engine.plane_ids().next().expect("default planes exist");
//! let slice = engine
//!     .render_slice(&store, axial, WindowParams::new(100.0, 1.0))
//!     .expect("slice for a loaded volume");
//! assert_eq!(slice.image.dimensions(), (16, 16));
//! ```

pub mod camera;
pub mod enums;
pub mod material;
pub mod mpr;
pub mod ray;
pub mod raytracer;
mod sampler;
pub mod volume;
pub mod windowing;

pub use camera::{Camera, CameraError};
pub use enums::{Interpolation, Modality, PlaneKind, RenderQuality, VoxelType};
pub use material::{MaterialError, MaterialTable, MedicalMaterial};
pub use mpr::{
    CurveConfig, CurveId, MprEngine, MprPlane, MprSlice, PlaneConfig, PlaneError, PlaneId,
    PlaneUpdate, SliceImage,
};
pub use ray::{HitInfo, Ray};
pub use raytracer::{
    CancelToken, RayTracer, RenderConfig, RenderMetrics, RgbaFloatImage, Traced,
};
pub use volume::{VolumeError, VolumeGrid, VolumeId, VolumeStore};
pub use windowing::{WindowParams, density_to_hounsfield, window_normalize};
