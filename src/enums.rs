/// Imaging modality the volume was acquired with.
///
/// Determines the default display window when the caller does not supply one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Modality {
    Ct,
    Mr,
    #[default]
    Unknown,
}

impl Modality {
    /// Default (window width, window level) for the modality.
    pub fn default_window(&self) -> (f32, f32) {
        match self {
            Modality::Ct => (400.0, 40.0),
            Modality::Mr => (600.0, 300.0),
            Modality::Unknown => (1.0, 0.5),
        }
    }
}

/// Storage precision of the source scan data.
///
/// Samples are held as `f32` internally; this tag records what they were
/// converted from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VoxelType {
    UInt8,
    Int16,
    UInt16,
    #[default]
    Float32,
}

/// Reconstruction kernel used when sampling the volume between voxel centers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// Single nearest-voxel lookup.
    Nearest,
    /// Weighted blend of the 8 enclosing voxels.
    #[default]
    Trilinear,
    /// Cubic basis weights over a 4x4x4 neighborhood. Taps outside the
    /// volume are skipped and the remaining weights renormalized.
    Tricubic,
    /// 4x4 sub-pixel grid of trilinear taps, averaged.
    AntialiasedLinear,
}

impl Interpolation {
    /// Parse a kernel name. Unrecognized names fall back to trilinear.
    pub fn from_name(name: &str) -> Self {
        match name {
            "nearest" => Interpolation::Nearest,
            "linear" | "trilinear" => Interpolation::Trilinear,
            "cubic" | "tricubic" => Interpolation::Tricubic,
            "antialiased" => Interpolation::AntialiasedLinear,
            other => {
                log::warn!("unknown interpolation '{other}', falling back to trilinear");
                Interpolation::Trilinear
            }
        }
    }
}

/// Orientation family of a reconstruction plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    #[default]
    Axial,
    Sagittal,
    Coronal,
    Oblique,
    Curved,
}

/// Quality tier for full-image renders. Scales samples per pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderQuality {
    Draft,
    #[default]
    Standard,
    High,
}

impl RenderQuality {
    pub(crate) fn sample_multiplier(&self) -> u32 {
        match self {
            RenderQuality::Draft | RenderQuality::Standard => 1,
            RenderQuality::High => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_interpolation_name_falls_back_to_trilinear() {
        assert_eq!(Interpolation::from_name("quintic"), Interpolation::Trilinear);
        assert_eq!(Interpolation::from_name(""), Interpolation::Trilinear);
    }

    #[test]
    fn interpolation_names_parse() {
        assert_eq!(Interpolation::from_name("nearest"), Interpolation::Nearest);
        assert_eq!(Interpolation::from_name("cubic"), Interpolation::Tricubic);
        assert_eq!(
            Interpolation::from_name("antialiased"),
            Interpolation::AntialiasedLinear
        );
    }
}
