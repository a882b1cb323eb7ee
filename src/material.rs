//! Optical material properties for tissue classes.
//!
//! Each material bundles the optical response used by the shader with the
//! medical metadata that drives classification and display emphasis. A
//! [`MaterialTable`] maps Hounsfield values onto materials through a
//! strictly monotonic threshold ladder, so exactly one material resolves
//! for any sampled density.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("threshold {0} is already registered")]
    DuplicateThreshold(f32),

    #[error("threshold must be finite")]
    NonFiniteThreshold,
}

/// Optical and medical properties of one tissue class.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicalMaterial {
    pub name: &'static str,

    /// RGB reflectance in [0, 1] per channel.
    pub albedo: [f32; 3],

    /// 0.0 = mirror-like, 1.0 = fully diffuse.
    pub roughness: f32,
    pub metallic: f32,

    /// Fraction of light passing through the tissue.
    pub transmission: f32,
    pub ior: f32,
    pub absorption: f32,
    pub scattering: f32,

    /// Physical density in g/cm3.
    pub density: f32,

    /// Representative Hounsfield value for this class.
    pub hounsfield: f32,

    /// Diagnostic emphasis in [0, 1]; brightens the shaded color.
    pub clinical_relevance: f32,
}

impl MedicalMaterial {
    pub const AIR: Self = Self {
        name: "air",
        albedo: [0.02, 0.02, 0.03],
        roughness: 1.0,
        metallic: 0.0,
        transmission: 0.98,
        ior: 1.0,
        absorption: 0.0,
        scattering: 0.01,
        density: 0.001,
        hounsfield: -1000.0,
        clinical_relevance: 0.1,
    };

    pub const LUNG: Self = Self {
        name: "lung",
        albedo: [0.55, 0.35, 0.35],
        roughness: 0.9,
        metallic: 0.0,
        transmission: 0.6,
        ior: 1.05,
        absorption: 0.2,
        scattering: 0.4,
        density: 0.3,
        hounsfield: -700.0,
        clinical_relevance: 0.6,
    };

    pub const FAT: Self = Self {
        name: "fat",
        albedo: [0.85, 0.75, 0.45],
        roughness: 0.8,
        metallic: 0.0,
        transmission: 0.3,
        ior: 1.3,
        absorption: 0.3,
        scattering: 0.5,
        density: 0.92,
        hounsfield: -100.0,
        clinical_relevance: 0.4,
    };

    pub const SOFT_TISSUE: Self = Self {
        name: "soft tissue",
        albedo: [0.75, 0.5, 0.45],
        roughness: 0.75,
        metallic: 0.0,
        transmission: 0.2,
        ior: 1.36,
        absorption: 0.4,
        scattering: 0.6,
        density: 1.05,
        hounsfield: 40.0,
        clinical_relevance: 0.7,
    };

    pub const BLOOD: Self = Self {
        name: "blood",
        albedo: [0.6, 0.08, 0.08],
        roughness: 0.6,
        metallic: 0.0,
        transmission: 0.15,
        ior: 1.35,
        absorption: 0.5,
        scattering: 0.7,
        density: 1.06,
        hounsfield: 200.0,
        clinical_relevance: 0.85,
    };

    pub const BONE: Self = Self {
        name: "bone",
        albedo: [0.92, 0.9, 0.85],
        roughness: 0.4,
        metallic: 0.0,
        transmission: 0.02,
        ior: 1.55,
        absorption: 0.8,
        scattering: 0.2,
        density: 1.9,
        hounsfield: 1000.0,
        clinical_relevance: 0.9,
    };
}

/// Monotonic Hounsfield threshold ladder resolving samples to materials.
///
/// A sample belongs to the first band whose upper bound exceeds it; values
/// above every bound resolve to the terminal material.
#[derive(Debug, Clone)]
pub struct MaterialTable {
    bands: Vec<(f32, MedicalMaterial)>,
    terminal: MedicalMaterial,
}

impl Default for MaterialTable {
    /// The stock diagnostic ladder: air below -500 HU, soft tissue below
    /// 100, blood below 400, bone above.
    fn default() -> Self {
        Self {
            bands: vec![
                (-500.0, MedicalMaterial::AIR),
                (100.0, MedicalMaterial::SOFT_TISSUE),
                (400.0, MedicalMaterial::BLOOD),
            ],
            terminal: MedicalMaterial::BONE,
        }
    }
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a Hounsfield value to its material.
    pub fn classify(&self, hounsfield: f32) -> &MedicalMaterial {
        self.bands
            .iter()
            .find(|(bound, _)| hounsfield < *bound)
            .map(|(_, material)| material)
            .unwrap_or(&self.terminal)
    }

    /// Register a new band with the given upper Hounsfield bound.
    ///
    /// # Errors
    ///
    /// Rejects non-finite bounds and bounds already present in the ladder;
    /// existing bands are replaced through [`MaterialTable::replace`], not
    /// re-registered.
    pub fn register(&mut self, bound: f32, material: MedicalMaterial) -> Result<(), MaterialError> {
        if !bound.is_finite() {
            return Err(MaterialError::NonFiniteThreshold);
        }
        if self.bands.iter().any(|(existing, _)| *existing == bound) {
            return Err(MaterialError::DuplicateThreshold(bound));
        }
        let at = self
            .bands
            .iter()
            .position(|(existing, _)| bound < *existing)
            .unwrap_or(self.bands.len());
        self.bands.insert(at, (bound, material));
        Ok(())
    }

    /// Replace the material of an existing band. Returns false when no band
    /// has that bound.
    pub fn replace(&mut self, bound: f32, material: MedicalMaterial) -> bool {
        match self
            .bands
            .iter_mut()
            .find(|(existing, _)| *existing == bound)
        {
            Some((_, slot)) => {
                *slot = material;
                true
            }
            None => false,
        }
    }

    /// Replace the material used above every registered bound.
    pub fn replace_terminal(&mut self, material: MedicalMaterial) {
        self.terminal = material;
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_ladder_matches_diagnostic_bands() {
        let table = MaterialTable::default();
        assert_eq!(table.classify(-800.0).name, "air");
        assert_eq!(table.classify(-499.9).name, "soft tissue");
        assert_eq!(table.classify(250.0).name, "blood");
        assert_eq!(table.classify(400.0).name, "bone");
        assert_eq!(table.classify(2000.0).name, "bone");
    }

    #[test]
    fn boundary_values_resolve_to_upper_band() {
        let table = MaterialTable::default();
        assert_eq!(table.classify(-500.0).name, "soft tissue");
        assert_eq!(table.classify(100.0).name, "blood");
    }

    #[test]
    fn register_keeps_ladder_sorted() {
        let mut table = MaterialTable::default();
        table.register(-150.0, MedicalMaterial::FAT).unwrap();
        table.register(-650.0, MedicalMaterial::LUNG).unwrap();
        assert_eq!(table.classify(-700.0).name, "lung");
        assert_eq!(table.classify(-300.0).name, "fat");
        assert_eq!(table.classify(0.0).name, "soft tissue");
    }

    #[test]
    fn duplicate_threshold_is_rejected() {
        let mut table = MaterialTable::default();
        let result = table.register(100.0, MedicalMaterial::FAT);
        assert!(matches!(result, Err(MaterialError::DuplicateThreshold(_))));
    }

    #[test]
    fn replace_swaps_material_in_place() {
        let mut table = MaterialTable::default();
        assert!(table.replace(400.0, MedicalMaterial::BONE));
        assert_eq!(table.classify(200.0).name, "bone");
        assert!(!table.replace(123.0, MedicalMaterial::FAT));
    }
}
