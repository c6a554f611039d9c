//! Soil material properties
//!
//! Stresses are tensile-positive and carried in kN/m²; unit weights in kN/m³;
//! strength angles are stored in degrees (wire convention) and converted to
//! radians inside the kernels that consume them.

use serde::{Deserialize, Serialize};

use crate::math::Mat3;

/// Bulk modulus of water used for the undrained volumetric penalty (kPa)
pub const WATER_BULK_MODULUS: f64 = 2.2e6;
/// Porosity assumed by the undrained volumetric penalty
pub const PENALTY_POROSITY: f64 = 0.3;
/// Unit weight of water (kN/m³)
pub const GAMMA_WATER: f64 = 9.81;

/// Constitutive model selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialModel {
    #[default]
    LinearElastic,
    MohrCoulomb,
}

/// Drainage behaviour of a soil layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainageType {
    /// Pore pressures known from the water table, effective-stress update
    #[default]
    Drained,
    /// Effective-stress update with a volumetric pore-pressure penalty
    UndrainedA,
    /// Like A, but strength from the undrained shear strength s_u
    UndrainedB,
    /// Total-stress update with s_u, no pore pressures
    UndrainedC,
    /// No pore phase at all (e.g. concrete)
    NonPorous,
}

impl DrainageType {
    /// Whether steady pore pressures from the water table act on this
    /// material inside the element kernels.
    pub fn has_steady_pwp(&self) -> bool {
        matches!(self, DrainageType::Drained | DrainageType::UndrainedA)
    }

    /// Whether the volumetric penalty formulation applies
    pub fn is_penalized(&self) -> bool {
        matches!(self, DrainageType::UndrainedA | DrainageType::UndrainedB)
    }
}

/// Material record as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: String,
    /// Total-stress Young's modulus (kN/m²), used by UndrainedC/NonPorous
    #[serde(rename = "youngsModulus", default)]
    pub youngs_modulus: f64,
    /// Drained (effective) Young's modulus E' (kN/m²)
    #[serde(rename = "effyoungsModulus", default)]
    pub eff_youngs_modulus: f64,
    #[serde(rename = "poissonsRatio")]
    pub poissons_ratio: f64,
    #[serde(rename = "unitWeightUnsaturated")]
    pub unit_weight_unsaturated: f64,
    #[serde(rename = "unitWeightSaturated", default)]
    pub unit_weight_saturated: Option<f64>,
    #[serde(default)]
    pub cohesion: Option<f64>,
    /// Friction angle φ in degrees
    #[serde(rename = "frictionAngle", default)]
    pub friction_angle: Option<f64>,
    #[serde(rename = "undrainedShearStrength", default)]
    pub undrained_shear_strength: Option<f64>,
    /// Dilation angle ψ in degrees
    #[serde(rename = "dilationAngle", default)]
    pub dilation_angle: Option<f64>,
    #[serde(default)]
    pub thickness: Option<f64>,
    #[serde(default)]
    pub permeability: Option<f64>,
    #[serde(rename = "voidRatio", default)]
    pub void_ratio: Option<f64>,
    #[serde(rename = "specificGravity", default)]
    pub specific_gravity: Option<f64>,
    #[serde(default)]
    pub material_model: MaterialModel,
    #[serde(default)]
    pub drainage_type: DrainageType,
    /// Lateral earth pressure coefficient; auto-derived when absent
    #[serde(default)]
    pub k0_x: Option<f64>,
    #[serde(default)]
    pub k0_z: Option<f64>,
}

impl Material {
    /// Young's modulus entering the elastic D matrix for this drainage type.
    ///
    /// Total-stress branches stiffen with the undrained (total) modulus,
    /// everything else with the drained modulus E'.
    pub fn stiffness_modulus(&self) -> f64 {
        match self.drainage_type {
            DrainageType::UndrainedC | DrainageType::NonPorous => self.youngs_modulus,
            _ => self.eff_youngs_modulus,
        }
    }

    /// Plane-strain elastic constitutive matrix (3x3)
    pub fn elastic_d_matrix(&self) -> Mat3 {
        let e = self.stiffness_modulus();
        let nu = self.poissons_ratio;
        let factor = e / ((1.0 + nu) * (1.0 - 2.0 * nu));
        factor
            * Mat3::new(
                1.0 - nu,
                nu,
                0.0,
                nu,
                1.0 - nu,
                0.0,
                0.0,
                0.0,
                (1.0 - 2.0 * nu) / 2.0,
            )
    }

    /// Saturated unit weight with the unsaturated value as fallback
    pub fn gamma_saturated(&self) -> f64 {
        self.unit_weight_saturated
            .filter(|g| *g > 0.0)
            .unwrap_or(self.unit_weight_unsaturated)
    }

    /// Unit weight at a point, given whether it sits below the water table.
    /// NonPorous materials carry a single weight regardless of submergence.
    pub fn unit_weight(&self, submerged: bool) -> f64 {
        if submerged && self.drainage_type != DrainageType::NonPorous {
            self.gamma_saturated()
        } else {
            self.unit_weight_unsaturated
        }
    }

    /// Volumetric penalty modulus for the undrained A/B formulation:
    /// K_w / n capped at ten times the skeleton bulk modulus.
    pub fn volumetric_penalty(&self) -> f64 {
        if !self.drainage_type.is_penalized() {
            return 0.0;
        }
        let e_skel = if self.eff_youngs_modulus > 0.0 {
            self.eff_youngs_modulus
        } else {
            10_000.0
        };
        let nu = if self.poissons_ratio > 0.0 {
            self.poissons_ratio
        } else {
            0.3
        };
        let k_skel = e_skel / (3.0 * (1.0 - 2.0 * nu));
        (WATER_BULK_MODULUS / PENALTY_POROSITY).min(10.0 * k_skel)
    }

    /// Lateral earth pressure coefficient with the fallback chain
    /// k0_x → 1 − sin φ → ν/(1 − ν) (ν capped at 0.499) → 0.5.
    pub fn k0_coefficient(&self) -> f64 {
        if let Some(k0) = self.k0_x {
            return k0;
        }
        let phi = self.friction_angle.unwrap_or(0.0);
        if phi > 0.0 {
            return 1.0 - phi.to_radians().sin();
        }
        let nu = self.poissons_ratio;
        if nu > 0.0 {
            let nu_eff = nu.min(0.499);
            return nu_eff / (1.0 - nu_eff);
        }
        0.5
    }

    /// Strength parameters (c, φ in degrees) for the yield check of this
    /// drainage branch. Total-stress strength branches use (s_u, 0).
    pub fn strength_parameters(&self) -> (f64, f64) {
        match self.drainage_type {
            DrainageType::UndrainedB | DrainageType::UndrainedC => {
                (self.undrained_shear_strength.unwrap_or(0.0), 0.0)
            }
            _ => (
                self.cohesion.unwrap_or(0.0),
                self.friction_angle.unwrap_or(0.0),
            ),
        }
    }

    /// Soft parameter checks surfaced as log warnings at setup time
    pub fn validation_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let nu = self.poissons_ratio;
        if !(0.0..0.5).contains(&nu) || nu == 0.0 {
            warnings.push(format!(
                "material '{}': Poisson's ratio {} outside (0, 0.5)",
                self.id, nu
            ));
        }
        if let Some(gsat) = self.unit_weight_saturated {
            if gsat < self.unit_weight_unsaturated {
                warnings.push(format!(
                    "material '{}': saturated unit weight {} below unsaturated {}",
                    self.id, gsat, self.unit_weight_unsaturated
                ));
            }
        }
        if let Some(c) = self.cohesion {
            if c < 0.0 {
                warnings.push(format!("material '{}': negative cohesion {}", self.id, c));
            }
        }
        let psi = self.dilation_angle.unwrap_or(0.0);
        let phi = self.friction_angle.unwrap_or(0.0);
        if psi < 0.0 || psi > phi {
            warnings.push(format!(
                "material '{}': dilation angle {} outside [0, {}]",
                self.id, psi, phi
            ));
        }
        warnings
    }
}
