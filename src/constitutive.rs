//! Mohr–Coulomb plasticity and the drainage-aware stress update
//!
//! Sign convention is tensile-positive throughout: compressive stresses and
//! compressive pore pressures are negative. Strength angles arrive in
//! degrees and are converted here.
//!
//! The return map is a radial correction in the principal plane: the
//! deviatoric radius is scaled down to the target set by the cohesion line,
//! reusing the trial (cos 2θ, sin 2θ) direction, with a tension cut-off at
//! the apex. The elastic D is kept as the tangent (modified Newton), which
//! trades quadratic convergence for robustness near the apex.

use crate::elements::{DrainageType, Material, MaterialModel};
use crate::math::{Mat3, Vec3};

/// Yield values below this count as elastic
pub const YIELD_TOLERANCE: f64 = 1e-6;

/// Mohr–Coulomb yield function in principal-stress form:
/// f = (σ_max − σ_min) + (σ_max + σ_min)·sin φ − 2·c·cos φ
pub fn mohr_coulomb_yield(sig_xx: f64, sig_yy: f64, sig_xy: f64, c: f64, phi_deg: f64) -> f64 {
    let phi = phi_deg.to_radians();
    let (sin_phi, cos_phi) = (phi.sin(), phi.cos());

    let s_avg = (sig_xx + sig_yy) / 2.0;
    let radius = (((sig_xx - sig_yy) / 2.0).powi(2) + sig_xy.powi(2)).sqrt();

    let sig_max = s_avg + radius;
    let sig_min = s_avg - radius;

    (sig_max - sig_min) + (sig_max + sig_min) * sin_phi - 2.0 * c * cos_phi
}

/// Radial return of an inadmissible trial stress onto the yield surface.
///
/// Returns the corrected stress and whether plastic correction occurred.
pub fn return_mapping(trial: &Vec3, c: f64, phi_deg: f64) -> (Vec3, bool) {
    let f_trial = mohr_coulomb_yield(trial[0], trial[1], trial[2], c, phi_deg);
    if f_trial <= YIELD_TOLERANCE {
        return (*trial, false);
    }

    let phi = phi_deg.to_radians();
    let (sin_phi, cos_phi) = (phi.sin(), phi.cos());

    let mut s_avg = (trial[0] + trial[1]) / 2.0;
    let radius_trial = (((trial[0] - trial[1]) / 2.0).powi(2) + trial[2].powi(2)).sqrt();

    // Target deviatoric diameter on the cohesion line
    let mut q_target = 2.0 * c * cos_phi - 2.0 * s_avg * sin_phi;

    if q_target < 0.0 {
        q_target = 0.0;
        // Tension cut-off: cap the mean stress at the apex
        if sin_phi > 0.0 {
            let apex = c * cos_phi / sin_phi;
            if s_avg > apex {
                s_avg = apex;
            }
        }
    }

    let scale = if radius_trial > 1e-9 {
        (q_target / (2.0 * radius_trial)).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let radius = radius_trial * scale;

    // Keep the trial principal direction
    let (cos_2t, sin_2t) = if radius_trial > 1e-9 {
        (
            (trial[0] - trial[1]) / (2.0 * radius_trial),
            trial[2] / radius_trial,
        )
    } else {
        (1.0, 0.0)
    };

    let corrected = Vec3::new(
        s_avg + radius * cos_2t,
        s_avg - radius * cos_2t,
        radius * sin_2t,
    );
    (corrected, true)
}

/// Strength reduction for safety analysis: c/ξ and arctan(tan φ / ξ).
pub fn reduced_strength(c: f64, phi_deg: f64, xi: f64) -> (f64, f64) {
    let c_red = c / xi;
    let phi_red = if phi_deg > 0.0 {
        (phi_deg.to_radians().tan() / xi).atan().to_degrees()
    } else {
        phi_deg
    };
    (c_red, phi_red)
}

/// Outcome of one Gauss-point stress update
#[derive(Debug, Clone, Copy)]
pub struct StressUpdate {
    /// New total stress
    pub stress: Vec3,
    /// New excess pore pressure
    pub pwp_excess: f64,
    pub yielded: bool,
}

/// Advance the stress state at one Gauss point by the strain increment
/// `d_eps`, branching on the material's drainage type.
///
/// `srm_factor` carries the current ξ of a safety phase; `None` leaves
/// strengths unreduced.
#[allow(clippy::too_many_arguments)]
pub fn update_stress(
    material: &Material,
    d_elastic: &Mat3,
    penalty: f64,
    stress_start: &Vec3,
    pwp_excess_start: f64,
    pwp_steady: f64,
    d_eps: &Vec3,
    srm_factor: Option<f64>,
) -> StressUpdate {
    let is_mc = material.material_model == MaterialModel::MohrCoulomb;

    match material.drainage_type {
        DrainageType::UndrainedC => {
            // Total-stress update with undrained shear strength
            let trial = stress_start + d_elastic * d_eps;
            let (stress, yielded) = if is_mc {
                let mut su = material.undrained_shear_strength.unwrap_or(0.0);
                if let Some(xi) = srm_factor {
                    su /= xi;
                }
                return_mapping(&trial, su, 0.0)
            } else {
                (trial, false)
            };
            StressUpdate {
                stress,
                pwp_excess: 0.0,
                yielded,
            }
        }

        DrainageType::UndrainedA | DrainageType::UndrainedB => {
            // Effective-stress update with a volumetric pore-pressure penalty
            let mut d_total = *d_elastic;
            d_total[(0, 0)] += penalty;
            d_total[(0, 1)] += penalty;
            d_total[(1, 0)] += penalty;
            d_total[(1, 1)] += penalty;

            let trial_total = stress_start + d_total * d_eps;
            let d_vol = d_eps[0] + d_eps[1];
            let pwp_excess = pwp_excess_start + penalty * d_vol;
            let p_total = pwp_steady + pwp_excess;

            let trial_eff = trial_total - Vec3::new(p_total, p_total, 0.0);

            let (eff_new, yielded) = if is_mc {
                let (mut c_eff, mut phi_eff) =
                    if material.drainage_type == DrainageType::UndrainedB {
                        (material.undrained_shear_strength.unwrap_or(0.0), 0.0)
                    } else {
                        (
                            material.cohesion.unwrap_or(0.0),
                            material.friction_angle.unwrap_or(0.0),
                        )
                    };
                if let Some(xi) = srm_factor {
                    let (c_r, phi_r) = reduced_strength(c_eff, phi_eff, xi);
                    c_eff = c_r;
                    phi_eff = phi_r;
                }
                return_mapping(&trial_eff, c_eff, phi_eff)
            } else {
                (trial_eff, false)
            };

            StressUpdate {
                stress: eff_new + Vec3::new(p_total, p_total, 0.0),
                pwp_excess,
                yielded,
            }
        }

        DrainageType::Drained | DrainageType::NonPorous => {
            // Effective-stress update with a known steady pressure
            let eff_start = stress_start - Vec3::new(pwp_steady, pwp_steady, 0.0);
            let trial_eff = eff_start + d_elastic * d_eps;

            let (eff_new, yielded) = if is_mc {
                let mut c_eff = material.cohesion.unwrap_or(0.0);
                let mut phi_eff = material.friction_angle.unwrap_or(0.0);
                if let Some(xi) = srm_factor {
                    let (c_r, phi_r) = reduced_strength(c_eff, phi_eff, xi);
                    c_eff = c_r;
                    phi_eff = phi_r;
                }
                return_mapping(&trial_eff, c_eff, phi_eff)
            } else {
                (trial_eff, false)
            };

            StressUpdate {
                stress: eff_new + Vec3::new(pwp_steady, pwp_steady, 0.0),
                pwp_excess: 0.0,
                yielded,
            }
        }
    }
}

/// Out-of-plane stress for plane strain, derived from the in-plane state.
///
/// Total-stress branches (NonPorous, UndrainedC) use ν(σxx + σyy); the
/// effective-stress branches subtract the pore pressure before applying ν
/// and add it back.
pub fn derive_sigma_zz(material: &Material, sig_xx: f64, sig_yy: f64, pwp_total: f64) -> f64 {
    let nu = material.poissons_ratio;
    match material.drainage_type {
        DrainageType::NonPorous | DrainageType::UndrainedC => nu * (sig_xx + sig_yy),
        _ => nu * (sig_xx + sig_yy - 2.0 * pwp_total) + pwp_total,
    }
}
