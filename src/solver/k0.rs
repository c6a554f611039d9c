//! K0 geostatic stress initialization
//!
//! One-shot procedure: for every Gauss point of every active element the
//! total vertical stress is integrated by marching from the free surface
//! down to the point, sampling the unit weight of whichever active element
//! contains each substep. Horizontal stress follows from the K0
//! coefficient on the effective vertical stress. No displacements occur.

use crate::elements::{DrainageType, GAMMA_WATER};
use crate::geometry::{point_in_triangle, WaterTable};
use crate::math::Vec3;
use crate::solver::ElementTable;

/// Substeps of the vertical stress integration
const MARCH_STEPS: usize = 20;

/// Per-active-element axis-aligned bounds, used both for the free-surface
/// scan and to prune the containment search.
struct ElementBounds {
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

fn bounds_of(table: &ElementTable, nodes: &[[f64; 2]]) -> ElementBounds {
    let mut b = ElementBounds {
        x_min: f64::INFINITY,
        x_max: f64::NEG_INFINITY,
        y_min: f64::INFINITY,
        y_max: f64::NEG_INFINITY,
    };
    for &n in &table.nodes {
        b.x_min = b.x_min.min(nodes[n][0]);
        b.x_max = b.x_max.max(nodes[n][0]);
        b.y_min = b.y_min.min(nodes[n][1]);
        b.y_max = b.y_max.max(nodes[n][1]);
    }
    b
}

/// Steady pore pressure entering the K0 effective-stress split.
///
/// Unlike the element caches, Undrained B participates here: only the
/// total-stress branches (UndrainedC) and NonPorous are dry.
fn k0_pore_pressure(table: &ElementTable, water: &WaterTable, x: f64, y: f64) -> f64 {
    match table.material.drainage_type {
        DrainageType::UndrainedC | DrainageType::NonPorous => 0.0,
        _ => match water.level_at(x) {
            Some(wy) if y < wy => -GAMMA_WATER * (wy - y),
            _ => 0.0,
        },
    }
}

/// Compute geostatic stresses for every Gauss point of the active elements.
///
/// Returns `(table index, per-GP (stress, steady pwp))` pairs ordered by
/// table index.
pub(crate) fn compute_geostatic_stresses(
    tables: &[ElementTable],
    active: &[usize],
    nodes: &[[f64; 2]],
    water: &WaterTable,
) -> Vec<(usize, Vec<(Vec3, f64)>)> {
    let bounds: Vec<ElementBounds> = active
        .iter()
        .map(|&idx| bounds_of(&tables[idx], nodes))
        .collect();

    let mut results = Vec::with_capacity(active.len());

    for &table_idx in active {
        let table = &tables[table_idx];
        let mut gp_states = Vec::with_capacity(table.matrices.quadrature.len());

        for gp in &table.matrices.quadrature {
            let (x_gp, y_gp) = (gp.x, gp.y);

            let pwp = k0_pore_pressure(table, water, x_gp, y_gp);

            // Free surface: highest active element top over this x
            let mut y_surf = f64::NEG_INFINITY;
            for b in &bounds {
                if b.x_min <= x_gp && x_gp <= b.x_max {
                    y_surf = y_surf.max(b.y_max);
                }
            }
            if !y_surf.is_finite() {
                y_surf = y_gp;
            }

            // March down from the surface, sampling γ per substep
            let dy = (y_surf - y_gp) / MARCH_STEPS as f64;
            let mut sigma_accum = 0.0;
            if dy > 0.0 {
                for s in 0..MARCH_STEPS {
                    let y_sample = y_gp + (s as f64 + 0.5) * dy;
                    let mut gamma = table.material.unit_weight_unsaturated;

                    for (b, &j) in bounds.iter().zip(active.iter()) {
                        if b.x_min <= x_gp
                            && x_gp <= b.x_max
                            && b.y_min <= y_sample
                            && y_sample <= b.y_max
                        {
                            let other = &tables[j];
                            let (n1, n2, n3) = (other.nodes[0], other.nodes[1], other.nodes[2]);
                            if point_in_triangle(nodes[n1], nodes[n2], nodes[n3], x_gp, y_sample) {
                                let submerged = water.is_submerged(x_gp, y_sample);
                                gamma = other.material.unit_weight(submerged);
                                break;
                            }
                        }
                    }
                    sigma_accum += gamma * dy;
                }
            }

            let sigma_v_total = -sigma_accum;
            let sigma_v_eff = sigma_v_total - pwp;

            let k0 = table.material.k0_coefficient();
            let sigma_h_eff = k0 * sigma_v_eff;
            let sigma_h_total = sigma_h_eff + pwp;

            gp_states.push((Vec3::new(sigma_h_total, sigma_v_total, 0.0), pwp));
        }

        results.push((table_idx, gp_states));
    }

    results
}
