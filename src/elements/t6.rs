//! Six-node quadratic triangle kernel
//!
//! Node order is `{c1, c2, c3, m12, m23, m31}`. Integration uses the
//! 3-point Gauss rule at barycentric (1/6, 1/6, 2/3) permutations with
//! weight 1/6 each; for the straight-sided triangles produced by the mesh
//! generator this integrates the quadratic shape functions exactly.

use nalgebra::{DMatrix, DVector, Matrix2};

use crate::elements::material::Material;
use crate::elements::{corner_area, steady_pore_pressure, ElementMatrices, QuadraturePoint};
use crate::error::{SolverError, SolverResult};
use crate::geometry::WaterTable;

/// Gauss points in natural coordinates (ξ, η) with L1 = 1 − ξ − η
pub const GAUSS_POINTS: [[f64; 2]; 3] = [
    [1.0 / 6.0, 2.0 / 3.0],
    [2.0 / 3.0, 1.0 / 6.0],
    [1.0 / 6.0, 1.0 / 6.0],
];

/// Integration weights matching [`GAUSS_POINTS`]
pub const GAUSS_WEIGHTS: [f64; 3] = [1.0 / 6.0, 1.0 / 6.0, 1.0 / 6.0];

/// Quadratic shape functions at (ξ, η)
pub fn shape_functions(xi: f64, eta: f64) -> [f64; 6] {
    let l1 = 1.0 - xi - eta;
    let l2 = xi;
    let l3 = eta;
    [
        l1 * (2.0 * l1 - 1.0),
        l2 * (2.0 * l2 - 1.0),
        l3 * (2.0 * l3 - 1.0),
        4.0 * l1 * l2,
        4.0 * l2 * l3,
        4.0 * l3 * l1,
    ]
}

/// Natural gradients (∂N/∂ξ, ∂N/∂η) at (ξ, η)
pub fn shape_gradients(xi: f64, eta: f64) -> [[f64; 2]; 6] {
    let l1 = 1.0 - xi - eta;
    let l2 = xi;
    let l3 = eta;
    [
        [1.0 - 4.0 * l1, 1.0 - 4.0 * l1],
        [4.0 * l2 - 1.0, 0.0],
        [0.0, 4.0 * l3 - 1.0],
        [4.0 * (l1 - l2), -4.0 * l2],
        [4.0 * l3, 4.0 * l2],
        [-4.0 * l3, 4.0 * (l1 - l3)],
    ]
}

/// Compute stiffness, consistent gravity load and Gauss point caches for a
/// 6-node triangle.
pub fn compute_element_matrices(
    element_id: usize,
    coords: &[[f64; 2]],
    material: &Material,
    water: &WaterTable,
    thickness: f64,
) -> SolverResult<ElementMatrices> {
    let area = corner_area(coords);
    if area.abs() < 1e-12 {
        return Err(SolverError::DegenerateElement { element_id, area });
    }

    let d = material.elastic_d_matrix();
    let mut k = DMatrix::zeros(12, 12);
    let mut f_gravity = DVector::zeros(12);
    let mut quadrature = Vec::with_capacity(3);

    for (gp_idx, &[xi, eta]) in GAUSS_POINTS.iter().enumerate() {
        let weight = GAUSS_WEIGHTS[gp_idx];
        let n = shape_functions(xi, eta);
        let dn = shape_gradients(xi, eta);

        // Jacobian [[∂x/∂ξ, ∂y/∂ξ], [∂x/∂η, ∂y/∂η]]
        let mut jac = Matrix2::<f64>::zeros();
        for i in 0..6 {
            jac[(0, 0)] += dn[i][0] * coords[i][0];
            jac[(0, 1)] += dn[i][0] * coords[i][1];
            jac[(1, 0)] += dn[i][1] * coords[i][0];
            jac[(1, 1)] += dn[i][1] * coords[i][1];
        }
        let det_j = jac[(0, 0)] * jac[(1, 1)] - jac[(0, 1)] * jac[(1, 0)];
        if det_j <= 1e-10 {
            return Err(SolverError::DegenerateElement {
                element_id,
                area: det_j,
            });
        }

        let mut b = DMatrix::zeros(3, 12);
        for i in 0..6 {
            let dn_dx = (jac[(1, 1)] * dn[i][0] - jac[(0, 1)] * dn[i][1]) / det_j;
            let dn_dy = (-jac[(1, 0)] * dn[i][0] + jac[(0, 0)] * dn[i][1]) / det_j;
            b[(0, 2 * i)] = dn_dx;
            b[(1, 2 * i + 1)] = dn_dy;
            b[(2, 2 * i)] = dn_dy;
            b[(2, 2 * i + 1)] = dn_dx;
        }

        k += b.transpose() * d * &b * (det_j * weight * thickness);

        // Physical Gauss point location
        let mut gx = 0.0;
        let mut gy = 0.0;
        for i in 0..6 {
            gx += n[i] * coords[i][0];
            gy += n[i] * coords[i][1];
        }

        let gamma = material.unit_weight(water.is_submerged(gx, gy));
        for i in 0..6 {
            f_gravity[2 * i + 1] -= gamma * n[i] * det_j * weight * thickness;
        }

        let pwp = steady_pore_pressure(material, water, gx, gy);

        quadrature.push(QuadraturePoint {
            x: gx,
            y: gy,
            weight,
            det_j,
            b,
            pwp_steady: pwp,
        });
    }

    Ok(ElementMatrices {
        k,
        f_gravity,
        d,
        quadrature,
        area,
    })
}
