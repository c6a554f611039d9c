//! Constant-strain triangle (CST) kernel
//!
//! Kept as the compatibility element: one quadrature point at the centroid,
//! a constant B operator and equal thirds of the self-weight on each node.

use nalgebra::{DMatrix, DVector};

use crate::elements::{steady_pore_pressure, ElementMatrices, QuadraturePoint};
use crate::error::{SolverError, SolverResult};
use crate::geometry::WaterTable;
use crate::elements::material::Material;

/// Compute stiffness, gravity load and centroid quadrature data for a
/// 3-node triangle.
pub fn compute_element_matrices(
    element_id: usize,
    coords: &[[f64; 2]],
    material: &Material,
    water: &WaterTable,
    thickness: f64,
) -> SolverResult<ElementMatrices> {
    let x = [coords[0][0], coords[1][0], coords[2][0]];
    let y = [coords[0][1], coords[1][1], coords[2][1]];

    let area2 = x[0] * (y[1] - y[2]) + x[1] * (y[2] - y[0]) + x[2] * (y[0] - y[1]);
    let area = 0.5 * area2;
    if area.abs() < 1e-12 {
        return Err(SolverError::DegenerateElement { element_id, area });
    }
    if area <= 0.0 {
        return Err(SolverError::MeshGeneration(format!(
            "element {element_id} has negative area {area:.3e}; node order must be CCW"
        )));
    }

    // Opposite-edge projections
    let b_coef = [y[1] - y[2], y[2] - y[0], y[0] - y[1]];
    let c_coef = [x[2] - x[1], x[0] - x[2], x[1] - x[0]];

    let mut b = DMatrix::zeros(3, 6);
    for i in 0..3 {
        b[(0, 2 * i)] = b_coef[i];
        b[(1, 2 * i + 1)] = c_coef[i];
        b[(2, 2 * i)] = c_coef[i];
        b[(2, 2 * i + 1)] = b_coef[i];
    }
    b /= area2;

    let d = material.elastic_d_matrix();
    let k = b.transpose() * d * &b * (area * thickness);

    // Centroid quadrature point
    let cx = (x[0] + x[1] + x[2]) / 3.0;
    let cy = (y[0] + y[1] + y[2]) / 3.0;

    let submerged = water.is_submerged(cx, cy);
    let gamma = material.unit_weight(submerged);
    let force_per_node = area * thickness * gamma / 3.0;

    let mut f_gravity = DVector::zeros(6);
    f_gravity[1] = -force_per_node;
    f_gravity[3] = -force_per_node;
    f_gravity[5] = -force_per_node;

    let pwp = steady_pore_pressure(material, water, cx, cy);

    let quadrature = vec![QuadraturePoint {
        x: cx,
        y: cy,
        // With det J = 2A, weight 1/2 integrates constants exactly
        weight: 0.5,
        det_j: area2,
        b,
        pwp_steady: pwp,
    }];

    Ok(ElementMatrices {
        k,
        f_gravity,
        d,
        quadrature,
        area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::material::tests::sample_material;
    use approx::assert_relative_eq;

    fn unit_triangle() -> Vec<[f64; 2]> {
        vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
    }

    #[test]
    fn test_gravity_splits_in_thirds() {
        let mat = sample_material();
        let em =
            compute_element_matrices(1, &unit_triangle(), &mat, &WaterTable::empty(), 1.0).unwrap();
        // Area 0.5, gamma_unsat 18 -> 9 kN total, 3 per node, downward
        assert_relative_eq!(em.f_gravity[1], -3.0, epsilon = 1e-12);
        assert_relative_eq!(em.f_gravity[3], -3.0, epsilon = 1e-12);
        assert_relative_eq!(em.f_gravity[5], -3.0, epsilon = 1e-12);
        assert_relative_eq!(em.f_gravity[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_stiffness_is_symmetric_and_psd_diagonal() {
        let mat = sample_material();
        let em =
            compute_element_matrices(1, &unit_triangle(), &mat, &WaterTable::empty(), 1.0).unwrap();
        for i in 0..6 {
            assert!(em.k[(i, i)] > 0.0);
            for j in 0..6 {
                assert_relative_eq!(em.k[(i, j)], em.k[(j, i)], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_degenerate_triangle_is_rejected() {
        let mat = sample_material();
        let coords = vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]];
        let result = compute_element_matrices(1, &coords, &mat, &WaterTable::empty(), 1.0);
        assert!(matches!(
            result,
            Err(SolverError::DegenerateElement { .. })
        ));
    }

    #[test]
    fn test_submerged_centroid_uses_saturated_weight() {
        let mat = sample_material();
        let water = WaterTable::from_points(&[
            crate::geometry::Point::new(-1.0, 5.0),
            crate::geometry::Point::new(2.0, 5.0),
        ]);
        let em = compute_element_matrices(1, &unit_triangle(), &mat, &water, 1.0).unwrap();
        // gamma_sat 20 -> 10 kN total
        assert_relative_eq!(em.f_gravity[1], -10.0 / 3.0, epsilon = 1e-12);
        // Steady pwp at centroid depth below the table
        let gp = &em.quadrature[0];
        assert!(gp.pwp_steady < 0.0);
        assert_relative_eq!(gp.pwp_steady, -9.81 * (5.0 - 1.0 / 3.0), epsilon = 1e-9);
    }
}
