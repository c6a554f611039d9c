//! Element library: constant-strain (T3) and quadratic (T6) triangles
//!
//! Both kernels share one output shape so the assembler and the phase solver
//! stay order-agnostic: a stiffness matrix, a consistent gravity vector, the
//! elastic constitutive matrix and a list of cached quadrature points.

pub mod material;
pub mod t3;
pub mod t6;

pub use material::{DrainageType, Material, MaterialModel, GAMMA_WATER};

use nalgebra::{DMatrix, DVector};

use crate::error::{SolverError, SolverResult};
use crate::geometry::{triangle_signed_area, WaterTable};
use crate::math::Mat3;

/// Immutable data cached at one quadrature point
#[derive(Debug, Clone)]
pub struct QuadraturePoint {
    /// Physical coordinates
    pub x: f64,
    pub y: f64,
    /// Integration weight on the reference triangle
    pub weight: f64,
    pub det_j: f64,
    /// Strain-displacement operator, 3 x (2·nodes)
    pub b: DMatrix<f64>,
    /// Steady pore pressure from the water table (tensile-positive, so
    /// compressive pressures are negative)
    pub pwp_steady: f64,
}

/// Precomputed element arrays, rebuilt whenever the bound material changes
#[derive(Debug, Clone)]
pub struct ElementMatrices {
    /// Stiffness, (2·nodes) square
    pub k: DMatrix<f64>,
    /// Consistent self-weight load vector
    pub f_gravity: DVector<f64>,
    /// Elastic plane-strain constitutive matrix
    pub d: Mat3,
    pub quadrature: Vec<QuadraturePoint>,
    pub area: f64,
}

impl ElementMatrices {
    /// Degrees of freedom carried by this element
    pub fn num_dofs(&self) -> usize {
        self.k.nrows()
    }
}

/// Compute element matrices, dispatching on the node count.
///
/// `coords` holds the element's node coordinates in connectivity order;
/// for T6 that is `{c1, c2, c3, m12, m23, m31}`.
pub fn compute_element_matrices(
    element_id: usize,
    coords: &[[f64; 2]],
    material: &Material,
    water: &WaterTable,
    thickness: f64,
) -> SolverResult<ElementMatrices> {
    match coords.len() {
        3 => t3::compute_element_matrices(element_id, coords, material, water, thickness),
        6 => t6::compute_element_matrices(element_id, coords, material, water, thickness),
        n => Err(SolverError::MeshGeneration(format!(
            "element {element_id} has {n} nodes; only 3-node and 6-node triangles are supported"
        ))),
    }
}

/// Signed area from the first three (corner) nodes
pub fn corner_area(coords: &[[f64; 2]]) -> f64 {
    triangle_signed_area(coords[0], coords[1], coords[2])
}

/// Steady pore pressure at a point for a material, honoring the drainage
/// type: only Drained and UndrainedA feel the water table here.
pub fn steady_pore_pressure(material: &Material, water: &WaterTable, x: f64, y: f64) -> f64 {
    if !material.drainage_type.has_steady_pwp() {
        return 0.0;
    }
    match water.level_at(x) {
        Some(wy) if y < wy => -GAMMA_WATER * (wy - y),
        _ => 0.0,
    }
}
