//! Mathematical utilities for the plane-strain engine

pub mod sparse;

use nalgebra::{DVector, Matrix3, Vector3};

pub use sparse::{SparseCholeskySolver, SparseMatrixBuilder};

/// Stress/strain vectors (σ_xx, σ_yy, σ_xy) and their strain counterparts
pub type Vec3 = Vector3<f64>;
/// 3x3 constitutive matrices
pub type Mat3 = Matrix3<f64>;
/// Global-sized vectors (2 dofs per node)
pub type GVec = DVector<f64>;
