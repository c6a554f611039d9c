//! Sparse matrix utilities for the phase solver
//!
//! Global stiffness matrices of soil meshes are overwhelmingly sparse; the
//! solver assembles COO triplets per phase and factorizes the free-free
//! block once with a skyline Cholesky, reusing the factorization for every
//! Newton back-substitution of that phase.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Sparse matrix builder using COO format, efficient for incremental
/// element-by-element assembly.
pub struct SparseMatrixBuilder {
    size: usize,
    entries: Vec<(usize, usize, f64)>,
}

impl SparseMatrixBuilder {
    /// Create a builder for an n x n matrix.
    pub fn new(size: usize) -> Self {
        // Typical T6 connectivity: ~40 coupled dofs per dof
        let estimated_nnz = size * 40;
        Self {
            size,
            entries: Vec::with_capacity(estimated_nnz),
        }
    }

    /// Add a value (accumulates with any existing entry at the position)
    #[inline]
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        if value.abs() > 1e-15 {
            self.entries.push((row, col, value));
        }
    }

    /// Scatter a dense element matrix into the global positions `dofs`.
    /// Entries mapping to `None` (constrained dofs) are skipped.
    pub fn add_element_matrix(&mut self, dofs: &[Option<usize>], k_elem: &[f64], stride: usize) {
        debug_assert_eq!(dofs.len(), stride);
        for (i, di) in dofs.iter().enumerate() {
            let Some(di) = di else { continue };
            for (j, dj) in dofs.iter().enumerate() {
                let Some(dj) = dj else { continue };
                self.add(*di, *dj, k_elem[i * stride + j]);
            }
        }
    }

    /// Convert to CSR format
    pub fn to_csr(&self) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(self.size, self.size);
        for &(row, col, val) in &self.entries {
            coo.push(row, col, val);
        }
        CsrMatrix::from(&coo)
    }

    /// Dense conversion for debugging and small tests
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut mat = DMatrix::zeros(self.size, self.size);
        for &(row, col, val) in &self.entries {
            mat[(row, col)] += val;
        }
        mat
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }
}

/// Sparse Cholesky solver for symmetric positive definite systems using
/// skyline (profile) storage.
///
/// The stiffness matrix of a properly restrained mesh is SPD; the skyline
/// profile of a 2D triangulation stays narrow, so factorization is cheap
/// and the factor can be reused across Newton iterations.
pub struct SparseCholeskySolver {
    size: usize,
    // Per row: values from the first structural non-zero up to the diagonal
    skyline: Vec<Vec<f64>>,
    heights: Vec<usize>,
    factorized: bool,
}

impl SparseCholeskySolver {
    /// Build skyline storage from a CSR matrix (lower triangle + diagonal).
    pub fn new(csr: &CsrMatrix<f64>) -> Self {
        let size = csr.nrows();

        let mut heights = vec![0usize; size];
        for (row, col, _val) in csr.triplet_iter() {
            if col < row {
                heights[row] = heights[row].max(row - col);
            }
        }

        let mut skyline: Vec<Vec<f64>> = Vec::with_capacity(size);
        for &h in heights.iter() {
            skyline.push(vec![0.0; h + 1]);
        }

        for (row, col, &val) in csr.triplet_iter() {
            if col <= row && col + heights[row] >= row {
                let idx = col - (row - heights[row]);
                skyline[row][idx] += val;
            }
        }

        Self {
            size,
            skyline,
            heights,
            factorized: false,
        }
    }

    /// In-place Cholesky factorization. Fails on a zero pivot or a
    /// non-positive-definite matrix (unrestrained or detached mesh).
    pub fn factorize(&mut self) -> Result<(), &'static str> {
        for i in 0..self.size {
            let hi = self.heights[i];
            let start_i = i - hi;

            for j in start_i..i {
                let hj = self.heights[j];
                let start_j = j - hj;
                let start = start_i.max(start_j);

                let mut sum = 0.0;
                for k in start..j {
                    sum += self.get(i, k) * self.get(j, k);
                }

                let diag_j = self.skyline[j][hj];
                if diag_j.abs() < 1e-15 {
                    return Err("zero pivot in Cholesky factorization");
                }

                let idx = j - start_i;
                self.skyline[i][idx] = (self.skyline[i][idx] - sum) / diag_j;
            }

            let mut sum = 0.0;
            for j in start_i..i {
                let val = self.get(i, j);
                sum += val * val;
            }

            let diag = self.skyline[i][hi] - sum;
            if diag <= 0.0 {
                return Err("matrix not positive definite");
            }
            self.skyline[i][hi] = diag.sqrt();
        }

        self.factorized = true;
        Ok(())
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> f64 {
        if col > row {
            return self.get(col, row);
        }
        let h = self.heights[row];
        let start = row - h;
        if col < start {
            return 0.0;
        }
        self.skyline[row][col - start]
    }

    /// Solve L Lᵀ x = b with the stored factorization.
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        debug_assert!(self.factorized, "solve called before factorize");
        let mut x = b.clone();

        // Forward substitution: L y = b
        for i in 0..self.size {
            let start = i - self.heights[i];
            let mut sum = 0.0;
            for j in start..i {
                sum += self.get(i, j) * x[j];
            }
            x[i] = (x[i] - sum) / self.get(i, i);
        }

        // Backward substitution: Lᵀ x = y
        for i in (0..self.size).rev() {
            x[i] /= self.get(i, i);
            let start = i - self.heights[i];
            for j in start..i {
                x[j] -= self.get(i, j) * x[i];
            }
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_builder_accumulates() {
        let mut builder = SparseMatrixBuilder::new(3);
        builder.add(0, 0, 2.0);
        builder.add(0, 0, 2.0);
        builder.add(1, 2, -1.0);
        let dense = builder.to_dense();
        assert_relative_eq!(dense[(0, 0)], 4.0);
        assert_relative_eq!(dense[(1, 2)], -1.0);
    }

    #[test]
    fn test_element_scatter_skips_constrained_dofs() {
        let mut builder = SparseMatrixBuilder::new(2);
        let k = [1.0, 2.0, 3.0, 4.0];
        builder.add_element_matrix(&[Some(0), None], &k, 2);
        let dense = builder.to_dense();
        assert_relative_eq!(dense[(0, 0)], 1.0);
        assert_relative_eq!(dense[(0, 1)], 0.0);
        assert_relative_eq!(dense[(1, 1)], 0.0);
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let mut builder = SparseMatrixBuilder::new(3);
        builder.add(0, 0, 4.0);
        builder.add(0, 1, -1.0);
        builder.add(1, 0, -1.0);
        builder.add(1, 1, 4.0);
        builder.add(1, 2, -1.0);
        builder.add(2, 1, -1.0);
        builder.add(2, 2, 4.0);

        let csr = builder.to_csr();
        let mut solver = SparseCholeskySolver::new(&csr);
        solver.factorize().unwrap();

        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = solver.solve(&b);

        let dense = builder.to_dense();
        let residual = (&dense * &x - &b).norm();
        assert!(residual < 1e-10, "residual {residual}");
    }

    #[test]
    fn test_cholesky_rejects_indefinite_matrix() {
        let mut builder = SparseMatrixBuilder::new(2);
        builder.add(0, 0, 1.0);
        builder.add(1, 1, -1.0);
        let csr = builder.to_csr();
        let mut solver = SparseCholeskySolver::new(&csr);
        assert!(solver.factorize().is_err());
    }
}
