//! Small dense helpers for the Newton solvers.
//!
//! Systems here are 1×1 to 3×3, so plain Gauss-Jordan elimination with
//! partial pivoting is enough.

use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Relative pivot size below which a matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Design matrix with a leading intercept column: `[1, x]` per row.
pub fn design_with_intercept(x: &[f64]) -> Array2<f64> {
    let mut m = Array2::ones((x.len(), 2));
    m.column_mut(1).assign(&ArrayView1::from(x));
    m
}

/// Intercept-only design matrix used for null models.
pub fn design_intercept_only(n: usize) -> Array2<f64> {
    Array2::ones((n, 1))
}

/// `Xᵀ · diag(w) · X`.
pub fn weighted_gram(x: &Array2<f64>, w: &Array1<f64>) -> Array2<f64> {
    let xw = x * &w.view().insert_axis(Axis(1));
    x.t().dot(&xw)
}

/// Inverse of a square matrix, `None` if it is singular.
pub fn invert(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }
    let scale = m.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let mut a = m.clone();
    let mut inv = Array2::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))?;
        let pivot = a[[pivot_row, col]];
        if !pivot.is_finite() || pivot.abs() < SINGULAR_EPS * scale {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([pivot_row, k], [col, k]);
                inv.swap([pivot_row, k], [col, k]);
            }
        }
        for k in 0..n {
            a[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Some(inv)
}

/// Largest absolute entry.
pub fn max_abs(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}
