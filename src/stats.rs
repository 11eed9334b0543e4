//! Shared numeric kernels for the comparison strategies.
//!
//! This module provides:
//!
//! - pairwise sample-distance matrices (Euclidean, cosine) used by the RSA
//!   and Gromov-Wasserstein strategies;
//! - the row-correlation matrix underlying correlation-based RDMs;
//! - Pearson and Spearman correlation with tie-averaged ranking.
//!
//! All computation is in `f64`. Inputs are feature tensors of shape
//! `(num_samples, embedding_dim)`; all pairwise matrices returned here are
//! square over the sample axis.

use ndarray::{Array1, Array2, Axis};

use crate::config::CostFun;

/// Norm floor guarding divisions by zero-length embedding vectors.
const NORM_FLOOR: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Pairwise distances
// ---------------------------------------------------------------------------

/// Squared Euclidean distances between all sample pairs of `x`.
///
/// Computed as `‖xᵢ‖² + ‖xⱼ‖² − 2⟨xᵢ, xⱼ⟩` with a clamp at zero to absorb
/// floating-point cancellation on the diagonal.
pub fn squared_euclidean_distances(x: &Array2<f64>) -> Array2<f64> {
    let gram = x.dot(&x.t());
    let sq_norms: Array1<f64> = gram.diag().to_owned();
    let n = x.nrows();

    Array2::from_shape_fn((n, n), |(i, j)| {
        (sq_norms[i] + sq_norms[j] - 2.0 * gram[[i, j]]).max(0.0)
    })
}

/// Euclidean distances between all sample pairs of `x`.
pub fn euclidean_distances(x: &Array2<f64>) -> Array2<f64> {
    squared_euclidean_distances(x).mapv(f64::sqrt)
}

/// Cosine distances (`1 − cosine similarity`) between all sample pairs of `x`.
///
/// Zero-length rows are floored at [`NORM_FLOOR`], matching the behaviour of
/// treating a degenerate embedding as maximally dissimilar rather than
/// producing NaN.
pub fn cosine_distances(x: &Array2<f64>) -> Array2<f64> {
    let gram = x.dot(&x.t());
    let norms: Array1<f64> = gram.diag().mapv(|v| v.max(0.0).sqrt().max(NORM_FLOOR));
    let n = x.nrows();

    Array2::from_shape_fn((n, n), |(i, j)| {
        1.0 - gram[[i, j]] / (norms[i] * norms[j])
    })
}

/// Pairwise sample-distance matrix for `x` under `metric`.
pub fn pairwise_distances(x: &Array2<f64>, metric: CostFun) -> Array2<f64> {
    match metric {
        CostFun::Euclidean => euclidean_distances(x),
        CostFun::Cosine => cosine_distances(x),
    }
}

// ---------------------------------------------------------------------------
// Row correlation
// ---------------------------------------------------------------------------

/// Pearson correlation matrix between the rows of `x`.
///
/// Each row is centred and scaled by its standard deviation; constant rows
/// are floored at [`NORM_FLOOR`] instead of dividing by zero.
pub fn row_correlation_matrix(x: &Array2<f64>) -> Array2<f64> {
    let means = x.mean_axis(Axis(1)).expect("feature tensors have dim > 0");
    let centered = x - &means.insert_axis(Axis(1));

    let gram = centered.dot(&centered.t());
    let norms: Array1<f64> = gram.diag().mapv(|v| v.max(0.0).sqrt().max(NORM_FLOOR));
    let n = x.nrows();

    Array2::from_shape_fn((n, n), |(i, j)| gram[[i, j]] / (norms[i] * norms[j]))
}

/// Values of the strict upper triangle of a square matrix, row-major order.
///
/// This is the flattened form both RDMs are reduced to before correlation:
/// the diagonal is identically zero by construction and the lower triangle
/// duplicates the upper one.
pub fn upper_triangle_values(m: &Array2<f64>) -> Vec<f64> {
    let n = m.nrows();
    let mut values = Vec::with_capacity(n.saturating_sub(1) * n / 2);
    for i in 0..n {
        for j in (i + 1)..n {
            values.push(m[[i, j]]);
        }
    }
    values
}

// ---------------------------------------------------------------------------
// Correlation coefficients
// ---------------------------------------------------------------------------

/// Pearson product-moment correlation of two equal-length slices.
///
/// Returns `0.0` for degenerate inputs (either slice constant or empty),
/// which keeps downstream matrix assembly free of NaN.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    if n == 0 {
        return 0.0;
    }

    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (&x, &y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 {
        return 0.0;
    }
    cov / denom
}

/// Spearman rank correlation of two equal-length slices.
///
/// Ranks are tie-averaged, so the result matches the conventional definition
/// (Pearson correlation of the rank vectors) even with repeated values.
pub fn spearman(a: &[f64], b: &[f64]) -> f64 {
    let ranks_a = average_ranks(a);
    let ranks_b = average_ranks(b);
    pearson(&ranks_a, &ranks_b)
}

/// Tie-averaged ranks of `values` (1-based).
///
/// Equal values share the mean of the ranks they would occupy. Ordering uses
/// [`f64::total_cmp`], so NaN entries (a corrupt artifact propagating through
/// an RDM) rank after every finite value instead of panicking the sort.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));

    let mut ranks = vec![0.0; n];
    let mut start = 0;
    while start < n {
        // Find the run of tied values [start, end).
        let mut end = start + 1;
        while end < n && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // Mean of 1-based ranks start+1 ..= end.
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn euclidean_distances_match_hand_computation() {
        let x = array![[0.0, 0.0], [3.0, 4.0], [0.0, 1.0]];
        let d = euclidean_distances(&x);
        assert_abs_diff_eq!(d[[0, 1]], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[0, 2]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[1, 1]], 0.0, epsilon = 1e-12);
        // Symmetry.
        assert_abs_diff_eq!(d[[2, 1]], d[[1, 2]], epsilon = 1e-12);
    }

    #[test]
    fn euclidean_distances_are_translation_invariant() {
        let x = array![[1.0, 2.0], [4.0, 6.0], [0.0, -1.0]];
        let shifted = &x + 10.0;
        let d1 = euclidean_distances(&x);
        let d2 = euclidean_distances(&shifted);
        for (a, b) in d1.iter().zip(d2.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn cosine_distance_of_parallel_vectors_is_zero() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [0.0, 3.0]];
        let d = cosine_distances(&x);
        assert_abs_diff_eq!(d[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(d[[0, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn row_correlation_diagonal_is_one() {
        let x = array![[1.0, 2.0, 3.0], [2.0, 1.0, 0.0], [5.0, 5.0, 6.0]];
        let r = row_correlation_matrix(&x);
        for i in 0..3 {
            assert_abs_diff_eq!(r[[i, i]], 1.0, epsilon = 1e-12);
        }
        // Rows 0 and 1 are perfectly anti-correlated.
        assert_abs_diff_eq!(r[[0, 1]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn upper_triangle_is_row_major_and_strict() {
        let m = array![[0.0, 1.0, 2.0], [1.0, 0.0, 3.0], [2.0, 3.0, 0.0]];
        assert_eq!(upper_triangle_values(&m), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn pearson_perfect_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert_abs_diff_eq!(pearson(&a, &b), 1.0, epsilon = 1e-12);

        let c = [8.0, 6.0, 4.0, 2.0];
        assert_abs_diff_eq!(pearson(&a, &c), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn pearson_of_constant_slice_is_zero() {
        let a = [1.0, 1.0, 1.0];
        let b = [1.0, 2.0, 3.0];
        assert_eq!(pearson(&a, &b), 0.0);
    }

    #[test]
    fn spearman_is_invariant_under_monotone_transform() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [1.0, 8.0, 27.0, 64.0, 125.0]; // cube: same ordering
        assert_abs_diff_eq!(spearman(&a, &b), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn average_ranks_handle_ties() {
        let v = [10.0, 20.0, 20.0, 30.0];
        // Ranks: 1, (2+3)/2, (2+3)/2, 4.
        assert_eq!(average_ranks(&v), vec![1.0, 2.5, 2.5, 4.0]);
    }

    #[test]
    fn ranks_tolerate_nan_entries() {
        let v = [2.0, f64::NAN, 1.0];
        let ranks = average_ranks(&v);
        // NaN orders after every finite value; the finite ranks stay correct.
        assert_eq!(ranks[2], 1.0);
        assert_eq!(ranks[0], 2.0);
        assert_eq!(ranks[1], 3.0);

        let rho = spearman(&v, &[1.0, 2.0, 3.0]);
        assert!(rho.is_finite());
    }

    #[test]
    fn spearman_with_ties_stays_bounded() {
        let a = [1.0, 2.0, 2.0, 3.0];
        let b = [1.0, 2.0, 3.0, 3.0];
        let rho = spearman(&a, &b);
        assert!((-1.0..=1.0).contains(&rho), "rho={rho} outside [-1, 1]");
        assert!(rho > 0.5, "expected strong positive correlation, got {rho}");
    }
}
