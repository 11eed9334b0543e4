//! Centered Kernel Alignment.
//!
//! CKA compares two feature tensors over matched samples by aligning their
//! kernel (Gram) matrices:
//!
//! ```text
//! CKA(X, Y) = HSIC(K, L) / sqrt(HSIC(K, K) · HSIC(L, L))
//! ```
//!
//! with `K = k(X, X)` and `L = k(Y, Y)` for a linear or Gaussian RBF kernel.
//! Both the biased HSIC estimator (Gretton et al.) and the unbiased one
//! (Song et al.) are supported; the unbiased variant removes the O(1/m) bias
//! that inflates similarity for small sample counts, at the price of
//! requiring at least four samples.

use ndarray::{Array1, Array2, Axis};

use crate::config::CkaKernel;
use crate::error::{SimilarityError, SimilarityResult};
use crate::stats::squared_euclidean_distances;
use crate::store::FeatureStore;

use super::{check_same_rows, Representation, SimilarityStrategy};

/// Bandwidth used for the RBF kernel when the run does not set `sigma`.
const DEFAULT_RBF_SIGMA: f64 = 1.0;

/// Minimum sample count for the unbiased HSIC estimator (divides by `m − 3`).
const MIN_UNBIASED_SAMPLES: usize = 4;

// ---------------------------------------------------------------------------
// CkaStrategy
// ---------------------------------------------------------------------------

/// CKA comparison over raw feature tensors.
///
/// Representations are the feature tensors themselves; the kernel matrices
/// are built inside [`compare`](SimilarityStrategy::compare), once per pair.
#[derive(Debug)]
pub struct CkaStrategy {
    store: FeatureStore,
    kernel: CkaKernel,
    unbiased: bool,
    sigma: Option<f64>,
}

impl CkaStrategy {
    /// Create a CKA strategy over `store`.
    ///
    /// `sigma` only matters for the RBF kernel; `None` falls back to
    /// [`DEFAULT_RBF_SIGMA`].
    pub fn new(store: FeatureStore, kernel: CkaKernel, unbiased: bool, sigma: Option<f64>) -> Self {
        CkaStrategy {
            store,
            kernel,
            unbiased,
            sigma,
        }
    }

    /// Effective RBF bandwidth for this instance.
    fn sigma(&self) -> f64 {
        self.sigma.unwrap_or(DEFAULT_RBF_SIGMA)
    }

    /// Gram matrix of `x` under this instance's kernel.
    fn gram(&self, x: &Array2<f64>) -> Array2<f64> {
        match self.kernel {
            CkaKernel::Linear => x.dot(&x.t()),
            CkaKernel::Rbf => {
                let sigma = self.sigma();
                let d2 = squared_euclidean_distances(x);
                d2.mapv(|v| (-v / (2.0 * sigma * sigma)).exp())
            }
        }
    }
}

impl SimilarityStrategy for CkaStrategy {
    fn load_representation(&self, model_id: &str) -> SimilarityResult<Representation> {
        Ok(Representation::new(model_id, self.store.load(model_id)?))
    }

    fn compare(&self, a: &Representation, b: &Representation) -> SimilarityResult<f64> {
        check_same_rows(a, b)?;
        let m = a.rows();

        if self.unbiased && m < MIN_UNBIASED_SAMPLES {
            return Err(SimilarityError::InsufficientSamples {
                model_id: a.model_id.clone(),
                rows: m,
                required: MIN_UNBIASED_SAMPLES,
            });
        }

        let k = self.gram(&a.data);
        let l = self.gram(&b.data);

        let score = if self.unbiased {
            let kl = hsic_unbiased(&k, &l);
            let kk = hsic_unbiased(&k, &k);
            let ll = hsic_unbiased(&l, &l);
            normalise(kl, kk, ll)
        } else {
            let kc = center(&k);
            let lc = center(&l);
            let kl = (&kc * &lc).sum();
            let kk = (&kc * &kc).sum();
            let ll = (&lc * &lc).sum();
            normalise(kl, kk, ll)
        };

        Ok(score)
    }

    fn config_name(&self) -> String {
        let mut name = format!(
            "cka_kernel_{}_{}",
            self.kernel,
            if self.unbiased { "unbiased" } else { "biased" }
        );
        if self.kernel == CkaKernel::Rbf {
            name.push_str(&format!("_sigma_{}", self.sigma()));
        }
        name
    }
}

// ---------------------------------------------------------------------------
// HSIC estimators
// ---------------------------------------------------------------------------

/// Normalised alignment with a guard for degenerate (constant) inputs.
fn normalise(cross: f64, self_a: f64, self_b: f64) -> f64 {
    let denom = (self_a * self_b).sqrt();
    if !denom.is_finite() || denom <= 0.0 {
        return 0.0;
    }
    cross / denom
}

/// Double-centre a symmetric kernel matrix: `H K H` with `H = I − 1/m`.
///
/// Computed as `K − rowmean − colmean + grandmean`, which avoids building `H`.
fn center(k: &Array2<f64>) -> Array2<f64> {
    let m = k.nrows();
    let row_means = k.mean_axis(Axis(1)).expect("kernel matrices are non-empty");
    let grand_mean = row_means.sum() / m as f64;

    Array2::from_shape_fn((m, m), |(i, j)| {
        k[[i, j]] - row_means[i] - row_means[j] + grand_mean
    })
}

/// Unbiased HSIC estimator of Song et al. (2012).
///
/// Operates on the kernel matrices with their diagonals removed:
///
/// ```text
/// HSIC₁ = [ tr(K̃L̃) + (𝟙ᵀK̃𝟙)(𝟙ᵀL̃𝟙)/((m−1)(m−2)) − 2/(m−2)·(K̃𝟙)ᵀ(L̃𝟙) ] / (m(m−3))
/// ```
fn hsic_unbiased(k: &Array2<f64>, l: &Array2<f64>) -> f64 {
    let m = k.nrows() as f64;

    let mut kt = k.clone();
    kt.diag_mut().fill(0.0);
    let mut lt = l.clone();
    lt.diag_mut().fill(0.0);

    // Both matrices are symmetric, so tr(K̃L̃) is the elementwise sum.
    let trace_term = (&kt * &lt).sum();

    let sum_k = kt.sum();
    let sum_l = lt.sum();
    let row_k: Array1<f64> = kt.sum_axis(Axis(1));
    let row_l: Array1<f64> = lt.sum_axis(Axis(1));

    let middle = sum_k * sum_l / ((m - 1.0) * (m - 2.0));
    let cross = 2.0 / (m - 2.0) * row_k.dot(&row_l);

    (trace_term + middle - cross) / (m * (m - 3.0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
