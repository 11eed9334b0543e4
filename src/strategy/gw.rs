//! Gromov-Wasserstein distance between embedding spaces.
//!
//! Each model is reduced to its max-normalised self-distance matrix (the
//! "cost" matrix) over the samples; two models are then scored by the
//! Gromov-Wasserstein objective between their cost matrices under uniform
//! marginals. GW compares metric structure directly, so like RSA it works
//! across embedding spaces of different dimensionality, but it additionally
//! optimises over a soft sample-to-sample coupling.
//!
//! Two coupling modes exist:
//!
//! - **fixed**: the coupling is pinned to the uniform diagonal `I/n`,
//!   asserting that sample `i` of one model corresponds to sample `i` of the
//!   other. The objective is then a single evaluation, and identical cost
//!   matrices score exactly `0.0`.
//! - **learned**: the coupling is solved by entropic-regularised projected
//!   iterations with a Sinkhorn inner loop.
//!
//! The result is a distance, not a similarity: `0.0` on the diagonal, larger
//! values mean less similar. The matrix seed is therefore all-zeros.

use ndarray::{Array1, Array2};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{CostFun, LossFun};
use crate::error::{SimilarityError, SimilarityResult};
use crate::stats::pairwise_distances;
use crate::store::FeatureStore;

use super::{check_same_rows, Representation, SimilarityStrategy};

/// Entropic regularisation strength for the learned-coupling solver.
const EPSILON: f64 = 0.05;

/// Maximum outer (projected-gradient) iterations.
const MAX_OUTER_ITERS: usize = 100;

/// Maximum Sinkhorn iterations per outer step.
const MAX_SINKHORN_ITERS: usize = 100;

/// Convergence tolerance on the coupling update.
const CONVERGENCE_TOL: f64 = 1e-8;

/// Additive guard for logarithms and divisions over cost entries.
const LOG_GUARD: f64 = 1e-15;

// ---------------------------------------------------------------------------
// GwStrategy
// ---------------------------------------------------------------------------

/// Gromov-Wasserstein comparison over per-model cost matrices.
#[derive(Debug)]
pub struct GwStrategy {
    store: FeatureStore,
    cost_fun: CostFun,
    loss_fun: LossFun,
    fixed_coupling: bool,
    /// When set, every computed coupling matrix is persisted under this root.
    coupling_root: Option<PathBuf>,
}

impl GwStrategy {
    /// Create a GW strategy over `store`.
    ///
    /// `coupling_root` enables coupling persistence; the factory only passes
    /// it when the run requests it, and config validation has already checked
    /// that the directory exists.
    pub fn new(
        store: FeatureStore,
        cost_fun: CostFun,
        loss_fun: LossFun,
        fixed_coupling: bool,
        coupling_root: Option<PathBuf>,
    ) -> Self {
        GwStrategy {
            store,
            cost_fun,
            loss_fun,
            fixed_coupling,
            coupling_root,
        }
    }

    /// Persist `coupling` as `{model_a}_{model_b}_coupling.npy`, if enabled.
    fn store_coupling_matrix(
        &self,
        model_a: &str,
        model_b: &str,
        coupling: &Array2<f64>,
    ) -> SimilarityResult<()> {
        let Some(root) = &self.coupling_root else {
            return Ok(());
        };

        use ndarray_npy::WriteNpyExt;

        let path = root.join(format!("{model_a}_{model_b}_coupling.npy"));
        let file =
            std::fs::File::create(&path).map_err(|source| SimilarityError::io(&path, source))?;
        coupling
            .write_npy(file)
            .map_err(|e| SimilarityError::npy(&path, format!("NPY write error: {e}")))?;
        debug!("stored coupling matrix at {}", path.display());
        Ok(())
    }
}

impl SimilarityStrategy for GwStrategy {
    /// GW is a distance, so uncomputed cells (and the diagonal) default to 0.
    fn prepare_matrix(&self, n: usize) -> Array2<f64> {
        Array2::zeros((n, n))
    }

    fn load_representation(&self, model_id: &str) -> SimilarityResult<Representation> {
        let features = self.store.load(model_id)?;
        let mut cost = pairwise_distances(&features, self.cost_fun);

        // Normalise to [0, 1] so cost scales are comparable across models.
        let max = cost.fold(0.0_f64, |m, &v| m.max(v));
        if max > 0.0 {
            cost.mapv_inplace(|v| v / max);
        }

        Ok(Representation::new(model_id, cost))
    }

    fn compare(&self, a: &Representation, b: &Representation) -> SimilarityResult<f64> {
        check_same_rows(a, b)?;
        let n = a.rows();

        let terms = GwTerms::new(&a.data, &b.data, self.loss_fun);

        let (coupling, dist) = if self.fixed_coupling {
            let coupling = Array2::from_diag_elem(n, 1.0 / n as f64);
            let dist = terms.objective(&coupling);
            (coupling, dist)
        } else {
            terms.solve_entropic()
        };

        self.store_coupling_matrix(&a.model_id, &b.model_id, &coupling)?;
        Ok(dist)
    }

    fn config_name(&self) -> String {
        format!(
            "gw_sim_cost_{}_fun_{}_loss_fun_{}",
            if self.fixed_coupling {
                "fixed_coupling"
            } else {
                "learned_coupling"
            },
            self.cost_fun,
            self.loss_fun
        )
    }
}

// ---------------------------------------------------------------------------
// GW objective
// ---------------------------------------------------------------------------

/// Precomputed tensors for the GW objective over one cost-matrix pair.
///
/// The objective decomposes as `⟨constC − h1(C1)·T·h2(C2)ᵀ, T⟩` for
/// loss-specific element maps `f1, f2, h1, h2` (Peyré et al., 2016). Marginals
/// are uniform, so `constC[i][j]` reduces to row means of `f1(C1)` and
/// `f2(C2)`.
struct GwTerms {
    const_c: Array2<f64>,
    h_c1: Array2<f64>,
    h_c2: Array2<f64>,
    n: usize,
}

impl GwTerms {
    fn new(c1: &Array2<f64>, c2: &Array2<f64>, loss_fun: LossFun) -> Self {
        let n = c1.nrows();

        let (f_c1, f_c2, h_c1, h_c2) = match loss_fun {
            LossFun::SquareLoss => (
                c1.mapv(|v| v * v),
                c2.mapv(|v| v * v),
                c1.clone(),
                c2.mapv(|v| 2.0 * v),
            ),
            LossFun::KlLoss => (
                c1.mapv(|v| v * (v + LOG_GUARD).ln() - v),
                c2.clone(),
                c1.clone(),
                c2.mapv(|v| (v + LOG_GUARD).ln()),
            ),
        };

        let row_means_1: Array1<f64> = f_c1.sum_axis(ndarray::Axis(1)) / n as f64;
        let row_means_2: Array1<f64> = f_c2.sum_axis(ndarray::Axis(1)) / n as f64;
        let const_c = Array2::from_shape_fn((n, n), |(i, j)| row_means_1[i] + row_means_2[j]);

        GwTerms {
            const_c,
            h_c1,
            h_c2,
            n,
        }
    }

    /// Loss tensor `constC − h1(C1)·T·h2(C2)ᵀ` for the coupling `t`.
    fn tensor(&self, t: &Array2<f64>) -> Array2<f64> {
        &self.const_c - &self.h_c1.dot(t).dot(&self.h_c2.t())
    }

    /// GW objective value `⟨tensor(T), T⟩`.
    fn objective(&self, t: &Array2<f64>) -> f64 {
        (&self.tensor(t) * t).sum()
    }

    /// Learn the coupling by entropic-regularised projected iterations.
    ///
    /// Each outer step linearises the objective at the current coupling and
    /// projects onto the uniform-marginal polytope with a Sinkhorn loop. The
    /// Gibbs kernel is shifted by the tensor minimum before exponentiation so
    /// the scaling stays in range for small `EPSILON`.
    fn solve_entropic(&self) -> (Array2<f64>, f64) {
        let n = self.n;
        let uniform = 1.0 / n as f64;
        let p = Array1::from_elem(n, uniform);
        let q = Array1::from_elem(n, uniform);

        // Independent coupling p qᵀ as the starting point.
        let mut t = Array2::from_elem((n, n), uniform * uniform);

        for iter in 0..MAX_OUTER_ITERS {
            let tens = self.tensor(&t);
            let shift = tens.fold(f64::INFINITY, |m, &v| m.min(v));
            let kernel = tens.mapv(|v| (-(v - shift) / EPSILON).exp());

            let mut u = Array1::from_elem(n, uniform);
            let mut v = Array1::from_elem(n, uniform);
            for _ in 0..MAX_SINKHORN_ITERS {
                let kv = kernel.dot(&v).mapv(|x| x + f64::MIN_POSITIVE);
                u = &p / &kv;
                let ktu = kernel.t().dot(&u).mapv(|x| x + f64::MIN_POSITIVE);
                let v_next = &q / &ktu;

                let delta = (&v_next - &v).mapv(f64::abs).sum();
                v = v_next;
                if delta < CONVERGENCE_TOL {
                    break;
                }
            }
            // The last update touched v, leaving u stale. Rebalance u against
            // the final v so the row marginals of T hold by construction.
            let kv = kernel.dot(&v).mapv(|x| x + f64::MIN_POSITIVE);
            u = &p / &kv;

            let t_next = Array2::from_shape_fn((n, n), |(i, j)| u[i] * kernel[[i, j]] * v[j]);
            let change = (&t_next - &t)
                .fold(0.0_f64, |acc, &d| acc.max(d.abs()));
            t = t_next;

            if change < CONVERGENCE_TOL {
                debug!("entropic GW converged after {} outer iterations", iter + 1);
                break;
            }
        }

        let dist = self.objective(&t);
        (t, dist)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
