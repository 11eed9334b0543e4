//! Comparison strategies and their dispatch factory.
//!
//! Every method (CKA, RSA, Gromov-Wasserstein) implements the same
//! four-operation contract, [`SimilarityStrategy`], so the matrix engine can
//! drive any of them without knowing which statistic is being computed:
//!
//! 1. [`prepare_matrix`](SimilarityStrategy::prepare_matrix) — seed the N×N
//!    matrix (this fixes the diagonal and the uncomputed-pair default);
//! 2. [`load_representation`](SimilarityStrategy::load_representation) — turn
//!    a model ID into the per-model object the method compares;
//! 3. [`compare`](SimilarityStrategy::compare) — pairwise scalar;
//! 4. [`config_name`](SimilarityStrategy::config_name) — deterministic
//!    identifier used downstream as the result-naming key.
//!
//! [`build_strategy`] maps a validated [`SimilarityConfig`] to a constructed
//! strategy; unknown tags and incoherent parameters fail here, before any
//! feature I/O.

use ndarray::Array2;

use crate::config::{SimilarityConfig, SimilarityMethod};
use crate::error::SimilarityResult;
use crate::store::{load_subset_indices, FeatureStore};

mod cka;
mod gw;
mod rsa;

pub use cka::CkaStrategy;
pub use gw::GwStrategy;
pub use rsa::RsaStrategy;

// ---------------------------------------------------------------------------
// Representation
// ---------------------------------------------------------------------------

/// A per-model object ready for pairwise comparison.
///
/// The payload depends on the strategy: raw feature tensors for CKA, an RDM
/// for RSA, a max-normalised self-distance matrix for Gromov-Wasserstein. The
/// model ID travels with the data so shape-mismatch diagnostics can name both
/// offenders.
#[derive(Debug, Clone)]
pub struct Representation {
    /// Model this representation was derived from.
    pub model_id: String,
    /// Strategy-specific payload; leading dimension is always the sample axis.
    pub data: Array2<f64>,
}

impl Representation {
    /// Create a representation for `model_id`.
    pub fn new(model_id: impl Into<String>, data: Array2<f64>) -> Self {
        Representation {
            model_id: model_id.into(),
            data,
        }
    }

    /// Sample count (leading dimension).
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }
}

/// Assert that two representations cover the same number of samples.
///
/// Mismatch is fatal and names both model IDs; representations are never
/// silently truncated or padded.
pub(crate) fn check_same_rows(a: &Representation, b: &Representation) -> SimilarityResult<()> {
    if a.rows() != b.rows() {
        return Err(crate::error::SimilarityError::shape_mismatch(
            &a.model_id,
            a.rows(),
            &b.model_id,
            b.rows(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SimilarityStrategy trait
// ---------------------------------------------------------------------------

/// Common contract for all pairwise comparison methods.
///
/// Implementations must be `Send + Sync` so one strategy instance can serve
/// the engine's concurrent pairwise workers. Strategies are immutable after
/// construction; all per-run state lives in the engine.
pub trait SimilarityStrategy: Send + Sync {
    /// Seeded N×N matrix returned before any pairwise fill.
    ///
    /// The default is all-ones, which leaves the diagonal at `1.0` for
    /// similarity methods (CKA, RSA) since only `i < j` cells are ever
    /// written. Distance methods override this with an all-zeros seed.
    fn prepare_matrix(&self, n: usize) -> Array2<f64> {
        Array2::ones((n, n))
    }

    /// Load and derive the comparable representation for `model_id`.
    fn load_representation(&self, model_id: &str) -> SimilarityResult<Representation>;

    /// Pairwise similarity (or distance) between two representations.
    ///
    /// Implementations check leading-dimension equality first and return
    /// [`SimilarityError::ShapeMismatch`] naming both models on violation.
    ///
    /// [`SimilarityError::ShapeMismatch`]: crate::error::SimilarityError::ShapeMismatch
    fn compare(&self, a: &Representation, b: &Representation) -> SimilarityResult<f64>;

    /// Deterministic identifier encoding the strategy and its parameters.
    ///
    /// Two instances constructed from identical parameters produce identical
    /// strings; downstream aggregation keys result files on this name.
    fn config_name(&self) -> String;
}

// ---------------------------------------------------------------------------
// Dispatch factory
// ---------------------------------------------------------------------------

/// Build the strategy described by `cfg`.
///
/// Validation is eager: unknown tags, an invalid `sigma`, or a missing
/// coupling output root fail here, before any feature tensor is touched.
/// Subset indices are resolved once and shared by every feature load of the
/// run.
pub fn build_strategy(cfg: &SimilarityConfig) -> SimilarityResult<Box<dyn SimilarityStrategy>> {
    cfg.validate()?;

    let subset = load_subset_indices(cfg.subset_root.as_deref(), &cfg.split)?;
    let store = FeatureStore::new(&cfg.feature_root, &cfg.split, subset);

    let strategy: Box<dyn SimilarityStrategy> = match cfg.method {
        SimilarityMethod::Cka => {
            Box::new(CkaStrategy::new(store, cfg.kernel, cfg.unbiased, cfg.sigma))
        }
        SimilarityMethod::Rsa => Box::new(RsaStrategy::new(store, cfg.rsa_method, cfg.corr_method)),
        SimilarityMethod::GromovWasserstein => Box::new(GwStrategy::new(
            store,
            cfg.cost_fun,
            cfg.loss_fun,
            cfg.fixed_coupling,
            if cfg.store_coupling {
                cfg.output_root.clone()
            } else {
                None
            },
        )),
    };

    Ok(strategy)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
