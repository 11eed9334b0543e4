//! Representational Similarity Analysis.
//!
//! RSA reduces each model's feature tensor to a representational
//! dissimilarity matrix (RDM) over the samples, then scores two models by
//! correlating their RDMs. Because the RDM only records relative sample
//! geometry, RSA compares models whose embedding spaces have different
//! dimensionality without any alignment step.
//!
//! The RDM is built once per model inside
//! [`load_representation`](super::SimilarityStrategy::load_representation),
//! so the pairwise comparison itself is just a correlation over the strict
//! upper triangle of the two matrices.

use crate::config::{CorrMethod, RsaMethod};
use crate::error::SimilarityResult;
use crate::stats::{
    cosine_distances, pearson, row_correlation_matrix, spearman, upper_triangle_values,
};
use crate::store::FeatureStore;

use super::{check_same_rows, Representation, SimilarityStrategy};

// ---------------------------------------------------------------------------
// RsaStrategy
// ---------------------------------------------------------------------------

/// RSA comparison over per-model RDMs.
#[derive(Debug)]
pub struct RsaStrategy {
    store: FeatureStore,
    rsa_method: RsaMethod,
    corr_method: CorrMethod,
}

impl RsaStrategy {
    /// Create an RSA strategy over `store`.
    ///
    /// `corr_method` is only consulted when `rsa_method` is
    /// [`RsaMethod::Correlation`]; the cosine RDM variant always correlates
    /// with Spearman.
    pub fn new(store: FeatureStore, rsa_method: RsaMethod, corr_method: CorrMethod) -> Self {
        RsaStrategy {
            store,
            rsa_method,
            corr_method,
        }
    }

    /// RDM of `x`: per-sample-pair dissimilarity, zero diagonal, symmetric.
    fn compute_rdm(&self, x: &ndarray::Array2<f64>) -> ndarray::Array2<f64> {
        match self.rsa_method {
            RsaMethod::Correlation => {
                let corr = row_correlation_matrix(x);
                corr.mapv(|v| 1.0 - v)
            }
            RsaMethod::Cosine => cosine_distances(x),
        }
    }

    /// Correlation applied between two flattened RDMs.
    ///
    /// The cosine-RDM variant always uses Spearman, ignoring `corr_method`.
    /// Its config name carries no correlation tag, so honouring `corr_method`
    /// there would let two differently-parameterised runs collide on the same
    /// result key.
    fn correlate(&self, a: &[f64], b: &[f64]) -> f64 {
        let corr = match self.rsa_method {
            RsaMethod::Correlation => self.corr_method,
            RsaMethod::Cosine => CorrMethod::Spearman,
        };
        match corr {
            CorrMethod::Pearson => pearson(a, b),
            CorrMethod::Spearman => spearman(a, b),
        }
    }
}

impl SimilarityStrategy for RsaStrategy {
    fn load_representation(&self, model_id: &str) -> SimilarityResult<Representation> {
        let features = self.store.load(model_id)?;
        Ok(Representation::new(model_id, self.compute_rdm(&features)))
    }

    fn compare(&self, a: &Representation, b: &Representation) -> SimilarityResult<f64> {
        check_same_rows(a, b)?;
        let tri_a = upper_triangle_values(&a.data);
        let tri_b = upper_triangle_values(&b.data);
        Ok(self.correlate(&tri_a, &tri_b))
    }

    fn config_name(&self) -> String {
        match self.rsa_method {
            RsaMethod::Correlation => format!(
                "rsa_method_{}_corr_method_{}",
                self.rsa_method, self.corr_method
            ),
            RsaMethod::Cosine => format!("rsa_method_{}", self.rsa_method),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
