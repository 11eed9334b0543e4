//! Similarity-matrix engine.
//!
//! The engine drives any [`SimilarityStrategy`] over an ordered model list
//! and produces the dense N×N matrix of pairwise scores. Work is organised
//! per outer row: the row model's representation is loaded once, then the
//! comparisons against all later models run concurrently on a bounded worker
//! pool. Only the upper triangle is computed; a final mirror pass copies it
//! below the diagonal, so the result is symmetric by construction.
//!
//! Any failure aborts the whole run. A partially-filled matrix is not a
//! valid result, so there is no partial-success mode.

use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SimilarityConfig;
use crate::error::{SimilarityError, SimilarityResult};
use crate::strategy::{build_strategy, SimilarityStrategy};
use crate::validate::validate_model_set;

// ---------------------------------------------------------------------------
// SimilarityRun
// ---------------------------------------------------------------------------

/// Result of one matrix computation.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityRun {
    /// Deterministic name of the strategy configuration that produced this
    /// matrix; downstream aggregation keys result files on it.
    pub config_name: String,
    /// Models covered by the matrix, in matrix-index order.
    pub model_ids: Vec<String>,
    /// Dense symmetric N×N score matrix; `matrix[[i, j]]` scores
    /// `model_ids[i]` against `model_ids[j]`.
    #[serde(serialize_with = "serialize_matrix")]
    pub matrix: Array2<f64>,
}

fn serialize_matrix<S>(matrix: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let rows: Vec<Vec<f64>> = matrix.rows().into_iter().map(|r| r.to_vec()).collect();
    rows.serialize(serializer)
}

impl SimilarityRun {
    /// Write this result as pretty-printed JSON to `path`, creating parent
    /// directories if necessary.
    pub fn save_json(&self, path: &std::path::Path) -> SimilarityResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| SimilarityError::io(parent, source))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            SimilarityError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        std::fs::write(path, json).map_err(|source| SimilarityError::io(path, source))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SimilarityEngine
// ---------------------------------------------------------------------------

/// Pairwise-comparison driver with a bounded worker pool.
#[derive(Debug)]
pub struct SimilarityEngine {
    max_workers: usize,
}

impl SimilarityEngine {
    /// Create an engine that runs at most `max_workers` comparisons at once.
    pub fn new(max_workers: usize) -> Self {
        SimilarityEngine { max_workers }
    }

    /// Compute the full score matrix of `strategy` over `model_ids`.
    ///
    /// `model_ids` is taken as-is; callers wanting deterministic ordering and
    /// artifact checking go through [`compute_similarity_matrix`], which runs
    /// [`validate_model_set`] first.
    pub fn run(
        &self,
        strategy: &dyn SimilarityStrategy,
        model_ids: &[String],
    ) -> SimilarityResult<SimilarityRun> {
        let n = model_ids.len();
        let config_name = strategy.config_name();
        info!(
            "computing {n}x{n} similarity matrix ({config_name}) with {} worker(s)",
            self.max_workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_workers)
            .build()?;

        let mut matrix = strategy.prepare_matrix(n);

        for (i, model_a) in model_ids.iter().enumerate() {
            if i + 1 == n {
                break;
            }
            // Loaded once per outer row, shared by all comparisons of the row.
            let rep_a = strategy.load_representation(model_a)?;

            // Fail-fast: collecting into Result aborts the row on the first
            // error any worker hits.
            let row: Vec<(usize, f64)> = pool.install(|| {
                (i + 1..n)
                    .into_par_iter()
                    .map(|j| {
                        let rep_b = strategy.load_representation(&model_ids[j])?;
                        let score = strategy.compare(&rep_a, &rep_b)?;
                        Ok((j, score))
                    })
                    .collect::<SimilarityResult<Vec<_>>>()
            })?;

            for (j, score) in row {
                matrix[[i, j]] = score;
            }
            debug!("row {}/{} done ({})", i + 1, n, model_a);
        }

        // Mirror the upper triangle; the diagonal keeps its seeded value.
        for i in 0..n {
            for j in (i + 1)..n {
                matrix[[j, i]] = matrix[[i, j]];
            }
        }

        Ok(SimilarityRun {
            config_name,
            model_ids: model_ids.to_vec(),
            matrix,
        })
    }
}

// ---------------------------------------------------------------------------
// Top-level entry point
// ---------------------------------------------------------------------------

/// Validate, build, and run: the one-call path from a configuration and a
/// requested model list to a finished [`SimilarityRun`].
///
/// The requested IDs are deduplicated, pruned to those with existing feature
/// artifacts, and sorted lexicographically before the matrix is computed, so
/// the same request always yields the same index assignment.
pub fn compute_similarity_matrix(
    cfg: &SimilarityConfig,
    model_ids: &[String],
) -> SimilarityResult<SimilarityRun> {
    let strategy = build_strategy(cfg)?;
    let kept = validate_model_set(&cfg.feature_root, model_ids, &cfg.split)?;
    let engine = SimilarityEngine::new(cfg.max_workers);
    engine.run(strategy.as_ref(), &kept)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
