//! Feature-artifact access for similarity computation.
//!
//! A [`FeatureStore`] locates and loads the per-model feature tensors that the
//! comparison strategies consume. Artifacts are dense 2-D `f32` NPY files laid
//! out as:
//!
//! ```text
//! <feature_root>/
//!   <model_id>/
//!     features_train.npy    # (num_samples, embedding_dim)
//!     features_test.npy
//!   <model_id>/
//!     ...
//! ```
//!
//! Tensors are widened to `f64` on load; all kernel math downstream runs in
//! double precision. An optional per-split subset-index file
//! (`subset_indices_{split}.json` under a separate subset root) restricts
//! every loaded tensor to the same ordered row subset, so all compared
//! tensors keep matching row counts and ordering.

use ndarray::{Array2, Axis};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ConfigError, SimilarityError, SimilarityResult};

// ---------------------------------------------------------------------------
// Artifact layout
// ---------------------------------------------------------------------------

/// Path of the feature artifact for `(model_id, split)` under `feature_root`.
pub fn feature_artifact_path(feature_root: &Path, model_id: &str, split: &str) -> PathBuf {
    feature_root
        .join(model_id)
        .join(format!("features_{split}.npy"))
}

/// Returns `true` when the feature artifact for `(model_id, split)` exists.
pub fn feature_artifact_exists(feature_root: &Path, model_id: &str, split: &str) -> bool {
    feature_artifact_path(feature_root, model_id, split).exists()
}

// ---------------------------------------------------------------------------
// Subset indices
// ---------------------------------------------------------------------------

/// Load the ordered subset indices for `split` from `subset_root`, if any.
///
/// A missing subset root or missing index file is not an error: the run
/// degrades gracefully to full, unrestricted features with a `warn!` for
/// observability. A present-but-malformed file is a hard error, since
/// silently ignoring it would change which samples are compared.
pub fn load_subset_indices(
    subset_root: Option<&Path>,
    split: &str,
) -> SimilarityResult<Option<Vec<usize>>> {
    let Some(root) = subset_root else {
        debug!("no subset root configured; using full feature tensors");
        return Ok(None);
    };

    let path = root.join(format!("subset_indices_{split}.json"));
    if !path.exists() {
        warn!(
            "Subset indices not found at {}. Continuing with full datasets.",
            path.display()
        );
        return Ok(None);
    }

    let contents =
        std::fs::read_to_string(&path).map_err(|source| SimilarityError::io(&path, source))?;
    let indices: Vec<usize> = serde_json::from_str(&contents).map_err(|e| {
        SimilarityError::Config(ConfigError::invalid_value(
            "subset_indices",
            format!("cannot parse {}: {e}", path.display()),
        ))
    })?;

    debug!(
        "loaded {} subset indices for split `{split}` from {}",
        indices.len(),
        path.display()
    );
    Ok(Some(indices))
}

// ---------------------------------------------------------------------------
// FeatureStore
// ---------------------------------------------------------------------------

/// Read-only accessor for per-model feature tensors of one split.
///
/// The store is pure I/O plus row indexing: it owns no tensors across calls
/// and performs no caching. It is `Send + Sync`, so one store can serve
/// concurrent pairwise-comparison workers.
#[derive(Debug, Clone)]
pub struct FeatureStore {
    feature_root: PathBuf,
    split: String,
    subset: Option<Vec<usize>>,
}

impl FeatureStore {
    /// Create a store rooted at `feature_root` for `split`.
    ///
    /// When `subset` is provided, every loaded tensor is restricted to those
    /// rows, in the given order, before it is returned.
    pub fn new(
        feature_root: impl Into<PathBuf>,
        split: impl Into<String>,
        subset: Option<Vec<usize>>,
    ) -> Self {
        FeatureStore {
            feature_root: feature_root.into(),
            split: split.into(),
            subset,
        }
    }

    /// The split this store serves.
    pub fn split(&self) -> &str {
        &self.split
    }

    /// Number of rows every loaded tensor will have, when a subset is active.
    pub fn subset_len(&self) -> Option<usize> {
        self.subset.as_ref().map(Vec::len)
    }

    /// Artifact path for `model_id` under this store's root and split.
    pub fn artifact_path(&self, model_id: &str) -> PathBuf {
        feature_artifact_path(&self.feature_root, model_id, &self.split)
    }

    /// Load the feature tensor for `model_id`, applying the subset restriction
    /// when one is configured.
    ///
    /// # Errors
    ///
    /// - [`SimilarityError::MissingArtifact`] when the file does not exist.
    /// - [`SimilarityError::Npy`] when the file is not a 2-D `f32` array.
    /// - [`SimilarityError::SubsetIndex`] when a subset index exceeds the
    ///   tensor's row count.
    pub fn load(&self, model_id: &str) -> SimilarityResult<Array2<f64>> {
        let path = self.artifact_path(model_id);
        if !path.exists() {
            return Err(SimilarityError::missing_artifact(model_id, path));
        }

        let features = load_npy_features(&path)?;

        match &self.subset {
            None => Ok(features),
            Some(indices) => {
                let rows = features.nrows();
                if let Some(&bad) = indices.iter().find(|&&i| i >= rows) {
                    return Err(SimilarityError::SubsetIndex { index: bad, rows });
                }
                Ok(features.select(Axis(0), indices))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// NPY helpers
// ---------------------------------------------------------------------------

/// Load a 2-D `f32` NPY array and widen it to `f64`.
fn load_npy_features(path: &Path) -> SimilarityResult<Array2<f64>> {
    use ndarray_npy::ReadNpyExt;

    let file = std::fs::File::open(path).map_err(|source| SimilarityError::io(path, source))?;
    let arr: ndarray::ArrayD<f32> = ndarray::ArrayD::read_npy(file)
        .map_err(|e| SimilarityError::npy(path, format!("NPY read error: {e}")))?;

    let shape = arr.shape().to_vec();
    let features = arr.into_dimensionality::<ndarray::Ix2>().map_err(|e| {
        SimilarityError::npy(
            path,
            format!("expected 2-D (samples, embedding_dim) array, got shape {shape:?}: {e}"),
        )
    })?;

    Ok(features.mapv(f64::from))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use ndarray_npy::WriteNpyExt;
    use tempfile::tempdir;

    fn write_features(root: &Path, model_id: &str, split: &str, rows: usize, dim: usize) {
        let dir = root.join(model_id);
        std::fs::create_dir_all(&dir).unwrap();
        let arr = Array2::<f32>::from_shape_fn((rows, dim), |(i, j)| (i * dim + j) as f32);
        let file = std::fs::File::create(dir.join(format!("features_{split}.npy"))).unwrap();
        arr.write_npy(file).unwrap();
    }

    #[test]
    fn load_returns_full_tensor_without_subset() {
        let tmp = tempdir().unwrap();
        write_features(tmp.path(), "resnet50", "train", 10, 4);

        let store = FeatureStore::new(tmp.path(), "train", None);
        let feats = store.load("resnet50").unwrap();
        assert_eq!(feats.dim(), (10, 4));
        // Widened values preserved exactly for small integers.
        assert_eq!(feats[[2, 3]], 11.0);
    }

    #[test]
    fn load_applies_subset_in_given_order() {
        let tmp = tempdir().unwrap();
        write_features(tmp.path(), "vit_b16", "train", 10, 2);

        let store = FeatureStore::new(tmp.path(), "train", Some(vec![7, 0, 3]));
        let feats = store.load("vit_b16").unwrap();
        assert_eq!(feats.dim(), (3, 2));
        assert_eq!(feats.row(0)[0], 14.0); // row 7
        assert_eq!(feats.row(1)[0], 0.0); // row 0
        assert_eq!(feats.row(2)[0], 6.0); // row 3
    }

    #[test]
    fn out_of_bounds_subset_index_is_an_error() {
        let tmp = tempdir().unwrap();
        write_features(tmp.path(), "clip", "train", 5, 2);

        let store = FeatureStore::new(tmp.path(), "train", Some(vec![0, 5]));
        match store.load("clip") {
            Err(SimilarityError::SubsetIndex { index, rows }) => {
                assert_eq!(index, 5);
                assert_eq!(rows, 5);
            }
            other => panic!("expected SubsetIndex error, got {other:?}"),
        }
    }

    #[test]
    fn missing_artifact_names_the_model() {
        let tmp = tempdir().unwrap();
        let store = FeatureStore::new(tmp.path(), "train", None);
        match store.load("absent_model") {
            Err(SimilarityError::MissingArtifact { model_id, .. }) => {
                assert_eq!(model_id, "absent_model");
            }
            other => panic!("expected MissingArtifact error, got {other:?}"),
        }
    }

    #[test]
    fn subset_indices_missing_file_degrades_to_none() {
        let tmp = tempdir().unwrap();
        let loaded = load_subset_indices(Some(tmp.path()), "train").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn subset_indices_round_trip() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join("subset_indices_train.json"),
            "[3, 1, 4, 1, 5]",
        )
        .unwrap();
        let loaded = load_subset_indices(Some(tmp.path()), "train").unwrap();
        assert_eq!(loaded, Some(vec![3, 1, 4, 1, 5]));
    }

    #[test]
    fn malformed_subset_file_is_a_hard_error() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join("subset_indices_train.json"), "not json").unwrap();
        assert!(load_subset_indices(Some(tmp.path()), "train").is_err());
    }
}
