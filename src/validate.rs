//! Model-set validation.
//!
//! Before any comparison runs, the requested model-ID list is pruned down to
//! the models whose feature artifacts actually exist for the split. The
//! surviving list is deduplicated and sorted lexicographically, which makes
//! the matrix-index assignment deterministic for a given request.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::warn;

use crate::error::{SimilarityError, SimilarityResult};
use crate::store::feature_artifact_exists;

/// Filter `requested` down to model IDs with an existing feature artifact for
/// `split` under `feature_root`.
///
/// Duplicates are removed and the result is sorted lexicographically. Removed
/// IDs are logged at `warn` level for observability; the input is never
/// mutated.
///
/// # Errors
///
/// Returns [`SimilarityError::InsufficientModels`] when fewer than two models
/// survive — pairwise similarity is undefined for 0 or 1 models.
pub fn validate_model_set(
    feature_root: &Path,
    requested: &[String],
    split: &str,
) -> SimilarityResult<Vec<String>> {
    // BTreeSet deduplicates and yields lexicographic order in one pass.
    let unique: BTreeSet<&str> = requested.iter().map(String::as_str).collect();

    let mut kept: Vec<String> = Vec::with_capacity(unique.len());
    let mut removed: Vec<String> = Vec::new();

    for model_id in unique {
        if feature_artifact_exists(feature_root, model_id, split) {
            kept.push(model_id.to_string());
        } else {
            removed.push(model_id.to_string());
        }
    }

    if !removed.is_empty() {
        warn!(
            "Features do not exist for {} model(s): {:?}; removing them from \
             the similarity computation",
            removed.len(),
            removed
        );
    }

    if kept.len() < 2 {
        return Err(SimilarityError::InsufficientModels {
            found: kept.len(),
            removed,
        });
    }

    Ok(kept)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch_artifact(root: &Path, model_id: &str, split: &str) {
        let dir = root.join(model_id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("features_{split}.npy")), b"stub").unwrap();
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn keeps_existing_models_sorted() {
        let tmp = tempdir().unwrap();
        touch_artifact(tmp.path(), "vit_b16", "train");
        touch_artifact(tmp.path(), "clip", "train");
        touch_artifact(tmp.path(), "resnet50", "train");

        let requested = ids(&["vit_b16", "resnet50", "clip"]);
        let kept = validate_model_set(tmp.path(), &requested, "train").unwrap();
        assert_eq!(kept, ids(&["clip", "resnet50", "vit_b16"]));
    }

    #[test]
    fn removes_models_without_artifacts() {
        let tmp = tempdir().unwrap();
        touch_artifact(tmp.path(), "a", "train");
        touch_artifact(tmp.path(), "b", "train");

        let requested = ids(&["a", "b", "ghost"]);
        let kept = validate_model_set(tmp.path(), &requested, "train").unwrap();
        assert_eq!(kept, ids(&["a", "b"]));
    }

    #[test]
    fn deduplicates_requested_ids() {
        let tmp = tempdir().unwrap();
        touch_artifact(tmp.path(), "a", "train");
        touch_artifact(tmp.path(), "b", "train");

        let requested = ids(&["a", "a", "b", "a"]);
        let kept = validate_model_set(tmp.path(), &requested, "train").unwrap();
        assert_eq!(kept, ids(&["a", "b"]));
    }

    #[test]
    fn never_longer_than_deduplicated_input() {
        let tmp = tempdir().unwrap();
        for id in ["m1", "m2", "m3"] {
            touch_artifact(tmp.path(), id, "train");
        }
        let requested = ids(&["m1", "m1", "m2", "m3", "m3"]);
        let kept = validate_model_set(tmp.path(), &requested, "train").unwrap();
        assert!(kept.len() <= 3);
    }

    #[test]
    fn fewer_than_two_survivors_is_fatal() {
        let tmp = tempdir().unwrap();
        touch_artifact(tmp.path(), "lonely", "train");

        let requested = ids(&["lonely", "gone1", "gone2", "gone3", "gone4"]);
        match validate_model_set(tmp.path(), &requested, "train") {
            Err(SimilarityError::InsufficientModels { found, removed }) => {
                assert_eq!(found, 1);
                assert_eq!(removed.len(), 4);
            }
            other => panic!("expected InsufficientModels, got {other:?}"),
        }
    }

    #[test]
    fn split_is_respected() {
        let tmp = tempdir().unwrap();
        touch_artifact(tmp.path(), "a", "train");
        touch_artifact(tmp.path(), "b", "train");

        // Artifacts exist for train only.
        assert!(validate_model_set(tmp.path(), &ids(&["a", "b"]), "test").is_err());
        assert!(validate_model_set(tmp.path(), &ids(&["a", "b"]), "train").is_ok());
    }
}
