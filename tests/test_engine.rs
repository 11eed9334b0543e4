//! End-to-end tests for the similarity-matrix pipeline: feature artifacts on
//! disk in, finished matrix out.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use ndarray_npy::WriteNpyExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tempfile::tempdir;

use model_similarity::config::{SimilarityConfig, SimilarityMethod};
use model_similarity::engine::compute_similarity_matrix;
use model_similarity::error::SimilarityError;
use model_similarity::strategy::build_strategy;

/// Write a seeded pseudo-random feature artifact for `(model_id, split)`.
fn write_features(root: &Path, model_id: &str, split: &str, rows: usize, dim: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let arr = Array2::<f32>::from_shape_fn((rows, dim), |_| rng.gen_range(-1.0..1.0));
    let dir = root.join(model_id);
    std::fs::create_dir_all(&dir).unwrap();
    let file = std::fs::File::create(dir.join(format!("features_{split}.npy"))).unwrap();
    arr.write_npy(file).unwrap();
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn cka_config(feature_root: &Path) -> SimilarityConfig {
    SimilarityConfig {
        method: SimilarityMethod::Cka,
        feature_root: feature_root.to_path_buf(),
        ..SimilarityConfig::default()
    }
}

#[test]
fn three_model_cka_matrix_is_symmetric_with_unit_diagonal() {
    let tmp = tempdir().unwrap();
    for (i, model) in ["model_a", "model_b", "model_c"].iter().enumerate() {
        write_features(tmp.path(), model, "train", 40, 8, i as u64);
    }

    let cfg = cka_config(tmp.path());
    let run = compute_similarity_matrix(&cfg, &ids(&["model_a", "model_b", "model_c"])).unwrap();

    assert_eq!(run.matrix.dim(), (3, 3));
    assert_eq!(run.model_ids, ids(&["model_a", "model_b", "model_c"]));
    for i in 0..3 {
        assert_abs_diff_eq!(run.matrix[[i, i]], 1.0, epsilon = 1e-12);
        for j in 0..3 {
            assert_abs_diff_eq!(run.matrix[[i, j]], run.matrix[[j, i]], epsilon = 1e-12);
            assert!(run.matrix[[i, j]].abs() <= 1.0 + 1e-9);
        }
    }
}

#[test]
fn self_similarity_across_duplicate_artifacts_is_one() {
    let tmp = tempdir().unwrap();
    // Same seed: byte-identical feature tensors under two model IDs.
    write_features(tmp.path(), "twin_a", "train", 30, 6, 99);
    write_features(tmp.path(), "twin_b", "train", 30, 6, 99);

    let cfg = cka_config(tmp.path());
    let run = compute_similarity_matrix(&cfg, &ids(&["twin_a", "twin_b"])).unwrap();
    assert_abs_diff_eq!(run.matrix[[0, 1]], 1.0, epsilon = 1e-9);
}

#[test]
fn worker_count_does_not_change_the_matrix() {
    let tmp = tempdir().unwrap();
    for (i, model) in ["m1", "m2", "m3", "m4"].iter().enumerate() {
        write_features(tmp.path(), model, "train", 25, 5, 10 + i as u64);
    }
    let models = ids(&["m1", "m2", "m3", "m4"]);

    let mut sequential_cfg = cka_config(tmp.path());
    sequential_cfg.max_workers = 1;
    let mut concurrent_cfg = cka_config(tmp.path());
    concurrent_cfg.max_workers = 4;

    let sequential = compute_similarity_matrix(&sequential_cfg, &models).unwrap();
    let concurrent = compute_similarity_matrix(&concurrent_cfg, &models).unwrap();
    assert_eq!(sequential.matrix, concurrent.matrix);
}

#[test]
fn requested_ids_are_sorted_and_deduplicated() {
    let tmp = tempdir().unwrap();
    for model in ["zebra", "alpha"] {
        write_features(tmp.path(), model, "train", 20, 4, 1);
    }

    let cfg = cka_config(tmp.path());
    let run = compute_similarity_matrix(&cfg, &ids(&["zebra", "alpha", "zebra"])).unwrap();
    assert_eq!(run.model_ids, ids(&["alpha", "zebra"]));
    assert_eq!(run.matrix.dim(), (2, 2));
}

#[test]
fn mismatched_sample_counts_abort_the_run() {
    let tmp = tempdir().unwrap();
    write_features(tmp.path(), "hundred", "train", 100, 4, 1);
    write_features(tmp.path(), "ninety", "train", 90, 4, 2);

    let cfg = cka_config(tmp.path());
    match compute_similarity_matrix(&cfg, &ids(&["hundred", "ninety"])) {
        Err(SimilarityError::ShapeMismatch {
            model_a,
            model_b,
            rows_a,
            rows_b,
        }) => {
            assert_eq!((model_a.as_str(), rows_a), ("hundred", 100));
            assert_eq!((model_b.as_str(), rows_b), ("ninety", 90));
        }
        other => panic!("expected ShapeMismatch, got {other:?}"),
    }
}

#[test]
fn missing_artifacts_prune_down_to_insufficient_models() {
    let tmp = tempdir().unwrap();
    write_features(tmp.path(), "only_one", "train", 20, 4, 1);

    let cfg = cka_config(tmp.path());
    let requested = ids(&["only_one", "gone_a", "gone_b", "gone_c", "gone_d"]);
    match compute_similarity_matrix(&cfg, &requested) {
        Err(SimilarityError::InsufficientModels { found, removed }) => {
            assert_eq!(found, 1);
            assert_eq!(removed.len(), 4);
        }
        other => panic!("expected InsufficientModels, got {other:?}"),
    }
}

#[test]
fn subset_indices_restrict_every_loaded_tensor() {
    let tmp = tempdir().unwrap();
    let feature_root = tmp.path().join("features");
    let subset_root = tmp.path().join("subsets");
    std::fs::create_dir_all(&subset_root).unwrap();

    write_features(&feature_root, "big_a", "train", 1000, 4, 1);
    write_features(&feature_root, "big_b", "train", 1000, 4, 2);

    let indices: Vec<usize> = (0..50).map(|i| i * 20).collect();
    std::fs::write(
        subset_root.join("subset_indices_train.json"),
        serde_json::to_string(&indices).unwrap(),
    )
    .unwrap();

    let cfg = SimilarityConfig {
        feature_root: feature_root.clone(),
        subset_root: Some(subset_root),
        ..SimilarityConfig::default()
    };

    // CKA representations are the raw tensors, so the restriction is visible.
    let strategy = build_strategy(&cfg).unwrap();
    for model in ["big_a", "big_b"] {
        let rep = strategy.load_representation(model).unwrap();
        assert_eq!(rep.data.dim(), (50, 4));
    }

    let run = compute_similarity_matrix(&cfg, &ids(&["big_a", "big_b"])).unwrap();
    assert_eq!(run.matrix.dim(), (2, 2));
}

#[test]
fn result_json_contains_ids_and_matrix() {
    let tmp = tempdir().unwrap();
    write_features(tmp.path(), "a", "train", 20, 4, 1);
    write_features(tmp.path(), "b", "train", 20, 4, 2);

    let cfg = cka_config(tmp.path());
    let run = compute_similarity_matrix(&cfg, &ids(&["a", "b"])).unwrap();
    assert_eq!(run.config_name, "cka_kernel_linear_unbiased");

    let out = tmp.path().join("out").join(format!("{}.json", run.config_name));
    run.save_json(&out).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(value["config_name"], "cka_kernel_linear_unbiased");
    assert_eq!(value["model_ids"].as_array().unwrap().len(), 2);
    assert_eq!(value["matrix"][0][0], 1.0);
}
