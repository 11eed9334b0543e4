//! Cross-method behaviour of the comparison strategies driven through the
//! public configuration and factory surface.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tempfile::tempdir;

use model_similarity::config::{
    CkaKernel, CorrMethod, CostFun, LossFun, RsaMethod, SimilarityConfig, SimilarityMethod,
};
use model_similarity::engine::compute_similarity_matrix;
use model_similarity::strategy::build_strategy;

fn write_array(root: &Path, model_id: &str, arr: &Array2<f32>) {
    let dir = root.join(model_id);
    std::fs::create_dir_all(&dir).unwrap();
    let file = std::fs::File::create(dir.join("features_train.npy")).unwrap();
    arr.write_npy(file).unwrap();
}

fn random_features(rows: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, dim), |_| rng.gen_range(-1.0..1.0))
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn rsa_spearman_identical_tensors_score_one() {
    let tmp = tempdir().unwrap();
    let features = random_features(30, 6, 7);
    write_array(tmp.path(), "left", &features);
    write_array(tmp.path(), "right", &features);

    let cfg = SimilarityConfig {
        method: SimilarityMethod::Rsa,
        rsa_method: RsaMethod::Correlation,
        corr_method: CorrMethod::Spearman,
        feature_root: tmp.path().to_path_buf(),
        ..SimilarityConfig::default()
    };
    let run = compute_similarity_matrix(&cfg, &ids(&["left", "right"])).unwrap();
    assert_abs_diff_eq!(run.matrix[[0, 1]], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(run.matrix[[0, 0]], 1.0, epsilon = 1e-12);
}

#[test]
fn rsa_compares_models_of_different_embedding_dims() {
    let tmp = tempdir().unwrap();
    write_array(tmp.path(), "narrow", &random_features(25, 4, 1));
    write_array(tmp.path(), "wide", &random_features(25, 16, 2));

    let cfg = SimilarityConfig {
        method: SimilarityMethod::Rsa,
        feature_root: tmp.path().to_path_buf(),
        ..SimilarityConfig::default()
    };
    let run = compute_similarity_matrix(&cfg, &ids(&["narrow", "wide"])).unwrap();
    assert!(run.matrix[[0, 1]].abs() <= 1.0 + 1e-9);
}

#[test]
fn gw_fixed_coupling_is_translation_invariant() {
    let tmp = tempdir().unwrap();
    let base = random_features(20, 3, 11);
    let shifted = &base + 5.0_f32;
    write_array(tmp.path(), "base", &base);
    write_array(tmp.path(), "shifted", &shifted);

    let cfg = SimilarityConfig {
        method: SimilarityMethod::GromovWasserstein,
        fixed_coupling: true,
        feature_root: tmp.path().to_path_buf(),
        ..SimilarityConfig::default()
    };
    let run = compute_similarity_matrix(&cfg, &ids(&["base", "shifted"])).unwrap();
    // Self-distance matrices of a cloud and its translate are identical.
    assert_abs_diff_eq!(run.matrix[[0, 1]], 0.0, epsilon = 1e-6);
    // Distance matrix: zero diagonal, symmetric.
    assert_abs_diff_eq!(run.matrix[[0, 0]], 0.0, epsilon = 1e-12);
    assert_abs_diff_eq!(run.matrix[[1, 0]], run.matrix[[0, 1]], epsilon = 1e-12);
}

#[test]
fn gw_learned_coupling_yields_finite_nonnegative_scores() {
    let tmp = tempdir().unwrap();
    write_array(tmp.path(), "g1", &random_features(15, 3, 21));
    write_array(tmp.path(), "g2", &random_features(15, 5, 22));

    let cfg = SimilarityConfig {
        method: SimilarityMethod::GromovWasserstein,
        feature_root: tmp.path().to_path_buf(),
        ..SimilarityConfig::default()
    };
    let run = compute_similarity_matrix(&cfg, &ids(&["g1", "g2"])).unwrap();
    let dist = run.matrix[[0, 1]];
    assert!(dist.is_finite());
    assert!(dist > -1e-6, "GW distance should be nonnegative, got {dist}");
}

#[test]
fn gw_stores_coupling_matrices_when_requested() {
    let tmp = tempdir().unwrap();
    let feature_root = tmp.path().join("features");
    let coupling_root = tmp.path().join("couplings");
    std::fs::create_dir_all(&coupling_root).unwrap();

    let n = 12;
    write_array(&feature_root, "cm_a", &random_features(n, 3, 31));
    write_array(&feature_root, "cm_b", &random_features(n, 3, 32));

    let cfg = SimilarityConfig {
        method: SimilarityMethod::GromovWasserstein,
        fixed_coupling: true,
        store_coupling: true,
        output_root: Some(coupling_root.clone()),
        feature_root,
        ..SimilarityConfig::default()
    };
    compute_similarity_matrix(&cfg, &ids(&["cm_a", "cm_b"])).unwrap();

    let path = coupling_root.join("cm_a_cm_b_coupling.npy");
    assert!(path.exists());

    // Fixed coupling is the uniform diagonal I/n.
    let file = std::fs::File::open(&path).unwrap();
    let coupling = Array2::<f64>::read_npy(file).unwrap();
    assert_eq!(coupling.dim(), (n, n));
    assert_abs_diff_eq!(coupling[[0, 0]], 1.0 / n as f64, epsilon = 1e-12);
    assert_abs_diff_eq!(coupling[[0, 1]], 0.0, epsilon = 1e-12);
}

#[test]
fn config_names_differentiate_parameters() {
    let base = SimilarityConfig::default();

    let linear = build_strategy(&base).unwrap().config_name();
    assert_eq!(linear, "cka_kernel_linear_unbiased");

    let rbf_02 = SimilarityConfig {
        kernel: CkaKernel::Rbf,
        sigma: Some(0.2),
        ..base.clone()
    };
    let rbf_04 = SimilarityConfig {
        kernel: CkaKernel::Rbf,
        sigma: Some(0.4),
        ..base.clone()
    };
    let name_02 = build_strategy(&rbf_02).unwrap().config_name();
    let name_04 = build_strategy(&rbf_04).unwrap().config_name();
    assert_eq!(name_02, "cka_kernel_rbf_unbiased_sigma_0.2");
    assert_ne!(name_02, name_04);

    let gw = SimilarityConfig {
        method: SimilarityMethod::GromovWasserstein,
        cost_fun: CostFun::Cosine,
        loss_fun: LossFun::KlLoss,
        ..base
    };
    assert_eq!(
        build_strategy(&gw).unwrap().config_name(),
        "gw_sim_cost_learned_coupling_fun_cosine_loss_fun_kl_loss"
    );
}

#[test]
fn rbf_cka_of_identical_models_is_one() {
    let tmp = tempdir().unwrap();
    let features = random_features(20, 4, 41);
    write_array(tmp.path(), "r1", &features);
    write_array(tmp.path(), "r2", &features);

    let cfg = SimilarityConfig {
        kernel: CkaKernel::Rbf,
        sigma: Some(0.5),
        feature_root: tmp.path().to_path_buf(),
        ..SimilarityConfig::default()
    };
    let run = compute_similarity_matrix(&cfg, &ids(&["r1", "r2"])).unwrap();
    assert_abs_diff_eq!(run.matrix[[0, 1]], 1.0, epsilon = 1e-9);
}
