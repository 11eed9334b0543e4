//! `similarity` binary — compute a pairwise model-similarity matrix.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin similarity -- --feature-root features resnet50 vit_b16 clip
//! cargo run --bin similarity -- --feature-root features --method rsa \
//!     --rsa-method correlation --corr-method spearman resnet50 vit_b16
//! cargo run --bin similarity -- --config run.json resnet50 vit_b16
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use model_similarity::config::{
    CkaKernel, CorrMethod, CostFun, LossFun, RsaMethod, SimilarityConfig, SimilarityMethod,
};
use model_similarity::engine::compute_similarity_matrix;

/// Command-line arguments for the similarity binary.
///
/// Every flag is optional; unset flags fall back to the JSON config file when
/// `--config` is given, and to the built-in defaults otherwise.
#[derive(Parser, Debug)]
#[command(
    name = "similarity",
    version,
    about = "Pairwise model-similarity matrix computation",
    long_about = None
)]
struct Args {
    /// Path to a JSON configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root directory holding `{model_id}/features_{split}.npy` artifacts.
    #[arg(long, value_name = "DIR")]
    feature_root: Option<PathBuf>,

    /// Directory holding `subset_indices_{split}.json`.
    #[arg(long, value_name = "DIR")]
    subset_root: Option<PathBuf>,

    /// Directory receiving the result JSON file.
    #[arg(long, value_name = "DIR", default_value = "model_similarities")]
    output: PathBuf,

    /// Dataset split the features were extracted on [default: train].
    #[arg(long)]
    split: Option<String>,

    /// Comparison method (cka, rsa, gw) [default: cka].
    #[arg(long)]
    method: Option<SimilarityMethod>,

    /// CKA kernel (linear, rbf) [default: linear].
    #[arg(long)]
    kernel: Option<CkaKernel>,

    /// Use the biased HSIC estimator for CKA instead of the unbiased one.
    #[arg(long, default_value_t = false)]
    biased: bool,

    /// RBF kernel bandwidth.
    #[arg(long)]
    sigma: Option<f64>,

    /// RSA per-sample dissimilarity (correlation, cosine) [default: correlation].
    #[arg(long)]
    rsa_method: Option<RsaMethod>,

    /// RSA RDM correlation (pearson, spearman) [default: spearman].
    #[arg(long)]
    corr_method: Option<CorrMethod>,

    /// Gromov-Wasserstein cost-matrix metric (euclidean, cosine) [default: euclidean].
    #[arg(long)]
    cost_fun: Option<CostFun>,

    /// Gromov-Wasserstein ground loss (square_loss, kl_loss) [default: square_loss].
    #[arg(long)]
    loss_fun: Option<LossFun>,

    /// Pin the Gromov-Wasserstein coupling to the uniform diagonal.
    #[arg(long, default_value_t = false)]
    fixed_coupling: bool,

    /// Persist per-pair Gromov-Wasserstein coupling matrices.
    #[arg(long, default_value_t = false)]
    store_coupling: bool,

    /// Existing directory receiving `{model1}_{model2}_coupling.npy` files.
    #[arg(long, value_name = "DIR")]
    coupling_root: Option<PathBuf>,

    /// Bounded worker count for pairwise comparisons [default: 4].
    #[arg(long)]
    max_workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model IDs to compare (at least two).
    #[arg(required = true, num_args = 2..)]
    model_ids: Vec<String>,
}

impl Args {
    /// Fold this invocation into a [`SimilarityConfig`], starting from the
    /// config file when one was given.
    fn into_config(self) -> Result<(SimilarityConfig, PathBuf, Vec<String>), String> {
        let base = match self.config.as_deref() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                SimilarityConfig::from_json(path).map_err(|e| e.to_string())?
            }
            None => SimilarityConfig::default(),
        };

        let cfg = SimilarityConfig {
            method: self.method.unwrap_or(base.method),
            feature_root: self.feature_root.unwrap_or(base.feature_root),
            subset_root: self.subset_root.or(base.subset_root),
            split: self.split.unwrap_or(base.split),
            kernel: self.kernel.unwrap_or(base.kernel),
            unbiased: if self.biased { false } else { base.unbiased },
            sigma: self.sigma.or(base.sigma),
            rsa_method: self.rsa_method.unwrap_or(base.rsa_method),
            corr_method: self.corr_method.unwrap_or(base.corr_method),
            cost_fun: self.cost_fun.unwrap_or(base.cost_fun),
            loss_fun: self.loss_fun.unwrap_or(base.loss_fun),
            fixed_coupling: self.fixed_coupling || base.fixed_coupling,
            store_coupling: self.store_coupling || base.store_coupling,
            output_root: self.coupling_root.or(base.output_root),
            max_workers: self.max_workers.unwrap_or(base.max_workers),
        };

        Ok((cfg, self.output, self.model_ids))
    }
}

fn main() {
    let args = Args::parse();

    // Initialise tracing subscriber.
    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Model similarity v{}", model_similarity::VERSION);

    let (config, output, model_ids) = match args.into_config() {
        Ok(parts) => parts,
        Err(e) => {
            error!("Failed to assemble configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        std::process::exit(1);
    }

    info!("Configuration validated successfully");
    info!("  method      : {}", config.method);
    info!("  feature root: {}", config.feature_root.display());
    info!("  split       : {}", config.split);
    info!("  max workers : {}", config.max_workers);
    info!("  models      : {}", model_ids.len());

    let run = match compute_similarity_matrix(&config, &model_ids) {
        Ok(run) => run,
        Err(e) => {
            error!("Similarity computation failed: {e}");
            std::process::exit(1);
        }
    };

    let result_path = output.join(format!("{}.json", run.config_name));
    if let Err(e) = run.save_json(&result_path) {
        error!("Failed to write result file: {e}");
        std::process::exit(1);
    }

    info!(
        "Wrote {}x{} matrix to {}",
        run.model_ids.len(),
        run.model_ids.len(),
        result_path.display()
    );
}
