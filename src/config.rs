//! Run configuration for similarity-matrix computation.
//!
//! [`SimilarityConfig`] is the single source of truth for the comparison
//! method, its parameters, and the locations of feature artifacts. It is
//! serializable via [`serde`] so a run can be stored to / restored from JSON,
//! and every method tag parses from the command line via [`FromStr`].
//!
//! # Example
//!
//! ```rust
//! use model_similarity::config::SimilarityConfig;
//!
//! let cfg = SimilarityConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.split, "train");
//! assert_eq!(cfg.max_workers, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Method tags
// ---------------------------------------------------------------------------

/// The statistical comparison method driving a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    /// Centered Kernel Alignment.
    Cka,
    /// Representational Similarity Analysis.
    Rsa,
    /// Gromov-Wasserstein distance.
    #[serde(rename = "gw", alias = "gromov_wasserstein")]
    GromovWasserstein,
}

impl FromStr for SimilarityMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cka" => Ok(SimilarityMethod::Cka),
            "rsa" => Ok(SimilarityMethod::Rsa),
            "gw" | "gromov_wasserstein" => Ok(SimilarityMethod::GromovWasserstein),
            other => Err(ConfigError::UnknownMethod(other.to_string())),
        }
    }
}

impl fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimilarityMethod::Cka => write!(f, "cka"),
            SimilarityMethod::Rsa => write!(f, "rsa"),
            SimilarityMethod::GromovWasserstein => write!(f, "gw"),
        }
    }
}

/// Kernel used to build the CKA Gram matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CkaKernel {
    /// Linear kernel `K = X Xᵀ`; no extra parameter.
    Linear,
    /// Gaussian RBF kernel with bandwidth `sigma`.
    Rbf,
}

impl FromStr for CkaKernel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(CkaKernel::Linear),
            "rbf" => Ok(CkaKernel::Rbf),
            other => Err(ConfigError::UnknownKernel(other.to_string())),
        }
    }
}

impl fmt::Display for CkaKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CkaKernel::Linear => write!(f, "linear"),
            CkaKernel::Rbf => write!(f, "rbf"),
        }
    }
}

/// Per-sample dissimilarity used to build an RSA representational
/// dissimilarity matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsaMethod {
    /// `1 − Pearson correlation` between sample embeddings.
    Correlation,
    /// `1 − cosine similarity` between sample embeddings.
    Cosine,
}

impl FromStr for RsaMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "correlation" => Ok(RsaMethod::Correlation),
            "cosine" => Ok(RsaMethod::Cosine),
            other => Err(ConfigError::UnknownRsaMethod(other.to_string())),
        }
    }
}

impl fmt::Display for RsaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsaMethod::Correlation => write!(f, "correlation"),
            RsaMethod::Cosine => write!(f, "cosine"),
        }
    }
}

/// Correlation applied between two flattened RDMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrMethod {
    /// Pearson product-moment correlation.
    Pearson,
    /// Spearman rank correlation.
    Spearman,
}

impl FromStr for CorrMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pearson" => Ok(CorrMethod::Pearson),
            "spearman" => Ok(CorrMethod::Spearman),
            other => Err(ConfigError::UnknownCorrMethod(other.to_string())),
        }
    }
}

impl fmt::Display for CorrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrMethod::Pearson => write!(f, "pearson"),
            CorrMethod::Spearman => write!(f, "spearman"),
        }
    }
}

/// Metric used to build a model's Gromov-Wasserstein cost matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostFun {
    /// Euclidean distance between sample embeddings.
    ///
    /// The historical misspelling `euclidian` is accepted as an input alias.
    #[serde(alias = "euclidian")]
    Euclidean,
    /// Cosine distance between sample embeddings.
    Cosine,
}

impl FromStr for CostFun {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean" | "euclidian" => Ok(CostFun::Euclidean),
            "cosine" => Ok(CostFun::Cosine),
            other => Err(ConfigError::UnknownCostFun(other.to_string())),
        }
    }
}

impl fmt::Display for CostFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostFun::Euclidean => write!(f, "euclidean"),
            CostFun::Cosine => write!(f, "cosine"),
        }
    }
}

/// Ground loss used inside the Gromov-Wasserstein objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFun {
    /// Squared difference between cost entries.
    SquareLoss,
    /// Kullback-Leibler divergence between cost entries.
    KlLoss,
}

impl FromStr for LossFun {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square_loss" => Ok(LossFun::SquareLoss),
            "kl_loss" => Ok(LossFun::KlLoss),
            other => Err(ConfigError::UnknownLossFun(other.to_string())),
        }
    }
}

impl fmt::Display for LossFun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossFun::SquareLoss => write!(f, "square_loss"),
            LossFun::KlLoss => write!(f, "kl_loss"),
        }
    }
}

// ---------------------------------------------------------------------------
// SimilarityConfig
// ---------------------------------------------------------------------------

/// Complete configuration for one similarity-matrix run.
///
/// Method-specific fields are ignored by the other methods: `kernel`,
/// `unbiased`, and `sigma` only affect CKA; `rsa_method` / `corr_method` only
/// affect RSA; the cost/loss/coupling fields only affect Gromov-Wasserstein.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Comparison method. Default: **cka**.
    pub method: SimilarityMethod,

    /// Root directory holding `{model_id}/features_{split}.npy` artifacts.
    pub feature_root: PathBuf,

    /// Optional directory holding `subset_indices_{split}.json`.
    ///
    /// When absent (or the file is missing) the full feature tensors are used.
    pub subset_root: Option<PathBuf>,

    /// Dataset split the features were extracted on. Default: **"train"**.
    pub split: String,

    /// CKA kernel. Default: **linear**.
    pub kernel: CkaKernel,

    /// Use the unbiased HSIC estimator for CKA. Default: **true**.
    pub unbiased: bool,

    /// RBF kernel bandwidth; `None` falls back to the strategy default.
    pub sigma: Option<f64>,

    /// RSA per-sample dissimilarity. Default: **correlation**.
    pub rsa_method: RsaMethod,

    /// RSA RDM correlation. Default: **spearman**.
    pub corr_method: CorrMethod,

    /// Gromov-Wasserstein cost-matrix metric. Default: **euclidean**.
    pub cost_fun: CostFun,

    /// Gromov-Wasserstein ground loss. Default: **square_loss**.
    pub loss_fun: LossFun,

    /// Use the fixed uniform-diagonal coupling instead of solving for an
    /// optimal one. Assumes sample-index correspondence. Default: **false**.
    pub fixed_coupling: bool,

    /// Persist the per-pair coupling matrix to `output_root`. Default: **false**.
    pub store_coupling: bool,

    /// Directory receiving `{model1}_{model2}_coupling.npy` files.
    ///
    /// Required (and must exist) when `store_coupling` is set.
    pub output_root: Option<PathBuf>,

    /// Bounded worker count for pairwise comparisons. Default: **4**.
    pub max_workers: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        SimilarityConfig {
            method: SimilarityMethod::Cka,
            feature_root: PathBuf::from("features"),
            subset_root: None,
            split: "train".to_string(),
            kernel: CkaKernel::Linear,
            unbiased: true,
            sigma: None,
            rsa_method: RsaMethod::Correlation,
            corr_method: CorrMethod::Spearman,
            cost_fun: CostFun::Euclidean,
            loss_fun: LossFun::SquareLoss,
            fixed_coupling: false,
            store_coupling: false,
            output_root: None,
            max_workers: 4,
        }
    }
}

impl SimilarityConfig {
    /// Load a [`SimilarityConfig`] from a JSON file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened and
    /// [`ConfigError::InvalidValue`] if the JSON is malformed. The loaded
    /// configuration is validated before it is returned.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: SimilarityConfig = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::invalid_value("(file)", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Validate all fields and return an error describing the first problem
    /// found, or `Ok(())` if the configuration is coherent.
    ///
    /// # Validated invariants
    ///
    /// - `max_workers` must be at least 1.
    /// - `sigma`, when provided, must be finite and strictly positive.
    /// - `store_coupling` requires an existing `output_root` directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::invalid_value("max_workers", "must be > 0"));
        }

        if let Some(sigma) = self.sigma {
            if !sigma.is_finite() || sigma <= 0.0 {
                return Err(ConfigError::invalid_value(
                    "sigma",
                    "must be finite and > 0.0",
                ));
            }
        }

        if self.store_coupling {
            match &self.output_root {
                None => return Err(ConfigError::MissingOutputRoot),
                Some(root) if !root.exists() => {
                    return Err(ConfigError::OutputRootNotFound { path: root.clone() });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
