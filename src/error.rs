//! Error types for the model-similarity engine.
//!
//! This module is the single source of truth for all error types in the
//! crate. Every module that produces an error imports its error type from
//! here rather than defining it inline, keeping the error hierarchy
//! centralised and consistent.
//!
//! ## Hierarchy
//!
//! ```text
//! SimilarityError (top-level)
//! └── ConfigError  (method / kernel / parameter validation)
//! ```
//!
//! All fatal errors abort the entire matrix computation: a partially-filled
//! similarity matrix is not a valid result for downstream consumers, so there
//! is no partial-success mode.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// SimilarityResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used throughout the crate.
pub type SimilarityResult<T> = Result<T, SimilarityError>;

// ---------------------------------------------------------------------------
// SimilarityError — top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for similarity-matrix computation.
///
/// Configuration problems are reported eagerly at strategy-construction time
/// via [`SimilarityError::Config`], before any feature I/O happens. I/O and
/// shape errors surface as soon as the offending model pair is scheduled.
#[derive(Debug, Error)]
pub enum SimilarityError {
    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Fewer than two models survived artifact validation.
    ///
    /// Similarity computation is undefined for 0 or 1 models.
    #[error(
        "At least two models with feature artifacts are required, found {found} \
         (removed: {removed:?})"
    )]
    InsufficientModels {
        /// Number of models that passed validation.
        found: usize,
        /// Requested model IDs whose artifacts were missing.
        removed: Vec<String>,
    },

    /// A feature artifact expected to exist is absent at load time.
    ///
    /// Validation normally prevents this; it is still handled defensively for
    /// direct [`FeatureStore`] callers.
    ///
    /// [`FeatureStore`]: crate::store::FeatureStore
    #[error("Feature artifact for model `{model_id}` not found at `{path}`")]
    MissingArtifact {
        /// Model whose artifact is missing.
        model_id: String,
        /// Path that was probed.
        path: PathBuf,
    },

    /// Two compared representations have different sample counts.
    #[error(
        "Sample-count mismatch between `{model_a}` ({rows_a} rows) and \
         `{model_b}` ({rows_b} rows); representations must cover the same samples"
    )]
    ShapeMismatch {
        /// First model in the pair.
        model_a: String,
        /// Second model in the pair.
        model_b: String,
        /// Sample count of the first representation.
        rows_a: usize,
        /// Sample count of the second representation.
        rows_b: usize,
    },

    /// A representation has too few samples for the requested estimator.
    ///
    /// The unbiased HSIC estimator used by CKA divides by `m - 3` and is
    /// undefined below four samples.
    #[error(
        "Model `{model_id}` has {rows} samples but the estimator requires at \
         least {required}"
    )]
    InsufficientSamples {
        /// Model whose representation is too small.
        model_id: String,
        /// Observed sample count.
        rows: usize,
        /// Minimum sample count for the estimator.
        required: usize,
    },

    /// A subset index points beyond the feature tensor's row count.
    #[error("Subset index {index} out of bounds for feature tensor with {rows} rows")]
    SubsetIndex {
        /// The offending index.
        index: usize,
        /// Row count of the tensor being restricted.
        rows: usize,
    },

    /// A `.npy` artifact could not be parsed or has the wrong shape.
    #[error("NPY error at `{path}`: {message}")]
    Npy {
        /// Path of the offending file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A low-level I/O error with path context.
    #[error("I/O error at `{path}`: {source}")]
    Io {
        /// Path being accessed when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The bounded worker pool could not be constructed.
    #[error("Worker pool construction failed: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl SimilarityError {
    /// Construct a [`SimilarityError::MissingArtifact`].
    pub fn missing_artifact<S: Into<String>>(model_id: S, path: impl Into<PathBuf>) -> Self {
        SimilarityError::MissingArtifact {
            model_id: model_id.into(),
            path: path.into(),
        }
    }

    /// Construct a [`SimilarityError::ShapeMismatch`] naming both models.
    pub fn shape_mismatch<A, B>(model_a: A, rows_a: usize, model_b: B, rows_b: usize) -> Self
    where
        A: Into<String>,
        B: Into<String>,
    {
        SimilarityError::ShapeMismatch {
            model_a: model_a.into(),
            model_b: model_b.into(),
            rows_a,
            rows_b,
        }
    }

    /// Construct a [`SimilarityError::Npy`].
    pub fn npy<S: Into<String>>(path: impl Into<PathBuf>, message: S) -> Self {
        SimilarityError::Npy {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Construct a [`SimilarityError::Io`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimilarityError::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when parsing or validating a [`SimilarityConfig`].
///
/// These are raised eagerly, before any feature I/O, so a misconfigured run
/// is cheap to detect.
///
/// [`SimilarityConfig`]: crate::config::SimilarityConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The requested similarity method is not supported.
    #[error("Unknown similarity method `{0}` (expected one of: cka, rsa, gw)")]
    UnknownMethod(String),

    /// The requested CKA kernel is not supported.
    #[error("Unknown CKA kernel `{0}` (expected one of: linear, rbf)")]
    UnknownKernel(String),

    /// The requested RSA dissimilarity method is not supported.
    #[error("Unknown RSA method `{0}` (expected one of: correlation, cosine)")]
    UnknownRsaMethod(String),

    /// The requested RDM correlation method is not supported.
    #[error("Unknown correlation method `{0}` (expected one of: pearson, spearman)")]
    UnknownCorrMethod(String),

    /// The requested Gromov-Wasserstein cost function is not supported.
    #[error("Unknown cost function `{0}` (expected one of: euclidean, cosine)")]
    UnknownCostFun(String),

    /// The requested Gromov-Wasserstein loss function is not supported.
    #[error("Unknown loss function `{0}` (expected one of: square_loss, kl_loss)")]
    UnknownLossFun(String),

    /// `store_coupling` is set but no output root was provided.
    #[error("`output_root` must be provided when `store_coupling` is set")]
    MissingOutputRoot,

    /// The coupling output root does not exist on disk.
    #[error("Output root `{path}` does not exist")]
    OutputRootNotFound {
        /// The missing directory.
        path: PathBuf,
    },

    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SamplerError
// ---------------------------------------------------------------------------

/// Errors produced by the model-set samplers.
///
/// Samplers run as standalone analysis utilities over already-validated model
/// lists, so their errors stay separate from [`SimilarityError`].
#[derive(Debug, Error)]
pub enum SamplerError {
    /// The requested set size exceeds the available model pool.
    #[error("Cannot sample {requested} models from a pool of {available}")]
    NotEnoughModels {
        /// Requested set size.
        requested: usize,
        /// Models available to draw from.
        available: usize,
    },

    /// Fewer clusters exist than the requested set size.
    #[error("Cluster sampling needs at least {requested} clusters, found {available}")]
    NotEnoughClusters {
        /// Requested set size (one model per cluster).
        requested: usize,
        /// Clusters available after pruning.
        available: usize,
    },

    /// A referenced cluster has no available members.
    #[error("Cluster {cluster_id} has no available models")]
    EmptyCluster {
        /// The offending cluster index.
        cluster_id: usize,
    },

    /// A model has no entry in the score table required for ranked selection.
    #[error("No benchmark score available for model `{model_id}`")]
    MissingScore {
        /// Model missing from the score table.
        model_id: String,
    },

    /// The requested within-cluster selection strategy is not supported.
    #[error("Unknown selection strategy `{0}` (expected one of: random, best)")]
    UnknownSelectionStrategy(String),
}
