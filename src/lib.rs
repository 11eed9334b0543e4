//! Pairwise similarity matrices over pre-extracted model representations.
//!
//! Given per-model feature tensors extracted on a shared dataset split, this
//! crate computes the dense N×N matrix of pairwise similarity (or distance)
//! scores under one of three comparison methods:
//!
//! - **CKA** — Centered Kernel Alignment over linear or RBF kernel matrices,
//!   with biased or unbiased HSIC estimation;
//! - **RSA** — Representational Similarity Analysis, correlating per-model
//!   representational dissimilarity matrices;
//! - **GW** — Gromov-Wasserstein distance between max-normalised
//!   self-distance matrices, with a fixed or learned coupling.
//!
//! # Architecture
//!
//! ```text
//!                      ┌───────────────────┐
//!                      │ SimilarityConfig  │   config
//!                      └─────────┬─────────┘
//!                                │ build_strategy
//!                                ▼
//!  validate_model_set ──► ┌──────────────┐     ┌──────────────┐
//!  (validate)             │  Similarity  │ ──► │ Similarity   │
//!  model IDs ───────────► │  Engine      │     │ Run (matrix) │
//!                         └──────┬───────┘     └──────────────┘
//!                                │ compare (bounded workers)
//!                                ▼
//!               ┌───────────────────────────────┐
//!               │ CkaStrategy │ RsaStrategy │ Gw │  strategy
//!               └───────────────┬───────────────┘
//!                               │ load
//!                               ▼
//!                       ┌──────────────┐
//!                       │ FeatureStore │  store (.npy artifacts)
//!                       └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use model_similarity::config::{SimilarityConfig, SimilarityMethod};
//! use model_similarity::engine::compute_similarity_matrix;
//!
//! let cfg = SimilarityConfig {
//!     method: SimilarityMethod::Cka,
//!     feature_root: "features".into(),
//!     ..SimilarityConfig::default()
//! };
//!
//! let model_ids = vec!["resnet50".to_string(), "vit_b16".to_string()];
//! let run = compute_similarity_matrix(&cfg, &model_ids)?;
//! println!("{}: {:?}", run.config_name, run.matrix);
//! # Ok::<(), model_similarity::error::SimilarityError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod sampler;
pub mod stats;
pub mod store;
pub mod strategy;
pub mod validate;

pub use config::{SimilarityConfig, SimilarityMethod};
pub use engine::{compute_similarity_matrix, SimilarityEngine, SimilarityRun};
pub use error::{SimilarityError, SimilarityResult};
pub use store::FeatureStore;
pub use strategy::{build_strategy, SimilarityStrategy};
pub use validate::validate_model_set;

/// Crate version, as compiled.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
