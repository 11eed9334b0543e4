//! Model-set samplers for consistency analysis.
//!
//! Experiments over the similarity matrix repeatedly need a subset of `k`
//! models drawn from the available pool: uniformly at random, by benchmark
//! score, or guided by a precomputed clustering of the models. Each policy is
//! a [`ModelSampler`]; randomness is always drawn from a caller-provided
//! [`StdRng`], so a run seeds one generator and every sample drawn from it is
//! reproducible.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::error::SamplerError;

/// Clustering of model IDs, keyed by cluster index.
pub type ClusterAssignment = BTreeMap<usize, Vec<String>>;

/// Benchmark scores per model ID, used for ranked selection.
pub type ModelScores = BTreeMap<String, f64>;

// ---------------------------------------------------------------------------
// ModelSampler trait
// ---------------------------------------------------------------------------

/// A policy producing sets of `k` model IDs.
pub trait ModelSampler {
    /// Draw one model set. Deterministic policies ignore `rng`.
    fn sample(&self, rng: &mut StdRng) -> Result<Vec<String>, SamplerError>;

    /// Number of distinct sets this sampler can produce, or `None` when it is
    /// effectively unbounded. Deterministic samplers return `Some(1)`.
    fn max_available_samples(&self) -> Option<usize> {
        None
    }
}

/// Score lookup with a hard error for models missing from the score table.
fn score_of(scores: &ModelScores, model_id: &str) -> Result<f64, SamplerError> {
    scores
        .get(model_id)
        .copied()
        .ok_or_else(|| SamplerError::MissingScore {
            model_id: model_id.to_string(),
        })
}

/// Sort `model_ids` by descending score, ties broken by ascending ID.
fn rank_by_score(model_ids: &[String], scores: &ModelScores) -> Result<Vec<String>, SamplerError> {
    let mut scored: Vec<(f64, &String)> = model_ids
        .iter()
        .map(|id| Ok((score_of(scores, id)?, id)))
        .collect::<Result<_, SamplerError>>()?;
    scored.sort_by(|(sa, ida), (sb, idb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ida.cmp(idb))
    });
    Ok(scored.into_iter().map(|(_, id)| id.clone()).collect())
}

// ---------------------------------------------------------------------------
// TopKSampler
// ---------------------------------------------------------------------------

/// The `k` highest-scoring models. Deterministic.
#[derive(Debug)]
pub struct TopKSampler {
    k: usize,
    model_ids: Vec<String>,
    scores: ModelScores,
}

impl TopKSampler {
    /// Create a top-k sampler over `model_ids` with their benchmark `scores`.
    pub fn new(k: usize, model_ids: Vec<String>, scores: ModelScores) -> Self {
        TopKSampler {
            k,
            model_ids,
            scores,
        }
    }
}

impl ModelSampler for TopKSampler {
    fn sample(&self, _rng: &mut StdRng) -> Result<Vec<String>, SamplerError> {
        if self.k > self.model_ids.len() {
            return Err(SamplerError::NotEnoughModels {
                requested: self.k,
                available: self.model_ids.len(),
            });
        }
        let ranked = rank_by_score(&self.model_ids, &self.scores)?;
        Ok(ranked.into_iter().take(self.k).collect())
    }

    fn max_available_samples(&self) -> Option<usize> {
        Some(1)
    }
}

// ---------------------------------------------------------------------------
// RandomSampler
// ---------------------------------------------------------------------------

/// `k` models drawn uniformly without replacement.
#[derive(Debug)]
pub struct RandomSampler {
    k: usize,
    model_ids: Vec<String>,
}

impl RandomSampler {
    /// Create a uniform sampler over `model_ids`.
    pub fn new(k: usize, model_ids: Vec<String>) -> Self {
        RandomSampler { k, model_ids }
    }
}

impl ModelSampler for RandomSampler {
    fn sample(&self, rng: &mut StdRng) -> Result<Vec<String>, SamplerError> {
        if self.k > self.model_ids.len() {
            return Err(SamplerError::NotEnoughModels {
                requested: self.k,
                available: self.model_ids.len(),
            });
        }
        Ok(self
            .model_ids
            .choose_multiple(rng, self.k)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Cluster-guided samplers
// ---------------------------------------------------------------------------

/// How a cluster-guided sampler picks the representative within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionStrategy {
    /// Uniformly random member.
    Random,
    /// Highest-scoring member.
    Best,
}

impl std::str::FromStr for SelectionStrategy {
    type Err = SamplerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "random" => Ok(SelectionStrategy::Random),
            "best" => Ok(SelectionStrategy::Best),
            other => Err(SamplerError::UnknownSelectionStrategy(other.to_string())),
        }
    }
}

/// Restrict `clusters` and `model_ids` to their common models.
///
/// Models absent from the clustering (and cluster members absent from the
/// available pool) are dropped with a warning; clusters left empty are
/// removed. Member lists come out sorted, so downstream ranking and sampling
/// are deterministic up to the RNG.
fn intersect_with_clusters(
    model_ids: &[String],
    clusters: &ClusterAssignment,
) -> ClusterAssignment {
    let available: BTreeSet<&str> = model_ids.iter().map(String::as_str).collect();
    let clustered: BTreeSet<&str> = clusters
        .values()
        .flat_map(|members| members.iter().map(String::as_str))
        .collect();

    let unclustered: Vec<&&str> = available.difference(&clustered).collect();
    if !unclustered.is_empty() {
        warn!(
            "Removing {} model(s) not present in the clustering assignment: {:?}",
            unclustered.len(),
            unclustered
        );
    }
    let unavailable: Vec<&&str> = clustered.difference(&available).collect();
    if !unavailable.is_empty() {
        warn!(
            "Removing {} clustered model(s) not in the available pool: {:?}",
            unavailable.len(),
            unavailable
        );
    }

    clusters
        .iter()
        .filter_map(|(&cluster_id, members)| {
            let mut kept: Vec<String> = members
                .iter()
                .filter(|m| available.contains(m.as_str()))
                .cloned()
                .collect();
            kept.sort();
            kept.dedup();
            (!kept.is_empty()).then_some((cluster_id, kept))
        })
        .collect()
}

/// Cluster IDs ranked by descending mean member score, ties by ascending ID.
fn rank_clusters_by_mean_score(
    clusters: &ClusterAssignment,
    scores: &ModelScores,
) -> Result<Vec<usize>, SamplerError> {
    let mut ranked: Vec<(f64, usize)> = clusters
        .iter()
        .map(|(&cluster_id, members)| {
            let total: f64 = members
                .iter()
                .map(|id| score_of(scores, id))
                .sum::<Result<f64, _>>()?;
            Ok((total / members.len() as f64, cluster_id))
        })
        .collect::<Result<_, SamplerError>>()?;
    ranked.sort_by(|(sa, ida), (sb, idb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ida.cmp(idb))
    });
    Ok(ranked.into_iter().map(|(_, id)| id).collect())
}

/// One representative from each of the `k` best clusters.
///
/// Clusters are ranked by mean member score, so scores are required for both
/// selection strategies, not just [`SelectionStrategy::Best`].
#[derive(Debug)]
pub struct ClusterSampler {
    k: usize,
    clusters: ClusterAssignment,
    scores: ModelScores,
    strategy: SelectionStrategy,
}

impl ClusterSampler {
    /// Create a cluster sampler over the intersection of `model_ids` and
    /// `clusters`.
    pub fn new(
        k: usize,
        model_ids: &[String],
        clusters: &ClusterAssignment,
        scores: ModelScores,
        strategy: SelectionStrategy,
    ) -> Self {
        ClusterSampler {
            k,
            clusters: intersect_with_clusters(model_ids, clusters),
            scores,
            strategy,
        }
    }
}

impl ModelSampler for ClusterSampler {
    fn sample(&self, rng: &mut StdRng) -> Result<Vec<String>, SamplerError> {
        if self.clusters.len() < self.k {
            return Err(SamplerError::NotEnoughClusters {
                requested: self.k,
                available: self.clusters.len(),
            });
        }

        let ranked = rank_clusters_by_mean_score(&self.clusters, &self.scores)?;
        let mut model_set = Vec::with_capacity(self.k);
        for cluster_id in ranked.into_iter().take(self.k) {
            let members = &self.clusters[&cluster_id];
            let selected = match self.strategy {
                SelectionStrategy::Random => members
                    .choose(rng)
                    .cloned()
                    .ok_or(SamplerError::EmptyCluster { cluster_id })?,
                SelectionStrategy::Best => rank_by_score(members, &self.scores)?
                    .into_iter()
                    .next()
                    .ok_or(SamplerError::EmptyCluster { cluster_id })?,
            };
            model_set.push(selected);
        }
        Ok(model_set)
    }

    fn max_available_samples(&self) -> Option<usize> {
        match self.strategy {
            SelectionStrategy::Random => None,
            SelectionStrategy::Best => Some(1),
        }
    }
}

/// Up to `k` random models from one specific cluster.
#[derive(Debug)]
pub struct OneClusterSampler {
    k: usize,
    cluster_index: usize,
    clusters: ClusterAssignment,
}

impl OneClusterSampler {
    /// Create a sampler drawing from cluster `cluster_index` only, over the
    /// intersection of `model_ids` and `clusters`.
    pub fn new(
        k: usize,
        cluster_index: usize,
        model_ids: &[String],
        clusters: &ClusterAssignment,
    ) -> Self {
        OneClusterSampler {
            k,
            cluster_index,
            clusters: intersect_with_clusters(model_ids, clusters),
        }
    }
}

impl ModelSampler for OneClusterSampler {
    fn sample(&self, rng: &mut StdRng) -> Result<Vec<String>, SamplerError> {
        let members =
            self.clusters
                .get(&self.cluster_index)
                .ok_or(SamplerError::EmptyCluster {
                    cluster_id: self.cluster_index,
                })?;

        let take = if self.k > members.len() {
            warn!(
                "Requested {} models but cluster {} only has {}; limiting to cluster size",
                self.k,
                self.cluster_index,
                members.len()
            );
            members.len()
        } else {
            self.k
        };

        Ok(members.choose_multiple(rng, take).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
