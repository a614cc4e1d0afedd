//! Density-based clustering (DBSCAN) over the 2D projection, with model
//! caching.
//!
//! A point is a core point when its `eps`-neighborhood, the point itself
//! included, holds at least `min_samples` points. Core points within `eps`
//! of each other share a cluster, border points join the first cluster that
//! reaches them, and everything else is noise ([`NOISE`]).

use crate::analysis::scaler::ScaledFeatureSet;
use crate::cache::{Fingerprint, ModelCache};
use crate::error::{AdvisorError, Result};
use linfa::prelude::*;
use linfa_clustering::Dbscan;
use linfa_nn::distance::L2Dist;
use linfa_nn::{CommonNearestNeighbour, NearestNeighbour};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Label given to points that belong to no cluster.
pub const NOISE: i64 = -1;

const MODEL_KIND: &str = "dbscan";

/// DBSCAN parameters plus the state of the last fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterModel {
    pub eps: f64,
    pub min_samples: usize,
    /// Labels of the last fitted data, `-1` for noise.
    #[serde(default)]
    pub labels: Vec<i64>,
    /// Indices of the core points of the last fitted data.
    #[serde(default)]
    pub core_sample_indices: Vec<usize>,
}

impl ClusterModel {
    /// An unfitted model with the given parameters.
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            labels: Vec::new(),
            core_sample_indices: Vec::new(),
        }
    }

    /// Fit on `points`, replacing any previous fitted state.
    pub fn fit(&mut self, points: &[[f64; 2]]) -> Result<()> {
        let (labels, cores) = dbscan(points, self.eps, self.min_samples)?;
        self.labels = labels;
        self.core_sample_indices = cores;
        Ok(())
    }

    /// Fit on `points` and return their labels.
    pub fn fit_predict(&mut self, points: &[[f64; 2]]) -> Result<Vec<i64>> {
        self.fit(points)?;
        Ok(self.labels.clone())
    }

    /// Number of clusters found by the last fit (noise excluded).
    pub fn n_clusters(&self) -> usize {
        self.cluster_sizes().len()
    }

    /// Number of noise points in the last fit.
    pub fn noise_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == NOISE).count()
    }

    /// Size of each cluster of the last fit, keyed by label.
    pub fn cluster_sizes(&self) -> BTreeMap<i64, usize> {
        let mut sizes = BTreeMap::new();
        for &label in self.labels.iter().filter(|&&l| l != NOISE) {
            *sizes.entry(label).or_insert(0) += 1;
        }
        sizes
    }

    fn same_parameters(&self, eps: f64, min_samples: usize) -> bool {
        self.eps == eps && self.min_samples == min_samples
    }
}

/// Run DBSCAN over 2D points.
///
/// Returns `(labels, core_sample_indices)`. Clusters are numbered in the
/// order their first core point appears in `points`, so identical input
/// always yields identical labels. `min_samples` must be at least 2.
pub fn dbscan(
    points: &[[f64; 2]],
    eps: f64,
    min_samples: usize,
) -> Result<(Vec<i64>, Vec<usize>)> {
    if min_samples < 2 {
        return Err(AdvisorError::ModelFit(format!(
            "dbscan: min_samples must be at least 2, got {}",
            min_samples
        )));
    }
    if points.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let observations = Array2::from(points.to_vec());
    let memberships: Array1<Option<usize>> = Dbscan::params(min_samples)
        .tolerance(eps)
        .transform(&observations)
        .map_err(|e| AdvisorError::ModelFit(format!("dbscan: {}", e)))?;

    let labels = memberships
        .iter()
        .map(|m| m.map_or(NOISE, |cluster| cluster as i64))
        .collect();

    // Neighborhoods are queried one row at a time, never held together
    let index = CommonNearestNeighbour::KdTree
        .from_batch(&observations, L2Dist)
        .map_err(|e| AdvisorError::ModelFit(format!("neighbor index: {}", e)))?;
    let mut cores = Vec::new();
    for (i, row) in observations.outer_iter().enumerate() {
        let neighbors = index
            .within_range(row, eps)
            .map_err(|e| AdvisorError::ModelFit(format!("neighbor query: {}", e)))?;
        if neighbors.len() >= min_samples {
            cores.push(i);
        }
    }

    Ok((labels, cores))
}

/// Clusters projection coordinates through the shared model cache.
#[derive(Debug, Clone)]
pub struct ClusterEngine {
    cache: Arc<ModelCache>,
    artifact: String,
}

impl ClusterEngine {
    pub fn new(cache: Arc<ModelCache>, artifact: impl Into<String>) -> Self {
        Self {
            cache,
            artifact: artifact.into(),
        }
    }

    /// Label every row of `scaled`, aligned index-for-index.
    ///
    /// On the first call the model is fitted and persisted. When an
    /// artifact already exists it is loaded and re-fitted on the current
    /// data with the parameters it was saved with; the requested `eps` and
    /// `min_samples` only take effect for a fresh fit.
    pub fn cluster(&self, scaled: &ScaledFeatureSet, eps: f64, min_samples: usize) -> Vec<i64> {
        let points = scaled.coordinates();
        let fingerprint = Fingerprint::new(MODEL_KIND)
            .f64(eps)
            .usize(min_samples)
            .finish();

        let cached = match self
            .cache
            .load::<ClusterModel>(&self.artifact, MODEL_KIND, &fingerprint)
        {
            Ok(artifact) => artifact.map(|a| a.model),
            Err(e) => {
                warn!("Ignoring unreadable cluster model: {}", e);
                None
            }
        };

        let labels = match cached {
            Some(mut model) => {
                if !model.same_parameters(eps, min_samples) {
                    warn!(
                        cached_eps = model.eps,
                        cached_min_samples = model.min_samples,
                        eps,
                        min_samples,
                        "Cached cluster model parameters differ from request; using cached parameters"
                    );
                }
                model.fit_predict(&points)
            }
            None => {
                let mut model = ClusterModel::new(eps, min_samples);
                match model.fit(&points) {
                    Ok(()) => {
                        if let Err(e) = self.persist(&model, &fingerprint) {
                            warn!("Failed to cache cluster model: {}", e);
                        }
                        Ok(model.labels)
                    }
                    Err(e) => Err(e),
                }
            }
        };
        let labels = labels.unwrap_or_else(|e| {
            warn!(rows = points.len(), "Clustering failed, marking every row as noise: {}", e);
            vec![NOISE; points.len()]
        });

        debug!(
            rows = labels.len(),
            clusters = labels.iter().filter(|&&l| l != NOISE).max().map_or(0, |&m| m + 1),
            "Cluster labels computed"
        );
        labels
    }

    fn persist(&self, model: &ClusterModel, fingerprint: &str) -> Result<()> {
        let path = self
            .cache
            .store(&self.artifact, MODEL_KIND, fingerprint, model)?;
        info!("Cluster model cached: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, CacheKeyPolicy};
    use ndarray::Array2;
    use tempfile::tempdir;

    fn two_blobs() -> Vec<[f64; 2]> {
        vec![
            [0.0, 0.0],
            [0.1, 0.0],
            [0.0, 0.1],
            [5.0, 5.0],
            [5.1, 5.0],
            [5.0, 5.1],
            [10.0, -10.0],
        ]
    }

    fn scaled_from(points: &[[f64; 2]]) -> ScaledFeatureSet {
        let mut projection = Array2::<f64>::zeros((points.len(), 2));
        for (i, p) in points.iter().enumerate() {
            projection[[i, 0]] = p[0];
            projection[[i, 1]] = p[1];
        }
        ScaledFeatureSet {
            standardized: Array2::zeros((points.len(), 4)),
            projection,
            means: [0.0; 4],
            scales: [1.0; 4],
            explained_variance: [0.0; 2],
        }
    }

    fn engine(dir: &std::path::Path, policy: CacheKeyPolicy) -> ClusterEngine {
        let config = CacheConfig::builder()
            .dir(dir)
            .key_policy(policy)
            .build()
            .unwrap();
        ClusterEngine::new(Arc::new(ModelCache::new(&config)), config.cluster_artifact)
    }

    #[test]
    fn test_dbscan_two_blobs_and_noise() {
        let (labels, cores) = dbscan(&two_blobs(), 0.5, 3).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
        assert_eq!(cores, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_neighborhood_counts_the_point_itself() {
        // Each point has exactly 2 neighbors; with itself that makes 3
        let points = vec![[0.0, 0.0], [0.2, 0.0], [0.1, 0.1]];
        let (labels, _) = dbscan(&points, 0.5, 3).unwrap();
        assert_eq!(labels, vec![0, 0, 0]);

        let (labels, _) = dbscan(&points, 0.5, 4).unwrap();
        assert_eq!(labels, vec![NOISE; 3]);
    }

    #[test]
    fn test_border_point_joins_cluster() {
        // Last point reaches only one core point
        let points = vec![[0.0, 0.0], [0.3, 0.0], [0.0, 0.3], [0.3, 0.3], [0.7, 0.3]];
        let (labels, cores) = dbscan(&points, 0.45, 4).unwrap();
        assert_eq!(labels, vec![0, 0, 0, 0, 0]);
        assert!(!cores.contains(&4));
    }

    #[test]
    fn test_fewer_rows_than_min_samples_is_all_noise() {
        let (labels, cores) = dbscan(&[[0.0, 0.0], [0.0, 0.0]], 0.5, 3).unwrap();
        assert_eq!(labels, vec![NOISE, NOISE]);
        assert!(cores.is_empty());
    }

    #[test]
    fn test_labels_stable_under_permutation() {
        let points = two_blobs();
        let (labels, _) = dbscan(&points, 0.5, 3).unwrap();

        let order = [6, 4, 1, 3, 0, 5, 2];
        let permuted: Vec<[f64; 2]> = order.iter().map(|&i| points[i]).collect();
        let (permuted_labels, _) = dbscan(&permuted, 0.5, 3).unwrap();

        for (a, &i) in order.iter().enumerate() {
            assert_eq!(permuted_labels[a] == NOISE, labels[i] == NOISE);
        }
        for (a, &i) in order.iter().enumerate() {
            for (b, &j) in order.iter().enumerate() {
                assert_eq!(
                    permuted_labels[a] == permuted_labels[b],
                    labels[i] == labels[j]
                );
            }
        }
    }

    #[test]
    fn test_single_point_neighborhood_is_rejected() {
        let result = dbscan(&two_blobs(), 0.5, 1);
        assert!(matches!(result, Err(AdvisorError::ModelFit(_))));
        assert_eq!(dbscan(&[], 0.5, 3).unwrap(), (vec![], vec![]));
    }

    #[test]
    fn test_dense_grid_with_wide_radius() {
        // Every point reaches every other one
        let points: Vec<[f64; 2]> = (0..500)
            .map(|i| [(i % 20) as f64 * 0.01, (i / 20) as f64 * 0.01])
            .collect();
        let (labels, cores) = dbscan(&points, 10.0, 5).unwrap();
        assert!(labels.iter().all(|&l| l == 0));
        assert_eq!(cores.len(), points.len());
    }

    #[test]
    fn test_model_summary() {
        let mut model = ClusterModel::new(0.5, 3);
        model.fit(&two_blobs()).unwrap();
        assert_eq!(model.n_clusters(), 2);
        assert_eq!(model.noise_count(), 1);
        assert_eq!(model.cluster_sizes().get(&0), Some(&3));
    }

    #[test]
    fn test_engine_persists_first_fit() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Existence);
        let labels = engine.cluster(&scaled_from(&two_blobs()), 0.5, 3);
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
        assert!(dir.path().join("dbscan_model.json").exists());
    }

    #[test]
    fn test_cached_parameters_govern_refit() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Existence);
        engine.cluster(&scaled_from(&two_blobs()), 0.5, 3);

        // A larger radius would merge everything, but the cached eps wins
        let labels = engine.cluster(&scaled_from(&two_blobs()), 100.0, 3);
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
    }

    #[test]
    fn test_cache_hit_refits_on_current_data() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Existence);
        engine.cluster(&scaled_from(&two_blobs()), 0.5, 3);

        let other = vec![[1.0, 1.0], [1.1, 1.0], [1.0, 1.1], [9.0, 9.0]];
        let labels = engine.cluster(&scaled_from(&other), 0.5, 3);
        assert_eq!(labels, vec![0, 0, 0, NOISE]);
    }

    #[test]
    fn test_fingerprint_policy_honours_new_parameters() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Fingerprint);
        engine.cluster(&scaled_from(&two_blobs()), 0.5, 3);

        let labels = engine.cluster(&scaled_from(&two_blobs()), 100.0, 3);
        assert_eq!(labels, vec![0; 7]);
    }

    #[test]
    fn test_failed_fit_marks_rows_as_noise_and_is_not_cached() {
        let dir = tempdir().unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Existence);
        let labels = engine.cluster(&scaled_from(&two_blobs()), 0.5, 1);
        assert_eq!(labels, vec![NOISE; 7]);
        assert!(!dir.path().join("dbscan_model.json").exists());
    }

    #[test]
    fn test_corrupt_artifact_is_replaced() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("dbscan_model.json"), b"garbage").unwrap();
        let engine = engine(dir.path(), CacheKeyPolicy::Existence);

        let labels = engine.cluster(&scaled_from(&two_blobs()), 0.5, 3);
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);

        let content = std::fs::read_to_string(dir.path().join("dbscan_model.json")).unwrap();
        assert!(content.contains("\"dbscan\""));
    }
}
