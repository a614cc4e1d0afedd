//! One-dimensional Linear Discriminant Analysis against the placement label.
//!
//! The projection axis maximizes between-class separation relative to the
//! pooled within-class covariance. Any fit or transform failure degrades to
//! a value of `0.0` per row; the error is logged and never reaches the
//! caller.

use crate::analysis::orient_sign;
use crate::analysis::scaler::ScaledFeatureSet;
use crate::cache::{Fingerprint, ModelCache};
use crate::error::{AdvisorError, Result};
use crate::types::ServiceRecord;
use linfa_linalg::cholesky::Cholesky;
use linfa_linalg::eigh::{EigSort, Eigh};
use linfa_linalg::triangular::{SolveTriangular, UPLO};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MODEL_KIND: &str = "lda";

const N_FEATURES: usize = 4;

/// A fitted 1-component discriminant projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscriminantModel {
    /// Class labels seen during fit, sorted.
    pub classes: Vec<String>,
    /// Overall training mean, subtracted before projecting.
    pub mean: [f64; N_FEATURES],
    /// Projection coefficients, one per feature.
    pub scalings: [f64; N_FEATURES],
    /// Share of between-class variance captured by the single axis.
    pub explained_variance_ratio: f64,
}

impl DiscriminantModel {
    /// Fit on a `rows × 4` feature matrix and one label per row.
    pub fn fit(features: ArrayView2<f64>, labels: &[Option<String>]) -> Result<Self> {
        let n = features.nrows();
        if features.ncols() != N_FEATURES {
            return Err(AdvisorError::ModelFit(format!(
                "expected {} features, got {}",
                N_FEATURES,
                features.ncols()
            )));
        }
        if labels.len() != n {
            return Err(AdvisorError::ModelFit(format!(
                "{} labels for {} rows",
                labels.len(),
                n
            )));
        }

        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, label) in labels.iter().enumerate() {
            let label = label
                .as_deref()
                .ok_or_else(|| AdvisorError::ModelFit(format!("row {} has no label", i)))?;
            groups.entry(label).or_default().push(i);
        }

        let k = groups.len();
        if k < 2 {
            return Err(AdvisorError::ModelFit(format!(
                "need at least 2 classes, found {}",
                k
            )));
        }
        if n <= k {
            return Err(AdvisorError::ModelFit(format!(
                "need more rows than classes ({} rows, {} classes)",
                n, k
            )));
        }

        let overall = features
            .mean_axis(Axis(0))
            .ok_or_else(|| AdvisorError::ModelFit("empty training set".to_string()))?;

        let mut within = Array2::<f64>::zeros((N_FEATURES, N_FEATURES));
        let mut between = Array2::<f64>::zeros((N_FEATURES, N_FEATURES));
        for rows in groups.values() {
            let members = features.select(Axis(0), rows);
            let Some(class_mean) = members.mean_axis(Axis(0)) else {
                continue;
            };

            let centered = &members - &class_mean;
            within = within + centered.t().dot(&centered);

            let offset = (&class_mean - &overall).insert_axis(Axis(1));
            between = between + offset.dot(&offset.t()) * rows.len() as f64;
        }
        within /= (n - k) as f64;
        between /= n as f64;

        let (direction, ratio) = leading_direction(&within, &between)?;
        let classes = groups.keys().map(|c| c.to_string()).collect();

        Ok(Self {
            classes,
            mean: to_array(&overall),
            scalings: to_array(&direction),
            explained_variance_ratio: ratio,
        })
    }

    /// Project a `rows × 4` feature matrix onto the discriminant axis.
    pub fn transform(&self, features: ArrayView2<f64>) -> Result<Vec<f64>> {
        if features.ncols() != N_FEATURES {
            return Err(AdvisorError::ModelFit(format!(
                "expected {} features, got {}",
                N_FEATURES,
                features.ncols()
            )));
        }

        let mean = Array1::from(self.mean.to_vec());
        let scalings = Array1::from(self.scalings.to_vec());
        let projected = (&features - &mean).dot(&scalings);

        if projected.iter().any(|v| !v.is_finite()) {
            return Err(AdvisorError::ModelFit(
                "projection produced non-finite values".to_string(),
            ));
        }
        Ok(projected.to_vec())
    }
}

/// Leading generalized eigenvector of `(between, within)`, scaled so the
/// projected within-class variance is 1, with its explained-variance ratio.
fn leading_direction(within: &Array2<f64>, between: &Array2<f64>) -> Result<(Array1<f64>, f64)> {
    let l = within.cholesky().map_err(|e| {
        AdvisorError::ModelFit(format!("within-class covariance is singular: {}", e))
    })?;

    // M = L⁻¹ · Sb · L⁻ᵀ
    let half = l
        .solve_triangular(between, UPLO::Lower)
        .map_err(linalg_error)?;
    let reduced = l
        .solve_triangular(&half.t().to_owned(), UPLO::Lower)
        .map_err(linalg_error)?;
    let reduced = (&reduced + &reduced.t()) * 0.5;

    let (values, vectors) = reduced.eigh().map_err(linalg_error)?.sort_eig_desc();
    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    if total <= f64::EPSILON {
        return Err(AdvisorError::ModelFit(
            "class means do not separate".to_string(),
        ));
    }

    // w = L⁻ᵀ · y
    let leading = vectors.column(0).to_owned().insert_axis(Axis(1));
    let direction = l
        .t()
        .to_owned()
        .solve_triangular(&leading, UPLO::Upper)
        .map_err(linalg_error)?
        .column(0)
        .to_owned();

    let sign = orient_sign(direction.view());
    Ok((direction * sign, values[0].max(0.0) / total))
}

fn linalg_error(e: linfa_linalg::LinalgError) -> AdvisorError {
    AdvisorError::ModelFit(format!("discriminant solve: {}", e))
}

fn to_array(values: &Array1<f64>) -> [f64; N_FEATURES] {
    let mut out = [0.0; N_FEATURES];
    for (dst, src) in out.iter_mut().zip(values.iter()) {
        *dst = *src;
    }
    out
}

/// Projects standardized features through the shared model cache.
#[derive(Debug, Clone)]
pub struct DiscriminantProjector {
    cache: Arc<ModelCache>,
    artifact: String,
}

impl DiscriminantProjector {
    pub fn new(cache: Arc<ModelCache>, artifact: impl Into<String>) -> Self {
        Self {
            cache,
            artifact: artifact.into(),
        }
    }

    /// One discriminant value per record, or `None` when the catalog has no
    /// placement label.
    ///
    /// An existing artifact is loaded and only used to transform. Without
    /// one, the model is fitted on this subset and persisted. Errors yield
    /// `0.0` for every row.
    pub fn project(
        &self,
        has_label: bool,
        records: &[ServiceRecord],
        scaled: &ScaledFeatureSet,
    ) -> Option<Vec<f64>> {
        if !has_label {
            debug!("No placement label; skipping discriminant projection");
            return None;
        }

        match self.try_project(records, scaled) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(rows = records.len(), "Discriminant projection failed, using 0: {}", e);
                Some(vec![0.0; records.len()])
            }
        }
    }

    fn try_project(&self, records: &[ServiceRecord], scaled: &ScaledFeatureSet) -> Result<Vec<f64>> {
        let features = scaled.standardized.view();
        let labels: Vec<Option<String>> = records
            .iter()
            .map(|r| r.optimal_placement.clone())
            .collect();
        let fingerprint = training_fingerprint(features, &labels);

        let cached = match self
            .cache
            .load::<DiscriminantModel>(&self.artifact, MODEL_KIND, &fingerprint)
        {
            Ok(artifact) => artifact.map(|a| a.model),
            Err(e) => {
                warn!("Ignoring unreadable discriminant model: {}", e);
                None
            }
        };

        if let Some(model) = cached {
            return model.transform(features);
        }

        let model = DiscriminantModel::fit(features, &labels)?;
        let values = model.transform(features)?;
        debug!(
            classes = model.classes.len(),
            explained_variance_ratio = model.explained_variance_ratio,
            "Discriminant model fitted"
        );

        match self
            .cache
            .store(&self.artifact, MODEL_KIND, &fingerprint, &model)
        {
            Ok(path) => info!("Discriminant model cached: {}", path.display()),
            Err(e) => warn!("Failed to cache discriminant model: {}", e),
        }
        Ok(values)
    }
}

fn training_fingerprint(features: ArrayView2<f64>, labels: &[Option<String>]) -> String {
    let mut fingerprint = Fingerprint::new(MODEL_KIND).usize(features.nrows());
    for (row, label) in features.outer_iter().zip(labels) {
        for &value in row.iter() {
            fingerprint = fingerprint.f64(value);
        }
        fingerprint = fingerprint.str(label.as_deref().unwrap_or(""));
    }
    fingerprint.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::scaler::scale_and_reduce;
    use crate::config::{CacheConfig, CacheKeyPolicy};
    use crate::types::fixtures::record;
    use tempfile::tempdir;

    fn labelled() -> Vec<ServiceRecord> {
        vec![
            record("a1", "AWS", "Compute", [10.0, 512.0, 120.0, 22.0], 0.5, Some("Edge")),
            record("a2", "AWS", "Compute", [14.0, 640.0, 80.0, 30.0], 0.6, Some("Edge")),
            record("a3", "GCP", "Storage", [12.0, 300.0, 150.0, 18.0], 0.4, Some("Edge")),
            record("a4", "Azure", "Compute", [9.0, 900.0, 95.0, 27.0], 0.7, Some("Edge")),
            record("b1", "AWS", "Storage", [82.0, 700.0, 110.0, 25.0], 0.8, Some("Cloud")),
            record("b2", "GCP", "Compute", [78.0, 420.0, 140.0, 33.0], 0.9, Some("Cloud")),
            record("b3", "Azure", "Storage", [85.0, 560.0, 70.0, 20.0], 0.3, Some("Cloud")),
            record("b4", "GCP", "Compute", [80.0, 820.0, 125.0, 29.0], 0.6, Some("Cloud")),
        ]
    }

    fn projector(dir: &std::path::Path) -> DiscriminantProjector {
        let config = CacheConfig::builder()
            .dir(dir)
            .key_policy(CacheKeyPolicy::Existence)
            .build()
            .unwrap();
        DiscriminantProjector::new(
            Arc::new(ModelCache::new(&config)),
            config.discriminant_artifact,
        )
    }

    #[test]
    fn test_fit_separates_classes() {
        let records = labelled();
        let scaled = scale_and_reduce(&records);
        let labels: Vec<Option<String>> =
            records.iter().map(|r| r.optimal_placement.clone()).collect();

        let model = DiscriminantModel::fit(scaled.standardized.view(), &labels).unwrap();
        assert_eq!(model.classes, vec!["Cloud".to_string(), "Edge".to_string()]);
        assert!((model.explained_variance_ratio - 1.0).abs() < 1e-6);

        let values = model.transform(scaled.standardized.view()).unwrap();
        let (edge, cloud) = values.split_at(4);
        let edge_max = edge.iter().copied().fold(f64::MIN, f64::max);
        let edge_min = edge.iter().copied().fold(f64::MAX, f64::min);
        let cloud_max = cloud.iter().copied().fold(f64::MIN, f64::max);
        let cloud_min = cloud.iter().copied().fold(f64::MAX, f64::min);
        assert!(edge_max < cloud_min || cloud_max < edge_min);

        // Centered on the training mean
        assert!(values.iter().sum::<f64>().abs() < 1e-9);
    }

    #[test]
    fn test_fit_rejects_single_class() {
        let records: Vec<ServiceRecord> = labelled()
            .into_iter()
            .map(|mut r| {
                r.optimal_placement = Some("Edge".to_string());
                r
            })
            .collect();
        let scaled = scale_and_reduce(&records);
        let labels: Vec<Option<String>> =
            records.iter().map(|r| r.optimal_placement.clone()).collect();

        let result = DiscriminantModel::fit(scaled.standardized.view(), &labels);
        assert!(matches!(result, Err(AdvisorError::ModelFit(_))));
    }

    #[test]
    fn test_fit_rejects_singular_within_class_covariance() {
        // A constant feature leaves the pooled covariance without full rank
        let records: Vec<ServiceRecord> = labelled()
            .into_iter()
            .map(|mut r| {
                r.memory_usage = 1024.0;
                r
            })
            .collect();
        let scaled = scale_and_reduce(&records);
        let labels: Vec<Option<String>> =
            records.iter().map(|r| r.optimal_placement.clone()).collect();

        let result = DiscriminantModel::fit(scaled.standardized.view(), &labels);
        assert!(matches!(result, Err(AdvisorError::ModelFit(_))));
    }

    #[test]
    fn test_fit_rejects_missing_label() {
        let mut records = labelled();
        records[2].optimal_placement = None;
        let scaled = scale_and_reduce(&records);
        let labels: Vec<Option<String>> =
            records.iter().map(|r| r.optimal_placement.clone()).collect();

        let result = DiscriminantModel::fit(scaled.standardized.view(), &labels);
        assert!(matches!(result, Err(AdvisorError::ModelFit(_))));
    }

    #[test]
    fn test_passthrough_without_label_column() {
        let dir = tempdir().unwrap();
        let records = labelled();
        let scaled = scale_and_reduce(&records);
        assert_eq!(projector(dir.path()).project(false, &records, &scaled), None);
        assert!(!dir.path().join("lda_model.json").exists());
    }

    #[test]
    fn test_single_class_yields_zeros_and_is_not_cached() {
        let dir = tempdir().unwrap();
        let records: Vec<ServiceRecord> = labelled()
            .into_iter()
            .map(|mut r| {
                r.optimal_placement = Some("Edge".to_string());
                r
            })
            .collect();
        let scaled = scale_and_reduce(&records);

        let values = projector(dir.path()).project(true, &records, &scaled);
        assert_eq!(values, Some(vec![0.0; records.len()]));
        assert!(!dir.path().join("lda_model.json").exists());
    }

    #[test]
    fn test_empty_subset_yields_empty_values() {
        let dir = tempdir().unwrap();
        let scaled = scale_and_reduce(&[]);
        assert_eq!(projector(dir.path()).project(true, &[], &scaled), Some(vec![]));
    }

    #[test]
    fn test_cached_model_is_reused_without_refit() {
        let dir = tempdir().unwrap();
        let projector = projector(dir.path());
        let records = labelled();
        let scaled = scale_and_reduce(&records);

        let first = projector.project(true, &records, &scaled).unwrap();
        assert!(first.iter().any(|&v| v != 0.0));
        assert!(dir.path().join("lda_model.json").exists());

        // A single-class subset cannot be fitted, but the cached model still
        // transforms it
        let subset: Vec<ServiceRecord> = records[..4].to_vec();
        let subset_scaled = scale_and_reduce(&subset);
        let values = projector.project(true, &subset, &subset_scaled).unwrap();
        assert_eq!(values.len(), 4);
        assert!(values.iter().any(|&v| v != 0.0));
    }
}
