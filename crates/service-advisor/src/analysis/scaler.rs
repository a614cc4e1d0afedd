//! Feature standardization and 2D principal-component projection.
//!
//! Statistics come from the subset being analysed, never from the whole
//! catalog, so the same record standardizes differently depending on which
//! filter it passed through. Nothing is persisted between calls.

use crate::analysis::orient_sign;
use crate::error::{AdvisorError, Result};
use crate::types::{FeatureColumn, ServiceRecord};
use linfa::prelude::*;
use linfa_preprocessing::linear_scaling::LinearScaler;
use linfa_reduction::Pca;
use ndarray::{Array1, Array2, Axis};
use tracing::debug;

/// Number of projection components produced for visualization.
pub const N_COMPONENTS: usize = 2;

const N_FEATURES: usize = FeatureColumn::ALL.len();

/// Standardized features and PCA coordinates of one subset.
///
/// Row `i` always belongs to input record `i`.
#[derive(Debug, Clone)]
pub struct ScaledFeatureSet {
    /// `rows × 4` standardized features.
    pub standardized: Array2<f64>,
    /// `rows × 2` projection coordinates.
    pub projection: Array2<f64>,
    /// Per-column means used for centering.
    pub means: [f64; N_FEATURES],
    /// Per-column scales (population standard deviation, or 1 for
    /// constant columns).
    pub scales: [f64; N_FEATURES],
    /// Variance captured by each projection component.
    pub explained_variance: [f64; N_COMPONENTS],
}

impl ScaledFeatureSet {
    pub fn len(&self) -> usize {
        self.standardized.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Projection coordinates as `(PCA1, PCA2)` pairs in row order.
    pub fn coordinates(&self) -> Vec<[f64; 2]> {
        self.projection
            .outer_iter()
            .map(|row| [row[0], row[1]])
            .collect()
    }
}

/// Standardize the four numeric features of `records` and project them to
/// two dimensions.
///
/// Degenerate subsets never fail: an empty subset yields an empty set, and
/// with fewer than two rows both coordinates are 0.
pub fn scale_and_reduce(records: &[ServiceRecord]) -> ScaledFeatureSet {
    let raw = feature_matrix(records);
    let (standardized, means, scales) = standardize(&raw);

    let (projection, explained_variance) = match principal_components(&standardized) {
        Ok(result) => result,
        Err(e) => {
            debug!("PCA skipped: {}", e);
            (
                Array2::zeros((standardized.nrows(), N_COMPONENTS)),
                [0.0; N_COMPONENTS],
            )
        }
    };

    ScaledFeatureSet {
        standardized,
        projection,
        means,
        scales,
        explained_variance,
    }
}

/// Raw `rows × 4` feature matrix in [`FeatureColumn::ALL`] order.
pub(crate) fn feature_matrix(records: &[ServiceRecord]) -> Array2<f64> {
    let mut matrix = Array2::<f64>::zeros((records.len(), N_FEATURES));
    for (mut row, record) in matrix.outer_iter_mut().zip(records) {
        for (j, value) in record.features().into_iter().enumerate() {
            row[j] = value;
        }
    }
    matrix
}

/// Center each column on its mean and divide by its population standard
/// deviation. Constant columns keep a scale of 1 and are only centered.
fn standardize(raw: &Array2<f64>) -> (Array2<f64>, [f64; N_FEATURES], [f64; N_FEATURES]) {
    let mut means = [0.0; N_FEATURES];
    let mut scales = [1.0; N_FEATURES];

    if raw.nrows() == 0 {
        return (raw.clone(), means, scales);
    }

    let dataset = Dataset::new(raw.clone(), Array1::<f64>::zeros(raw.nrows()));
    let scaler = match LinearScaler::standard().fit(&dataset) {
        Ok(scaler) => scaler,
        Err(e) => {
            debug!("Standardization skipped: {}", e);
            return (raw.clone(), means, scales);
        }
    };

    let mut standardized = scaler.transform(raw.clone());

    // The scaler keeps multiplicative factors, the reciprocal of each deviation
    for (j, (&offset, &factor)) in scaler.offsets().iter().zip(scaler.scales()).enumerate() {
        means[j] = offset;
        if factor.is_finite() && factor > 0.0 {
            scales[j] = 1.0 / factor;
        } else {
            standardized
                .column_mut(j)
                .assign(&raw.column(j).mapv(|x| x - offset));
        }
    }

    (standardized, means, scales)
}

/// Project centered data onto its two leading principal axes.
fn principal_components(
    centered: &Array2<f64>,
) -> Result<(Array2<f64>, [f64; N_COMPONENTS])> {
    let n = centered.nrows();
    if n < 2 {
        return Err(AdvisorError::DegenerateInput {
            operation: "pca",
            rows: n,
            required: 2,
        });
    }

    let dataset = Dataset::new(centered.clone(), Array1::<f64>::zeros(n));
    let pca = Pca::params(N_COMPONENTS)
        .fit(&dataset)
        .map_err(|e| AdvisorError::ModelFit(format!("pca: {}", e)))?;
    let mut projection: Array2<f64> = pca.predict(centered);
    let components = pca.components();
    let variances = pca.explained_variance();

    let mut explained = [0.0; N_COMPONENTS];
    for (k, mut column) in projection.axis_iter_mut(Axis(1)).enumerate() {
        let axis = components.row(k);
        // A component with no variance behind it has no direction
        if !axis.iter().all(|v| v.is_finite()) || !variances[k].is_finite() {
            column.fill(0.0);
            continue;
        }
        // Signs are arbitrary; the largest loading is made positive
        if orient_sign(axis) < 0.0 {
            column.mapv_inplace(|x| -x);
        }
        explained[k] = variances[k].max(0.0);
    }

    Ok((projection, explained))
}
