//! Analysis module.
//!
//! Scaling and projection, density clustering and the discriminant
//! projection that the filter engine and plot builder compose.

pub mod cluster;
pub mod discriminant;
pub mod scaler;

pub use cluster::{ClusterEngine, ClusterModel, NOISE, dbscan};
pub use discriminant::{DiscriminantModel, DiscriminantProjector};
pub use scaler::{N_COMPONENTS, ScaledFeatureSet, scale_and_reduce};

use ndarray::ArrayView1;

/// `1.0` when the entry of largest magnitude in `axis` is non-negative,
/// `-1.0` otherwise. Multiplying by it gives eigenvectors a stable sign.
pub(crate) fn orient_sign(axis: ArrayView1<f64>) -> f64 {
    let largest = axis
        .iter()
        .copied()
        .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
    if largest < 0.0 { -1.0 } else { 1.0 }
}
