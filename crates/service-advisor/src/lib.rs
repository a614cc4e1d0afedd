//! Cloud Service Placement Advisor Library
//!
//! Filters a catalog of cloud-service records, standardizes and projects
//! their resource features, and optionally clusters them (DBSCAN), projects
//! them onto a placement discriminant (LDA) and ranks them by QoS score.
//!
//! # Overview
//!
//! - **Loading**: [`load_catalog`] reads the catalog CSV once with Polars
//!   into an immutable [`Catalog`]
//! - **Scaling**: per-subset standardization and a 2-component PCA
//! - **Clustering**: DBSCAN over the PCA coordinates, with a cached model
//! - **Discriminant projection**: 1D LDA against `Optimal_Service_Placement`,
//!   with a cached model and a zero fallback on failure
//! - **Filtering**: provider/type/threshold predicates, bounded results
//! - **Plotting**: cluster coordinates for the whole catalog
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use service_advisor::{Advisor, CacheConfig, FilterRequest, load_catalog};
//! use std::sync::Arc;
//!
//! let catalog = Arc::new(load_catalog("multi_cloud_service_composition.csv")?);
//! let advisor = Advisor::new(catalog, &CacheConfig::default())?;
//!
//! let request = FilterRequest::builder()
//!     .provider("AWS")
//!     .min_cpu(50.0)
//!     .use_cluster(true)
//!     .build()?;
//!
//! for row in advisor.filter(&request)? {
//!     println!("{} cluster={:?}", row.record.service_id, row.cluster);
//! }
//!
//! let plot = advisor.build_plot(request.eps, request.min_samples);
//! ```
//!
//! # Model cache
//!
//! Fitted models are stored as JSON artifacts in [`CacheConfig::dir`]. By
//! default an artifact is reused whenever it exists
//! ([`CacheKeyPolicy::Existence`]); note that a cached cluster model keeps
//! the `eps`/`min_samples` it was first fitted with. Use
//! [`CacheKeyPolicy::Fingerprint`] to key artifacts by their fit inputs.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod loader;
pub mod plot;
pub mod session;
pub mod types;

// Re-exports for convenient access
pub use analysis::{
    ClusterEngine, ClusterModel, DiscriminantModel, DiscriminantProjector, NOISE,
    ScaledFeatureSet, scale_and_reduce,
};
pub use cache::{ModelArtifact, ModelCache};
pub use config::{
    CacheConfig, CacheConfigBuilder, CacheKeyPolicy, ConfigValidationError, DEFAULT_EPS,
    DEFAULT_MIN_SAMPLES, FilterRequest, FilterRequestBuilder, PAGE_SIZE,
};
pub use engine::{Advisor, DEFAULT_LIMIT, OPTIMIZED_LIMIT};
pub use error::{AdvisorError, Result as AdvisorResult, ResultExt};
pub use loader::{Catalog, load_catalog};
pub use session::{Page, QuerySession};
pub use types::{FeatureColumn, PlotPoint, ResultRow, ServiceRecord};
