//! Configuration types for requests and the model cache.
//!
//! A [`FilterRequest`] is the typed form state of one request. Callers build
//! it through [`FilterRequest::builder()`], which validates user-supplied
//! values before they reach the filter engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default neighborhood radius for clustering.
pub const DEFAULT_EPS: f64 = 0.5;

/// Default minimum neighborhood size for clustering.
pub const DEFAULT_MIN_SAMPLES: usize = 3;

/// Rows shown after a fresh filter, and added by each "load more".
pub const PAGE_SIZE: usize = 10;

/// How model cache artifacts are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CacheKeyPolicy {
    /// An artifact is reused whenever its file exists, whatever parameters
    /// or data it was fitted with.
    #[default]
    Existence,
    /// Artifact names carry a fingerprint of the fit parameters, so each
    /// parameter set gets its own artifact.
    Fingerprint,
}

/// Form state for one filter request.
///
/// Empty `provider` / `service_type` mean "no filter". Thresholds of 0 have
/// no effect on non-negative catalog values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRequest {
    /// Exact provider to keep. Default: none
    pub provider: Option<String>,

    /// Exact service type to keep. Default: none
    pub service_type: Option<String>,

    /// Minimum CPU utilization (%). Default: 0
    pub min_cpu: f64,

    /// Minimum memory usage (MB). Default: 0
    pub min_memory: f64,

    /// Minimum network bandwidth (Mbps). Default: 0
    pub min_bandwidth: f64,

    /// Attach density-based cluster labels. Default: false
    pub use_cluster: bool,

    /// Attach the discriminant projection. Default: false
    pub use_discriminant: bool,

    /// Rank by QoS score and keep the top 5. Default: false
    pub optimize: bool,

    /// Clustering neighborhood radius. Default: 0.5
    pub eps: f64,

    /// Clustering minimum neighborhood size, the point itself included.
    /// At least 2. Default: 3
    pub min_samples: usize,

    /// Rows visible to the caller. Default: 10
    ///
    /// Display state only: `Advisor::filter` ignores it. A
    /// `QuerySession::submit` resets it to [`PAGE_SIZE`] and each
    /// `load_more` widens it by one page.
    pub show_count: usize,
}

impl Default for FilterRequest {
    fn default() -> Self {
        Self {
            provider: None,
            service_type: None,
            min_cpu: 0.0,
            min_memory: 0.0,
            min_bandwidth: 0.0,
            use_cluster: false,
            use_discriminant: false,
            optimize: false,
            eps: DEFAULT_EPS,
            min_samples: DEFAULT_MIN_SAMPLES,
            show_count: PAGE_SIZE,
        }
    }
}

impl FilterRequest {
    /// Create a new request builder.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let request = FilterRequest::builder()
    ///     .provider("AWS")
    ///     .min_cpu(50.0)
    ///     .use_cluster(true)
    ///     .build()?;
    /// ```
    pub fn builder() -> FilterRequestBuilder {
        FilterRequestBuilder::default()
    }

    /// Provider predicate, treating an empty string as absent.
    pub fn provider_filter(&self) -> Option<&str> {
        self.provider.as_deref().filter(|p| !p.is_empty())
    }

    /// Service-type predicate, treating an empty string as absent.
    pub fn service_type_filter(&self) -> Option<&str> {
        self.service_type.as_deref().filter(|t| !t.is_empty())
    }

    /// Validate the request and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("min_cpu", self.min_cpu),
            ("min_memory", self.min_memory),
            ("min_bandwidth", self.min_bandwidth),
        ] {
            if !value.is_finite() {
                return Err(ConfigValidationError::InvalidThreshold {
                    field: field.to_string(),
                    value,
                });
            }
        }

        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(ConfigValidationError::InvalidEps(self.eps));
        }

        if self.min_samples < 2 {
            return Err(ConfigValidationError::InvalidMinSamples(self.min_samples));
        }

        if self.show_count == 0 {
            return Err(ConfigValidationError::InvalidShowCount(self.show_count));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be a finite value)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid eps: {0} (must be a finite value > 0)")]
    InvalidEps(f64),

    #[error("Invalid min_samples: {0} (must be at least 2)")]
    InvalidMinSamples(usize),

    #[error("Invalid show_count: {0} (must be at least 1)")]
    InvalidShowCount(usize),

    #[error("Invalid artifact name for '{field}': '{value}'")]
    InvalidArtifactName { field: String, value: String },
}

impl From<ConfigValidationError> for crate::error::AdvisorError {
    fn from(err: ConfigValidationError) -> Self {
        crate::error::AdvisorError::InvalidConfig(err.to_string())
    }
}

/// Builder for [`FilterRequest`] with fluent API.
#[derive(Debug, Default)]
pub struct FilterRequestBuilder {
    provider: Option<String>,
    service_type: Option<String>,
    min_cpu: Option<f64>,
    min_memory: Option<f64>,
    min_bandwidth: Option<f64>,
    use_cluster: Option<bool>,
    use_discriminant: Option<bool>,
    optimize: Option<bool>,
    eps: Option<f64>,
    min_samples: Option<usize>,
    show_count: Option<usize>,
}

impl FilterRequestBuilder {
    /// Keep only rows of this provider. An empty string means no filter.
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Keep only rows of this service type. An empty string means no filter.
    pub fn service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn min_cpu(mut self, value: f64) -> Self {
        self.min_cpu = Some(value);
        self
    }

    pub fn min_memory(mut self, value: f64) -> Self {
        self.min_memory = Some(value);
        self
    }

    pub fn min_bandwidth(mut self, value: f64) -> Self {
        self.min_bandwidth = Some(value);
        self
    }

    /// Enable or disable cluster labelling.
    pub fn use_cluster(mut self, enable: bool) -> Self {
        self.use_cluster = Some(enable);
        self
    }

    /// Enable or disable the discriminant projection.
    pub fn use_discriminant(mut self, enable: bool) -> Self {
        self.use_discriminant = Some(enable);
        self
    }

    /// Enable or disable QoS ranking.
    pub fn optimize(mut self, enable: bool) -> Self {
        self.optimize = Some(enable);
        self
    }

    pub fn eps(mut self, eps: f64) -> Self {
        self.eps = Some(eps);
        self
    }

    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = Some(min_samples);
        self
    }

    pub fn show_count(mut self, show_count: usize) -> Self {
        self.show_count = Some(show_count);
        self
    }

    /// Build the request.
    ///
    /// Returns a validated `FilterRequest` or an error if validation fails.
    pub fn build(self) -> Result<FilterRequest, ConfigValidationError> {
        let request = FilterRequest {
            provider: self.provider,
            service_type: self.service_type,
            min_cpu: self.min_cpu.unwrap_or(0.0),
            min_memory: self.min_memory.unwrap_or(0.0),
            min_bandwidth: self.min_bandwidth.unwrap_or(0.0),
            use_cluster: self.use_cluster.unwrap_or(false),
            use_discriminant: self.use_discriminant.unwrap_or(false),
            optimize: self.optimize.unwrap_or(false),
            eps: self.eps.unwrap_or(DEFAULT_EPS),
            min_samples: self.min_samples.unwrap_or(DEFAULT_MIN_SAMPLES),
            show_count: self.show_count.unwrap_or(PAGE_SIZE),
        };

        request.validate()?;
        Ok(request)
    }
}

/// Where and how fitted models are cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the artifacts.
    /// Default: "." (the working directory)
    pub dir: PathBuf,

    /// File name of the cluster model artifact.
    /// Default: "dbscan_model.json"
    pub cluster_artifact: String,

    /// File name of the discriminant model artifact.
    /// Default: "lda_model.json"
    pub discriminant_artifact: String,

    /// Artifact keying policy.
    /// Default: Existence
    pub key_policy: CacheKeyPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            cluster_artifact: "dbscan_model.json".to_string(),
            discriminant_artifact: "lda_model.json".to_string(),
            key_policy: CacheKeyPolicy::default(),
        }
    }
}

impl CacheConfig {
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (field, value) in [
            ("cluster_artifact", &self.cluster_artifact),
            ("discriminant_artifact", &self.discriminant_artifact),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) {
                return Err(ConfigValidationError::InvalidArtifactName {
                    field: field.to_string(),
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`CacheConfig`].
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    dir: Option<PathBuf>,
    cluster_artifact: Option<String>,
    discriminant_artifact: Option<String>,
    key_policy: Option<CacheKeyPolicy>,
}

impl CacheConfigBuilder {
    pub fn dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.dir = Some(path.into());
        self
    }

    pub fn cluster_artifact(mut self, name: impl Into<String>) -> Self {
        self.cluster_artifact = Some(name.into());
        self
    }

    pub fn discriminant_artifact(mut self, name: impl Into<String>) -> Self {
        self.discriminant_artifact = Some(name.into());
        self
    }

    pub fn key_policy(mut self, policy: CacheKeyPolicy) -> Self {
        self.key_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<CacheConfig, ConfigValidationError> {
        let defaults = CacheConfig::default();
        let config = CacheConfig {
            dir: self.dir.unwrap_or(defaults.dir),
            cluster_artifact: self.cluster_artifact.unwrap_or(defaults.cluster_artifact),
            discriminant_artifact: self
                .discriminant_artifact
                .unwrap_or(defaults.discriminant_artifact),
            key_policy: self.key_policy.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}
