//! Filter and ranking engine.
//!
//! [`Advisor`] owns the shared catalog and model cache and runs one request
//! end to end: predicates, scaling, optional clustering and discriminant
//! projection, then ranking or truncation.

use crate::analysis::{ClusterEngine, DiscriminantProjector, scale_and_reduce};
use crate::cache::ModelCache;
use crate::config::{CacheConfig, FilterRequest};
use crate::error::Result;
use crate::loader::Catalog;
use crate::plot;
use crate::types::{PlotPoint, ResultRow, ServiceRecord};
use std::sync::Arc;
use tracing::{debug, info};

/// Rows returned when ranking by QoS score.
pub const OPTIMIZED_LIMIT: usize = 5;

/// Rows returned without ranking.
pub const DEFAULT_LIMIT: usize = 10;

/// Runs filter requests and plot builds against one catalog.
#[derive(Debug, Clone)]
pub struct Advisor {
    catalog: Arc<Catalog>,
    clusters: ClusterEngine,
    discriminant: DiscriminantProjector,
}

static_assertions::assert_impl_all!(Advisor: Send, Sync);

impl Advisor {
    pub fn new(catalog: Arc<Catalog>, cache_config: &CacheConfig) -> Result<Self> {
        cache_config.validate()?;
        let cache = Arc::new(ModelCache::new(cache_config));
        debug!(dir = %cache.dir().display(), policy = ?cache.policy(), "Model cache ready");

        Ok(Self {
            catalog,
            clusters: ClusterEngine::new(Arc::clone(&cache), cache_config.cluster_artifact.clone()),
            discriminant: DiscriminantProjector::new(
                cache,
                cache_config.discriminant_artifact.clone(),
            ),
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Filter the catalog and attach the requested analysis columns.
    ///
    /// Returns at most [`OPTIMIZED_LIMIT`] rows ranked by descending QoS
    /// score when `optimize` is set, otherwise the first [`DEFAULT_LIMIT`]
    /// matches in catalog order.
    pub fn filter(&self, request: &FilterRequest) -> Result<Vec<ResultRow>> {
        request.validate()?;

        let subset: Vec<ServiceRecord> = self
            .catalog
            .records()
            .iter()
            .filter(|record| matches(record, request))
            .cloned()
            .collect();

        info!(
            matched = subset.len(),
            total = self.catalog.len(),
            "Filter predicates applied"
        );

        if subset.is_empty() {
            return Ok(Vec::new());
        }

        let scaled = scale_and_reduce(&subset);

        let labels = request
            .use_cluster
            .then(|| self.clusters.cluster(&scaled, request.eps, request.min_samples));

        let projection = if request.use_discriminant {
            self.discriminant
                .project(self.catalog.has_placement_label(), &subset, &scaled)
        } else {
            None
        };

        let mut rows: Vec<ResultRow> = subset.into_iter().map(ResultRow::new).collect();
        if let Some(labels) = labels {
            for (row, label) in rows.iter_mut().zip(labels) {
                row.cluster = Some(label);
            }
        }
        if let Some(values) = projection {
            for (row, value) in rows.iter_mut().zip(values) {
                row.discriminant = Some(value);
            }
        }

        if request.optimize {
            // Stable: equal scores keep catalog order
            rows.sort_by(|a, b| b.record.qos_score.total_cmp(&a.record.qos_score));
            rows.truncate(OPTIMIZED_LIMIT);
        } else {
            rows.truncate(DEFAULT_LIMIT);
        }

        debug!(returned = rows.len(), optimize = request.optimize, "Filter complete");
        Ok(rows)
    }

    /// Cluster visualization data for the whole catalog.
    pub fn build_plot(&self, eps: f64, min_samples: usize) -> Vec<PlotPoint> {
        plot::build_plot(&self.catalog, &self.clusters, eps, min_samples)
    }
}

fn matches(record: &ServiceRecord, request: &FilterRequest) -> bool {
    request
        .provider_filter()
        .is_none_or(|p| record.cloud_provider.as_deref() == Some(p))
        && request
            .service_type_filter()
            .is_none_or(|t| record.service_type.as_deref() == Some(t))
        && record.cpu_utilization >= request.min_cpu
        && record.memory_usage >= request.min_memory
        && record.network_bandwidth >= request.min_bandwidth
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdvisorError;
    use crate::types::fixtures::record;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn catalog() -> Arc<Catalog> {
        let records = (0..14)
            .map(|i| {
                let provider = ["AWS", "Azure", "GCP"][i % 3];
                let service_type = if i % 2 == 0 { "Compute" } else { "Storage" };
                let f = i as f64;
                record(
                    &format!("svc-{:02}", i),
                    provider,
                    service_type,
                    [
                        10.0 + 6.0 * f,
                        256.0 + 128.0 * ((i * 5) % 14) as f64,
                        50.0 + 37.0 * (f % 5.0),
                        5.0 + (f * 7.0) % 40.0,
                    ],
                    (f * 0.37) % 1.0,
                    Some(if i < 7 { "Edge" } else { "Cloud" }),
                )
            })
            .collect();
        Arc::new(Catalog::from_records(records, true))
    }

    fn advisor(dir: &std::path::Path) -> Advisor {
        let config = CacheConfig::builder().dir(dir).build().unwrap();
        Advisor::new(catalog(), &config).unwrap()
    }

    fn ids(rows: &[ResultRow]) -> Vec<&str> {
        rows.iter().map(|r| r.record.service_id.as_str()).collect()
    }

    #[test]
    fn test_default_request_returns_first_ten_in_order() {
        let dir = tempdir().unwrap();
        let rows = advisor(dir.path()).filter(&FilterRequest::default()).unwrap();
        assert_eq!(rows.len(), DEFAULT_LIMIT);
        assert_eq!(ids(&rows)[..3].to_vec(), vec!["svc-00", "svc-01", "svc-02"]);
        assert!(rows.iter().all(|r| r.cluster.is_none() && r.discriminant.is_none()));
    }

    #[test]
    fn test_provider_and_threshold_predicates() {
        let dir = tempdir().unwrap();
        let request = FilterRequest::builder()
            .provider("AWS")
            .min_cpu(40.0)
            .build()
            .unwrap();
        let rows = advisor(dir.path()).filter(&request).unwrap();

        assert_eq!(ids(&rows), vec!["svc-06", "svc-09", "svc-12"]);
        assert!(rows.iter().all(|r| r.record.cpu_utilization >= 40.0));
    }

    #[test]
    fn test_service_type_predicate() {
        let dir = tempdir().unwrap();
        let request = FilterRequest::builder()
            .service_type("Storage")
            .min_memory(1000.0)
            .build()
            .unwrap();
        let rows = advisor(dir.path()).filter(&request).unwrap();
        assert!(!rows.is_empty());
        assert!(rows.iter().all(|r| {
            r.record.service_type.as_deref() == Some("Storage") && r.record.memory_usage >= 1000.0
        }));
    }

    #[test]
    fn test_optimize_ranks_by_qos() {
        let dir = tempdir().unwrap();
        let request = FilterRequest::builder().optimize(true).build().unwrap();
        let rows = advisor(dir.path()).filter(&request).unwrap();

        assert_eq!(rows.len(), OPTIMIZED_LIMIT);
        assert!(
            rows.windows(2)
                .all(|w| w[0].record.qos_score >= w[1].record.qos_score)
        );

        let best = catalog()
            .records()
            .iter()
            .map(|r| r.qos_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(rows[0].record.qos_score, best);
    }

    #[test]
    fn test_no_match_returns_empty() {
        let dir = tempdir().unwrap();
        let request = FilterRequest::builder()
            .provider("Oracle")
            .use_cluster(true)
            .use_discriminant(true)
            .build()
            .unwrap();
        let rows = advisor(dir.path()).filter(&request).unwrap();
        assert!(rows.is_empty());
        assert!(!dir.path().join("dbscan_model.json").exists());
    }

    #[test]
    fn test_analysis_columns_attached() {
        let dir = tempdir().unwrap();
        let request = FilterRequest::builder()
            .use_cluster(true)
            .use_discriminant(true)
            .build()
            .unwrap();
        let rows = advisor(dir.path()).filter(&request).unwrap();

        assert_eq!(rows.len(), DEFAULT_LIMIT);
        assert!(rows.iter().all(|r| r.cluster.is_some() && r.discriminant.is_some()));
        assert!(dir.path().join("dbscan_model.json").exists());
    }

    #[test]
    fn test_discriminant_passthrough_without_label_column() {
        let dir = tempdir().unwrap();
        let records = catalog().records().to_vec();
        let config = CacheConfig::builder().dir(dir.path()).build().unwrap();
        let advisor = Advisor::new(Arc::new(Catalog::from_records(records, false)), &config).unwrap();

        let request = FilterRequest::builder().use_discriminant(true).build().unwrap();
        let rows = advisor.filter(&request).unwrap();
        assert!(rows.iter().all(|r| r.discriminant.is_none()));
    }

    #[test]
    fn test_negative_thresholds_keep_every_row() {
        let dir = tempdir().unwrap();
        let advisor = advisor(dir.path());
        let request = FilterRequest::builder()
            .min_cpu(-10.0)
            .min_memory(-1.0)
            .min_bandwidth(-0.5)
            .build()
            .unwrap();

        let rows = advisor.filter(&request).unwrap();
        let unfiltered = advisor.filter(&FilterRequest::default()).unwrap();
        assert_eq!(rows, unfiltered);
    }

    #[test]
    fn test_invalid_request_is_rejected() {
        let dir = tempdir().unwrap();
        let request = FilterRequest {
            eps: -1.0,
            ..FilterRequest::default()
        };
        let result = advisor(dir.path()).filter(&request);
        assert!(matches!(result, Err(AdvisorError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_plot_covers_whole_catalog() {
        let dir = tempdir().unwrap();
        let points = advisor(dir.path()).build_plot(0.5, 3);
        assert_eq!(points.len(), 14);
        assert_eq!(points[13].service_id, "svc-13");
    }
}
