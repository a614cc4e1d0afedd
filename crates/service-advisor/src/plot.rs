//! Cluster visualization data for the whole catalog.

use crate::analysis::{ClusterEngine, scale_and_reduce};
use crate::loader::Catalog;
use crate::types::PlotPoint;
use tracing::debug;

/// Scale and cluster every catalog row and return one point per row, in
/// catalog order.
///
/// Goes through the same cache as the filter engine, so a cluster model
/// persisted by an earlier filter is re-used here (and vice versa).
pub fn build_plot(
    catalog: &Catalog,
    clusters: &ClusterEngine,
    eps: f64,
    min_samples: usize,
) -> Vec<PlotPoint> {
    let records = catalog.records();
    let scaled = scale_and_reduce(records);
    let labels = clusters.cluster(&scaled, eps, min_samples);

    let points: Vec<PlotPoint> = records
        .iter()
        .zip(scaled.coordinates())
        .zip(labels)
        .map(|((record, [pca1, pca2]), cluster)| PlotPoint {
            service_id: record.service_id.clone(),
            pca1,
            pca2,
            cluster,
        })
        .collect();

    debug!(points = points.len(), "Plot data built");
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::NOISE;
    use crate::cache::ModelCache;
    use crate::config::CacheConfig;
    use crate::types::fixtures::record;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn engine(dir: &std::path::Path) -> ClusterEngine {
        let config = CacheConfig::builder().dir(dir).build().unwrap();
        ClusterEngine::new(Arc::new(ModelCache::new(&config)), config.cluster_artifact)
    }

    #[test]
    fn test_three_separated_rows_are_noise() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::from_records(
            vec![
                record("s1", "AWS", "Compute", [5.0, 100.0, 10.0, 5.0], 0.1, None),
                record("s2", "GCP", "Storage", [50.0, 4000.0, 500.0, 50.0], 0.2, None),
                record("s3", "Azure", "Database", [95.0, 200.0, 950.0, 250.0], 0.3, None),
            ],
            false,
        );

        let points = build_plot(&catalog, &engine(dir.path()), 0.5, 3);
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| p.cluster == NOISE));
        assert_eq!(points[0].service_id, "s1");
        assert_eq!(points[2].service_id, "s3");
    }

    #[test]
    fn test_empty_catalog() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::from_records(Vec::new(), false);
        assert!(build_plot(&catalog, &engine(dir.path()), 0.5, 3).is_empty());
    }
}
