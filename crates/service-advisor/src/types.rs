use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Column names
// ============================================================================

pub const SERVICE_ID: &str = "Service_ID";
pub const CLOUD_PROVIDER: &str = "Cloud_Provider";
pub const SERVICE_TYPE: &str = "Service_Type";
pub const CPU_UTILIZATION: &str = "CPU_Utilization (%)";
pub const MEMORY_USAGE: &str = "Memory_Usage (MB)";
pub const NETWORK_BANDWIDTH: &str = "Network_Bandwidth (Mbps)";
pub const SERVICE_LATENCY: &str = "Service_Latency (ms)";
pub const QOS_SCORE: &str = "QoS_Score";
pub const OPTIMAL_PLACEMENT: &str = "Optimal_Service_Placement";

/// The four numeric columns used for scaling, clustering and the
/// discriminant projection, in matrix column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureColumn {
    CpuUtilization,
    MemoryUsage,
    NetworkBandwidth,
    ServiceLatency,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 4] = [
        FeatureColumn::CpuUtilization,
        FeatureColumn::MemoryUsage,
        FeatureColumn::NetworkBandwidth,
        FeatureColumn::ServiceLatency,
    ];

    /// Header of this column in the catalog source.
    pub fn column_name(self) -> &'static str {
        match self {
            FeatureColumn::CpuUtilization => CPU_UTILIZATION,
            FeatureColumn::MemoryUsage => MEMORY_USAGE,
            FeatureColumn::NetworkBandwidth => NETWORK_BANDWIDTH,
            FeatureColumn::ServiceLatency => SERVICE_LATENCY,
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One row of the catalog. Field names serialize to the source headers.
///
/// Source columns outside the known schema are kept in `extra` and
/// serialize next to the known ones under their own headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "Service_ID")]
    pub service_id: String,
    #[serde(rename = "Cloud_Provider")]
    pub cloud_provider: Option<String>,
    #[serde(rename = "Service_Type")]
    pub service_type: Option<String>,
    #[serde(rename = "CPU_Utilization (%)")]
    pub cpu_utilization: f64,
    #[serde(rename = "Memory_Usage (MB)")]
    pub memory_usage: f64,
    #[serde(rename = "Network_Bandwidth (Mbps)")]
    pub network_bandwidth: f64,
    #[serde(rename = "Service_Latency (ms)")]
    pub service_latency: f64,
    #[serde(rename = "QoS_Score")]
    pub qos_score: f64,
    #[serde(
        rename = "Optimal_Service_Placement",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub optimal_placement: Option<String>,
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl ServiceRecord {
    pub fn feature(&self, column: FeatureColumn) -> f64 {
        match column {
            FeatureColumn::CpuUtilization => self.cpu_utilization,
            FeatureColumn::MemoryUsage => self.memory_usage,
            FeatureColumn::NetworkBandwidth => self.network_bandwidth,
            FeatureColumn::ServiceLatency => self.service_latency,
        }
    }

    /// Raw feature vector in [`FeatureColumn::ALL`] order.
    pub fn features(&self) -> [f64; 4] {
        FeatureColumn::ALL.map(|column| self.feature(column))
    }
}

/// A filtered record plus whatever analysis columns the request attached.
///
/// Scaled and PCA intermediates are never part of a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(flatten)]
    pub record: ServiceRecord,
    #[serde(rename = "Cluster", skip_serializing_if = "Option::is_none", default)]
    pub cluster: Option<i64>,
    #[serde(rename = "LDA_1D", skip_serializing_if = "Option::is_none", default)]
    pub discriminant: Option<f64>,
}

impl ResultRow {
    pub fn new(record: ServiceRecord) -> Self {
        Self {
            record,
            cluster: None,
            discriminant: None,
        }
    }
}

/// One point of the cluster visualization dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotPoint {
    #[serde(rename = "Service_ID")]
    pub service_id: String,
    #[serde(rename = "PCA1")]
    pub pca1: f64,
    #[serde(rename = "PCA2")]
    pub pca2: f64,
    #[serde(rename = "Cluster")]
    pub cluster: i64,
}
