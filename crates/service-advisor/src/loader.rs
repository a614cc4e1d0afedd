//! Catalog loading.
//!
//! The catalog is read once at startup with Polars, converted into typed
//! [`ServiceRecord`]s and then shared read-only (usually behind an `Arc`)
//! with every analysis component.

use crate::error::{AdvisorError, Result, ResultExt};
use crate::types::{
    CLOUD_PROVIDER, CPU_UTILIZATION, MEMORY_USAGE, NETWORK_BANDWIDTH, OPTIMAL_PLACEMENT,
    QOS_SCORE, SERVICE_ID, SERVICE_LATENCY, SERVICE_TYPE, ServiceRecord,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Columns that must be present in every catalog source.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    SERVICE_ID,
    CLOUD_PROVIDER,
    SERVICE_TYPE,
    CPU_UTILIZATION,
    MEMORY_USAGE,
    NETWORK_BANDWIDTH,
    SERVICE_LATENCY,
    QOS_SCORE,
];

/// The full, ordered, immutable collection of service records.
#[derive(Debug, Clone)]
pub struct Catalog {
    records: Vec<ServiceRecord>,
    providers: Vec<String>,
    service_types: Vec<String>,
    has_placement_label: bool,
}

static_assertions::assert_impl_all!(Catalog: Send, Sync);

impl Catalog {
    /// Build a catalog from records already in memory.
    ///
    /// `has_placement_label` tells the discriminant projector whether the
    /// source carried an `Optimal_Service_Placement` column at all.
    pub fn from_records(records: Vec<ServiceRecord>, has_placement_label: bool) -> Self {
        let providers = distinct(records.iter().map(|r| r.cloud_provider.as_deref()));
        let service_types = distinct(records.iter().map(|r| r.service_type.as_deref()));

        Self {
            records,
            providers,
            service_types,
            has_placement_label,
        }
    }

    /// Convert a loaded DataFrame into a catalog, validating its columns.
    ///
    /// Columns outside the known schema are carried on each record as
    /// extra values.
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        for name in REQUIRED_COLUMNS {
            if df.column(name).is_err() {
                return Err(AdvisorError::DataLoad(format!(
                    "missing required column '{}'",
                    name
                )));
            }
        }

        let ids = string_values(df, SERVICE_ID)?;
        let providers = string_values(df, CLOUD_PROVIDER)?;
        let service_types = string_values(df, SERVICE_TYPE)?;
        let cpu = numeric_values(df, CPU_UTILIZATION)?;
        let memory = numeric_values(df, MEMORY_USAGE)?;
        let bandwidth = numeric_values(df, NETWORK_BANDWIDTH)?;
        let latency = numeric_values(df, SERVICE_LATENCY)?;
        let qos = numeric_values(df, QOS_SCORE)?;

        let has_placement_label = df.column(OPTIMAL_PLACEMENT).is_ok();
        let labels = if has_placement_label {
            string_values(df, OPTIMAL_PLACEMENT)?
        } else {
            vec![None; df.height()]
        };

        let mut extra_columns = Vec::new();
        for name in df.get_column_names() {
            let name = name.as_str();
            if REQUIRED_COLUMNS.contains(&name) || name == OPTIMAL_PLACEMENT {
                continue;
            }
            extra_columns.push((name.to_string(), extra_values(df, name)?));
        }
        if !extra_columns.is_empty() {
            debug!(
                columns = ?extra_columns.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
                "Carrying extra catalog columns"
            );
        }

        let mut records = Vec::with_capacity(df.height());
        for row in 0..df.height() {
            let service_id = ids[row].clone().ok_or_else(|| {
                AdvisorError::DataLoad(format!("row {} has no {}", row, SERVICE_ID))
            })?;

            records.push(ServiceRecord {
                service_id,
                cloud_provider: providers[row].clone(),
                service_type: service_types[row].clone(),
                cpu_utilization: cpu[row],
                memory_usage: memory[row],
                network_bandwidth: bandwidth[row],
                service_latency: latency[row],
                qos_score: qos[row],
                optimal_placement: labels[row].clone(),
                extra: extra_columns
                    .iter()
                    .map(|(name, values)| (name.clone(), values[row].clone()))
                    .collect::<BTreeMap<_, _>>(),
            });
        }

        Ok(Self::from_records(records, has_placement_label))
    }

    pub fn records(&self) -> &[ServiceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted distinct provider names.
    pub fn providers(&self) -> &[String] {
        &self.providers
    }

    /// Sorted distinct service types.
    pub fn service_types(&self) -> &[String] {
        &self.service_types
    }

    pub fn has_placement_label(&self) -> bool {
        self.has_placement_label
    }
}

/// Load the catalog from a CSV file.
///
/// Fails with [`AdvisorError::DataLoad`] when the file is absent, cannot be
/// parsed, lacks a required column, or holds a non-numeric value in one of
/// the numeric columns.
pub fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(AdvisorError::DataLoad(format!(
            "catalog source not found: {}",
            path.display()
        )));
    }

    info!("Loading catalog from: {}", path.display());
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .map_err(|e| AdvisorError::DataLoad(format!("{}: {}", path.display(), e)))?;
    debug!("Catalog frame shape: {:?}", df.shape());

    let catalog = Catalog::from_dataframe(&df)?;
    info!(
        rows = catalog.len(),
        providers = catalog.providers().len(),
        service_types = catalog.service_types().len(),
        labelled = catalog.has_placement_label(),
        "Catalog loaded"
    );
    Ok(catalog)
}

fn distinct<'a>(values: impl Iterator<Item = Option<&'a str>>) -> Vec<String> {
    values
        .flatten()
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)
        .context(format!("reading column '{}'", name))?;
    Ok(series
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Values of a column outside the known schema, kept with their JSON type.
fn extra_values(df: &DataFrame, name: &str) -> Result<Vec<Value>> {
    let series = df.column(name)?.as_materialized_series();
    let dtype = series.dtype();

    if dtype.is_integer() {
        let ints = series
            .cast(&DataType::Int64)
            .context(format!("reading column '{}'", name))?;
        return Ok(ints
            .i64()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::from))
            .collect());
    }
    if dtype.is_float() {
        let floats = series
            .cast(&DataType::Float64)
            .context(format!("reading column '{}'", name))?;
        return Ok(floats
            .f64()?
            .into_iter()
            .map(|v| {
                v.and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            })
            .collect());
    }
    if dtype == &DataType::Boolean {
        return Ok(series
            .bool()?
            .into_iter()
            .map(|v| v.map_or(Value::Null, Value::Bool))
            .collect());
    }

    Ok(string_values(df, name)?
        .into_iter()
        .map(|v| v.map_or(Value::Null, Value::String))
        .collect())
}

fn numeric_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.as_materialized_series();
    let original_nulls = series.null_count();
    let floats = series
        .cast(&DataType::Float64)
        .context(format!("reading column '{}'", name))?;

    if original_nulls > 0 {
        return Err(AdvisorError::DataLoad(format!(
            "column '{}' has {} missing value(s)",
            name, original_nulls
        )));
    }
    if floats.null_count() > 0 {
        return Err(AdvisorError::DataLoad(format!(
            "column '{}' contains non-numeric values",
            name
        )));
    }

    Ok(floats.f64()?.into_no_null_iter().collect())
}
