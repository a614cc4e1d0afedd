//! CLI entry point for the service advisor.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use dotenv::dotenv;
use serde::Serialize;
use service_advisor::{
    Advisor, CacheConfig, CacheKeyPolicy, Catalog, FilterRequest, Page, PlotPoint, load_catalog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// CLI-compatible cache keying policy
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCacheKey {
    /// Reuse an artifact whenever its file exists
    Existence,
    /// Key artifacts by a fingerprint of their fit inputs
    Fingerprint,
}

impl From<CliCacheKey> for CacheKeyPolicy {
    fn from(cli: CliCacheKey) -> Self {
        match cli {
            CliCacheKey::Existence => CacheKeyPolicy::Existence,
            CliCacheKey::Fingerprint => CacheKeyPolicy::Fingerprint,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Cloud service placement advisor",
    long_about = "Filter a catalog of cloud services, optionally cluster them (DBSCAN),\n\
                  project them onto the placement discriminant (LDA) and rank by QoS.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  SERVICE_ADVISOR_DATA        Default catalog CSV path\n  \
                  SERVICE_ADVISOR_CACHE_DIR   Default model cache directory\n  \
                  RUST_LOG                    Overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # AWS services with at least 50% CPU\n  \
                  service-advisor --data services.csv --provider AWS --min-cpu 50\n\n  \
                  # Top 5 by QoS, clustered, plot written to disk\n  \
                  service-advisor --optimize --cluster --plot-out plot.json\n\n  \
                  # Machine-readable output\n  \
                  service-advisor --discriminant --json | jq '.page.rows'"
)]
struct Args {
    /// Path to the catalog CSV
    #[arg(
        short,
        long,
        env = "SERVICE_ADVISOR_DATA",
        default_value = "multi_cloud_service_composition.csv"
    )]
    data: PathBuf,

    /// Keep only this cloud provider
    #[arg(short, long)]
    provider: Option<String>,

    /// Keep only this service type
    #[arg(short = 't', long)]
    service_type: Option<String>,

    /// Minimum CPU utilization (%)
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    min_cpu: f64,

    /// Minimum memory usage (MB)
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    min_memory: f64,

    /// Minimum network bandwidth (Mbps)
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    min_bandwidth: f64,

    /// Attach DBSCAN cluster labels
    #[arg(long)]
    cluster: bool,

    /// Attach the LDA placement projection
    #[arg(long)]
    discriminant: bool,

    /// Rank by QoS score and keep the top 5
    #[arg(long)]
    optimize: bool,

    /// DBSCAN neighborhood radius
    #[arg(long, default_value = "0.5")]
    eps: f64,

    /// DBSCAN minimum neighborhood size, the point itself included (at least 2)
    #[arg(long, default_value = "3")]
    min_samples: usize,

    /// Number of result rows to display
    #[arg(long, default_value = "10")]
    show_count: usize,

    /// Write the cluster plot dataset as JSON (requires --cluster)
    #[arg(long)]
    plot_out: Option<PathBuf>,

    /// Directory holding cached model artifacts
    #[arg(long, env = "SERVICE_ADVISOR_CACHE_DIR", default_value = ".")]
    cache_dir: PathBuf,

    /// How cached model artifacts are keyed
    #[arg(long, value_enum, default_value = "existence")]
    cache_key: CliCacheKey,

    /// Print the provider and service-type vocabularies and exit
    #[arg(long)]
    list_vocabulary: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Output JSON to stdout instead of a table
    ///
    /// Disables all logs; only the final JSON document is written.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct Vocabulary<'a> {
    providers: &'a [String],
    service_types: &'a [String],
}

#[derive(Serialize)]
struct Report<'a> {
    request: &'a FilterRequest,
    page: Page,
    #[serde(skip_serializing_if = "Option::is_none")]
    plot: Option<Vec<PlotPoint>>,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled to ensure
/// only JSON is written to stdout.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Load .env before parsing so env-backed defaults see it
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level, args.quiet, args.json);

    let catalog = Arc::new(
        load_catalog(&args.data)
            .with_context(|| format!("Cannot start without a catalog ({})", args.data.display()))?,
    );

    if args.list_vocabulary {
        return print_vocabulary(&catalog, args.json);
    }

    let mut builder = FilterRequest::builder()
        .min_cpu(args.min_cpu)
        .min_memory(args.min_memory)
        .min_bandwidth(args.min_bandwidth)
        .use_cluster(args.cluster)
        .use_discriminant(args.discriminant)
        .optimize(args.optimize)
        .eps(args.eps)
        .min_samples(args.min_samples)
        .show_count(args.show_count);
    if let Some(ref provider) = args.provider {
        builder = builder.provider(provider);
    }
    if let Some(ref service_type) = args.service_type {
        builder = builder.service_type(service_type);
    }
    let request = builder.build()?;

    let cache_config = CacheConfig::builder()
        .dir(&args.cache_dir)
        .key_policy(args.cache_key.into())
        .build()?;
    debug!("Cache config: {:?}", cache_config);

    let advisor = Advisor::new(catalog, &cache_config)?;
    let results = advisor.filter(&request)?;
    let page = Page::new(&results, request.show_count);

    let plot = if request.use_cluster {
        let points = advisor.build_plot(request.eps, request.min_samples);
        if let Some(ref path) = args.plot_out {
            write_plot(path, &points)?;
        }
        Some(points)
    } else {
        if args.plot_out.is_some() {
            info!("--plot-out ignored without --cluster");
        }
        None
    };

    if args.json {
        let report = Report {
            request: &request,
            page,
            plot,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_page(&page, &request);
    }

    Ok(())
}

fn print_vocabulary(catalog: &Catalog, json: bool) -> Result<()> {
    if json {
        let vocabulary = Vocabulary {
            providers: catalog.providers(),
            service_types: catalog.service_types(),
        };
        println!("{}", serde_json::to_string_pretty(&vocabulary)?);
        return Ok(());
    }

    println!("Providers:     {}", catalog.providers().join(", "));
    println!("Service types: {}", catalog.service_types().join(", "));
    Ok(())
}

fn write_plot(path: &Path, points: &[PlotPoint]) -> Result<()> {
    let json = serde_json::to_string_pretty(points)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write plot data to {}", path.display()))?;
    info!("Plot data written: {} ({} points)", path.display(), points.len());
    Ok(())
}

/// Print the visible rows as a table.
///
/// Uses `println!` on purpose: this is the command's output, not a log.
fn print_page(page: &Page, request: &FilterRequest) {
    if page.rows.is_empty() {
        println!("No services match the given criteria.");
        return;
    }

    let mut header = format!(
        "{:<14} {:<10} {:<12} {:>8} {:>10} {:>10} {:>9} {:>6}",
        "Service_ID", "Provider", "Type", "CPU %", "Mem MB", "BW Mbps", "Lat ms", "QoS"
    );
    if request.use_cluster {
        header.push_str(&format!(" {:>8}", "Cluster"));
    }
    if request.use_discriminant {
        header.push_str(&format!(" {:>9}", "LDA_1D"));
    }
    println!("{}", header);
    println!("{}", "-".repeat(header.len()));

    for row in &page.rows {
        let r = &row.record;
        let mut line = format!(
            "{:<14} {:<10} {:<12} {:>8.2} {:>10.1} {:>10.1} {:>9.2} {:>6.3}",
            truncate_str(&r.service_id, 14),
            truncate_str(r.cloud_provider.as_deref().unwrap_or("-"), 10),
            truncate_str(r.service_type.as_deref().unwrap_or("-"), 12),
            r.cpu_utilization,
            r.memory_usage,
            r.network_bandwidth,
            r.service_latency,
            r.qos_score
        );
        if request.use_cluster {
            match row.cluster {
                Some(label) => line.push_str(&format!(" {:>8}", label)),
                None => line.push_str(&format!(" {:>8}", "-")),
            }
        }
        if request.use_discriminant {
            match row.discriminant {
                Some(value) => line.push_str(&format!(" {:>9.4}", value)),
                None => line.push_str(&format!(" {:>9}", "-")),
            }
        }
        println!("{}", line);
    }

    println!();
    println!(
        "Showing {} of {} result(s){}",
        page.rows.len(),
        page.total,
        if page.has_more { " (more available)" } else { "" }
    );
}

/// Truncate a string to max length with ellipsis
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
