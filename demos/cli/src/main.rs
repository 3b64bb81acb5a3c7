use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use clap::Parser;
use requisition_core::{Dashboard, InputMode, Resolution, ResolvedBundle, ViewerConfig};
use requisition_fhir::{build_dashboard, build_dashboard_str, recent_orders, HttpTransport, Resolver};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "requisition-cli",
    about = "Resolve a requisition locator against a FHIR server and print the dashboard."
)]
struct Args {
    /// URL, Type/id identifier, or scanned QR value.
    locator: Option<String>,

    /// Base URL of the FHIR server.
    #[arg(short, long, default_value_t = ViewerConfig::default().base_url)]
    base: String,

    /// direct_url, identifier or scanned.
    #[arg(short, long, default_value = "direct_url")]
    mode: InputMode,

    /// When the locator yields a version list, open this entry (0 = first listed).
    #[arg(long)]
    version_index: Option<usize>,

    /// Build the dashboard from a local bundle file instead of the server.
    #[arg(short, long, conflicts_with = "locator")]
    input: Option<PathBuf>,

    /// List recently updated orders instead of resolving a locator.
    #[arg(long, conflicts_with_all = ["locator", "input"])]
    worklist: bool,

    /// Observations shown before the "more" indicator.
    #[arg(long, default_value_t = ViewerConfig::default().observation_limit)]
    observation_limit: usize,

    /// Print the resolved bundle verbatim instead of the summary.
    #[arg(long)]
    raw: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ViewerConfig {
        base_url: args.base.trim().to_string(),
        observation_limit: args.observation_limit,
        ..ViewerConfig::default()
    };

    if args.worklist {
        return print_worklist(&config).await;
    }

    if let Some(path) = &args.input {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read file {path:?}"))?;
        if args.raw {
            println!("{data}");
            return Ok(());
        }
        let dashboard =
            build_dashboard_str(&data, &config.base_url, Local::now().date_naive(), &config)?;
        print_dashboard(&dashboard);
        return Ok(());
    }

    let Some(locator) = args.locator.as_deref() else {
        bail!("Provide a locator, --input or --worklist");
    };

    let resolver = Resolver::new(HttpTransport::default(), config.base_url.clone());
    let bundle = match resolver.resolve(locator, args.mode).await? {
        Resolution::Resolved(bundle) => bundle,
        Resolution::History(history) => {
            let entries = history.entries();
            let Some(index) = args.version_index else {
                println!("{} versions, pick one with --version-index:", entries.len());
                for (i, entry) in entries.iter().enumerate() {
                    println!(
                        "  [{i}] version {} updated {} ({})",
                        entry.version_id.as_deref().unwrap_or("?"),
                        entry.last_updated.as_deref().unwrap_or("?"),
                        entry.status.as_deref().unwrap_or("no status"),
                    );
                }
                return Ok(());
            };
            let entry = entries
                .get(index)
                .with_context(|| format!("No version at index {index} ({} listed)", entries.len()))?;
            info!(index, "opening history entry");
            resolver.resolve_history_entry(entry).await?
        }
    };

    if args.raw {
        println!("{}", serde_json::to_string_pretty(bundle.as_value())?);
        return Ok(());
    }

    print_dashboard(&dashboard_for(&bundle, &config));
    Ok(())
}

fn dashboard_for(bundle: &ResolvedBundle, config: &ViewerConfig) -> Dashboard {
    build_dashboard(bundle, &config.base_url, Local::now().date_naive(), config)
}

fn print_dashboard(dashboard: &Dashboard) {
    if let Some(patient) = &dashboard.patient {
        println!(
            "Patient: {} ({})",
            patient.display_name.as_deref().unwrap_or("unnamed"),
            patient
                .age
                .map(|age| format!("{age} years"))
                .unwrap_or_else(|| "age unknown".to_string())
        );
    } else {
        println!("Patient: none in bundle");
    }

    println!(
        "Outstanding orders: {} of {}",
        dashboard.outstanding_orders.len(),
        dashboard.total_orders
    );
    for order in &dashboard.outstanding_orders {
        println!(
            "  - {} [{}]",
            order.code.as_deref().unwrap_or("--"),
            order.status.as_deref().unwrap_or("--")
        );
    }
    println!("Reports: {}", dashboard.reports.len());
    println!("Imaging studies: {}", dashboard.imaging.len());
    println!(
        "Observations: {} shown, {} more",
        dashboard.observations.len(),
        dashboard.more_observations
    );
}

async fn print_worklist(config: &ViewerConfig) -> anyhow::Result<()> {
    let transport = HttpTransport::default();
    let rows = recent_orders(&transport, &config.base_url, Utc::now(), config)
        .await
        .context("Cannot load recent orders")?;

    if rows.is_empty() {
        println!(
            "No orders updated in the last {} hours",
            config.worklist_window_hours
        );
    }
    for row in rows {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            row.requisition.as_deref().or(row.id.as_deref()).unwrap_or("--"),
            row.subject_name.as_deref().unwrap_or("N/A"),
            row.code.as_deref().unwrap_or("--"),
            row.status.as_deref().unwrap_or("--"),
            row.locator.as_deref().unwrap_or("--"),
        );
    }
    Ok(())
}
