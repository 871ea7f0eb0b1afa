use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hemogram_core::{analyze, MonitorConfig};
use hemogram_fhir::HemogramNormalizer;
use hemogram_surveillance::{InMemoryRecordStore, OutbreakScanner};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "hemogram-cli",
    about = "Normalize FHIR hemogram documents and scan regions for dengue outbreak signals."
)]
struct Args {
    /// JSON file with MonitorConfig overrides.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize one document and print the record with its deviation analysis.
    Normalize {
        /// Path to an Observation or Bundle JSON file.
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Load every JSON document in a directory and report regions at risk.
    Scan {
        /// Directory of Observation or Bundle JSON files.
        #[arg(short, long)]
        input_dir: PathBuf,
        /// Window length; defaults to the configured value.
        #[arg(short, long)]
        window_hours: Option<u32>,
        /// Reference time (RFC 3339); defaults to now.
        #[arg(long)]
        now: Option<DateTime<Utc>>,
        /// Print the full report for this region instead of scanning all.
        #[arg(short, long)]
        region: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Normalize { input } => normalize(&input, &config),
        Command::Scan {
            input_dir,
            window_hours,
            now,
            region,
        } => {
            let window_hours = window_hours.unwrap_or(config.default_window_hours);
            let now = now.unwrap_or_else(Utc::now);
            scan(&input_dir, config, window_hours, now, region).await
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MonitorConfig> {
    let config = match path {
        Some(path) => {
            let data = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read config file {path:?}"))?;
            serde_json::from_str(&data).with_context(|| format!("invalid config file {path:?}"))?
        }
        None => MonitorConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn normalize(input: &Path, config: &MonitorConfig) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(input)
        .with_context(|| format!("cannot read file {input:?}"))?;

    let normalizer = HemogramNormalizer::new(config);
    let record = normalizer
        .normalize_str(&data)
        .with_context(|| format!("cannot normalize {input:?}"))?;
    let analysis = analyze(&record, normalizer.catalog());

    let output = serde_json::json!({ "record": record, "analysis": analysis });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn scan(
    input_dir: &Path,
    config: MonitorConfig,
    window_hours: u32,
    now: DateTime<Utc>,
    region: Option<String>,
) -> anyhow::Result<()> {
    let documents = read_documents(input_dir)?;
    let normalizer = HemogramNormalizer::new(&config);
    let store = InMemoryRecordStore::new();

    let mut rejected = 0usize;
    for result in normalizer.normalize_batch(&documents) {
        match result {
            Ok(record) => store.append(record)?,
            Err(_) => rejected += 1,
        }
    }
    let loaded = store.len()?;
    tracing::info!(
        loaded,
        rejected,
        dir = %input_dir.display(),
        "records loaded"
    );

    let scanner = OutbreakScanner::new(Arc::new(store), config)?;
    let output = match region {
        Some(region) => {
            serde_json::to_value(scanner.assess_region_at(&region, window_hours, now).await)?
        }
        None => serde_json::to_value(scanner.scan_known_regions_at(window_hours, now).await)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_documents(dir: &Path) -> anyhow::Result<Vec<serde_json::Value>> {
    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("cannot list directory {dir:?}"))?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|path| path.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let data = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read file {path:?}"))?;
        match serde_json::from_str(&data) {
            Ok(document) => documents.push(document),
            Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping invalid JSON"),
        }
    }
    Ok(documents)
}
