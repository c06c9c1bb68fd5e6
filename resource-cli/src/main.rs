/*!
Resource CLI - Command-line interface for resource files.

Lists, inspects and verifies the resource files in a storage directory, and
writes JSON values to new resource files.
*/

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use resource_core::{
    CompressionKind, Entity, ResourceError, ResourceFile, StorageConfig, StorageContext,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "resource")]
#[command(about = "CLI for persisted resource files")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Storage directory (defaults to RESOURCE_STORAGE_DIR or <tmp>/resources)
    #[arg(short, long, global = true, env = "RESOURCE_STORAGE_DIR")]
    dir: Option<PathBuf>,

    /// Compression of resource files (defaults to RESOURCE_COMPRESSION or none)
    #[arg(short, long, global = true, value_enum)]
    compression: Option<CompressionType>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CompressionType {
    None,
    Gzip,
}

impl From<CompressionType> for CompressionKind {
    fn from(compression: CompressionType) -> Self {
        match compression {
            CompressionType::None => CompressionKind::None,
            CompressionType::Gzip => CompressionKind::Gzip,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List all resource files in the storage directory
    List,
    /// Show the provenance and record of a resource
    Show {
        /// Resource file path or resource name
        target: String,
        /// Print the stored payload
        #[arg(long)]
        data: bool,
    },
    /// Verify that a resource payload still matches its hash
    Verify {
        /// Resource file path or resource name
        target: String,
    },
    /// Print the file path a resource name resolves to
    Path {
        /// Resource name
        name: String,
    },
    /// Store a JSON value under a resource name
    Put {
        /// Resource name
        name: String,
        /// JSON value to store
        json: String,
    },
}

#[derive(Tabled)]
struct ResourceInfo {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    type_label: String,
    #[tabled(rename = "Generated")]
    generated: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Size")]
    size: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let context = create_context(&cli)?;

    match &cli.command {
        Commands::List => list_resources(&context)?,
        Commands::Show { target, data } => show_resource(&context, target, *data)?,
        Commands::Verify { target } => verify_resource(&context, target)?,
        Commands::Path { name } => print_path(&context, name)?,
        Commands::Put { name, json } => put_resource(&context, name, json)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn create_context(cli: &Cli) -> Result<StorageContext, anyhow::Error> {
    let config = StorageConfig::from_env().context("Invalid resource environment")?;
    Ok(StorageContext::from_config(apply_overrides(cli, config))?)
}

/// Command-line options take precedence over the environment
fn apply_overrides(cli: &Cli, mut config: StorageConfig) -> StorageConfig {
    if let Some(dir) = &cli.dir {
        config.base_directory = Some(dir.clone());
    }
    if let Some(compression) = cli.compression {
        config = config.with_compression(compression.into());
    }
    config
}

/// A target naming an existing file is used as-is, anything else is a resource name
fn resolve_target(context: &StorageContext, target: &str) -> Result<PathBuf, anyhow::Error> {
    let candidate = Path::new(target);
    if candidate.is_file() {
        Ok(candidate.to_path_buf())
    } else {
        Ok(context.resolve_path(target, &context.storage_directory())?)
    }
}

fn read_resource(
    context: &StorageContext,
    target: &str,
) -> Result<(PathBuf, ResourceFile), anyhow::Error> {
    let path = resolve_target(context, target)?;
    let file = context
        .read_file(&path)
        .with_context(|| format!("Failed to read resource file {}", path.display()))?;
    Ok((path, file))
}

fn list_resources(context: &StorageContext) -> Result<(), anyhow::Error> {
    let directory = context.storage_directory();
    info!("Listing resources in {}", directory.display());

    if !directory.is_dir() {
        println!("No resource directory found at: {}", directory.display());
        return Ok(());
    }

    let mut resources = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
        let file_path = entry?.path();
        let is_resource = file_path.is_file()
            && file_path
                .file_name()
                .map(|name| name.to_string_lossy().ends_with(context.file_extension()))
                .unwrap_or(false);
        if !is_resource {
            continue;
        }

        match context.read_file(&file_path) {
            Ok(file) => {
                let size = match std::fs::metadata(&file_path) {
                    Ok(meta) => format_size(meta.len()),
                    Err(_) => "Unknown".to_string(),
                };

                resources.push(ResourceInfo {
                    name: file.record.name,
                    type_label: file.record.type_label,
                    generated: format_timestamp(file.record.timestamp),
                    hash: short_hash(&file.record.hash),
                    size,
                });
            }
            Err(e) => {
                warn!("Failed to read resource file {}: {}", file_path.display(), e);
            }
        }
    }

    if resources.is_empty() {
        println!("No resources found");
    } else {
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        let table = Table::new(resources);
        println!("{table}");
    }

    Ok(())
}

fn show_resource(context: &StorageContext, target: &str, data: bool) -> Result<(), anyhow::Error> {
    info!("Showing resource: {}", target);

    let (path, file) = read_resource(context, target)?;
    let record = &file.record;

    println!("Resource Details:");
    println!("  Name: {}", record.name);
    println!("  Path: {}", path.display());
    println!("  Recorded Path: {}", record.path);
    println!("  Generator: {}", file.header.generator);
    println!("  Generated: {}", record.generated);
    println!("  Type: {}", record.type_label);
    println!("  Content Hash: {}", record.hash);

    if data {
        println!("{}", serde_json::to_string_pretty(&record.data)?);
    }

    Ok(())
}

fn verify_resource(context: &StorageContext, target: &str) -> Result<(), anyhow::Error> {
    info!("Verifying resource: {}", target);

    let (_, file) = read_resource(context, target)?;

    match file.record.verify_integrity(context.codec()) {
        Ok(()) => {
            println!("✓ Resource {} is valid and integrity check passed", file.record.name);
        }
        Err(ResourceError::IntegrityCheckFailed { expected, actual }) => {
            error!("✗ Integrity check failed:");
            error!("  Expected hash: {}", expected);
            error!("  Actual hash: {}", actual);
            return Err(anyhow::anyhow!("Integrity check failed"));
        }
        Err(e) => {
            error!("✗ Failed to verify resource: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

fn print_path(context: &StorageContext, name: &str) -> Result<(), anyhow::Error> {
    let entity = Entity::named(name)
        .context(context.clone())
        .build(Value::Null)?;
    println!("{}", entity.file_path().display());
    entity.close()?;
    Ok(())
}

fn put_resource(context: &StorageContext, name: &str, json: &str) -> Result<(), anyhow::Error> {
    let value: Value = serde_json::from_str(json).context("Value is not valid JSON")?;

    let mut entity = Entity::named(name)
        .context(context.clone())
        .generator::<Cli>()
        .build(value)?;
    entity.save()?;

    println!("✓ Stored {} at {}", entity.name(), entity.file_path().display());
    entity.close()?;
    Ok(())
}

fn short_hash(hash: &str) -> String {
    hash.chars().take(12).collect()
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(timestamp: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_opt(timestamp, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => timestamp.to_string(),
    }
}
