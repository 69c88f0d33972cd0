use anyhow::Context;
use clap::{Parser, Subcommand};
use pio_core::{resolve_schema_dir, CoreConfig, PioDocument, SchemaTable};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pio")]
#[command(about = "PIO discharge letter import/export CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a PIO bundle and report recorded errors and exclusions
    Import {
        /// Path to the XML bundle
        file: PathBuf,
        /// Print errors and exclusions as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a PIO bundle and export it again
    Export {
        /// Path to the XML bundle to read
        input: PathBuf,
        /// Path the exported bundle is written to
        output: PathBuf,
    },
    /// Validate addressable paths against the schema tables
    Validate {
        /// Paths of the form <uuid>.<ResourceType>.<field>...
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

/// Loads the schema tables once, honouring `PIO_SCHEMA_DIR`.
fn load_schema() -> anyhow::Result<(CoreConfig, Arc<SchemaTable>)> {
    let override_dir = std::env::var_os("PIO_SCHEMA_DIR").map(PathBuf::from);
    let config = CoreConfig::new(resolve_schema_dir(override_dir)?)?;
    let schema = SchemaTable::load(&config)?;
    Ok((config, Arc::new(schema)))
}

fn open(config: &CoreConfig, schema: Arc<SchemaTable>, file: &Path) -> anyhow::Result<PioDocument> {
    let xml = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let document = PioDocument::open(config, schema, &xml)?;
    Ok(document)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("pio=info".parse()?))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Import { file, json }) => {
            let (config, schema) = load_schema()?;
            let document = open(&config, schema, &file)?;
            if json {
                let report = serde_json::json!({
                    "errors": document.import_errors(),
                    "exclusions": document.exclusions(),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Imported {} resources: {} errors, {} exclusions",
                    document.all_uuids().len(),
                    document.import_errors().len(),
                    document.exclusion_count()
                );
                for issue in document.import_errors() {
                    println!("  {}: {} ({})", issue.path, issue.message, issue.data);
                }
            }
        }
        Some(Commands::Export { input, output }) => {
            let (config, schema) = load_schema()?;
            let mut document = open(&config, schema, &input)?;
            let xml = document.export_xml()?;
            std::fs::write(&output, xml)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(output = %output.display(), "export written");
        }
        Some(Commands::Validate { paths }) => {
            let (_, schema) = load_schema()?;
            let mut document = PioDocument::new(schema)?;
            let invalid = document.validate_paths(&paths);
            for path in &paths {
                let verdict = if invalid.contains(path) { "invalid" } else { "valid" };
                println!("{verdict}\t{path}");
            }
            if !invalid.is_empty() {
                anyhow::bail!("{} of {} paths are invalid", invalid.len(), paths.len());
            }
        }
        None => {
            println!("Use 'pio --help' for commands");
        }
    }

    Ok(())
}
