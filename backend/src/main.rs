//! CoVE CLI - convert, validate and explore OCDS / 360Giving data
//!
//! # Main Commands
//!
//! ```bash
//! cove upload grants.xlsx              # Store an upload, print its id
//! cove explore <id>                    # Full pipeline, prints the result as JSON
//! ```
//!
//! # Single Steps
//!
//! ```bash
//! cove detect upload.bin               # json, csv or xlsx
//! cove validate data.json --schema-url https://…/release-package-schema.json
//! cove unflatten grants.csv -o out/    # Spreadsheet to JSON
//! cove flatten data.json -o out/       # JSON to spreadsheet
//! cove aggregate data.json --shape grants
//! ```
//!
//! The namespace comes from `--namespace` or `COVE_NAMESPACE`; a `.env` file
//! is read if present. Log verbosity follows `RUST_LOG` (default `cove=info`).

use clap::{Parser, Subcommand};
use cove::{
    aggregate, convert_json_to_tabular, convert_tabular_to_json, detect_file_type, get_schema_validation_errors,
    ConversionContext, CoveConfig, ErrorResponse, Explorer, HttpSchemaSource, LocalStorage, Namespace,
    RuleSet, SchemaSource, Shape, SheetFlattener, UploadedArtifact,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cove")]
#[command(about = "Convert, validate and explore OCDS and 360Giving data", long_about = None)]
struct Cli {
    /// Namespace preset: cove-ocds, cove-360 or default
    #[arg(short, long, global = true)]
    namespace: Option<Namespace>,

    /// JSON file overriding preset settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a file as a new upload and print its id
    Upload {
        /// File to store
        file: PathBuf,
    },

    /// Explore a stored upload and print the result as JSON
    Explore {
        /// Upload id
        id: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the detected file type
    Detect {
        /// File to inspect
        file: PathBuf,
    },

    /// Validate a JSON document against a schema
    Validate {
        /// JSON document
        input: PathBuf,

        /// Schema URL (default: the namespace's package schema)
        #[arg(short, long)]
        schema_url: Option<String>,
    },

    /// Convert a CSV or XLSX file to JSON
    Unflatten {
        /// Spreadsheet to convert
        input: PathBuf,

        /// Directory for the output (default: current directory)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Convert a JSON document to CSV
    Flatten {
        /// JSON document to convert
        input: PathBuf,

        /// Directory for the output (default: current directory)
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Print summary statistics for a JSON document
    Aggregate {
        /// JSON document
        input: PathBuf,

        /// releases, records or grants
        #[arg(short, long)]
        shape: Shape,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cove=info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match CoveConfig::load(cli.namespace, cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    info!(namespace = %config.namespace, "configuration loaded");

    let result = match cli.command {
        Commands::Upload { file } => cmd_upload(&config, &file),
        Commands::Explore { id, output } => cmd_explore(config, &id, output.as_deref()).await,
        Commands::Detect { file } => cmd_detect(&file),
        Commands::Validate { input, schema_url } => cmd_validate(&config, &input, schema_url).await,
        Commands::Unflatten { input, output } => cmd_unflatten(&config, &input, &output).await,
        Commands::Flatten { input, output } => cmd_flatten(&config, &input, &output).await,
        Commands::Aggregate { input, shape } => cmd_aggregate(&input, shape),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn storage(config: &CoveConfig) -> LocalStorage {
    LocalStorage::new(&config.media_root, config.media_url.clone()).with_retention_days(config.retention_days)
}

fn cmd_upload(config: &CoveConfig, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let upload = storage(config).save_file(file)?;
    println!("{}", upload.id);
    Ok(())
}

async fn cmd_explore(config: CoveConfig, id: &str, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let schemas = HttpSchemaSource::new(config.schema_timeout())?;
    let storage = storage(&config);
    let explorer = Explorer::new(config, Box::new(storage), schemas, RuleSet::cove());

    match explorer.explore(id).await {
        Ok(response) => write_output(&serde_json::to_string_pretty(&response)?, output),
        Err(err) => {
            let page = ErrorResponse::from(&err);
            write_output(&serde_json::to_string_pretty(&page)?, output)?;
            Err(err.into())
        }
    }
}

fn cmd_detect(file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let file_type = detect_file_type(name, fs::File::open(file)?)?;
    println!("{}", file_type);
    Ok(())
}

async fn cmd_validate(
    config: &CoveConfig,
    input: &Path,
    schema_url: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let document = read_json(input)?;
    let schema_url = match schema_url.or_else(|| config.schema_url_for(&document).map(str::to_string)) {
        Some(url) => url,
        None => return Err("no schema URL given and none configured for this namespace".into()),
    };

    let schemas = HttpSchemaSource::new(config.schema_timeout())?;
    let (_, errors) = get_schema_validation_errors(document, &schema_url, &schemas, RuleSet::cove()).await?;

    println!("{}", serde_json::to_string_pretty(&errors)?);
    if !errors.is_empty() {
        eprintln!("{} messages, {} occurrences", errors.len(), errors.occurrences());
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_unflatten(config: &CoveConfig, input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = local_artifact(input)?;
    let file_type = detect_file_type(&artifact.name, artifact.open()?)?;
    if !file_type.is_tabular() {
        return Err(format!("{} is not a spreadsheet", input.display()).into());
    }

    let schema = item_schema(config).await?;
    fs::create_dir_all(output)?;
    let upload_url = output.display().to_string();
    let ctx = ConversionContext {
        config,
        upload_dir: output,
        upload_url: &upload_url,
        schema: schema.as_ref(),
    };

    let converted = convert_tabular_to_json(&artifact, file_type, &ctx, &SheetFlattener)?;
    eprintln!("Wrote {} ({} bytes)", converted.path.display(), converted.size_bytes);
    Ok(())
}

async fn cmd_flatten(config: &CoveConfig, input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let artifact = local_artifact(input)?;
    let schema = item_schema(config).await?;
    fs::create_dir_all(output)?;
    let upload_url = output.display().to_string();
    let ctx = ConversionContext {
        config,
        upload_dir: output,
        upload_url: &upload_url,
        schema: schema.as_ref(),
    };

    let converted = convert_json_to_tabular(&artifact, &ctx, &SheetFlattener)?;
    eprintln!("Wrote {} ({} bytes)", converted.path.display(), converted.size_bytes);
    if let Some(size) = converted.titled_size_bytes {
        eprintln!("Wrote title version ({} bytes)", size);
    }
    Ok(())
}

fn cmd_aggregate(input: &Path, shape: Shape) -> Result<(), Box<dyn std::error::Error>> {
    let document = read_json(input)?;
    println!("{}", serde_json::to_string_pretty(&aggregate(&document, shape))?);
    Ok(())
}

/// Fetch the namespace's item schema, if it has one.
async fn item_schema(config: &CoveConfig) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    match &config.item_schema_url {
        Some(url) => {
            let schemas = HttpSchemaSource::new(config.schema_timeout())?;
            Ok(Some(schemas.fetch(url).await?))
        }
        None => Ok(None),
    }
}

fn local_artifact(path: &Path) -> Result<UploadedArtifact, Box<dyn std::error::Error>> {
    let size = fs::metadata(path)?.len();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(UploadedArtifact {
        id: name.clone(),
        name,
        path: path.to_path_buf(),
        size,
    })
}

fn read_json(path: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
