//! Lexicon Repository CLI
//!
//! Inspects schema sets, validates documents and drives an in-memory repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use lexicon_repo::{
    KeyGenerator, RecordRepository, RepoConfig, RepositoryOptions, SchemaRegistry, Validator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lexicon-repo")]
#[command(about = "Validate records against schemas and manage an in-memory repository")]
struct Cli {
    /// Directory of schema documents (defaults to the bundled set)
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    /// Config file
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List loaded schemas
    Schemas,

    /// Validate a JSON document against a schema
    Validate {
        /// Schema identifier
        schema: String,
        /// JSON file to validate
        file: PathBuf,
    },

    /// Generate record keys
    Keygen {
        /// How many keys
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Create records from JSON files and print the collection, newest first
    Ingest {
        /// Collection to write into
        collection: String,
        /// JSON files, one record each
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Maximum records to print
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = RepoConfig::load_from(cli.config.as_deref()).context("loading configuration")?;
    let schema_dir = cli.schemas.or_else(|| config.schemas.dir.clone());

    match cli.command {
        Commands::Keygen { count } => {
            let keys = KeyGenerator::new(config.repository.clock_id);
            for _ in 0..count {
                println!("{}", keys.next()?);
            }
            Ok(())
        }

        Commands::Schemas => {
            let registry = open_registry(schema_dir.as_deref())?;
            for id in registry.ids() {
                let doc = registry.resolve(id)?;
                println!("{:<10} {:<32} {}", doc.kind.as_str(), doc.id, doc.description);
            }
            Ok(())
        }

        Commands::Validate { schema, file } => {
            let registry = open_registry(schema_dir.as_deref())?;
            let value = read_json(&file)?;
            let validator = Validator::new(&registry)
                .with_unknown_fields(config.validation.unknown_fields);
            match validator.validate(&schema, &value) {
                Ok(()) => {
                    println!("✅ {} conforms to {}", file.display(), schema);
                    Ok(())
                }
                Err(err) => {
                    println!("❌ {} [{}] {}", file.display(), err.rule(), err);
                    std::process::exit(1);
                }
            }
        }

        Commands::Ingest { collection, files, limit } => {
            let registry = Arc::new(open_registry(schema_dir.as_deref())?);
            let repo = RecordRepository::new(registry, RepositoryOptions::from(&config));

            for file in &files {
                let value = read_json(file)?;
                match repo.create(&collection, value) {
                    Ok(record) => println!("✅ {} -> {} ({})", file.display(), record.uri, record.fingerprint),
                    Err(err) => println!("❌ {} {}", file.display(), err),
                }
            }

            println!();
            for record in repo.list(&collection, limit)? {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
            Ok(())
        }
    }
}

fn open_registry(dir: Option<&Path>) -> anyhow::Result<SchemaRegistry> {
    let registry = match dir {
        Some(dir) => SchemaRegistry::from_directory(dir)
            .with_context(|| format!("loading schemas from {}", dir.display()))?,
        None => SchemaRegistry::bundled().context("loading bundled schemas")?,
    };
    Ok(registry)
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
