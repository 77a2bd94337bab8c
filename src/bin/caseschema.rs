//! caseschema CLI - validate schema documents and convert entity data
//!
//! Loads schemas from a directory of YAML/JSON documents and converts generic
//! JSON input into entities of one of them.

use caseschema::{
    Entity, EntityMapper, JsonArrayWriter, ModelConfig, NdjsonWriter, SchemaRegistry,
};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "caseschema")]
#[command(version, about = "Dynamic schemas and entities", long_about = None)]
struct Cli {
    /// Path to caseschema.yaml (defaults and environment are used without it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load all schemas and check that nested references resolve
    Validate {
        /// Directory containing schema documents
        #[arg(short, long)]
        schemas: Option<PathBuf>,
    },

    /// Convert JSON input into entities and write their persisted form
    Convert {
        /// Directory containing schema documents
        #[arg(short, long)]
        schemas: Option<PathBuf>,

        /// Key of the schema the input conforms to
        #[arg(short = 'k', long = "schema")]
        schema: String,

        /// JSON file holding an object or an array of objects
        #[arg(short, long)]
        input: PathBuf,

        /// Write a pretty-printed JSON array instead of NDJSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Print the computed attributes of an entity
    Eval {
        /// Directory containing schema documents
        #[arg(short, long)]
        schemas: Option<PathBuf>,

        /// Key of the schema the input conforms to
        #[arg(short = 'k', long = "schema")]
        schema: String,

        /// JSON file holding one object
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate { schemas } => {
            validate(schemas.unwrap_or(config.schemas.directory))
        }
        Commands::Convert { schemas, schema, input, pretty } => {
            convert(
                schemas.unwrap_or(config.schemas.directory),
                &schema,
                &input,
                pretty || config.output.pretty,
            )
        }
        Commands::Eval { schemas, schema, input } => {
            eval(schemas.unwrap_or(config.schemas.directory), &schema, &input)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<ModelConfig, Box<dyn Error>> {
    match path {
        Some(path) => Ok(ModelConfig::from_file(path)?.apply_env()),
        None => Ok(ModelConfig::default()),
    }
}

fn load_registry(dir: &Path) -> Result<SchemaRegistry, Box<dyn Error>> {
    let mut registry = SchemaRegistry::new();
    registry.load_dir(dir)?;
    Ok(registry)
}

fn read_json(path: &Path) -> Result<JsonValue, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let value = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
    Ok(value)
}

/// Load every schema and report nested references that do not resolve
fn validate(dir: PathBuf) -> Result<(), Box<dyn Error>> {
    println!("🔍 Validating schemas in {}...", dir.display());

    let registry = load_registry(&dir)?;
    for key in registry.keys() {
        println!("  ✓ {}", key);
    }

    let unresolved = registry.unresolved_references();
    if !unresolved.is_empty() {
        for reference in &unresolved {
            eprintln!(
                "  ✗ {}.{} references unknown schema '{}'",
                reference.schema, reference.attribute, reference.missing
            );
        }
        return Err(format!("{} unresolved schema references", unresolved.len()).into());
    }

    println!("✅ {} schemas are valid", registry.len());
    Ok(())
}

fn read_entities(
    registry: &SchemaRegistry,
    schema_key: &str,
    input: &Path,
) -> Result<Vec<Entity>, Box<dyn Error>> {
    let schema = registry
        .get(schema_key)
        .ok_or_else(|| format!("Schema '{}' not found", schema_key))?;
    let mapper = EntityMapper::default();

    let entities = match read_json(input)? {
        JsonValue::Array(items) => items
            .iter()
            .map(|item| mapper.from_json_value(schema.clone(), item, registry))
            .collect::<Result<Vec<_>, _>>()?,
        value => vec![mapper.from_json_value(schema, &value, registry)?],
    };
    tracing::info!("Read {} '{}' entities from {}", entities.len(), schema_key, input.display());
    Ok(entities)
}

/// Convert input records and write their persisted form to stdout
fn convert(dir: PathBuf, schema_key: &str, input: &Path, pretty: bool) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(&dir)?;
    let entities = read_entities(&registry, schema_key, input)?;

    let stdout = std::io::stdout().lock();
    if pretty {
        let mut writer = JsonArrayWriter::new_pretty(stdout)?;
        for entity in &entities {
            writer.write(entity)?;
        }
        writer.finish()?;
    } else {
        let mut writer = NdjsonWriter::new(stdout);
        writer.write_all(&entities)?;
        writer.flush()?;
    }
    Ok(())
}

/// Print every computed attribute of the input entity
fn eval(dir: PathBuf, schema_key: &str, input: &Path) -> Result<(), Box<dyn Error>> {
    let registry = load_registry(&dir)?;
    let entities = read_entities(&registry, schema_key, input)?;

    for entity in &entities {
        for (name, value) in entity.computed_values()? {
            println!("{} = {}", name, value);
        }
    }
    Ok(())
}
