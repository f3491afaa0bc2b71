use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tempo_api::{Config, Database, Query, Write};
use tempo_core::Entity;

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "TempoDB CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new database
    Create {
        /// Database file path
        path: PathBuf,
    },
    /// Stage an entity and commit it in the next block
    Add {
        /// Database file path
        path: PathBuf,
        /// Entity key
        key: String,
        /// Payload text
        payload: String,
        /// MIME content type
        #[arg(short, long, default_value = "text/plain")]
        content_type: String,
        /// Owner address
        #[arg(short, long)]
        owner: String,
        /// Lifetime in blocks
        #[arg(short, long, default_value = "100")]
        expires_in: u64,
        /// String annotation as key=value (repeatable)
        #[arg(short = 's', long = "string")]
        string_annotations: Vec<String>,
        /// Numeric annotation as key=number (repeatable)
        #[arg(short = 'n', long = "number")]
        numeric_annotations: Vec<String>,
    },
    /// Get an entity by key
    Get {
        /// Database file path
        path: PathBuf,
        /// Entity key
        key: String,
    },
    /// Query entities by owner and annotations
    Query {
        /// Database file path
        path: PathBuf,
        /// Owner address filter
        #[arg(short, long)]
        owner: Option<String>,
        /// String annotation filter as key=value (repeatable)
        #[arg(short = 's', long = "string")]
        string_annotations: Vec<String>,
        /// Numeric annotation filter as key=expr, e.g. pri=5 or pri=">=5" (repeatable)
        #[arg(short = 'n', long = "number")]
        numeric_annotations: Vec<String>,
        /// Maximum number of results
        #[arg(short, long, default_value = "100")]
        limit: u64,
        /// Number of results to skip
        #[arg(long, default_value = "0")]
        offset: u64,
    },
    /// Count stored payload rows
    Count {
        /// Database file path
        path: PathBuf,
    },
    /// Look up a write receipt by id
    Receipt {
        /// Database file path
        path: PathBuf,
        /// Receipt id returned by add
        id: String,
    },
    /// Delete all stored data
    Clean {
        /// Database file path
        path: PathBuf,
    },
    /// Checkpoint and reclaim free pages
    Vacuum {
        /// Database file path
        path: PathBuf,
    },
    /// Run the block processor in the foreground
    Run {
        /// Database file path
        path: PathBuf,
        /// Block interval in milliseconds
        #[arg(short, long, default_value = "2000")]
        interval_ms: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Create { path } => {
            Database::open(&path).context("Failed to create database")?;
            println!("Database created: {}", path.display());
        }

        Commands::Add {
            path,
            key,
            payload,
            content_type,
            owner,
            expires_in,
            string_annotations,
            numeric_annotations,
        } => {
            let db = Database::open(&path).context("Failed to open database")?;

            let mut write = Write::new(key)
                .payload(payload.into_bytes())
                .content_type(content_type)
                .owner(owner)
                .expires_in(expires_in);
            for pair in &string_annotations {
                let (k, v) = split_pair(pair)?;
                write = write.string_annotation(k, v);
            }
            for pair in &numeric_annotations {
                let (k, v) = split_pair(pair)?;
                let value: f64 = v
                    .parse()
                    .with_context(|| format!("Invalid number in annotation '{pair}'"))?;
                write = write.numeric_annotation(k, value);
            }

            let id = db.write(write.build()).context("Failed to stage write")?;
            let block = db
                .commit_pending()
                .context("Failed to commit block")?
                .context("Nothing to commit")?;
            println!("Committed in block {block}, receipt id {id}");
        }

        Commands::Get { path, key } => {
            let db = Database::open(&path).context("Failed to open database")?;

            match db.get(&key).context("Failed to get entity")? {
                Some(entity) => {
                    println!("{}", serde_json::to_string_pretty(&entity_to_json(&entity))?);
                }
                None => {
                    println!("Entity not found");
                }
            }
        }

        Commands::Query {
            path,
            owner,
            string_annotations,
            numeric_annotations,
            limit,
            offset,
        } => {
            let db = Database::open(&path).context("Failed to open database")?;

            let mut query = Query::new().limit(limit).offset(offset);
            if let Some(owner) = owner {
                query = query.owner(owner);
            }
            for pair in &string_annotations {
                let (k, v) = split_pair(pair)?;
                query = query.string_eq(k, v);
            }
            for pair in &numeric_annotations {
                let (k, v) = split_pair(pair)?;
                query = match v.parse::<f64>() {
                    Ok(n) => query.number_eq(k, n),
                    Err(_) => query.number_expr(k, v),
                };
            }

            let entities = db.query(query).context("Failed to query entities")?;
            for entity in &entities {
                println!("{}", serde_json::to_string(&entity_to_json(entity))?);
            }
            println!("{} entities", entities.len());
        }

        Commands::Count { path } => {
            let db = Database::open(&path).context("Failed to open database")?;
            println!("{}", db.count().context("Failed to count entities")?);
        }

        Commands::Receipt { path, id } => {
            let db = Database::open(&path).context("Failed to open database")?;

            match db.receipt(&id).context("Failed to look up receipt")? {
                Some(receipt) => {
                    println!(
                        "{} -> {} (block {})",
                        receipt.id, receipt.entity_key, receipt.created_at_block
                    );
                }
                None => {
                    println!("Receipt not found");
                }
            }
        }

        Commands::Clean { path } => {
            let db = Database::open(&path).context("Failed to open database")?;
            db.clean().context("Failed to clean database")?;
            println!("Database cleaned");
        }

        Commands::Vacuum { path } => {
            let db = Database::open(&path).context("Failed to open database")?;
            db.vacuum().context("Failed to vacuum database")?;
            println!("Database vacuumed");
        }

        Commands::Run { path, interval_ms } => {
            let config =
                Config::default().with_block_interval(Duration::from_millis(interval_ms));
            let db = Database::open_with_config(&path, config)
                .context("Failed to open database")?;
            db.start_processor().context("Failed to start processor")?;
            println!(
                "Block processor running on {} (current block {}), Ctrl-C to stop",
                path.display(),
                db.current_block().context("Failed to read block counter")?
            );

            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }
    }

    Ok(())
}

/// Split a `key=value` argument at the first `=`.
fn split_pair(pair: &str) -> Result<(&str, &str)> {
    match pair.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k, v)),
        _ => bail!("Expected key=value, got '{pair}'"),
    }
}

fn entity_to_json(entity: &Entity) -> serde_json::Value {
    serde_json::json!({
        "key": entity.key,
        "payload_base64": base64::engine::general_purpose::STANDARD.encode(&entity.payload),
        "content_type": entity.content_type,
        "owner_address": entity.owner_address,
        "string_annotations": entity.string_annotations,
        "numeric_annotations": entity.numeric_annotations,
        "expires_at": entity.expires_at,
        "created_at_block": entity.created_at_block,
    })
}
