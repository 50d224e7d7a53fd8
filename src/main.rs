mod expand;
mod index;
mod indexer;
mod logging;

#[cfg(test)]
mod test_utils;

use clap::{Parser, Subcommand};
use logging::{LogConfig, init_logging};

use std::path::PathBuf;
use tracing::info;

use crate::index::manager::{EnsureOptions, IndexManager};
use crate::indexer::config::{ENDPOINT_ENV, IndexerConfig, TOKEN_ENV, resolve_indexer_path};

/// CLI arguments for the keyword index manager
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory under which all indexes are stored
    #[arg(long, value_name = "DIR")]
    index_root: PathBuf,

    /// Path to the indexer executable (overrides KWINDEX_INDEXER_PATH env var)
    #[arg(long, value_name = "PATH")]
    indexer_path: Option<String>,

    /// Log level (overrides RUST_LOG env var)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Log file path (overrides KWINDEX_LOG_FILE env var)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the index for a scope directory if needed
    Ensure {
        /// Directory whose contents should be indexed
        scope_dir: PathBuf,

        /// Rebuild even if a valid index already exists
        #[arg(long)]
        force: bool,

        /// Build even if the last attempt failed
        #[arg(long)]
        retry_failed: bool,
    },

    /// Query one or more scope directories, building missing indexes first
    Query {
        /// Raw keyword query
        query: String,

        /// Scope directories to search
        #[arg(required = true)]
        scope_dirs: Vec<PathBuf>,
    },

    /// Report the index state for a scope directory
    Status { scope_dir: PathBuf },

    /// Delete the index for a scope directory
    Delete { scope_dir: PathBuf },

    /// Rebuild the index if the corpus has drifted since the last build
    Reindex { scope_dir: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let log_config = LogConfig::from_env().with_overrides(args.log_level.clone(), args.log_file.clone());
    if let Err(e) = init_logging(log_config) {
        eprintln!("Failed to initialize logging: {e}");
        std::process::exit(1);
    }

    let mut builder = IndexerConfig::builder()
        .indexer_path(resolve_indexer_path(args.indexer_path.clone()))
        .index_root(args.index_root.clone());
    if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
        builder = builder.endpoint(endpoint);
    }
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        builder = builder.auth_token(token);
    }
    let config = builder.build()?;

    info!(
        "Using indexer {} with index root {}",
        config.indexer_path,
        config.index_root.display()
    );

    let manager = IndexManager::new(config);

    // Kill any in-flight indexer subprocess on Ctrl-C
    {
        let manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown();
            }
        });
    }

    match args.command {
        Command::Ensure {
            scope_dir,
            force,
            retry_failed,
        } => {
            manager
                .ensure_index(
                    &scope_dir,
                    EnsureOptions {
                        ignore_existing: force,
                        retry_if_last_attempt_failed: retry_failed,
                    },
                )
                .await?;
            println!("{}", manager.index_status(&scope_dir).await);
        }
        Command::Query { query, scope_dirs } => {
            let searches = manager.get_results(&query, &scope_dirs).await?;
            for search in searches {
                let scope_dir = search.scope_dir.clone();
                match search.hits().await {
                    Ok(hits) => println!("{}", serde_json::to_string(&hits)?),
                    Err(e) => eprintln!("{}: {}", scope_dir.display(), e),
                }
            }
        }
        Command::Status { scope_dir } => {
            println!("{}", manager.index_status(&scope_dir).await);
        }
        Command::Delete { scope_dir } => {
            manager.delete_index(&scope_dir).await?;
        }
        Command::Reindex { scope_dir } => {
            manager.reindex_if_stale(&scope_dir).await?;
            println!("{}", manager.index_status(&scope_dir).await);
        }
    }

    Ok(())
}
