mod cli;
mod config;
mod coordination;
mod db;
mod dream;
mod embedding;
mod error;
mod graph;
mod memory;
mod scoring;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "reverie", version, about = "Self-organizing memory MCP server for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio transport, single session)
    Serve,
    /// Start the shared MCP server (streamable HTTP, multi-session)
    ServeHttp,
    /// Ensure a current-version shared server is running and print its endpoint
    Connect,
    /// Run the consolidation worker (normally spawned detached by the `dream` tool)
    Dream {
        /// Skip the deduplication phase
        #[arg(long)]
        no_dedup: bool,
        /// Skip the orphan-rescue phase
        #[arg(long)]
        no_rescue: bool,
        /// Skip the pattern-mining phase
        #[arg(long)]
        no_mining: bool,
        /// Restrict pattern mining to one tag
        #[arg(long)]
        tag: Option<String>,
        /// Run even if the shared server appears to be up
        #[arg(long)]
        force: bool,
    },
    /// Print store statistics
    Stats,
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.reverie/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = config::ReverieConfig::load()?;

    // Initialize tracing with the configured log level.
    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve_stdio(config).await?;
        }
        Command::ServeHttp => {
            server::serve_http(config).await?;
        }
        Command::Connect => {
            let status = tokio::task::spawn_blocking(move || {
                coordination::server_guard::ensure_shared_server(&config)
            })
            .await??;
            tracing::info!(?status, "shared server ready");
            // The endpoint goes to stdout for MCP client configuration
            let config = config::ReverieConfig::load()?;
            println!(
                "http://{}:{}/mcp",
                config.server.host, config.server.port
            );
        }
        Command::Dream {
            no_dedup,
            no_rescue,
            no_mining,
            tag,
            force,
        } => {
            let opts = dream::DreamOptions {
                dedup: !no_dedup,
                rescue: !no_rescue,
                mining: !no_mining,
                tag_filter: tag,
                check_server: !force,
            };
            let worker = dream::DreamWorker::new(config);
            let report = tokio::task::spawn_blocking(move || worker.run(&opts)).await?;
            match report {
                Ok(report) => {
                    tracing::info!("dream run finished");
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("dream run skipped: {e}");
                    // Retryable skips are a normal outcome for a detached worker
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::Stats => {
            cli::stats(&config)?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
