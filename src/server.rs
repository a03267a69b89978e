//! MCP server initialization for stdio and streamable-HTTP transports.
//!
//! [`serve_stdio`] is the single-session entry point; [`serve_http`] is the
//! long-lived shared server that several client sessions connect to through
//! the coordination layer. The shared server records its own version/PID
//! marker files at startup and best-effort removes them on graceful
//! shutdown — the markers are advisory, so a crash leaving them behind is
//! tolerated by the next startup.

use crate::config::ReverieConfig;
use crate::coordination::server_guard;
use crate::db;
use crate::embedding;
use crate::tools::ReverieTools;
use anyhow::Result;
use rmcp::ServiceExt;
use std::sync::{Arc, Mutex};

/// Shared setup: open DB, create embedding provider, check model version.
fn setup_shared_state(
    config: ReverieConfig,
) -> Result<(
    Arc<Mutex<rusqlite::Connection>>,
    Arc<dyn embedding::EmbeddingProvider>,
    Arc<ReverieConfig>,
)> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    // Warn on embedding model mismatch — stored vectors would be in a
    // different space than fresh queries
    if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
        if stored_model != config.embedding.model {
            tracing::warn!(
                stored = %stored_model,
                configured = %config.embedding.model,
                "embedding model changed — stored vectors no longer match query embeddings"
            );
        }
    }
    // A dimension mismatch is fatal: the vec0 table cannot answer queries
    // of a different width
    if let Ok(Some(dim)) = db::migrations::get_embedding_dim(&conn) {
        anyhow::ensure!(
            dim == embedding::EMBEDDING_DIM,
            "store was created with {dim}-dim embeddings, this build uses {}",
            embedding::EMBEDDING_DIM
        );
    }

    let db = Arc::new(Mutex::new(conn));

    let provider = embedding::create_provider(&config.embedding)?;
    let embedding: Arc<dyn embedding::EmbeddingProvider> = Arc::from(provider);
    tracing::info!("embedding provider ready");

    Ok((db, embedding, Arc::new(config)))
}

/// Start the MCP server over stdio transport (single session, direct store).
pub async fn serve_stdio(config: ReverieConfig) -> Result<()> {
    tracing::info!("starting Reverie MCP server on stdio");

    let (db, embedding, config) = setup_shared_state(config)?;

    let tools = ReverieTools::new(db, embedding, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running — waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the shared MCP server over streamable HTTP.
///
/// Holds the store connection on behalf of all connected sessions; the
/// coordination layer's version check decides when this process gets
/// replaced.
pub async fn serve_http(config: ReverieConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");
    let data_dir = config.data_dir();

    tracing::info!(addr = %bind_addr, "starting shared Reverie MCP server");

    let (db, embedding, config) = setup_shared_state(config)?;

    // Record who we are for the next client's version check
    server_guard::write_server_info(&data_dir, std::process::id(), env!("CARGO_PKG_VERSION"))?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(ReverieTools::new(db.clone(), embedding.clone(), config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "shared server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for ctrl-c");
            tracing::info!("shutting down shared server");
            server_guard::cleanup_server_files(&data_dir);
        })
        .await?;

    Ok(())
}
