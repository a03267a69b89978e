pub mod consolidate_patterns;
pub mod curiosity_scan;
pub mod dream;
pub mod explore_related;
pub mod forget_memory;
pub mod get_memory;
pub mod link_memories;
pub mod memory_stats;
pub mod recall_memories;
pub mod store_memory;
pub mod trace_lineage;
pub mod unlink_memories;
pub mod update_memory;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use rusqlite::Connection;

use consolidate_patterns::ConsolidatePatternsParams;
use curiosity_scan::CuriosityScanParams;
use dream::DreamParams;
use explore_related::ExploreRelatedParams;
use forget_memory::ForgetMemoryParams;
use get_memory::GetMemoryParams;
use link_memories::LinkMemoriesParams;
use memory_stats::MemoryStatsParams;
use recall_memories::RecallMemoriesParams;
use store_memory::StoreMemoryParams;
use trace_lineage::TraceLineageParams;
use unlink_memories::UnlinkMemoriesParams;
use update_memory::UpdateMemoryParams;

use crate::config::ReverieConfig;
use crate::coordination::{store_lock_path, with_store_lock};
use crate::embedding::EmbeddingProvider;
use crate::error::Error;
use crate::graph::{curiosity, explore, lineage};
use crate::memory::types::{MemoryKind, RelationKind};
use crate::memory::{links, recall, stats, store};
use crate::scoring::ScoreWeights;

/// The Reverie MCP tool handler. Holds shared state (db connection,
/// embedding provider, config) and exposes all tools via `#[tool_router]`.
#[derive(Clone)]
pub struct ReverieTools {
    tool_router: ToolRouter<Self>,
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    config: Arc<ReverieConfig>,
}

impl ReverieTools {
    /// Embed text on the blocking pool (CPU-heavy ONNX inference).
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let provider = Arc::clone(&self.embedding);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || provider.embed(&text))
            .await
            .map_err(|e| format!("embedding task failed: {e}"))?
            .map_err(|e| format!("unavailable: embedding failed: {e}"))
    }

    /// Run a read-only operation against the shared connection on the
    /// blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> crate::error::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|e| Error::Internal(format!("db lock poisoned: {e}")))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))?
        .map_err(|e| e.to_string())
    }

    /// Run a mutating operation: cross-process store lock around the shared
    /// connection. Lock contention surfaces as a Conflict after one retry.
    async fn with_write_lock<T, F>(&self, f: F) -> Result<T, String>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> crate::error::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let lock_path = store_lock_path(&self.config.resolved_db_path());
        let timeout = Duration::from_secs(self.config.coordination.lock_timeout_secs);
        tokio::task::spawn_blocking(move || {
            with_store_lock(&lock_path, timeout, || {
                let mut conn = db
                    .lock()
                    .map_err(|e| Error::Internal(format!("db lock poisoned: {e}")))?;
                f(&mut conn)
            })
        })
        .await
        .map_err(|e| format!("db task failed: {e}"))?
        .map_err(|e| e.to_string())
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl ReverieTools {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        config: Arc<ReverieConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            db,
            embedding,
            config,
        }
    }

    /// Store a new memory.
    #[tool(description = "Store a new memory. Kinds: insight (learnings), success (what worked), failure (what broke and why), decision (choices and reasoning), note (everything else).")]
    async fn store_memory(
        &self,
        Parameters(params): Parameters<StoreMemoryParams>,
    ) -> Result<String, String> {
        let kind = match &params.kind {
            Some(k) => MemoryKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?,
            None => MemoryKind::Insight,
        };
        if params.content.trim().is_empty() {
            return Err("invalid argument: content must not be empty".into());
        }

        tracing::info!(
            content_len = params.content.len(),
            kind = %kind,
            context = params.context.as_deref().unwrap_or("<none>"),
            "store_memory called"
        );

        let embedding = self.embed(&params.content).await?;

        let content = params.content;
        let context = params.context;
        let tags = params.tags.unwrap_or_default();
        let frustration = params.frustration;
        let time_cost_hours = params.time_cost_hours;

        let result = self
            .with_write_lock(move |conn| {
                store::store_memory(
                    conn,
                    &content,
                    kind,
                    context.as_deref(),
                    &tags,
                    frustration,
                    time_cost_hours,
                    &embedding,
                )
            })
            .await?;

        tracing::info!(id = %result.id, "memory stored");
        to_json(&result)
    }

    /// Search memories by natural-language query.
    #[tool(description = "Recall memories by natural language query. Ranked by hybrid score (vector similarity + recency + frequency + frustration); each result carries the score breakdown. Recall updates access metadata of returned memories.")]
    async fn recall_memories(
        &self,
        Parameters(params): Parameters<RecallMemoriesParams>,
    ) -> Result<String, String> {
        tracing::info!(query = %params.query, "recall_memories called");

        let kind = match &params.kind {
            Some(k) => Some(MemoryKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?),
            None => None,
        };
        let max_results = params
            .max_results
            .unwrap_or(self.config.scoring.default_max_results)
            .clamp(1, 20);

        let weights =
            ScoreWeights::from_config(&self.config.scoring).map_err(|e| e.to_string())?;
        let opts = recall::RecallOptions {
            max_results,
            weights,
            recency_half_life_days: self.config.scoring.recency_half_life_days,
            frequency_saturation: self.config.scoring.frequency_saturation,
            touch: true,
        };
        let filter = recall::RecallFilter {
            context: params.context,
            tags: params.tags.unwrap_or_default(),
            kind,
        };

        let embedding = self.embed(&params.query).await?;
        let response = self
            .with_db(move |conn| recall::recall_memories(conn, &embedding, &filter, &opts))
            .await?;

        to_json(&response)
    }

    /// Fetch one memory with optional links and audit log.
    #[tool(description = "Fetch a memory by ID, with optional outgoing relations and audit log.")]
    async fn get_memory(
        &self,
        Parameters(params): Parameters<GetMemoryParams>,
    ) -> Result<String, String> {
        let include_links = params.include_links.unwrap_or(true);
        let include_log = params.include_log.unwrap_or(false);
        let memory_id = params.memory_id;

        let detail = self
            .with_db(move |conn| {
                store::get_memory_detail(conn, &memory_id, include_links, include_log)
            })
            .await?;
        to_json(&detail)
    }

    /// Update a memory in place.
    #[tool(description = "Update a memory's content, tags, or kind. Changing content recomputes the embedding atomically.")]
    async fn update_memory(
        &self,
        Parameters(params): Parameters<UpdateMemoryParams>,
    ) -> Result<String, String> {
        let kind = match &params.kind {
            Some(k) => Some(MemoryKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?),
            None => None,
        };

        // Embed outside the write lock; content and vector still commit together
        let content_with_embedding = match params.content {
            Some(content) => {
                if content.trim().is_empty() {
                    return Err("invalid argument: content must not be empty".into());
                }
                let embedding = self.embed(&content).await?;
                Some((content, embedding))
            }
            None => None,
        };

        let memory_id = params.memory_id;
        let tags = params.tags;

        let result = self
            .with_write_lock(move |conn| {
                store::update_memory(
                    conn,
                    &memory_id,
                    content_with_embedding
                        .as_ref()
                        .map(|(c, e)| (c.as_str(), e.as_slice())),
                    tags.as_deref(),
                    kind,
                )
            })
            .await?;

        tracing::info!(id = %result.id, content_changed = result.content_changed, "memory updated");
        to_json(&result)
    }

    /// Delete a memory and all its edges.
    #[tool(description = "Delete a memory. Removes every relation and tag edge touching it; referenced tags/contexts survive.")]
    async fn forget_memory(
        &self,
        Parameters(params): Parameters<ForgetMemoryParams>,
    ) -> Result<String, String> {
        let memory_id = params.memory_id;
        let result = self
            .with_write_lock(move |conn| store::delete_memory(conn, &memory_id))
            .await?;
        tracing::info!(id = %result.id, relations = result.removed_relations, "memory deleted");
        to_json(&result)
    }

    /// Create a typed relation between two memories.
    #[tool(description = "Create a directed, typed relation between two memories. Idempotent per (source, target, kind).")]
    async fn link_memories(
        &self,
        Parameters(params): Parameters<LinkMemoriesParams>,
    ) -> Result<String, String> {
        let kind = match &params.kind {
            Some(k) => RelationKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?,
            None => RelationKind::Related,
        };
        let source_id = params.source_id;
        let target_id = params.target_id;
        let reason = params.reason;

        let result = self
            .with_write_lock(move |conn| {
                links::link_memories(conn, &source_id, &target_id, kind, reason.as_deref())
            })
            .await?;
        to_json(&result)
    }

    /// Remove relations between two memories.
    #[tool(description = "Remove relations between two memories (one kind, or all kinds when none is given).")]
    async fn unlink_memories(
        &self,
        Parameters(params): Parameters<UnlinkMemoriesParams>,
    ) -> Result<String, String> {
        let kind = match &params.kind {
            Some(k) => Some(RelationKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?),
            None => None,
        };
        let source_id = params.source_id;
        let target_id = params.target_id;

        let result = self
            .with_write_lock(move |conn| {
                links::unlink_memories(conn, &source_id, &target_id, kind.as_ref())
            })
            .await?;
        to_json(&result)
    }

    /// Fan out around one memory along three axes.
    #[tool(description = "Explore memories related to one memory along three axes: direct relations (with kind and reason), tag siblings (by shared-tag count), and context siblings (by recency).")]
    async fn explore_related(
        &self,
        Parameters(params): Parameters<ExploreRelatedParams>,
    ) -> Result<String, String> {
        let opts = explore::ExploreOptions {
            include_links: params.include_links.unwrap_or(true),
            include_tag_siblings: params.include_tag_siblings.unwrap_or(true),
            include_context_siblings: params.include_context_siblings.unwrap_or(true),
            max_per_axis: params
                .max_per_axis
                .unwrap_or(self.config.graph.max_per_axis)
                .clamp(1, 20),
        };
        let memory_id = params.memory_id;

        let response = self
            .with_db(move |conn| explore::explore_related(conn, &memory_id, &opts))
            .await?;
        to_json(&response)
    }

    /// Trace how a memory evolved, or what evolved from it.
    #[tool(description = "Trace a memory's lineage through temporal relations (evolved_from, caused_by, rejected_because, supersedes). 'backward' finds ancestors, 'forward' finds descendants. Safe on cyclic graphs.")]
    async fn trace_lineage(
        &self,
        Parameters(params): Parameters<TraceLineageParams>,
    ) -> Result<String, String> {
        let direction: lineage::Direction = params
            .direction
            .as_deref()
            .unwrap_or("backward")
            .parse()
            .map_err(|e| format!("invalid argument: {e}"))?;

        let kinds = match params.kinds {
            Some(raw) => {
                let mut kinds = Vec::with_capacity(raw.len());
                for k in &raw {
                    kinds.push(
                        RelationKind::parse(k).map_err(|e| format!("invalid argument: {e}"))?,
                    );
                }
                Some(kinds)
            }
            None => None,
        };
        let max_depth = params.max_depth.unwrap_or(self.config.graph.max_depth);
        let memory_id = params.memory_id;

        let response = self
            .with_db(move |conn| {
                lineage::trace_lineage(conn, &memory_id, direction, kinds, max_depth)
            })
            .await?;
        to_json(&response)
    }

    /// Scan for contradictions, missing links, and stale knowledge.
    #[tool(description = "Scan the knowledge base for contradictions, suggested links, and stale memories. Findings come with suggested follow-up calls; nothing is changed automatically.")]
    async fn curiosity_scan(
        &self,
        Parameters(params): Parameters<CuriosityScanParams>,
    ) -> Result<String, String> {
        let filter = curiosity::ScanFilter {
            context: params.context,
            tags: params.tags.unwrap_or_default(),
        };
        let opts = curiosity::ScanOptions {
            contradiction_similarity: self.config.graph.contradiction_similarity,
            link_similarity: self.config.graph.link_similarity,
            stale_days: self.config.graph.stale_days,
            max_findings: params
                .max_findings
                .unwrap_or(self.config.graph.max_findings)
                .clamp(1, 50),
        };

        let report = self
            .with_db(move |conn| curiosity::curiosity_scan(conn, &filter, &opts))
            .await?;
        to_json(&report)
    }

    /// Extract patterns from clusters of similar memories, synchronously.
    #[tool(description = "Extract abstract patterns from clusters of memories sharing a tag. Runs synchronously; use 'dream' for the full background consolidation.")]
    async fn consolidate_patterns(
        &self,
        Parameters(params): Parameters<ConsolidatePatternsParams>,
    ) -> Result<String, String> {
        let opts = crate::dream::mining::MiningOptions {
            tag_filter: params.tag,
            min_cluster_size: params
                .min_cluster_size
                .unwrap_or(self.config.dream.min_cluster_size),
            cohesion_floor: self.config.dream.cohesion_floor,
        };

        let report = self
            .with_write_lock(move |conn| crate::dream::mining::run(conn, &opts))
            .await?;
        to_json(&report)
    }

    /// Kick off background consolidation.
    #[tool(description = "Spawn the background consolidation worker (deduplication, orphan rescue, pattern mining). Returns immediately; the worker runs detached and survives this session. Progress goes to the worker log.")]
    async fn dream(&self, Parameters(params): Parameters<DreamParams>) -> Result<String, String> {
        if crate::dream::process::is_dreamer_running(&self.config) {
            return to_json(&serde_json::json!({
                "status": "already_running",
                "message": "a dream worker is already running",
            }));
        }

        let log_path = if params.enable_logging.unwrap_or(false) {
            Some(crate::dream::process::default_log_path(&self.config))
        } else {
            None
        };

        match crate::dream::process::spawn_detached_dreamer(log_path.as_deref()) {
            Ok(pid) => to_json(&serde_json::json!({
                "status": "spawned",
                "pid": pid,
                "log_file": log_path.map(|p| p.display().to_string()),
            })),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Store statistics.
    #[tool(description = "Store statistics: counts by kind, contexts, tags, relations, patterns, and storage size.")]
    async fn memory_stats(
        &self,
        Parameters(_params): Parameters<MemoryStatsParams>,
    ) -> Result<String, String> {
        let db_path = self.config.resolved_db_path();
        let response = self
            .with_db(move |conn| stats::memory_stats(conn, Some(&db_path)))
            .await?;
        to_json(&response)
    }
}

#[tool_handler]
impl ServerHandler for ReverieTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Reverie is a self-organizing memory server. Use store_memory to save \
                 experiences, recall_memories to search them, link_memories to build the \
                 knowledge graph, and dream to consolidate it in the background."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
