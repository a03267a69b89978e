//! Self-organizing memory for AI agents — a typed knowledge graph with
//! hybrid recall and background consolidation, served over MCP.
//!
//! Memories carry content, a 384-dim embedding, a kind (insight, success,
//! failure, decision, note, or custom), tags, a context, and access
//! metadata. Typed directed relations connect them into a graph that may
//! legitimately contain cycles.
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   for approximate nearest-neighbor search over embeddings
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Recall**: hybrid scoring — vector similarity, recency decay,
//!   log-saturated frequency, and frustration weight
//! - **Consolidation**: a detached "dream" worker that deduplicates,
//!   rescues orphans, and mines patterns in the background
//! - **Coordination**: a cross-process advisory store lock plus a
//!   version-checked shared-server lifecycle for multi-session setups
//! - **Transport**: MCP over stdio (primary) or streamable HTTP
//!
//! # Modules
//!
//! - [`config`] — Configuration from TOML files and environment variables
//! - [`db`] — SQLite initialization, schema, and migrations
//! - [`embedding`] — Text-to-vector pipeline via ONNX Runtime
//! - [`error`] — The NotFound/Conflict/InvalidArgument/Unavailable/Internal taxonomy
//! - [`memory`] — Store, recall, links, and stats over the memory graph
//! - [`scoring`] — The pure hybrid-relevance scoring functions
//! - [`graph`] — explore_related, trace_lineage, and the curiosity scan
//! - [`dream`] — The background consolidation engine
//! - [`coordination`] — Store lock and shared-server lifecycle

pub mod config;
pub mod coordination;
pub mod db;
pub mod dream;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod memory;
pub mod scoring;
