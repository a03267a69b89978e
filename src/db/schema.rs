//! SQL DDL for all Reverie tables.
//!
//! Defines the `memories`, `contexts`, `tags`, `memory_tags`, `relations`,
//! `patterns`, `pattern_instances`, `memory_log`, and `schema_meta` tables,
//! plus the `memories_vec` / `patterns_vec` (vec0) virtual tables. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for Reverie's core tables.
const SCHEMA_SQL: &str = r#"
-- Core memory storage. `kind` is open-ended (well-known kinds plus custom),
-- so no CHECK enumeration here; parsing happens at the type layer.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL DEFAULT 'insight',
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    context TEXT REFERENCES contexts(name),
    frustration REAL NOT NULL DEFAULT 0.0 CHECK(frustration >= 0.0 AND frustration <= 1.0),
    time_cost_hours REAL,
    access_count INTEGER NOT NULL DEFAULT 0 CHECK(access_count >= 0),
    last_accessed TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
CREATE INDEX IF NOT EXISTS idx_memories_context ON memories(context);
CREATE INDEX IF NOT EXISTS idx_memories_updated ON memories(updated_at);

-- Named groupings, get-or-create on first reference, never auto-deleted.
CREATE TABLE IF NOT EXISTS contexts (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS memory_tags (
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    tag TEXT NOT NULL REFERENCES tags(name),
    PRIMARY KEY (memory_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_memory_tags_tag ON memory_tags(tag);

-- Typed directed edges between memories. The UNIQUE constraint keys each
-- edge by (source, target, kind) so link creation is idempotent per triple
-- while still allowing multiple kinds between the same ordered pair.
CREATE TABLE IF NOT EXISTS relations (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    reason TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (source_id, target_id, kind)
);

CREATE INDEX IF NOT EXISTS idx_relations_source ON relations(source_id);
CREATE INDEX IF NOT EXISTS idx_relations_target ON relations(target_id);
CREATE INDEX IF NOT EXISTS idx_relations_kind ON relations(kind);

-- Abstracted cluster summaries, created only by the dream worker.
CREATE TABLE IF NOT EXISTS patterns (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    summary TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.5 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    instance_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pattern_instances (
    pattern_id TEXT NOT NULL REFERENCES patterns(id) ON DELETE CASCADE,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    confidence REAL NOT NULL DEFAULT 0.5,
    created_at TEXT NOT NULL,
    PRIMARY KEY (pattern_id, memory_id)
);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','update','link','unlink','delete','dream')),
    memory_id TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual tables must be created separately (sqlite-vec syntax).
const VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS memories_vec USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[384]
);

CREATE VIRTUAL TABLE IF NOT EXISTS patterns_vec USING vec0(
    id TEXT PRIMARY KEY,
    embedding FLOAT[384]
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(VEC_TABLE_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
