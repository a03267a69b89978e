//! Write path — storage, update, deletion, and audit logging.
//!
//! [`store_memory`] runs the full pipeline inside one transaction: insert
//! into the memories table, insert the embedding vector, get-or-create the
//! context and tag nodes, attach tag edges, and write an audit log entry.
//! Updates recompute the embedding together with content (never one without
//! the other), and deletes remove every edge touching the memory while
//! leaving the referenced Context/Tag nodes intact.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use crate::embedding::EMBEDDING_DIM;
use crate::error::{Error, Result};
use crate::memory::types::{Memory, MemoryKind, MemoryLink, RelationKind};

/// Maximum tags accepted per memory.
pub const MAX_TAGS: usize = 20;

/// Maximum derived summary length, in characters.
const MAX_SUMMARY_CHARS: usize = 200;

/// Result returned from a store operation.
#[derive(Debug, Serialize)]
pub struct StoreMemoryResult {
    /// UUID of the stored memory.
    pub id: String,
    /// Derived summary.
    pub summary: String,
    /// Final frustration score (explicit or estimated).
    pub frustration: f64,
    /// Context the memory was filed under, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Normalized tags attached to the memory.
    pub tags: Vec<String>,
}

/// Result returned from an update operation.
#[derive(Debug, Serialize)]
pub struct UpdateMemoryResult {
    pub id: String,
    pub summary: String,
    /// `true` if content (and therefore the embedding) was replaced.
    pub content_changed: bool,
}

/// Result returned from a delete operation.
#[derive(Debug, Serialize)]
pub struct DeleteMemoryResult {
    pub id: String,
    /// Relation edges removed along with the memory (either direction).
    pub removed_relations: u64,
    /// Tag edges removed along with the memory.
    pub removed_tag_edges: u64,
}

/// Full detail for a single memory, with optional links and audit log.
#[derive(Debug, Serialize)]
pub struct MemoryDetail {
    #[serde(flatten)]
    pub memory: Memory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<LinkDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<LogEntry>>,
}

/// An outgoing relation with a preview of its target.
#[derive(Debug, Serialize)]
pub struct LinkDetail {
    pub kind: RelationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub target_id: String,
    pub target_summary: String,
}

#[derive(Debug, Serialize)]
pub struct LogEntry {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub created_at: String,
}

/// Store a new memory.
///
/// `frustration` may be supplied explicitly; otherwise it is estimated from
/// content by the lexical band scan. The whole write — memory row, embedding
/// vector, context, tags, audit entry — commits atomically.
pub fn store_memory(
    conn: &mut Connection,
    content: &str,
    kind: MemoryKind,
    context: Option<&str>,
    tags: &[String],
    frustration: Option<f64>,
    time_cost_hours: Option<f64>,
    embedding: &[f32],
) -> Result<StoreMemoryResult> {
    if content.trim().is_empty() {
        return Err(Error::invalid("content must not be empty"));
    }
    if tags.len() > MAX_TAGS {
        return Err(Error::invalid(format!(
            "too many tags (max {MAX_TAGS}, got {})",
            tags.len()
        )));
    }
    check_dimension(embedding)?;
    if let Some(f) = frustration {
        if !(0.0..=1.0).contains(&f) {
            return Err(Error::invalid(format!(
                "frustration must be in [0.0, 1.0], got {f}"
            )));
        }
    }

    let frustration = crate::scoring::frustration::resolve(frustration, content);
    let summary = derive_summary(content);
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let normalized_tags = normalize_tags(tags);

    let tx = conn.transaction()?;

    let context = match context.map(str::trim) {
        Some("") | None => None,
        Some(name) => {
            get_or_create_context(&tx, name, &now)?;
            Some(name.to_string())
        }
    };

    tx.execute(
        "INSERT INTO memories (id, kind, content, summary, context, frustration, \
         time_cost_hours, access_count, last_accessed, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, ?8)",
        params![
            id,
            kind.as_str(),
            content,
            summary,
            context,
            frustration,
            time_cost_hours,
            now,
        ],
    )?;

    insert_vec(&tx, &id, embedding)?;

    for tag in &normalized_tags {
        attach_tag(&tx, &id, tag, &now)?;
    }

    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({"kind": kind.as_str(), "tags": normalized_tags})),
    )?;

    tx.commit()?;

    Ok(StoreMemoryResult {
        id,
        summary,
        frustration,
        context,
        tags: normalized_tags,
    })
}

/// Update an existing memory in place.
///
/// `content` must arrive paired with its freshly computed embedding so the
/// two can never diverge. `tags: Some(..)` replaces the full tag set;
/// `kind: Some(..)` retypes the memory. Access metadata is untouched.
pub fn update_memory(
    conn: &mut Connection,
    memory_id: &str,
    content: Option<(&str, &[f32])>,
    tags: Option<&[String]>,
    kind: Option<MemoryKind>,
) -> Result<UpdateMemoryResult> {
    if let Some((text, _)) = content {
        if text.trim().is_empty() {
            return Err(Error::invalid("content must not be empty"));
        }
    }
    if let Some((_, emb)) = content {
        check_dimension(emb)?;
    }
    if let Some(t) = tags {
        if t.len() > MAX_TAGS {
            return Err(Error::invalid(format!(
                "too many tags (max {MAX_TAGS}, got {})",
                t.len()
            )));
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::not_found(format!("memory {memory_id}")));
    }

    let mut summary = None;
    if let Some((text, embedding)) = content {
        let s = derive_summary(text);
        tx.execute(
            "UPDATE memories SET content = ?1, summary = ?2, updated_at = ?3 WHERE id = ?4",
            params![text, s, now, memory_id],
        )?;
        // Content and embedding change together, inside this transaction
        tx.execute(
            "DELETE FROM memories_vec WHERE id = ?1",
            params![memory_id],
        )?;
        insert_vec(&tx, memory_id, embedding)?;
        summary = Some(s);
    } else {
        tx.execute(
            "UPDATE memories SET updated_at = ?1 WHERE id = ?2",
            params![now, memory_id],
        )?;
    }

    if let Some(kind) = &kind {
        tx.execute(
            "UPDATE memories SET kind = ?1 WHERE id = ?2",
            params![kind.as_str(), memory_id],
        )?;
    }

    if let Some(tags) = tags {
        let normalized = normalize_tags(tags);
        tx.execute(
            "DELETE FROM memory_tags WHERE memory_id = ?1",
            params![memory_id],
        )?;
        for tag in &normalized {
            attach_tag(&tx, memory_id, tag, &now)?;
        }
    }

    write_audit_log(
        &tx,
        "update",
        memory_id,
        Some(&serde_json::json!({
            "content_changed": content.is_some(),
            "tags_changed": tags.is_some(),
            "kind_changed": kind.is_some(),
        })),
    )?;

    let summary = match summary {
        Some(s) => s,
        None => tx.query_row(
            "SELECT summary FROM memories WHERE id = ?1",
            params![memory_id],
            |row| row.get(0),
        )?,
    };

    tx.commit()?;

    Ok(UpdateMemoryResult {
        id: memory_id.to_string(),
        summary,
        content_changed: content.is_some(),
    })
}

/// Delete a memory and every edge touching it.
///
/// Relation edges (both directions), tag edges, and pattern-instance edges
/// go with it; the referenced Context/Tag nodes stay.
pub fn delete_memory(conn: &mut Connection, memory_id: &str) -> Result<DeleteMemoryResult> {
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::not_found(format!("memory {memory_id}")));
    }

    let removed_relations: u64 = tx.query_row(
        "SELECT COUNT(*) FROM relations WHERE source_id = ?1 OR target_id = ?1",
        params![memory_id],
        |row| row.get::<_, i64>(0),
    )? as u64;
    let removed_tag_edges: u64 = tx.query_row(
        "SELECT COUNT(*) FROM memory_tags WHERE memory_id = ?1",
        params![memory_id],
        |row| row.get::<_, i64>(0),
    )? as u64;

    // vec0 tables have no FK support, so the vector row goes manually
    tx.execute(
        "DELETE FROM memories_vec WHERE id = ?1",
        params![memory_id],
    )?;

    write_audit_log(&tx, "delete", memory_id, None)?;

    // Cascades memory_tags, relations (both directions), pattern_instances
    tx.execute("DELETE FROM memories WHERE id = ?1", params![memory_id])?;

    tx.commit()?;

    Ok(DeleteMemoryResult {
        id: memory_id.to_string(),
        removed_relations,
        removed_tag_edges,
    })
}

/// Fetch a single memory record with its tags.
pub fn get_memory(conn: &Connection, memory_id: &str) -> Result<Memory> {
    let row = conn
        .query_row(
            "SELECT id, kind, content, summary, context, frustration, time_cost_hours, \
             access_count, last_accessed, created_at, updated_at \
             FROM memories WHERE id = ?1",
            params![memory_id],
            map_memory_row,
        )
        .optional()?;

    let mut memory = row.ok_or_else(|| Error::not_found(format!("memory {memory_id}")))?;
    memory.tags = tags_for(conn, memory_id)?;
    Ok(memory)
}

/// Fetch full detail for a memory, with optional outgoing links and audit log.
pub fn get_memory_detail(
    conn: &Connection,
    memory_id: &str,
    include_links: bool,
    include_log: bool,
) -> Result<MemoryDetail> {
    let memory = get_memory(conn, memory_id)?;

    let links = if include_links {
        let mut stmt = conn.prepare(
            "SELECT r.kind, r.reason, m.id, m.summary \
             FROM relations r JOIN memories m ON r.target_id = m.id \
             WHERE r.source_id = ?1 ORDER BY r.created_at",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |row| {
                let kind: String = row.get(0)?;
                Ok((kind, row.get::<_, Option<String>>(1)?, row.get::<_, String>(2)?, row.get::<_, String>(3)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut details = Vec::with_capacity(rows.len());
        for (kind, reason, target_id, target_summary) in rows {
            details.push(LinkDetail {
                kind: RelationKind::parse(&kind).map_err(Error::Internal)?,
                reason,
                target_id,
                target_summary,
            });
        }
        Some(details)
    } else {
        None
    };

    let log = if include_log {
        let mut stmt = conn.prepare(
            "SELECT operation, details, created_at \
             FROM memory_log WHERE memory_id = ?1 ORDER BY created_at, id",
        )?;
        let rows = stmt
            .query_map(params![memory_id], |row| {
                let details_str: Option<String> = row.get(1)?;
                Ok(LogEntry {
                    operation: row.get(0)?,
                    details: details_str.and_then(|s| serde_json::from_str(&s).ok()),
                    created_at: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Some(rows)
    } else {
        None
    };

    Ok(MemoryDetail { memory, links, log })
}

/// All outgoing relations of a memory (no target hydration).
pub fn outgoing_links(conn: &Connection, memory_id: &str) -> Result<Vec<MemoryLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, target_id, kind, reason, created_at \
         FROM relations WHERE source_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt
        .query_map(params![memory_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut links = Vec::with_capacity(rows.len());
    for (id, source_id, target_id, kind, reason, created_at) in rows {
        links.push(MemoryLink {
            id,
            source_id,
            target_id,
            kind: RelationKind::parse(&kind).map_err(Error::Internal)?,
            reason,
            created_at,
        });
    }
    Ok(links)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

pub(crate) fn check_dimension(embedding: &[f32]) -> Result<()> {
    if embedding.len() != EMBEDDING_DIM {
        return Err(Error::invalid(format!(
            "embedding dimension mismatch: expected {EMBEDDING_DIM}, got {}",
            embedding.len()
        )));
    }
    Ok(())
}

/// Derive a bounded summary: first non-empty line, truncated on a char
/// boundary to [`MAX_SUMMARY_CHARS`].
pub(crate) fn derive_summary(content: &str) -> String {
    let first_line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if first_line.chars().count() <= MAX_SUMMARY_CHARS {
        return first_line.to_string();
    }
    let truncated: String = first_line.chars().take(MAX_SUMMARY_CHARS).collect();
    format!("{truncated}...")
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let normalized = tag.trim().to_lowercase();
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Get-or-create a context node. Never deleted automatically afterwards.
fn get_or_create_context(conn: &Transaction, name: &str, now: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO contexts (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    Ok(())
}

/// Get-or-create a tag node and attach the membership edge.
fn attach_tag(conn: &Transaction, memory_id: &str, tag: &str, now: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO tags (name, created_at) VALUES (?1, ?2)",
        params![tag, now],
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)",
        params![memory_id, tag],
    )?;
    Ok(())
}

fn insert_vec(conn: &Transaction, id: &str, embedding: &[f32]) -> Result<()> {
    let embedding_bytes = super::embedding_to_bytes(embedding);
    conn.execute(
        "INSERT INTO memories_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_bytes],
    )?;
    Ok(())
}

pub(crate) fn tags_for(conn: &Connection, memory_id: &str) -> Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT tag FROM memory_tags WHERE memory_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![memory_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

pub(crate) fn map_memory_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let kind_str: String = row.get(1)?;
    Ok(Memory {
        id: row.get(0)?,
        kind: MemoryKind::parse(&kind_str).unwrap_or(MemoryKind::Custom(kind_str)),
        content: row.get(2)?,
        summary: row.get(3)?,
        context: row.get(4)?,
        tags: Vec::new(),
        frustration: row.get(5)?,
        time_cost_hours: row.get(6)?,
        access_count: row.get::<_, i64>(7)? as u64,
        last_accessed: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    memory_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, memory_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, memory_id, details_json, now],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    /// Unit vector along dimension 0.
    fn embedding_a() -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[0] = 1.0;
        v
    }

    /// Orthogonal to embedding_a.
    fn embedding_b() -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[100] = 1.0;
        v
    }

    #[test]
    fn test_store_new_memory() {
        let mut conn = test_db();

        let result = store_memory(
            &mut conn,
            "Use connection pooling for Postgres",
            MemoryKind::Insight,
            Some("svc"),
            &["db".into(), "Postgres".into()],
            None,
            Some(2.5),
            &embedding_a(),
        )
        .unwrap();

        assert_eq!(result.summary, "Use connection pooling for Postgres");
        assert_eq!(result.context.as_deref(), Some("svc"));
        assert_eq!(result.tags, vec!["db", "postgres"]); // normalized lowercase

        // Memory row
        let (content, access_count, last_accessed): (String, u64, Option<String>) = conn
            .query_row(
                "SELECT content, access_count, last_accessed FROM memories WHERE id = ?1",
                params![result.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(content, "Use connection pooling for Postgres");
        assert_eq!(access_count, 0);
        assert!(last_accessed.is_some(), "last_accessed set at creation");

        // Vector row
        let vec_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories_vec WHERE id = ?1",
                params![result.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vec_count, 1);

        // Context and tags were get-or-created
        let ctx_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contexts WHERE name = 'svc'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(ctx_count, 1);
        let tag_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags", [], |r| r.get(0))
            .unwrap();
        assert_eq!(tag_count, 2);
    }

    #[test]
    fn test_store_estimates_frustration() {
        let mut conn = test_db();
        let result = store_memory(
            &mut conn,
            "Spent all day stuck on a broken migration",
            MemoryKind::Failure,
            None,
            &[],
            None,
            None,
            &embedding_a(),
        )
        .unwrap();
        assert!((result.frustration - 0.7).abs() < 1e-9, "high band: 'stuck'");
    }

    #[test]
    fn test_store_explicit_frustration_wins() {
        let mut conn = test_db();
        let result = store_memory(
            &mut conn,
            "A total nightmare of a deploy",
            MemoryKind::Failure,
            None,
            &[],
            Some(0.2),
            None,
            &embedding_a(),
        )
        .unwrap();
        assert!((result.frustration - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_store_validates_input() {
        let mut conn = test_db();

        let err = store_memory(
            &mut conn,
            "   ",
            MemoryKind::Note,
            None,
            &[],
            None,
            None,
            &embedding_a(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = store_memory(
            &mut conn,
            "valid content",
            MemoryKind::Note,
            None,
            &[],
            Some(1.5),
            None,
            &embedding_a(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");

        let err = store_memory(
            &mut conn,
            "valid content",
            MemoryKind::Note,
            None,
            &[],
            None,
            None,
            &vec![0.0f32; 128], // wrong dimension
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn test_update_content_replaces_embedding() {
        let mut conn = test_db();
        let stored = store_memory(
            &mut conn,
            "Original content",
            MemoryKind::Note,
            None,
            &[],
            None,
            None,
            &embedding_a(),
        )
        .unwrap();

        update_memory(
            &mut conn,
            &stored.id,
            Some(("Replaced content", &embedding_b())),
            None,
            None,
        )
        .unwrap();

        let emb_bytes: Vec<u8> = conn
            .query_row(
                "SELECT embedding FROM memories_vec WHERE id = ?1",
                params![stored.id],
                |row| row.get(0),
            )
            .unwrap();
        let emb = crate::memory::bytes_to_embedding(&emb_bytes);
        assert_eq!(emb, embedding_b());

        let content: String = conn
            .query_row(
                "SELECT content FROM memories WHERE id = ?1",
                params![stored.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(content, "Replaced content");
    }

    #[test]
    fn test_update_tags_replaces_set() {
        let mut conn = test_db();
        let stored = store_memory(
            &mut conn,
            "Tagged memory",
            MemoryKind::Note,
            None,
            &["old".into()],
            None,
            None,
            &embedding_a(),
        )
        .unwrap();

        update_memory(
            &mut conn,
            &stored.id,
            None,
            Some(&["new-a".into(), "new-b".into()]),
            None,
        )
        .unwrap();

        let memory = get_memory(&conn, &stored.id).unwrap();
        assert_eq!(memory.tags, vec!["new-a", "new-b"]);

        // The old tag node survives even though nothing references it
        let old_tag: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags WHERE name = 'old'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(old_tag, 1);
    }

    #[test]
    fn test_update_missing_memory_is_not_found() {
        let mut conn = test_db();
        let err = update_memory(&mut conn, "missing-id", None, None, Some(MemoryKind::Note))
            .unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_delete_removes_edges_keeps_nodes() {
        let mut conn = test_db();
        let a = store_memory(
            &mut conn,
            "Memory A",
            MemoryKind::Insight,
            Some("proj"),
            &["shared".into()],
            None,
            None,
            &embedding_a(),
        )
        .unwrap();
        let b = store_memory(
            &mut conn,
            "Memory B",
            MemoryKind::Insight,
            Some("proj"),
            &["shared".into()],
            None,
            None,
            &embedding_b(),
        )
        .unwrap();

        crate::memory::links::link_memories(
            &mut conn,
            &a.id,
            &b.id,
            RelationKind::Extends,
            None,
        )
        .unwrap();
        crate::memory::links::link_memories(
            &mut conn,
            &b.id,
            &a.id,
            RelationKind::Related,
            None,
        )
        .unwrap();

        let result = delete_memory(&mut conn, &a.id).unwrap();
        assert_eq!(result.removed_relations, 2);
        assert_eq!(result.removed_tag_edges, 1);

        // All edges touching A are gone
        let rel_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM relations WHERE source_id = ?1 OR target_id = ?1",
                params![a.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rel_count, 0);

        // Vector row gone
        let vec_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories_vec WHERE id = ?1",
                params![a.id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vec_count, 0);

        // Tag and context nodes survive
        let tag_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tags WHERE name = 'shared'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(tag_count, 1);
        let ctx_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM contexts WHERE name = 'proj'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(ctx_count, 1);

        // B is untouched
        get_memory(&conn, &b.id).unwrap();
    }

    #[test]
    fn test_delete_missing_memory_is_not_found() {
        let mut conn = test_db();
        let err = delete_memory(&mut conn, "missing-id").unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_get_memory_detail_with_log() {
        let mut conn = test_db();
        let stored = store_memory(
            &mut conn,
            "Memory with a paper trail",
            MemoryKind::Decision,
            None,
            &[],
            None,
            None,
            &embedding_a(),
        )
        .unwrap();
        update_memory(&mut conn, &stored.id, None, None, Some(MemoryKind::Insight)).unwrap();

        let detail = get_memory_detail(&conn, &stored.id, true, true).unwrap();
        assert_eq!(detail.memory.kind, MemoryKind::Insight);
        assert_eq!(detail.links.as_ref().unwrap().len(), 0);
        let log = detail.log.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].operation, "create");
        assert_eq!(log[1].operation, "update");
    }

    #[test]
    fn test_derive_summary() {
        assert_eq!(derive_summary("short note"), "short note");
        assert_eq!(
            derive_summary("\n\n  first real line  \nsecond line"),
            "first real line"
        );
        let long = "x".repeat(300);
        let summary = derive_summary(&long);
        assert_eq!(summary.chars().count(), 203); // 200 + "..."
        assert!(summary.ends_with("..."));
    }
}
