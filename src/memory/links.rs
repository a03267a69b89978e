//! Relation edge storage.
//!
//! Relations are independent edge records keyed by (source, target, kind) —
//! cyclic graphs are a valid state, and creating the same typed edge twice
//! is idempotent rather than an error.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::types::{MemoryLink, RelationKind};

/// Result returned from a link operation.
#[derive(Debug, Serialize)]
pub struct LinkResult {
    /// UUID of the created (or pre-existing) relation edge.
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
    /// `false` if the exact (source, target, kind) edge already existed.
    pub created: bool,
}

/// Result returned from an unlink operation.
#[derive(Debug, Serialize)]
pub struct UnlinkResult {
    pub source_id: String,
    pub target_id: String,
    /// Number of edges removed (one per kind when no kind filter is given).
    pub removed: u64,
}

/// Create a directed relation between two memories.
///
/// Validates both endpoints exist and rejects self-links. Idempotent per
/// (source, target, kind): repeating the call returns the existing edge.
pub fn link_memories(
    conn: &mut Connection,
    source_id: &str,
    target_id: &str,
    kind: RelationKind,
    reason: Option<&str>,
) -> Result<LinkResult> {
    if source_id == target_id {
        return Err(Error::invalid(format!(
            "cannot link memory {source_id} to itself"
        )));
    }

    let tx = conn.transaction()?;

    ensure_memory_exists(&tx, source_id, "source")?;
    ensure_memory_exists(&tx, target_id, "target")?;

    let existing: Option<String> = tx
        .query_row(
            "SELECT id FROM relations \
             WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
            params![source_id, target_id, kind.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        tx.commit()?;
        return Ok(LinkResult {
            id,
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            kind,
            created: false,
        });
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO relations (id, source_id, target_id, kind, reason, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, source_id, target_id, kind.as_str(), reason, now],
    )?;

    super::store::write_audit_log(
        &tx,
        "link",
        source_id,
        Some(&serde_json::json!({
            "target_id": target_id,
            "kind": kind.as_str(),
            "reason": reason,
        })),
    )?;

    tx.commit()?;

    Ok(LinkResult {
        id,
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        kind,
        created: true,
    })
}

/// Remove relation edges between an ordered pair of memories.
///
/// With a kind filter only that edge goes; without one, every kind between
/// the pair goes. NotFound when nothing matched.
pub fn unlink_memories(
    conn: &mut Connection,
    source_id: &str,
    target_id: &str,
    kind: Option<&RelationKind>,
) -> Result<UnlinkResult> {
    let tx = conn.transaction()?;

    let removed = match kind {
        Some(kind) => tx.execute(
            "DELETE FROM relations WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
            params![source_id, target_id, kind.as_str()],
        )?,
        None => tx.execute(
            "DELETE FROM relations WHERE source_id = ?1 AND target_id = ?2",
            params![source_id, target_id],
        )?,
    };

    if removed == 0 {
        return Err(Error::not_found(format!(
            "no relation from {source_id} to {target_id}{}",
            kind.map(|k| format!(" with kind {k}")).unwrap_or_default()
        )));
    }

    super::store::write_audit_log(
        &tx,
        "unlink",
        source_id,
        Some(&serde_json::json!({
            "target_id": target_id,
            "kind": kind.map(RelationKind::as_str),
            "removed": removed,
        })),
    )?;

    tx.commit()?;

    Ok(UnlinkResult {
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
        removed: removed as u64,
    })
}

/// Whether any relation exists between the pair, in either direction,
/// optionally restricted to a kind subset.
pub fn linked_either_direction(
    conn: &Connection,
    a: &str,
    b: &str,
    kinds: Option<&[RelationKind]>,
) -> Result<bool> {
    let found: bool = match kinds {
        None => conn.query_row(
            "SELECT COUNT(*) > 0 FROM relations \
             WHERE (source_id = ?1 AND target_id = ?2) \
                OR (source_id = ?2 AND target_id = ?1)",
            params![a, b],
            |row| row.get(0),
        )?,
        Some(kinds) => {
            let mut found = false;
            for kind in kinds {
                let hit: bool = conn.query_row(
                    "SELECT COUNT(*) > 0 FROM relations \
                     WHERE ((source_id = ?1 AND target_id = ?2) \
                         OR (source_id = ?2 AND target_id = ?1)) AND kind = ?3",
                    params![a, b, kind.as_str()],
                    |row| row.get(0),
                )?;
                if hit {
                    found = true;
                    break;
                }
            }
            found
        }
    };
    Ok(found)
}

/// Incoming relations of a memory, optionally restricted to one kind.
pub fn incoming_links(
    conn: &Connection,
    memory_id: &str,
    kind: Option<&RelationKind>,
) -> Result<Vec<MemoryLink>> {
    let mut stmt = conn.prepare(
        "SELECT id, source_id, target_id, kind, reason, created_at \
         FROM relations WHERE target_id = ?1 ORDER BY created_at",
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

    let mut links = Vec::new();
    for (id, source_id, target_id, kind_str, reason, created_at) in rows {
        let parsed = RelationKind::parse(&kind_str).map_err(Error::Internal)?;
        if let Some(filter) = kind {
            if &parsed != filter {
                continue;
            }
        }
        links.push(MemoryLink {
            id,
            source_id,
            target_id,
            kind: parsed,
            reason,
            created_at,
        });
    }
    Ok(links)
}

fn ensure_memory_exists(conn: &rusqlite::Transaction, memory_id: &str, role: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM memories WHERE id = ?1",
        params![memory_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(Error::not_found(format!("{role} memory {memory_id}")));
    }
    Ok(())
}
