//! Relation discovery around a single memory.
//!
//! Fans out along three independent axes: direct outgoing relations,
//! tag siblings (ranked by shared-tag count), and context siblings (ranked
//! by recency). Axes are individually toggleable and capped, and are NOT
//! deduplicated against each other — a memory reachable through both a
//! relation and a shared tag legitimately shows up in both lists.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::memory::store;
use crate::memory::types::{Memory, RelationKind};

/// Which axes to follow and how many results each may return.
#[derive(Debug, Clone)]
pub struct ExploreOptions {
    pub include_links: bool,
    pub include_tag_siblings: bool,
    pub include_context_siblings: bool,
    pub max_per_axis: usize,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self {
            include_links: true,
            include_tag_siblings: true,
            include_context_siblings: true,
            max_per_axis: 5,
        }
    }
}

/// A directly linked memory with the edge that connects it.
#[derive(Debug, Serialize)]
pub struct LinkedMemory {
    pub kind: RelationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub memory: Memory,
}

/// A memory sharing tags with the center, with the overlap count.
#[derive(Debug, Serialize)]
pub struct TagSibling {
    pub shared_tags: u64,
    #[serde(flatten)]
    pub memory: Memory,
}

#[derive(Debug, Serialize)]
pub struct ExploreResponse {
    pub center_id: String,
    pub linked: Vec<LinkedMemory>,
    pub by_tag: Vec<TagSibling>,
    pub by_context: Vec<Memory>,
}

/// Explore memories related to `memory_id` along the three axes.
///
/// NotFound if the center memory does not exist. Each axis excludes the
/// center itself.
pub fn explore_related(
    conn: &Connection,
    memory_id: &str,
    opts: &ExploreOptions,
) -> Result<ExploreResponse> {
    let center = store::get_memory(conn, memory_id)?;

    let linked = if opts.include_links {
        linked_axis(conn, memory_id, opts.max_per_axis)?
    } else {
        Vec::new()
    };

    let by_tag = if opts.include_tag_siblings {
        tag_sibling_axis(conn, memory_id, opts.max_per_axis)?
    } else {
        Vec::new()
    };

    let by_context = match (&center.context, opts.include_context_siblings) {
        (Some(context), true) => context_sibling_axis(conn, memory_id, context, opts.max_per_axis)?,
        _ => Vec::new(),
    };

    Ok(ExploreResponse {
        center_id: memory_id.to_string(),
        linked,
        by_tag,
        by_context,
    })
}

/// Axis 1: outgoing relation edges with kind and reason.
fn linked_axis(conn: &Connection, memory_id: &str, limit: usize) -> Result<Vec<LinkedMemory>> {
    let mut stmt = conn.prepare(
        "SELECT r.kind, r.reason, m.id \
         FROM relations r JOIN memories m ON r.target_id = m.id \
         WHERE r.source_id = ?1 ORDER BY r.created_at LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![memory_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (kind, reason, target_id) in rows {
        out.push(LinkedMemory {
            kind: RelationKind::parse(&kind).map_err(Error::Internal)?,
            reason,
            memory: store::get_memory(conn, &target_id)?,
        });
    }
    Ok(out)
}

/// Axis 2: memories sharing at least one tag, most-overlapping first.
fn tag_sibling_axis(conn: &Connection, memory_id: &str, limit: usize) -> Result<Vec<TagSibling>> {
    let mut stmt = conn.prepare(
        "SELECT other.memory_id, COUNT(*) as shared \
         FROM memory_tags mine \
         JOIN memory_tags other ON mine.tag = other.tag AND other.memory_id != mine.memory_id \
         WHERE mine.memory_id = ?1 \
         GROUP BY other.memory_id \
         ORDER BY shared DESC, other.memory_id \
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![memory_id, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(rows.len());
    for (sibling_id, shared) in rows {
        out.push(TagSibling {
            shared_tags: shared,
            memory: store::get_memory(conn, &sibling_id)?,
        });
    }
    Ok(out)
}

/// Axis 3: memories in the same context, newest first.
fn context_sibling_axis(
    conn: &Connection,
    memory_id: &str,
    context: &str,
    limit: usize,
) -> Result<Vec<Memory>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM memories \
         WHERE context = ?1 AND id != ?2 \
         ORDER BY created_at DESC LIMIT ?3",
    )?;
    let ids = stmt
        .query_map(params![context, memory_id, limit as i64], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(store::get_memory(conn, &id)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::links::link_memories;
    use crate::memory::store::store_memory;
    use crate::memory::types::MemoryKind;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[dim % 384] = 1.0;
        v
    }

    fn insert(
        conn: &mut Connection,
        content: &str,
        context: Option<&str>,
        tags: &[&str],
        dim: usize,
    ) -> String {
        let tags: Vec<String> = tags.iter().map(|s| s.to_string()).collect();
        store_memory(
            conn,
            content,
            MemoryKind::Insight,
            context,
            &tags,
            None,
            None,
            &spike(dim),
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_explore_missing_center_is_not_found() {
        let conn = test_db();
        let err = explore_related(&conn, "ghost", &ExploreOptions::default()).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn test_linked_axis_carries_kind_and_reason() {
        let mut conn = test_db();
        let a = insert(&mut conn, "A", None, &[], 0);
        let b = insert(&mut conn, "B", None, &[], 1);
        link_memories(&mut conn, &a, &b, RelationKind::Extends, Some("expands on A")).unwrap();

        let response = explore_related(&conn, &a, &ExploreOptions::default()).unwrap();
        assert_eq!(response.linked.len(), 1);
        assert_eq!(response.linked[0].kind, RelationKind::Extends);
        assert_eq!(response.linked[0].reason.as_deref(), Some("expands on A"));
        assert_eq!(response.linked[0].memory.id, b);
    }

    #[test]
    fn test_tag_siblings_ranked_by_overlap() {
        let mut conn = test_db();
        let center = insert(&mut conn, "center", None, &["a", "b", "c"], 0);
        let two_shared = insert(&mut conn, "two shared", None, &["a", "b"], 1);
        let one_shared = insert(&mut conn, "one shared", None, &["c"], 2);
        let _none = insert(&mut conn, "no overlap", None, &["z"], 3);

        let response = explore_related(&conn, &center, &ExploreOptions::default()).unwrap();
        assert_eq!(response.by_tag.len(), 2);
        assert_eq!(response.by_tag[0].memory.id, two_shared);
        assert_eq!(response.by_tag[0].shared_tags, 2);
        assert_eq!(response.by_tag[1].memory.id, one_shared);
        assert_eq!(response.by_tag[1].shared_tags, 1);
    }

    #[test]
    fn test_context_siblings_newest_first() {
        let mut conn = test_db();
        let center = insert(&mut conn, "center", Some("proj"), &[], 0);
        let older = insert(&mut conn, "older", Some("proj"), &[], 1);
        let newer = insert(&mut conn, "newer", Some("proj"), &[], 2);
        let _other_ctx = insert(&mut conn, "elsewhere", Some("other"), &[], 3);

        // Make creation order explicit (UUIDv7 inserts can share a timestamp string)
        conn.execute(
            "UPDATE memories SET created_at = '2026-01-01T00:00:00Z' WHERE id = ?1",
            params![older],
        )
        .unwrap();
        conn.execute(
            "UPDATE memories SET created_at = '2026-02-01T00:00:00Z' WHERE id = ?1",
            params![newer],
        )
        .unwrap();

        let response = explore_related(&conn, &center, &ExploreOptions::default()).unwrap();
        let ids: Vec<&str> = response.by_context.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec![newer.as_str(), older.as_str()]);
    }

    #[test]
    fn test_axes_not_deduplicated_but_exclude_center() {
        let mut conn = test_db();
        let a = insert(&mut conn, "A", Some("svc"), &["db"], 0);
        let b = insert(&mut conn, "B", Some("svc"), &["db"], 1);
        link_memories(&mut conn, &a, &b, RelationKind::Extends, None).unwrap();

        let response = explore_related(&conn, &a, &ExploreOptions::default()).unwrap();

        // B shows up on all three axes
        assert_eq!(response.linked.len(), 1);
        assert_eq!(response.by_tag.len(), 1);
        assert_eq!(response.by_context.len(), 1);
        assert_eq!(response.linked[0].memory.id, b);
        assert_eq!(response.by_tag[0].memory.id, b);
        assert_eq!(response.by_context[0].id, b);

        // The center never appears on its own axes
        assert!(response.by_tag.iter().all(|s| s.memory.id != a));
        assert!(response.by_context.iter().all(|m| m.id != a));
    }

    #[test]
    fn test_axes_are_toggleable_and_capped() {
        let mut conn = test_db();
        let center = insert(&mut conn, "center", Some("proj"), &["t"], 0);
        for i in 1..=8 {
            insert(&mut conn, &format!("sibling {i}"), Some("proj"), &["t"], i);
        }

        let opts = ExploreOptions {
            include_links: false,
            include_tag_siblings: false,
            include_context_siblings: true,
            max_per_axis: 3,
        };
        let response = explore_related(&conn, &center, &opts).unwrap();
        assert!(response.linked.is_empty());
        assert!(response.by_tag.is_empty());
        assert_eq!(response.by_context.len(), 3);
    }
}
