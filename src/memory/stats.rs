use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;

/// Response from memory_stats.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    pub by_kind: HashMap<String, u64>,
    pub total_contexts: u64,
    pub total_tags: u64,
    pub total_relations: u64,
    pub total_patterns: u64,
    pub top_tags: Vec<TagCount>,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagCount {
    pub name: String,
    pub count: u64,
}

/// Compute store statistics.
///
/// `db_path` is used for file size; pass None for in-memory databases.
pub fn memory_stats(conn: &Connection, db_path: Option<&Path>) -> Result<StatsResponse> {
    let total_memories: u64 =
        conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get::<_, i64>(0))? as u64;

    let mut by_kind = HashMap::new();
    {
        let mut stmt =
            conn.prepare("SELECT kind, COUNT(*) FROM memories GROUP BY kind")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?;
        for row in rows {
            let (kind, count) = row?;
            by_kind.insert(kind, count);
        }
    }

    let total_contexts: u64 =
        conn.query_row("SELECT COUNT(*) FROM contexts", [], |r| r.get::<_, i64>(0))? as u64;
    let total_tags: u64 =
        conn.query_row("SELECT COUNT(*) FROM tags", [], |r| r.get::<_, i64>(0))? as u64;
    let total_relations: u64 =
        conn.query_row("SELECT COUNT(*) FROM relations", [], |r| r.get::<_, i64>(0))? as u64;
    let total_patterns: u64 =
        conn.query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get::<_, i64>(0))? as u64;

    let top_tags = {
        let mut stmt = conn.prepare(
            "SELECT tag, COUNT(*) as n FROM memory_tags \
             GROUP BY tag ORDER BY n DESC, tag LIMIT 10",
        )?;
        let tags = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        tags
    };

    let (oldest_memory, newest_memory) = if total_memories > 0 {
        conn.query_row(
            "SELECT MIN(created_at), MAX(created_at) FROM memories",
            params![],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?
    } else {
        (None, None)
    };

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        total_memories,
        by_kind,
        total_contexts,
        total_tags,
        total_relations,
        total_patterns,
        top_tags,
        db_size_bytes,
        oldest_memory,
        newest_memory,
    })
}
