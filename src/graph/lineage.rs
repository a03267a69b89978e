//! Directed lineage tracing through temporal relation edges.
//!
//! Answers "why is this the way it is" (backward, ancestors) and "what did
//! this lead to" (forward, descendants) by breadth-first traversal over a
//! caller-chosen subset of relation kinds. Cycles are a valid graph state:
//! a visited set guarantees each node is emitted at most once and the walk
//! terminates.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::memory::store;
use crate::memory::types::{MemoryKind, RelationKind};

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow outgoing edges: what descended from this memory.
    Forward,
    /// Follow incoming edges: what this memory descended from.
    Backward,
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(format!(
                "direction must be 'forward' or 'backward', got {other:?}"
            )),
        }
    }
}

/// One visited node in the lineage chain.
#[derive(Debug, Serialize)]
pub struct LineageNode {
    pub id: String,
    pub summary: String,
    pub kind: MemoryKind,
    pub created_at: String,
    /// Distance from the starting memory (the start itself is not emitted).
    pub depth: usize,
    /// The edge kind that reached this node.
    pub relation: RelationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LineageResponse {
    pub start_id: String,
    pub direction: String,
    pub chain: Vec<LineageNode>,
    pub max_depth_reached: usize,
}

/// Trace lineage from `memory_id`.
///
/// `kinds` restricts which edges are followed; `None` uses the temporal
/// defaults (evolved_from, caused_by, rejected_because, supersedes).
/// Returns an empty chain — not an error — when no matching edge exists at
/// depth 1. NotFound when the start id itself is missing.
pub fn trace_lineage(
    conn: &Connection,
    memory_id: &str,
    direction: Direction,
    kinds: Option<Vec<RelationKind>>,
    max_depth: usize,
) -> Result<LineageResponse> {
    if max_depth == 0 {
        return Err(Error::invalid("max_depth must be at least 1"));
    }

    // Verify the start exists before walking
    store::get_memory(conn, memory_id)?;

    let kinds = kinds.unwrap_or_else(RelationKind::lineage_defaults);

    let mut chain: Vec<LineageNode> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(memory_id.to_string());

    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((memory_id.to_string(), 0));

    let mut max_depth_reached = 0;

    while let Some((current, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }

        for (next_id, kind, reason) in neighbors(conn, &current, direction, &kinds)? {
            if !visited.insert(next_id.clone()) {
                continue; // cycle or diamond — already emitted
            }

            let memory = store::get_memory(conn, &next_id)?;
            let node_depth = depth + 1;
            max_depth_reached = max_depth_reached.max(node_depth);

            chain.push(LineageNode {
                id: memory.id.clone(),
                summary: memory.summary,
                kind: memory.kind,
                created_at: memory.created_at,
                depth: node_depth,
                relation: kind,
                reason,
            });

            queue.push_back((next_id, node_depth));
        }
    }

    Ok(LineageResponse {
        start_id: memory_id.to_string(),
        direction: match direction {
            Direction::Forward => "forward".to_string(),
            Direction::Backward => "backward".to_string(),
        },
        chain,
        max_depth_reached,
    })
}

/// Edges out of (forward) or into (backward) a node, restricted to `kinds`.
fn neighbors(
    conn: &Connection,
    memory_id: &str,
    direction: Direction,
    kinds: &[RelationKind],
) -> Result<Vec<(String, RelationKind, Option<String>)>> {
    let sql = match direction {
        Direction::Forward => {
            "SELECT target_id, kind, reason FROM relations \
             WHERE source_id = ?1 ORDER BY created_at"
        }
        Direction::Backward => {
            "SELECT source_id, kind, reason FROM relations \
             WHERE target_id = ?1 ORDER BY created_at"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![memory_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut out = Vec::new();
    for (id, kind_str, reason) in rows {
        let kind = RelationKind::parse(&kind_str).map_err(Error::Internal)?;
        if kinds.contains(&kind) {
            out.push((id, kind, reason));
        }
    }
    Ok(out)
}
