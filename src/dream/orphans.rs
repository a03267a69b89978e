//! Dream phase 2: orphan rescue.
//!
//! An orphan has no tags and no relations in either direction — invisible
//! to every traversal axis except raw vector search. Each orphan gets a
//! `related` edge to its single most-similar neighbor, unless nothing
//! clears the similarity floor.

use rusqlite::Connection;
use serde::Serialize;

use crate::error::Result;
use crate::memory::types::RelationKind;
use crate::memory::{cosine_similarity, links, recall};

#[derive(Debug, Serialize)]
pub struct RescueReport {
    pub orphans_found: u64,
    pub rescued: u64,
}

/// Run the orphan-rescue phase.
pub fn run(conn: &mut Connection, rescue_floor: f64) -> Result<RescueReport> {
    let orphans = find_orphans(conn)?;
    let embeddings = recall::all_embeddings(conn)?;

    let mut report = RescueReport {
        orphans_found: orphans.len() as u64,
        rescued: 0,
    };

    for orphan_id in &orphans {
        let Some(orphan_emb) = embeddings.get(orphan_id) else {
            continue;
        };

        // Single best neighbor across the rest of the corpus
        let mut best: Option<(&String, f64)> = None;
        for (other_id, other_emb) in &embeddings {
            if other_id == orphan_id {
                continue;
            }
            let similarity = cosine_similarity(orphan_emb, other_emb);
            let better = match best {
                Some((_, s)) => similarity > s,
                None => true,
            };
            if better {
                best = Some((other_id, similarity));
            }
        }

        let Some((target_id, similarity)) = best else {
            continue;
        };
        if similarity < rescue_floor {
            tracing::debug!(
                orphan = %&orphan_id[..8.min(orphan_id.len())],
                similarity,
                "no candidate above rescue floor"
            );
            continue;
        }

        links::link_memories(
            conn,
            orphan_id,
            target_id,
            RelationKind::Related,
            Some(&format!("dream: orphan rescue (similarity {similarity:.2})")),
        )?;
        report.rescued += 1;
        tracing::info!(
            orphan = %&orphan_id[..8.min(orphan_id.len())],
            target = %&target_id[..8.min(target_id.len())],
            similarity,
            "rescued orphan"
        );
    }

    Ok(report)
}

/// Memories with zero tags and zero relations in either direction.
fn find_orphans(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT m.id FROM memories m \
         WHERE NOT EXISTS (SELECT 1 FROM memory_tags t WHERE t.memory_id = m.id) \
           AND NOT EXISTS (SELECT 1 FROM relations r \
                           WHERE r.source_id = m.id OR r.target_id = m.id) \
         ORDER BY m.created_at",
    )?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(ids)
}
