//! Dream phase 1: deduplication.
//!
//! All-pairs cosine over the full corpus; pairs at or above the threshold
//! get a `supersedes` edge from the newer memory to the older one, unless
//! one already exists in either direction. All-pairs is fine at the target
//! scale (low tens of thousands); [`candidate_pairs`] is the seam to swap
//! in an index-assisted nearest-neighbor scan later.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::memory::types::RelationKind;
use crate::memory::{cosine_similarity, links, recall};

#[derive(Debug, Serialize)]
pub struct DedupReport {
    pub pairs_checked: u64,
    pub edges_created: u64,
}

/// Run the deduplication phase.
pub fn run(conn: &mut Connection, similarity_threshold: f64) -> Result<DedupReport> {
    let rows = load_created_at(conn)?;
    let embeddings = recall::all_embeddings(conn)?;

    let mut report = DedupReport {
        pairs_checked: 0,
        edges_created: 0,
    };

    for (a, b, similarity) in candidate_pairs(&rows, &embeddings, similarity_threshold) {
        report.pairs_checked += 1;

        if links::linked_either_direction(
            conn,
            &a,
            &b,
            Some(&[RelationKind::Supersedes]),
        )? {
            continue;
        }

        // Newer supersedes older; created_at is RFC 3339 so string order is
        // chronological, with the id as a deterministic tiebreak.
        let (newer, older) = order_pair(&rows, &a, &b);

        links::link_memories(
            conn,
            &newer,
            &older,
            RelationKind::Supersedes,
            Some(&format!(
                "dream: near-duplicate (similarity {similarity:.2})"
            )),
        )?;
        report.edges_created += 1;
        tracing::info!(
            newer = %&newer[..8.min(newer.len())],
            older = %&older[..8.min(older.len())],
            similarity,
            "flagged near-duplicate"
        );
    }

    Ok(report)
}

/// Yield (a, b, similarity) for every unordered pair at/above the threshold.
///
/// O(N²) by design at current scale; replace with an ANN-backed scan when
/// the corpus outgrows it.
fn candidate_pairs(
    rows: &HashMap<String, String>,
    embeddings: &HashMap<String, Vec<f32>>,
    threshold: f64,
) -> Vec<(String, String, f64)> {
    let mut ids: Vec<&String> = rows.keys().collect();
    ids.sort(); // deterministic order

    let mut pairs = Vec::new();
    for (i, a) in ids.iter().enumerate() {
        for b in ids.iter().skip(i + 1) {
            let (Some(ea), Some(eb)) = (embeddings.get(*a), embeddings.get(*b)) else {
                continue;
            };
            let similarity = cosine_similarity(ea, eb);
            if similarity >= threshold {
                pairs.push(((*a).clone(), (*b).clone(), similarity));
            }
        }
    }
    pairs
}

fn load_created_at(conn: &Connection) -> Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT id, created_at FROM memories")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

/// Return (newer, older) by created_at, tie-broken by id.
fn order_pair(rows: &HashMap<String, String>, a: &str, b: &str) -> (String, String) {
    let ca = rows.get(a).map(String::as_str).unwrap_or("");
    let cb = rows.get(b).map(String::as_str).unwrap_or("");
    match ca.cmp(cb).then_with(|| a.cmp(b)) {
        std::cmp::Ordering::Greater => (a.to_string(), b.to_string()),
        _ => (b.to_string(), a.to_string()),
    }
}
