//! Dream phase 3: pattern mining.
//!
//! Clusters the corpus by shared tag and abstracts each qualifying cluster
//! into a Pattern node linked back to its instances. The clustering rule is
//! deliberately deterministic: tags are visited in sorted order, a memory
//! joins at most one new cluster per run, a cluster must reach the minimum
//! size and a mean-pairwise-cosine cohesion floor. A cluster whose centroid
//! matches an existing pattern (cosine ≥ 0.8) reinforces that pattern
//! instead of minting a duplicate; pattern confidence only ever goes up.
//!
//! A pattern's vector is its cluster centroid (not an embedding of the
//! synthesized text), so matching a future cluster against existing
//! patterns needs no embedding provider and is fully deterministic.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::error::Result;
use crate::memory::types::Memory;
use crate::memory::{cosine_similarity, embedding_to_bytes, l2_to_cosine, recall, store};

/// Centroid similarity at which a cluster reinforces an existing pattern.
const PATTERN_MATCH_THRESHOLD: f64 = 0.8;

/// Confidence ceiling; patterns never claim certainty.
const MAX_CONFIDENCE: f64 = 0.95;

/// Confidence added per newly linked instance when reinforcing.
const REINFORCE_STEP: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct MiningOptions {
    pub tag_filter: Option<String>,
    pub min_cluster_size: usize,
    pub cohesion_floor: f64,
}

#[derive(Debug, Serialize)]
pub struct MiningReport {
    pub clusters_found: u64,
    pub patterns_created: u64,
    pub patterns_reinforced: u64,
    pub memories_linked: u64,
}

/// Run the pattern-mining phase.
pub fn run(conn: &mut Connection, opts: &MiningOptions) -> Result<MiningReport> {
    let mut report = MiningReport {
        clusters_found: 0,
        patterns_created: 0,
        patterns_reinforced: 0,
        memories_linked: 0,
    };

    let embeddings = recall::all_embeddings(conn)?;
    let tag_groups = load_tag_groups(conn, opts.tag_filter.as_deref())?;
    let mut used: HashSet<String> = HashSet::new();

    for (tag, member_ids) in &tag_groups {
        let members: Vec<&String> = member_ids
            .iter()
            .filter(|id| !used.contains(*id) && embeddings.contains_key(*id))
            .collect();
        if members.len() < opts.min_cluster_size {
            continue;
        }

        let cohesion = mean_pairwise_cosine(&members, &embeddings);
        if cohesion < opts.cohesion_floor {
            tracing::debug!(tag, cohesion, "cluster below cohesion floor");
            continue;
        }

        report.clusters_found += 1;
        let centroid = centroid(&members, &embeddings);

        let linked = match find_matching_pattern(conn, &centroid)? {
            Some(pattern_id) => {
                let linked = link_instances(conn, &pattern_id, &members, cohesion)?;
                if linked > 0 {
                    reinforce_pattern(conn, &pattern_id, linked)?;
                    report.patterns_reinforced += 1;
                    tracing::info!(tag, pattern = %&pattern_id[..8], linked, "reinforced existing pattern");
                }
                linked
            }
            None => {
                let memories = hydrate(conn, &members)?;
                let content = synthesize_content(tag, &memories);
                let pattern_id = create_pattern(conn, &content, &centroid)?;
                let linked = link_instances(conn, &pattern_id, &members, cohesion)?;
                set_instance_state(
                    conn,
                    &pattern_id,
                    linked,
                    initial_confidence(members.len(), cohesion),
                )?;
                report.patterns_created += 1;
                tracing::info!(tag, pattern = %&pattern_id[..8], members = members.len(), "created pattern");
                linked
            }
        };
        report.memories_linked += linked;

        for id in members {
            used.insert(id.clone());
        }
    }

    Ok(report)
}

/// Initial confidence for a new pattern: half the cluster cohesion plus
/// 0.1 per instance beyond the first, capped. Tighter and larger clusters
/// both raise it.
fn initial_confidence(instance_count: usize, cohesion: f64) -> f64 {
    (0.5 * cohesion.clamp(0.0, 1.0) + 0.1 * (instance_count.saturating_sub(1)) as f64)
        .min(MAX_CONFIDENCE)
}

/// Tag → member ids, tags in sorted order for deterministic traversal.
fn load_tag_groups(
    conn: &Connection,
    tag_filter: Option<&str>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let mut stmt;
    let mut rows = match tag_filter {
        Some(tag) => {
            stmt = conn.prepare(
                "SELECT tag, memory_id FROM memory_tags WHERE tag = ?1 \
                 ORDER BY tag, memory_id",
            )?;
            stmt.query(params![tag.to_lowercase()])?
        }
        None => {
            stmt = conn.prepare(
                "SELECT tag, memory_id FROM memory_tags ORDER BY tag, memory_id",
            )?;
            stmt.query([])?
        }
    };

    while let Some(row) = rows.next()? {
        let tag: String = row.get(0)?;
        let memory_id: String = row.get(1)?;
        groups.entry(tag).or_default().push(memory_id);
    }
    Ok(groups)
}

fn mean_pairwise_cosine(
    members: &[&String],
    embeddings: &std::collections::HashMap<String, Vec<f32>>,
) -> f64 {
    let mut sum = 0.0;
    let mut count = 0u64;
    for (i, a) in members.iter().enumerate() {
        for b in members.iter().skip(i + 1) {
            sum += cosine_similarity(&embeddings[*a], &embeddings[*b]);
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// L2-normalized mean of the member embeddings.
fn centroid(
    members: &[&String],
    embeddings: &std::collections::HashMap<String, Vec<f32>>,
) -> Vec<f32> {
    let dim = embeddings[members[0]].len();
    let mut sum = vec![0.0f32; dim];
    for id in members {
        for (acc, x) in sum.iter_mut().zip(&embeddings[*id]) {
            *acc += x;
        }
    }
    let norm: f32 = sum.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        sum.iter_mut().for_each(|x| *x /= norm);
    }
    sum
}

/// Nearest existing pattern at/above the match threshold, if any.
fn find_matching_pattern(conn: &Connection, centroid: &[f32]) -> Result<Option<String>> {
    let bytes = embedding_to_bytes(centroid);
    let nearest: Option<(String, f64)> = conn
        .query_row(
            "SELECT id, distance FROM patterns_vec \
             WHERE embedding MATCH ?1 ORDER BY distance LIMIT 1",
            params![bytes],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(nearest.and_then(|(id, distance)| {
        if l2_to_cosine(distance) >= PATTERN_MATCH_THRESHOLD {
            Some(id)
        } else {
            None
        }
    }))
}

/// Attach instance edges, skipping ones that already exist. Returns the
/// number of newly attached instances.
fn link_instances(
    conn: &Connection,
    pattern_id: &str,
    members: &[&String],
    confidence: f64,
) -> Result<u64> {
    let now = chrono::Utc::now().to_rfc3339();
    let mut linked = 0u64;
    for id in members {
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO pattern_instances (pattern_id, memory_id, confidence, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![pattern_id, id, confidence, now],
        )?;
        linked += inserted as u64;
    }
    Ok(linked)
}

/// Raise confidence and instance count for newly linked instances.
/// Monotonic: confidence never decreases.
fn reinforce_pattern(conn: &Connection, pattern_id: &str, new_instances: u64) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE patterns SET \
         confidence = MIN(?1, confidence + ?2 * ?3), \
         instance_count = instance_count + ?3, \
         updated_at = ?4 \
         WHERE id = ?5",
        params![
            MAX_CONFIDENCE,
            REINFORCE_STEP,
            new_instances as i64,
            now,
            pattern_id
        ],
    )?;
    Ok(())
}

fn set_instance_state(
    conn: &Connection,
    pattern_id: &str,
    instance_count: u64,
    confidence: f64,
) -> Result<()> {
    conn.execute(
        "UPDATE patterns SET instance_count = ?1, confidence = ?2 WHERE id = ?3",
        params![instance_count as i64, confidence, pattern_id],
    )?;
    Ok(())
}

fn create_pattern(conn: &Connection, content: &str, centroid: &[f32]) -> Result<String> {
    store::check_dimension(centroid)?;

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let summary = first_line(content);

    conn.execute(
        "INSERT INTO patterns (id, content, summary, confidence, instance_count, created_at, updated_at) \
         VALUES (?1, ?2, ?3, 0.5, 0, ?4, ?4)",
        params![id, content, summary, now],
    )?;
    conn.execute(
        "INSERT INTO patterns_vec (id, embedding) VALUES (?1, ?2)",
        params![id, embedding_to_bytes(centroid)],
    )?;

    store::write_audit_log(
        conn,
        "dream",
        &id,
        Some(&serde_json::json!({"action": "pattern_created"})),
    )?;

    Ok(id)
}

fn first_line(content: &str) -> String {
    content.lines().next().unwrap_or("").to_string()
}

fn hydrate(conn: &Connection, ids: &[&String]) -> Result<Vec<Memory>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(store::get_memory(conn, id)?);
    }
    Ok(out)
}

/// Deterministic pattern text: dominant kind, common tags, representative
/// summaries from the first members in id order.
fn synthesize_content(tag: &str, members: &[Memory]) -> String {
    let mut kind_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for m in members {
        *kind_counts.entry(m.kind.as_str()).or_default() += 1;
    }
    // Sorted map iteration makes ties resolve alphabetically
    let mut dominant_kind = "insight";
    let mut dominant_count = 0usize;
    for (kind, count) in &kind_counts {
        if *count > dominant_count {
            dominant_kind = kind;
            dominant_count = *count;
        }
    }

    let mut tag_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for m in members {
        for t in &m.tags {
            *tag_counts.entry(t.as_str()).or_default() += 1;
        }
    }
    let threshold = members.len().div_ceil(2);
    let common_tags: Vec<&str> = tag_counts
        .iter()
        .filter(|(_, count)| **count >= threshold)
        .map(|(t, _)| *t)
        .collect();

    let mut lines = vec![
        format!("Pattern over tag '{tag}' ({} memories)", members.len()),
        String::new(),
        format!("Dominant kind: {dominant_kind}"),
        format!(
            "Common tags: {}",
            if common_tags.is_empty() {
                "none".to_string()
            } else {
                common_tags.join(", ")
            }
        ),
        String::new(),
        "Representative examples:".to_string(),
    ];
    for (i, m) in members.iter().take(5).enumerate() {
        lines.push(format!("{}. {}", i + 1, m.summary));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::store_memory;
    use crate::memory::types::MemoryKind;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    /// Normalized vector near the base spike; `i` varies the secondary dim.
    fn clustered(base_dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[base_dim] = 0.95;
        v[300 + i] = 0.31;
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }

    fn insert(conn: &mut Connection, content: &str, tags: &[&str], emb: &[f32]) -> String {
        let tags: Vec<String> = tags.iter().map(|s| s.to_string()).collect();
        store_memory(
            conn,
            content,
            MemoryKind::Insight,
            None,
            &tags,
            None,
            None,
            emb,
        )
        .unwrap()
        .id
    }

    fn opts() -> MiningOptions {
        MiningOptions {
            tag_filter: None,
            min_cluster_size: 3,
            cohesion_floor: 0.5,
        }
    }

    #[test]
    fn test_cluster_creates_pattern_with_instances() {
        let mut conn = test_db();
        for i in 0..3 {
            insert(
                &mut conn,
                &format!("Pooling insight number {i}"),
                &["db"],
                &clustered(0, i),
            );
        }

        let report = run(&mut conn, &opts()).unwrap();
        assert_eq!(report.clusters_found, 1);
        assert_eq!(report.patterns_created, 1);
        assert_eq!(report.memories_linked, 3);

        let (confidence, instance_count): (f64, i64) = conn
            .query_row(
                "SELECT confidence, instance_count FROM patterns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(instance_count, 3);
        // 0.5·cohesion + 0.1·(3−1), cohesion of this cluster ≈ 0.9
        assert!(confidence > 0.6 && confidence < 0.75, "got {confidence}");

        let instances: i64 = conn
            .query_row("SELECT COUNT(*) FROM pattern_instances", [], |r| r.get(0))
            .unwrap();
        assert_eq!(instances, 3);

        // Pattern text mentions the tag and the size
        let content: String = conn
            .query_row("SELECT content FROM patterns", [], |r| r.get(0))
            .unwrap();
        assert!(content.contains("tag 'db'"));
        assert!(content.contains("3 memories"));
    }

    #[test]
    fn test_small_cluster_is_skipped() {
        let mut conn = test_db();
        for i in 0..2 {
            insert(&mut conn, &format!("Only two {i}"), &["db"], &clustered(0, i));
        }

        let report = run(&mut conn, &opts()).unwrap();
        assert_eq!(report.clusters_found, 0);
        assert_eq!(report.patterns_created, 0);
    }

    #[test]
    fn test_incoherent_cluster_is_skipped() {
        let mut conn = test_db();
        // Shared tag but mutually orthogonal embeddings → cohesion 0
        for i in 0..3 {
            insert(
                &mut conn,
                &format!("Scattered {i}"),
                &["misc"],
                &{
                    let mut v = vec![0.0f32; 384];
                    v[i * 100] = 1.0;
                    v
                },
            );
        }

        let report = run(&mut conn, &opts()).unwrap();
        assert_eq!(report.clusters_found, 0);
    }

    #[test]
    fn test_second_run_reinforces_not_duplicates() {
        let mut conn = test_db();
        for i in 0..3 {
            insert(
                &mut conn,
                &format!("Stable cluster {i}"),
                &["db"],
                &clustered(0, i),
            );
        }
        run(&mut conn, &opts()).unwrap();

        let confidence_before: f64 = conn
            .query_row("SELECT confidence FROM patterns", [], |r| r.get(0))
            .unwrap();

        // Same corpus again: centroid matches the existing pattern, no new
        // instances, so nothing changes
        let second = run(&mut conn, &opts()).unwrap();
        assert_eq!(second.patterns_created, 0);
        assert_eq!(second.memories_linked, 0);

        let pattern_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM patterns", [], |r| r.get(0))
            .unwrap();
        assert_eq!(pattern_count, 1);

        let confidence_after: f64 = conn
            .query_row("SELECT confidence FROM patterns", [], |r| r.get(0))
            .unwrap();
        assert!(confidence_after >= confidence_before, "monotonic confidence");
    }

    #[test]
    fn test_new_member_reinforces_existing_pattern() {
        let mut conn = test_db();
        for i in 0..3 {
            insert(
                &mut conn,
                &format!("Growing cluster {i}"),
                &["db"],
                &clustered(0, i),
            );
        }
        run(&mut conn, &opts()).unwrap();

        let confidence_before: f64 = conn
            .query_row("SELECT confidence FROM patterns", [], |r| r.get(0))
            .unwrap();

        // A fourth member joins the cluster
        insert(&mut conn, "Growing cluster late", &["db"], &clustered(0, 3));
        let report = run(&mut conn, &opts()).unwrap();
        assert_eq!(report.patterns_created, 0);
        assert_eq!(report.patterns_reinforced, 1);
        assert_eq!(report.memories_linked, 1);

        let (confidence, instance_count): (f64, i64) = conn
            .query_row(
                "SELECT confidence, instance_count FROM patterns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(instance_count, 4);
        assert!(confidence > confidence_before);
        assert!(confidence <= MAX_CONFIDENCE);
    }

    #[test]
    fn test_tag_filter_restricts_mining() {
        let mut conn = test_db();
        for i in 0..3 {
            insert(&mut conn, &format!("DB {i}"), &["db"], &clustered(0, i));
        }
        for i in 0..3 {
            insert(&mut conn, &format!("Infra {i}"), &["infra"], &clustered(50, i));
        }

        let report = run(
            &mut conn,
            &MiningOptions {
                tag_filter: Some("db".into()),
                min_cluster_size: 3,
                cohesion_floor: 0.5,
            },
        )
        .unwrap();
        assert_eq!(report.clusters_found, 1);
        assert_eq!(report.patterns_created, 1);
    }

    #[test]
    fn test_memory_joins_one_cluster_per_run() {
        let mut conn = test_db();
        // Same three memories carry both tags; sorted tag order means "aaa"
        // claims them and "bbb" finds nothing left
        for i in 0..3 {
            insert(
                &mut conn,
                &format!("Doubly tagged {i}"),
                &["aaa", "bbb"],
                &clustered(0, i),
            );
        }

        let report = run(&mut conn, &opts()).unwrap();
        assert_eq!(report.clusters_found, 1);
        assert_eq!(report.patterns_created, 1);
    }

    #[test]
    fn test_initial_confidence_formula() {
        assert!((initial_confidence(1, 1.0) - 0.5).abs() < 1e-9);
        assert!((initial_confidence(3, 1.0) - 0.7).abs() < 1e-9);
        assert!((initial_confidence(3, 0.5) - 0.45).abs() < 1e-9);
        assert!((initial_confidence(6, 1.0) - 0.95).abs() < 1e-9, "capped");
        assert!((initial_confidence(60, 0.8) - 0.95).abs() < 1e-9);
        // More cohesive and bigger both mean more confident
        assert!(initial_confidence(4, 0.8) > initial_confidence(3, 0.8));
        assert!(initial_confidence(3, 0.9) > initial_confidence(3, 0.6));
    }
}
