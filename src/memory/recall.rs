//! Read path — vector KNN plus hybrid scoring.
//!
//! [`recall_memories`] is the single entry point: ANN search over the vec0
//! table, hydrate candidate rows, post-filter by context/tags/kind, rank by
//! the hybrid score, then touch access metadata for everything returned.
//! Recall is deliberately not read-only — returned memories get their
//! `access_count` bumped and `last_accessed` set to the query time, which
//! feeds the recency/frequency components of future recalls.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;

use crate::error::Result;
use crate::memory::types::{Memory, MemoryKind};
use crate::scoring::{self, ScoreBreakdown, ScoreWeights};

/// Post-filters applied after the ANN search.
#[derive(Debug, Default, Clone)]
pub struct RecallFilter {
    pub context: Option<String>,
    /// All listed tags must be present (normalized lowercase).
    pub tags: Vec<String>,
    pub kind: Option<MemoryKind>,
}

/// Scoring and sizing knobs for one recall call.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    pub max_results: usize,
    pub weights: ScoreWeights,
    pub recency_half_life_days: f64,
    pub frequency_saturation: u64,
    /// Disable access tracking (used by internal scans that must not skew
    /// the frequency signal).
    pub touch: bool,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            weights: ScoreWeights::default(),
            recency_half_life_days: 30.0,
            frequency_saturation: 100,
            touch: true,
        }
    }
}

/// A single recall result with its full score breakdown.
#[derive(Debug, Serialize)]
pub struct RecallResult {
    #[serde(flatten)]
    pub memory: Memory,
    /// Component-level scores so callers can explain the ranking.
    pub score: ScoreBreakdown,
}

/// Response from a recall call.
#[derive(Debug, Serialize)]
pub struct RecallResponse {
    pub results: Vec<RecallResult>,
    /// Candidates that survived filtering, before the result cap.
    pub total_matched: usize,
}

/// Hybrid recall: ANN candidates → hydrate → filter → score → cap → touch.
pub fn recall_memories(
    conn: &Connection,
    query_embedding: &[f32],
    filter: &RecallFilter,
    opts: &RecallOptions,
) -> Result<RecallResponse> {
    super::store::check_dimension(query_embedding)?;

    // Over-fetch so post-filtering still leaves enough candidates.
    let candidate_limit = (opts.max_results * 4).max(50);
    let candidates = vector_search(conn, query_embedding, candidate_limit)?;

    let now = chrono::Utc::now();
    let mut scored: Vec<RecallResult> = Vec::new();

    for (id, distance) in &candidates {
        let mut memory = match super::store::get_memory(conn, id) {
            Ok(m) => m,
            // The vec row can outlive its memory row only mid-write; skip.
            Err(crate::error::Error::NotFound(_)) => continue,
            Err(e) => return Err(e),
        };

        if !matches_filter(&memory, filter) {
            continue;
        }

        let similarity = super::l2_to_cosine(*distance);
        let days_since_access = days_since(&memory, now);
        let recency = scoring::recency_score(days_since_access, opts.recency_half_life_days);
        let frequency =
            scoring::frequency_score(memory.access_count, opts.frequency_saturation);
        let breakdown = scoring::hybrid_score(
            &opts.weights,
            similarity,
            recency,
            frequency,
            memory.frustration,
        );

        // Tags were loaded by get_memory; keep them in the response
        memory.tags.sort();
        scored.push(RecallResult {
            memory,
            score: breakdown,
        });
    }

    scored.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let total_matched = scored.len();
    scored.truncate(opts.max_results);

    if opts.touch {
        let ids: Vec<&str> = scored.iter().map(|r| r.memory.id.as_str()).collect();
        touch_memories(conn, &ids)?;
        // Reflect the touch in the returned records
        let now_str = now.to_rfc3339();
        for result in &mut scored {
            result.memory.access_count += 1;
            result.memory.last_accessed = Some(now_str.clone());
        }
    }

    Ok(RecallResponse {
        results: scored,
        total_matched,
    })
}

/// Raw ANN search over the memory vectors. Returns (id, L2 distance) pairs
/// ordered nearest-first.
pub fn vector_search(
    conn: &Connection,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<(String, f64)>> {
    let embedding_bytes = super::embedding_to_bytes(embedding);
    let mut stmt = conn.prepare(
        "SELECT id, distance FROM memories_vec \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let results = stmt
        .query_map(params![embedding_bytes, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(results)
}

/// Load all memory embeddings keyed by id. Used by the dream worker and the
/// curiosity scan, which need all-pairs similarity rather than KNN.
pub fn all_embeddings(conn: &Connection) -> Result<HashMap<String, Vec<f32>>> {
    let mut stmt = conn.prepare("SELECT id, embedding FROM memories_vec")?;
    let rows = stmt
        .query_map([], |row| {
            let bytes: Vec<u8> = row.get(1)?;
            Ok((row.get::<_, String>(0)?, super::bytes_to_embedding(&bytes)))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().collect())
}

/// Bump access metadata for returned results.
fn touch_memories(conn: &Connection, ids: &[&str]) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let now = chrono::Utc::now().to_rfc3339();
    let mut stmt = conn.prepare(
        "UPDATE memories SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
    )?;
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}

fn matches_filter(memory: &Memory, filter: &RecallFilter) -> bool {
    if let Some(ctx) = &filter.context {
        if memory.context.as_deref() != Some(ctx.as_str()) {
            return false;
        }
    }
    if let Some(kind) = &filter.kind {
        if &memory.kind != kind {
            return false;
        }
    }
    for tag in &filter.tags {
        let tag = tag.to_lowercase();
        if !memory.tags.iter().any(|t| t == &tag) {
            return false;
        }
    }
    true
}

/// Days since the memory was last accessed, falling back to creation time.
fn days_since(memory: &Memory, now: chrono::DateTime<chrono::Utc>) -> f64 {
    let stamp = memory
        .last_accessed
        .as_deref()
        .unwrap_or(memory.created_at.as_str());
    match chrono::DateTime::parse_from_rfc3339(stamp) {
        Ok(parsed) => {
            let secs = (now - parsed.with_timezone(&chrono::Utc)).num_seconds();
            secs as f64 / 86_400.0
        }
        Err(_) => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::store_memory;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn spike(dim: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 384];
        v[dim % 384] = 1.0;
        v
    }

    /// Normalized vector close to `base` (cosine ≈ 0.995).
    fn near(base: &[f32]) -> Vec<f32> {
        let mut v = base.to_vec();
        v[1] += 0.1;
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }

    fn insert(
        conn: &mut Connection,
        content: &str,
        context: Option<&str>,
        tags: &[&str],
        emb: &[f32],
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
            emb,
        )
        .unwrap()
        .id
    }

    #[test]
    fn test_recall_ranks_exact_match_first() {
        let mut conn = test_db();
        let id_a = insert(&mut conn, "About Rust", None, &[], &spike(0));
        let _id_b = insert(&mut conn, "About Python", None, &[], &spike(100));

        let response = recall_memories(
            &conn,
            &spike(0),
            &RecallFilter::default(),
            &RecallOptions::default(),
        )
        .unwrap();

        assert!(!response.results.is_empty());
        assert_eq!(response.results[0].memory.id, id_a);
        // Self-similarity is the maximum vector component
        assert!((response.results[0].score.vector - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_recall_touches_returned_results_only() {
        let mut conn = test_db();
        let id_a = insert(&mut conn, "Close to the query", None, &[], &spike(0));
        let id_b = insert(&mut conn, "Also close", None, &[], &near(&spike(0)));
        let id_c = insert(&mut conn, "Far away", None, &[], &spike(200));

        let opts = RecallOptions {
            max_results: 2,
            ..Default::default()
        };
        let response =
            recall_memories(&conn, &spike(0), &RecallFilter::default(), &opts).unwrap();
        assert_eq!(response.results.len(), 2);

        let count = |id: &str| -> u64 {
            conn.query_row(
                "SELECT access_count FROM memories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(count(&id_a), 1);
        assert_eq!(count(&id_b), 1);
        // c was not returned, so untouched
        assert_eq!(count(&id_c), 0);

        // Returned records reflect the touch
        for r in &response.results {
            assert_eq!(r.memory.access_count, 1);
            assert!(r.memory.last_accessed.is_some());
        }
    }

    #[test]
    fn test_recall_touch_disabled() {
        let mut conn = test_db();
        let id = insert(&mut conn, "Untouched", None, &[], &spike(0));

        let opts = RecallOptions {
            touch: false,
            ..Default::default()
        };
        recall_memories(&conn, &spike(0), &RecallFilter::default(), &opts).unwrap();

        let count: u64 = conn
            .query_row(
                "SELECT access_count FROM memories WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_recall_filters_by_context() {
        let mut conn = test_db();
        let id_svc = insert(&mut conn, "In svc", Some("svc"), &[], &spike(0));
        let _other = insert(&mut conn, "In other", Some("other"), &[], &near(&spike(0)));

        let filter = RecallFilter {
            context: Some("svc".into()),
            ..Default::default()
        };
        let response =
            recall_memories(&conn, &spike(0), &filter, &RecallOptions::default()).unwrap();

        let ids: Vec<&str> = response.results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec![id_svc.as_str()]);
    }

    #[test]
    fn test_recall_filters_by_tags() {
        let mut conn = test_db();
        let id_db = insert(&mut conn, "Tagged db+postgres", None, &["db", "postgres"], &spike(0));
        let _id_other = insert(&mut conn, "Tagged db only", None, &["db"], &near(&spike(0)));

        let filter = RecallFilter {
            tags: vec!["db".into(), "postgres".into()],
            ..Default::default()
        };
        let response =
            recall_memories(&conn, &spike(0), &filter, &RecallOptions::default()).unwrap();

        let ids: Vec<&str> = response.results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec![id_db.as_str()]);
    }

    #[test]
    fn test_recall_filters_by_kind() {
        let mut conn = test_db();
        let failure = store_memory(
            &mut conn,
            "It broke",
            MemoryKind::Failure,
            None,
            &[],
            Some(0.0),
            None,
            &spike(0),
        )
        .unwrap();
        let _insight = insert(&mut conn, "It works like this", None, &[], &near(&spike(0)));

        let filter = RecallFilter {
            kind: Some(MemoryKind::Failure),
            ..Default::default()
        };
        let response =
            recall_memories(&conn, &spike(0), &filter, &RecallOptions::default()).unwrap();
        let ids: Vec<&str> = response.results.iter().map(|r| r.memory.id.as_str()).collect();
        assert_eq!(ids, vec![failure.id.as_str()]);
    }

    #[test]
    fn test_frustration_biases_ranking() {
        let mut conn = test_db();
        // Two memories equally distant from the query vector
        let query = spike(0);
        let emb = near(&query);
        let calm = store_memory(
            &mut conn,
            "Calm memory",
            MemoryKind::Note,
            None,
            &[],
            Some(0.0),
            None,
            &emb,
        )
        .unwrap();
        let painful = store_memory(
            &mut conn,
            "Painful memory",
            MemoryKind::Failure,
            None,
            &[],
            Some(1.0),
            None,
            &emb,
        )
        .unwrap();

        let response = recall_memories(
            &conn,
            &query,
            &RecallFilter::default(),
            &RecallOptions::default(),
        )
        .unwrap();

        let pos = |id: &str| {
            response
                .results
                .iter()
                .position(|r| r.memory.id == id)
                .unwrap()
        };
        assert!(pos(&painful.id) < pos(&calm.id));
    }

    #[test]
    fn test_recall_empty_store() {
        let conn = test_db();
        let response = recall_memories(
            &conn,
            &spike(0),
            &RecallFilter::default(),
            &RecallOptions::default(),
        )
        .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(response.total_matched, 0);
    }

    #[test]
    fn test_recall_rejects_bad_dimension() {
        let conn = test_db();
        let err = recall_memories(
            &conn,
            &vec![0.0f32; 10],
            &RecallFilter::default(),
            &RecallOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.code(), "invalid_argument");
    }

    #[test]
    fn test_score_breakdown_components_present() {
        let mut conn = test_db();
        insert(&mut conn, "Component check", None, &[], &spike(0));

        let response = recall_memories(
            &conn,
            &spike(0),
            &RecallFilter::default(),
            &RecallOptions::default(),
        )
        .unwrap();
        let score = &response.results[0].score;
        // Fresh memory: max recency, zero frequency
        assert!(score.recency > 0.99);
        assert_eq!(score.frequency, 0.0);
        assert!(score.total > 0.0);
        let expected = 0.5 * score.vector
            + 0.2 * score.recency
            + 0.15 * score.frequency
            + 0.15 * score.frustration;
        assert!((score.total - expected).abs() < 1e-9);
    }
}
