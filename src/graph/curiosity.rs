//! Knowledge-quality scanning: contradictions, missing links, staleness.
//!
//! Three independent detectors run over the (optionally filtered) corpus.
//! Findings are suggestions, never auto-applied — each carries a
//! machine-actionable follow-up call the agent can choose to make.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::Result;
use crate::memory::types::{Memory, MemoryKind, RelationKind};
use crate::memory::{cosine_similarity, links, recall, store};

/// Keywords signalling a positive/working claim.
const POSITIVE_KEYWORDS: &[&str] = &[
    "works", "success", "solved", "fixed", "correct", "should", "always", "best",
    "recommended", "good", "great", "perfect",
];

/// Keywords signalling a negative/broken claim.
const NEGATIVE_KEYWORDS: &[&str] = &[
    "doesn't work", "failed", "broken", "wrong", "never", "avoid", "worst", "don't",
    "incorrect", "bad", "error", "bug",
];

/// Findings below this confidence are dropped.
const MIN_CONFIDENCE: f64 = 0.5;

/// Hard bound on the corpus slice scanned pairwise (newest first).
const MAX_SCAN_CORPUS: usize = 500;

/// Optional corpus filters for a scan.
#[derive(Debug, Default, Clone)]
pub struct ScanFilter {
    pub context: Option<String>,
    pub tags: Vec<String>,
}

/// Scan thresholds, usually sourced from [`crate::config::GraphConfig`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub contradiction_similarity: f64,
    pub link_similarity: f64,
    pub stale_days: u64,
    pub max_findings: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            contradiction_similarity: 0.70,
            link_similarity: 0.70,
            stale_days: 90,
            max_findings: 10,
        }
    }
}

/// A follow-up the agent may make to act on a finding. Never auto-executed.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedAction {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub reason: String,
    pub priority: String,
}

#[derive(Debug, Serialize)]
pub struct Contradiction {
    pub memory_a_id: String,
    pub memory_a_summary: String,
    pub memory_b_id: String,
    pub memory_b_summary: String,
    pub similarity: f64,
    pub confidence: f64,
    pub reason: String,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Serialize)]
pub struct SuggestedLink {
    pub source_id: String,
    pub target_id: String,
    pub strategy: String,
    /// "high" or "medium"
    pub confidence: String,
    pub reason: String,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Serialize)]
pub struct StaleMemory {
    pub memory_id: String,
    pub summary: String,
    pub days_since_update: i64,
    pub reason: String,
    pub suggested_action: SuggestedAction,
}

#[derive(Debug, Serialize)]
pub struct CuriosityReport {
    pub contradictions: Vec<Contradiction>,
    pub suggested_links: Vec<SuggestedLink>,
    pub stale: Vec<StaleMemory>,
    pub scan_summary: String,
}

/// Run all three detectors over the filtered corpus.
pub fn curiosity_scan(
    conn: &Connection,
    filter: &ScanFilter,
    opts: &ScanOptions,
) -> Result<CuriosityReport> {
    let corpus = load_corpus(conn, filter)?;
    let embeddings = recall::all_embeddings(conn)?;

    let contradictions = find_contradictions(conn, &corpus, &embeddings, opts)?;
    let suggested_links = find_suggested_links(conn, &corpus, &embeddings, opts)?;
    let stale = find_stale(conn, &corpus, opts)?;

    let scan_summary = summarize(&contradictions, &suggested_links, &stale);

    Ok(CuriosityReport {
        contradictions,
        suggested_links,
        stale,
        scan_summary,
    })
}

// ── Detector 1: contradictions ──────────────────────────────────────────────

fn find_contradictions(
    conn: &Connection,
    corpus: &[Memory],
    embeddings: &HashMap<String, Vec<f32>>,
    opts: &ScanOptions,
) -> Result<Vec<Contradiction>> {
    let mut findings = Vec::new();
    let mut checked: HashSet<(String, String)> = HashSet::new();

    'outer: for (i, a) in corpus.iter().enumerate() {
        for b in corpus.iter().skip(i + 1) {
            if findings.len() >= opts.max_findings {
                break 'outer;
            }

            let pair = ordered_pair(&a.id, &b.id);
            if !checked.insert(pair) {
                continue;
            }

            let similarity = match (embeddings.get(&a.id), embeddings.get(&b.id)) {
                (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
                _ => continue,
            };

            let mut confidence = 0.0;
            let mut reasons: Vec<String> = Vec::new();

            if kinds_oppose(&a.kind, &b.kind) {
                confidence += 0.4;
                reasons.push("success vs failure on the same topic".into());
            }

            if sentiment_opposes(&a.content, &b.content) {
                confidence += 0.4;
                reasons.push("contradictory sentiment in content".into());
            }

            if similarity >= opts.contradiction_similarity {
                confidence += 0.3;
                reasons.push(format!("high semantic overlap ({similarity:.2})"));
            }

            let shared: Vec<&String> = a.tags.iter().filter(|t| b.tags.contains(*t)).collect();
            if !shared.is_empty() {
                confidence += 0.1;
                reasons.push(format!(
                    "shared tags: {}",
                    shared
                        .iter()
                        .take(3)
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }

            if confidence < MIN_CONFIDENCE || reasons.is_empty() {
                continue;
            }

            // Already reconciled pairs are resolved, not findings
            if links::linked_either_direction(
                conn,
                &a.id,
                &b.id,
                Some(&[RelationKind::Contradicts, RelationKind::Supersedes]),
            )? {
                continue;
            }

            let reason = reasons.join("; ");
            findings.push(Contradiction {
                memory_a_id: a.id.clone(),
                memory_a_summary: a.summary.clone(),
                memory_b_id: b.id.clone(),
                memory_b_summary: b.summary.clone(),
                similarity,
                confidence: confidence.min(1.0),
                reason: reason.clone(),
                suggested_action: SuggestedAction {
                    tool: "link_memories".into(),
                    arguments: serde_json::json!({
                        "source_id": a.id,
                        "target_id": b.id,
                        "kind": "contradicts",
                        "reason": reason,
                    }),
                    reason: "record the contradiction, or supersede the outdated side".into(),
                    priority: "high".into(),
                },
            });
        }
    }

    Ok(findings)
}

fn kinds_oppose(a: &MemoryKind, b: &MemoryKind) -> bool {
    matches!(
        (a, b),
        (MemoryKind::Success, MemoryKind::Failure) | (MemoryKind::Failure, MemoryKind::Success)
    )
}

fn sentiment_opposes(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let a_pos = POSITIVE_KEYWORDS.iter().any(|k| a.contains(k));
    let a_neg = NEGATIVE_KEYWORDS.iter().any(|k| a.contains(k));
    let b_pos = POSITIVE_KEYWORDS.iter().any(|k| b.contains(k));
    let b_neg = NEGATIVE_KEYWORDS.iter().any(|k| b.contains(k));
    (a_pos && b_neg) || (a_neg && b_pos)
}

// ── Detector 2: suggested links ─────────────────────────────────────────────

fn find_suggested_links(
    conn: &Connection,
    corpus: &[Memory],
    embeddings: &HashMap<String, Vec<f32>>,
    opts: &ScanOptions,
) -> Result<Vec<SuggestedLink>> {
    let mut findings = Vec::new();

    'outer: for (i, a) in corpus.iter().enumerate() {
        for b in corpus.iter().skip(i + 1) {
            if findings.len() >= opts.max_findings {
                break 'outer;
            }

            // Any existing edge in either direction disqualifies the pair
            if links::linked_either_direction(conn, &a.id, &b.id, None)? {
                continue;
            }

            let shared: Vec<&String> = a.tags.iter().filter(|t| b.tags.contains(*t)).collect();

            let (strategy, confidence, reason) = if shared.len() >= 2 {
                (
                    "shared_tags",
                    "high",
                    format!(
                        "{} shared tags: {}",
                        shared.len(),
                        shared
                            .iter()
                            .take(3)
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
            } else if a.context.is_some() && a.context == b.context && a.kind == b.kind {
                (
                    "context_and_kind",
                    "medium",
                    format!(
                        "same context '{}' and kind '{}'",
                        a.context.as_deref().unwrap_or(""),
                        a.kind
                    ),
                )
            } else {
                let similarity = match (embeddings.get(&a.id), embeddings.get(&b.id)) {
                    (Some(ea), Some(eb)) => cosine_similarity(ea, eb),
                    _ => continue,
                };
                if similarity < opts.link_similarity {
                    continue;
                }
                (
                    "semantic_similarity",
                    "high",
                    format!("cosine similarity {similarity:.2}"),
                )
            };

            findings.push(SuggestedLink {
                source_id: a.id.clone(),
                target_id: b.id.clone(),
                strategy: strategy.into(),
                confidence: confidence.into(),
                reason: reason.clone(),
                suggested_action: SuggestedAction {
                    tool: "link_memories".into(),
                    arguments: serde_json::json!({
                        "source_id": a.id,
                        "target_id": b.id,
                        "kind": "related",
                        "reason": reason,
                    }),
                    reason: "connect related knowledge".into(),
                    priority: "medium".into(),
                },
            });
        }
    }

    Ok(findings)
}

// ── Detector 3: staleness ───────────────────────────────────────────────────

fn find_stale(
    conn: &Connection,
    corpus: &[Memory],
    opts: &ScanOptions,
) -> Result<Vec<StaleMemory>> {
    let now = chrono::Utc::now();
    let threshold = now - chrono::Duration::days(opts.stale_days as i64);
    let mut findings = Vec::new();

    for memory in corpus {
        if findings.len() >= opts.max_findings {
            break;
        }

        // Only review-worthy kinds; notes and logs age harmlessly
        if !matches!(memory.kind, MemoryKind::Insight | MemoryKind::Decision) {
            continue;
        }

        let updated = match chrono::DateTime::parse_from_rfc3339(&memory.updated_at) {
            Ok(t) => t.with_timezone(&chrono::Utc),
            Err(_) => continue,
        };
        if updated > threshold {
            continue;
        }

        // Superseded memories are resolved, not neglected
        let superseded =
            !links::incoming_links(conn, &memory.id, Some(&RelationKind::Supersedes))?.is_empty();
        if superseded {
            continue;
        }

        let days = (now - updated).num_days();
        findings.push(StaleMemory {
            memory_id: memory.id.clone(),
            summary: memory.summary.clone(),
            days_since_update: days,
            reason: format!(
                "this {} is {days} days old and has not been reviewed or superseded",
                memory.kind
            ),
            suggested_action: SuggestedAction {
                tool: "get_memory".into(),
                arguments: serde_json::json!({"memory_id": memory.id}),
                reason: "review whether this is still valid, then update or supersede".into(),
                priority: "medium".into(),
            },
        });
    }

    Ok(findings)
}

// ── Shared helpers ──────────────────────────────────────────────────────────

fn load_corpus(conn: &Connection, filter: &ScanFilter) -> Result<Vec<Memory>> {
    let mut sql = String::from(
        "SELECT id FROM memories m WHERE 1=1",
    );
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ctx) = &filter.context {
        sql.push_str(&format!(" AND m.context = ?{}", params_vec.len() + 1));
        params_vec.push(Box::new(ctx.clone()));
    }
    for tag in &filter.tags {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM memory_tags mt WHERE mt.memory_id = m.id AND mt.tag = ?{})",
            params_vec.len() + 1
        ));
        params_vec.push(Box::new(tag.to_lowercase()));
    }
    sql.push_str(&format!(" ORDER BY m.created_at DESC LIMIT {MAX_SCAN_CORPUS}"));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|b| b.as_ref()).collect();
    let ids = stmt
        .query_map(param_refs.as_slice(), |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut corpus = Vec::with_capacity(ids.len());
    for id in ids {
        corpus.push(store::get_memory(conn, &id)?);
    }
    Ok(corpus)
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

fn summarize(
    contradictions: &[Contradiction],
    links: &[SuggestedLink],
    stale: &[StaleMemory],
) -> String {
    let mut parts = Vec::new();
    if !contradictions.is_empty() {
        parts.push(format!(
            "{} potential contradiction(s)",
            contradictions.len()
        ));
    }
    if !links.is_empty() {
        parts.push(format!("{} suggested link(s)", links.len()));
    }
    if !stale.is_empty() {
        parts.push(format!("{} stale item(s) needing review", stale.len()));
    }
    if parts.is_empty() {
        "No notable findings. The knowledge base appears consistent.".to_string()
    } else {
        format!("Found {}.", parts.join(", "))
    }
}
