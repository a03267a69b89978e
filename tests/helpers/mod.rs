#![allow(dead_code)]

use reverie::db;
use reverie::memory::store::store_memory;
use reverie::memory::types::MemoryKind;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Deterministic 384-dim embedding with a spike at position `seed`.
/// Different seeds produce orthogonal vectors.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed % 384] = 1.0;
    v
}

/// Normalized embedding close to `base` (cosine ≈ 0.995).
pub fn similar_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    for i in 0..5 {
        v[(i * 37) % 384] += 0.04;
    }
    normalize(&mut v);
    v
}

/// Normalized embedding moderately close to `base` (cosine ≈ 0.8).
pub fn related_embedding(base: &[f32]) -> Vec<f32> {
    let mut v = base.to_vec();
    v[7] += 0.75;
    normalize(&mut v);
    v
}

fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Insert a memory and return its ID.
pub fn insert_memory(
    conn: &mut Connection,
    content: &str,
    kind: MemoryKind,
    context: Option<&str>,
    tags: &[&str],
    embedding: &[f32],
) -> String {
    let tags: Vec<String> = tags.iter().map(|s| s.to_string()).collect();
    store_memory(
        conn,
        content,
        kind,
        context,
        &tags,
        None,
        None,
        embedding,
    )
    .unwrap()
    .id
}

/// Backdate a memory's created_at (and updated_at) for ordering tests.
pub fn set_timestamps(conn: &Connection, id: &str, stamp: &str) {
    conn.execute(
        "UPDATE memories SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![stamp, id],
    )
    .unwrap();
}
