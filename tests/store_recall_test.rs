mod helpers;

use helpers::{insert_memory, similar_embedding, test_db, test_embedding};
use reverie::memory::recall::{recall_memories, RecallFilter, RecallOptions};
use reverie::memory::store::{delete_memory, get_memory, store_memory, update_memory};
use reverie::memory::types::MemoryKind;
use rusqlite::params;

#[test]
fn stored_memory_recalls_itself_with_max_vector_score() {
    let mut conn = test_db();
    let emb = test_embedding(0);
    let id = insert_memory(
        &mut conn,
        "Use connection pooling",
        MemoryKind::Insight,
        Some("svc"),
        &["db"],
        &emb,
    );
    for seed in 1..6 {
        insert_memory(
            &mut conn,
            &format!("Unrelated memory {seed}"),
            MemoryKind::Note,
            None,
            &[],
            &test_embedding(seed * 40),
        );
    }

    // Querying with the stored embedding verbatim ranks it first with the
    // highest vector component in the corpus
    let response = recall_memories(
        &conn,
        &emb,
        &RecallFilter::default(),
        &RecallOptions {
            max_results: 10,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(response.results[0].memory.id, id);
    let top_vec = response.results[0].score.vector;
    for result in &response.results[1..] {
        assert!(result.score.vector <= top_vec);
    }
    assert!((top_vec - 1.0).abs() < 1e-4);
}

#[test]
fn recall_mutates_access_metadata_of_returned_only() {
    let mut conn = test_db();
    let emb = test_embedding(0);
    let returned = insert_memory(
        &mut conn,
        "Will be recalled",
        MemoryKind::Insight,
        None,
        &[],
        &emb,
    );
    let excluded = insert_memory(
        &mut conn,
        "Too far from the query",
        MemoryKind::Insight,
        None,
        &[],
        &test_embedding(200),
    );

    let before = |id: &str| -> (u64, Option<String>) {
        conn.query_row(
            "SELECT access_count, last_accessed FROM memories WHERE id = ?1",
            params![id],
            |row| Ok((row.get::<_, i64>(0)? as u64, row.get(1)?)),
        )
        .unwrap()
    };
    assert_eq!(before(&returned).0, 0);
    assert_eq!(before(&excluded).0, 0);

    let response = recall_memories(
        &conn,
        &emb,
        &RecallFilter::default(),
        &RecallOptions {
            max_results: 1,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].memory.id, returned);

    // access_count after >= before for everything, equality only for the
    // memory that was not returned
    assert_eq!(before(&returned).0, 1);
    assert_eq!(before(&excluded).0, 0);
}

#[test]
fn update_changes_content_and_embedding_together() {
    let mut conn = test_db();
    let id = insert_memory(
        &mut conn,
        "Original wording",
        MemoryKind::Note,
        None,
        &[],
        &test_embedding(0),
    );

    let new_emb = test_embedding(100);
    update_memory(&mut conn, &id, Some(("New wording", &new_emb)), None, None).unwrap();

    // The new embedding is what recall now sees
    let response = recall_memories(
        &conn,
        &new_emb,
        &RecallFilter::default(),
        &RecallOptions::default(),
    )
    .unwrap();
    assert_eq!(response.results[0].memory.id, id);
    assert!((response.results[0].score.vector - 1.0).abs() < 1e-4);
    assert_eq!(response.results[0].memory.content, "New wording");
}

#[test]
fn delete_removes_all_edges_keeps_tag_and_context_nodes() {
    let mut conn = test_db();
    let a = insert_memory(
        &mut conn,
        "Doomed memory",
        MemoryKind::Note,
        Some("proj"),
        &["keep-me"],
        &test_embedding(0),
    );
    let b = insert_memory(
        &mut conn,
        "Surviving memory",
        MemoryKind::Note,
        Some("proj"),
        &["keep-me"],
        &test_embedding(50),
    );
    reverie::memory::links::link_memories(
        &mut conn,
        &a,
        &b,
        reverie::memory::types::RelationKind::Extends,
        None,
    )
    .unwrap();
    reverie::memory::links::link_memories(
        &mut conn,
        &b,
        &a,
        reverie::memory::types::RelationKind::Related,
        None,
    )
    .unwrap();

    delete_memory(&mut conn, &a).unwrap();

    let relations: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM relations WHERE source_id = ?1 OR target_id = ?1",
            params![a],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(relations, 0);

    let tag_edges: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM memory_tags WHERE memory_id = ?1",
            params![a],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(tag_edges, 0);

    // Nodes survive
    let tags: i64 = conn
        .query_row("SELECT COUNT(*) FROM tags WHERE name = 'keep-me'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(tags, 1);
    let contexts: i64 = conn
        .query_row("SELECT COUNT(*) FROM contexts WHERE name = 'proj'", [], |r| {
            r.get(0)
        })
        .unwrap();
    assert_eq!(contexts, 1);

    assert!(get_memory(&conn, &a).is_err());
    assert!(get_memory(&conn, &b).is_ok());
}

#[test]
fn store_is_atomic_on_validation_failure() {
    let mut conn = test_db();
    // Bad dimension fails before anything is written
    let err = store_memory(
        &mut conn,
        "Partial write check",
        MemoryKind::Note,
        Some("ctx"),
        &["tag".into()],
        None,
        None,
        &vec![0.0f32; 10],
    )
    .unwrap_err();
    assert_eq!(err.code(), "invalid_argument");

    let memories: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
        .unwrap();
    let contexts: i64 = conn
        .query_row("SELECT COUNT(*) FROM contexts", [], |r| r.get(0))
        .unwrap();
    assert_eq!(memories, 0);
    assert_eq!(contexts, 0, "no partial graph construction");
}

#[test]
fn near_duplicates_both_stored_without_interactive_dedup() {
    // Deduplication is the dream worker's job; the interactive write path
    // stores both
    let mut conn = test_db();
    let base = test_embedding(0);
    let a = insert_memory(
        &mut conn,
        "Pin the CI runner image",
        MemoryKind::Insight,
        None,
        &[],
        &base,
    );
    let b = insert_memory(
        &mut conn,
        "Pin CI runner images",
        MemoryKind::Insight,
        None,
        &[],
        &similar_embedding(&base),
    );
    assert_ne!(a, b);

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 2);
}
