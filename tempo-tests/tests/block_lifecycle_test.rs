/// Block lifecycle tests for TempoDB
///
/// Covers block numbering, idle ticks, within-block ordinals, and the
/// temporal expiry semantics of the half-open [from_block, to_block)
/// validity interval.

use tempo_api::{Query, Write};
use tempo_test_utils::{simple_write, TestDatabase};

fn write_with_lifetime(key: &str, expires_in: u64) -> tempo_core::WriteRequest {
    Write::new(key)
        .payload(b"body".as_ref())
        .content_type("text/plain")
        .owner("0xtest")
        .expires_in(expires_in)
        .build()
}

#[test]
fn test_blocks_number_consecutively() {
    let t = TestDatabase::new();

    let mut blocks = Vec::new();
    for i in 0..3 {
        t.db.write(simple_write(&format!("k{i}"))).unwrap();
        blocks.push(t.db.commit_pending().unwrap().unwrap());
    }

    assert_eq!(blocks[1], blocks[0] + 1);
    assert_eq!(blocks[2], blocks[1] + 1);
    assert_eq!(t.db.current_block().unwrap(), blocks[2]);
}

#[test]
fn test_idle_ticks_never_burn_block_numbers() {
    let t = TestDatabase::new();

    t.db.write(simple_write("a")).unwrap();
    let first = t.db.commit_pending().unwrap().unwrap();

    // Empty ticks in between.
    assert!(t.db.commit_pending().unwrap().is_none());
    assert!(t.db.commit_pending().unwrap().is_none());
    assert_eq!(t.db.current_block().unwrap(), first);

    t.db.write(simple_write("b")).unwrap();
    let second = t.db.commit_pending().unwrap().unwrap();
    assert_eq!(second, first + 1);
}

#[test]
fn test_all_writes_in_one_tick_share_a_block() {
    let t = TestDatabase::new();

    for i in 0..25 {
        t.db.write(simple_write(&format!("k{i}"))).unwrap();
    }
    let block = t.db.commit_pending().unwrap().unwrap();

    for i in 0..25 {
        let entity = t.db.get(&format!("k{i}")).unwrap().unwrap();
        assert_eq!(entity.created_at_block, block);
    }
}

#[test]
fn test_entity_expires_when_its_block_arrives() {
    let t = TestDatabase::new();

    // Lives for exactly one block past its commit block.
    t.commit(write_with_lifetime("ephemeral", 1));
    assert!(t.db.get("ephemeral").unwrap().is_some());

    // Closing the next block prunes it.
    t.commit(simple_write("trigger"));
    assert!(t.db.get("ephemeral").unwrap().is_none());
    assert!(t.db.get("trigger").unwrap().is_some());
}

#[test]
fn test_expiry_only_fires_on_block_commits() {
    let t = TestDatabase::new();

    t.commit(write_with_lifetime("pending-doom", 1));

    // Reads alone never prune; the entity stays until a block closes.
    for _ in 0..3 {
        assert!(t.db.get("pending-doom").unwrap().is_some());
        assert!(t.db.query(Query::new()).is_ok());
    }

    t.commit(simple_write("trigger"));
    assert!(t.db.get("pending-doom").unwrap().is_none());
}

#[test]
fn test_conditioned_and_unconditioned_visibility_windows() {
    let t = TestDatabase::new();

    // Committed at block B with to_block = B + 1: one block of life left.
    t.commit(
        Write::new("edge")
            .payload(b"body".as_ref())
            .content_type("text/plain")
            .owner("0xtest")
            .expires_in(1)
            .string_annotation("tag", "edge")
            .build(),
    );
    let block = t.db.current_block().unwrap();
    let entity = t.db.get("edge").unwrap().unwrap();
    assert_eq!(entity.expires_at, block + 1);

    // Conditioned query: valid while to_block > current.
    let hits = t.db.query(Query::new().string_eq("tag", "edge")).unwrap();
    assert_eq!(hits.len(), 1);

    // Unconditioned listing uses the tighter to_block - 1 > current window,
    // so an entity with one block of life left is already excluded there.
    let listed = t.db.query(Query::new()).unwrap();
    assert!(listed.iter().all(|e| e.key != "edge"));
}

#[test]
fn test_every_write_in_a_block_gets_a_receipt() {
    let t = TestDatabase::new();

    let ids: Vec<String> = (0..23)
        .map(|i| t.stage(simple_write(&format!("ord-{i:02}"))))
        .collect();
    let block = t.db.commit_pending().unwrap().unwrap();

    for id in &ids {
        let receipt = t.db.receipt(id).unwrap().unwrap();
        assert_eq!(receipt.created_at_block, block);
    }
}
