/// Attribute query tests for TempoDB
///
/// Covers owner filters, string and numeric conditions, operator boundaries,
/// condition intersection, pagination, and plan cache transparency.

use tempo_api::{Query, Write};
use tempo_test_utils::TestDatabase;

fn seed(t: &TestDatabase) {
    for (key, owner, tag, pri) in [
        ("a", "0xalice", "draft", 1.0),
        ("b", "0xalice", "final", 5.0),
        ("c", "0xbob", "draft", 5.0),
        ("d", "0xbob", "final", 9.0),
    ] {
        t.db.write(
            Write::new(key)
                .payload(b"body".as_ref())
                .content_type("text/plain")
                .owner(owner)
                .expires_in(100)
                .string_annotation("tag", tag)
                .numeric_annotation("pri", pri)
                .build(),
        )
        .unwrap();
    }
    t.db.commit_pending().unwrap().unwrap();
}

fn keys(mut entities: Vec<tempo_core::Entity>) -> Vec<String> {
    entities.sort_by(|a, b| a.key.cmp(&b.key));
    entities.into_iter().map(|e| e.key).collect()
}

#[test]
fn test_owner_filter() {
    let t = TestDatabase::new();
    seed(&t);

    let hits = t.db.query(Query::new().owner("0xalice")).unwrap();
    assert_eq!(keys(hits), vec!["a", "b"]);

    let hits = t.db.query(Query::new().owner("0xnobody")).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_string_equality() {
    let t = TestDatabase::new();
    seed(&t);

    let hits = t.db.query(Query::new().string_eq("tag", "draft")).unwrap();
    assert_eq!(keys(hits), vec!["a", "c"]);
}

#[test]
fn test_numeric_operator_boundaries() {
    let t = TestDatabase::new();
    seed(&t);

    let cases: [(Query, Vec<&str>); 6] = [
        (Query::new().number_gte("pri", 5.0), vec!["b", "c", "d"]),
        (Query::new().number_gte("pri", 6.0), vec!["d"]),
        (Query::new().number_gt("pri", 5.0), vec!["d"]),
        (Query::new().number_lte("pri", 5.0), vec!["a", "b", "c"]),
        (Query::new().number_ne("pri", 5.0), vec!["a", "d"]),
        (Query::new().number_eq("pri", 5.0), vec!["b", "c"]),
    ];
    for (query, expected) in cases {
        let hits = t.db.query(query.clone()).unwrap();
        assert_eq!(keys(hits), expected, "filter {:?}", query.filter());
    }
}

#[test]
fn test_conditions_intersect() {
    let t = TestDatabase::new();
    seed(&t);

    let hits = t
        .db
        .query(Query::new().string_eq("tag", "final").number_gte("pri", 6.0))
        .unwrap();
    assert_eq!(keys(hits), vec!["d"]);

    let hits = t
        .db
        .query(
            Query::new()
                .owner("0xalice")
                .string_eq("tag", "final")
                .number_eq("pri", 5.0),
        )
        .unwrap();
    assert_eq!(keys(hits), vec!["b"]);

    // Conditions that individually match but never together.
    let hits = t
        .db
        .query(Query::new().string_eq("tag", "draft").number_eq("pri", 9.0))
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_missing_attribute_matches_nothing() {
    let t = TestDatabase::new();
    seed(&t);

    let hits = t.db.query(Query::new().string_eq("missing", "x")).unwrap();
    assert!(hits.is_empty());
}

#[test]
fn test_unparseable_expression_is_dropped_not_fatal() {
    let t = TestDatabase::new();
    seed(&t);

    // The malformed clause vanishes; the remaining condition still applies.
    let hits = t
        .db
        .query(
            Query::new()
                .string_eq("tag", "draft")
                .number_expr("pri", "~~garbage"),
        )
        .unwrap();
    assert_eq!(keys(hits), vec!["a", "c"]);
}

#[test]
fn test_pagination_is_stable() {
    let t = TestDatabase::new();
    seed(&t);

    let page1 = t.db.query(Query::new().owner("0xbob").limit(1)).unwrap();
    let page2 = t
        .db
        .query(Query::new().owner("0xbob").limit(1).offset(1))
        .unwrap();

    assert_eq!(page1.len(), 1);
    assert_eq!(page2.len(), 1);
    assert_ne!(page1[0].key, page2[0].key);

    let empty = t
        .db
        .query(Query::new().owner("0xbob").limit(10).offset(2))
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn test_results_order_by_block_then_key() {
    let t = TestDatabase::new();

    for key in ["z-first", "a-second"] {
        t.commit(
            Write::new(key)
                .payload(b"body".as_ref())
                .content_type("text/plain")
                .owner("0xtest")
                .expires_in(100)
                .string_annotation("batch", "ordering")
                .build(),
        );
    }

    let hits = t
        .db
        .query(Query::new().string_eq("batch", "ordering"))
        .unwrap();
    // Older block first even though its key sorts later.
    assert_eq!(hits[0].key, "z-first");
    assert_eq!(hits[1].key, "a-second");
}

#[test]
fn test_plan_cache_reuses_structurally_equal_plans() {
    let t = TestDatabase::new();
    seed(&t);

    let before = t.db.cache_stats();
    let first = t.db.query(Query::new().number_gte("pri", 5.0)).unwrap();
    let second = t.db.query(Query::new().number_gte("pri", 9.0)).unwrap();
    let after = t.db.cache_stats();

    assert_eq!(keys(first), vec!["b", "c", "d"]);
    assert_eq!(keys(second), vec!["d"]);
    // Same shape, different literal: one compile, one hit.
    assert_eq!(after.misses, before.misses + 1);
    assert_eq!(after.hits, before.hits + 1);
}

#[test]
fn test_results_identical_with_cache_disabled() {
    let t = TestDatabase::new();
    seed(&t);

    let query = || Query::new().string_eq("tag", "final").number_gte("pri", 5.0);

    let cached = t.db.query(query()).unwrap();
    t.db.set_plan_cache_enabled(false);
    let uncached = t.db.query(query()).unwrap();
    assert_eq!(keys(cached), keys(uncached));
    assert_eq!(t.db.cache_stats().entries, 0);
}
