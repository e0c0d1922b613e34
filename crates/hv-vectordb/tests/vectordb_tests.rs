//! Integration tests for hv-vectordb: tables, hybrid search, persistence.

use hv_core::IndexConfig;
use hv_vectordb::{
    error::{ErrorKind, ResultCode, Status},
    BatchResult, DataType, DocOutcome, Document, EngineConfig, FieldDef, FieldValue, Filter, FilterMode,
    MetricType, Projection, SearchRequest, Selector, Table, TableManager, VectorDbError,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::TempDir;

fn manager() -> Arc<TableManager> {
    Arc::new(TableManager::new(EngineConfig::volatile()).unwrap())
}

/// Small segments and a low brute-force threshold so sealed HNSW segments
/// serve approximate searches.
fn segmented_config() -> EngineConfig {
    let mut config = EngineConfig::volatile();
    config.index = IndexConfig {
        segment_capacity: 16,
        brute_force_threshold: 8,
        ..IndexConfig::default()
    };
    config
}

fn doc(v: serde_json::Value) -> Document {
    Document::from_json(&v).unwrap()
}

fn price_table() -> Arc<Table> {
    let m = manager();
    let t = m
        .create_table("T", &[FieldDef::new("price", DataType::Float), FieldDef::vector("emb", 3)])
        .unwrap();
    let res = t.add(vec![
        doc(json!({"_id": "a", "price": 20, "emb": [1, 0, 0]})),
        doc(json!({"_id": "b", "price": 150, "emb": [0, 1, 0]})),
    ]);
    assert!(res.is_ok());
    t
}

fn point(i: usize) -> Vec<f32> {
    vec![(i % 7) as f32, (i / 7) as f32, (i % 3) as f32 * 0.5]
}

fn filled_table(n: usize) -> Table {
    let t = Table::create("pts", &[FieldDef::vector("emb", 3)], segmented_config()).unwrap();
    let docs = (0..n)
        .map(|i| Document::with_id(format!("p{i}")).field("emb", point(i)).field("n", i as i64))
        .collect();
    assert!(t.add(docs).is_ok());
    t
}

// ============================================================
// Reference scenarios
// ============================================================

#[test]
fn test_filtered_search_then_delete() {
    let t = price_table();
    let range = Filter::from_json(&json!({"op": "range", "field": "price", "gte": 10, "lte": 50})).unwrap();
    let request = SearchRequest::new("emb", vec![1.0, 0.0, 0.0])
        .metric(MetricType::L2)
        .top_n(1)
        .filter(range);

    let res = t.search(&request).unwrap();
    assert_eq!(res.ids(), vec!["a"]);
    assert_eq!(res.hits[0].score, 0.0);

    assert_eq!(t.delete(&Selector::id("a")).unwrap(), 1);
    let res = t.search(&request).unwrap();
    assert!(res.is_empty());
    assert_eq!(res.total, 0);
}

#[test]
fn test_unfiltered_search_ranks_by_distance() {
    let t = price_table();
    let res = t.search(&SearchRequest::new("emb", vec![0.0, 1.0, 0.0]).top_n(5)).unwrap();
    assert_eq!(res.ids(), vec!["b", "a"]);
    assert_eq!(res.hits[1].score, 2.0);
    assert_eq!(res.total, 2);
}

// ============================================================
// Document round trip
// ============================================================

#[test]
fn test_get_round_trips_all_kinds() {
    let m = manager();
    let t = m.create_table("docs", &[]).unwrap();
    let original = doc(json!({
        "_id": "x",
        "count": 3,
        "ratio": 2.5,
        "title": "hello",
        "tags": ["a", "b"],
        "emb": [0.25, -1.5]
    }));
    assert_eq!(t.add_one(original.clone()).unwrap(), "x");

    let got = t.get(&Selector::id("x"), &Projection::all()).unwrap();
    assert_eq!(got, vec![original]);
    assert_eq!(got[0].get("count"), Some(&FieldValue::Int(3)));
    assert_eq!(got[0].get("tags"), Some(&FieldValue::MultiString(vec!["a".into(), "b".into()])));
}

#[test]
fn test_get_absent_ids_are_skipped() {
    let t = price_table();
    let got = t.get(&Selector::ids(["zzz", "b", "nope"]), &Projection::all()).unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].id.as_deref(), Some("b"));
    assert_eq!(t.delete(&Selector::ids(["zzz"])).unwrap(), 0);
}

#[test]
fn test_schema_mismatch_rejected() {
    let t = price_table();
    let err = t.add_one(doc(json!({"_id": "c", "price": "cheap", "emb": [1, 1, 1]}))).unwrap_err();
    assert!(matches!(err, VectorDbError::SchemaMismatch { .. }));
    let err = t.add_one(doc(json!({"_id": "c", "emb": [1, 1]}))).unwrap_err();
    assert!(matches!(err, VectorDbError::DimensionMismatch { expected: 3, got: 2, .. }));
    assert_eq!(t.len(), 2);
}

// ============================================================
// Batch outcomes
// ============================================================

#[test]
fn test_batch_outcomes_follow_input_order() {
    let t = price_table();
    let res: BatchResult = t.add(vec![
        doc(json!({"_id": "c", "price": 1, "emb": [0, 0, 1]})),
        doc(json!({"_id": "d", "emb": [0, 1]})),
        doc(json!({"_id": "c", "price": 2, "emb": [0, 0, 1]})),
        doc(json!({"price": 3, "emb": [1, 1, 1]})),
    ]);
    assert_eq!(res.outcomes.len(), 4);
    assert!(matches!(&res.outcomes[0], DocOutcome::Added(id) if id == "c"));
    assert!(matches!(res.outcomes[1].error(), Some(VectorDbError::DimensionMismatch { .. })));
    assert!(matches!(res.outcomes[2].error(), Some(VectorDbError::DuplicateId(_))));
    assert!(res.outcomes[3].id().is_some());
    assert_eq!(res.added(), 2);
    assert_eq!(res.failures().map(|(i, _)| i).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(t.len(), 4);
}

// ============================================================
// Delete visibility
// ============================================================

#[test]
fn test_deleted_documents_never_returned() {
    let t = filled_table(100);
    let deleted: Vec<String> = (0..100).step_by(7).map(|i| format!("p{i}")).collect();
    assert_eq!(t.delete(&Selector::ids(deleted.clone())).unwrap(), deleted.len());

    for brute in [false, true] {
        let res = t
            .search(&SearchRequest::new("emb", point(0)).top_n(100).brute_force(brute))
            .unwrap();
        assert_eq!(res.len(), 100 - deleted.len());
        assert!(res.ids().iter().all(|id| !deleted.iter().any(|d| d == id)));
    }
    assert!(t.get(&Selector::ids(deleted), &Projection::all()).unwrap().is_empty());
}

#[test]
fn test_delete_by_filter() {
    let t = filled_table(30);
    let removed = t.delete(&Selector::Filter(Filter::between("n", 10.0, 19.0))).unwrap();
    assert_eq!(removed, 10);
    let res = t.search(&SearchRequest::new("emb", point(12)).top_n(30).brute_force(true)).unwrap();
    assert_eq!(res.len(), 20);
    assert!(!res.ids().contains(&"p12"));
}

// ============================================================
// Search properties
// ============================================================

#[test]
fn test_brute_force_search_is_deterministic() {
    let t = filled_table(80);
    let request = SearchRequest::new("emb", vec![2.5, 3.5, 0.5]).top_n(20).brute_force(true);
    let first = t.search(&request).unwrap();
    for _ in 0..5 {
        assert_eq!(t.search(&request).unwrap(), first);
    }
}

#[test]
fn test_approximate_and_exact_agree_on_self_match() {
    let t = filled_table(100);
    for i in [0usize, 13, 42, 77, 99] {
        let approx = t.search(&SearchRequest::new("emb", point(i)).top_n(1)).unwrap();
        let exact = t.search(&SearchRequest::new("emb", point(i)).top_n(1).brute_force(true)).unwrap();
        assert_eq!(approx.ids(), exact.ids());
        assert_eq!(approx.hits[0].score, 0.0);
        assert_eq!(exact.ids(), vec![format!("p{i}").as_str()]);
    }
}

#[test]
fn test_ties_break_by_insertion_order() {
    let m = manager();
    let t = m.create_table("ties", &[]).unwrap();
    for id in ["z", "y", "x"] {
        t.add_one(Document::with_id(id).field("emb", vec![1.0, 1.0])).unwrap();
    }
    let res = t.search(&SearchRequest::new("emb", vec![0.0, 0.0])).unwrap();
    assert_eq!(res.ids(), vec!["z", "y", "x"]);
}

#[test]
fn test_inner_product_ranks_descending() {
    let m = manager();
    let t = m.create_table("ip", &[]).unwrap();
    t.add(vec![
        doc(json!({"_id": "small", "emb": [1, 0]})),
        doc(json!({"_id": "large", "emb": [3, 0]})),
        doc(json!({"_id": "neg", "emb": [-2, 0]})),
    ]);
    let request = SearchRequest::new("emb", vec![1.0, 0.0]).metric_name("ip").unwrap();
    let res = t.search(&request).unwrap();
    assert_eq!(res.ids(), vec!["large", "small", "neg"]);
    assert_eq!(res.hits[0].score, 3.0);
    assert_eq!(res.hits[2].score, -2.0);
}

#[test]
fn test_weighted_multi_vector_doubles_score() {
    let m = manager();
    let t = m.create_table("mv", &[FieldDef::vector("a", 2), FieldDef::vector("b", 2)]).unwrap();
    t.add_one(doc(json!({"_id": "d", "a": [1, 2], "b": [1, 2]}))).unwrap();

    let single = t.search(&SearchRequest::new("a", vec![0.0, 0.0])).unwrap();
    let both = t
        .search(&SearchRequest::new("a", vec![0.0, 0.0]).add_query("b", vec![0.0, 0.0], 1.0))
        .unwrap();
    assert_eq!(single.hits[0].score, 5.0);
    assert_eq!(both.hits[0].score, 2.0 * single.hits[0].score);

    let weighted = t
        .search(&SearchRequest::new("a", vec![0.0, 0.0]).weight(0.5).add_query("b", vec![0.0, 0.0], 2.0))
        .unwrap();
    assert_eq!(weighted.hits[0].score, 12.5);
}

#[test]
fn test_score_range_is_inclusive() {
    let t = filled_table(21);
    // p0 = [0,0,0]; p1 = [1,0,0.5] and p7 = [0,1,0.5] both score 1.25 from the origin
    let res = t
        .search(&SearchRequest::new("emb", point(0)).top_n(50).score_range(Some(0.0), Some(1.25)))
        .unwrap();
    assert_eq!(res.ids(), vec!["p0", "p1", "p7"]);

    let res = t
        .search(&SearchRequest::new("emb", point(0)).top_n(50).score_range(Some(1.25), Some(1.25)))
        .unwrap();
    assert_eq!(res.ids(), vec!["p1", "p7"]);
}

#[test]
fn test_top_n_zero_and_empty_table() {
    let t = price_table();
    let res = t.search(&SearchRequest::new("emb", vec![1.0, 0.0, 0.0]).top_n(0)).unwrap();
    assert!(res.is_empty());

    let m = manager();
    let empty = m.create_table("empty", &[]).unwrap();
    let res = empty.search(&SearchRequest::new("nothing", vec![1.0])).unwrap();
    assert!(res.is_empty());
}

#[test]
fn test_search_validation_errors() {
    let t = price_table();
    let err = t.search(&SearchRequest::new("emb", vec![1.0])).unwrap_err();
    assert!(matches!(err, VectorDbError::DimensionMismatch { .. }));
    let err = t.search(&SearchRequest::new("missing", vec![1.0])).unwrap_err();
    assert!(matches!(err, VectorDbError::UnknownField(_)));
    let err = SearchRequest::new("emb", vec![1.0, 0.0, 0.0]).metric_name("cosine").unwrap_err();
    assert!(matches!(err, VectorDbError::InvalidMetric(_)));
    let err = t
        .search(&SearchRequest::new("emb", vec![1.0, 0.0, 0.0]).filter(Filter::term("price", ["x"])))
        .unwrap_err();
    assert!(matches!(err, VectorDbError::TypeMismatch { .. }));
}

#[test]
fn test_expired_deadline() {
    let t = filled_table(50);
    let err = t
        .search(&SearchRequest::new("emb", point(3)).timeout(std::time::Duration::ZERO))
        .unwrap_err();
    assert!(matches!(err, VectorDbError::DeadlineExceeded));
    assert_eq!(err.kind(), ErrorKind::Capacity);
}

// ============================================================
// Filters
// ============================================================

fn catalog_table() -> Table {
    let t = Table::create("catalog", &[FieldDef::vector("emb", 2)], EngineConfig::volatile()).unwrap();
    t.add(vec![
        doc(json!({"_id": "lo", "price": 10, "color": "red", "tags": ["sale"], "body": "The quick brown fox", "emb": [0, 0]})),
        doc(json!({"_id": "mid", "price": 20, "color": "blue", "tags": ["new", "sale"], "body": "A lazy dog sleeps", "emb": [1, 0]})),
        doc(json!({"_id": "hi", "price": 30, "color": "red", "tags": ["new"], "body": "Quick thinking, quick fox!", "emb": [2, 0]})),
    ]);
    t
}

fn matching(t: &Table, filter: Filter) -> Vec<String> {
    let res = t
        .search(&SearchRequest::new("emb", vec![0.0, 0.0]).top_n(10).filter(filter))
        .unwrap();
    res.ids().into_iter().map(String::from).collect()
}

#[test]
fn test_range_boundaries() {
    let t = catalog_table();
    assert_eq!(matching(&t, Filter::between("price", 10.0, 30.0)), vec!["lo", "mid", "hi"]);
    let open = Filter::from_json(&json!({"op": "range", "field": "price", "gt": 10, "lt": 30})).unwrap();
    assert_eq!(matching(&t, open), vec!["mid"]);
}

#[test]
fn test_term_text_and_combinators() {
    let t = catalog_table();
    assert_eq!(matching(&t, Filter::term("color", ["red"])), vec!["lo", "hi"]);
    assert_eq!(matching(&t, Filter::term("tags", ["new"])), vec!["mid", "hi"]);
    assert_eq!(matching(&t, Filter::text("body", "quick fox")), vec!["lo", "hi"]);

    let and = Filter::from_json(&json!({"op": "and", "conds": [
        {"op": "term", "field": "color", "conds": ["red"]},
        {"op": "range", "field": "price", "gte": 20}
    ]}))
    .unwrap();
    assert_eq!(matching(&t, and), vec!["hi"]);

    let or = Filter::Or(vec![Filter::term("color", ["blue"]), Filter::between("price", 30.0, 30.0)]);
    assert_eq!(matching(&t, or), vec!["mid", "hi"]);
}

#[test]
fn test_meta_filter_convention() {
    let t = catalog_table();
    let f = Filter::from_meta_filter(&json!({"color": "red", "mine_price": 10, "max_price": 30})).unwrap();
    assert_eq!(matching(&t, f), vec!["lo"]);
    let f = Filter::from_meta_filter(&json!({"price": 20})).unwrap();
    assert_eq!(matching(&t, f), vec!["mid"]);
}

#[test]
fn test_exclusive_filter_mode() {
    let t = catalog_table();
    let both = Filter::And(vec![Filter::term("color", ["red"]), Filter::between("price", 0.0, 100.0)]);
    let request = SearchRequest::new("emb", vec![0.0, 0.0]).filter(both);
    assert_eq!(t.search(&request).unwrap().len(), 2);
    let err = t.search(&request.filter_mode(FilterMode::Exclusive)).unwrap_err();
    assert!(matches!(err, VectorDbError::InvalidFilter(_)));
}

#[test]
fn test_filter_reaches_far_candidates() {
    let t = filled_table(200);
    t.update("p199", BTreeMap::from([("flag".to_string(), FieldValue::from("yes"))])).unwrap();
    let res = t
        .search(&SearchRequest::new("emb", point(0)).top_n(3).filter(Filter::term("flag", ["yes"])))
        .unwrap();
    assert_eq!(res.ids(), vec!["p199"]);
}

// ============================================================
// Projection
// ============================================================

#[test]
fn test_projection_include_exclude_pack() {
    let t = catalog_table();
    let got = t.get(&Selector::id("lo"), &Projection::include(["price", "color"])).unwrap();
    assert_eq!(got[0].fields.keys().collect::<Vec<_>>(), vec!["color", "price"]);

    let got = t.get(&Selector::id("lo"), &Projection::exclude(["emb", "body"])).unwrap();
    assert!(!got[0].fields.contains_key("emb"));
    assert!(got[0].fields.contains_key("tags"));

    let err = Projection::new(Some(vec!["price".into()]), Some(vec!["color".into()]), None).unwrap_err();
    assert!(matches!(err, VectorDbError::ConflictingProjection));

    let res = t
        .search(
            &SearchRequest::new("emb", vec![0.0, 0.0])
                .top_n(1)
                .exclude_fields(["emb"])
                .pack_fields(["price"]),
        )
        .unwrap();
    assert_eq!(res.hits[0].fields.keys().collect::<Vec<_>>(), vec!["price"]);

    let err = t
        .search(&SearchRequest::new("emb", vec![0.0, 0.0]).include_fields(["price"]).exclude_fields(["emb"]))
        .unwrap_err();
    assert!(matches!(err, VectorDbError::ConflictingProjection));
}

// ============================================================
// Update / upsert
// ============================================================

#[test]
fn test_update_merges_fields() {
    let t = price_table();
    t.update("a", BTreeMap::from([("price".to_string(), FieldValue::Int(25)), ("note".to_string(), "x".into())]))
        .unwrap();
    let got = t.get(&Selector::id("a"), &Projection::all()).unwrap();
    assert_eq!(got[0].get("price"), Some(&FieldValue::Int(25)));
    assert_eq!(got[0].get("note"), Some(&FieldValue::from("x")));
    assert_eq!(got[0].get("emb"), Some(&FieldValue::Vector(vec![1.0, 0.0, 0.0])));

    let err = t.update("ghost", BTreeMap::new()).unwrap_err();
    assert!(matches!(err, VectorDbError::DocumentNotFound(_)));

    let err = t
        .update("a", BTreeMap::from([("emb".to_string(), FieldValue::Vector(vec![1.0]))]))
        .unwrap_err();
    assert!(matches!(err, VectorDbError::DimensionMismatch { .. }));
    let got = t.get(&Selector::id("a"), &Projection::include(["emb"])).unwrap();
    assert_eq!(got[0].get("emb"), Some(&FieldValue::Vector(vec![1.0, 0.0, 0.0])));
}

#[test]
fn test_vector_update_is_searchable() {
    let t = price_table();
    t.update("a", BTreeMap::from([("emb".to_string(), FieldValue::Vector(vec![0.0, 0.0, 1.0]))]))
        .unwrap();
    let res = t.search(&SearchRequest::new("emb", vec![0.0, 0.0, 1.0]).top_n(1)).unwrap();
    assert_eq!(res.ids(), vec!["a"]);
    assert_eq!(res.hits[0].score, 0.0);
    let old = t.search(&SearchRequest::new("emb", vec![1.0, 0.0, 0.0])).unwrap();
    assert_eq!(old.len(), 2);
    assert!(old.hits.iter().all(|h| h.score > 0.0));
}

#[test]
fn test_upsert_replaces_or_adds() {
    let t = price_table();
    t.upsert(doc(json!({"_id": "a", "emb": [0, 0, 1], "label": "new"}))).unwrap();
    let got = t.get(&Selector::id("a"), &Projection::all()).unwrap();
    assert!(got[0].get("price").is_none());
    assert_eq!(got[0].get("label"), Some(&FieldValue::from("new")));

    assert_eq!(t.upsert(doc(json!({"_id": "c", "emb": [1, 1, 1]}))).unwrap(), "c");
    assert_eq!(t.len(), 3);
    let res = t.search(&SearchRequest::new("emb", vec![0.0, 0.0, 1.0]).top_n(1)).unwrap();
    assert_eq!(res.ids(), vec!["a"]);
}

// ============================================================
// Table manager, session and persistence
// ============================================================

#[test]
fn test_session_targets_current_table() {
    let m = manager();
    let mut s = m.session();
    s.create_table("one", &[]).unwrap();
    s.add(vec![doc(json!({"_id": "d1", "emb": [1, 0]}))]).unwrap();
    s.create_table("two", &[]).unwrap();
    assert_eq!(s.current_table(), Some("two"));
    assert!(s.get(&Selector::id("d1"), &Projection::all()).unwrap().is_empty());

    s.use_table("one").unwrap();
    assert_eq!(s.get(&Selector::id("d1"), &Projection::all()).unwrap().len(), 1);
    assert_eq!(s.search(&SearchRequest::new("emb", vec![1.0, 0.0])).unwrap().ids(), vec!["d1"]);
    assert_eq!(s.list_tables(), vec!["one", "two"]);
}

#[test]
fn test_persist_and_load_round_trip() {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let original = doc(json!({"_id": "a", "price": 20, "ratio": 0.5, "tags": ["x"], "emb": [0.1, 0.2, 0.3]}));
    {
        let m = Arc::new(TableManager::new(EngineConfig::persistent(&root)).unwrap());
        let t = m.create_table("docs", &[FieldDef::vector("emb", 3)]).unwrap();
        t.add(vec![original.clone(), doc(json!({"_id": "b", "price": 40, "emb": [1, 1, 1]}))]);
        t.delete(&Selector::id("b")).unwrap();
        m.close().unwrap();
    }
    assert!(root.join("docs").join("table_meta.json").exists());
    assert!(root.join("docs").join("vectors").join("emb.bin").exists());

    let m = Arc::new(TableManager::new(EngineConfig::persistent(&root)).unwrap());
    assert!(matches!(m.create_table("docs", &[]), Err(VectorDbError::TableAlreadyExists(_))));

    let mut s = m.session();
    let t = s.load_table("docs", &root, Some("embed-v2")).unwrap();
    assert_eq!(s.current_table(), Some("docs"));
    assert_eq!(t.model_name().as_deref(), Some("embed-v2"));
    assert_eq!(t.len(), 1);
    assert_eq!(t.get(&Selector::id("a"), &Projection::all()).unwrap(), vec![original]);
    let res = t.search(&SearchRequest::new("emb", vec![0.1, 0.2, 0.3])).unwrap();
    assert_eq!(res.ids(), vec!["a"]);
    assert_eq!(res.hits[0].score, 0.0);

    // new rows never reuse persisted ones
    let id = t.add_one(doc(json!({"emb": [0, 0, 0]}))).unwrap();
    assert_eq!(t.search(&SearchRequest::new("emb", vec![0.0, 0.0, 0.0]).top_n(1)).unwrap().ids(), vec![id.as_str()]);

    assert!(matches!(
        m.load_table("docs", &root, None),
        Err(VectorDbError::TableAlreadyExists(_))
    ));
    assert!(matches!(
        m.load_table("nope", &root, None),
        Err(VectorDbError::TableNotFound(_))
    ));
}

#[test]
fn test_drop_table_removes_directory() {
    let tmp = TempDir::new().unwrap();
    let m = TableManager::new(EngineConfig::persistent(tmp.path())).unwrap();
    m.create_table("gone", &[]).unwrap();
    assert!(tmp.path().join("gone").exists());
    m.drop_table("gone").unwrap();
    assert!(!tmp.path().join("gone").exists());
    assert!(m.list_tables().is_empty());
}

#[test]
fn test_corrupt_record_is_skipped_on_load() {
    let tmp = TempDir::new().unwrap();
    {
        let m = TableManager::new(EngineConfig::persistent(tmp.path())).unwrap();
        let t = m.create_table("t", &[]).unwrap();
        t.add(vec![doc(json!({"_id": "ok", "n": 1}))]);
    }
    let records = tmp.path().join("t").join("records.json");
    let mut raw: Vec<serde_json::Value> = serde_json::from_slice(&std::fs::read(&records).unwrap()).unwrap();
    raw.push(json!({"row_id": "not a number"}));
    std::fs::write(&records, serde_json::to_vec(&raw).unwrap()).unwrap();

    let m = TableManager::new(EngineConfig::volatile()).unwrap();
    let t = m.load_table("t", tmp.path(), None).unwrap();
    assert_eq!(t.len(), 1);
}

#[test]
fn test_invalid_table_definitions() {
    let m = manager();
    let err = m.create_table("bad", &[FieldDef::new("emb", DataType::Vector)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    let err = m.create_table("bad", &[FieldDef::new("_id", DataType::String)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(m.create_table("a/b", &[]).is_err());
    assert!(m.list_tables().is_empty());
}

#[test]
fn test_config_from_json_drives_engine() {
    let config = EngineConfig::from_json_str(r#"{"search": {"default_top_n": 2}}"#).unwrap();
    let m = Arc::new(TableManager::new(config).unwrap());
    let t = m.create_table("cfg", &[]).unwrap();
    for i in 0..5 {
        t.add_one(Document::with_id(format!("d{i}")).field("emb", vec![i as f32])).unwrap();
    }
    let res = t.search(&SearchRequest::new("emb", vec![0.0])).unwrap();
    assert_eq!(res.ids(), vec!["d0", "d1"]);
}

// ============================================================
// Status codes
// ============================================================

#[test]
fn test_status_codes() {
    let t = price_table();
    assert!(Status::from_result(&t.search(&SearchRequest::new("emb", vec![1.0, 0.0, 0.0]))).is_ok());

    let not_found = t.update("ghost", BTreeMap::new());
    assert_eq!(Status::from_result(&not_found).code, ResultCode::NotFound);

    let invalid = t.search(&SearchRequest::new("emb", vec![1.0]));
    let status = Status::from_result(&invalid);
    assert_eq!(status.code, ResultCode::ValidationError);
    assert!(status.message.contains("emb"));

    assert_eq!(VectorDbError::ConcurrentModification("a".into()).code(), ResultCode::ConcurrencyError);
    assert_eq!(ResultCode::CapacityError.to_string(), "capacity_error");
}
