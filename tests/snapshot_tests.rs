/// Raw snapshot tests
///
/// Persistence boundary: only stored columns are serialized; computed
/// columns are re-derived after a load.
/// Run with: cargo test --test snapshot_tests

use framedb::{
    row_key, AttributeDecl, ComputeFn, DataType, DependencyDecl, FrameId, FrameSchema,
    FrameStore, IndexColumn, RawFrameSnapshot, RowPatch, RowSelector, UpdateOptions, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn register(store: &mut FrameStore, calls: &Arc<AtomicUsize>) -> FrameId {
    let counter = Arc::clone(calls);
    let double: ComputeFn = Arc::new(move |view| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(view
            .local("x")?
            .iter()
            .map(|v| Value::Float(v.as_f64().unwrap_or(0.0) * 2.0))
            .collect())
    });
    store
        .register(
            FrameSchema::new("point", [IndexColumn::new("id", DataType::Int)])
                .stored("x", DataType::Float, Value::Float(0.0))
                .computed(
                    "x2",
                    AttributeDecl::new(),
                    DependencyDecl::columns(["x"]),
                    double,
                ),
        )
        .unwrap()
}

#[test]
fn test_snapshot_round_trip_through_json() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut store = FrameStore::new();
    let fid = register(&mut store, &calls);
    store
        .update(
            fid,
            &[row_key([1i64])],
            &RowPatch::new().set("x", 2.0),
            UpdateOptions::default(),
        )
        .unwrap();
    store
        .update(
            fid,
            &[row_key([2i64])],
            &RowPatch::new().set("x", 3.0),
            UpdateOptions::default(),
        )
        .unwrap();
    store.get(fid, "x2", &RowSelector::All).unwrap();

    let snapshot = store.raw_snapshot(fid).unwrap();
    let json = serde_json::to_string(&snapshot).unwrap();
    // Computed columns never reach the wire.
    assert!(!json.contains("x2"));
    let restored: RawFrameSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.frame, "point");
    assert_eq!(restored.stored_columns, vec!["x".to_string()]);
    assert_eq!(restored.rows.len(), 2);

    // Load into a fresh store with the same schema.
    let calls2 = Arc::new(AtomicUsize::new(0));
    let mut other = FrameStore::new();
    let ofid = register(&mut other, &calls2);
    other.load_raw(ofid, restored).unwrap();
    assert_eq!(other.row_count(ofid).unwrap(), 2);

    // Computed values were not carried over; they are re-derived on read.
    assert_eq!(calls2.load(Ordering::SeqCst), 0);
    let slice = other.get(ofid, "x2", &RowSelector::All).unwrap();
    assert_eq!(slice.get(&row_key([2i64])), Some(&Value::Float(6.0)));
    assert_eq!(calls2.load(Ordering::SeqCst), 1);
}

#[test]
fn test_load_raw_resets_cache_log_and_bumps_version() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut store = FrameStore::new();
    let fid = register(&mut store, &calls);
    store
        .update(
            fid,
            &[row_key([1i64])],
            &RowPatch::new().set("x", 2.0),
            UpdateOptions::default(),
        )
        .unwrap();
    store.get(fid, "x2", &RowSelector::All).unwrap();
    let snapshot = store.raw_snapshot(fid).unwrap();
    let version = store.version(fid).unwrap();

    store.load_raw(fid, snapshot).unwrap();
    assert_eq!(store.version(fid).unwrap(), version + 1);
    assert_eq!(store.undo_depth(fid).unwrap(), 0);
    assert_eq!(store.frame(fid).unwrap().cached_rows("x2"), 0);
}

#[test]
fn test_mismatched_snapshot_rejected() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut store = FrameStore::new();
    let fid = register(&mut store, &calls);

    let mut snapshot = store.raw_snapshot(fid).unwrap();
    snapshot.stored_columns = vec!["y".to_string()];
    assert!(store.load_raw(fid, snapshot).is_err());
}
