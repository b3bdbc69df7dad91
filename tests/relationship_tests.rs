/// Cross-frame relationship tests
///
/// Computed columns joining into sibling frames through declared
/// relationships, the reverse invalidation path, and the permissive
/// no-relationship fallback.
/// Run with: cargo test --test relationship_tests

use framedb::{
    row_key, AttributeDecl, ComputeFn, DataType, DependencyDecl, ForeignInput, FrameId,
    FrameSchema, FrameStore, IndexColumn, RowPatch, RowSelector, UpdateOptions, Value,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Fixture {
    store: FrameStore,
    segment: FrameId,
    spine: FrameId,
    calls: Arc<AtomicUsize>,
    rows: Arc<AtomicUsize>,
}

/// Spine rows reference segment rows through a stored `segmentID`; the
/// `segLen` computed column reads the referenced segment's length.
fn fixture() -> Fixture {
    let calls = Arc::new(AtomicUsize::new(0));
    let rows = Arc::new(AtomicUsize::new(0));
    let mut store = FrameStore::new();

    let segment = store
        .register(
            FrameSchema::new(
                "segment",
                [
                    IndexColumn::new("segmentID", DataType::Int),
                    IndexColumn::new("t", DataType::Int),
                ],
            )
            .stored("length", DataType::Float, Value::Float(0.0)),
        )
        .unwrap();

    let seg_len: ComputeFn = {
        let calls = Arc::clone(&calls);
        let rows = Arc::clone(&rows);
        Arc::new(move |view| {
            calls.fetch_add(1, Ordering::SeqCst);
            rows.fetch_add(view.len(), Ordering::SeqCst);
            Ok(view.joined("segment", "length")?.to_vec())
        })
    };
    let spine = store
        .register(
            FrameSchema::new(
                "spine",
                [
                    IndexColumn::new("spineID", DataType::Int),
                    IndexColumn::new("t", DataType::Int),
                ],
            )
            .stored("segmentID", DataType::Int, Value::Null)
            .relationship("segment", ["segmentID", "t"])
            .computed(
                "segLen",
                AttributeDecl::new().title("Segment Length").group("Geometry"),
                DependencyDecl::frames([("spine", ["segmentID"]), ("segment", ["length"])]),
                seg_len,
            ),
        )
        .unwrap();

    let mut fx = Fixture {
        store,
        segment,
        spine,
        calls,
        rows,
    };
    set_segment(&mut fx, 1, 0, 10.0);
    set_segment(&mut fx, 2, 0, 20.0);
    set_spine(&mut fx, 10, 0, 1);
    set_spine(&mut fx, 11, 0, 1);
    set_spine(&mut fx, 12, 0, 2);
    fx
}

fn set_segment(fx: &mut Fixture, id: i64, t: i64, length: f64) {
    fx.store
        .update(
            fx.segment,
            &[row_key([id, t])],
            &RowPatch::new().set("length", length),
            UpdateOptions::default(),
        )
        .unwrap();
}

fn set_spine(fx: &mut Fixture, id: i64, t: i64, segment_id: i64) {
    fx.store
        .update(
            fx.spine,
            &[row_key([id, t])],
            &RowPatch::new().set("segmentID", segment_id),
            UpdateOptions::default(),
        )
        .unwrap();
}

#[test]
fn test_join_through_relationship() {
    let mut fx = fixture();
    let slice = fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();
    assert_eq!(slice.get(&row_key([10i64, 0i64])), Some(&Value::Float(10.0)));
    assert_eq!(slice.get(&row_key([11i64, 0i64])), Some(&Value::Float(10.0)));
    assert_eq!(slice.get(&row_key([12i64, 0i64])), Some(&Value::Float(20.0)));
    assert_eq!(fx.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_segment_mutation_invalidates_only_referencing_spines() {
    let mut fx = fixture();
    fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();
    assert_eq!(fx.rows.load(Ordering::SeqCst), 3);

    // Change segment 1: spines 10 and 11 go stale, spine 12 stays cached.
    set_segment(&mut fx, 1, 0, 15.0);
    assert_eq!(fx.store.frame(fx.spine).unwrap().cached_rows("segLen"), 1);

    let slice = fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();
    assert_eq!(slice.get(&row_key([10i64, 0i64])), Some(&Value::Float(15.0)));
    assert_eq!(slice.get(&row_key([11i64, 0i64])), Some(&Value::Float(15.0)));
    assert_eq!(slice.get(&row_key([12i64, 0i64])), Some(&Value::Float(20.0)));
    // Exactly the two stale rows were recomputed.
    assert_eq!(fx.rows.load(Ordering::SeqCst), 5);
}

#[test]
fn test_rewiring_the_foreign_key_invalidates_that_spine() {
    let mut fx = fixture();
    fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();

    // Point spine 10 at segment 2; only its own row is re-derived.
    set_spine(&mut fx, 10, 0, 2);
    let slice = fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();
    assert_eq!(slice.get(&row_key([10i64, 0i64])), Some(&Value::Float(20.0)));
    assert_eq!(fx.rows.load(Ordering::SeqCst), 4);
}

#[test]
fn test_unmatched_join_yields_null() {
    let mut fx = fixture();
    set_spine(&mut fx, 13, 0, 99);

    let value = fx
        .store
        .get_one(fx.spine, "segLen", &row_key([13i64, 0i64]))
        .unwrap();
    assert_eq!(value, Some(Value::Null));
}

#[test]
fn test_undo_in_segment_propagates_to_spine_cache() {
    let mut fx = fixture();
    fx.store.get(fx.spine, "segLen", &RowSelector::All).unwrap();

    set_segment(&mut fx, 1, 0, 99.0);
    assert_eq!(
        fx.store
            .get_one(fx.spine, "segLen", &row_key([10i64, 0i64]))
            .unwrap(),
        Some(Value::Float(99.0))
    );

    fx.store.undo(fx.segment).unwrap();
    assert_eq!(
        fx.store
            .get_one(fx.spine, "segLen", &row_key([10i64, 0i64]))
            .unwrap(),
        Some(Value::Float(10.0))
    );
}

#[test]
fn test_no_relationship_falls_back_to_unfiltered_frame() {
    let mut store = FrameStore::new();
    let segment = store
        .register(
            FrameSchema::new(
                "segment",
                [IndexColumn::new("segmentID", DataType::Int)],
            )
            .stored("length", DataType::Float, Value::Float(0.0)),
        )
        .unwrap();
    store
        .update(
            segment,
            &[row_key([1i64])],
            &RowPatch::new().set("length", 10.0),
            UpdateOptions::default(),
        )
        .unwrap();
    store
        .update(
            segment,
            &[row_key([2i64])],
            &RowPatch::new().set("length", 20.0),
            UpdateOptions::default(),
        )
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let total: ComputeFn = {
        let calls = Arc::clone(&calls);
        Arc::new(move |view| {
            calls.fetch_add(1, Ordering::SeqCst);
            // No relationship declared: the whole sibling frame arrives.
            let input = view.foreign("segment")?;
            let lengths = match input {
                ForeignInput::Unfiltered { keys, columns } => {
                    assert_eq!(keys.len(), 2);
                    columns.get("length").expect("declared dependency")
                }
                ForeignInput::Joined(_) => panic!("expected unfiltered input"),
            };
            let sum: f64 = lengths.iter().filter_map(|v| v.as_f64()).sum();
            Ok(view.keys().iter().map(|_| Value::Float(sum)).collect())
        })
    };
    // A summary frame with no declared relationship to "segment".
    let summary = store
        .register(
            FrameSchema::new("summary", [IndexColumn::new("id", DataType::Int)])
                .computed(
                    "totalLength",
                    AttributeDecl::new(),
                    DependencyDecl::frames([("segment", ["length"])]),
                    total,
                ),
        )
        .unwrap();
    store
        .update(summary, &[row_key([0i64])], &RowPatch::new(), UpdateOptions::default())
        .unwrap();

    assert_eq!(
        store.get_one(summary, "totalLength", &row_key([0i64])).unwrap(),
        Some(Value::Float(30.0))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Any segment mutation conservatively clears the whole column.
    store
        .update(
            segment,
            &[row_key([2i64])],
            &RowPatch::new().set("length", 25.0),
            UpdateOptions::default(),
        )
        .unwrap();
    assert_eq!(
        store.get_one(summary, "totalLength", &row_key([0i64])).unwrap(),
        Some(Value::Float(35.0))
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_chained_cross_frame_invalidation() {
    let mut fx = fixture();
    // Second-level computed column on spine reading segLen.
    let double: ComputeFn = Arc::new(|view| {
        Ok(view
            .local("segLen")?
            .iter()
            .map(|v| Value::Float(v.as_f64().unwrap_or(0.0) * 2.0))
            .collect())
    });
    fx.store
        .add_computed(
            fx.spine,
            "segLen2",
            AttributeDecl::new(),
            DependencyDecl::columns(["segLen"]),
            double,
            false,
        )
        .unwrap();
    assert_eq!(
        fx.store
            .get_one(fx.spine, "segLen2", &row_key([10i64, 0i64]))
            .unwrap(),
        Some(Value::Float(20.0))
    );

    // segment.length -> spine.segLen -> spine.segLen2, across the
    // relationship and then within the frame.
    set_segment(&mut fx, 1, 0, 50.0);
    assert_eq!(
        fx.store
            .get_one(fx.spine, "segLen2", &row_key([10i64, 0i64]))
            .unwrap(),
        Some(Value::Float(100.0))
    );
    assert_eq!(
        fx.store
            .get_one(fx.spine, "segLen2", &row_key([12i64, 0i64]))
            .unwrap(),
        Some(Value::Float(40.0))
    );
}
