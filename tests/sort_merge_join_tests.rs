//! Sort-merge join operator tests

mod test_data_gen;

use riffle_core::condition::{JoinCondition, JoinType};
use riffle_core::schema::{Field, Schema};
use riffle_core::types::Value;
use riffle_operators::{Operator, SortMergeJoin};
use test_data_gen::{
    assert_same_multiset, cleanup_spill_dir, drain, int_rows, int_schema, key_of, reference_join,
    scan, test_ctx, XorShift,
};

fn key_condition() -> Vec<JoinCondition> {
    vec![JoinCondition::new("key", "key")]
}

#[test]
fn test_join_duplicate_keys_pair_fully() {
    // L = [1, 2, 2, 3], R = [2, 2, 4]: each 2 in L pairs with each 2 in R.
    let ctx = test_ctx("smj-basic", 32, 32);
    let left = scan(&ctx, int_schema(), int_rows(&[1, 2, 2, 3]));
    let right = scan(&ctx, int_schema(), int_rows(&[2, 2, 4]));
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);

    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    assert_eq!(out.len(), 4);
    // Lexicographic on (key, left arrival, right arrival).
    let marks: Vec<(i32, i32, i32)> = out
        .iter()
        .map(|t| {
            match (t.value(0), t.value(1), t.value(3)) {
                (Value::Int(k), Value::Int(ls), Value::Int(rs)) => (*k, *ls, *rs),
                other => panic!("unexpected tuple shape: {other:?}"),
            }
        })
        .collect();
    assert_eq!(marks, vec![(2, 1, 0), (2, 1, 1), (2, 2, 0), (2, 2, 1)]);
    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_duplicate_group_spans_pages() {
    // 4 tuples per page on each input; the right duplicate group of 9 spans
    // three pages and must survive the seam for every matching left tuple.
    let ctx = test_ctx("smj-seam", 32, 32);
    let mut right_keys = vec![1, 1];
    right_keys.extend(std::iter::repeat(5).take(9));
    right_keys.push(8);
    let left_keys = vec![4, 5, 5, 5, 6];

    let left_rows = int_rows(&left_keys);
    let right_rows = int_rows(&right_keys);
    let want = reference_join(&left_rows, &right_rows);
    assert_eq!(want.len(), 27);

    let left = scan(&ctx, int_schema(), left_rows);
    let right = scan(&ctx, int_schema(), right_rows);
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);

    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    assert_eq!(out.len(), 27, "lost pairs at the page seam");
    assert_same_multiset(out, want);
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_cardinality_matches_reference() {
    let ctx = test_ctx("smj-cardinality", 32, 32);
    let mut rng = XorShift::new(23);
    let left_rows = int_rows(&rng.keys(50, 8));
    let right_rows = int_rows(&rng.keys(37, 8));
    let want = reference_join(&left_rows, &right_rows);

    let left = scan(&ctx, int_schema(), left_rows);
    let right = scan(&ctx, int_schema(), right_rows);
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);

    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    assert_eq!(out.len(), want.len());
    assert_same_multiset(out, want);
    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_output_is_key_ordered() {
    let ctx = test_ctx("smj-ordered", 32, 32);
    let mut rng = XorShift::new(5);
    let left = scan(&ctx, int_schema(), int_rows(&rng.keys(30, 5)));
    let right = scan(&ctx, int_schema(), int_rows(&rng.keys(30, 5)));
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);

    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    for pair in out.windows(2) {
        assert!(key_of(&pair[0]) <= key_of(&pair[1]), "output not key-ordered");
    }
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_empty_sides() {
    let ctx = test_ctx("smj-empty", 32, 32);
    let left = scan(&ctx, int_schema(), Vec::new());
    let right = scan(&ctx, int_schema(), int_rows(&[1, 2, 3]));
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);
    join.open().expect("open failed");
    assert!(join.next().expect("next failed").is_none());
    join.close().expect("close failed");

    let left = scan(&ctx, int_schema(), int_rows(&[1, 2, 3]));
    let right = scan(&ctx, int_schema(), Vec::new());
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Inner, 3);
    join.open().expect("open failed");
    assert!(join.next().expect("next failed").is_none());
    join.close().expect("close failed");

    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_two_joins_share_the_spill_namespace() {
    // Two plans with swapped inputs, opened before either is drained: the
    // shared file counter keeps their left-/right-tagged temp files apart.
    let ctx = test_ctx("smj-paired", 32, 64);
    let a_rows = int_rows(&[1, 2, 2, 3, 7]);
    let b_rows = int_rows(&[2, 2, 3, 9]);
    let want = reference_join(&a_rows, &b_rows).len();

    let mut ab = SortMergeJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), a_rows.clone()),
        scan(&ctx, int_schema(), b_rows.clone()),
        key_condition(),
        JoinType::Inner,
        3,
    );
    let mut ba = SortMergeJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), b_rows),
        scan(&ctx, int_schema(), a_rows),
        key_condition(),
        JoinType::Inner,
        3,
    );

    ab.open().expect("open ab failed");
    ba.open().expect("open ba failed");

    // Drain interleaved.
    let mut got_ab = Vec::new();
    let mut got_ba = Vec::new();
    for _ in 0..1000 {
        let a = ab.next().expect("next ab failed");
        let b = ba.next().expect("next ba failed");
        if let Some(batch) = a {
            got_ab.extend(batch.into_tuples());
        }
        if let Some(batch) = b {
            got_ba.extend(batch.into_tuples());
        }
        if got_ab.len() >= want && got_ba.len() >= want {
            break;
        }
    }
    assert_eq!(got_ab.len(), want);
    assert_eq!(got_ba.len(), want);

    ab.close().expect("close ab failed");
    ba.close().expect("close ba failed");
    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_rejects_bad_plans() {
    // Unknown attribute.
    let ctx = test_ctx("smj-badattr", 32, 32);
    let left = scan(&ctx, int_schema(), int_rows(&[1]));
    let right = scan(&ctx, int_schema(), int_rows(&[1]));
    let mut join = SortMergeJoin::new(
        ctx.clone(),
        left,
        right,
        vec![JoinCondition::new("key", "nope")],
        JoinType::Inner,
        3,
    );
    assert!(join.open().is_err());

    // Key type mismatch.
    let str_schema = Schema::new(vec![Field::utf8("key", 8)]);
    let left = scan(&ctx, int_schema(), Vec::new());
    let right = scan(&ctx, str_schema, Vec::new());
    let mut join = SortMergeJoin::new(
        ctx.clone(),
        left,
        right,
        key_condition(),
        JoinType::Inner,
        3,
    );
    assert!(join.open().is_err());

    // Unsupported join type.
    let left = scan(&ctx, int_schema(), Vec::new());
    let right = scan(&ctx, int_schema(), Vec::new());
    let mut join = SortMergeJoin::new(ctx.clone(), left, right, key_condition(), JoinType::Left, 3);
    assert!(join.open().is_err());
    cleanup_spill_dir(&ctx);
}
