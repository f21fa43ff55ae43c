//! Block nested loop join operator tests

mod test_data_gen;

use riffle_core::condition::{JoinCondition, JoinType};
use riffle_operators::{BlockNestedJoin, Operator, SortMergeJoin};
use test_data_gen::{
    assert_same_multiset, cleanup_spill_dir, drain, int_rows, int_schema, reference_join, scan,
    test_ctx, XorShift,
};

fn key_condition() -> Vec<JoinCondition> {
    vec![JoinCondition::new("key", "key")]
}

#[test]
fn test_join_cardinality_across_page_boundaries() {
    // 4 tuples per page: L = [1,2,3] cycled over 3 pages, R = [2,3,4] cycled
    // over 2 pages. The pair count must not depend on where pages split.
    let ctx = test_ctx("bnj-pages", 32, 32);
    let left_keys: Vec<i32> = (0..12).map(|i| 1 + (i % 3)).collect();
    let right_keys: Vec<i32> = (0..8).map(|i| 2 + (i % 3)).collect();
    let left_rows = int_rows(&left_keys);
    let right_rows = int_rows(&right_keys);
    let want = reference_join(&left_rows, &right_rows);

    let mut join = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), left_rows),
        scan(&ctx, int_schema(), right_rows),
        key_condition(),
        JoinType::Inner,
        3,
    );
    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    assert_eq!(out.len(), want.len());
    assert_same_multiset(out, want);
    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_matches_sort_merge_join() {
    let ctx = test_ctx("bnj-vs-smj", 32, 64);
    let mut rng = XorShift::new(41);
    let left_rows = int_rows(&rng.keys(45, 6));
    let right_rows = int_rows(&rng.keys(33, 6));

    let mut bnj = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), left_rows.clone()),
        scan(&ctx, int_schema(), right_rows.clone()),
        key_condition(),
        JoinType::Inner,
        4,
    );
    bnj.open().expect("open bnj failed");
    let from_bnj = drain(&mut bnj);
    bnj.close().expect("close bnj failed");

    let mut smj = SortMergeJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), left_rows),
        scan(&ctx, int_schema(), right_rows),
        key_condition(),
        JoinType::Inner,
        3,
    );
    smj.open().expect("open smj failed");
    let from_smj = drain(&mut smj);
    smj.close().expect("close smj failed");

    assert_same_multiset(from_bnj, from_smj);
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_cursor_resume_with_single_tuple_output_pages() {
    // Joined tuples are 16 bytes and the page is 16 bytes, so every match
    // fills the output page and forces a cursor save/resume.
    let ctx = test_ctx("bnj-resume", 16, 32);
    let left_rows = int_rows(&[7, 7, 7, 7, 7]);
    let right_rows = int_rows(&[7, 7, 7]);
    let want = reference_join(&left_rows, &right_rows);
    assert_eq!(want.len(), 15);

    let mut join = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), left_rows),
        scan(&ctx, int_schema(), right_rows),
        key_condition(),
        JoinType::Inner,
        3,
    );
    join.open().expect("open failed");
    let out = drain(&mut join);
    join.close().expect("close failed");

    assert_eq!(out.len(), 15, "pairs skipped or revisited across resumes");
    assert_same_multiset(out, want);
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_empty_right_side() {
    let ctx = test_ctx("bnj-empty", 32, 32);
    let mut join = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), int_rows(&[1, 2, 3])),
        scan(&ctx, int_schema(), Vec::new()),
        key_condition(),
        JoinType::Inner,
        3,
    );
    join.open().expect("open failed");
    assert!(join.next().expect("next failed").is_none());
    join.close().expect("close failed");
    assert!(ctx.spill().list().expect("list failed").is_empty());
    cleanup_spill_dir(&ctx);
}

#[test]
fn test_join_rejects_bad_configs() {
    let ctx = test_ctx("bnj-bad", 32, 32);

    let mut join = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), Vec::new()),
        scan(&ctx, int_schema(), Vec::new()),
        key_condition(),
        JoinType::Inner,
        2,
    );
    assert!(join.open().is_err(), "needs at least 3 buffer pages");

    let mut join = BlockNestedJoin::new(
        ctx.clone(),
        scan(&ctx, int_schema(), Vec::new()),
        scan(&ctx, int_schema(), Vec::new()),
        key_condition(),
        JoinType::Full,
        3,
    );
    assert!(join.open().is_err(), "only inner joins are supported");
    cleanup_spill_dir(&ctx);
}
