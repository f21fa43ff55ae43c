//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::Arc;

use riffle_core::config::EngineConfig;
use riffle_core::schema::{Field, Schema};
use riffle_core::types::{compare_on, Tuple, Value};
use riffle_mem::Codec;
use riffle_operators::{ExecContext, MemScan, Operator};

/// Unique spill directory per test so suites can run in parallel.
pub fn create_temp_spill_dir(tag: &str) -> String {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let n = SEQ.fetch_add(1, AtomicOrdering::Relaxed);
    std::env::temp_dir()
        .join(format!("riffle-tests-{}-{}-{}", std::process::id(), tag, n))
        .to_string_lossy()
        .into_owned()
}

pub fn test_ctx(tag: &str, page_size: usize, pool_pages: usize) -> Arc<ExecContext> {
    let cfg = EngineConfig {
        page_size,
        num_buff: 8,
        spill_dir: create_temp_spill_dir(tag),
    };
    ExecContext::new(cfg, pool_pages, Codec::None).expect("failed to build context")
}

pub fn cleanup_spill_dir(ctx: &ExecContext) {
    let _ = std::fs::remove_dir_all(ctx.spill().root());
}

/// Two int32 columns: a join/sort key plus an arrival marker.
pub fn int_schema() -> Schema {
    Schema::new(vec![Field::int32("key"), Field::int32("seq")])
}

pub fn int_row(key: i32, seq: i32) -> Tuple {
    Tuple::new(vec![Value::Int(key), Value::Int(seq)])
}

/// Rows for the given keys, tagged with their arrival position.
pub fn int_rows(keys: &[i32]) -> Vec<Tuple> {
    keys.iter()
        .enumerate()
        .map(|(i, &k)| int_row(k, i as i32))
        .collect()
}

pub fn scan(ctx: &Arc<ExecContext>, schema: Schema, rows: Vec<Tuple>) -> Box<dyn Operator> {
    Box::new(MemScan::new(Arc::clone(ctx), schema, rows))
}

pub fn key_of(tuple: &Tuple) -> i32 {
    match tuple.value(0) {
        Value::Int(v) => *v,
        other => panic!("expected int key, got {other:?}"),
    }
}

/// Pull an operator dry, checking the page-fill invariant along the way:
/// every page is within capacity and only the last may be under-full.
pub fn drain(op: &mut dyn Operator) -> Vec<Tuple> {
    let mut all = Vec::new();
    let mut saw_partial = false;
    while let Some(batch) = op.next().expect("next failed") {
        assert!(
            batch.len() <= batch.capacity(),
            "page over-full: {} of {}",
            batch.len(),
            batch.capacity()
        );
        assert!(!saw_partial, "under-full page before the final page");
        if batch.len() < batch.capacity() {
            saw_partial = true;
        }
        all.extend(batch.into_tuples());
    }
    all
}

fn cmp_full(a: &Tuple, b: &Tuple) -> Ordering {
    let keys: Vec<usize> = (0..a.arity()).collect();
    compare_on(a, b, &keys, &keys)
}

/// Multiset equality via canonical ordering over all columns.
pub fn assert_same_multiset(mut got: Vec<Tuple>, mut want: Vec<Tuple>) {
    got.sort_by(cmp_full);
    want.sort_by(cmp_full);
    assert_eq!(got, want, "multisets differ");
}

/// Naive nested-loop reference for the inner equi-join on column 0.
pub fn reference_join(left: &[Tuple], right: &[Tuple]) -> Vec<Tuple> {
    let mut out = Vec::new();
    for l in left {
        for r in right {
            if compare_on(l, r, &[0], &[0]) == Ordering::Equal {
                out.push(l.join(r));
            }
        }
    }
    out
}

/// Deterministic xorshift stream for shuffled test keys.
pub struct XorShift(u32);

impl XorShift {
    pub fn new(seed: u32) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    pub fn keys(&mut self, n: usize, modulo: u32) -> Vec<i32> {
        (0..n).map(|_| (self.next_u32() % modulo) as i32).collect()
    }
}
