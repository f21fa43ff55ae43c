use criterion::{criterion_group, criterion_main, Criterion};
use riffle_core::condition::{JoinCondition, JoinType};
use riffle_core::config::EngineConfig;
use riffle_core::schema::{Field, Schema};
use riffle_core::types::{Tuple, Value};
use riffle_mem::Codec;
use riffle_operators::{Direction, ExecContext, ExternalSort, MemScan, Operator, SortMergeJoin};
use std::sync::Arc;

fn bench_ctx(tag: &str) -> Arc<ExecContext> {
    let cfg = EngineConfig {
        page_size: 4096,
        num_buff: 8,
        spill_dir: std::env::temp_dir()
            .join(format!("riffle-bench-{}-{}", std::process::id(), tag))
            .to_string_lossy()
            .into_owned(),
    };
    ExecContext::new(cfg, 256, Codec::None).expect("context")
}

fn schema() -> Schema {
    Schema::new(vec![Field::int32("key"), Field::int32("seq")])
}

fn make_rows(n: usize) -> Vec<Tuple> {
    (0..n)
        .map(|i| {
            // Cheap scramble so runs are not pre-sorted.
            let key = ((i * 2654435761) % 4093) as i32;
            Tuple::new(vec![Value::Int(key), Value::Int(i as i32)])
        })
        .collect()
}

fn bench_external_sort(c: &mut Criterion) {
    let ctx = bench_ctx("sort");
    let rows = make_rows(4096);
    c.bench_function("external_sort_4k_rows", |b| {
        b.iter(|| {
            let scan = Box::new(MemScan::new(Arc::clone(&ctx), schema(), rows.clone()));
            let mut sort = ExternalSort::new(Arc::clone(&ctx), scan, vec![0], 4, Direction::Left);
            sort.open().unwrap();
            while let Some(batch) = sort.next().unwrap() {
                std::hint::black_box(batch.len());
            }
            sort.close().unwrap();
        })
    });
}

fn bench_sort_merge_join(c: &mut Criterion) {
    let ctx = bench_ctx("join");
    let left = make_rows(2048);
    let right = make_rows(1024);
    c.bench_function("sort_merge_join_2k_x_1k", |b| {
        b.iter(|| {
            let mut join = SortMergeJoin::new(
                Arc::clone(&ctx),
                Box::new(MemScan::new(Arc::clone(&ctx), schema(), left.clone())),
                Box::new(MemScan::new(Arc::clone(&ctx), schema(), right.clone())),
                vec![JoinCondition::new("key", "key")],
                JoinType::Inner,
                4,
            );
            join.open().unwrap();
            while let Some(batch) = join.next().unwrap() {
                std::hint::black_box(batch.len());
            }
            join.close().unwrap();
        })
    });
}

criterion_group!(operators, bench_external_sort, bench_sort_merge_join);
criterion_main!(operators);
