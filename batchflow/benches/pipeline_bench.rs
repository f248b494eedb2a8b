//! Benchmarks for the tornado job.

use batchflow::config::JobConfig;
use batchflow::jobs::tornadoes::{self, source_table, TornadoReading};
use batchflow::records::{Record, ToRow};
use batchflow::transforms::{count_by_value, Partitioned};
use batchflow::warehouse::{InMemoryWarehouse, TableReference};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

const READINGS: i64 = 100_000;

fn months() -> Vec<i64> {
    (0..READINGS).map(|i| (i * 7) % 12 + 1).collect()
}

fn count_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_by_value");
    for partitions in [1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &partitions,
            |b, &partitions| {
                b.iter(|| {
                    let input = Partitioned::from_vec(months(), partitions);
                    black_box(tokio_test::block_on(count_by_value(input)))
                });
            },
        );
    }
    group.finish();
}

fn job_benchmark(c: &mut Criterion) {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    warehouse.create_table(
        source_table(),
        TornadoReading::schema(),
        (0..READINGS)
            .map(|i| TornadoReading::new(Some(i % 3 == 0), (i * 7) % 12 + 1).to_row())
            .collect(),
    );
    let config =
        JobConfig::new(TableReference::new("bench", "weather", "tornadoes")).with_partitions(4);

    c.bench_function("tornadoes_job", |b| {
        b.iter(|| {
            let result = tokio_test::block_on(tornadoes::run(
                &config,
                warehouse.clone(),
                warehouse.clone(),
                None,
            ));
            black_box(result)
        });
    });
}

criterion_group!(benches, count_benchmark, job_benchmark);
criterion_main!(benches);
