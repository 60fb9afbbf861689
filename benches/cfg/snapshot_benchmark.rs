use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use rustx_conf::cfg::{ConfigFormat, Loader, NopLogger, ReaderSource, Snapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const NUM_READS: usize = 100_000;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
struct DatabaseConfig {
    host: String,
    port: u16,
    pool_size: u32,
    replicas: Vec<String>,
}

fn config_json() -> String {
    let replicas: Vec<String> = (0..16).map(|i| format!("replica-{:02}.internal", i)).collect();
    serde_json::json!({
        "databaseConfig": {
            "host": "localhost",
            "port": 5432,
            "pool_size": 32,
            "replicas": replicas,
        }
    })
    .to_string()
}

fn make_loader(env: bool) -> Loader<DatabaseConfig> {
    let builder = Loader::<DatabaseConfig>::builder()
        .source(Box::new(ReaderSource::new(config_json(), ConfigFormat::Json)))
        .sub_section("databaseConfig")
        .logger(Arc::new(NopLogger));
    if env {
        builder.env_lookup(|_| None).build()
    } else {
        builder.disable_automatic_env().build()
    }
}

// ========== 1. 快照读取 ==========

fn benchmark_snapshot_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_load");

    let snapshot = Snapshot::new();
    snapshot.store(DatabaseConfig::default());
    group.bench_function("single_thread", |b| {
        b.iter(|| black_box(snapshot.load()));
    });

    let snapshot = Arc::new(snapshot);
    for threads in [2, 4, 8] {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .unwrap();
        group.bench_with_input(BenchmarkId::new("parallel", threads), &threads, |b, _| {
            b.iter(|| {
                pool.install(|| {
                    (0..NUM_READS).into_par_iter().for_each(|_| {
                        black_box(snapshot.load());
                    })
                })
            });
        });
    }

    group.finish();
}

// ========== 2. 重新解析 ==========

fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");

    for env in [false, true] {
        let loader = make_loader(env);
        let name = if env { "with_env" } else { "without_env" };
        group.bench_function(name, |b| {
            b.iter(|| loader.parse().unwrap());
        });
    }

    group.finish();
}

// ========== 3. 解析期间读取 ==========

fn benchmark_load_during_parse(c: &mut Criterion) {
    let loader = make_loader(false);

    c.bench_function("load_during_parse", |b| {
        b.iter(|| {
            rayon::join(
                || {
                    for _ in 0..10 {
                        loader.parse().unwrap();
                    }
                },
                || {
                    for _ in 0..NUM_READS / 10 {
                        black_box(loader.load());
                    }
                },
            )
        });
    });
}

criterion_group!(
    benches,
    benchmark_snapshot_load,
    benchmark_parse,
    benchmark_load_during_parse
);
criterion_main!(benches);
