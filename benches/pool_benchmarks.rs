use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use loadpool::{
    background::{self, BackgroundTaskRunner},
    isolated::{self, IsolatedTaskRunner},
    Jitter, WorkerCommand,
};
use std::hint::black_box;
use tokio::time::Duration;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Без jitter меряем накладные расходы самой отправки
fn bench_increment_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("increment_paths");

    for size in [100, 1000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("pool", size), &size, |b, &size| {
            let rt = create_runtime();
            let runner = rt.block_on(async {
                BackgroundTaskRunner::new(background::Config {
                    jitter: Jitter::new(Duration::ZERO),
                    ..Default::default()
                })
            });

            b.to_async(&rt).iter(|| {
                let runner = &runner;
                async move {
                    for _ in 0..size {
                        runner.increment_in_pool(black_box(1));
                    }
                    runner.wait_idle().await;
                }
            });

            rt.block_on(runner.shutdown());
        });

        group.bench_with_input(BenchmarkId::new("threads", size), &size, |b, &size| {
            let rt = create_runtime();
            let runner = rt.block_on(async {
                BackgroundTaskRunner::new(background::Config {
                    jitter: Jitter::new(Duration::ZERO),
                    ..Default::default()
                })
            });

            b.to_async(&rt).iter(|| {
                let runner = &runner;
                async move {
                    for _ in 0..size {
                        runner.increment_in_background_thread(black_box(1));
                    }
                    runner.wait_idle().await;
                }
            });

            rt.block_on(runner.shutdown());
        });
    }

    group.finish();
}

fn bench_isolated_round_trip(c: &mut Criterion) {
    let rt = create_runtime();
    let runner = rt.block_on(async {
        IsolatedTaskRunner::new(
            isolated::Config::default()
                .with_worker(WorkerCommand::new(env!("CARGO_BIN_EXE_loadpool")).arg("worker")),
        )
        .unwrap()
    });

    c.bench_function("isolated_round_trip", |b| {
        b.to_async(&rt).iter(|| {
            let runner = &runner;
            async move { black_box(runner.run_jitter_in_pool().await.unwrap()) }
        });
    });

    rt.block_on(runner.shutdown());
}

criterion_group!(benches, bench_increment_paths, bench_isolated_round_trip);
criterion_main!(benches);
