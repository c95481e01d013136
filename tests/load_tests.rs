#[cfg(test)]
mod tests {
    use futures::stream::{FuturesUnordered, StreamExt};
    use loadpool::{
        background::{self, BackgroundTaskRunner},
        isolated::{self, IsolatedTaskRunner},
        jitter::DEFAULT_WINDOW,
        WorkerCommand,
    };
    use std::{
        future::Future,
        time::{Duration, Instant},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    fn worker_config() -> isolated::Config {
        isolated::Config::default()
            .with_worker(WorkerCommand::new(env!("CARGO_BIN_EXE_loadpool")).arg("worker"))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_test_1_many_pool_increments() {
        println!("\n=== LOAD TEST 1: 10k инкрементов через пул ===");
        let runner = BackgroundTaskRunner::new(background::Config::default());

        measure("10k increments", || async {
            for _ in 0..10_000 {
                runner.increment_in_pool(1);
            }
            runner.wait_idle().await;
        })
        .await;

        assert_eq!(runner.value(), Ok(10_000));
        let metrics = runner.metrics();
        println!("  Success rate: {:.1}%", metrics.success_rate() * 100.0);
        assert_eq!(metrics.completed_tasks, 10_000);
        assert_eq!(metrics.workers_started, 10);
        runner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_test_2_threads_and_pool_interleaved() {
        println!("\n=== LOAD TEST 2: Потоки и пул вперемешку ===");
        let runner = BackgroundTaskRunner::new(background::Config::io_bound());

        let expected: i64 = measure("500 threads + 500 pool", || async {
            let mut expected = 0;
            for i in 0..500i64 {
                let v = if i % 2 == 0 { i } else { -i / 2 };
                runner.increment_in_background_thread(v);
                runner.increment_in_pool(v + 1);
                expected += 2 * v + 1;
            }
            runner.wait_idle().await;
            expected
        })
        .await;

        assert_eq!(runner.value(), Ok(expected));
        assert!(runner.wait_idle_timeout(Duration::from_secs(1)).await);
        runner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_test_3_thousand_consecutive_jitters() {
        println!("\n=== LOAD TEST 3: 1000 jitter подряд ===");
        let runner = IsolatedTaskRunner::new(worker_config()).unwrap();

        let durations = measure("1000 sequential jitters", || async {
            let mut out = Vec::with_capacity(1_000);
            for _ in 0..1_000 {
                out.push(runner.run_jitter_in_pool().await.unwrap());
            }
            out
        })
        .await;

        assert!(durations.iter().all(|d| *d < DEFAULT_WINDOW));
        let metrics = runner.metrics();
        assert_eq!(metrics.processes_launched, 2);
        assert_eq!(metrics.completed_tasks, 1_000);
        runner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_test_4_concurrent_jitter_handles() {
        println!("\n=== LOAD TEST 4: 200 параллельных jitter ===");
        let runner = IsolatedTaskRunner::new(worker_config()).unwrap();

        let mut pending: FuturesUnordered<_> = (0..200).map(|_| runner.submit_jitter()).collect();
        let mut done = 0;
        while let Some(res) = pending.next().await {
            assert!(res.unwrap() < DEFAULT_WINDOW);
            done += 1;
        }

        assert_eq!(done, 200);
        assert_eq!(runner.metrics().processes_launched, 2);
        println!("  Success rate: {:.1}%", runner.metrics().success_rate() * 100.0);
        runner.shutdown().await;
    }
}
