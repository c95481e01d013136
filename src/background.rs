//! Инкременты общего счетчика в фоне: отдельным потоком или через
//! ограниченный пул из 10 воркеров.

use super::{
    accumulator::Accumulator,
    errors::{panic_message, PoolError},
    failure::{FailureObserver, FailureOrigin, LogFailures, TaskFailure},
    jitter::Jitter,
    model::{PoolMetrics, WorkItem},
    pool::{self, WorkerPool, WorkerPoolRef},
    result::SpawnResult,
};
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::{sync::Notify, time::Duration};


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workers: usize,
    pub jitter: Jitter,
    pub thread_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: 10,
            jitter: Jitter::default(),
            thread_name: "loadpool-incr".into(),
        }
    }
}

impl Config {
    pub fn io_bound() -> Self {
        Self {
            workers: pool::Config::io_bound().num_workers,
            ..Default::default()
        }
    }
}


/// Счетчик живых фоновых потоков
#[derive(Default)]
struct ThreadTracker {
    in_flight: AtomicUsize,
    quiet: Notify,
}

impl ThreadTracker {
    async fn wait(&self) {
        loop {
            let notified = self.quiet.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InFlight(Arc<ThreadTracker>);

impl InFlight {
    fn enter(tracker: &Arc<ThreadTracker>) -> Self {
        tracker.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(tracker.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.quiet.notify_waiters();
        }
    }
}


pub struct BackgroundTaskRunner {
    pool: WorkerPoolRef,
    accumulator: Arc<Accumulator>,
    observer: Arc<dyn FailureObserver>,
    jitter: Jitter,
    thread_name: String,
    threads: Arc<ThreadTracker>,
    threads_spawned: AtomicUsize,
    closed: AtomicBool,
}

impl BackgroundTaskRunner {
    /// Ошибки фоновых задач уходят в лог
    pub fn new(config: Config) -> Self {
        Self::with_observer(config, Arc::new(LogFailures))
    }

    /// Создает пул на текущем runtime tokio
    pub fn with_observer(config: Config, observer: Arc<dyn FailureObserver>) -> Self {
        let accumulator = Arc::new(Accumulator::new());
        let pool = WorkerPool::with_config(
            pool::Config {
                num_workers: config.workers,
                jitter: config.jitter,
            },
            accumulator.clone(),
            observer.clone(),
        );

        Self {
            pool,
            accumulator,
            observer,
            jitter: config.jitter,
            thread_name: config.thread_name,
            threads: Arc::new(ThreadTracker::default()),
            threads_spawned: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn accumulator(&self) -> &Arc<Accumulator> {
        &self.accumulator
    }

    pub fn value(&self) -> SpawnResult<i64> {
        self.accumulator.value()
    }

    /// Сон на jitter в текущем потоке, затем прибавление под блокировкой
    pub fn increment_synchronously(&self, value: i64) -> SpawnResult<()> {
        WorkItem::Increment { value }
            .execute(&self.jitter, Some(&self.accumulator))
            .map(|_| ())
    }

    /// Новый OS-поток на каждый вызов, без handle.
    ///
    /// Число потоков не ограничено: это путь для стресс-нагрузки.
    /// Для ограниченной конкурентности используйте `increment_in_pool`.
    pub fn increment_in_background_thread(&self, value: i64) {
        let item = WorkItem::Increment { value };
        // Сначала регистрируемся, потом проверяем флаг: shutdown либо
        // увидит этот поток в `wait`, либо поток увидит `closed`.
        let guard = InFlight::enter(&self.threads);
        if self.closed.load(Ordering::SeqCst) {
            drop(guard);
            self.observer.on_failure(TaskFailure {
                origin: FailureOrigin::Thread,
                item,
                error: PoolError::ShutDown,
            });
            return;
        }
        let accumulator = self.accumulator.clone();
        let observer = self.observer.clone();
        let jitter = self.jitter;
        let n = self.threads_spawned.fetch_add(1, Ordering::Relaxed);

        let spawned = std::thread::Builder::new()
            .name(format!("{}-{}", self.thread_name, n))
            .spawn(move || {
                let _guard = guard;
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    item.execute(&jitter, Some(&accumulator))
                }))
                .unwrap_or_else(|panic_info| Err(PoolError::Panic(panic_message(panic_info.as_ref()))));

                if let Err(error) = result {
                    observer.on_failure(TaskFailure {
                        origin: FailureOrigin::Thread,
                        item,
                        error,
                    });
                }
            });

        if let Err(err) = spawned {
            self.observer.on_failure(TaskFailure {
                origin: FailureOrigin::Thread,
                item,
                error: PoolError::ThreadSpawn(err.to_string()),
            });
        }
    }

    /// Ставит инкремент в ограниченный пул и сразу возвращается
    pub fn increment_in_pool(&self, value: i64) {
        let item = WorkItem::Increment { value };
        if let Err(error) = self.pool.submit(item) {
            self.observer.on_failure(TaskFailure {
                origin: FailureOrigin::Pool,
                item,
                error,
            });
        }
    }

    /// Ждет завершения всех отправленных задач и потоков
    pub async fn wait_idle(&self) {
        loop {
            self.pool.join_all().await;
            self.threads.wait().await;
            if self.pool.active_tasks() == 0 && self.threads.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
        }
    }

    pub async fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            threads_in_flight: self.threads.in_flight.load(Ordering::Relaxed),
            ..self.pool.metrics()
        }
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pool.shutdown().await;
        self.threads.wait().await;
        tracing::debug!(total = ?self.accumulator.value(), "background runner stopped");
    }

    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        let drained = self.pool.shutdown_timeout(timeout).await;
        self.threads.wait().await;
        drained
    }
}

impl std::fmt::Debug for BackgroundTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTaskRunner")
            .field("pool", &self.pool)
            .field("jitter", &self.jitter)
            .finish()
    }
}
