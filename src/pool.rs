use super::{
    accumulator::Accumulator,
    errors::{panic_message, PoolError},
    failure::{FailureObserver, FailureOrigin, TaskFailure},
    jitter::Jitter,
    model::{PoolMetrics, WorkItem},
    result::SpawnResult,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use crossbeam::deque::{Injector, Steal};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::Duration,
};
use tokio_util::sync::CancellationToken;


/// Конфигурация пула воркеров
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub num_workers: usize,
    pub jitter: Jitter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_workers: 10,
            jitter: Jitter::default(),
        }
    }
}

impl Config {
    pub fn io_bound() -> Self {
        Self {
            num_workers: num_cpus::get() * 2,
            ..Default::default()
        }
    }
}


pub type WorkerPoolRef = Arc<WorkerPool>;

/// Ограниченный пул: фиксированное число воркеров разбирает общую очередь.
/// Сам инкремент выполняется в blocking-потоках tokio, поэтому одновременно
/// работает не больше `num_workers` задач.
pub struct WorkerPool {
    inject: Injector<WorkItem>,
    notify: Notify,
    cancellation_token: CancellationToken,
    closed: AtomicBool,
    active_tasks: AtomicUsize,
    queued_tasks: AtomicUsize,
    idle_workers: AtomicUsize,
    workers_started: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
    all_tasks_completed: Notify,
    accumulator: Arc<Accumulator>,
    observer: Arc<dyn FailureObserver>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    config: Config,
}

impl WorkerPool {
    /// Запускает воркеров на текущем runtime tokio.
    pub fn with_config(
        config: Config,
        accumulator: Arc<Accumulator>,
        observer: Arc<dyn FailureObserver>,
    ) -> WorkerPoolRef {
        let num_workers = config.num_workers.max(1);
        let pool = Arc::new(WorkerPool {
            inject: Injector::new(),
            notify: Notify::new(),
            cancellation_token: CancellationToken::new(),
            closed: AtomicBool::new(false),
            active_tasks: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            idle_workers: AtomicUsize::new(0),
            workers_started: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
            all_tasks_completed: Notify::new(),
            accumulator,
            observer,
            handles: Mutex::new(Vec::with_capacity(num_workers)),
            config: Config { num_workers, ..config },
        });

        let handles: Vec<_> = (0..num_workers)
            .map(|id| {
                pool.workers_started.fetch_add(1, Ordering::Relaxed);
                let pool_clone = pool.clone();
                tokio::spawn(async move {
                    pool_clone.worker_loop(id).await;
                })
            })
            .collect();
        pool.handles_guard().extend(handles);

        tracing::debug!(workers = num_workers, "worker pool started");
        pool
    }

    fn handles_guard(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Ставит задачу в очередь и сразу возвращается.
    pub fn submit(&self, item: WorkItem) -> SpawnResult<()> {
        // Счетчик растет до проверки флага: `join_all` в shutdown либо
        // дождется этой задачи, либо submit увидит `closed`.
        self.active_tasks.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            self.finish_one();
            return Err(PoolError::ShutDown);
        }
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.inject.push(item);
        self.notify.notify_one();

        // Воркеры уже остановлены по таймауту: очередь больше никто не разберет
        if self.cancellation_token.is_cancelled() {
            self.abandon_queued();
        }
        Ok(())
    }

    fn abandon_queued(&self) -> usize {
        let mut abandoned = 0usize;
        while let Some(item) = self.pop() {
            self.fail(item, PoolError::ShutDown);
            self.finish_one();
            abandoned += 1;
        }
        abandoned
    }

    fn pop(&self) -> Option<WorkItem> {
        loop {
            match self.inject.steal() {
                Steal::Success(item) => {
                    self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    return Some(item);
                }
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    async fn worker_loop(&self, id: usize) {
        tracing::trace!(worker = id, "pool worker running");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            if let Some(item) = self.pop() {
                self.run(item).await;
                continue;
            }

            self.idle_workers.fetch_add(1, Ordering::Release);
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    self.idle_workers.fetch_sub(1, Ordering::Acquire);
                    break;
                }
                _ = self.notify.notified() => {
                    self.idle_workers.fetch_sub(1, Ordering::Acquire);
                }
            }
        }

        tracing::trace!(worker = id, "pool worker stopped");
    }

    async fn run(&self, item: WorkItem) {
        let accumulator = self.accumulator.clone();
        let jitter = self.config.jitter;

        let result = match tokio::task::spawn_blocking(move || {
            item.execute(&jitter, Some(&accumulator))
        })
        .await
        {
            Ok(res) => res.map(|_| ()),
            Err(join_err) if join_err.is_panic() => {
                Err(PoolError::Panic(panic_message(join_err.into_panic().as_ref())))
            }
            Err(join_err) => Err(PoolError::JoinFailed(join_err.to_string())),
        };

        match result {
            Ok(()) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(error) => self.fail(item, error),
        }
        self.finish_one();
    }

    fn fail(&self, item: WorkItem, error: PoolError) {
        self.failed_tasks.fetch_add(1, Ordering::Relaxed);
        self.observer.on_failure(TaskFailure {
            origin: FailureOrigin::Pool,
            item,
            error,
        });
    }

    #[inline]
    fn finish_one(&self) {
        if self.active_tasks.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.all_tasks_completed.notify_waiters();
        }
    }

    #[inline]
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::Acquire)
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.config.num_workers,
            workers_started: self.workers_started.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            threads_in_flight: 0,
        }
    }

    /// Ждет, пока все поставленные задачи не завершатся
    pub async fn join_all(&self) {
        loop {
            let notified = self.all_tasks_completed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_tasks.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn join_all_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join_all()).await.is_ok()
    }

    /// Дожидается очереди, затем останавливает воркеров
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.join_all().await;
        self.stop().await;
    }

    /// `false`, если очередь не успела опустеть за `timeout`.
    /// Оставшиеся задачи уходят наблюдателю как `ShutDown`.
    pub async fn shutdown_timeout(&self, timeout: Duration) -> bool {
        self.closed.store(true, Ordering::SeqCst);
        let drained = self.join_all_timeout(timeout).await;
        self.stop().await;
        drained
    }

    async fn stop(&self) {
        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut *self.handles_guard());
        for handle in handles {
            if let Err(join_err) = handle.await {
                tracing::warn!(error = %join_err, "pool worker ended abnormally");
            }
        }

        let abandoned = self.abandon_queued();
        tracing::debug!(abandoned, "worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}
