//! Изолированное выполнение в отдельных OS-процессах.
//!
//! Пул держит фиксированное число долгоживущих воркеров (по умолчанию 2),
//! запущенных один раз при создании. Вызов `run_jitter_in_pool` ждет
//! ответа воркера и возвращает любую ошибку вызывающему.

use super::{
    errors::PoolError,
    handle::JoinHandle,
    jitter::Jitter,
    model::{ProcessPoolMetrics, WorkItem},
    process::{ProcessWorker, WorkerCommand},
    protocol::{Request, Response},
    result::SpawnResult,
    start_method::{self, StartMethod},
};
use crossbeam::queue::ArrayQueue;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    sync::{oneshot, Semaphore},
    time::Duration,
};


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub processes: usize,
    pub jitter: Jitter,
    pub worker: WorkerCommand,
    /// `None`: одноразовая проверка платформы
    pub start_method: Option<StartMethod>,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            processes: 2,
            jitter: Jitter::default(),
            worker: WorkerCommand::default(),
            start_method: None,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl Config {
    pub fn per_core() -> Self {
        Self {
            processes: num_cpus::get(),
            ..Default::default()
        }
    }

    pub fn with_worker(mut self, worker: WorkerCommand) -> Self {
        self.worker = worker;
        self
    }
}


pub type IsolatedTaskRunnerRef = Arc<IsolatedTaskRunner>;

pub struct IsolatedTaskRunner {
    idle: ArrayQueue<ProcessWorker>,
    slots: Semaphore,
    processes: usize,
    command: WorkerCommand,
    start_method: StartMethod,
    jitter: Jitter,
    shutdown_grace: Duration,
    next_id: AtomicU64,
    processes_launched: AtomicUsize,
    completed_tasks: AtomicUsize,
    failed_tasks: AtomicUsize,
}

impl IsolatedTaskRunner {
    /// Запускает все процессы сразу. Нужен контекст runtime tokio.
    pub fn new(config: Config) -> SpawnResult<IsolatedTaskRunnerRef> {
        let processes = config.processes.max(1);
        let start_method = config.start_method.unwrap_or_else(start_method::resolve);
        if !start_method.is_launchable() {
            return Err(PoolError::UnsupportedStartMethod(start_method));
        }

        let runner = Self {
            idle: ArrayQueue::new(processes),
            slots: Semaphore::new(processes),
            processes,
            command: config.worker,
            start_method,
            jitter: config.jitter,
            shutdown_grace: config.shutdown_grace,
            next_id: AtomicU64::new(1),
            processes_launched: AtomicUsize::new(0),
            completed_tasks: AtomicUsize::new(0),
            failed_tasks: AtomicUsize::new(0),
        };

        for _ in 0..processes {
            let worker = runner.launch()?;
            runner.release(worker);
        }

        tracing::debug!(
            processes,
            ?start_method,
            program = %runner.command.program.display(),
            "isolated pool started"
        );
        Ok(Arc::new(runner))
    }

    fn launch(&self) -> SpawnResult<ProcessWorker> {
        let worker = ProcessWorker::launch(&self.command, self.start_method)?;
        self.processes_launched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(pid = ?worker.pid(), "worker process launched");
        Ok(worker)
    }

    fn release(&self, worker: ProcessWorker) {
        if let Err(extra) = self.idle.push(worker) {
            tracing::warn!(pid = ?extra.pid(), "idle queue full, dropping worker");
        }
    }

    #[inline]
    pub fn start_method(&self) -> StartMethod {
        self.start_method
    }

    /// Сон на jitter в текущем потоке; возвращает длительность сна
    pub fn run_jitter_task(&self) -> Duration {
        self.jitter.sleep_blocking()
    }

    /// Выполняет jitter в процессе-воркере и ждет результата.
    ///
    /// Упавший или нарушивший протокол воркер выбрасывается, следующий
    /// вызов запускает замену. Сам вызов не повторяется.
    pub async fn run_jitter_in_pool(&self) -> SpawnResult<Duration> {
        let _permit = self.slots.acquire().await.map_err(|_| PoolError::ShutDown)?;

        let mut worker = match self.idle.pop() {
            Some(worker) => worker,
            None => self.launch().inspect_err(|_| {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
            })?,
        };

        let request = Request {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            item: WorkItem::Jitter,
            window_nanos: self.jitter.window_nanos(),
        };

        let result = match worker.call(&request).await {
            Ok(Response::Done { slept_nanos, .. }) => {
                let slept = Duration::from_nanos(slept_nanos);
                if self.jitter.contains(slept) {
                    Ok(slept)
                } else {
                    Err(PoolError::Protocol(format!(
                        "reported {slept:?} outside jitter window {:?}",
                        self.jitter.window
                    )))
                }
            }
            Ok(Response::Failed { message, .. }) => Err(PoolError::WorkerFailed(message)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => {
                self.completed_tasks.fetch_add(1, Ordering::Relaxed);
                self.release(worker);
            }
            Err(PoolError::WorkerFailed(message)) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(pid = ?worker.pid(), %message, "worker reported failure");
                self.release(worker);
            }
            Err(error) => {
                self.failed_tasks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(pid = ?worker.pid(), %error, "discarding worker process");
            }
        }

        result
    }

    /// Отправка без ожидания; результат доступен через handle
    pub fn submit_jitter(self: &Arc<Self>) -> JoinHandle<Duration> {
        let (tx, rx) = oneshot::channel();
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            let _ = tx.send(runner.run_jitter_in_pool().await);
        });
        JoinHandle::new(rx)
    }

    #[inline]
    pub fn metrics(&self) -> ProcessPoolMetrics {
        ProcessPoolMetrics {
            processes: self.processes,
            processes_launched: self.processes_launched.load(Ordering::Relaxed),
            idle_processes: self.idle.len(),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Дожидается текущих вызовов, затем закрывает воркеров.
    /// Новые вызовы после этого получают `ShutDown`.
    pub async fn shutdown(&self) {
        let all_slots = match self.slots.acquire_many(self.processes as u32).await {
            Ok(permits) => permits,
            Err(_) => return,
        };
        self.slots.close();
        drop(all_slots);

        let mut workers = Vec::with_capacity(self.processes);
        while let Some(worker) = self.idle.pop() {
            workers.push(worker);
        }

        let grace = self.shutdown_grace;
        let results = join_all(workers.into_iter().map(|w| w.shutdown(grace))).await;
        let killed = results.iter().filter(|r| matches!(r, Ok(None))).count();
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            tracing::warn!(error = %err, "worker process shutdown failed");
        }
        tracing::debug!(stopped = results.len(), killed, "isolated pool stopped");
    }
}

impl std::fmt::Debug for IsolatedTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedTaskRunner")
            .field("start_method", &self.start_method)
            .field("metrics", &self.metrics())
            .finish()
    }
}
