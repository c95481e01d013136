//! Маршрутизация ошибок fire-and-forget задач.
//!
//! Вызывающая сторона не получает handle, поэтому ошибки воркеров
//! уходят в `FailureObserver`, а не теряются молча.

use super::{errors::PoolError, model::WorkItem};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    Pool,
    Thread,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub origin: FailureOrigin,
    pub item: WorkItem,
    pub error: PoolError,
}

pub trait FailureObserver: Send + Sync + 'static {
    fn on_failure(&self, failure: TaskFailure);
}

/// Наблюдатель по умолчанию: пишет в tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailures;

impl FailureObserver for LogFailures {
    fn on_failure(&self, failure: TaskFailure) {
        tracing::warn!(
            origin = ?failure.origin,
            item = ?failure.item,
            error = %failure.error,
            "background task failed"
        );
    }
}

impl<F> FailureObserver for F
where
    F: Fn(TaskFailure) + Send + Sync + 'static,
{
    fn on_failure(&self, failure: TaskFailure) {
        self(failure)
    }
}

/// Ограниченный канал ошибок. Воркер никогда не блокируется:
/// при переполнении ошибка считается потерянной и логируется.
#[derive(Debug, Clone)]
pub struct FailureChannel {
    tx: mpsc::Sender<TaskFailure>,
    dropped: Arc<AtomicUsize>,
}

impl FailureChannel {
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<TaskFailure>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicUsize::new(0)),
            },
            rx,
        )
    }

    #[inline]
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FailureObserver for FailureChannel {
    fn on_failure(&self, failure: TaskFailure) {
        match self.tx.try_send(failure) {
            Ok(()) => {}
            Err(TrySendError::Full(failure)) | Err(TrySendError::Closed(failure)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    origin = ?failure.origin,
                    error = %failure.error,
                    "failure channel unavailable, dropping report"
                );
            }
        }
    }
}

/// Супервизор: вычитывает канал до закрытия всех отправителей.
/// Возвращает количество обработанных ошибок.
pub fn spawn_supervisor<F>(mut rx: mpsc::Receiver<TaskFailure>, mut handler: F) -> JoinHandle<usize>
where
    F: FnMut(TaskFailure) + Send + 'static,
{
    tokio::spawn(async move {
        let mut handled = 0;
        while let Some(failure) = rx.recv().await {
            handler(failure);
            handled += 1;
        }
        tracing::debug!(handled, "failure supervisor finished");
        handled
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(value: i64) -> TaskFailure {
        TaskFailure {
            origin: FailureOrigin::Pool,
            item: WorkItem::Increment { value },
            error: PoolError::ShutDown,
        }
    }

    #[test]
    fn full_channel_counts_drops() {
        let (channel, mut rx) = FailureChannel::bounded(1);
        channel.on_failure(failure(1));
        channel.on_failure(failure(2));
        assert_eq!(channel.dropped(), 1);
        assert_eq!(rx.try_recv().unwrap().item, WorkItem::Increment { value: 1 });
    }

    #[tokio::test]
    async fn supervisor_drains_until_closed() {
        let (channel, rx) = FailureChannel::bounded(8);
        let supervisor = spawn_supervisor(rx, |_| {});
        for i in 0..5 {
            channel.on_failure(failure(i));
        }
        drop(channel);
        assert_eq!(supervisor.await.unwrap(), 5);
    }

    #[test]
    fn closures_are_observers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let observer: Arc<dyn FailureObserver> = Arc::new(move |_f: TaskFailure| {
            seen_clone.fetch_add(1, Ordering::Relaxed);
        });
        observer.on_failure(failure(0));
        assert_eq!(seen.load(Ordering::Relaxed), 1);
    }
}
