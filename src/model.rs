use super::{
    accumulator::Accumulator,
    errors::PoolError,
    jitter::Jitter,
    result::SpawnResult,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Неизменяемое описание единицы работы
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkItem {
    Increment { value: i64 },
    Jitter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Новое значение счетчика после прибавления
    Applied(i64),
    Slept(Duration),
}

impl WorkItem {
    /// Сон на случайную задержку, затем эффект.
    /// `Increment` требует счетчик в том же адресном пространстве.
    pub fn execute(self, jitter: &Jitter, accumulator: Option<&Accumulator>) -> SpawnResult<Outcome> {
        match self {
            WorkItem::Increment { value } => {
                let acc = accumulator.ok_or_else(|| {
                    PoolError::Unsupported("increment needs a shared accumulator".into())
                })?;
                jitter.sleep_blocking();
                acc.add(value).map(Outcome::Applied)
            }
            WorkItem::Jitter => Ok(Outcome::Slept(jitter.sleep_blocking())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PoolMetrics {
    pub workers: usize,
    pub workers_started: usize,
    pub active_tasks: usize,
    pub idle_workers: usize,
    pub queued_tasks: usize,
    pub total_submitted: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub threads_in_flight: usize,
}

impl PoolMetrics {
    pub fn utilization(&self) -> f64 {
        if self.workers == 0 {
            return 0.0;
        }
        self.workers.saturating_sub(self.idle_workers) as f64 / self.workers as f64
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessPoolMetrics {
    pub processes: usize,
    pub processes_launched: usize,
    pub idle_processes: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

impl ProcessPoolMetrics {
    pub fn success_rate(&self) -> f64 {
        let total = self.completed_tasks + self.failed_tasks;
        if total == 0 {
            return 1.0;
        }
        self.completed_tasks as f64 / total as f64
    }
}
