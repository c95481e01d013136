use super::{errors::PoolError, result::SpawnResult};
use std::sync::Mutex;

/// Общий счетчик под единственной блокировкой.
/// Любое изменение выполняется только при удержании `Mutex`.
#[derive(Debug, Default)]
pub struct Accumulator {
    counter: Mutex<i64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Прибавляет `value` под блокировкой и возвращает новое значение.
    /// При переполнении счетчик не меняется.
    pub fn add(&self, value: i64) -> SpawnResult<i64> {
        let mut counter = self.counter.lock().map_err(|_| PoolError::LockPoisoned)?;
        let next = counter.checked_add(value).ok_or(PoolError::Overflow {
            current: *counter,
            value,
        })?;
        *counter = next;
        Ok(next)
    }

    pub fn value(&self) -> SpawnResult<i64> {
        self.counter
            .lock()
            .map(|c| *c)
            .map_err(|_| PoolError::LockPoisoned)
    }
}
