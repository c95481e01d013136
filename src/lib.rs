//! Пулы для имитации конкурентной нагрузки на общий счетчик
//!
//! # Features
//! - `BackgroundTaskRunner`: инкременты счетчика синхронно, отдельным потоком
//!   или через ограниченный пул из 10 воркеров
//! - `IsolatedTaskRunner`: jitter-задачи в пуле из 2 процессов с ожиданием результата
//! - Ошибки fire-and-forget задач уходят в `FailureObserver`
//! - Явный shutdown у каждого пула
//! - Одноразовый выбор безопасного способа запуска процессов

pub mod accumulator;
pub mod background;
pub mod errors;
pub mod failure;
pub mod handle;
pub mod isolated;
pub mod jitter;
pub mod model;
pub mod pool;
pub mod process;
pub mod protocol;
pub mod result;
pub mod start_method;
pub mod worker;

pub use accumulator::Accumulator;
pub use background::BackgroundTaskRunner;
pub use errors::PoolError;
pub use failure::{FailureChannel, FailureObserver, LogFailures, TaskFailure};
pub use isolated::IsolatedTaskRunner;
pub use jitter::Jitter;
pub use model::WorkItem;
pub use process::WorkerCommand;
pub use result::SpawnResult;
pub use start_method::StartMethod;
