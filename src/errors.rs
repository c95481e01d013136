use crate::start_method::StartMethod;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum PoolError {
    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("panic in task: {0}")]
    Panic(String),

    #[error("result channel closed")]
    ChannelClosed,

    #[error("pool is shut down")]
    ShutDown,

    #[error("accumulator overflow: {current} + {value}")]
    Overflow { current: i64, value: i64 },

    #[error("accumulator lock poisoned")]
    LockPoisoned,

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(String),

    #[error("work item not supported here: {0}")]
    Unsupported(String),

    #[error("failed to launch worker process: {0}")]
    WorkerLaunch(String),

    #[error("worker process exited: {0}")]
    WorkerExited(String),

    #[error("worker failed: {0}")]
    WorkerFailed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(String),

    #[error("start method {0:?} cannot be used to launch workers")]
    UnsupportedStartMethod(StartMethod),
}

impl From<std::io::Error> for PoolError {
    fn from(err: std::io::Error) -> Self {
        PoolError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(err: serde_json::Error) -> Self {
        PoolError::Protocol(err.to_string())
    }
}

/// Текст из payload паники
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
