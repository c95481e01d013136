use super::errors::PoolError;

pub type SpawnResult<T> = Result<T, PoolError>;
