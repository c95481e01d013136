//! Протокол между пулом и процессом-воркером: один JSON-объект на строку.

use super::{errors::PoolError, model::WorkItem, result::SpawnResult};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub item: WorkItem,
    pub window_nanos: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Done { id: u64, slept_nanos: u64 },
    Failed { id: u64, message: String },
}

impl Response {
    #[inline]
    pub fn id(&self) -> u64 {
        match self {
            Response::Done { id, .. } | Response::Failed { id, .. } => *id,
        }
    }
}

pub fn encode_line<T: Serialize>(msg: &T) -> SpawnResult<String> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: DeserializeOwned>(line: &str) -> SpawnResult<T> {
    serde_json::from_str(line.trim_end())
        .map_err(|e| PoolError::Protocol(format!("{e} in {:?}", truncate(line, 120))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_line_shape() {
        let line = encode_line(&Request { id: 7, item: WorkItem::Jitter, window_nanos: 100_000 }).unwrap();
        assert_eq!(line, "{\"id\":7,\"item\":{\"kind\":\"jitter\"},\"window_nanos\":100000}\n");
    }

    #[test]
    fn decodes_replies() {
        let done: Response = decode_line("{\"type\":\"done\",\"id\":3,\"slept_nanos\":42}\n").unwrap();
        assert_eq!(done, Response::Done { id: 3, slept_nanos: 42 });
        let failed: Response = decode_line("{\"type\":\"failed\",\"id\":4,\"message\":\"nope\"}").unwrap();
        assert_eq!(failed.id(), 4);
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let res: SpawnResult<Response> = decode_line("not-json");
        assert!(matches!(res, Err(PoolError::Protocol(_))));
    }
}
