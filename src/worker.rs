//! Сторона процесса-воркера. Читает запросы из `input`, отвечает в `output`.
//! Завершается, когда вход закрыт.

use super::{
    jitter::Jitter,
    model::Outcome,
    protocol::{Request, Response},
};
use std::io::{self, BufRead, Write};

pub fn handle(request: Request) -> Response {
    let jitter = Jitter::from_nanos(request.window_nanos);
    match request.item.execute(&jitter, None) {
        Ok(Outcome::Slept(d)) => Response::Done {
            id: request.id,
            slept_nanos: u64::try_from(d.as_nanos()).unwrap_or(u64::MAX),
        },
        Ok(other) => Response::Failed {
            id: request.id,
            message: format!("unexpected outcome {other:?}"),
        },
        Err(e) => Response::Failed {
            id: request.id,
            message: e.to_string(),
        },
    }
}

pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<usize> {
    let mut served = 0;
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle(request),
            Err(e) => Response::Failed {
                id: 0,
                message: format!("malformed request: {e}"),
            },
        };
        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
    }
    Ok(served)
}

pub fn serve_stdio() -> io::Result<usize> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::WorkItem, protocol::decode_line};

    fn run(input: &str) -> Vec<Response> {
        let mut out = Vec::new();
        serve(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| decode_line(l).unwrap())
            .collect()
    }

    #[test]
    fn jitter_reply_stays_in_window() {
        let replies = run("{\"id\":1,\"item\":{\"kind\":\"jitter\"},\"window_nanos\":100000}\n");
        match &replies[..] {
            [Response::Done { id: 1, slept_nanos }] => assert!(*slept_nanos < 100_000),
            other => panic!("unexpected replies {other:?}"),
        }
    }

    #[test]
    fn increment_is_rejected_without_shared_memory() {
        let response = handle(Request {
            id: 9,
            item: WorkItem::Increment { value: 1 },
            window_nanos: 0,
        });
        assert!(matches!(response, Response::Failed { id: 9, .. }));
    }

    #[test]
    fn malformed_lines_get_a_failure_and_serving_continues() {
        let replies = run("garbage\n\n{\"id\":2,\"item\":{\"kind\":\"jitter\"},\"window_nanos\":0}\n");
        assert_eq!(replies.len(), 2);
        assert!(matches!(replies[0], Response::Failed { id: 0, .. }));
        assert_eq!(replies[1], Response::Done { id: 2, slept_nanos: 0 });
    }
}
