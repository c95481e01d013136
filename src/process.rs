use super::{
    errors::PoolError,
    protocol::{self, Request, Response},
    result::SpawnResult,
    start_method::StartMethod,
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, process::{ExitStatus, Stdio}};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::Duration,
};

const REAP_WAIT: Duration = Duration::from_millis(200);

/// Команда запуска процесса-воркера
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCommand {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for WorkerCommand {
    /// Текущий исполняемый файл с подкомандой `worker`
    fn default() -> Self {
        let program = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("loadpool"));
        Self::new(program).arg("worker")
    }
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}


/// Долгоживущий процесс-воркер с каналом через stdin/stdout
pub struct ProcessWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
    pid: Option<u32>,
}

impl ProcessWorker {
    pub fn launch(command: &WorkerCommand, method: StartMethod) -> SpawnResult<Self> {
        if !method.is_launchable() {
            return Err(PoolError::UnsupportedStartMethod(method));
        }

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PoolError::WorkerLaunch(format!("{}: {e}", command.program.display())))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::WorkerLaunch("stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::WorkerLaunch("stdout was not captured".into()))?;

        Ok(Self {
            pid: child.id(),
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout).lines(),
        })
    }

    #[inline]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Отправляет запрос и ждет ответ с тем же id
    pub async fn call(&mut self, request: &Request) -> SpawnResult<Response> {
        let line = protocol::encode_line(request)?;
        let stdin = self.stdin.as_mut().ok_or(PoolError::ShutDown)?;

        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return Err(self.exit_error(&format!("rejected request ({e})")).await);
        }

        let reply = match self.stdout.next_line().await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(self.exit_error("closed its output").await),
            Err(e) => return Err(e.into()),
        };

        let response: Response = protocol::decode_line(&reply)?;
        if response.id() != request.id {
            return Err(PoolError::Protocol(format!(
                "reply id {} does not match request id {}",
                response.id(),
                request.id
            )));
        }
        Ok(response)
    }

    async fn exit_error(&mut self, context: &str) -> PoolError {
        let status = match tokio::time::timeout(REAP_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => status.to_string(),
            Ok(Err(e)) => format!("unknown ({e})"),
            Err(_) => "still running".to_string(),
        };
        PoolError::WorkerExited(format!("pid {:?} {context}, status: {status}", self.pid))
    }

    /// Закрывает stdin и ждет выхода; по истечении `grace` убивает процесс.
    /// `None`, если пришлось убить.
    pub async fn shutdown(mut self, grace: Duration) -> SpawnResult<Option<ExitStatus>> {
        drop(self.stdin.take());
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => Ok(Some(status?)),
            Err(_) => {
                tracing::warn!(pid = ?self.pid, "worker ignored shutdown, killing");
                self.child.kill().await?;
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ProcessWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessWorker").field("pid", &self.pid).finish()
    }
}
