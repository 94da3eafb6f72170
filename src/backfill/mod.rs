//! Backfill dispatch.
//!
//! After a batch, the accepted contract ids are handed to an external
//! backfill program as trailing decimal arguments. The run happens on a
//! background task; its output is forwarded line by line to tracing and the
//! caller gets a [`BackfillHandle`] to observe completion.

pub mod errors;

pub use errors::BackfillError;

use crate::store::ContractId;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Starts a backfill run for a set of contract ids.
pub trait BackfillLauncher: Send + Sync {
    /// Must be called from within a tokio runtime.
    fn launch(&self, ids: Vec<ContractId>) -> BackfillHandle;
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillSummary {
    pub ids: Vec<ContractId>,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

/// Running backfill. Resolves when the program exits.
#[derive(Debug)]
pub struct BackfillHandle {
    ids: Vec<ContractId>,
    task: JoinHandle<Result<BackfillSummary, BackfillError>>,
}

impl BackfillHandle {
    /// Drive `run` on a background task.
    pub fn spawn<F>(ids: Vec<ContractId>, run: F) -> Self
    where
        F: Future<Output = Result<BackfillSummary, BackfillError>> + Send + 'static,
    {
        Self { ids, task: tokio::spawn(run) }
    }

    /// Contract ids this run was dispatched for.
    pub fn ids(&self) -> &[ContractId] {
        &self.ids
    }
}

impl Future for BackfillHandle {
    type Output = Result<BackfillSummary, BackfillError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(BackfillError::Aborted(e.to_string()))),
        }
    }
}

/// Launches an external program: `<program> <args>... <id>...`.
#[derive(Debug, Clone)]
pub struct BackfillDispatcher {
    program: PathBuf,
    args: Vec<String>,
}

impl BackfillDispatcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    /// Fixed arguments placed before the contract ids.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Full argument list for a run over `ids`.
    pub fn arguments(&self, ids: &[ContractId]) -> Vec<String> {
        self.args.iter().cloned().chain(ids.iter().map(|id| id.to_string())).collect()
    }

    fn command(&self, ids: &[ContractId]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.arguments(ids))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl BackfillLauncher for BackfillDispatcher {
    fn launch(&self, ids: Vec<ContractId>) -> BackfillHandle {
        let command = self.command(&ids);
        let program = self.program.display().to_string();
        info!(%program, ids = ?ids, "dispatching backfill");
        BackfillHandle::spawn(ids.clone(), run(command, program, ids))
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

async fn run(
    mut command: Command,
    program: String,
    ids: Vec<ContractId>,
) -> Result<BackfillSummary, BackfillError> {
    let mut child = command
        .spawn()
        .map_err(|e| BackfillError::Spawn { program: program.clone(), reason: e.to_string() })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (stdout_lines, stderr_lines, status) = tokio::join!(
        forward(stdout, Stream::Stdout),
        forward(stderr, Stream::Stderr),
        child.wait()
    );
    let status = status.map_err(|e| BackfillError::Io(e.to_string()))?;

    if !status.success() {
        warn!(%program, %status, "backfill failed");
        return Err(BackfillError::Failed { status: status.to_string(), code: status.code() });
    }
    info!(%program, stdout_lines, stderr_lines, "backfill finished");
    Ok(BackfillSummary { ids, stdout_lines, stderr_lines })
}

/// Drain `reader` to EOF, logging each line. Invalid UTF-8 is replaced
/// lossily and reading continues.
async fn forward<R: AsyncRead + Unpin>(reader: Option<R>, stream: Stream) -> usize {
    let Some(reader) = reader else {
        return 0;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(target: "backfill", error = %e, ?stream, "stopped reading backfill output");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        match stream {
            Stream::Stdout => info!(target: "backfill", "{line}"),
            Stream::Stderr => warn!(target: "backfill", "{line}"),
        }
        count += 1;
    }
    count
}
