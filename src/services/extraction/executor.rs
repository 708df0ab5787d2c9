//! Executors run page tasks for one worker slot of the pool.
//!
//! [`ProcessExecutor`] keeps a long-lived worker process per slot and talks
//! to it over stdin/stdout, one JSON line per task and per result.
//! [`ThreadExecutor`] runs the same [`PageWorker`] on tokio's blocking pool.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::types::WorkerSettings;
use super::worker::{Cancellation, PageWorker};
use crate::models::{FailureKind, PageFailure, PageResult, PageTask};

/// Runs tasks for one slot, one at a time.
#[async_trait]
pub trait PageExecutor: Send {
    /// Run `task` to completion. Never fails: every problem becomes a failed result.
    async fn execute(&mut self, task: PageTask) -> PageResult;

    /// Release the slot's resources once the queue is drained.
    async fn shutdown(&mut self) {}
}

fn failed(page_number: u32, start: Instant, kind: FailureKind, message: String) -> PageResult {
    PageResult::failed(
        page_number,
        start.elapsed().as_secs_f64(),
        PageFailure::new(kind, message),
    )
}

fn timeout_message(page_number: u32, limit: Duration) -> String {
    format!(
        "page {} exceeded the {}s time limit",
        page_number,
        limit.as_secs()
    )
}

/// In-process executor backed by `spawn_blocking`.
pub struct ThreadExecutor {
    settings: Arc<WorkerSettings>,
    worker: Option<PageWorker>,
}

impl ThreadExecutor {
    pub fn new(settings: Arc<WorkerSettings>) -> Self {
        let worker = PageWorker::new(&settings);
        Self {
            settings,
            worker: Some(worker),
        }
    }
}

#[async_trait]
impl PageExecutor for ThreadExecutor {
    async fn execute(&mut self, task: PageTask) -> PageResult {
        let start = Instant::now();
        let page_number = task.page_number();
        let limit = task.timeout();

        // A worker lost to a panic or a timeout is replaced before the next task.
        let mut worker = match self.worker.take() {
            Some(worker) => worker,
            None => PageWorker::new(&self.settings),
        };

        let cancel = Cancellation::default();
        let guard = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let result = worker.process_with(&task, &guard);
            (worker, result)
        });

        let joined = match limit {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Page {} timed out after {:?}", page_number, limit);
                    // The thread cannot be stopped; keep it from writing artifacts.
                    cancel.cancel();
                    return failed(
                        page_number,
                        start,
                        FailureKind::Timeout,
                        timeout_message(page_number, limit),
                    );
                }
            },
            None => handle.await,
        };

        match joined {
            Ok((worker, result)) => {
                self.worker = Some(worker);
                result
            }
            Err(e) => failed(
                page_number,
                start,
                FailureKind::WorkerLost,
                format!("worker thread failed: {}", e),
            ),
        }
    }
}

/// Command line that starts a worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerProgram {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerProgram {
    pub fn new(program: impl Into<PathBuf>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The running executable with its hidden `worker` subcommand.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, ["worker"]))
    }
}

struct WorkerChild {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl WorkerChild {
    async fn spawn(program: &WorkerProgram, settings: &WorkerSettings) -> io::Result<Self> {
        let mut child = Command::new(&program.program)
            .args(&program.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdout unavailable"))?;

        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };
        worker.send_line(&serde_json::to_string(settings)?).await?;
        tracing::debug!("Started worker process {:?}", worker.child.id());
        Ok(worker)
    }

    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    async fn submit(&mut self, task: &PageTask) -> Result<PageResult, String> {
        let line = serde_json::to_string(task).map_err(|e| e.to_string())?;
        self.send_line(&line)
            .await
            .map_err(|e| format!("failed to send task to worker: {}", e))?;

        let reply = match self.stdout.next_line().await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err("worker process exited".to_string()),
            Err(e) => return Err(format!("failed to read worker reply: {}", e)),
        };

        let result: PageResult =
            serde_json::from_str(&reply).map_err(|e| format!("invalid worker reply: {}", e))?;
        if result.page_number != task.page_number() {
            return Err(format!(
                "worker answered page {} for page {}",
                result.page_number,
                task.page_number()
            ));
        }
        Ok(result)
    }

    async fn kill(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!("Failed to kill worker process: {}", e);
        }
    }

    /// Close stdin so the worker loop ends, then reap the process.
    async fn finish(self) {
        let WorkerChild {
            mut child, stdin, ..
        } = self;
        drop(stdin);
        if let Err(e) = child.wait().await {
            tracing::debug!("Failed to wait for worker process: {}", e);
        }
    }
}

/// Executor backed by a dedicated OS process.
///
/// A worker that times out, crashes or answers garbage is killed and a fresh
/// one is started for the next task.
pub struct ProcessExecutor {
    program: WorkerProgram,
    settings: Arc<WorkerSettings>,
    child: Option<WorkerChild>,
}

impl ProcessExecutor {
    /// Start the slot's worker process.
    pub async fn spawn(program: WorkerProgram, settings: Arc<WorkerSettings>) -> io::Result<Self> {
        let child = WorkerChild::spawn(&program, &settings).await?;
        Ok(Self {
            program,
            settings,
            child: Some(child),
        })
    }
}

#[async_trait]
impl PageExecutor for ProcessExecutor {
    async fn execute(&mut self, task: PageTask) -> PageResult {
        let start = Instant::now();
        let page_number = task.page_number();

        let mut child = match self.child.take() {
            Some(child) => child,
            None => match WorkerChild::spawn(&self.program, &self.settings).await {
                Ok(child) => child,
                Err(e) => {
                    return failed(
                        page_number,
                        start,
                        FailureKind::WorkerLost,
                        format!("failed to start worker process: {}", e),
                    )
                }
            },
        };

        let reply = match task.timeout() {
            Some(limit) => match tokio::time::timeout(limit, child.submit(&task)).await {
                Ok(reply) => reply,
                Err(_) => {
                    tracing::warn!(
                        "Page {} timed out after {:?}, restarting worker",
                        page_number,
                        limit
                    );
                    child.kill().await;
                    return failed(
                        page_number,
                        start,
                        FailureKind::Timeout,
                        timeout_message(page_number, limit),
                    );
                }
            },
            None => child.submit(&task).await,
        };

        match reply {
            Ok(result) => {
                self.child = Some(child);
                result
            }
            Err(reason) => {
                tracing::warn!("Worker lost on page {}: {}", page_number, reason);
                child.kill().await;
                failed(page_number, start, FailureKind::WorkerLost, reason)
            }
        }
    }

    async fn shutdown(&mut self) {
        if let Some(child) = self.child.take() {
            child.finish().await;
        }
    }
}
