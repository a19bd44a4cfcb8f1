//! Backend that drives the `codex exec --experimental-json` CLI
//!
//! Every turn spawns one `codex exec` process. The prompt is written to its
//! stdin and events are read line by line from stdout. Once Codex reports a
//! thread id, later turns pass `resume <id>` so the conversation continues.

use async_trait::async_trait;
use codex_acp_config::CodexConnection;
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{Backend, EventStream, Thread, ThreadEvent, ThreadOptions};
use crate::error::BackendError;

/// Executable used when no override is configured
pub const DEFAULT_PROGRAM: &str = "codex";

/// How long `close` waits for Codex to exit on its own after a terminal event
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// How to launch the Codex CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    pub program: PathBuf,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            base_url: None,
            api_key: None,
        }
    }
}

impl From<&CodexConnection> for ExecConfig {
    fn from(connection: &CodexConnection) -> Self {
        Self {
            program: connection
                .path_override
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROGRAM)),
            base_url: connection.base_url.clone(),
            api_key: connection.api_key.clone(),
        }
    }
}

/// [`Backend`] backed by the Codex CLI
#[derive(Debug, Clone, Default)]
pub struct CodexExec {
    config: Arc<ExecConfig>,
}

impl CodexExec {
    pub fn new(config: ExecConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl Backend for CodexExec {
    fn start_thread(&self, options: ThreadOptions) -> Arc<dyn Thread> {
        Arc::new(CodexThread {
            config: Arc::clone(&self.config),
            options,
            id: Arc::new(Mutex::new(None)),
        })
    }
}

struct CodexThread {
    config: Arc<ExecConfig>,
    options: ThreadOptions,
    id: Arc<Mutex<Option<String>>>,
}

/// Arguments for one `codex exec` invocation
pub fn exec_args(options: &ThreadOptions, thread_id: Option<&str>) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["exec".into(), "--experimental-json".into()];

    if let Some(model) = &options.model {
        args.push("--model".into());
        args.push(model.into());
    }
    if let Some(sandbox) = options.sandbox_mode {
        args.push("--sandbox".into());
        args.push(sandbox.as_str().into());
    }
    if let Some(dir) = &options.working_directory {
        args.push("--cd".into());
        args.push(dir.into());
    }
    if options.skip_git_repo_check {
        args.push("--skip-git-repo-check".into());
    }
    if let Some(id) = thread_id {
        args.push("resume".into());
        args.push(id.into());
    }

    args
}

#[async_trait]
impl Thread for CodexThread {
    fn id(&self) -> Option<String> {
        self.id.lock().clone()
    }

    async fn run_streamed(&self, input: &str) -> Result<Box<dyn EventStream>, BackendError> {
        let thread_id = self.id();
        let mut cmd = Command::new(&self.config.program);
        cmd.args(exec_args(&self.options, thread_id.as_deref()));

        if let Some(base_url) = &self.config.base_url {
            cmd.env("OPENAI_BASE_URL", base_url);
        }
        if let Some(api_key) = &self.config.api_key {
            cmd.env("CODEX_API_KEY", api_key);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BackendError::Spawn {
            program: self.config.program.display().to_string(),
            source,
        })?;
        debug!(
            program = %self.config.program.display(),
            resume = thread_id.is_some(),
            "spawned codex exec"
        );

        let mut stdin = child.stdin.take().ok_or(BackendError::Closed)?;
        let stdout = child.stdout.take().ok_or(BackendError::Closed)?;
        let stderr = child.stderr.take();

        // Drain stderr before writing the prompt; a child that logs before
        // reading stdin would otherwise block on a full pipe
        let stderr_task = stderr.map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf).await;
                buf
            })
        });

        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await?;
        drop(stdin);

        Ok(Box::new(ExecEventStream {
            child,
            lines: Some(BufReader::new(stdout).lines()),
            stderr_task,
            thread_id: Arc::clone(&self.id),
            saw_terminal: false,
            done: false,
        }))
    }
}

struct ExecEventStream {
    child: Child,
    lines: Option<Lines<BufReader<ChildStdout>>>,
    stderr_task: Option<JoinHandle<String>>,
    thread_id: Arc<Mutex<Option<String>>>,
    saw_terminal: bool,
    done: bool,
}

impl ExecEventStream {
    async fn collect_stderr(&mut self) -> String {
        match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        }
    }

    /// Reap the child after stdout hit EOF
    async fn finish(&mut self) -> Option<Result<ThreadEvent, BackendError>> {
        self.done = true;
        self.lines = None;

        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => return Some(Err(BackendError::Io(e))),
        };
        if status.success() {
            return None;
        }

        let stderr = self.collect_stderr().await;
        Some(Err(BackendError::Exited {
            status: status.to_string(),
            stderr,
        }))
    }
}

#[async_trait]
impl EventStream for ExecEventStream {
    async fn next_event(&mut self) -> Option<Result<ThreadEvent, BackendError>> {
        if self.done {
            return None;
        }

        loop {
            let lines = self.lines.as_mut()?;
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return self.finish().await,
                Err(e) => {
                    self.done = true;
                    return Some(Err(BackendError::Io(e)));
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let event = match serde_json::from_str::<ThreadEvent>(&line) {
                Ok(event) => event,
                Err(e) => return Some(Err(BackendError::Decode(e))),
            };

            if let ThreadEvent::ThreadStarted { thread_id } = &event {
                *self.thread_id.lock() = Some(thread_id.clone());
            }
            if event.is_terminal() {
                self.saw_terminal = true;
            }

            return Some(Ok(event));
        }
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if self.done {
            return Ok(());
        }
        self.done = true;
        self.lines = None;

        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        // After turn.completed Codex is persisting the thread; let it exit
        if self.saw_terminal {
            if let Ok(status) = tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
                status?;
                return Ok(());
            }
        }

        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill codex exec");
            return Err(BackendError::Io(e));
        }
        Ok(())
    }
}
