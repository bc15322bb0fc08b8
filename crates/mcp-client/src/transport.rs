//! Stdio transport: JSON-RPC over a child process's stdin/stdout.
//!
//! Each message is one line. Lines on stdout that are not JSON objects are
//! skipped; stderr is forwarded to `tracing` at debug level.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use ac_domain::config::ToolProviderConfig;

use crate::protocol::{Outgoing, RpcResponse};

/// Non-JSON stdout lines tolerated per request before the server is
/// declared broken.
const MAX_SKIP_LINES: usize = 1000;

/// How long `close` waits for the child to exit after stdin is closed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider process has exited")]
    ProcessExited,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("provider wrote too many non-JSON lines to stdout")]
    Garbled,
}

/// A running provider process.
///
/// `exchange` serializes whole request/response cycles so concurrent callers
/// never read each other's responses. The child is killed when the last
/// handle to the transport is dropped.
pub struct StdioTransport {
    provider: String,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    exchange: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
    request_timeout: Duration,
}

impl StdioTransport {
    pub fn spawn(config: &ToolProviderConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| broken_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| broken_pipe("stdout"))?;

        if let Some(stderr) = child.stderr.take() {
            let provider = config.id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(provider = %provider, line = %line, "provider stderr");
                }
            });
        }

        Ok(Self {
            provider: config.id.clone(),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            exchange: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
            request_timeout: config.request_timeout(),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Send a request and wait for the response with the matching id.
    /// Responses to other ids and server notifications are skipped.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<RpcResponse, TransportError> {
        let _guard = self.exchange.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Outgoing::request(id, method, params))?;
        tracing::debug!(provider = %self.provider, id, method, "sending request");
        self.write_line(&line).await?;

        let wait = async {
            loop {
                let line = self.read_line().await?;
                match serde_json::from_str::<RpcResponse>(&line) {
                    Ok(resp) if resp.id == id => break Ok::<_, TransportError>(resp),
                    Ok(resp) => {
                        tracing::debug!(expected = id, got = resp.id, "response for another request");
                    }
                    Err(_) => {
                        tracing::debug!(provider = %self.provider, "skipping server message");
                    }
                }
            }
        };

        tokio::time::timeout(self.request_timeout, wait)
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout))?
    }

    pub async fn notify(&self, method: &str) -> Result<(), TransportError> {
        let line = serde_json::to_string(&Outgoing::notification(method))?;
        tracing::debug!(provider = %self.provider, method, "sending notification");
        self.write_line(&line).await
    }

    /// Close stdin and wait briefly for the process to exit, killing it
    /// if it does not.
    pub async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Err(e) = self.stdin.lock().await.shutdown().await {
            tracing::debug!(provider = %self.provider, error = %e, "error closing provider stdin");
        }

        let mut child = self.child.lock().await;
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(provider = %self.provider, ?status, "provider process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(provider = %self.provider, error = %e, "error waiting for provider process");
            }
            Err(_) => {
                tracing::warn!(provider = %self.provider, "provider did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(provider = %self.provider, error = %e, "failed to kill provider process");
                }
            }
        }
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        let written = async {
            stdin.write_all(json.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            self.alive.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.is_alive() {
            return Err(TransportError::ProcessExited);
        }
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            if stdout.read_line(&mut line).await? == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_owned());
            }
            if trimmed.is_empty() {
                continue;
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Garbled);
            }
            tracing::debug!(provider = %self.provider, line = %trimmed, "skipping non-JSON stdout line");
        }
    }
}

fn broken_pipe(stream: &str) -> TransportError {
    TransportError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        format!("failed to capture child {stream}"),
    ))
}
