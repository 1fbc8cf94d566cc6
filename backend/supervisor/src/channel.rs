//! Newline-delimited JSON request/response channel to a tool server.
//!
//! Each request is one line `{"id": N, "method": "...", "params": {...}}`;
//! the server answers with `{"id": N, "result": ...}` or
//! `{"id": N, "error": "..."}`. Responses may arrive out of order; they are
//! matched back to callers by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::health::{HealthCell, HealthStatus};

/// How long a single request may wait for its response.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct RequestFrame<'a> {
    id: u64,
    method: &'a str,
    params: &'a Value,
}

#[derive(Deserialize)]
struct ResponseFrame {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

type Pending = StdMutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>;

/// The only way other components talk to a supervised subprocess.
pub struct ServerChannel {
    writer: Mutex<Option<ChildStdin>>,
    pending: Pending,
    next_id: AtomicU64,
    open: AtomicBool,
    health: Arc<HealthCell>,
}

impl ServerChannel {
    pub(crate) fn new(stdin: ChildStdin, health: Arc<HealthCell>) -> Self {
        Self {
            writer: Mutex::new(Some(stdin)),
            pending: StdMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
            health,
        }
    }

    /// Whether the channel can still carry requests.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Send one request and await its response.
    ///
    /// A timed-out request marks the entry `Degraded`; a successful response
    /// marks it `Healthy` again.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if !self.is_open() {
            bail!("tool server channel is closed");
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, tx);

        let frame = RequestFrame {
            id,
            method,
            params: &params,
        };
        let mut line = serde_json::to_string(&frame)?;
        line.push('\n');

        {
            let mut writer = self.writer.lock().await;
            let Some(stdin) = writer.as_mut() else {
                self.forget(id);
                bail!("tool server channel is closed");
            };
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.forget(id);
                bail!("failed to write to tool server: {e}");
            }
            stdin.flush().await.ok();
        }

        match timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => {
                self.health.set(HealthStatus::Healthy);
                Ok(result)
            }
            Ok(Ok(Err(message))) => {
                // The server answered; the call itself failed.
                self.health.set(HealthStatus::Healthy);
                Err(anyhow!("tool server error: {message}"))
            }
            Ok(Err(_)) => bail!("tool server exited before responding"),
            Err(_) => {
                self.forget(id);
                self.health.set(HealthStatus::Degraded);
                bail!("tool server request '{method}' timed out")
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending.lock().expect("pending map poisoned").remove(&id);
    }

    /// Consume stdout lines, routing responses to waiting callers. Runs until
    /// the pipe closes.
    pub(crate) async fn read_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<ResponseFrame>(line) {
                        Ok(frame) => self.deliver(frame),
                        Err(e) => {
                            warn!(error = %e, "Discarding malformed tool server frame");
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Tool server stdout read failed");
                    break;
                }
            }
        }
        debug!("Tool server stdout closed");
        self.close();
    }

    fn deliver(&self, frame: ResponseFrame) {
        let waiter = self
            .pending
            .lock()
            .expect("pending map poisoned")
            .remove(&frame.id);
        let Some(tx) = waiter else {
            debug!(id = frame.id, "Response for unknown request id");
            return;
        };
        let outcome = match frame.error {
            Some(message) => Err(message),
            None => Ok(frame.result.unwrap_or(Value::Null)),
        };
        let _ = tx.send(outcome);
    }

    /// Close the write side (EOF is the graceful stop signal for tool
    /// servers). Subsequent requests fail.
    pub(crate) async fn close_input(&self) {
        self.open.store(false, Ordering::Release);
        self.writer.lock().await.take();
    }

    /// Mark the channel dead and fail every pending request. Dropping the
    /// senders resolves each waiter with a recv error, which `request` reports
    /// as the server exiting before responding.
    pub(crate) fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.pending.lock().expect("pending map poisoned").clear();
    }
}
