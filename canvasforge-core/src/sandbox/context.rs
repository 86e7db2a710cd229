//! Isolated rendering contexts and the bus their replies arrive on.
//!
//! A context is anything that accepts envelopes and eventually answers on the
//! bus. Each inbound message is stamped with the id of the context whose
//! transport delivered it; the payload has no say in where it came from.

use super::message::{Envelope, SandboxMessage};
use super::runtime::{self, SandboxLimits};
use crate::error::{SandboxError, SandboxResult};
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message plus the context it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub source: ContextId,
    pub envelope: Envelope,
}

/// Sending half of the host bus. Contexts push replies here.
pub type Bus = mpsc::UnboundedSender<Inbound>;
pub type BusReceiver = mpsc::UnboundedReceiver<Inbound>;

pub fn bus() -> (Bus, BusReceiver) {
    mpsc::unbounded_channel()
}

pub trait IsolatedContext: Send + Sync {
    fn id(&self) -> ContextId;

    /// Queue an envelope for the context. Never blocks on the context itself.
    fn post(&self, envelope: Envelope) -> SandboxResult<()>;
}

/// A dedicated thread owning its own interpreter. It shares nothing with the
/// host except the two queues.
pub struct WorkerContext {
    id: ContextId,
    inbox: std::sync::mpsc::Sender<Envelope>,
}

impl WorkerContext {
    /// Start the worker. It announces itself with `sandbox-ready` on `bus`.
    pub fn spawn(bus: Bus, limits: SandboxLimits) -> SandboxResult<Self> {
        let id = ContextId::new();
        let (inbox, rx) = std::sync::mpsc::channel::<Envelope>();
        std::thread::Builder::new()
            .name(format!("sandbox-worker-{}", id))
            .spawn(move || worker_loop(id, rx, bus, limits))
            .map_err(|e| SandboxError::ContextUnavailable(format!("failed to start worker: {}", e)))?;
        tracing::info!(context = %id, "sandbox worker started");
        Ok(Self { id, inbox })
    }
}

fn worker_loop(
    id: ContextId,
    inbox: std::sync::mpsc::Receiver<Envelope>,
    bus: Bus,
    limits: SandboxLimits,
) {
    let ready = Inbound {
        source: id,
        envelope: Envelope::new(SandboxMessage::Ready),
    };
    if bus.send(ready).is_err() {
        return;
    }
    // Ends when the WorkerContext (the only sender) is dropped.
    while let Ok(envelope) = inbox.recv() {
        if let Some(reply) = runtime::respond(&envelope, &limits) {
            let inbound = Inbound {
                source: id,
                envelope: reply,
            };
            if bus.send(inbound).is_err() {
                break;
            }
        }
    }
    tracing::debug!(context = %id, "sandbox worker stopped");
}

impl IsolatedContext for WorkerContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn post(&self, envelope: Envelope) -> SandboxResult<()> {
        self.inbox
            .send(envelope)
            .map_err(|_| SandboxError::ContextUnavailable("sandbox worker has exited".to_string()))
    }
}

/// A separate OS process speaking newline-delimited JSON on stdin/stdout.
/// The process is killed when this handle is dropped.
pub struct ProcessContext {
    id: ContextId,
    outbox: mpsc::UnboundedSender<Envelope>,
    child: Mutex<Child>,
}

impl ProcessContext {
    /// Launch `program` and wire its stdio to the bus. Must be called from
    /// within a tokio runtime.
    pub fn spawn<I, S>(program: &Path, args: I, bus: Bus) -> SandboxResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let id = ContextId::new();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SandboxError::ContextUnavailable(format!(
                    "failed to launch {}: {}",
                    program.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::ContextUnavailable("sandbox stdin not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::ContextUnavailable("sandbox stdout not piped".to_string()))?;

        let (outbox, mut outgoing) = mpsc::unbounded_channel::<Envelope>();

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(envelope) = outgoing.recv().await {
                let mut line = match envelope.encode() {
                    Ok(line) => line,
                    Err(e) => {
                        tracing::warn!(context = %id, error = %e, "dropping unencodable envelope");
                        continue;
                    }
                };
                line.push('\n');
                if let Err(e) = write_line(&mut stdin, &line).await {
                    tracing::warn!(context = %id, error = %e, "sandbox stdin closed");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        let envelope = match Envelope::decode(&line) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::warn!(context = %id, error = %e, "undecodable line from sandbox");
                                Envelope::new(SandboxMessage::Unknown {
                                    kind: "malformed".to_string(),
                                })
                            }
                        };
                        if bus.send(Inbound { source: id, envelope }).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!(context = %id, "sandbox process closed its output");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(context = %id, error = %e, "failed reading sandbox output");
                        break;
                    }
                }
            }
        });

        tracing::info!(context = %id, program = %program.display(), "sandbox process started");
        Ok(Self {
            id,
            outbox,
            child: Mutex::new(child),
        })
    }

    /// Ask the OS to terminate the process now rather than at drop.
    pub fn kill(&self) -> SandboxResult<()> {
        let mut child = self
            .child
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        child
            .start_kill()
            .map_err(|e| SandboxError::ContextUnavailable(format!("failed to kill sandbox: {}", e)))
    }
}

async fn write_line(stdin: &mut tokio::process::ChildStdin, line: &str) -> std::io::Result<()> {
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await
}

impl IsolatedContext for ProcessContext {
    fn id(&self) -> ContextId {
        self.id
    }

    fn post(&self, envelope: Envelope) -> SandboxResult<()> {
        self.outbox
            .send(envelope)
            .map_err(|_| SandboxError::ContextUnavailable("sandbox process has exited".to_string()))
    }
}
