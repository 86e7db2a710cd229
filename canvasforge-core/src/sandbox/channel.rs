//! Request/response channel to one isolated context.
//!
//! `Idle -> AwaitingResponse -> (result | error | timeout | cancelled) -> Idle`.
//! At most one request is in flight. The dispatcher task only completes the
//! pending oneshot; it never touches caller state.

use super::context::{BusReceiver, ContextId, Inbound, IsolatedContext};
use super::message::{Envelope, RenderOutput, RenderRequest, SandboxMessage};
use crate::error::{SandboxError, SandboxResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Deadline for one render response.
    pub timeout: Duration,
    /// Deadline for the context's initial `sandbox-ready`.
    pub ready_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    AwaitingResponse { request: Uuid },
}

struct Pending {
    request: Uuid,
    reply: oneshot::Sender<SandboxResult<RenderOutput>>,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<Option<Pending>>,
    closed: AtomicBool,
}

impl Shared {
    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the slot if it still belongs to `request`.
    fn release(&self, request: Uuid) -> Option<Pending> {
        let mut slot = self.slot();
        match slot.as_ref() {
            Some(p) if p.request == request => slot.take(),
            _ => None,
        }
    }
}

/// Releases the pending slot when `execute` finishes or its future is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    request: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.release(self.request);
    }
}

pub struct ExecutionChannel {
    context: Arc<dyn IsolatedContext>,
    shared: Arc<Shared>,
    timeout: Duration,
    dispatcher: JoinHandle<()>,
}

impl ExecutionChannel {
    /// Bind to `context`, waiting for it to signal ready on `bus`.
    pub async fn connect(
        context: Arc<dyn IsolatedContext>,
        mut bus: BusReceiver,
        config: &ChannelConfig,
    ) -> SandboxResult<Self> {
        let expected = context.id();
        let handshake = async {
            while let Some(Inbound { source, envelope }) = bus.recv().await {
                if source != expected {
                    tracing::debug!(%source, "ignoring message from foreign context during handshake");
                    continue;
                }
                if envelope.message == SandboxMessage::Ready {
                    return Ok(());
                }
                tracing::debug!(kind = envelope.message.kind(), "ignoring message before ready");
            }
            Err(SandboxError::ContextUnavailable(
                "context closed before signalling ready".to_string(),
            ))
        };
        tokio::time::timeout(config.ready_timeout, handshake)
            .await
            .map_err(|_| SandboxError::Timeout {
                timeout_ms: config.ready_timeout.as_millis() as u64,
            })??;

        tracing::info!(context = %expected, "sandbox context ready");
        let shared = Arc::new(Shared::default());
        let dispatcher = tokio::spawn(dispatch(expected, bus, shared.clone()));
        Ok(Self {
            context,
            shared,
            timeout: config.timeout,
            dispatcher,
        })
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    pub fn state(&self) -> ChannelState {
        match self.shared.slot().as_ref() {
            Some(p) => ChannelState::AwaitingResponse { request: p.request },
            None => ChannelState::Idle,
        }
    }

    /// Send one render request and wait for its outcome.
    pub async fn execute(&self, request: RenderRequest) -> SandboxResult<RenderOutput> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(SandboxError::ContextUnavailable(
                "sandbox context has closed".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.shared.slot();
            if let Some(p) = slot.as_ref() {
                return Err(SandboxError::ChannelBusy { pending: p.request });
            }
            *slot = Some(Pending {
                request: id,
                reply: tx,
            });
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            request: id,
        };

        tracing::debug!(request = %id, "posting render request");
        self.context.post(Envelope::correlated(
            id,
            SandboxMessage::RenderRequest(request),
        ))?;

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SandboxError::Cancelled),
            Err(_) => {
                let timeout_ms = self.timeout.as_millis() as u64;
                tracing::warn!(request = %id, timeout_ms, "render request timed out");
                Err(SandboxError::Timeout { timeout_ms })
            }
        }
    }

    /// Render bare code with no props or styles.
    pub async fn execute_code(&self, code: &str) -> SandboxResult<RenderOutput> {
        self.execute(RenderRequest::new(code)).await
    }

    /// Abandon the in-flight request, if any. Its `execute` call returns
    /// [`SandboxError::Cancelled`].
    pub fn cancel(&self) -> bool {
        match self.shared.slot().take() {
            Some(pending) => {
                tracing::info!(request = %pending.request, "render request cancelled");
                true
            }
            None => false,
        }
    }
}

impl Drop for ExecutionChannel {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch(expected: ContextId, mut bus: BusReceiver, shared: Arc<Shared>) {
    while let Some(Inbound { source, envelope }) = bus.recv().await {
        if source != expected {
            tracing::debug!(%source, kind = envelope.message.kind(), "ignoring message from foreign context");
            continue;
        }

        let mut slot = shared.slot();
        let Some(current) = slot.as_ref().map(|p| p.request) else {
            tracing::debug!(kind = envelope.message.kind(), "no request in flight, dropping message");
            continue;
        };
        if let Some(correlation) = envelope.correlation {
            if correlation != current {
                tracing::debug!(%correlation, %current, "dropping stale response");
                continue;
            }
        }

        let outcome = match envelope.message {
            SandboxMessage::RenderResult(output) => Ok(output),
            SandboxMessage::Error(detail) => Err(SandboxError::Execution {
                message: detail.error,
                stack: detail.stack,
            }),
            SandboxMessage::Ready => {
                tracing::debug!("ignoring repeated ready");
                continue;
            }
            other => Err(SandboxError::Protocol(format!(
                "unexpected message type '{}'",
                other.kind()
            ))),
        };
        if let Some(pending) = slot.take() {
            let _ = pending.reply.send(outcome);
        }
    }

    shared.closed.store(true, Ordering::Release);
    if let Some(pending) = shared.slot().take() {
        let _ = pending.reply.send(Err(SandboxError::ContextUnavailable(
            "sandbox context closed".to_string(),
        )));
    }
    tracing::info!(context = %expected, "sandbox context closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::context::{bus, Bus};
    use crate::sandbox::message::ErrorDetail;
    use canvasforge_tree::Value;
    use pretty_assertions::assert_eq;

    type Script = Box<dyn Fn(&Envelope) -> Option<SandboxMessage> + Send + Sync>;

    /// Context whose replies come from a closure, posted straight to the bus.
    struct ScriptedContext {
        id: ContextId,
        bus: Mutex<Option<Bus>>,
        script: Script,
        posted: Mutex<Vec<Envelope>>,
    }

    impl ScriptedContext {
        fn send(&self, inbound: Inbound) {
            if let Some(bus) = self.bus.lock().unwrap().as_ref() {
                bus.send(inbound).unwrap();
            }
        }

        fn hang_up(&self) {
            self.bus.lock().unwrap().take();
        }
    }

    impl IsolatedContext for ScriptedContext {
        fn id(&self) -> ContextId {
            self.id
        }

        fn post(&self, envelope: Envelope) -> SandboxResult<()> {
            self.posted.lock().unwrap().push(envelope.clone());
            if let Some(message) = (self.script)(&envelope) {
                self.send(Inbound {
                    source: self.id,
                    envelope: envelope.reply(message),
                });
            }
            Ok(())
        }
    }

    async fn connected(script: Script) -> (Arc<ExecutionChannel>, Arc<ScriptedContext>, Bus) {
        let (tx, rx) = bus();
        let context = Arc::new(ScriptedContext {
            id: ContextId::new(),
            bus: Mutex::new(Some(tx.clone())),
            script,
            posted: Mutex::new(Vec::new()),
        });
        tx.send(Inbound {
            source: context.id,
            envelope: Envelope::new(SandboxMessage::Ready),
        })
        .unwrap();
        let channel = ExecutionChannel::connect(context.clone(), rx, &ChannelConfig::default())
            .await
            .unwrap();
        (Arc::new(channel), context, tx)
    }

    fn silent() -> Script {
        Box::new(|_| None)
    }

    fn result(tree: &str) -> SandboxMessage {
        SandboxMessage::RenderResult(RenderOutput {
            tree: Value::from(tree),
            logs: vec![],
        })
    }

    async fn wait_for_pending(channel: &ExecutionChannel) -> Uuid {
        loop {
            if let ChannelState::AwaitingResponse { request } = channel.state() {
                return request;
            }
            tokio::task::yield_now().await;
        }
    }

    fn spawn_execute(
        channel: &Arc<ExecutionChannel>,
    ) -> JoinHandle<SandboxResult<RenderOutput>> {
        let channel = channel.clone();
        tokio::spawn(async move { channel.execute_code("return 1").await })
    }

    #[tokio::test]
    async fn test_resolves_with_render_result() {
        let (channel, context, _tx) = connected(Box::new(|_| Some(result("ok")))).await;
        let out = channel.execute_code("return 'ok'").await.unwrap();
        assert_eq!(out.tree, Value::from("ok"));
        assert_eq!(channel.state(), ChannelState::Idle);

        let posted = context.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert!(posted[0].correlation.is_some());
    }

    #[tokio::test]
    async fn test_error_message_fails_with_execution_error() {
        let (channel, _context, _tx) = connected(Box::new(|_| {
            Some(SandboxMessage::Error(ErrorDetail {
                error: "boom".into(),
                stack: Some("at line 1".into()),
            }))
        }))
        .await;
        let err = channel.execute_code("error('boom')").await.unwrap_err();
        assert_eq!(
            err,
            SandboxError::Execution {
                message: "boom".into(),
                stack: Some("at line 1".into()),
            }
        );
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn test_unknown_type_is_protocol_error_and_resets() {
        let (channel, _context, _tx) = connected(Box::new(|_| {
            Some(SandboxMessage::Unknown {
                kind: "telemetry".into(),
            })
        }))
        .await;
        let err = channel.execute_code("return 1").await.unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn test_wrong_direction_is_protocol_error() {
        let (channel, _context, _tx) = connected(Box::new(|_| {
            Some(SandboxMessage::RenderRequest(RenderRequest::new("x")))
        }))
        .await;
        let err = channel.execute_code("return 1").await.unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_then_late_result_is_ignored() {
        let (channel, context, _tx) = connected(silent()).await;
        let started = tokio::time::Instant::now();
        let err = channel.execute_code("while true do end").await.unwrap_err();
        assert_eq!(err, SandboxError::Timeout { timeout_ms: 5000 });
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(channel.state(), ChannelState::Idle);

        let late = context.posted.lock().unwrap()[0].correlation.unwrap();
        context.send(Inbound {
            source: context.id,
            envelope: Envelope::correlated(late, result("late")),
        });
        tokio::task::yield_now().await;
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn test_second_request_is_rejected_while_busy() {
        let (channel, _context, _tx) = connected(silent()).await;
        let first = spawn_execute(&channel);
        let pending = wait_for_pending(&channel).await;

        let err = channel.execute_code("return 2").await.unwrap_err();
        assert_eq!(err, SandboxError::ChannelBusy { pending });

        assert!(channel.cancel());
        assert_eq!(first.await.unwrap(), Err(SandboxError::Cancelled));
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(!channel.cancel());
    }

    #[tokio::test]
    async fn test_dropping_execute_releases_the_slot() {
        let (channel, _context, _tx) = connected(silent()).await;
        let attempt =
            tokio::time::timeout(Duration::from_millis(20), channel.execute_code("return 1")).await;
        assert!(attempt.is_err());
        assert_eq!(channel.state(), ChannelState::Idle);
    }

    #[tokio::test]
    async fn test_foreign_source_is_ignored() {
        let (channel, context, tx) = connected(silent()).await;
        let first = spawn_execute(&channel);
        let request = wait_for_pending(&channel).await;

        tx.send(Inbound {
            source: ContextId::new(),
            envelope: Envelope::correlated(request, result("forged")),
        })
        .unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.state(), ChannelState::AwaitingResponse { request });

        context.send(Inbound {
            source: context.id,
            envelope: Envelope::correlated(request, result("genuine")),
        });
        assert_eq!(first.await.unwrap().unwrap().tree, Value::from("genuine"));
    }

    #[tokio::test]
    async fn test_stale_correlation_is_ignored_and_uncorrelated_reply_accepted() {
        let (channel, context, _tx) = connected(silent()).await;
        let first = spawn_execute(&channel);
        let request = wait_for_pending(&channel).await;

        context.send(Inbound {
            source: context.id,
            envelope: Envelope::correlated(Uuid::new_v4(), result("stale")),
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(channel.state(), ChannelState::AwaitingResponse { request });

        context.send(Inbound {
            source: context.id,
            envelope: Envelope::new(result("fresh")),
        });
        assert_eq!(first.await.unwrap().unwrap().tree, Value::from("fresh"));
    }

    #[tokio::test]
    async fn test_closed_context_fails_pending_request() {
        let (channel, context, tx) = connected(silent()).await;
        let first = spawn_execute(&channel);
        wait_for_pending(&channel).await;

        context.hang_up();
        drop(tx);
        assert!(matches!(
            first.await.unwrap(),
            Err(SandboxError::ContextUnavailable(_))
        ));
        assert!(matches!(
            channel.execute_code("return 1").await,
            Err(SandboxError::ContextUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_times_out_without_ready() {
        let (tx, rx) = bus();
        let context = Arc::new(ScriptedContext {
            id: ContextId::new(),
            bus: Mutex::new(Some(tx.clone())),
            script: silent(),
            posted: Mutex::new(Vec::new()),
        });
        // Ready from some other context does not count.
        tx.send(Inbound {
            source: ContextId::new(),
            envelope: Envelope::new(SandboxMessage::Ready),
        })
        .unwrap();
        let err = ExecutionChannel::connect(context, rx, &ChannelConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err, SandboxError::Timeout { timeout_ms: 5000 });
    }
}
