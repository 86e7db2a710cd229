//! Wire messages exchanged with an isolated context.
//!
//! One envelope per line of JSON:
//! `{"id": "<uuid>", "type": "render-component", "payload": {...}}`.
//! The `id` is assigned by the host per request and echoed back by the
//! context. Older contexts that omit it are still understood.

use crate::error::SandboxError;
use canvasforge_tree::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TYPE_READY: &str = "sandbox-ready";
pub const TYPE_RENDER_REQUEST: &str = "render-component";
pub const TYPE_RENDER_RESULT: &str = "render-result";
pub const TYPE_ERROR: &str = "error";
pub const TYPE_TIMEOUT: &str = "timeout";

/// Code to run plus the inputs it renders from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    pub code: String,
    #[serde(default)]
    pub props: ValueMap,
    #[serde(default)]
    pub styles: ValueMap,
}

impl RenderRequest {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }
}

/// What a successful render produced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RenderOutput {
    #[serde(default)]
    pub tree: Value,
    #[serde(default)]
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetail {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            stack: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxMessage {
    Ready,
    RenderRequest(RenderRequest),
    RenderResult(RenderOutput),
    Error(ErrorDetail),
    /// Host-internal marker; a context never needs to send it.
    Timeout,
    /// A type this side does not understand, kept for diagnostics.
    Unknown { kind: String },
}

impl SandboxMessage {
    pub fn kind(&self) -> &str {
        match self {
            SandboxMessage::Ready => TYPE_READY,
            SandboxMessage::RenderRequest(_) => TYPE_RENDER_REQUEST,
            SandboxMessage::RenderResult(_) => TYPE_RENDER_RESULT,
            SandboxMessage::Error(_) => TYPE_ERROR,
            SandboxMessage::Timeout => TYPE_TIMEOUT,
            SandboxMessage::Unknown { kind } => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub correlation: Option<Uuid>,
    pub message: SandboxMessage,
}

#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

impl Envelope {
    pub fn new(message: SandboxMessage) -> Self {
        Self {
            correlation: None,
            message,
        }
    }

    pub fn correlated(id: Uuid, message: SandboxMessage) -> Self {
        Self {
            correlation: Some(id),
            message,
        }
    }

    /// Reply to `self`, echoing its correlation id.
    pub fn reply(&self, message: SandboxMessage) -> Self {
        Self {
            correlation: self.correlation,
            message,
        }
    }

    /// Serialize to a single line of JSON (no trailing newline).
    pub fn encode(&self) -> Result<String, SandboxError> {
        let payload = match &self.message {
            SandboxMessage::Ready | SandboxMessage::Timeout | SandboxMessage::Unknown { .. } => None,
            SandboxMessage::RenderRequest(req) => Some(to_payload(req)?),
            SandboxMessage::RenderResult(out) => Some(to_payload(out)?),
            SandboxMessage::Error(detail) => Some(to_payload(detail)?),
        };
        let wire = WireEnvelope {
            id: self.correlation,
            kind: self.message.kind().to_string(),
            payload,
        };
        serde_json::to_string(&wire).map_err(|e| SandboxError::Protocol(e.to_string()))
    }

    /// Parse one line. Unknown types decode to [`SandboxMessage::Unknown`];
    /// malformed JSON or a payload that does not fit its type is an error.
    pub fn decode(line: &str) -> Result<Self, SandboxError> {
        let wire: WireEnvelope = serde_json::from_str(line)
            .map_err(|e| SandboxError::Protocol(format!("malformed envelope: {}", e)))?;
        let payload = wire.payload.unwrap_or(serde_json::Value::Null);

        let message = match wire.kind.as_str() {
            TYPE_READY | "ready" => SandboxMessage::Ready,
            TYPE_RENDER_REQUEST | "render-request" => {
                SandboxMessage::RenderRequest(from_payload(&wire.kind, payload)?)
            }
            TYPE_RENDER_RESULT => SandboxMessage::RenderResult(from_payload(&wire.kind, payload)?),
            TYPE_ERROR => SandboxMessage::Error(from_payload(&wire.kind, payload)?),
            TYPE_TIMEOUT => SandboxMessage::Timeout,
            _ => SandboxMessage::Unknown { kind: wire.kind },
        };

        Ok(Self {
            correlation: wire.id,
            message,
        })
    }
}

fn to_payload<T: Serialize>(value: &T) -> Result<serde_json::Value, SandboxError> {
    serde_json::to_value(value).map_err(|e| SandboxError::Protocol(e.to_string()))
}

fn from_payload<T: for<'de> Deserialize<'de>>(
    kind: &str,
    payload: serde_json::Value,
) -> Result<T, SandboxError> {
    serde_json::from_value(payload)
        .map_err(|e| SandboxError::Protocol(format!("invalid '{}' payload: {}", kind, e)))
}
