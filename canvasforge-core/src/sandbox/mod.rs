//! Sandbox execution: wire messages, isolated contexts, the Luau renderer
//! and the correlated channel that ties them together.

pub mod channel;
pub mod context;
pub mod message;
pub mod runtime;

pub use channel::{ChannelConfig, ChannelState, ExecutionChannel};
pub use context::{bus, Bus, BusReceiver, ContextId, Inbound, IsolatedContext, ProcessContext, WorkerContext};
pub use message::{Envelope, ErrorDetail, RenderOutput, RenderRequest, SandboxMessage};
pub use runtime::SandboxLimits;
