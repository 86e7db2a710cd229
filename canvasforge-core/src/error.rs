use canvasforge_tree::TreeError;
use thiserror::Error;
use uuid::Uuid;

/// Failures of one request/response cycle across the isolation boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SandboxError {
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Render failed in sandbox: {message}")]
    Execution {
        message: String,
        stack: Option<String>,
    },

    #[error("Sandbox did not respond within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Channel busy: request {pending} is still in flight")]
    ChannelBusy { pending: Uuid },

    #[error("Render request was cancelled")]
    Cancelled,

    #[error("Sandbox context unavailable: {0}")]
    ContextUnavailable(String),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

/// Backend failures. Kept inside the persistence boundary; callers see
/// [`VersionError`] or a degraded empty read.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Invalid storage key '{key}': only [A-Za-z0-9._-] are allowed")]
    InvalidKey { key: String },

    #[error("Corrupt entry under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VersionError {
    #[error("Version '{id}' not found")]
    NotFound { id: Uuid },

    #[error("Version history unavailable: {0}")]
    Unavailable(String),
}

impl From<PersistenceError> for VersionError {
    fn from(err: PersistenceError) -> Self {
        VersionError::Unavailable(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresetError {
    #[error("Presets unavailable: {0}")]
    Unavailable(String),
}

impl From<PersistenceError> for PresetError {
    fn from(err: PersistenceError) -> Self {
        PresetError::Unavailable(err.to_string())
    }
}

/// Failure reported by an external generation or deployment service.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct ProviderError(pub String);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidOverride {
        var: String,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by the orchestrator.
#[derive(Error, Debug)]
pub enum StudioError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("Component '{id}' has no code to render")]
    NotRenderable { id: String },

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

pub type StudioResult<T> = Result<T, StudioError>;
