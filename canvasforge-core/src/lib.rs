//! # canvasforge core
//!
//! Host-side services around the component tree: sandboxed rendering of
//! generated component code, version history, presets, configuration, and
//! the [`Studio`] orchestrator that ties them to a single-writer
//! [`canvasforge_tree::TreeStore`].

pub mod config;
pub mod deployment;
pub mod error;
pub mod generation;
pub mod logging;
pub mod presets;
pub mod sandbox;
pub mod storage;
pub mod studio;
pub mod versions;

pub use config::Config;
pub use error::{
    ConfigError, PersistenceError, PresetError, ProviderError, SandboxError, StudioError,
    VersionError,
};
pub use sandbox::{ExecutionChannel, ProcessContext, WorkerContext};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use studio::{Edit, Studio};
pub use versions::{Version, VersionStore, VersionSummary};
