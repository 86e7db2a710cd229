//! # canvasforge component tree
//!
//! The document model of the canvas editor: a forest of positioned, styled
//! component nodes, the geometry used to drag, resize and rotate them, and
//! the single-writer store that applies edits with undo/redo.
//!
//! ## Features
//! - Typed prop/style values that always serialize
//! - Resize/rotate handle geometry for all eight directions
//! - All-or-nothing structural edits with invariant validation
//! - Canonical JSON snapshots that round-trip exactly
//! - Ingestion of text-to-UI generation payloads
//!
//! ## Example
//! ```
//! use canvasforge_tree::{ComponentNode, Direction, Point, TreeStore};
//!
//! let mut store = TreeStore::new();
//! store
//!     .insert(None, None, ComponentNode::new("card", "container").with_size(200.0, 100.0))
//!     .unwrap();
//! store
//!     .resize(&"card".into(), Direction::SE, Point::new(20.0, 10.0))
//!     .unwrap();
//! assert_eq!(store.get(&"card".into()).unwrap().size.width, 220.0);
//! assert!(store.undo());
//! ```

pub mod error;
pub mod generation;
pub mod geometry;
pub mod history;
pub mod node;
pub mod store;
pub mod tree;
pub mod validator;
pub mod value;

// --- Core types ---
pub use error::{TreeError, TreeResult};
pub use generation::{ComponentDetails, GeneratedComponent, GenerationPayload, LayoutEntry};
pub use geometry::{Direction, HandlePlacement, Point, Rect};
pub use node::{ComponentNode, NodeId, NodeKind, Position, Size};
pub use store::TreeStore;
pub use tree::{ComponentTree, NodePatch};
pub use validator::MAX_NESTING_DEPTH;
pub use value::{Value, ValueMap, MAX_VALUE_DEPTH};

/// Parse a JSON snapshot into a validated tree.
pub fn parse_snapshot(json: &str) -> TreeResult<ComponentTree> {
    ComponentTree::deserialize(json)
}

/// Parse a YAML snapshot (same shape as the JSON form) into a validated tree.
pub fn parse_snapshot_yaml(yaml: &str) -> TreeResult<ComponentTree> {
    let roots: Vec<ComponentNode> = serde_yaml::from_str(yaml)?;
    ComponentTree::from_roots(roots)
}
