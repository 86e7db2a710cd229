//! The orchestrator: the single writer that connects edits, history,
//! versions and sandbox rendering.

use crate::config::HistoryConfig;
use crate::error::{StudioError, StudioResult};
use crate::generation::GenerationProvider;
use crate::sandbox::{ExecutionChannel, RenderOutput, RenderRequest};
use crate::versions::{Version, VersionStore};
use canvasforge_tree::{
    ComponentNode, Direction, NodeId, NodePatch, Point, TreeError, TreeStore, Value,
};
use uuid::Uuid;

/// Prop holding the last successful render.
pub const RENDER_PROP: &str = "render";
/// Prop holding the last render failure message.
pub const RENDER_ERROR_PROP: &str = "renderError";
/// Prop holding component source code.
pub const CODE_PROP: &str = "code";

/// One user edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    Update { id: NodeId, patch: NodePatch },
    Move { id: NodeId, delta: Point },
    Resize { id: NodeId, direction: Direction, delta: Point },
    Rotate { id: NodeId, degrees: f64 },
    RotateBy { id: NodeId, delta: f64 },
    RotateTowards { id: NodeId, pointer: Point },
    Insert {
        parent: Option<NodeId>,
        index: Option<usize>,
        node: ComponentNode,
    },
    Remove { id: NodeId },
    Reparent {
        id: NodeId,
        parent: Option<NodeId>,
        index: Option<usize>,
    },
}

pub struct Studio {
    tree: TreeStore,
    versions: VersionStore,
    channel: ExecutionChannel,
    snapshot_on_render: bool,
}

impl Studio {
    pub fn new(
        tree: TreeStore,
        versions: VersionStore,
        channel: ExecutionChannel,
        history: &HistoryConfig,
    ) -> Self {
        Self {
            tree,
            versions,
            channel,
            snapshot_on_render: history.snapshot_on_render,
        }
    }

    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    pub fn channel(&self) -> &ExecutionChannel {
        &self.channel
    }

    pub fn apply(&mut self, edit: Edit) -> StudioResult<()> {
        let tree = &mut self.tree;
        match edit {
            Edit::Update { id, patch } => tree.update(&id, &patch)?,
            Edit::Move { id, delta } => tree.move_by(&id, delta)?,
            Edit::Resize {
                id,
                direction,
                delta,
            } => tree.resize(&id, direction, delta)?,
            Edit::Rotate { id, degrees } => tree.rotate_to(&id, degrees)?,
            Edit::RotateBy { id, delta } => tree.rotate_by(&id, delta)?,
            Edit::RotateTowards { id, pointer } => tree.rotate_towards(&id, pointer)?,
            Edit::Insert {
                parent,
                index,
                node,
            } => tree.insert(parent.as_ref(), index, node)?,
            Edit::Remove { id } => {
                tree.remove(&id)?;
            }
            Edit::Reparent { id, parent, index } => tree.reparent(&id, parent.as_ref(), index)?,
        }
        Ok(())
    }

    pub fn undo(&mut self) -> bool {
        self.tree.undo()
    }

    pub fn redo(&mut self) -> bool {
        self.tree.redo()
    }

    pub fn save_version(&self, name: &str) -> StudioResult<Version> {
        Ok(self.versions.save(name, &self.tree.snapshot())?)
    }

    /// Replace the document with a saved version. The replacement itself is
    /// undoable; the version history is not touched.
    pub fn restore_version(&mut self, id: Uuid) -> StudioResult<()> {
        let components = self.versions.restore(id)?;
        self.tree.replace_all(components)?;
        tracing::info!(%id, "restored version");
        Ok(())
    }

    /// Ask `provider` for components and add them under `parent` as one
    /// undoable step.
    pub async fn generate(
        &mut self,
        provider: &impl GenerationProvider,
        prompt: &str,
        parent: Option<&NodeId>,
    ) -> StudioResult<Vec<NodeId>> {
        let payload = provider.generate(prompt).await?;
        let ids = self.tree.ingest(payload, parent)?;
        tracing::info!(count = ids.len(), "added generated components");
        Ok(ids)
    }

    /// Render one node's code in the sandbox and record the outcome on the
    /// node (`render` on success, `renderError` on failure). Render
    /// annotations do not enter undo history.
    pub async fn render(&mut self, id: &NodeId) -> StudioResult<RenderOutput> {
        let request = self.render_request(id)?;

        if self.snapshot_on_render {
            if let Err(e) = self
                .versions
                .save(&format!("before render {}", id), &self.tree.snapshot())
            {
                tracing::warn!(error = %e, "could not snapshot before render");
            }
        }

        let outcome = self.channel.execute(request).await;

        let mut props = self
            .tree
            .get(id)
            .ok_or_else(|| TreeError::NotFound { id: id.to_string() })?
            .props
            .clone();
        match &outcome {
            Ok(output) => {
                props.insert(RENDER_PROP.to_string(), output.tree.clone());
                props.remove(RENDER_ERROR_PROP);
            }
            Err(e) => {
                tracing::warn!(node = %id, error = %e, "render failed");
                props.insert(RENDER_ERROR_PROP.to_string(), Value::from(e.to_string()));
            }
        }
        self.tree.update_untracked(id, &NodePatch::props(props))?;

        Ok(outcome?)
    }

    /// Render every node that carries code, in document order.
    pub async fn render_all(&mut self) -> Vec<(NodeId, StudioResult<RenderOutput>)> {
        let ids: Vec<NodeId> = self
            .tree
            .tree()
            .nodes()
            .filter(|n| n.code().is_some())
            .map(|n| n.id.clone())
            .collect();
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let outcome = self.render(&id).await;
            results.push((id, outcome));
        }
        results
    }

    fn render_request(&self, id: &NodeId) -> StudioResult<RenderRequest> {
        let node = self
            .tree
            .get(id)
            .ok_or_else(|| TreeError::NotFound { id: id.to_string() })?;
        let code = node.code().ok_or_else(|| StudioError::NotRenderable {
            id: id.to_string(),
        })?;

        let mut props = node.props.clone();
        for derived in [CODE_PROP, RENDER_PROP, RENDER_ERROR_PROP] {
            props.remove(derived);
        }
        Ok(RenderRequest {
            code: code.to_string(),
            props,
            styles: node.styles.clone(),
        })
    }
}
