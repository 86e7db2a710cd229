use crate::error::TreeResult;
use crate::generation::GenerationPayload;
use crate::geometry::{Direction, Point};
use crate::history::{EditHistory, DEFAULT_UNDO_LIMIT};
use crate::node::{ComponentNode, NodeId};
use crate::tree::{ComponentTree, NodePatch};
use crate::validator::collect_ids;

/// The authoritative, mutable document plus its undo history.
///
/// All writes go through `&mut self`, so whoever owns the store is the single
/// writer. Tracked edits record the prior forest only when they succeed.
#[derive(Debug, Clone)]
pub struct TreeStore {
    tree: ComponentTree,
    history: EditHistory,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        Self::with_tree(ComponentTree::new(), DEFAULT_UNDO_LIMIT)
    }

    pub fn with_tree(tree: ComponentTree, undo_limit: usize) -> Self {
        Self {
            tree,
            history: EditHistory::new(undo_limit),
        }
    }

    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    pub fn get(&self, id: &NodeId) -> Option<&ComponentNode> {
        self.tree.get(id)
    }

    pub fn snapshot(&self) -> Vec<ComponentNode> {
        self.tree.snapshot()
    }

    fn tracked<T>(
        &mut self,
        edit: impl FnOnce(&mut ComponentTree) -> TreeResult<T>,
    ) -> TreeResult<T> {
        let before = self.tree.snapshot();
        let out = edit(&mut self.tree)?;
        self.history.record(before);
        Ok(out)
    }

    pub fn update(&mut self, id: &NodeId, patch: &NodePatch) -> TreeResult<()> {
        self.tracked(|t| t.update(id, patch))
    }

    /// Update without an undo entry, for annotations such as render results.
    pub fn update_untracked(&mut self, id: &NodeId, patch: &NodePatch) -> TreeResult<()> {
        self.tree.update(id, patch)
    }

    pub fn move_by(&mut self, id: &NodeId, delta: Point) -> TreeResult<()> {
        self.tracked(|t| t.move_by(id, delta))
    }

    pub fn resize(&mut self, id: &NodeId, direction: Direction, delta: Point) -> TreeResult<()> {
        self.tracked(|t| t.resize(id, direction, delta))
    }

    pub fn rotate_to(&mut self, id: &NodeId, degrees: f64) -> TreeResult<()> {
        self.tracked(|t| t.rotate_to(id, degrees))
    }

    pub fn rotate_by(&mut self, id: &NodeId, delta_degrees: f64) -> TreeResult<()> {
        self.tracked(|t| t.rotate_by(id, delta_degrees))
    }

    pub fn rotate_towards(&mut self, id: &NodeId, pointer: Point) -> TreeResult<()> {
        self.tracked(|t| t.rotate_towards(id, pointer))
    }

    pub fn insert(
        &mut self,
        parent: Option<&NodeId>,
        index: Option<usize>,
        node: ComponentNode,
    ) -> TreeResult<()> {
        self.tracked(|t| t.insert(parent, index, node))
    }

    pub fn remove(&mut self, id: &NodeId) -> TreeResult<ComponentNode> {
        self.tracked(|t| t.remove(id))
    }

    pub fn reparent(
        &mut self,
        id: &NodeId,
        new_parent: Option<&NodeId>,
        index: Option<usize>,
    ) -> TreeResult<()> {
        self.tracked(|t| t.reparent(id, new_parent, index))
    }

    /// Replace the document wholesale (version restore). Undoable.
    pub fn replace_all(&mut self, roots: Vec<ComponentNode>) -> TreeResult<()> {
        self.tracked(|t| t.replace_all(roots))
    }

    /// Add generated components under `parent` (or as roots) in one undo step.
    /// Returns the ids of the top-level nodes that were added.
    pub fn ingest(
        &mut self,
        payload: GenerationPayload,
        parent: Option<&NodeId>,
    ) -> TreeResult<Vec<NodeId>> {
        let nodes = payload.into_nodes(&collect_ids(self.tree.roots()));
        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id.clone()).collect();
        self.tracked(|t| {
            // Stage on a copy so a failure part-way leaves nothing behind.
            let mut staged = t.clone();
            for node in nodes {
                staged.insert(parent, None, node)?;
            }
            *t = staged;
            Ok(())
        })?;
        tracing::debug!(count = ids.len(), "ingested generated components");
        Ok(ids)
    }

    /// Undo the last tracked edit. Returns false when there is nothing to undo.
    pub fn undo(&mut self) -> bool {
        match self.history.undo(self.tree.snapshot()) {
            Some(previous) => {
                self.tree = ComponentTree::from_trusted(previous);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo(self.tree.snapshot()) {
            Some(next) => {
                self.tree = ComponentTree::from_trusted(next);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn serialize(&self) -> TreeResult<String> {
        self.tree.serialize()
    }

    /// Load a serialized document, discarding undo history.
    pub fn load(&mut self, json: &str) -> TreeResult<()> {
        self.tree = ComponentTree::deserialize(json)?;
        self.history.clear();
        Ok(())
    }
}
