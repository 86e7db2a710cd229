//! The component document: an ordered forest of exclusively owned nodes.
//!
//! Every mutation validates first and only then touches the forest, so a
//! failed call leaves the document exactly as it was.

use crate::error::{TreeError, TreeResult};
use crate::geometry::{self, Direction, Point};
use crate::node::{ComponentNode, NodeId, NodeKind, Position, Size};
use crate::validator::{collect_ids, validate_forest, validate_insertion, MAX_NESTING_DEPTH};
use crate::value::ValueMap;
use serde::{Deserialize, Serialize};

/// Partial update for a node. Present fields replace the node's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePatch {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub props: Option<ValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styles: Option<ValueMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Size>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
}

impl NodePatch {
    pub fn props(props: ValueMap) -> Self {
        Self {
            props: Some(props),
            ..Self::default()
        }
    }

    pub fn styles(styles: ValueMap) -> Self {
        Self {
            styles: Some(styles),
            ..Self::default()
        }
    }

    pub fn position(x: f64, y: f64) -> Self {
        Self {
            position: Some(Position { x, y }),
            ..Self::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            size: Some(Size { width, height }),
            ..Self::default()
        }
    }

    /// Shallow merge into a copy of `node`. Size is clamped, rotation normalized.
    pub fn apply_to(&self, node: &ComponentNode) -> ComponentNode {
        let mut out = node.clone();
        if let Some(kind) = &self.kind {
            out.kind = kind.clone();
        }
        if let Some(props) = &self.props {
            out.props = props.clone();
        }
        if let Some(styles) = &self.styles {
            out.styles = styles.clone();
        }
        if let Some(position) = self.position {
            out.position = position;
        }
        if let Some(size) = self.size {
            out.size = Size::clamped(size.width, size.height);
        }
        if let Some(rotation) = self.rotation {
            out.rotation = geometry::normalize_angle(rotation);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentTree {
    roots: Vec<ComponentNode>,
}

impl ComponentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from an existing forest, validating its invariants.
    pub fn from_roots(roots: Vec<ComponentNode>) -> TreeResult<Self> {
        validate_forest(&roots)?;
        Ok(Self { roots })
    }

    /// Forest that already passed validation (undo/redo states).
    pub(crate) fn from_trusted(roots: Vec<ComponentNode>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[ComponentNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Total number of nodes in the document.
    pub fn len(&self) -> usize {
        self.roots.iter().map(ComponentNode::count).sum()
    }

    /// Pre-order walk over every node of every root.
    pub fn nodes(&self) -> impl Iterator<Item = &ComponentNode> {
        self.roots.iter().flat_map(ComponentNode::descendants)
    }

    pub fn get(&self, id: &NodeId) -> Option<&ComponentNode> {
        self.roots.iter().find_map(|r| r.find(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.get(id).is_some()
    }

    fn get_mut(&mut self, id: &NodeId) -> TreeResult<&mut ComponentNode> {
        self.roots
            .iter_mut()
            .find_map(|r| r.find_mut(id))
            .ok_or_else(|| not_found(id))
    }

    /// Parent of `id`, derived by search. `None` for roots and unknown ids.
    pub fn parent_of(&self, id: &NodeId) -> Option<&NodeId> {
        self.nodes()
            .find(|n| n.children.iter().any(|c| &c.id == id))
            .map(|n| &n.id)
    }

    /// Depth of `id` (roots are at depth 0).
    pub fn depth_of(&self, id: &NodeId) -> Option<usize> {
        fn walk(nodes: &[ComponentNode], id: &NodeId, depth: usize) -> Option<usize> {
            for node in nodes {
                if &node.id == id {
                    return Some(depth);
                }
                if let Some(d) = walk(&node.children, id, depth + 1) {
                    return Some(d);
                }
            }
            None
        }
        walk(&self.roots, id, 0)
    }

    /// Deep, independent copy of the forest.
    pub fn snapshot(&self) -> Vec<ComponentNode> {
        self.roots.clone()
    }

    /// Replace the whole forest, e.g. when restoring a saved version.
    pub fn replace_all(&mut self, roots: Vec<ComponentNode>) -> TreeResult<()> {
        validate_forest(&roots)?;
        self.roots = roots;
        Ok(())
    }

    /// Shallow-merge `patch` into the node with `id`.
    pub fn update(&mut self, id: &NodeId, patch: &NodePatch) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        let merged = patch.apply_to(node);
        // Children are untouched by a patch, so only this node can break.
        crate::validator::validate_contents(&merged)?;
        *node = merged;
        Ok(())
    }

    /// Translate a node by `delta` (drag).
    pub fn move_by(&mut self, id: &NodeId, delta: Point) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        let moved = node.bounds().translate(delta);
        if !moved.x.is_finite() || !moved.y.is_finite() {
            return Err(TreeError::InvalidGeometry {
                id: id.to_string(),
                reason: "position must be finite".to_string(),
            });
        }
        node.set_bounds(moved);
        Ok(())
    }

    /// Drag the `direction` resize handle of a node by `delta`.
    pub fn resize(&mut self, id: &NodeId, direction: Direction, delta: Point) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        let resized = geometry::resize(&node.bounds(), direction, delta);
        if ![resized.x, resized.y, resized.width, resized.height]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(TreeError::InvalidGeometry {
                id: id.to_string(),
                reason: "resize produced a non-finite box".to_string(),
            });
        }
        node.set_bounds(resized);
        Ok(())
    }

    /// Set absolute rotation in degrees, normalized to [0, 360).
    pub fn rotate_to(&mut self, id: &NodeId, degrees: f64) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        node.rotation = geometry::normalize_angle(degrees);
        Ok(())
    }

    /// Rotate by a relative amount.
    pub fn rotate_by(&mut self, id: &NodeId, delta_degrees: f64) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        node.rotation = geometry::normalize_angle(node.rotation + delta_degrees);
        Ok(())
    }

    /// Rotate so the rotation handle follows `pointer` around the node's center.
    pub fn rotate_towards(&mut self, id: &NodeId, pointer: Point) -> TreeResult<()> {
        let node = self.get_mut(id)?;
        node.rotation = geometry::rotation_from_pointer(&node.bounds(), pointer);
        Ok(())
    }

    /// Insert `node` under `parent` (or as a root) at `index` (or at the end).
    /// Out-of-range indices append.
    pub fn insert(
        &mut self,
        parent: Option<&NodeId>,
        index: Option<usize>,
        node: ComponentNode,
    ) -> TreeResult<()> {
        let depth = match parent {
            Some(p) => self.depth_of(p).ok_or_else(|| not_found(p))? + 1,
            None => 0,
        };
        validate_insertion(&node, &collect_ids(&self.roots), depth)?;

        let siblings = match parent {
            Some(p) => &mut self.get_mut(p)?.children,
            None => &mut self.roots,
        };
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, node);
        Ok(())
    }

    /// Detach and return the subtree rooted at `id`.
    pub fn remove(&mut self, id: &NodeId) -> TreeResult<ComponentNode> {
        fn take(nodes: &mut Vec<ComponentNode>, id: &NodeId) -> Option<ComponentNode> {
            if let Some(pos) = nodes.iter().position(|n| &n.id == id) {
                return Some(nodes.remove(pos));
            }
            nodes.iter_mut().find_map(|n| take(&mut n.children, id))
        }
        take(&mut self.roots, id).ok_or_else(|| not_found(id))
    }

    /// Move the subtree at `id` under `new_parent` (drag/drop between containers).
    pub fn reparent(
        &mut self,
        id: &NodeId,
        new_parent: Option<&NodeId>,
        index: Option<usize>,
    ) -> TreeResult<()> {
        let subtree = self.get(id).ok_or_else(|| not_found(id))?;
        let target_depth = match new_parent {
            Some(p) => {
                if subtree.contains(p) {
                    return Err(TreeError::CycleDetected {
                        id: id.to_string(),
                        parent: p.to_string(),
                    });
                }
                self.depth_of(p).ok_or_else(|| not_found(p))? + 1
            }
            None => 0,
        };
        let subtree_height = height(subtree);
        if target_depth + subtree_height > MAX_NESTING_DEPTH {
            return Err(TreeError::MaxNestingDepthExceeded {
                max_depth: MAX_NESTING_DEPTH,
            });
        }

        let node = self.remove(id)?;
        self.insert(new_parent, index, node)
    }

    /// Canonical JSON form of the forest.
    pub fn serialize(&self) -> TreeResult<String> {
        Ok(serde_json::to_string(&self.roots)?)
    }

    pub fn serialize_pretty(&self) -> TreeResult<String> {
        Ok(serde_json::to_string_pretty(&self.roots)?)
    }

    /// Parse and validate a forest produced by [`ComponentTree::serialize`].
    pub fn deserialize(json: &str) -> TreeResult<Self> {
        let roots: Vec<ComponentNode> = serde_json::from_str(json)?;
        Self::from_roots(roots)
    }
}

fn not_found(id: &NodeId) -> TreeError {
    TreeError::NotFound { id: id.to_string() }
}

fn height(node: &ComponentNode) -> usize {
    1 + node.children.iter().map(height).max().unwrap_or(0)
}
