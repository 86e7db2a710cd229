use crate::error::{TreeError, TreeResult};
use crate::node::{ComponentNode, NodeId};
use crate::value::ValueMap;
use std::collections::HashSet;

/// Deepest component nesting accepted in a document.
///
/// Each component costs two JSON levels (its object and its `children`
/// array). A version blob wraps the forest in three more, and the deepest
/// props value adds up to [`MAX_VALUE_DEPTH`](crate::value::MAX_VALUE_DEPTH) + 1, so 32 keeps the worst case
/// near 100 levels, under serde_json's parse limit of 128.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Validate a whole forest: unique non-empty ids, sane geometry, bounded depth.
pub fn validate_forest(roots: &[ComponentNode]) -> TreeResult<()> {
    let mut seen = HashSet::new();
    for root in roots {
        validate_node_recursive(root, 0, &mut seen)?;
    }
    Ok(())
}

/// Validate a subtree about to be inserted next to the ids already in use.
pub fn validate_insertion(node: &ComponentNode, taken: &HashSet<NodeId>, depth: usize) -> TreeResult<()> {
    let mut seen = HashSet::new();
    validate_node_recursive(node, depth, &mut seen)?;
    if let Some(dup) = seen.iter().find(|id| taken.contains(*id)) {
        return Err(TreeError::DuplicateId {
            id: dup.to_string(),
        });
    }
    Ok(())
}

/// Collect every id in the forest.
pub fn collect_ids(roots: &[ComponentNode]) -> HashSet<NodeId> {
    roots
        .iter()
        .flat_map(|r| r.descendants())
        .map(|n| n.id.clone())
        .collect()
}

fn validate_node_recursive(
    node: &ComponentNode,
    depth: usize,
    seen: &mut HashSet<NodeId>,
) -> TreeResult<()> {
    if depth >= MAX_NESTING_DEPTH {
        return Err(TreeError::MaxNestingDepthExceeded {
            max_depth: MAX_NESTING_DEPTH,
        });
    }
    if node.id.as_str().is_empty() {
        return Err(TreeError::EmptyId);
    }
    if !seen.insert(node.id.clone()) {
        return Err(TreeError::DuplicateId {
            id: node.id.to_string(),
        });
    }
    validate_contents(node)?;
    for child in &node.children {
        validate_node_recursive(child, depth + 1, seen)?;
    }
    Ok(())
}

/// Everything about a single node that does not depend on its neighbours.
pub fn validate_contents(node: &ComponentNode) -> TreeResult<()> {
    validate_geometry(node)?;
    validate_values(node, &node.props)?;
    validate_values(node, &node.styles)
}

fn validate_values(node: &ComponentNode, values: &ValueMap) -> TreeResult<()> {
    for (key, value) in values {
        value.check().map_err(|reason| TreeError::InvalidValue {
            id: node.id.to_string(),
            key: key.clone(),
            reason,
        })?;
    }
    Ok(())
}

/// Position must be finite; size finite and non-negative; rotation in [0, 360).
pub fn validate_geometry(node: &ComponentNode) -> TreeResult<()> {
    let invalid = |reason: &str| TreeError::InvalidGeometry {
        id: node.id.to_string(),
        reason: reason.to_string(),
    };

    if !node.position.x.is_finite() || !node.position.y.is_finite() {
        return Err(invalid("position must be finite"));
    }
    let size = node.size;
    if !size.width.is_finite() || !size.height.is_finite() {
        return Err(invalid("size must be finite"));
    }
    if size.width < 0.0 || size.height < 0.0 {
        return Err(invalid("size must be non-negative"));
    }
    if !(0.0..360.0).contains(&node.rotation) {
        return Err(invalid("rotation must be within [0, 360)"));
    }
    Ok(())
}
