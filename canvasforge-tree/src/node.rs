use crate::geometry::{normalize_angle, Point, Rect};
use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque component identifier, stable for the lifetime of the node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for nodes created on the canvas or by generation.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Polymorphic kind of a component. Unknown tags round-trip verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Container,
    Text,
    Image,
    Button,
    /// Component whose body is produced by generated code run in the sandbox.
    Generated,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Container => "container",
            NodeKind::Text => "text",
            NodeKind::Image => "image",
            NodeKind::Button => "button",
            NodeKind::Generated => "generated",
            NodeKind::Other(s) => s,
        }
    }
}

impl From<String> for NodeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "container" => NodeKind::Container,
            "text" => NodeKind::Text,
            "image" => NodeKind::Image,
            "button" => NodeKind::Button,
            "generated" => NodeKind::Generated,
            _ => NodeKind::Other(s),
        }
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::from(s.to_string())
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Size with negative dimensions clamped to zero.
    pub fn clamped(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }
}

/// A positioned, styled element of the document tree.
///
/// Children are exclusively owned, so the tree cannot contain shared nodes or
/// cycles. Parent links are never stored; see `ComponentTree::parent_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub props: ValueMap,
    #[serde(default)]
    pub styles: ValueMap,
    #[serde(default)]
    pub children: Vec<ComponentNode>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub rotation: f64,
}

impl ComponentNode {
    pub fn new(id: impl Into<NodeId>, kind: impl Into<NodeKind>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            props: ValueMap::new(),
            styles: ValueMap::new(),
            children: Vec::new(),
            position: Position::default(),
            size: Size::default(),
            rotation: 0.0,
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.size = Size::clamped(width, height);
        self
    }

    pub fn with_rotation(mut self, degrees: f64) -> Self {
        self.rotation = normalize_angle(degrees);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn with_style(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.styles.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: ComponentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(
            self.position.x,
            self.position.y,
            self.size.width,
            self.size.height,
        )
    }

    pub fn set_bounds(&mut self, rect: Rect) {
        self.position = Position {
            x: rect.x,
            y: rect.y,
        };
        self.size = Size::clamped(rect.width, rect.height);
    }

    pub fn origin(&self) -> Point {
        Point::new(self.position.x, self.position.y)
    }

    /// Generated code attached to this node, if any.
    pub fn code(&self) -> Option<&str> {
        self.props.get("code").and_then(Value::as_str)
    }

    /// Finds `id` in this node's subtree, including the node itself.
    pub fn find(&self, id: &NodeId) -> Option<&ComponentNode> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &NodeId) -> Option<&mut ComponentNode> {
        if &self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.find(id).is_some()
    }

    /// Pre-order walk over this node and all of its descendants.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants { stack: vec![self] }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn count(&self) -> usize {
        self.descendants().count()
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a ComponentNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a ComponentNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_unknown_tags() {
        let node: ComponentNode =
            serde_json::from_str(r#"{"id":"a","type":"fancy-chart"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Other("fancy-chart".into()));
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains(r#""type":"fancy-chart""#));

        let node: ComponentNode = serde_json::from_str(r#"{"id":"b","type":"text"}"#).unwrap();
        assert_eq!(node.kind, NodeKind::Text);
    }

    #[test]
    fn test_missing_geometry_defaults() {
        let node: ComponentNode = serde_json::from_str(r#"{"id":"a","type":"container"}"#).unwrap();
        assert_eq!(node.position, Position::default());
        assert_eq!(node.size, Size::default());
        assert_eq!(node.rotation, 0.0);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_descendants_pre_order() {
        let tree = ComponentNode::new("root", "container")
            .with_child(
                ComponentNode::new("a", "container").with_child(ComponentNode::new("a1", "text")),
            )
            .with_child(ComponentNode::new("b", "text"));
        let ids: Vec<&str> = tree.descendants().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "a1", "b"]);
        assert_eq!(tree.count(), 4);
        assert!(tree.contains(&NodeId::from("a1")));
        assert!(!tree.contains(&NodeId::from("zz")));
    }

    #[test]
    fn test_builders_clamp_and_normalize() {
        let node = ComponentNode::new("a", "image")
            .with_size(-5.0, 10.0)
            .with_rotation(-45.0);
        assert_eq!(node.size, Size { width: 0.0, height: 10.0 });
        assert_eq!(node.rotation, 315.0);
    }
}
