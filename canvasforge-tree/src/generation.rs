//! Payload returned by a text-to-UI generation provider, and its conversion
//! into component nodes.
//!
//! The provider answers with three parallel structures keyed by its own
//! component ids:
//! ```json
//! {
//!   "components": [{"id": "hero", "type": "generated", "props": {...}, "children": []}],
//!   "layout": {"hero": {"x": 0, "y": 0, "width": 640, "height": 320}},
//!   "componentDetails": {"hero": {"styles": {...}, "code": "return h('div')"}}
//! }
//! ```

use crate::geometry::normalize_angle;
use crate::node::{ComponentNode, NodeId, Size};
use crate::value::{Value, ValueMap};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Size given to generated components the layout does not mention.
pub const DEFAULT_GENERATED_SIZE: Size = Size {
    width: 200.0,
    height: 100.0,
};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPayload {
    #[serde(default)]
    pub components: Vec<GeneratedComponent>,
    #[serde(default)]
    pub layout: BTreeMap<String, LayoutEntry>,
    #[serde(default)]
    pub component_details: BTreeMap<String, ComponentDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComponent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub props: ValueMap,
    #[serde(default)]
    pub children: Vec<GeneratedComponent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutEntry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentDetails {
    #[serde(default)]
    pub styles: ValueMap,
    #[serde(default)]
    pub props: ValueMap,
    /// Generated component source, run later in the sandbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl GenerationPayload {
    /// Convert into component nodes whose ids avoid everything in `taken`.
    ///
    /// Provider ids are kept when free; missing or colliding ids get a fresh
    /// uuid. Layout and details are looked up by the provider's id.
    pub fn into_nodes(self, taken: &HashSet<NodeId>) -> Vec<ComponentNode> {
        let GenerationPayload {
            components,
            layout,
            component_details,
        } = self;
        let mut used = taken.clone();
        components
            .into_iter()
            .map(|c| build_node(c, &layout, &component_details, &mut used))
            .collect()
    }
}

fn build_node(
    component: GeneratedComponent,
    layout: &BTreeMap<String, LayoutEntry>,
    details: &BTreeMap<String, ComponentDetails>,
    used: &mut HashSet<NodeId>,
) -> ComponentNode {
    let GeneratedComponent {
        id: source_id,
        kind,
        props,
        children,
    } = component;

    let id = match source_id.as_deref() {
        Some(s) if !s.is_empty() && !used.contains(&NodeId::from(s)) => NodeId::from(s),
        other => {
            let id = fresh_id(used);
            tracing::debug!(provider_id = ?other, assigned = %id, "assigned fresh id to generated component");
            id
        }
    };
    used.insert(id.clone());

    let mut node = ComponentNode::new(id, kind);
    node.props = props;
    node.size = DEFAULT_GENERATED_SIZE;

    if let Some(key) = source_id.as_deref() {
        if let Some(entry) = layout.get(key) {
            node = node
                .with_position(entry.x, entry.y)
                .with_size(entry.width, entry.height);
            node.rotation = normalize_angle(entry.rotation);
        }
        if let Some(detail) = details.get(key) {
            node.styles.extend(detail.styles.clone());
            node.props.extend(detail.props.clone());
            if let Some(code) = &detail.code {
                node.props.insert("code".to_string(), Value::from(code.as_str()));
            }
        }
    }

    node.children = children
        .into_iter()
        .map(|c| build_node(c, layout, details, used))
        .collect();
    node
}

fn fresh_id(used: &HashSet<NodeId>) -> NodeId {
    loop {
        let id = NodeId::generate();
        if !used.contains(&id) {
            return id;
        }
    }
}
