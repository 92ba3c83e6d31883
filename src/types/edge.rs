//! Edge types for the area graph.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{EdgeId, NodeId};

/// Render style applied when an edge carries no explicit type.
pub const DEFAULT_EDGE_TYPE: &str = "straight";

/// Visual attributes applied when an edge carries no explicit style.
pub fn default_edge_style() -> Value {
    serde_json::json!({ "strokeWidth": 1, "stroke": "black" })
}

/// Directed connection between two nodes.
///
/// Endpoints are plain node ids without referential enforcement; readers
/// must tolerate an endpoint that no longer resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Unique edge identifier.
    pub id: EdgeId,
    /// Source node.
    pub source: NodeId,
    /// Target node.
    pub target: NodeId,
    /// Connector on the source node.
    pub source_handle: Option<String>,
    /// Connector on the target node.
    pub target_handle: Option<String>,
    /// Render style tag.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Free-form visual attributes.
    pub style: Value,
}

impl Edge {
    /// Create an edge with default type and style.
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::generate(),
            source,
            target,
            source_handle: None,
            target_handle: None,
            edge_type: DEFAULT_EDGE_TYPE.to_string(),
            style: default_edge_style(),
        }
    }

    /// Set both connector handles.
    pub fn with_handles(mut self, source_handle: impl Into<String>, target_handle: impl Into<String>) -> Self {
        self.source_handle = Some(source_handle.into());
        self.target_handle = Some(target_handle.into());
        self
    }

    /// Whether the edge touches the given node on either end.
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_defaults() {
        let edge = Edge::new(NodeId::generate(), NodeId::generate());
        assert_eq!(edge.edge_type, "straight");
        assert_eq!(edge.style["stroke"], "black");
        assert_eq!(edge.style["strokeWidth"], 1);
    }

    #[test]
    fn test_edge_touches_both_ends() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        let edge = Edge::new(a, b);
        assert!(edge.touches(a));
        assert!(edge.touches(b));
        assert!(!edge.touches(NodeId::generate()));
    }

    #[test]
    fn test_edge_serializes_type_field() {
        let edge = Edge::new(NodeId::generate(), NodeId::generate()).with_handles("source", "target");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "straight");
        assert_eq!(json["sourceHandle"], "source");
    }
}
