//! Node, detail and table row types.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{AreaId, DetailId, NodeId, RowId};

/// Kind of a node on the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    /// Operational object (pump station, tank farm, checkpoint).
    Ops,
    /// Container node grouping children visually.
    Group,
    /// Free-standing annotation.
    Note,
}

impl NodeType {
    /// Parse node type from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OPS" => Some(Self::Ops),
            "GROUP" => Some(Self::Group),
            "NOTE" => Some(Self::Note),
            _ => None,
        }
    }
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Ops
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ops => write!(f, "OPS"),
            Self::Group => write!(f, "GROUP"),
            Self::Note => write!(f, "NOTE"),
        }
    }
}

/// Canvas position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Rendered size of a node as measured by the client.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Measured {
    /// Width in canvas units.
    pub width: f64,
    /// Height in canvas units.
    pub height: f64,
}

/// Connector descriptor on a node (where edges may attach).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handler {
    /// Handle id referenced by `Edge::source_handle` / `Edge::target_handle`.
    pub id: String,
    /// `source` or `target`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Side of the node (`left`, `right`, `top`, `bottom`).
    pub position: String,
}

impl Handler {
    /// Create a connector descriptor.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, position: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position: position.into(),
        }
    }
}

/// Status badge of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisualStatus {
    /// No highlight.
    Normal,
    /// Warning highlight.
    Warning,
    /// Error highlight.
    Error,
    /// Success highlight.
    Success,
    /// Informational highlight.
    Info,
}

/// Optional visual overrides of a node. Every field is independently optional.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualState {
    /// Status badge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VisualStatus>,
    /// Border color as hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    /// Border width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
    /// Background color as hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    /// Opacity in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
}

/// A node in the area graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique node identifier.
    pub id: NodeId,
    /// Node kind.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Canvas position.
    pub position: Position,
    /// Measured size, if the client reported one.
    pub measured: Option<Measured>,
    /// Parent node in the containment tree.
    pub parent_id: Option<NodeId>,
    /// Area the node belongs to.
    pub area_id: Option<AreaId>,
}

/// Display and business attributes of a node (exactly one per node).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    /// Unique detail identifier.
    pub id: DetailId,
    /// Owning node.
    pub node_id: NodeId,
    /// Display label.
    pub label: String,
    /// Ordered connector descriptors.
    pub handlers: Vec<Handler>,
    /// Whether the node is locked against edits on the canvas.
    pub locked: bool,
    /// Visual overrides.
    pub visual_state: Option<VisualState>,
}

/// A row of the protection table attached to a node detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    /// Unique row identifier.
    pub id: RowId,
    /// Owning detail.
    pub detail_id: DetailId,
    /// Protection name.
    pub protection_name: String,
    /// Regulation excerpt.
    pub excerpt: String,
    /// Source document.
    pub source: String,
    /// Triggering algorithm.
    pub triggering_algorithm: String,
    /// Triggering conditions.
    pub triggering_conditions: String,
    /// Display order. Not guaranteed contiguous.
    pub order: i32,
}

/// A node together with its detail and ordered table rows.
///
/// `detail` is optional only because legacy data may contain bare nodes;
/// every node created through this crate has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// The node itself.
    pub node: Node,
    /// Its detail record.
    pub detail: Option<NodeDetail>,
    /// Table rows ordered by `order`.
    pub rows: Vec<TableRow>,
}

impl NodeRecord {
    /// Sort rows into display order (by `order`, then id for ties).
    pub fn sort_rows(rows: &mut [TableRow]) {
        rows.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
    }
}
