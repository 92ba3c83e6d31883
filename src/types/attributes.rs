//! Flat attribute maps used for change detection and audit payloads.
//!
//! Each entity is projected into a JSON object keyed by the camelCase field
//! names below. The classifier compares two projections field by field, and
//! the differing subset becomes the `changes` payload of an audit entry.

use serde::Serialize;
use serde_json::{Map, Value};

use super::area::Area;
use super::edge::Edge;
use super::node::{Node, NodeDetail, NodeRecord, TableRow};

/// Attribute map of one entity.
pub type Attributes = Map<String, Value>;

/// Attribute field names.
pub mod field {
    /// Node canvas position.
    pub const POSITION: &str = "position";
    /// Node measured size.
    pub const MEASURED: &str = "measured";
    /// Owning area.
    pub const AREA_ID: &str = "areaId";
    /// Lock flag.
    pub const LOCKED: &str = "locked";
    /// Visual overrides.
    pub const VISUAL_STATE: &str = "visualState";
    /// Containment parent.
    pub const PARENT_ID: &str = "parentId";
    /// Display label.
    pub const LABEL: &str = "label";
    /// Node or edge type.
    pub const TYPE: &str = "type";
    /// Connector list.
    pub const HANDLERS: &str = "handlers";
}

/// Projection of an entity into an attribute map.
pub trait ToAttributes {
    /// Build the attribute map.
    fn to_attributes(&self) -> Attributes;
}

fn value_of<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Attributes of a node and its detail as one flat map.
pub fn node_attributes(node: &Node, detail: Option<&NodeDetail>) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert(field::TYPE.into(), value_of(&node.node_type));
    attrs.insert(field::POSITION.into(), value_of(&node.position));
    attrs.insert(field::MEASURED.into(), value_of(&node.measured));
    attrs.insert(field::PARENT_ID.into(), value_of(&node.parent_id));
    attrs.insert(field::AREA_ID.into(), value_of(&node.area_id));
    if let Some(detail) = detail {
        attrs.insert(field::LABEL.into(), value_of(&detail.label));
        attrs.insert(field::HANDLERS.into(), value_of(&detail.handlers));
        attrs.insert(field::LOCKED.into(), Value::Bool(detail.locked));
        attrs.insert(field::VISUAL_STATE.into(), value_of(&detail.visual_state));
    }
    attrs
}

impl ToAttributes for NodeRecord {
    fn to_attributes(&self) -> Attributes {
        node_attributes(&self.node, self.detail.as_ref())
    }
}

impl ToAttributes for Edge {
    fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("source".into(), value_of(&self.source));
        attrs.insert("target".into(), value_of(&self.target));
        attrs.insert("sourceHandle".into(), value_of(&self.source_handle));
        attrs.insert("targetHandle".into(), value_of(&self.target_handle));
        attrs.insert(field::TYPE.into(), Value::String(self.edge_type.clone()));
        attrs.insert("style".into(), self.style.clone());
        attrs
    }
}

impl ToAttributes for TableRow {
    fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("protectionName".into(), Value::String(self.protection_name.clone()));
        attrs.insert("excerpt".into(), Value::String(self.excerpt.clone()));
        attrs.insert("source".into(), Value::String(self.source.clone()));
        attrs.insert("triggeringAlgorithm".into(), Value::String(self.triggering_algorithm.clone()));
        attrs.insert("triggeringConditions".into(), Value::String(self.triggering_conditions.clone()));
        attrs.insert("order".into(), Value::from(self.order));
        attrs
    }
}

impl ToAttributes for Area {
    fn to_attributes(&self) -> Attributes {
        let mut attrs = Attributes::new();
        attrs.insert("name".into(), Value::String(self.name.clone()));
        attrs.insert("countryId".into(), value_of(&self.country_id));
        attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ids::{DetailId, NodeId};
    use crate::types::node::{NodeType, Position};

    #[test]
    fn test_node_attributes_include_detail_fields() {
        let node = Node {
            id: NodeId::generate(),
            node_type: NodeType::Ops,
            position: Position::new(1.0, 2.0),
            measured: None,
            parent_id: None,
            area_id: None,
        };
        let detail = NodeDetail {
            id: DetailId::generate(),
            node_id: node.id,
            label: "Pump".into(),
            handlers: vec![],
            locked: true,
            visual_state: None,
        };

        let attrs = node_attributes(&node, Some(&detail));
        assert_eq!(attrs[field::LABEL], "Pump");
        assert_eq!(attrs[field::LOCKED], true);
        assert_eq!(attrs[field::TYPE], "OPS");
        assert_eq!(attrs[field::POSITION], serde_json::json!({"x": 1.0, "y": 2.0}));
        assert!(attrs[field::PARENT_ID].is_null());
    }

    #[test]
    fn test_bare_node_has_no_detail_fields() {
        let node = Node {
            id: NodeId::generate(),
            node_type: NodeType::Note,
            position: Position::default(),
            measured: None,
            parent_id: None,
            area_id: None,
        };
        let attrs = node_attributes(&node, None);
        assert!(!attrs.contains_key(field::LABEL));
    }
}
