//! Audit trail types.
//!
//! An [`AuditEntry`] is the immutable record of one semantically classified
//! change to a node, edge or table row. Entries are append-only: nothing in
//! this crate updates or deletes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::attributes::Attributes;
use super::ids::{AuditId, NodeId, UserId};

/// Kind of entity an audit entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// A node (area-level events are also recorded under this kind).
    Node,
    /// An edge.
    Edge,
    /// A table row.
    TableRow,
}

impl EntityType {
    /// Stable storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "NODE",
            Self::Edge => "EDGE",
            Self::TableRow => "TABLE_ROW",
        }
    }

    /// Parse from the storage name. Accepts the legacy `TABLE_DATA` spelling.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NODE" => Some(Self::Node),
            "EDGE" => Some(Self::Edge),
            "TABLE_ROW" | "TABLE_DATA" => Some(Self::TableRow),
            _ => None,
        }
    }

    /// Human-facing noun used in descriptions.
    pub fn noun(&self) -> &'static str {
        match self {
            Self::Node => "Node",
            Self::Edge => "Edge",
            Self::TableRow => "Table row",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic classification of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Entity created.
    Create,
    /// Generic update not matched by a more specific category.
    Update,
    /// Entity deleted.
    Delete,
    /// Coalesced position change.
    Move,
    /// Lock engaged.
    Lock,
    /// Lock released.
    Unlock,
    /// Visual overrides changed.
    VisualStateChange,
    /// Containment parent changed.
    ParentChange,
    /// Connector list changed.
    HandlersChange,
    /// Label changed.
    LabelChange,
    /// Type changed.
    TypeChange,
    /// Moved to another area.
    AreaChange,
    /// Area replaced with a stored version.
    RestoreVersion,
}

impl ActionType {
    /// All variants, in declaration order.
    pub const ALL: [ActionType; 13] = [
        Self::Create,
        Self::Update,
        Self::Delete,
        Self::Move,
        Self::Lock,
        Self::Unlock,
        Self::VisualStateChange,
        Self::ParentChange,
        Self::HandlersChange,
        Self::LabelChange,
        Self::TypeChange,
        Self::AreaChange,
        Self::RestoreVersion,
    ];

    /// Stable storage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Move => "MOVE",
            Self::Lock => "LOCK",
            Self::Unlock => "UNLOCK",
            Self::VisualStateChange => "VISUAL_STATE_CHANGE",
            Self::ParentChange => "PARENT_CHANGE",
            Self::HandlersChange => "HANDLERS_CHANGE",
            Self::LabelChange => "LABEL_CHANGE",
            Self::TypeChange => "TYPE_CHANGE",
            Self::AreaChange => "AREA_CHANGE",
            Self::RestoreVersion => "RESTORE_VERSION",
        }
    }

    /// Parse from the storage name.
    pub fn from_str(s: &str) -> Option<Self> {
        let upper = s.to_uppercase();
        Self::ALL.iter().copied().find(|a| a.as_str() == upper)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after payload of an entry. Either side may be absent
/// (creation has no before, deletion no after).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// State before the change (partial).
    #[serde(default)]
    pub before: Option<Value>,
    /// State after the change (partial).
    #[serde(default)]
    pub after: Option<Value>,
}

impl ChangeSet {
    /// Both sides from attribute maps.
    pub fn between(before: Attributes, after: Attributes) -> Self {
        Self {
            before: Some(Value::Object(before)),
            after: Some(Value::Object(after)),
        }
    }

    /// Creation payload.
    pub fn created(after: Attributes) -> Self {
        Self {
            before: None,
            after: Some(Value::Object(after)),
        }
    }

    /// Deletion payload.
    pub fn deleted(before: Attributes) -> Self {
        Self {
            before: Some(Value::Object(before)),
            after: None,
        }
    }
}

/// An audit entry before it is assigned an id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAuditEntry {
    /// Acting user.
    pub user_id: UserId,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Classification.
    pub action_type: ActionType,
    /// Before/after payload.
    pub changes: ChangeSet,
    /// Human-facing description.
    pub description: Option<String>,
}

impl NewAuditEntry {
    /// Stamp with a fresh id and the given time.
    pub fn into_entry(self, created_at: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: AuditId::generate(),
            created_at,
            user_id: self.user_id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            action_type: self.action_type,
            changes: self.changes,
            description: self.description,
        }
    }
}

/// Immutable record of one classified change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry id.
    pub id: AuditId,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// Acting user.
    pub user_id: UserId,
    /// Entity kind.
    pub entity_type: EntityType,
    /// Entity identifier.
    pub entity_id: Uuid,
    /// Classification.
    pub action_type: ActionType,
    /// Before/after payload.
    pub changes: ChangeSet,
    /// Human-facing description.
    pub description: Option<String>,
}

/// Storage-level filter over audit entries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    /// Entity kind.
    pub entity_type: Option<EntityType>,
    /// Classification.
    pub action_type: Option<ActionType>,
    /// Acting user.
    pub user_id: Option<UserId>,
    /// Inclusive lower bound on `created_at`.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    pub date_to: Option<DateTime<Utc>>,
}

impl AuditQuery {
    /// Whether an entry passes every set filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.entity_type.map_or(true, |t| entry.entity_type == t)
            && self.action_type.map_or(true, |a| entry.action_type == a)
            && self.user_id.map_or(true, |u| entry.user_id == u)
            && self.date_from.map_or(true, |from| entry.created_at >= from)
            && self.date_to.map_or(true, |to| entry.created_at <= to)
    }
}

/// Outward history filter: the storage filter plus the composite node
/// filter and pagination.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilter {
    /// Storage-level filters.
    #[serde(flatten)]
    pub query: AuditQuery,
    /// Restrict to the composite history of one node.
    pub node_id: Option<NodeId>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

/// One page of history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    /// Entries on this page, newest first.
    pub data: Vec<AuditEntry>,
    /// Total number of matching entries.
    pub total: u64,
    /// Page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

/// Sort entries newest first. Stable, so callers control tie order.
pub fn sort_newest_first(entries: &mut [AuditEntry]) {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry_at(created_at: DateTime<Utc>, action: ActionType) -> AuditEntry {
        NewAuditEntry {
            user_id: UserId::new(Uuid::from_u128(1)),
            entity_type: EntityType::Node,
            entity_id: Uuid::from_u128(2),
            action_type: action,
            changes: ChangeSet::default(),
            description: None,
        }
        .into_entry(created_at)
    }

    #[test]
    fn test_action_type_roundtrip() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::from_str(action.as_str()), Some(action));
        }
        let json = serde_json::to_string(&ActionType::VisualStateChange).unwrap();
        assert_eq!(json, "\"VISUAL_STATE_CHANGE\"");
    }

    #[test]
    fn test_entity_type_accepts_legacy_name() {
        assert_eq!(EntityType::from_str("TABLE_DATA"), Some(EntityType::TableRow));
        assert_eq!(EntityType::from_str("edge"), Some(EntityType::Edge));
    }

    #[test]
    fn test_query_date_range_is_inclusive() {
        let now = Utc::now();
        let entry = entry_at(now, ActionType::Create);
        let query = AuditQuery {
            date_from: Some(now),
            date_to: Some(now),
            ..Default::default()
        };
        assert!(query.matches(&entry));

        let later = AuditQuery {
            date_from: Some(now + Duration::seconds(1)),
            ..Default::default()
        };
        assert!(!later.matches(&entry));
    }

    #[test]
    fn test_sort_newest_first() {
        let now = Utc::now();
        let mut entries = vec![
            entry_at(now - Duration::seconds(10), ActionType::Create),
            entry_at(now, ActionType::Update),
            entry_at(now - Duration::seconds(5), ActionType::Move),
        ];
        sort_newest_first(&mut entries);
        let actions: Vec<_> = entries.iter().map(|e| e.action_type).collect();
        assert_eq!(actions, vec![ActionType::Update, ActionType::Move, ActionType::Create]);
    }
}
