//! Semantic classification of entity changes.
//!
//! Two attribute maps of the same entity are compared field by field. A diff
//! touching only `position` is routed to the move coalescer; any other
//! non-empty diff receives exactly one label from a fixed precedence list.
//! The label only drives the action type and description: the change set
//! always carries every differing field.

use serde_json::Value;

use crate::types::{field, ActionType, Attributes, ChangeSet, EntityType};

/// Fields that differ between two attribute maps, with their values on
/// each side. A field missing on one side is recorded as `null` there.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeDiff {
    /// Differing fields, old values.
    pub before: Attributes,
    /// Differing fields, new values.
    pub after: Attributes,
}

impl AttributeDiff {
    /// Compare two attribute maps.
    pub fn compute(before: &Attributes, after: &Attributes) -> Self {
        let mut diff = Self::default();
        let keys = before.keys().chain(after.keys().filter(|k| !before.contains_key(*k)));
        for key in keys {
            let old = before.get(key).unwrap_or(&Value::Null);
            let new = after.get(key).unwrap_or(&Value::Null);
            if old != new {
                diff.before.insert(key.clone(), old.clone());
                diff.after.insert(key.clone(), new.clone());
            }
        }
        diff
    }

    /// Whether nothing differs.
    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }

    /// Whether `name` differs.
    pub fn contains(&self, name: &str) -> bool {
        self.after.contains_key(name)
    }

    /// Whether the only differing field is `position`.
    pub fn is_position_only(&self) -> bool {
        self.after.len() == 1 && self.contains(field::POSITION)
    }

    /// Names of the differing fields.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.after.keys().map(String::as_str)
    }

    /// Convert into an audit change set.
    pub fn into_changes(self) -> ChangeSet {
        ChangeSet::between(self.before, self.after)
    }
}

/// Result of classifying a non-move diff.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Winning category.
    pub action: ActionType,
    /// Human-facing description naming the winning category.
    pub description: String,
    /// Every differing field.
    pub changes: ChangeSet,
}

/// Where a before/after pair should go.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRoute {
    /// Nothing differs; no entry.
    Unchanged,
    /// Position-only change, for the move coalescer.
    Move(AttributeDiff),
    /// Any other change, ready to be recorded.
    Classified(Classification),
}

/// Route a before/after pair of one entity.
pub fn route(entity_type: EntityType, before: &Attributes, after: &Attributes) -> ChangeRoute {
    let diff = AttributeDiff::compute(before, after);
    if diff.is_empty() {
        ChangeRoute::Unchanged
    } else if diff.is_position_only() {
        ChangeRoute::Move(diff)
    } else {
        match classify(entity_type, diff) {
            Some(c) => ChangeRoute::Classified(c),
            None => ChangeRoute::Unchanged,
        }
    }
}

/// Label a diff. Returns `None` for an empty diff.
///
/// Precedence, first match wins: area, lock, visual state, parent, label,
/// type, handlers, then a generic update.
pub fn classify(entity_type: EntityType, diff: AttributeDiff) -> Option<Classification> {
    if diff.is_empty() {
        return None;
    }
    let noun = entity_type.noun();

    let (action, description) = if diff.contains(field::AREA_ID) {
        (ActionType::AreaChange, format!("{noun} moved to another area"))
    } else if diff.contains(field::LOCKED) {
        if diff.after.get(field::LOCKED) == Some(&Value::Bool(true)) {
            (ActionType::Lock, format!("{noun} locked"))
        } else {
            (ActionType::Unlock, format!("{noun} unlocked"))
        }
    } else if diff.contains(field::VISUAL_STATE) {
        (ActionType::VisualStateChange, format!("{noun} visual state changed"))
    } else if diff.contains(field::PARENT_ID) {
        (
            ActionType::ParentChange,
            format!(
                "Parent changed from {} to {}",
                display(diff.before.get(field::PARENT_ID)),
                display(diff.after.get(field::PARENT_ID)),
            ),
        )
    } else if diff.contains(field::LABEL) {
        (
            ActionType::LabelChange,
            format!(
                "Label changed from \"{}\" to \"{}\"",
                display(diff.before.get(field::LABEL)),
                display(diff.after.get(field::LABEL)),
            ),
        )
    } else if diff.contains(field::TYPE) {
        (
            ActionType::TypeChange,
            format!(
                "Type changed from {} to {}",
                display(diff.before.get(field::TYPE)),
                display(diff.after.get(field::TYPE)),
            ),
        )
    } else if diff.contains(field::HANDLERS) {
        (ActionType::HandlersChange, format!("{noun} handlers changed"))
    } else {
        let fields: Vec<&str> = diff.fields().collect();
        (ActionType::Update, format!("{noun} updated: {}", fields.join(", ")))
    };

    Some(Classification {
        action,
        description,
        changes: diff.into_changes(),
    })
}

/// Description of a coalesced move from the anchored and final positions.
pub fn move_description(before: &Attributes, after: &Attributes) -> String {
    format!(
        "Node moved from {} to {}",
        coordinates(before.get(field::POSITION)),
        coordinates(after.get(field::POSITION)),
    )
}

fn coordinates(position: Option<&Value>) -> String {
    let axis = |name: &str| {
        position
            .and_then(|p| p.get(name))
            .and_then(Value::as_f64)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string())
    };
    format!("({}, {})", axis("x"), axis("y"))
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "none".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Attributes {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn classified(before: Value, after: Value) -> Classification {
        match route(EntityType::Node, &attrs(before), &attrs(after)) {
            ChangeRoute::Classified(c) => c,
            other => panic!("expected classification, got {other:?}"),
        }
    }

    #[test]
    fn test_identical_maps_are_unchanged() {
        let a = attrs(json!({"label": "x", "position": {"x": 1.0, "y": 2.0}}));
        assert_eq!(route(EntityType::Node, &a, &a.clone()), ChangeRoute::Unchanged);
    }

    #[test]
    fn test_position_only_goes_to_coalescer() {
        let before = attrs(json!({"label": "x", "position": {"x": 0.0, "y": 0.0}}));
        let after = attrs(json!({"label": "x", "position": {"x": 5.0, "y": 0.0}}));
        match route(EntityType::Node, &before, &after) {
            ChangeRoute::Move(diff) => {
                assert_eq!(diff.after.len(), 1);
                assert_eq!(diff.after["position"], json!({"x": 5.0, "y": 0.0}));
            }
            other => panic!("expected move, got {other:?}"),
        }
    }

    #[test]
    fn test_label_change_description() {
        let c = classified(json!({"label": "Pump A"}), json!({"label": "Pump B"}));
        assert_eq!(c.action, ActionType::LabelChange);
        assert_eq!(c.description, "Label changed from \"Pump A\" to \"Pump B\"");
    }

    #[test]
    fn test_lock_and_unlock() {
        let lock = classified(json!({"locked": false}), json!({"locked": true}));
        assert_eq!(lock.action, ActionType::Lock);
        let unlock = classified(json!({"locked": true}), json!({"locked": false}));
        assert_eq!(unlock.action, ActionType::Unlock);
    }

    #[test]
    fn test_precedence_picks_single_label_but_keeps_all_fields() {
        let c = classified(
            json!({"label": "a", "locked": false, "position": {"x": 0.0, "y": 0.0}}),
            json!({"label": "b", "locked": true, "position": {"x": 9.0, "y": 0.0}}),
        );
        assert_eq!(c.action, ActionType::Lock);
        let after = c.changes.after.unwrap();
        assert!(after.get("label").is_some());
        assert!(after.get("locked").is_some());
        assert!(after.get("position").is_some());
    }

    #[test]
    fn test_area_change_wins_over_everything() {
        let c = classified(
            json!({"areaId": "a", "locked": false, "parentId": null}),
            json!({"areaId": "b", "locked": true, "parentId": "p"}),
        );
        assert_eq!(c.action, ActionType::AreaChange);
    }

    #[test]
    fn test_parent_beats_label() {
        let c = classified(
            json!({"parentId": null, "label": "a"}),
            json!({"parentId": "p1", "label": "b"}),
        );
        assert_eq!(c.action, ActionType::ParentChange);
        assert_eq!(c.description, "Parent changed from none to p1");
    }

    #[test]
    fn test_visual_state_uses_structural_equality() {
        let same = route(
            EntityType::Node,
            &attrs(json!({"visualState": {"status": "warning", "opacity": 0.5}})),
            &attrs(json!({"visualState": {"opacity": 0.5, "status": "warning"}})),
        );
        assert_eq!(same, ChangeRoute::Unchanged);

        let c = classified(
            json!({"visualState": {"status": "warning"}}),
            json!({"visualState": {"status": "error"}}),
        );
        assert_eq!(c.action, ActionType::VisualStateChange);
    }

    #[test]
    fn test_handlers_and_type() {
        let c = classified(json!({"handlers": []}), json!({"handlers": [{"id": "h1"}]}));
        assert_eq!(c.action, ActionType::HandlersChange);
        let c = classified(json!({"type": "OPS"}), json!({"type": "GROUP"}));
        assert_eq!(c.action, ActionType::TypeChange);
        assert_eq!(c.description, "Type changed from OPS to GROUP");
    }

    #[test]
    fn test_fallback_update_lists_fields() {
        let c = classified(
            json!({"excerpt": "a", "order": 1}),
            json!({"excerpt": "b", "order": 2}),
        );
        assert_eq!(c.action, ActionType::Update);
        assert_eq!(c.description, "Node updated: excerpt, order");
    }

    #[test]
    fn test_missing_field_counts_as_null() {
        let diff = AttributeDiff::compute(&attrs(json!({})), &attrs(json!({"measured": {"width": 1.0}})));
        assert!(diff.contains("measured"));
        assert_eq!(diff.before["measured"], Value::Null);
    }

    #[test]
    fn test_move_description() {
        let before = attrs(json!({"position": {"x": 0.0, "y": 10.5}}));
        let after = attrs(json!({"position": {"x": 40.0, "y": -2.0}}));
        assert_eq!(move_description(&before, &after), "Node moved from (0, 10.5) to (40, -2)");
    }
}
