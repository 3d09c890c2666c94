//! Link diff engine.
//!
//! Computes, for one reference field, which keys a mutation adds and which it
//! removes. Diffs are derived from the field's previous stored value and the
//! update operation, so a no-op (pushing a key already present, pulling an
//! absent one) never appears in a diff and is never propagated.
//!
//! `added` and `removed` are always disjoint and free of duplicates.

use crate::error::{LinkError, LinkResult};
use crate::schema::{Cardinality, KeyType, ReferenceDef};
use linksync_store::{Key, UpdateOp};
use serde_json::Value;

/// Additions and removals on one reference field during one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDiff {
    /// Reference field name.
    pub field: String,
    /// Keys newly referenced, in the order they were added.
    pub added: Vec<Key>,
    /// Keys no longer referenced.
    pub removed: Vec<Key>,
}

impl LinkDiff {
    /// Creates an empty diff for `field`.
    pub fn empty(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diffs a single update operation against the field's previous value.
///
/// # Errors
///
/// Returns [`LinkError::UnsupportedOperation`] for array operators on a
/// single-valued reference, and [`LinkError::InvalidInput`] when an operand is
/// not a well-formed key.
pub fn diff(
    owner: &str,
    field: &ReferenceDef,
    previous: Option<&Value>,
    op: &UpdateOp,
) -> LinkResult<LinkDiff> {
    check_op(owner, field, op)?;
    let before = reference_ids(owner, field, previous)?;
    let mut diff = LinkDiff::empty(&field.name);

    match op {
        UpdateOp::Set(value) => {
            let after = reference_ids(owner, field, Some(value))?;
            return Ok(diff_keys(&field.name, &before, &after));
        }
        UpdateOp::Unset => diff.removed = before,
        UpdateOp::UnsetIf(expected) => {
            if previous == Some(expected) {
                diff.removed = before;
            }
        }
        UpdateOp::Push(value) => {
            let key = operand_key(owner, field, value)?;
            if !before.contains(&key) {
                diff.added.push(key);
            }
        }
        UpdateOp::PushAll(values) => {
            for value in values {
                let key = operand_key(owner, field, value)?;
                if !before.contains(&key) && !diff.added.contains(&key) {
                    diff.added.push(key);
                }
            }
        }
        UpdateOp::Pull(value) => {
            let key = operand_key(owner, field, value)?;
            if before.contains(&key) {
                diff.removed.push(key);
            }
        }
        UpdateOp::PullAll(values) => {
            for value in values {
                let key = operand_key(owner, field, value)?;
                if before.contains(&key) && !diff.removed.contains(&key) {
                    diff.removed.push(key);
                }
            }
        }
    }

    Ok(diff)
}

/// Diffs two whole field values. `None` stands for an absent field.
///
/// Used for creates (nothing before) and deletes (nothing after).
pub fn diff_values(
    owner: &str,
    field: &ReferenceDef,
    previous: Option<&Value>,
    next: Option<&Value>,
) -> LinkResult<LinkDiff> {
    let before = reference_ids(owner, field, previous)?;
    let after = reference_ids(owner, field, next)?;
    Ok(diff_keys(&field.name, &before, &after))
}

/// Validates an operation against a reference field without diffing it.
pub fn check_op(owner: &str, field: &ReferenceDef, op: &UpdateOp) -> LinkResult<()> {
    if field.cardinality == Cardinality::One && op.is_array_op() {
        return Err(LinkError::UnsupportedOperation {
            entity: owner.to_string(),
            field: field.name.clone(),
            operator: op.operator().to_string(),
        });
    }
    match op {
        UpdateOp::Set(value) => {
            for key in reference_ids(owner, field, Some(value))? {
                check_key(owner, field, &key)?;
            }
        }
        UpdateOp::Push(value) | UpdateOp::Pull(value) => {
            operand_key(owner, field, value)?;
        }
        UpdateOp::PushAll(values) | UpdateOp::PullAll(values) => {
            for value in values {
                operand_key(owner, field, value)?;
            }
        }
        UpdateOp::Unset | UpdateOp::UnsetIf(_) => {}
    }
    Ok(())
}

/// Reads the keys held by a stored reference value.
///
/// Absent and `null` values hold no keys. Duplicate keys in a stored array are
/// reported once.
pub fn reference_ids(
    owner: &str,
    field: &ReferenceDef,
    value: Option<&Value>,
) -> LinkResult<Vec<Key>> {
    let malformed = |expected: &str| {
        LinkError::invalid_input(format!(
            "{owner}.{} must hold {expected}",
            field.name
        ))
    };

    match (field.cardinality, value) {
        (_, None | Some(Value::Null)) => Ok(Vec::new()),
        (Cardinality::One, Some(value)) => Key::from_value(value)
            .map(|key| vec![key])
            .ok_or_else(|| malformed("a single key string")),
        (Cardinality::Many, Some(Value::Array(items))) => {
            let mut keys: Vec<Key> = Vec::with_capacity(items.len());
            for item in items {
                let key = Key::from_value(item)
                    .ok_or_else(|| malformed("an array of key strings"))?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            Ok(keys)
        }
        (Cardinality::Many, Some(_)) => Err(malformed("an array of key strings")),
    }
}

fn operand_key(owner: &str, field: &ReferenceDef, value: &Value) -> LinkResult<Key> {
    let key = Key::from_value(value).ok_or_else(|| {
        LinkError::invalid_input(format!(
            "{owner}.{} expects key strings, got {value}",
            field.name
        ))
    })?;
    check_key(owner, field, &key)?;
    Ok(key)
}

fn check_key(owner: &str, field: &ReferenceDef, key: &Key) -> LinkResult<()> {
    if field.key_type == KeyType::Uuid && !key.is_uuid() {
        return Err(LinkError::invalid_input(format!(
            "{owner}.{} references {} keys, got {key}",
            field.name, field.target
        )));
    }
    Ok(())
}

fn diff_keys(field: &str, before: &[Key], after: &[Key]) -> LinkDiff {
    LinkDiff {
        field: field.to_string(),
        added: after
            .iter()
            .filter(|key| !before.contains(key))
            .cloned()
            .collect(),
        removed: before
            .iter()
            .filter(|key| !after.contains(key))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::InverseDef;
    use proptest::prelude::*;
    use serde_json::json;

    fn many(name: &str) -> ReferenceDef {
        ReferenceDef {
            name: name.into(),
            cardinality: Cardinality::Many,
            target: "person".into(),
            key_type: KeyType::String,
            inverse: Some(InverseDef {
                field: name.into(),
                cardinality: Cardinality::Many,
            }),
            external: false,
        }
    }

    fn one(name: &str) -> ReferenceDef {
        ReferenceDef {
            cardinality: Cardinality::One,
            ..many(name)
        }
    }

    fn keys(names: &[&str]) -> Vec<Key> {
        names.iter().map(|name| Key::new(*name)).collect()
    }

    #[test]
    fn push_existing_is_noop() {
        let field = many("lovers");
        let d = diff("person", &field, Some(&json!(["b"])), &UpdateOp::Push(json!("b"))).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn pull_absent_is_noop() {
        let field = many("lovers");
        let d = diff("person", &field, Some(&json!(["b"])), &UpdateOp::Pull(json!("c"))).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn push_all_keeps_order_and_skips_present() {
        let field = many("houses");
        let op = UpdateOp::PushAll(vec![json!("h3"), json!("h1"), json!("h2"), json!("h3")]);
        let d = diff("person", &field, Some(&json!(["h1"])), &op).unwrap();
        assert_eq!(d.added, keys(&["h3", "h2"]));
        assert!(d.removed.is_empty());
    }

    #[test]
    fn pull_all_removes_present_once() {
        let field = many("houses");
        let op = UpdateOp::PullAll(vec![json!("h1"), json!("h9"), json!("h1")]);
        let d = diff("person", &field, Some(&json!(["h1", "h2"])), &op).unwrap();
        assert_eq!(d.removed, keys(&["h1"]));
        assert!(d.added.is_empty());
    }

    #[test]
    fn scalar_set_replaces_key() {
        let field = one("soulmate");
        let d = diff("person", &field, Some(&json!("b")), &UpdateOp::Set(json!("c"))).unwrap();
        assert_eq!(d.added, keys(&["c"]));
        assert_eq!(d.removed, keys(&["b"]));

        let d = diff("person", &field, None, &UpdateOp::Set(json!("c"))).unwrap();
        assert_eq!(d.added, keys(&["c"]));
        assert!(d.removed.is_empty());

        let d = diff("person", &field, Some(&json!("c")), &UpdateOp::Set(json!("c"))).unwrap();
        assert!(d.is_empty());
    }

    #[test]
    fn scalar_unset_and_null_set_remove_key() {
        let field = one("soulmate");
        let d = diff("person", &field, Some(&json!("b")), &UpdateOp::Unset).unwrap();
        assert_eq!(d.removed, keys(&["b"]));

        let d = diff("person", &field, Some(&json!("b")), &UpdateOp::Set(Value::Null)).unwrap();
        assert_eq!(d.removed, keys(&["b"]));
        assert!(d.added.is_empty());
    }

    #[test]
    fn unset_if_only_removes_matching_value() {
        let field = one("soulmate");
        let op = UpdateOp::UnsetIf(json!("c"));
        assert!(diff("person", &field, Some(&json!("b")), &op).unwrap().is_empty());

        let op = UpdateOp::UnsetIf(json!("b"));
        let d = diff("person", &field, Some(&json!("b")), &op).unwrap();
        assert_eq!(d.removed, keys(&["b"]));
    }

    #[test]
    fn plural_set_computes_symmetric_difference() {
        let field = many("houses");
        let op = UpdateOp::Set(json!(["h2", "h3", "h3"]));
        let d = diff("person", &field, Some(&json!(["h1", "h2"])), &op).unwrap();
        assert_eq!(d.added, keys(&["h3"]));
        assert_eq!(d.removed, keys(&["h1"]));
    }

    #[test]
    fn array_ops_on_scalar_field_are_unsupported() {
        let field = one("soulmate");
        for op in [
            UpdateOp::Push(json!("b")),
            UpdateOp::PushAll(vec![json!("b")]),
            UpdateOp::Pull(json!("b")),
            UpdateOp::PullAll(vec![json!("b")]),
        ] {
            let err = diff("person", &field, None, &op).unwrap_err();
            assert!(matches!(err, LinkError::UnsupportedOperation { .. }));
        }
    }

    #[test]
    fn malformed_operands_are_rejected() {
        let field = many("houses");
        let err = diff("person", &field, None, &UpdateOp::Push(json!(7))).unwrap_err();
        assert!(matches!(err, LinkError::InvalidInput { .. }));

        let err = diff("person", &field, None, &UpdateOp::Set(json!("h1"))).unwrap_err();
        assert!(matches!(err, LinkError::InvalidInput { .. }));
    }

    #[test]
    fn uuid_targets_require_uuid_keys() {
        let field = ReferenceDef {
            key_type: KeyType::Uuid,
            target: "house".into(),
            ..many("houses")
        };
        let err = check_op("person", &field, &UpdateOp::Push(json!("h1"))).unwrap_err();
        assert!(matches!(err, LinkError::InvalidInput { .. }));

        let key = Key::generate();
        check_op("person", &field, &UpdateOp::Push(key.to_value())).unwrap();
    }

    #[test]
    fn create_and_delete_diffs() {
        let field = many("houses");
        let created = diff_values("person", &field, None, Some(&json!(["h1", "h2"]))).unwrap();
        assert_eq!(created.added, keys(&["h1", "h2"]));

        let deleted = diff_values("person", &field, Some(&json!(["h1", "h2"])), None).unwrap();
        assert_eq!(deleted.removed, keys(&["h1", "h2"]));
        assert!(deleted.added.is_empty());
    }

    fn key_strategy() -> impl Strategy<Value = String> {
        "[a-e]"
    }

    fn op_strategy() -> impl Strategy<Value = UpdateOp> {
        prop_oneof![
            key_strategy().prop_map(|k| UpdateOp::Push(json!(k))),
            key_strategy().prop_map(|k| UpdateOp::Pull(json!(k))),
            prop::collection::vec(key_strategy(), 0..6)
                .prop_map(|ks| UpdateOp::PushAll(ks.into_iter().map(Value::from).collect())),
            prop::collection::vec(key_strategy(), 0..6)
                .prop_map(|ks| UpdateOp::PullAll(ks.into_iter().map(Value::from).collect())),
            prop::collection::vec(key_strategy(), 0..6).prop_map(|ks| UpdateOp::Set(json!(ks))),
            Just(UpdateOp::Unset),
        ]
    }

    proptest! {
        #[test]
        fn added_and_removed_are_disjoint(
            previous in prop::collection::vec(key_strategy(), 0..6),
            op in op_strategy(),
        ) {
            let field = many("lovers");
            let d = diff("person", &field, Some(&json!(previous)), &op).unwrap();
            for key in &d.added {
                prop_assert!(!d.removed.contains(key));
                prop_assert!(!previous.contains(&key.to_string()));
            }
            for key in &d.removed {
                prop_assert!(previous.contains(&key.to_string()));
            }
        }

        #[test]
        fn diff_matches_applied_update(
            previous in prop::collection::btree_set(key_strategy(), 0..5),
            op in op_strategy(),
        ) {
            let field = many("lovers");
            let previous: Vec<String> = previous.into_iter().collect();
            let mut doc = serde_json::Map::new();
            doc.insert("lovers".into(), json!(previous));
            linksync_store::UpdateExpression::new()
                .with("lovers", op.clone())
                .apply(&mut doc)
                .unwrap();

            let before = reference_ids("person", &field, Some(&json!(previous))).unwrap();
            let after = reference_ids("person", &field, doc.get("lovers")).unwrap();
            let d = diff("person", &field, Some(&json!(previous)), &op).unwrap();

            for key in &after {
                prop_assert_eq!(before.contains(key) || d.added.contains(key), true);
            }
            for key in &d.removed {
                prop_assert!(!after.contains(key));
            }
        }
    }
}
