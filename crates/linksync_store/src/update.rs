//! Update expressions.
//!
//! An [`UpdateExpression`] is an ordered list of per-field operations modelled
//! on MongoDB's update operators. The operator set is closed: callers build
//! expressions from [`UpdateOp`] variants, and only untrusted JSON input goes
//! through [`UpdateExpression::from_json`], which is where an unknown operator
//! can still show up.

use crate::error::{StoreError, StoreResult};
use serde_json::{Map, Value};
use thiserror::Error;

/// A single update operation against one field.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Replace the field value (`$set`). Setting `null` clears the field.
    Set(Value),
    /// Remove the field (`$unset`).
    Unset,
    /// Remove the field only if it currently equals the given value.
    ///
    /// Used for guarded clears of single-valued back-references; there is no
    /// JSON spelling for it.
    UnsetIf(Value),
    /// Append one value to an array field unless already present (`$push`).
    Push(Value),
    /// Append each value not already present, in order (`$pushAll`).
    PushAll(Vec<Value>),
    /// Remove one value from an array field (`$pull`).
    Pull(Value),
    /// Remove each given value from an array field (`$pullAll`).
    PullAll(Vec<Value>),
}

impl UpdateOp {
    /// Returns the operator name as spelled in JSON update documents.
    #[must_use]
    pub fn operator(&self) -> &'static str {
        match self {
            UpdateOp::Set(_) => "$set",
            UpdateOp::Unset => "$unset",
            UpdateOp::UnsetIf(_) => "$unsetIf",
            UpdateOp::Push(_) => "$push",
            UpdateOp::PushAll(_) => "$pushAll",
            UpdateOp::Pull(_) => "$pull",
            UpdateOp::PullAll(_) => "$pullAll",
        }
    }

    /// Returns true for operators that only make sense on array fields.
    #[must_use]
    pub fn is_array_op(&self) -> bool {
        matches!(
            self,
            UpdateOp::Push(_) | UpdateOp::PushAll(_) | UpdateOp::Pull(_) | UpdateOp::PullAll(_)
        )
    }

    fn apply(&self, field: &str, fields: &mut Map<String, Value>) -> StoreResult<()> {
        match self {
            UpdateOp::Set(Value::Null) | UpdateOp::Unset => {
                fields.remove(field);
            }
            UpdateOp::Set(value) => {
                fields.insert(field.to_string(), value.clone());
            }
            UpdateOp::UnsetIf(expected) => {
                if fields.get(field) == Some(expected) {
                    fields.remove(field);
                }
            }
            UpdateOp::Push(value) => {
                let items = self.array_mut(field, fields)?;
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            UpdateOp::PushAll(values) => {
                let items = self.array_mut(field, fields)?;
                for value in values {
                    if !items.contains(value) {
                        items.push(value.clone());
                    }
                }
            }
            UpdateOp::Pull(value) => {
                if fields.contains_key(field) {
                    self.array_mut(field, fields)?.retain(|item| item != value);
                }
            }
            UpdateOp::PullAll(values) => {
                if fields.contains_key(field) {
                    self.array_mut(field, fields)?
                        .retain(|item| !values.contains(item));
                }
            }
        }
        Ok(())
    }

    // Missing and null fields become empty arrays; any other scalar is rejected.
    fn array_mut<'a>(
        &self,
        field: &str,
        fields: &'a mut Map<String, Value>,
    ) -> StoreResult<&'a mut Vec<Value>> {
        let slot = fields
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => Ok(items),
            other => Err(StoreError::InvalidUpdate {
                field: field.to_string(),
                operator: self.operator(),
                reason: format!("field holds {}, not an array", json_kind(other)),
            }),
        }
    }
}

/// One field paired with the operation applied to it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Top-level field name.
    pub field: String,
    /// Operation to apply.
    pub op: UpdateOp,
}

/// Errors raised while parsing a JSON update document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The operator is not one of the supported update operators.
    #[error("unsupported update operator {operator} on field {field}")]
    UnsupportedOperator {
        /// The operator as written.
        operator: String,
        /// The first field it was applied to.
        field: String,
    },

    /// The update document is not shaped like `{ "$op": { field: value } }`.
    #[error("malformed update: {0}")]
    Malformed(String),
}

/// An ordered set of field updates applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateExpression {
    updates: Vec<FieldUpdate>,
}

impl UpdateExpression {
    /// Creates an empty expression.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation on `field`.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, op: UpdateOp) -> Self {
        self.add(field, op);
        self
    }

    /// Adds an operation on `field` in place.
    pub fn add(&mut self, field: impl Into<String>, op: UpdateOp) {
        self.updates.push(FieldUpdate {
            field: field.into(),
            op,
        });
    }

    /// Adds a `$set`.
    #[must_use]
    pub fn set(self, field: impl Into<String>, value: Value) -> Self {
        self.with(field, UpdateOp::Set(value))
    }

    /// Adds an `$unset`.
    #[must_use]
    pub fn unset(self, field: impl Into<String>) -> Self {
        self.with(field, UpdateOp::Unset)
    }

    /// Adds a `$push`.
    #[must_use]
    pub fn push(self, field: impl Into<String>, value: Value) -> Self {
        self.with(field, UpdateOp::Push(value))
    }

    /// Adds a `$pushAll`.
    #[must_use]
    pub fn push_all(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, UpdateOp::PushAll(values))
    }

    /// Adds a `$pull`.
    #[must_use]
    pub fn pull(self, field: impl Into<String>, value: Value) -> Self {
        self.with(field, UpdateOp::Pull(value))
    }

    /// Adds a `$pullAll`.
    #[must_use]
    pub fn pull_all(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(field, UpdateOp::PullAll(values))
    }

    /// Iterates over the field updates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldUpdate> {
        self.updates.iter()
    }

    /// Returns the operation targeting `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&UpdateOp> {
        self.updates
            .iter()
            .find(|update| update.field == field)
            .map(|update| &update.op)
    }

    /// Returns the number of field updates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.updates.len()
    }

    /// Returns true if the expression changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Returns the first field that is targeted by more than one operation.
    #[must_use]
    pub fn conflicting_field(&self) -> Option<&str> {
        self.updates.iter().enumerate().find_map(|(i, update)| {
            self.updates[..i]
                .iter()
                .any(|earlier| earlier.field == update.field)
                .then_some(update.field.as_str())
        })
    }

    /// Applies the expression to a field map.
    ///
    /// Either every update applies or the map is left untouched.
    pub fn apply(&self, fields: &mut Map<String, Value>) -> StoreResult<()> {
        let mut next = fields.clone();
        for update in &self.updates {
            update.op.apply(&update.field, &mut next)?;
        }
        *fields = next;
        Ok(())
    }

    /// Parses a MongoDB-style update document.
    ///
    /// ```rust
    /// use linksync_store::{UpdateExpression, UpdateOp};
    /// use serde_json::json;
    ///
    /// let update = UpdateExpression::from_json(&json!({
    ///     "$pushAll": { "houses": ["h1", "h2"] },
    ///     "$set": { "name": "Ann" }
    /// })).unwrap();
    /// assert_eq!(update.get("houses"), Some(&UpdateOp::PushAll(vec![json!("h1"), json!("h2")])));
    /// ```
    pub fn from_json(value: &Value) -> Result<Self, ParseError> {
        let operators = value
            .as_object()
            .ok_or_else(|| ParseError::Malformed("update must be an object".into()))?;

        let mut expression = Self::new();
        for (operator, body) in operators {
            let body = body.as_object().ok_or_else(|| {
                ParseError::Malformed(format!("operand of {operator} must be an object"))
            })?;
            for (field, operand) in body {
                let op = match operator.as_str() {
                    "$set" => UpdateOp::Set(operand.clone()),
                    "$unset" => UpdateOp::Unset,
                    "$push" => UpdateOp::Push(operand.clone()),
                    "$pull" => UpdateOp::Pull(operand.clone()),
                    "$pushAll" => UpdateOp::PushAll(array_operand(operator, field, operand)?),
                    "$pullAll" => UpdateOp::PullAll(array_operand(operator, field, operand)?),
                    _ => {
                        return Err(ParseError::UnsupportedOperator {
                            operator: operator.clone(),
                            field: field.clone(),
                        })
                    }
                };
                expression.add(field.clone(), op);
            }
        }
        Ok(expression)
    }
}

impl<'a> IntoIterator for &'a UpdateExpression {
    type Item = &'a FieldUpdate;
    type IntoIter = std::slice::Iter<'a, FieldUpdate>;

    fn into_iter(self) -> Self::IntoIter {
        self.updates.iter()
    }
}

fn array_operand(operator: &str, field: &str, operand: &Value) -> Result<Vec<Value>, ParseError> {
    operand.as_array().cloned().ok_or_else(|| {
        ParseError::Malformed(format!("{operator} on {field} expects an array"))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
