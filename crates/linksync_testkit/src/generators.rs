//! Property-based test generators using proptest.
//!
//! Provides strategies for sequences of link mutations over the fixture
//! data.

use crate::fixtures::FixtureIds;
use linksync_store::{Key, UpdateExpression};
use proptest::prelude::*;
use serde_json::Value;

/// A multi-valued reference field of the fixture schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManyField {
    /// `person.houses`, inverse `house.owners`.
    Houses,
    /// `person.lovers`, its own inverse.
    Lovers,
}

impl ManyField {
    /// Returns the field name on `person`.
    pub fn name(self) -> &'static str {
        match self {
            ManyField::Houses => "houses",
            ManyField::Lovers => "lovers",
        }
    }
}

/// One mutation of a fixture person's multi-valued references.
///
/// Indices address [`FixtureIds`] and wrap around.
#[derive(Debug, Clone)]
pub enum LinkMutation {
    /// `$push` one key.
    Push {
        /// Person index.
        person: usize,
        /// Field mutated.
        field: ManyField,
        /// Target index.
        target: usize,
    },
    /// `$pull` one key.
    Pull {
        /// Person index.
        person: usize,
        /// Field mutated.
        field: ManyField,
        /// Target index.
        target: usize,
    },
    /// `$set` the whole array.
    Set {
        /// Person index.
        person: usize,
        /// Field mutated.
        field: ManyField,
        /// Target indices.
        targets: Vec<usize>,
    },
    /// `$unset` the field.
    Unset {
        /// Person index.
        person: usize,
        /// Field mutated.
        field: ManyField,
    },
}

impl LinkMutation {
    /// Resolves the mutation against fixture keys.
    ///
    /// Returns the person key and the update to apply to it.
    pub fn resolve(&self, ids: &FixtureIds) -> (Key, UpdateExpression) {
        let person = |index: usize| ids.person[index % ids.person.len()].clone();
        let target = |field: ManyField, index: usize| -> Value {
            let pool = match field {
                ManyField::Houses => &ids.house,
                ManyField::Lovers => &ids.person,
            };
            pool[index % pool.len()].to_value()
        };

        match self {
            LinkMutation::Push {
                person: p,
                field,
                target: t,
            } => (
                person(*p),
                UpdateExpression::new().push(field.name(), target(*field, *t)),
            ),
            LinkMutation::Pull {
                person: p,
                field,
                target: t,
            } => (
                person(*p),
                UpdateExpression::new().pull(field.name(), target(*field, *t)),
            ),
            LinkMutation::Set {
                person: p,
                field,
                targets,
            } => (
                person(*p),
                UpdateExpression::new().set(
                    field.name(),
                    Value::Array(targets.iter().map(|t| target(*field, *t)).collect()),
                ),
            ),
            LinkMutation::Unset { person: p, field } => {
                (person(*p), UpdateExpression::new().unset(field.name()))
            }
        }
    }
}

fn many_field_strategy() -> impl Strategy<Value = ManyField> {
    prop_oneof![Just(ManyField::Houses), Just(ManyField::Lovers)]
}

/// Strategy for a single [`LinkMutation`].
pub fn link_mutation_strategy() -> impl Strategy<Value = LinkMutation> {
    prop_oneof![
        3 => (0..8usize, many_field_strategy(), 0..8usize)
            .prop_map(|(person, field, target)| LinkMutation::Push { person, field, target }),
        2 => (0..8usize, many_field_strategy(), 0..8usize)
            .prop_map(|(person, field, target)| LinkMutation::Pull { person, field, target }),
        2 => (0..8usize, many_field_strategy(), prop::collection::vec(0..8usize, 0..5))
            .prop_map(|(person, field, targets)| LinkMutation::Set { person, field, targets }),
        1 => (0..8usize, many_field_strategy())
            .prop_map(|(person, field)| LinkMutation::Unset { person, field }),
    ]
}

/// Strategy for a sequence of [`LinkMutation`]s.
pub fn link_mutations_strategy(max_len: usize) -> impl Strategy<Value = Vec<LinkMutation>> {
    prop::collection::vec(link_mutation_strategy(), 1..max_len.max(2))
}
