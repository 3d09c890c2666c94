//! Inverse propagator.
//!
//! Turns link diffs into back-reference writes on related documents and
//! issues them against the store. Writes to distinct target documents carry
//! no ordering guarantee and run concurrently up to
//! [`Config::max_concurrent_writes`]. Each write is a single atomic update of
//! one target document; nothing is atomic across documents.

use crate::config::Config;
use crate::diff::LinkDiff;
use crate::error::{LinkError, LinkResult, PropagationError, PropagationFailure};
use crate::schema::{Cardinality, Schema};
use futures::stream::{self, StreamExt};
use linksync_store::{DocumentStore, Key, UpdateExpression, UpdateOp};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One back-reference update against one target document.
#[derive(Debug, Clone, PartialEq)]
pub struct InverseWrite {
    /// Entity type (collection) of the target.
    pub target_type: String,
    /// Key of the target document.
    pub target_id: Key,
    /// Update applied atomically to the target.
    pub update: UpdateExpression,
}

impl InverseWrite {
    /// Returns true if the write only removes back-references.
    ///
    /// A missing target already satisfies such a write.
    #[must_use]
    pub fn is_unlink(&self) -> bool {
        self.update.iter().all(|change| {
            matches!(
                change.op,
                UpdateOp::Pull(_) | UpdateOp::PullAll(_) | UpdateOp::UnsetIf(_) | UpdateOp::Unset
            )
        })
    }
}

/// Outcome of a propagation in which every write succeeded or was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    /// Writes applied to existing target documents.
    pub applied: Vec<InverseWrite>,
    /// Writes skipped because the target document does not exist.
    pub skipped: Vec<InverseWrite>,
}

/// Plans the inverse writes for a set of diffs on one source document.
///
/// Fields without an inverse and external fields produce no writes. All
/// changes landing on the same target document are merged into one update.
/// For a self-inverse field the source document is never its own target: the
/// primary write already holds that change.
pub fn plan(
    schema: &Schema,
    source_type: &str,
    source_id: &Key,
    diffs: &[LinkDiff],
) -> LinkResult<Vec<InverseWrite>> {
    let entity = schema.entity(source_type)?;
    let source = source_id.to_value();
    let mut grouped: BTreeMap<(String, Key), UpdateExpression> = BTreeMap::new();

    for diff in diffs.iter().filter(|diff| !diff.is_empty()) {
        let field = entity.reference(&diff.field).ok_or_else(|| {
            LinkError::invalid_input(format!(
                "{source_type}.{} is not a reference field",
                diff.field
            ))
        })?;
        if field.external {
            debug!(field = %diff.field, "skipping external reference");
            continue;
        }
        let Some(inverse) = &field.inverse else {
            continue;
        };
        let self_inverse = field.is_self_inverse(source_type);

        let link_op = match inverse.cardinality {
            Cardinality::One => UpdateOp::Set(source.clone()),
            Cardinality::Many => UpdateOp::Push(source.clone()),
        };
        let unlink_op = match inverse.cardinality {
            Cardinality::One => UpdateOp::UnsetIf(source.clone()),
            Cardinality::Many => UpdateOp::Pull(source.clone()),
        };

        let changes = diff
            .added
            .iter()
            .map(|key| (key, &link_op))
            .chain(diff.removed.iter().map(|key| (key, &unlink_op)));
        for (target_id, op) in changes {
            if self_inverse && target_id == source_id {
                continue;
            }
            grouped
                .entry((field.target.clone(), target_id.clone()))
                .or_default()
                .add(inverse.field.clone(), op.clone());
        }
    }

    Ok(grouped
        .into_iter()
        .map(|((target_type, target_id), update)| InverseWrite {
            target_type,
            target_id,
            update,
        })
        .collect())
}

/// Issues planned inverse writes against a store.
pub struct Propagator<'a, S: ?Sized> {
    store: &'a S,
    config: &'a Config,
}

impl<'a, S: DocumentStore + ?Sized> Propagator<'a, S> {
    /// Creates a propagator over `store`.
    pub fn new(store: &'a S, config: &'a Config) -> Self {
        Self { store, config }
    }

    /// Applies every write, then reports.
    ///
    /// Failed writes are not retried and do not stop the remaining ones; all
    /// failures are collected into one [`PropagationError`] together with the
    /// writes that did land.
    pub async fn propagate(
        &self,
        source_type: &str,
        source_id: &Key,
        writes: Vec<InverseWrite>,
    ) -> Result<PropagationReport, PropagationError> {
        let store = self.store;
        let outcomes: Vec<_> = stream::iter(writes)
            .map(|write| async move {
                let result = store
                    .write_one(&write.target_type, &write.target_id, &write.update)
                    .await;
                (write, result)
            })
            .buffer_unordered(self.config.max_concurrent_writes.max(1))
            .collect()
            .await;

        let mut report = PropagationReport::default();
        let mut failures = Vec::new();
        for (write, result) in outcomes {
            match result {
                Ok(Some(_)) => {
                    debug!(
                        target_type = %write.target_type,
                        target_id = %write.target_id,
                        "inverse write applied"
                    );
                    report.applied.push(write);
                }
                Ok(None) if write.is_unlink() => {
                    debug!(
                        target_type = %write.target_type,
                        target_id = %write.target_id,
                        "inverse target missing, nothing to unlink"
                    );
                    report.skipped.push(write);
                }
                Ok(None) if !self.config.verify_targets => {
                    warn!(
                        target_type = %write.target_type,
                        target_id = %write.target_id,
                        "inverse target missing, skipped"
                    );
                    report.skipped.push(write);
                }
                Ok(None) => {
                    warn!(
                        target_type = %write.target_type,
                        target_id = %write.target_id,
                        "inverse target missing"
                    );
                    let cause =
                        LinkError::not_found(&write.target_type, write.target_id.clone());
                    failures.push(PropagationFailure { write, cause });
                }
                Err(err) => {
                    warn!(
                        target_type = %write.target_type,
                        target_id = %write.target_id,
                        error = %err,
                        "inverse write failed"
                    );
                    failures.push(PropagationFailure {
                        write,
                        cause: LinkError::Store(err),
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(PropagationError {
                source_type: source_type.to_string(),
                source_id: source_id.clone(),
                applied: report.applied,
                failures,
            })
        }
    }
}
