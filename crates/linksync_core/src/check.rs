//! Consistency checking and repair.
//!
//! A link is one-sided when a document references a managed target through a
//! field with an inverse, but the target does not exist or does not reference
//! the document back. Partial propagation failures and displaced single-valued
//! inverses leave such links behind; [`check_consistency`] finds them and
//! [`repair`] completes or removes them.

use crate::diff::reference_ids;
use crate::error::{LinkError, LinkResult};
use crate::schema::{Cardinality, ReferenceDef, Schema};
use linksync_store::{
    Document, DocumentStore, Filter, Key, Projection, UpdateExpression, UpdateOp,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info, warn};

/// Which side of a link is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSide {
    /// The referenced document does not exist.
    TargetMissing,
    /// The referenced document exists but does not point back.
    InverseMissing,
}

/// A reference whose back-reference is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneSidedLink {
    /// Type of the referencing document.
    pub source_type: String,
    /// Key of the referencing document.
    pub source_id: Key,
    /// Reference field on the source.
    pub field: String,
    /// Type of the referenced document.
    pub target_type: String,
    /// Key of the referenced document.
    pub target_id: Key,
    /// What is absent.
    pub missing: MissingSide,
}

impl fmt::Display for OneSidedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.missing {
            MissingSide::TargetMissing => "target missing",
            MissingSide::InverseMissing => "inverse missing",
        };
        write!(
            f,
            "{}/{}.{} -> {}/{}: {what}",
            self.source_type, self.source_id, self.field, self.target_type, self.target_id
        )
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Documents scanned.
    pub documents_checked: usize,
    /// References followed.
    pub links_checked: usize,
    /// References without a matching back-reference.
    pub one_sided: Vec<OneSidedLink>,
}

impl ConsistencyReport {
    /// Returns true if every reference has its inverse.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.one_sided.is_empty()
    }
}

type Collections = HashMap<String, BTreeMap<Key, Document>>;

/// Scans every collection named by the schema and reports one-sided links.
///
/// External references and fields without an inverse are not checked. A
/// self-inverse reference from a document to itself is always consistent.
pub async fn check_consistency<S>(schema: &Schema, store: &S) -> LinkResult<ConsistencyReport>
where
    S: DocumentStore + ?Sized,
{
    let mut collections: Collections = HashMap::new();
    for entity in schema.entities() {
        let documents = store
            .query(entity.name(), &Filter::all(), &Projection::all())
            .await?;
        collections.insert(
            entity.name().to_string(),
            documents
                .into_iter()
                .map(|document| (document.key().clone(), document))
                .collect(),
        );
    }

    let mut report = ConsistencyReport::default();
    for entity in schema.entities() {
        let Some(documents) = collections.get(entity.name()) else {
            continue;
        };
        for document in documents.values() {
            report.documents_checked += 1;
            for field in entity.references().iter().filter(|field| field.propagates()) {
                let targets = reference_ids(entity.name(), field, document.get(&field.name))?;
                for target_id in targets {
                    report.links_checked += 1;
                    if field.is_self_inverse(entity.name()) && &target_id == document.key() {
                        continue;
                    }
                    if let Some(missing) =
                        missing_side(&collections, document.key(), field, &target_id)
                    {
                        let link = OneSidedLink {
                            source_type: entity.name().to_string(),
                            source_id: document.key().clone(),
                            field: field.name.clone(),
                            target_type: field.target.clone(),
                            target_id,
                            missing,
                        };
                        debug!(%link, "one-sided link");
                        report.one_sided.push(link);
                    }
                }
            }
        }
    }

    info!(
        documents = report.documents_checked,
        links = report.links_checked,
        one_sided = report.one_sided.len(),
        "consistency check finished"
    );
    Ok(report)
}

fn missing_side(
    collections: &Collections,
    source_id: &Key,
    field: &ReferenceDef,
    target_id: &Key,
) -> Option<MissingSide> {
    let inverse = field.inverse.as_ref()?;
    let Some(target) = collections
        .get(&field.target)
        .and_then(|documents| documents.get(target_id))
    else {
        return Some(MissingSide::TargetMissing);
    };

    let back = match target.get(&inverse.field) {
        None | Some(Value::Null) => Vec::new(),
        Some(value) => match (inverse.cardinality, value) {
            (Cardinality::One, value) => Key::from_value(value).into_iter().collect(),
            (Cardinality::Many, Value::Array(items)) => {
                items.iter().filter_map(Key::from_value).collect()
            }
            (Cardinality::Many, _) => {
                warn!(
                    target_type = %field.target,
                    %target_id,
                    field = %inverse.field,
                    "malformed inverse field"
                );
                Vec::new()
            }
        },
    };
    (!back.contains(source_id)).then_some(MissingSide::InverseMissing)
}

/// Repairs the links in `report`, returning the number of writes applied.
///
/// A missing target removes the dangling reference from the source. A missing
/// inverse is added to the target, except when a single-valued inverse
/// already points at another document; those are left for the caller to
/// resolve and logged.
pub async fn repair<S>(schema: &Schema, store: &S, report: &ConsistencyReport) -> LinkResult<usize>
where
    S: DocumentStore + ?Sized,
{
    let mut repaired = 0;
    for link in &report.one_sided {
        let field = schema
            .entity(&link.source_type)?
            .reference(&link.field)
            .ok_or_else(|| {
                LinkError::invalid_input(format!(
                    "{}.{} is not a reference field",
                    link.source_type, link.field
                ))
            })?;

        let (collection, key, update) = match link.missing {
            MissingSide::TargetMissing => {
                let target = link.target_id.to_value();
                let update = match field.cardinality {
                    Cardinality::One => {
                        UpdateExpression::new().with(link.field.clone(), UpdateOp::UnsetIf(target))
                    }
                    Cardinality::Many => UpdateExpression::new().pull(link.field.clone(), target),
                };
                (&link.source_type, &link.source_id, update)
            }
            MissingSide::InverseMissing => {
                let Some(inverse) = &field.inverse else {
                    continue;
                };
                let source = link.source_id.to_value();
                let update = match inverse.cardinality {
                    Cardinality::One => {
                        let current = store
                            .read_one(&link.target_type, &link.target_id)
                            .await?
                            .and_then(|target| target.get(&inverse.field).cloned());
                        if current.as_ref().is_some_and(|value| !value.is_null()) {
                            warn!(%link, "single-valued inverse holds another key, not repaired");
                            continue;
                        }
                        UpdateExpression::new().set(inverse.field.clone(), source)
                    }
                    Cardinality::Many => UpdateExpression::new().push(inverse.field.clone(), source),
                };
                (&link.target_type, &link.target_id, update)
            }
        };

        if store.write_one(collection, key, &update).await?.is_some() {
            debug!(%link, "repaired");
            repaired += 1;
        }
    }
    info!(repaired, "repair finished");
    Ok(repaired)
}
