//! Integration tests for partial failures, retries, repair, and concurrency.

use linksync_core::{
    check_consistency, repair, Config, LinkError, MemoryStore, MissingSide, Projection,
    Propagator, StoreError, UpdateExpression,
};
use linksync_testkit::prelude::*;
use serde_json::json;
use std::sync::Arc;

async fn faulty_links() -> (Arc<FaultyStore<MemoryStore>>, TestLinks<FaultyStore<MemoryStore>>) {
    let store = Arc::new(FaultyStore::new(MemoryStore::new()));
    let links = TestLinks::with_store(Arc::clone(&store)).await;
    (store, links)
}

#[tokio::test]
async fn partial_propagation_reports_applied_and_failed_writes() {
    let (store, links) = faulty_links().await;
    let person = links.person(0).clone();
    store.fail_writes_to("house", links.house(1));

    let update = UpdateExpression::new().push_all("houses", key_values(&links.ids.house[..3]));
    let err = links.engine.update("person", &person, &update).await.unwrap_err();

    let propagation = err.as_propagation().expect("propagation error");
    assert_eq!(propagation.source_id, person);
    assert_eq!(propagation.applied.len(), 2);
    assert_eq!(propagation.failures.len(), 1);
    assert_eq!(propagation.failures[0].target_id(), links.house(1));
    assert_eq!(store.injected_failures(), 1);
    assert!(matches!(
        &propagation.failures[0].cause,
        LinkError::Store(cause) if cause.is_retryable()
    ));

    // The primary write stays committed.
    let doc = links.engine.find("person", &person, &Projection::all()).await.unwrap();
    assert_eq!(doc.linked_ids("houses").len(), 3);

    let report = check_consistency(links.engine.schema(), store.as_ref()).await.unwrap();
    assert_eq!(report.one_sided.len(), 1);
    assert_eq!(report.one_sided[0].target_id, *links.house(1));

    store.heal();
    let config = Config::default();
    Propagator::new(store.as_ref(), &config)
        .propagate("person", &person, propagation.pending_writes())
        .await
        .unwrap();
    assert!(check_consistency(links.engine.schema(), store.as_ref())
        .await
        .unwrap()
        .is_consistent());

    let stats = links.engine.stats();
    assert_eq!(stats.inverse_writes_failed, 1);
    assert_eq!(stats.mutations_failed, 1);
}

#[tokio::test]
async fn failed_primary_write_skips_propagation() {
    let (store, links) = faulty_links().await;
    let person = links.person(0).clone();
    store.fail_writes_to("person", &person);

    let update = UpdateExpression::new().push("houses", links.house(0).to_value());
    let err = links.engine.update("person", &person, &update).await.unwrap_err();
    assert!(matches!(err, LinkError::Store(StoreError::Unavailable(_))));

    let house = links.engine.find("house", links.house(0), &Projection::all()).await.unwrap();
    assert!(house.linked_ids("owners").is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_the_document_and_can_be_retried() {
    let (store, links) = faulty_links().await;
    let person = links.person(0).clone();
    links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().push_all("houses", key_values(&links.ids.house[..2])),
        )
        .await
        .unwrap();

    store.fail_writes_to("house", links.house(0));
    let err = links.engine.delete("person", &person).await.unwrap_err();
    assert!(err.as_propagation().is_some());
    assert!(links.engine.find("person", &person, &Projection::all()).await.is_ok());

    store.heal();
    links.engine.delete("person", &person).await.unwrap();
    for house in &links.ids.house[..2] {
        let doc = links.engine.find("house", house, &Projection::all()).await.unwrap();
        assert!(doc.linked_ids("owners").is_empty());
    }
}

#[tokio::test]
async fn missing_targets_fail_or_skip_by_configuration() {
    let links = TestLinks::memory().await;
    let ghost = linksync_core::Key::generate();
    let attrs = || into_map(json!({ "email": "ghost@mailbert.com", "houses": [ghost.as_str()] }));

    let err = links.engine.create("person", attrs()).await.unwrap_err();
    let propagation = err.as_propagation().expect("propagation error");
    assert!(matches!(propagation.failures[0].cause, LinkError::NotFound { .. }));

    let lenient = TestLinks::with_config(
        Arc::new(MemoryStore::new()),
        Config::new().verify_targets(false),
    )
    .await;
    lenient.engine.create("person", attrs()).await.unwrap();
    assert_eq!(lenient.engine.stats().inverse_writes_skipped, 1);
}

#[tokio::test]
async fn dangling_reference_does_not_block_delete() {
    let links = TestLinks::memory().await;
    let ghost = linksync_core::Key::generate();
    let person = linksync_core::Key::new("ghost@mailbert.com");
    let attrs = into_map(json!({ "email": person.as_str(), "houses": [ghost.as_str()] }));

    // The link write fails but the person stays committed with a dangling id.
    links.engine.create("person", attrs).await.unwrap_err();
    let doc = links.engine.find("person", &person, &Projection::all()).await.unwrap();
    assert_eq!(doc.linked_ids("houses"), vec![ghost]);

    links.engine.delete("person", &person).await.unwrap();
    let err = links.engine.find("person", &person, &Projection::all()).await.unwrap_err();
    assert!(matches!(err, LinkError::NotFound { .. }));
    assert_eq!(links.engine.stats().inverse_writes_skipped, 1);
}

#[tokio::test]
async fn concurrent_pushes_to_one_target_both_land() {
    let links = TestLinks::memory().await;
    let house = links.house(0).clone();
    let push = UpdateExpression::new().push("houses", house.to_value());

    let (first, second) = tokio::join!(
        links.engine.update("person", links.person(0), &push),
        links.engine.update("person", links.person(1), &push),
    );
    first.unwrap();
    second.unwrap();

    let doc = links.engine.find("house", &house, &Projection::all()).await.unwrap();
    assert_eq!(doc.linked_ids("owners").len(), 2);
}

#[tokio::test]
async fn racing_sets_are_last_write_wins_and_repairable() {
    let links = TestLinks::memory().await;
    let person = links.person(0).clone();
    let first = UpdateExpression::new().set("houses", json!([links.house(0).as_str()]));
    let second = UpdateExpression::new().set("houses", json!([links.house(1).as_str()]));

    let (a, b) = tokio::join!(
        links.engine.update("person", &person, &first),
        links.engine.update("person", &person, &second),
    );
    a.unwrap();
    b.unwrap();

    let doc = links.engine.find("person", &person, &Projection::all()).await.unwrap();
    assert_eq!(doc.linked_ids("houses").len(), 1);

    let schema = links.engine.schema();
    let report = check_consistency(schema, links.store.as_ref()).await.unwrap();
    assert!(report
        .one_sided
        .iter()
        .all(|link| link.source_type == "house" && link.missing == MissingSide::InverseMissing));

    repair(schema, links.store.as_ref(), &report).await.unwrap();
    assert!(check_consistency(schema, links.store.as_ref())
        .await
        .unwrap()
        .is_consistent());
}
