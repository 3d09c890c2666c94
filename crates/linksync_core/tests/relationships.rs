//! Integration tests for inverse synchronization over the fixture schema.

use linksync_core::{
    check_consistency, Filter, Key, LinkError, MissingSide, Projection, UpdateExpression,
};
use linksync_testkit::prelude::*;
use serde_json::json;

#[tokio::test]
async fn push_all_syncs_many_to_many() {
    let links = TestLinks::memory().await;
    let person = links.person(0).clone();
    let house = links.house(0).clone();

    let update = UpdateExpression::new().push_all("houses", key_values([&house]));
    let updated = links.engine.update("person", &person, &update).await.unwrap();
    assert_eq!(updated.linked_ids("houses"), [house.clone()]);

    let found = links
        .engine
        .find("house", &house, &Projection::all())
        .await
        .unwrap();
    assert_eq!(found.linked_ids("owners"), [person]);
}

#[tokio::test]
async fn sync_holds_when_many_documents_reference_each_other() {
    let links = TestLinks::memory().await;
    let owner = links.person(0).clone();
    let neighbour = links.person(1).clone();

    let update = UpdateExpression::new().push_all("houses", key_values(&links.ids.house));
    let updated = links.engine.update("person", &owner, &update).await.unwrap();
    assert_eq!(updated.linked_ids("houses").len(), 4);

    let owned_by = |person: &Key| Filter::all().eq("owners", person.to_value());
    let owned = links
        .engine
        .find_many("house", &owned_by(&owner), &Projection::all())
        .await
        .unwrap();
    assert_eq!(owned.len(), 4);

    links
        .engine
        .update(
            "person",
            &neighbour,
            &UpdateExpression::new().push("houses", links.house(0).to_value()),
        )
        .await
        .unwrap();

    let pulled = links
        .engine
        .update(
            "person",
            &owner,
            &UpdateExpression::new().pull("houses", links.house(0).to_value()),
        )
        .await
        .unwrap();
    assert_eq!(pulled.linked_ids("houses").len(), 3);

    let owned = links
        .engine
        .find_many("house", &owned_by(&owner), &Projection::all())
        .await
        .unwrap();
    assert_eq!(owned.len(), 3);
    assert!(owned.iter().all(|house| &house.id != links.house(0)));

    let first = links
        .engine
        .find("house", links.house(0), &Projection::all())
        .await
        .unwrap();
    assert_eq!(first.linked_ids("owners"), [neighbour]);
}

#[tokio::test]
async fn json_updates_follow_the_same_path() {
    let links = TestLinks::memory().await;
    let person = links.person(1).clone();

    links
        .engine
        .update_json(
            "person",
            &person,
            &json!({ "$pushAll": { "houses": key_values(&links.ids.house[..2]) } }),
        )
        .await
        .unwrap();
    let updated = links
        .engine
        .update_json(
            "person",
            &person,
            &json!({ "$pullAll": { "houses": [links.house(1).as_str()] }, "$set": { "name": "W." } }),
        )
        .await
        .unwrap();

    assert_eq!(updated.linked_ids("houses"), [links.house(0).clone()]);
    assert_eq!(updated.attribute("name"), Some(&json!("W.")));
    let second = links
        .engine
        .find("house", links.house(1), &Projection::all())
        .await
        .unwrap();
    assert!(second.linked_ids("owners").is_empty());
}

#[tokio::test]
async fn set_replaces_the_whole_reference_array() {
    let links = TestLinks::memory().await;
    let person = links.person(0).clone();
    let houses = &links.ids.house;

    links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().set("houses", json!(key_values(&houses[..2]))),
        )
        .await
        .unwrap();
    links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().set("houses", json!(key_values(&houses[1..3]))),
        )
        .await
        .unwrap();

    for (index, expected) in [(0, false), (1, true), (2, true), (3, false)] {
        let house = links
            .engine
            .find("house", &houses[index], &Projection::all())
            .await
            .unwrap();
        assert_eq!(house.linked_ids("owners").contains(&person), expected, "house {index}");
    }
}

#[tokio::test]
async fn self_inverse_many_links_both_people_once() {
    let links = TestLinks::memory().await;
    let dilbert = links.person(0).clone();
    let wally = links.person(1).clone();

    links
        .engine
        .update(
            "person",
            &dilbert,
            &UpdateExpression::new().push_all("lovers", vec![wally.to_value(), dilbert.to_value()]),
        )
        .await
        .unwrap();

    let dilbert_doc = links
        .engine
        .find("person", &dilbert, &Projection::all())
        .await
        .unwrap();
    let wally_doc = links
        .engine
        .find("person", &wally, &Projection::all())
        .await
        .unwrap();
    assert_eq!(dilbert_doc.linked_ids("lovers"), [wally.clone(), dilbert.clone()]);
    assert_eq!(wally_doc.linked_ids("lovers"), [dilbert.clone()]);

    links
        .engine
        .update(
            "person",
            &wally,
            &UpdateExpression::new().pull("lovers", dilbert.to_value()),
        )
        .await
        .unwrap();
    let dilbert_doc = links
        .engine
        .find("person", &dilbert, &Projection::all())
        .await
        .unwrap();
    assert_eq!(dilbert_doc.linked_ids("lovers"), [dilbert]);
}

#[tokio::test]
async fn one_to_one_unset_only_clears_a_matching_inverse() {
    let links = TestLinks::memory().await;
    let dilbert = links.person(0).clone();
    let wally = links.person(1).clone();
    let alice = links
        .engine
        .create("person", into_map(json!({ "email": "alice@mailbert.com", "name": "Alice" })))
        .await
        .unwrap()
        .id;

    let soulmate = |key: &Key| UpdateExpression::new().set("soulmate", key.to_value());
    links.engine.update("person", &dilbert, &soulmate(&wally)).await.unwrap();
    let wally_doc = links.engine.find("person", &wally, &Projection::all()).await.unwrap();
    assert_eq!(wally_doc.linked_ids("soulmate"), [dilbert.clone()]);

    // Alice displaces Dilbert on Wally's side only.
    links.engine.update("person", &alice, &soulmate(&wally)).await.unwrap();
    let report = check_consistency(links.engine.schema(), links.store.as_ref())
        .await
        .unwrap();
    assert_eq!(report.one_sided.len(), 1);
    assert_eq!(report.one_sided[0].source_id, dilbert);
    assert_eq!(report.one_sided[0].missing, MissingSide::InverseMissing);

    links
        .engine
        .update("person", &dilbert, &UpdateExpression::new().unset("soulmate"))
        .await
        .unwrap();
    let wally_doc = links.engine.find("person", &wally, &Projection::all()).await.unwrap();
    assert_eq!(wally_doc.linked_ids("soulmate"), [alice]);
}

#[tokio::test]
async fn external_and_one_way_references_write_nothing_back() {
    let links = TestLinks::memory().await;
    let person = links.person(0).clone();
    let before = links.engine.stats().inverse_writes_applied;

    links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().push("externalResources", json!("resource-1")),
        )
        .await
        .unwrap();
    links
        .engine
        .update(
            "car",
            &links.ids.car[0],
            &UpdateExpression::new()
                .set("owner", person.to_value())
                .set("MOT", json!("mot-service-2")),
        )
        .await
        .unwrap();

    assert_eq!(links.engine.stats().inverse_writes_applied, before);
    let doc = links.engine.find("person", &person, &Projection::all()).await.unwrap();
    assert_eq!(doc.linked_ids("externalResources"), [Key::new("resource-1")]);
    assert!(doc.linked_ids("cars").is_empty());
}

#[tokio::test]
async fn create_links_new_documents_both_ways() {
    let links = TestLinks::memory().await;
    let house = links
        .engine
        .create(
            "house",
            into_map(json!({ "address": "5 Cubicle Lane", "owners": key_values(&links.ids.person) })),
        )
        .await
        .unwrap();
    assert!(house.id.is_uuid());

    for person in &links.ids.person {
        let doc = links.engine.find("person", person, &Projection::all()).await.unwrap();
        assert_eq!(doc.linked_ids("houses"), [house.id.clone()]);
    }

    let person = links
        .engine
        .create(
            "person",
            into_map(json!({ "email": "ted@mailbert.com", "houses": [house.id.as_str()] })),
        )
        .await
        .unwrap();
    let house = links.engine.find("house", &house.id, &Projection::all()).await.unwrap();
    assert_eq!(house.linked_ids("owners").len(), 3);
    assert!(house.linked_ids("owners").contains(&person.id));
}

#[tokio::test]
async fn delete_unlinks_every_related_document() {
    let links = TestLinks::memory().await;
    let dilbert = links.person(0).clone();
    let wally = links.person(1).clone();

    links
        .engine
        .update(
            "person",
            &dilbert,
            &UpdateExpression::new()
                .push_all("houses", key_values(&links.ids.house[..2]))
                .set("soulmate", wally.to_value())
                .push("lovers", wally.to_value()),
        )
        .await
        .unwrap();

    let deleted = links.engine.delete("person", &dilbert).await.unwrap();
    assert_eq!(deleted.linked_ids("houses").len(), 2);

    let err = links
        .engine
        .find("person", &dilbert, &Projection::all())
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::NotFound { .. }));

    for house in &links.ids.house[..2] {
        let doc = links.engine.find("house", house, &Projection::all()).await.unwrap();
        assert!(doc.linked_ids("owners").is_empty());
    }
    let wally_doc = links.engine.find("person", &wally, &Projection::all()).await.unwrap();
    assert!(wally_doc.linked_ids("soulmate").is_empty());
    assert!(wally_doc.linked_ids("lovers").is_empty());
    assert!(check_consistency(links.engine.schema(), links.store.as_ref())
        .await
        .unwrap()
        .is_consistent());
}

#[tokio::test]
async fn invalid_requests_write_nothing() {
    let links = TestLinks::memory().await;
    let person = links.person(0).clone();

    let err = links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().push("soulmate", links.person(1).to_value()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::UnsupportedOperation { .. }));

    let err = links
        .engine
        .update(
            "person",
            &person,
            &UpdateExpression::new().push("houses", json!("not-a-uuid")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::InvalidInput { .. }));

    let err = links
        .engine
        .update("spaceship", &person, &UpdateExpression::new().set("name", json!("x")))
        .await
        .unwrap_err();
    assert!(matches!(err, LinkError::UnknownType { .. }));

    let doc = links.engine.find("person", &person, &Projection::all()).await.unwrap();
    assert!(doc.linked_ids("soulmate").is_empty());
    assert!(doc.linked_ids("houses").is_empty());
}
