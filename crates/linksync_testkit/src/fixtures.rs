//! Fixture schema, fixture data, and the [`TestLinks`] harness.
//!
//! People are keyed by email and cars by license number; pets and houses get
//! generated keys. Fixture documents carry no managed references, so they can
//! be loaded in any order.

use linksync_core::{
    Config, EntityType, LinkEngine, ReferenceField, Schema, SchemaBuilder,
};
use linksync_store::{DocumentStore, Key, MemoryStore};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Emails of the fixture people, in load order.
pub const PERSON_EMAILS: [&str; 2] = ["dilbert@mailbert.com", "wally@mailbert.com"];

/// License numbers of the fixture cars, in load order.
pub const CAR_LICENSES: [&str; 2] = ["ABC123", "XYZ987"];

/// Builds the fixture schema.
///
/// - `person.soulmate` and `person.lovers` are their own inverses
/// - `person.houses` and `house.owners` are inverses of each other
/// - `person.pets`, `person.cars`, `pet.owner`, `car.owner` have no inverse
/// - `person.externalResources` and `car.MOT` are external
pub fn fixture_schema() -> Schema {
    SchemaBuilder::from_types([
        EntityType::new("person")
            .key_field("email")
            .attributes(["name", "appearances"])
            .reference(ReferenceField::many("pets", "pet"))
            .reference(ReferenceField::one("soulmate", "person").inverse("soulmate"))
            .reference(ReferenceField::many("lovers", "person").inverse("lovers"))
            .reference(
                ReferenceField::many("externalResources", "externalResourceReference").external(),
            )
            .reference(ReferenceField::many("cars", "car"))
            .reference(ReferenceField::many("houses", "house").inverse("owners")),
        EntityType::new("pet")
            .attributes(["name", "appearances"])
            .reference(ReferenceField::one("owner", "person")),
        EntityType::new("car")
            .key_field("licenseNumber")
            .attributes(["model", "additionalDetails"])
            .reference(ReferenceField::one("owner", "person"))
            .reference(ReferenceField::one("MOT", "service").external()),
        EntityType::new("house")
            .attribute("address")
            .reference(ReferenceField::many("owners", "person").inverse("houses")),
    ])
    .and_then(SchemaBuilder::build)
    .expect("fixture schema is valid")
}

/// Fixture documents per entity type, in load order.
pub fn fixture_documents() -> Vec<(&'static str, Vec<Value>)> {
    vec![
        (
            "person",
            vec![
                json!({ "name": "Dilbert", "appearances": 3457, "email": PERSON_EMAILS[0] }),
                json!({ "name": "Wally", "appearances": 1234, "email": PERSON_EMAILS[1] }),
            ],
        ),
        (
            "pet",
            vec![
                json!({ "name": "Dogbert", "appearances": 1324 }),
                json!({ "name": "Catbert", "appearances": 706 }),
            ],
        ),
        (
            "car",
            vec![
                json!({
                    "licenseNumber": CAR_LICENSES[0],
                    "model": "Ford Mustang",
                    "MOT": "mot-service-1",
                    "additionalDetails": { "seats": 2 }
                }),
                json!({
                    "licenseNumber": CAR_LICENSES[1],
                    "model": "Toyota Prius",
                    "additionalDetails": { "seats": 5 }
                }),
            ],
        ),
        (
            "house",
            vec![
                json!({ "address": "1 Cubicle Lane" }),
                json!({ "address": "2 Cubicle Lane" }),
                json!({ "address": "3 Cubicle Lane" }),
                json!({ "address": "4 Cubicle Lane" }),
            ],
        ),
    ]
}

/// Keys of the loaded fixture documents, in load order.
#[derive(Debug, Clone, Default)]
pub struct FixtureIds {
    /// Person keys.
    pub person: Vec<Key>,
    /// Pet keys.
    pub pet: Vec<Key>,
    /// Car keys.
    pub car: Vec<Key>,
    /// House keys.
    pub house: Vec<Key>,
}

impl FixtureIds {
    fn push(&mut self, entity: &str, key: Key) {
        match entity {
            "person" => self.person.push(key),
            "pet" => self.pet.push(key),
            "car" => self.car.push(key),
            "house" => self.house.push(key),
            other => panic!("unknown fixture type {other}"),
        }
    }
}

/// A store, an engine over it, and the loaded fixture keys.
pub struct TestLinks<S: DocumentStore + ?Sized = MemoryStore> {
    /// The engine under test.
    pub engine: LinkEngine<S>,
    /// The store the engine writes to.
    pub store: Arc<S>,
    /// Keys of the fixture documents.
    pub ids: FixtureIds,
}

impl TestLinks<MemoryStore> {
    /// Creates a harness over a fresh [`MemoryStore`] with fixtures loaded.
    pub async fn memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new())).await
    }
}

impl<S: DocumentStore + ?Sized> TestLinks<S> {
    /// Creates a harness over `store` with the default configuration.
    pub async fn with_store(store: Arc<S>) -> Self {
        Self::with_config(store, Config::default()).await
    }

    /// Creates a harness over `store` with an explicit configuration.
    pub async fn with_config(store: Arc<S>, config: Config) -> Self {
        let engine = LinkEngine::with_config(Arc::new(fixture_schema()), Arc::clone(&store), config);
        let mut ids = FixtureIds::default();
        for (entity, documents) in fixture_documents() {
            for document in documents {
                let created = engine
                    .create(entity, into_map(document))
                    .await
                    .expect("failed to load fixture");
                ids.push(entity, created.id);
            }
        }
        Self { engine, store, ids }
    }

    /// Returns a fixture person.
    pub fn person(&self, index: usize) -> &Key {
        &self.ids.person[index]
    }

    /// Returns a fixture house.
    pub fn house(&self, index: usize) -> &Key {
        &self.ids.house[index]
    }
}

/// Converts a JSON object literal into an attribute map.
///
/// # Panics
///
/// Panics if `value` is not an object.
pub fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Converts fixture keys to JSON operands for update expressions.
pub fn key_values<'a>(keys: impl IntoIterator<Item = &'a Key>) -> Vec<Value> {
    keys.into_iter().map(Key::to_value).collect()
}
