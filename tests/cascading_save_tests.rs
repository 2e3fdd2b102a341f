use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use rustmemodm::prelude::*;
use rustmemodm::{PersistError, RawDocument, Result, StoreResult};
use serde_json::json;

/// Store that records every save and can be told to reject some ids.
#[derive(Default)]
struct RecordingStore {
    inner: MemoryStore,
    saves: Mutex<Vec<(String, String)>>,
    rejected: Mutex<HashSet<String>>,
}

impl RecordingStore {
    fn reject(&self, id: &str) {
        self.rejected.lock().unwrap().insert(id.to_string());
    }

    fn saves_of(&self, class: &str) -> Vec<String> {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == class)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

impl DocumentStore for RecordingStore {
    fn save(&self, class: &str, document: &RawDocument) -> StoreResult<()> {
        let id = document
            .get("_id")
            .and_then(|id| id.as_str())
            .unwrap_or_default()
            .to_string();
        self.saves.lock()?.push((class.to_string(), id.clone()));
        if self.rejected.lock()?.contains(&id) {
            return Err(PersistError::Rejected {
                class: class.to_string(),
                id,
                reason: "rejected by test".to_string(),
            });
        }
        self.inner.save(class, document)
    }

    fn find_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Option<RawDocument>> {
        self.inner.find_by_foreign_key(class, key, value)
    }

    fn find_many_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Vec<RawDocument>> {
        self.inner.find_many_by_foreign_key(class, key, value)
    }
}

fn setup() -> Result<(Mapper, Arc<RecordingStore>)> {
    let mut registry = Registry::new();
    registry.declare_class(
        ClassSpec::new("Person")
            .field("title", DataType::Text)
            .owned_many("addresses", AssociationOptions::new().inverse_name("addressable"))
            .referenced_many("posts", AssociationOptions::new())
            .referenced_one("game", AssociationOptions::new()),
    )?;
    registry.declare_class(ClassSpec::new("Address").field("street", DataType::Text))?;
    registry.declare_class(ClassSpec::new("Post").field("title", DataType::Text))?;
    registry.declare_class(ClassSpec::new("Game").field("score", DataType::Integer))?;

    let store = Arc::new(RecordingStore::default());
    Ok((Mapper::new(registry.seal()?, store.clone()), store))
}

#[test]
fn test_referenced_many_saves_each_related_document() -> Result<()> {
    let (mapper, store) = setup()?;
    let person = mapper.build("Person", json!({ "_id": "p1" }))?;
    let first = mapper.build("Post", json!({ "_id": "a", "title": "First" }))?;
    let second = mapper.build("Post", json!({ "_id": "b", "title": "Second" }))?;

    person.set("posts", vec![first.clone(), second.clone()])?;
    assert!(store.saves_of("Post").is_empty());

    person.save()?;

    assert_eq!(store.saves_of("Post"), vec!["a", "b"]);
    assert_eq!(store.saves_of("Person"), vec!["p1"]);
    assert!(!person.is_new_record());
    assert!(!first.is_new_record());

    let reloaded = mapper.find("Person", "p1")?.unwrap();
    let posts = reloaded.many("posts")?;
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[1].read_attribute("person_id"), Value::from("p1"));
    Ok(())
}

#[test]
fn test_failed_related_save_is_reported_after_all_attempts() -> Result<()> {
    let (mapper, store) = setup()?;
    store.reject("a");

    let person = mapper.build("Person", json!({ "_id": "p1" }))?;
    let posts = vec![
        mapper.build("Post", json!({ "_id": "a" }))?,
        mapper.build("Post", json!({ "_id": "b" }))?,
    ];
    person.set("posts", posts)?;

    let err = person.save().unwrap_err();
    match err {
        OdmError::Persist(PersistError::Rejected { class, id, .. }) => {
            assert_eq!(class, "Post");
            assert_eq!(id, "a");
        }
        other => panic!("Expected Rejected, got {:?}", other),
    }

    assert_eq!(store.saves_of("Post"), vec!["a", "b"]);
    assert!(store.saves_of("Person").is_empty());
    assert!(person.is_new_record());
    Ok(())
}

#[test]
fn test_referenced_one_cascades() -> Result<()> {
    let (mapper, store) = setup()?;
    let person = mapper.build("Person", json!({ "_id": "p1" }))?;
    person.set("game", json!({ "_id": "g1", "score": 7 }))?;

    person.save()?;

    assert_eq!(store.saves_of("Game"), vec!["g1"]);
    let game = mapper.find("Game", "g1")?.unwrap();
    assert_eq!(game.read_attribute("person_id"), Value::from("p1"));
    Ok(())
}

#[test]
fn test_unmaterialized_relations_are_not_resaved() -> Result<()> {
    let (mapper, store) = setup()?;
    let person = mapper.build("Person", json!({ "_id": "p1", "title": "Sir" }))?;
    person.save()?;
    person.write_attribute("title", "Dr")?;
    person.save()?;

    assert!(store.saves_of("Post").is_empty());
    assert_eq!(store.saves_of("Person"), vec!["p1", "p1"]);
    Ok(())
}

#[test]
fn test_saving_an_embedded_child_saves_the_root() -> Result<()> {
    let (mapper, store) = setup()?;
    let person = mapper.build(
        "Person",
        json!({ "_id": "p1", "addresses": [{ "street": "Folsom" }] }),
    )?;
    let address = person.many("addresses")?.remove(0);
    address.write_attribute("street", "Market")?;

    address.save()?;

    assert_eq!(store.saves_of("Person"), vec!["p1"]);
    assert!(store.saves_of("Address").is_empty());
    assert!(!address.is_new_record());

    let reloaded = mapper.find("Person", "p1")?.unwrap();
    let addresses = reloaded.many("addresses")?;
    assert_eq!(addresses[0].read_attribute("street"), Value::from("Market"));
    Ok(())
}

#[test]
fn test_built_owner_stamps_keys_on_related_documents() -> Result<()> {
    let (mapper, _) = setup()?;
    let person = mapper.build("Person", json!({ "posts": [{ "title": "Hello" }] }))?;

    let id = person.id().unwrap();
    let posts = person.many("posts")?;
    assert_eq!(posts[0].read_attribute("person_id"), id);
    Ok(())
}

#[test]
fn test_orphaned_embedded_child_is_not_stored_on_its_own() -> Result<()> {
    let (mapper, store) = setup()?;
    let address = {
        let person = mapper.build(
            "Person",
            json!({ "_id": "p1", "addresses": [{ "street": "Folsom" }] }),
        )?;
        person.many("addresses")?.remove(0)
    };

    let err = address.save().unwrap_err();
    assert!(matches!(err, OdmError::Orphaned { ref class } if class == "Address"));
    assert!(store.saves_of("Address").is_empty());
    assert!(store.saves_of("Person").is_empty());
    Ok(())
}
