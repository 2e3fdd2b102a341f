use std::collections::HashMap;
use std::sync::RwLock;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{Level, event};

use super::DocumentStore;
use crate::cast::cast_out;
use crate::core::{PersistError, RawDocument, StoreResult, Value};
use crate::schema::ID_FIELD;

type Collection = IndexMap<String, RawDocument>;

/// In-memory document store.
///
/// One insertion-ordered collection per class, keyed by id. Replacing a
/// document keeps its original position.
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored documents of `class`.
    ///
    /// Still counts after a writer panicked; fallible reads report the poisoned lock.
    pub fn len(&self, class: &str) -> usize {
        let map = self
            .collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(class).map_or(0, IndexMap::len)
    }

    pub fn is_empty(&self, class: &str) -> bool {
        self.len(class) == 0
    }

    /// Stored copy of one document.
    pub fn get(&self, class: &str, id: &str) -> StoreResult<Option<RawDocument>> {
        let map = self.collections.read()?;
        Ok(map.get(class).and_then(|c| c.get(id)).cloned())
    }

    /// Drop every stored document.
    pub fn clear(&self) -> StoreResult<()> {
        self.collections.write()?.clear();
        Ok(())
    }

    fn matching<'a>(
        collection: Option<&'a Collection>,
        key: &'a str,
        value: &'a JsonValue,
    ) -> impl Iterator<Item = &'a RawDocument> + 'a {
        collection
            .into_iter()
            .flat_map(|c| c.values())
            .filter(move |doc| doc.get(key) == Some(value))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn save(&self, class: &str, document: &RawDocument) -> StoreResult<()> {
        let id = match document.get(ID_FIELD) {
            Some(JsonValue::String(id)) => id.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            other => {
                return Err(PersistError::Rejected {
                    class: class.to_string(),
                    id: other.map(|v| v.to_string()).unwrap_or_default(),
                    reason: "document has no usable id".to_string(),
                });
            }
        };

        let mut map = self.collections.write()?;
        let collection = map.entry(class.to_string()).or_default();
        let replaced = collection.insert(id.clone(), document.clone()).is_some();
        event!(Level::TRACE, class, id = %id, replaced, "document stored");
        Ok(())
    }

    fn find_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Option<RawDocument>> {
        let value = cast_out(value);
        let map = self.collections.read()?;
        Ok(Self::matching(map.get(class), key, &value).next().cloned())
    }

    fn find_many_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Vec<RawDocument>> {
        let value = cast_out(value);
        let map = self.collections.read()?;
        Ok(Self::matching(map.get(class), key, &value).cloned().collect())
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let classes: Vec<String> = self
            .collections
            .read()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("MemoryStore")
            .field("classes", &classes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use serde_json::json;

    fn doc(value: JsonValue) -> RawDocument {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn save_replaces_by_id_in_place() {
        let store = MemoryStore::new();
        store.save("Post", &doc(json!({ "_id": "a", "title": "one" }))).unwrap();
        store.save("Post", &doc(json!({ "_id": "b", "title": "two" }))).unwrap();
        store.save("Post", &doc(json!({ "_id": "a", "title": "uno" }))).unwrap();

        assert_eq!(store.len("Post"), 2);
        assert_eq!(store.get("Post", "a").unwrap().unwrap()["title"], json!("uno"));
        assert!(store.is_empty("Comment"));
    }

    #[test]
    fn save_without_id_is_rejected() {
        let store = MemoryStore::new();
        let err = store.save("Post", &doc(json!({ "title": "one" }))).unwrap_err();
        assert!(matches!(err, PersistError::Rejected { ref class, .. } if class == "Post"));
    }

    #[test]
    fn finds_by_foreign_key_in_insertion_order() {
        let store = MemoryStore::new();
        for (id, owner) in [("p1", "alice"), ("p2", "bob"), ("p3", "alice")] {
            store
                .save("Post", &doc(json!({ "_id": id, "person_id": owner })))
                .unwrap();
        }

        let found = store
            .find_many_by_foreign_key("Post", "person_id", &Value::from("alice"))
            .unwrap();
        let ids: Vec<&JsonValue> = found.iter().map(|d| &d["_id"]).collect();
        assert_eq!(ids, vec![&json!("p1"), &json!("p3")]);

        let first = store
            .find_by_foreign_key("Post", "person_id", &Value::from("bob"))
            .unwrap()
            .unwrap();
        assert_eq!(first["_id"], json!("p2"));
        assert!(
            store
                .find_by_foreign_key("Post", "person_id", &Value::from("carol"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn poisoned_lock_keeps_the_count() {
        let store = Arc::new(MemoryStore::new());
        store.save("Post", &doc(json!({ "_id": "a" }))).unwrap();

        let writer = Arc::clone(&store);
        let joined = thread::spawn(move || {
            let _guard = writer.collections.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(joined.is_err());

        assert_eq!(store.len("Post"), 1);
        assert!(!store.is_empty("Post"));
        assert!(matches!(store.get("Post", "a"), Err(PersistError::Unavailable(_))));
    }
}
