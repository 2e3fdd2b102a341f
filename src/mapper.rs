//! Entry point tying a sealed schema to a store and an identity provider.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{Level, event};

use crate::cast::TypeCaster;
use crate::config::MapperConfig;
use crate::core::{Attributes, OdmError, RawDocument, Result, Value};
use crate::document::{Document, ValueTree};
use crate::identity::{IdentityProvider, KeyedIdentity};
use crate::schema::{ClassDef, ID_FIELD, Schema};
use crate::storage::DocumentStore;

/// Builds, loads and saves documents.
///
/// Cheap to clone; every document keeps a handle to the mapper it came from.
#[derive(Clone)]
pub struct Mapper {
    inner: Arc<MapperInner>,
}

struct MapperInner {
    schema: Schema,
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    config: MapperConfig,
}

impl Mapper {
    pub fn new(schema: Schema, store: Arc<dyn DocumentStore>) -> Self {
        Self::with_config(schema, store, MapperConfig::default())
    }

    pub fn with_config(
        schema: Schema,
        store: Arc<dyn DocumentStore>,
        config: MapperConfig,
    ) -> Self {
        let identity = Arc::new(KeyedIdentity::new(&config.key_separator));
        Self::with_identity(schema, store, config, identity)
    }

    pub fn with_identity(
        schema: Schema,
        store: Arc<dyn DocumentStore>,
        config: MapperConfig,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(MapperInner {
                schema,
                store,
                identity,
                config,
            }),
        }
    }

    /// Mapper over the process-wide schema, if one was installed.
    pub fn from_global(store: Arc<dyn DocumentStore>) -> Option<Self> {
        Schema::global().map(|schema| Self::new(schema, store))
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    pub fn config(&self) -> &MapperConfig {
        &self.inner.config
    }

    pub fn caster(&self) -> TypeCaster<'_> {
        TypeCaster::new(&self.inner.schema)
    }

    /// Construct a new document: defaults first, then `tree`, then an id.
    pub fn build(&self, class: &str, tree: impl Into<ValueTree>) -> Result<Document> {
        let class = self.schema().class(class)?;
        let attributes = defaults_of(&class);
        let document = Document::new_record(self.clone(), class, attributes);
        document.process(tree)?;
        document.ensure_identity();
        Ok(document)
    }

    /// Rebuild a persisted document from its raw form.
    pub fn instantiate(&self, class: &str, raw: &RawDocument) -> Result<Document> {
        let class = self.schema().class(class)?;
        let attributes = self.hydrate(&class, raw)?;
        Ok(Document::persisted(self.clone(), class, attributes))
    }

    /// Load one document of `class` by id.
    pub fn find(&self, class: &str, id: impl Into<Value>) -> Result<Option<Document>> {
        self.schema().class(class)?;
        let id = id.into();
        let raw = self.store().find_by_foreign_key(class, ID_FIELD, &id)?;
        match raw {
            Some(raw) => self.instantiate(class, &raw).map(Some),
            None => {
                event!(Level::DEBUG, class, id = %id, "document not found");
                Ok(None)
            }
        }
    }

    /// Cast declared fields and rebuild nested owned storage.
    pub(crate) fn hydrate(&self, class: &ClassDef, raw: &RawDocument) -> Result<Attributes> {
        let mut attributes = defaults_of(class);
        attributes.extend(self.caster().cast_document(class, raw)?);

        for assoc in class.associations().filter(|a| a.macro_kind.is_owned()) {
            let target = self.schema().class(&assoc.target)?;
            let nested = match raw.get(&assoc.name) {
                None | Some(JsonValue::Null) => continue,
                Some(JsonValue::Object(map)) => Value::Document(self.hydrate(&target, map)?),
                Some(JsonValue::Array(items)) => {
                    let mut children = Vec::with_capacity(items.len());
                    for item in items {
                        let map = item.as_object().ok_or_else(|| {
                            OdmError::TypeMismatch(format!(
                                "'{}' on {} holds a non-document element",
                                assoc.name,
                                class.name()
                            ))
                        })?;
                        children.push(Value::Document(self.hydrate(&target, map)?));
                    }
                    Value::Array(children)
                }
                Some(other) => {
                    return Err(OdmError::TypeMismatch(format!(
                        "'{}' on {} holds {} instead of a document",
                        assoc.name,
                        class.name(),
                        other
                    )));
                }
            };
            attributes.insert(assoc.name.clone(), nested);
        }

        Ok(attributes)
    }
}

fn defaults_of(class: &ClassDef) -> Attributes {
    class
        .fields()
        .filter_map(|field| {
            field
                .default
                .as_ref()
                .map(|default| (field.name.clone(), default.clone()))
        })
        .collect()
}

impl fmt::Debug for Mapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("classes", &self.inner.schema.class_names())
            .field("config", &self.inner.config)
            .finish()
    }
}
