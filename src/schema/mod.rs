//! Field schema and association definitions.
//!
//! Classes are declared on a mutable [`Registry`]. Sealing the registry
//! validates every cross-class reference and yields a [`Schema`]: an
//! immutable table shared through `Arc`, so lookups never lock. Documents can
//! only be built from a sealed schema, which makes "no declaration after the
//! first instance" a property of the types rather than a runtime check.

mod association;
pub mod inflection;
mod registry;

use std::sync::{Arc, RwLock};

use indexmap::IndexMap;
use lazy_static::lazy_static;

use crate::core::{DataType, Field, OdmError, Result, Value};

pub use association::{AssociationDef, AssociationOptions, KeySide, MacroKind};
pub use registry::{ClassSpec, Registry};

/// Name of the identity field every class carries.
pub const ID_FIELD: &str = "_id";

lazy_static! {
    static ref GLOBAL_SCHEMA: RwLock<Option<Schema>> = RwLock::new(None);
}

/// Declared fields, key fields and associations of one class.
#[derive(Debug, Clone)]
pub struct ClassDef {
    name: String,
    fields: IndexMap<String, Field>,
    associations: IndexMap<String, Arc<AssociationDef>>,
    key_fields: Vec<String>,
    /// Local key fields added on behalf of associations, not declared by hand.
    implicit_keys: Vec<String>,
}

impl ClassDef {
    pub(crate) fn new(name: &str) -> Self {
        let mut fields = IndexMap::new();
        fields.insert(ID_FIELD.to_string(), Field::new(ID_FIELD, DataType::Text));
        Self {
            name: name.to_string(),
            fields,
            associations: IndexMap::new(),
            key_fields: Vec::new(),
            implicit_keys: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_type(&self, name: &str) -> Option<&DataType> {
        self.fields.get(name).map(|field| &field.data_type)
    }

    pub fn field_default(&self, name: &str) -> Option<Value> {
        self.fields.get(name).and_then(|field| field.default.clone())
    }

    pub fn association(&self, name: &str) -> Option<&Arc<AssociationDef>> {
        self.associations.get(name)
    }

    pub fn associations(&self) -> impl Iterator<Item = &Arc<AssociationDef>> {
        self.associations.values()
    }

    pub fn macro_of(&self, name: &str) -> Option<MacroKind> {
        self.associations.get(name).map(|assoc| assoc.macro_kind)
    }

    /// Fields a composite identity is generated from.
    pub fn key_fields(&self) -> &[String] {
        &self.key_fields
    }
}

/// Sealed, read-only set of class definitions.
#[derive(Debug, Clone)]
pub struct Schema {
    classes: Arc<IndexMap<String, Arc<ClassDef>>>,
}

impl Schema {
    pub(crate) fn from_classes(classes: IndexMap<String, ClassDef>) -> Self {
        let classes = classes
            .into_iter()
            .map(|(name, class)| (name, Arc::new(class)))
            .collect();
        Self {
            classes: Arc::new(classes),
        }
    }

    /// Install this schema as the process-wide schema. Allowed once.
    pub fn install_global(self) -> Result<()> {
        let mut slot = GLOBAL_SCHEMA.write().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return Err(OdmError::SchemaInstalled);
        }
        *slot = Some(self);
        Ok(())
    }

    /// The process-wide schema, if one was installed.
    pub fn global() -> Option<Schema> {
        GLOBAL_SCHEMA
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn class(&self, name: &str) -> Result<Arc<ClassDef>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| OdmError::ClassNotFound(name.to_string()))
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.classes.keys().map(|s| s.as_str()).collect()
    }

    pub fn lookup_association(&self, class: &str, name: &str) -> Option<Arc<AssociationDef>> {
        self.classes.get(class)?.association(name).cloned()
    }

    /// Which macro backs `name` on `class`, if any.
    pub fn macro_of(&self, class: &str, name: &str) -> Option<MacroKind> {
        self.classes.get(class)?.macro_of(name)
    }

    pub fn field_type(&self, class: &str, name: &str) -> Option<DataType> {
        self.classes.get(class)?.field_type(name).cloned()
    }

    pub fn field_default(&self, class: &str, name: &str) -> Option<Value> {
        self.classes.get(class)?.field_default(name)
    }
}
