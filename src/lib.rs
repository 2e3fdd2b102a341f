// ============================================================================
// RustMemODM Library
// ============================================================================

//! Association-and-attribute mapping for document stores.
//!
//! Declare classes on a [`Registry`], seal it into a [`Schema`], and work with
//! [`Document`]s through a [`Mapper`]:
//!
//! ```
//! use std::sync::Arc;
//! use rustmemodm::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = Registry::new();
//! registry.declare_class(
//!     ClassSpec::new("Person")
//!         .field("title", DataType::Text)
//!         .owned_many("addresses", AssociationOptions::new().inverse_name("addressable"))
//!         .accepts_nested_attributes_for(&["addresses"]),
//! )?;
//! registry.declare_class(ClassSpec::new("Address").field("street", DataType::Text))?;
//!
//! let mapper = Mapper::new(registry.seal()?, Arc::new(MemoryStore::new()));
//! let person = mapper.build("Person", json!({ "title": "Sir" }))?;
//! person.process(json!({ "addresses": { "0": { "street": "Folsom" } } }))?;
//!
//! assert_eq!(person.get("addresses")?.len(), 1);
//! person.save()?;
//! # Ok(())
//! # }
//! ```

pub mod cast;
pub mod config;
pub mod core;
pub mod document;
pub mod identity;
pub mod mapper;
pub mod prelude;
pub mod schema;
pub mod storage;

// Re-export main types for convenience
pub use core::{
    Attributes, CastError, DataType, Field, OdmError, PersistError, RawDocument, Result,
    StoreResult, Value,
};

pub use cast::{TypeCaster, cast_out, cast_out_document};
pub use config::MapperConfig;
pub use document::{AttrValue, Document, Proxy, ValueTree};
pub use identity::{IdentityProvider, KeyedIdentity};
pub use mapper::Mapper;
pub use schema::{
    AssociationDef, AssociationOptions, ClassDef, ClassSpec, ID_FIELD, KeySide, MacroKind,
    Registry, Schema,
};
pub use storage::{DocumentStore, MemoryStore};
