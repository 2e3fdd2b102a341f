//! Everything needed to declare a schema and work with documents.
//!
//! ```
//! use rustmemodm::prelude::*;
//! ```

pub use crate::{
    AssociationOptions, AttrValue, ClassSpec, DataType, Document, DocumentStore, KeySide,
    MacroKind, Mapper, MapperConfig, MemoryStore, OdmError, Proxy, Registry, Schema,
    Value, ValueTree,
};
