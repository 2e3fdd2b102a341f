use serde_json::Value as JsonValue;
use thiserror::Error;

use super::DataType;

#[derive(Error, Debug)]
pub enum OdmError {
    #[error("Invalid declaration on '{class}': {message}")]
    InvalidDeclaration { class: String, message: String },

    #[error(transparent)]
    Cast(#[from] CastError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("Class '{0}' not found")]
    ClassNotFound(String),

    #[error("Association '{name}' not found on class '{class}'")]
    AssociationNotFound { class: String, name: String },

    #[error("Field '{name}' is not declared on class '{class}'")]
    UnknownField { class: String, name: String },

    #[error("Embedded {class} document has lost its parent")]
    Orphaned { class: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("A global schema is already installed")]
    SchemaInstalled,
}

impl OdmError {
    pub fn invalid_declaration(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            class: class.into(),
            message: message.into(),
        }
    }
}

/// A raw value that could not be converted to the declared type of a field.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Cannot cast {value} to {target} for field '{field}'")]
pub struct CastError {
    pub field: String,
    pub value: JsonValue,
    pub target: DataType,
}

impl CastError {
    pub fn new(field: impl Into<String>, value: &JsonValue, target: &DataType) -> Self {
        Self {
            field: field.into(),
            value: value.clone(),
            target: target.clone(),
        }
    }
}

/// Failures reported by a [`crate::storage::DocumentStore`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistError {
    #[error("Store rejected {class} '{id}': {reason}")]
    Rejected {
        class: String,
        id: String,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, OdmError>;

pub type StoreResult<T> = std::result::Result<T, PersistError>;

impl<T> From<std::sync::PoisonError<T>> for PersistError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Unavailable(err.to_string())
    }
}
