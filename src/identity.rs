//! Identity of documents.
//!
//! The nested-attributes engine only compares identities; how an id is
//! produced is up to the [`IdentityProvider`] a mapper is built with.

use uuid::Uuid;

use crate::core::{Attributes, Value};
use crate::schema::{ClassDef, ID_FIELD};

pub trait IdentityProvider: Send + Sync {
    /// Identity of a document with these attributes, if one can be determined.
    fn identity_of(&self, class: &ClassDef, attributes: &Attributes) -> Option<Value>;

    /// A fresh id for a new document.
    fn generate(&self, class: &ClassDef, attributes: &Attributes) -> Value;
}

/// Uses `_id` when present, otherwise the composite of the class key fields.
///
/// Composite ids join the key values with the separator, lowercased, with
/// whitespace replaced by the separator: `("Test", "User")` is `test-user`.
#[derive(Debug, Clone)]
pub struct KeyedIdentity {
    separator: String,
}

impl KeyedIdentity {
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
        }
    }

    fn composite_key(&self, class: &ClassDef, attributes: &Attributes) -> Option<String> {
        let keys = class.key_fields();
        if keys.is_empty() {
            return None;
        }
        let mut parts = Vec::with_capacity(keys.len());
        for key in keys {
            match attributes.get(key) {
                None | Some(Value::Null) => return None,
                Some(value) => parts.push(value.to_string()),
            }
        }
        let joined = parts.join(&self.separator).to_lowercase();
        Some(
            joined
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(&self.separator),
        )
    }
}

impl Default for KeyedIdentity {
    fn default() -> Self {
        Self::new("-")
    }
}

impl IdentityProvider for KeyedIdentity {
    fn identity_of(&self, class: &ClassDef, attributes: &Attributes) -> Option<Value> {
        match attributes.get(ID_FIELD) {
            Some(Value::Null) | None => self.composite_key(class, attributes).map(Value::Text),
            Some(id) => Some(id.clone()),
        }
    }

    fn generate(&self, class: &ClassDef, attributes: &Attributes) -> Value {
        let id = self
            .composite_key(class, attributes)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Value::Text(id)
    }
}
