//! Attribute assignment and nested attributes.
//!
//! `process` applies a partial value tree to a document in one top-down
//! pass. Plain keys are cast and written eagerly in input order: when a cast
//! fails, writes made earlier in the same call stay applied. Association keys
//! dispatch on the macro kind and recurse depth-first before the next key.

use std::cmp::Ordering;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::{Level, event};

use super::{Document, ProxyTarget};
use crate::core::{OdmError, RawDocument, Result};
use crate::schema::AssociationDef;

/// One entry of a [`ValueTree`].
#[derive(Debug, Clone)]
pub enum AttrValue {
    Raw(JsonValue),
    One(Document),
    Many(Vec<Document>),
}

impl From<JsonValue> for AttrValue {
    fn from(value: JsonValue) -> Self {
        Self::Raw(value)
    }
}

impl From<Document> for AttrValue {
    fn from(document: Document) -> Self {
        Self::One(document)
    }
}

impl From<Vec<Document>> for AttrValue {
    fn from(documents: Vec<Document>) -> Self {
        Self::Many(documents)
    }
}

impl From<Option<Document>> for AttrValue {
    fn from(document: Option<Document>) -> Self {
        match document {
            Some(document) => Self::One(document),
            None => Self::Raw(JsonValue::Null),
        }
    }
}

/// Ordered names to values, raw or already-built documents.
///
/// ```
/// use rustmemodm::ValueTree;
/// use serde_json::json;
///
/// let tree = ValueTree::from(json!({ "title": "Sir" })).with("age", json!(30));
/// assert_eq!(tree.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValueTree {
    entries: IndexMap<String, AttrValue>,
}

impl ValueTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<AttrValue>) {
        self.entries.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttrValue)> {
        self.entries.iter()
    }
}

impl From<RawDocument> for ValueTree {
    fn from(raw: RawDocument) -> Self {
        Self {
            entries: raw
                .into_iter()
                .map(|(name, value)| (name, AttrValue::Raw(value)))
                .collect(),
        }
    }
}

impl From<JsonValue> for ValueTree {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(map) => map.into(),
            JsonValue::Null => Self::default(),
            other => {
                event!(Level::WARN, value = %other, "value tree must be an object; ignoring");
                Self::default()
            }
        }
    }
}

impl IntoIterator for ValueTree {
    type Item = (String, AttrValue);
    type IntoIter = indexmap::map::IntoIter<String, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// How an association key was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    /// The association name itself.
    Direct,
    /// `<name>_attributes`.
    Nested,
}

impl Document {
    /// Apply a partial value tree. Keys that are absent are left untouched.
    pub fn process(&self, tree: impl Into<ValueTree>) -> Result<()> {
        let result = self.apply(tree.into());
        self.sync_parent();
        result
    }

    /// Write accessor of `name`: a direct assignment.
    ///
    /// Association names are replaced wholesale (raw maps become new
    /// documents); plain field names are cast and written.
    pub fn set(&self, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        let value = value.into();
        let class = self.class();
        if let Some(assoc) = class.association(name) {
            let target = self.build_target(assoc, value)?;
            return self.update_association(assoc, target);
        }
        match value {
            AttrValue::Raw(raw) => self.write_attribute(name, raw),
            _ => Err(OdmError::TypeMismatch(format!(
                "'{}' on {} is not an association",
                name,
                class.name()
            ))),
        }
    }

    fn apply(&self, tree: ValueTree) -> Result<()> {
        let class = self.class();
        let mapper = self.mapper();
        let config = mapper.config();

        for (key, value) in tree {
            if let Some(assoc) = class.association(&key) {
                self.assign(assoc, value, Form::Direct)?;
                continue;
            }

            if let Some(field) = class.field(&key) {
                let AttrValue::Raw(raw) = value else {
                    return Err(OdmError::TypeMismatch(format!(
                        "field '{}' on {} takes a plain value, not a document",
                        key,
                        class.name()
                    )));
                };
                let typed = mapper.caster().cast_in(&raw, field)?;
                self.store_attribute(&key, typed);
                continue;
            }

            let nested = key
                .strip_suffix(config.nested_attributes_suffix.as_str())
                .and_then(|name| class.association(name))
                .filter(|assoc| assoc.nested);
            if let Some(assoc) = nested {
                self.assign(assoc, value, Form::Nested)?;
                continue;
            }

            if config.log_unknown_keys {
                event!(Level::DEBUG, class = %class.name(), key = %key, "ignoring unknown key");
            }
        }
        Ok(())
    }

    fn assign(&self, assoc: &AssociationDef, value: AttrValue, form: Form) -> Result<()> {
        match value {
            AttrValue::Raw(JsonValue::Object(map)) if !assoc.macro_kind.is_many() => {
                match self.one(&assoc.name)? {
                    Some(existing) => existing.process(map),
                    None => {
                        let document = self.mapper().build(&assoc.target, map)?;
                        self.update_association(assoc, ProxyTarget::One(Some(document)))
                    }
                }
            }
            AttrValue::Raw(JsonValue::Object(map)) if assoc.nested => {
                self.merge(assoc, sorted_by_label(map))
            }
            AttrValue::Raw(JsonValue::Array(items))
                if assoc.nested && assoc.macro_kind.is_many() && form == Form::Nested =>
            {
                self.merge(assoc, items)
            }
            value => {
                let target = self.build_target(assoc, value)?;
                self.update_association(assoc, target)
            }
        }
    }

    /// Per-element merge: update children whose identity matches, append the rest.
    fn merge(&self, assoc: &AssociationDef, elements: Vec<JsonValue>) -> Result<()> {
        let mapper = self.mapper();
        let target = mapper.schema().class(&assoc.target)?;

        for element in elements {
            let JsonValue::Object(map) = element else {
                return Err(OdmError::TypeMismatch(format!(
                    "nested attributes for '{}' must be objects, got {}",
                    assoc.name, element
                )));
            };

            let cast = mapper.caster().cast_document(&target, &map)?;
            let identity = mapper.identity().identity_of(&target, &cast);
            let existing = match &identity {
                Some(identity) => self.many(&assoc.name)?.into_iter().find(|child| {
                    let state = child.state();
                    mapper
                        .identity()
                        .identity_of(state.class(), state.attributes())
                        .as_ref()
                        == Some(identity)
                }),
                None => None,
            };

            match existing {
                Some(child) => {
                    event!(
                        Level::DEBUG,
                        association = %assoc.name,
                        "nested element updated in place"
                    );
                    child.process(map)?;
                }
                None => {
                    event!(Level::DEBUG, association = %assoc.name, "nested element appended");
                    let child = mapper.build(&assoc.target, map)?;
                    self.push_related(assoc, child)?;
                }
            }
        }
        Ok(())
    }

    /// Turn a direct-assignment value into slot contents for `assoc`.
    fn build_target(&self, assoc: &AssociationDef, value: AttrValue) -> Result<ProxyTarget> {
        let mapper = self.mapper();
        let build = |raw: JsonValue| -> Result<Document> {
            match raw {
                JsonValue::Object(map) => mapper.build(&assoc.target, map),
                other => Err(OdmError::TypeMismatch(format!(
                    "'{}' expects {} attributes, got {}",
                    assoc.name, assoc.target, other
                ))),
            }
        };

        let many = assoc.macro_kind.is_many();
        match value {
            AttrValue::One(document) if !many => Ok(ProxyTarget::One(Some(document))),
            AttrValue::Many(documents) if many => Ok(ProxyTarget::Many(documents)),
            AttrValue::Raw(JsonValue::Null) if many => Ok(ProxyTarget::Many(Vec::new())),
            AttrValue::Raw(JsonValue::Null) => Ok(ProxyTarget::One(None)),
            AttrValue::Raw(JsonValue::Array(items)) if many => items
                .into_iter()
                .map(build)
                .collect::<Result<Vec<_>>>()
                .map(ProxyTarget::Many),
            AttrValue::Raw(JsonValue::Object(map)) if many => sorted_by_label(map)
                .into_iter()
                .map(build)
                .collect::<Result<Vec<_>>>()
                .map(ProxyTarget::Many),
            AttrValue::Raw(raw @ JsonValue::Object(_)) => {
                build(raw).map(|document| ProxyTarget::One(Some(document)))
            }
            other => Err(OdmError::TypeMismatch(format!(
                "cannot assign {} to {} association '{}'",
                describe(&other),
                assoc.macro_kind,
                assoc.name
            ))),
        }
    }
}

fn describe(value: &AttrValue) -> String {
    match value {
        AttrValue::Raw(raw) => raw.to_string(),
        AttrValue::One(document) => format!("a {} document", document.class_name()),
        AttrValue::Many(documents) => format!("{} documents", documents.len()),
    }
}

/// Element maps ordered by label: numeric labels ascending, then the rest lexically.
fn sorted_by_label(map: RawDocument) -> Vec<JsonValue> {
    let mut elements: Vec<(String, JsonValue)> = map.into_iter().collect();
    elements.sort_by(|(a, _), (b, _)| compare_labels(a, b));
    elements.into_iter().map(|(_, value)| value).collect()
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
