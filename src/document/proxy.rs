use std::sync::Arc;

use tracing::{Level, event};

use super::{Document, ValueTree};
use crate::core::{OdmError, Result, Value};
use crate::schema::{AssociationDef, ID_FIELD, KeySide, MacroKind};

/// Contents of one materialized association slot.
#[derive(Clone)]
pub(crate) enum ProxyTarget {
    One(Option<Document>),
    Many(Vec<Document>),
}

impl ProxyTarget {
    pub(crate) fn documents(&self) -> Vec<Document> {
        match self {
            Self::One(doc) => doc.iter().cloned().collect(),
            Self::Many(docs) => docs.clone(),
        }
    }

    fn empty(macro_kind: MacroKind) -> Self {
        if macro_kind.is_many() {
            Self::Many(Vec::new())
        } else {
            Self::One(None)
        }
    }
}

/// Read/write view of one association of one document.
///
/// A proxy holds the documents the association pointed at when it was
/// obtained and refreshes them after each write made through it.
#[derive(Debug, Clone)]
pub struct Proxy {
    owner: Document,
    association: Arc<AssociationDef>,
    documents: Vec<Document>,
}

impl Proxy {
    pub fn association(&self) -> &AssociationDef {
        &self.association
    }

    pub fn macro_kind(&self) -> MacroKind {
        self.association.macro_kind
    }

    pub fn owner(&self) -> &Document {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn first(&self) -> Option<Document> {
        self.documents.first().cloned()
    }

    pub fn get(&self, index: usize) -> Option<Document> {
        self.documents.get(index).cloned()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    /// Append to a collection association.
    pub fn push(&mut self, document: Document) -> Result<()> {
        if !self.association.macro_kind.is_many() {
            return Err(OdmError::TypeMismatch(format!(
                "cannot push onto {} association '{}'",
                self.association.macro_kind, self.association.name
            )));
        }
        self.owner.push_related(&self.association, document)?;
        self.refresh()
    }

    /// Build a document of the target class from `tree` and add it.
    ///
    /// On a single association the new document replaces the current one.
    pub fn build(&mut self, tree: impl Into<ValueTree>) -> Result<Document> {
        let document = self.owner.mapper().build(&self.association.target, tree)?;
        if self.association.macro_kind.is_many() {
            self.owner.push_related(&self.association, document.clone())?;
        } else {
            self.owner
                .update_association(&self.association, ProxyTarget::One(Some(document.clone())))?;
        }
        self.refresh()?;
        Ok(document)
    }

    /// Replace the whole association.
    pub fn replace(&mut self, documents: Vec<Document>) -> Result<()> {
        let target = if self.association.macro_kind.is_many() {
            ProxyTarget::Many(documents)
        } else if documents.len() <= 1 {
            ProxyTarget::One(documents.into_iter().next())
        } else {
            return Err(OdmError::TypeMismatch(format!(
                "{} association '{}' holds at most one document",
                self.association.macro_kind, self.association.name
            )));
        };
        self.owner.update_association(&self.association, target)?;
        self.refresh()
    }

    pub fn clear(&mut self) -> Result<()> {
        self.replace(Vec::new())
    }

    fn refresh(&mut self) -> Result<()> {
        self.documents = self.owner.related(&self.association)?.documents();
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Proxy {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

impl Document {
    /// Read accessor of the association `name`.
    pub fn get(&self, name: &str) -> Result<Proxy> {
        let association = self.association(name)?;
        let documents = self.related(&association)?.documents();
        Ok(Proxy {
            owner: self.clone(),
            association,
            documents,
        })
    }

    /// The single document behind `name`.
    pub fn one(&self, name: &str) -> Result<Option<Document>> {
        Ok(self.get(name)?.first())
    }

    /// The documents behind `name`, in order.
    pub fn many(&self, name: &str) -> Result<Vec<Document>> {
        Ok(self.get(name)?.documents)
    }

    pub(crate) fn association(&self, name: &str) -> Result<Arc<AssociationDef>> {
        let class = self.class();
        class
            .association(name)
            .cloned()
            .ok_or_else(|| OdmError::AssociationNotFound {
                class: class.name().to_string(),
                name: name.to_string(),
            })
    }

    /// Cached contents of the slot, materializing them on first access.
    pub(crate) fn related(&self, assoc: &AssociationDef) -> Result<ProxyTarget> {
        if let Some(target) = self.0.borrow().relations.get(&assoc.name) {
            return Ok(target.clone());
        }
        let target = self.materialize(assoc)?;
        self.0
            .borrow_mut()
            .relations
            .insert(assoc.name.clone(), target.clone());
        Ok(target)
    }

    /// Documents currently in the slot; nothing is loaded.
    pub(crate) fn cached_documents(&self, name: &str) -> Vec<Document> {
        self.0
            .borrow()
            .relations
            .get(name)
            .map(ProxyTarget::documents)
            .unwrap_or_default()
    }

    fn materialize(&self, assoc: &AssociationDef) -> Result<ProxyTarget> {
        let mapper = self.mapper();
        event!(
            Level::DEBUG,
            class = %self.class_name(),
            association = %assoc.name,
            kind = %assoc.macro_kind,
            "materializing association"
        );

        match assoc.macro_kind {
            MacroKind::OwnedOne | MacroKind::OwnedMany => {
                let target = mapper.schema().class(&assoc.target)?;
                let stored = self.0.borrow().attributes.get(&assoc.name).cloned();
                let wrap = |value: &Value| match value {
                    Value::Document(attrs) => Some(Document::embedded(
                        self,
                        &assoc.name,
                        target.clone(),
                        attrs.clone(),
                    )),
                    _ => None,
                };
                Ok(match (assoc.macro_kind, stored) {
                    (MacroKind::OwnedOne, Some(value)) => ProxyTarget::One(wrap(&value)),
                    (MacroKind::OwnedMany, Some(Value::Array(items))) => {
                        ProxyTarget::Many(items.iter().filter_map(wrap).collect())
                    }
                    _ => ProxyTarget::empty(assoc.macro_kind),
                })
            }
            MacroKind::ReferencedOne => {
                let (key, value) = match assoc.key_side {
                    KeySide::Local => (ID_FIELD, self.read_attribute(assoc.key())),
                    KeySide::Foreign => (assoc.key(), self.id().unwrap_or(Value::Null)),
                };
                if value.is_null() {
                    return Ok(ProxyTarget::One(None));
                }
                let found = mapper.store().find_by_foreign_key(&assoc.target, key, &value)?;
                let document = match found {
                    Some(raw) => Some(mapper.instantiate(&assoc.target, &raw)?),
                    None => None,
                };
                Ok(ProxyTarget::One(document))
            }
            MacroKind::ReferencedMany => {
                let Some(id) = self.id() else {
                    return Ok(ProxyTarget::Many(Vec::new()));
                };
                let found = mapper
                    .store()
                    .find_many_by_foreign_key(&assoc.target, assoc.key(), &id)?;
                let documents = found
                    .iter()
                    .map(|raw| mapper.instantiate(&assoc.target, raw))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ProxyTarget::Many(documents))
            }
        }
    }

    /// Replace the slot of `assoc` with `target`.
    ///
    /// Owned kinds rewrite the nested storage and relink children; referenced
    /// kinds only record foreign keys. Nothing is persisted here.
    pub(crate) fn update_association(
        &self,
        assoc: &AssociationDef,
        target: ProxyTarget,
    ) -> Result<()> {
        let target = match (assoc.macro_kind.is_many(), target) {
            (true, ProxyTarget::One(doc)) => ProxyTarget::Many(doc.into_iter().collect()),
            (false, ProxyTarget::Many(docs)) if docs.len() <= 1 => {
                ProxyTarget::One(docs.into_iter().next())
            }
            (false, ProxyTarget::Many(_)) => {
                return Err(OdmError::TypeMismatch(format!(
                    "{} association '{}' holds at most one document",
                    assoc.macro_kind, assoc.name
                )));
            }
            (_, target) => target,
        };

        let documents = target.documents();
        if let Some(wrong) = documents.iter().find(|d| d.class_name() != assoc.target) {
            return Err(OdmError::TypeMismatch(format!(
                "'{}' expects {} documents, got {}",
                assoc.name,
                assoc.target,
                wrong.class_name()
            )));
        }

        event!(
            Level::DEBUG,
            class = %self.class_name(),
            association = %assoc.name,
            count = documents.len(),
            "association replaced"
        );

        if assoc.macro_kind.is_owned() {
            if documents.iter().any(|child| self.is_self_or_ancestor(child)) {
                return Err(OdmError::TypeMismatch(format!(
                    "'{}' on {} cannot embed the document or one of its parents",
                    assoc.name,
                    self.class_name()
                )));
            }
            for child in &documents {
                child.leave_parent(self, &assoc.name);
            }
            for previous in self.cached_documents(&assoc.name) {
                previous.detach();
            }
            for child in &documents {
                child.attach(self, &assoc.name);
            }
            self.0
                .borrow_mut()
                .relations
                .insert(assoc.name.clone(), target);
            self.rebuild_owned(&assoc.name);
            return Ok(());
        }

        match assoc.key_side {
            KeySide::Local => {
                let key = documents
                    .first()
                    .and_then(Document::id)
                    .unwrap_or(Value::Null);
                self.store_attribute(assoc.key(), key);
            }
            KeySide::Foreign => {
                let id = self.id().unwrap_or(Value::Null);
                for document in &documents {
                    document.store_attribute(assoc.key(), id.clone());
                    document.sync_parent();
                }
            }
        }
        self.0
            .borrow_mut()
            .relations
            .insert(assoc.name.clone(), target);
        self.sync_parent();
        Ok(())
    }

    pub(crate) fn push_related(&self, assoc: &AssociationDef, document: Document) -> Result<()> {
        let mut documents = self.related(assoc)?.documents();
        documents.push(document);
        self.update_association(assoc, ProxyTarget::Many(documents))
    }

    /// Point foreign-side keys of cached related documents at this document's id.
    pub(crate) fn restamp_foreign_keys(&self) {
        let Some(id) = self.id() else {
            return;
        };
        let class = self.class();
        for assoc in class
            .associations()
            .filter(|a| a.macro_kind.is_referenced() && a.key_side == KeySide::Foreign)
        {
            for document in self.cached_documents(&assoc.name) {
                document.store_attribute(assoc.key(), id.clone());
            }
        }
    }
}
