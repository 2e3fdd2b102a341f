//! In-memory documents.
//!
//! A [`Document`] is a shared handle (`Rc<RefCell<_>>`) on one instance: its
//! class, its ordered attribute store and one cache slot per materialized
//! association. Embedded children keep a weak link to the parent and the
//! association they sit under; every change to a child is written back into
//! the parent's attribute store, up to the root, so the root's attributes are
//! always the full stored form.
//!
//! Handles are request-scoped and not `Send`.

mod nested;
mod proxy;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{Level, event, info_span};

use crate::cast::cast_out_document;
use crate::core::{Attributes, OdmError, RawDocument, Result, Value};
use crate::mapper::Mapper;
use crate::schema::{ClassDef, ID_FIELD};

pub use nested::{AttrValue, ValueTree};
pub use proxy::Proxy;

pub(crate) use proxy::ProxyTarget;

pub(crate) struct DocState {
    mapper: Mapper,
    class: Arc<ClassDef>,
    attributes: Attributes,
    relations: HashMap<String, ProxyTarget>,
    parent: Option<ParentLink>,
    new_record: bool,
    saving: bool,
}

/// Non-owning link from an embedded child to its parent.
pub(crate) struct ParentLink {
    document: Weak<RefCell<DocState>>,
    association: String,
}

#[derive(Clone)]
pub struct Document(Rc<RefCell<DocState>>);

impl Document {
    pub(crate) fn new_record(mapper: Mapper, class: Arc<ClassDef>, attributes: Attributes) -> Self {
        Self::from_state(mapper, class, attributes, true)
    }

    pub(crate) fn persisted(mapper: Mapper, class: Arc<ClassDef>, attributes: Attributes) -> Self {
        Self::from_state(mapper, class, attributes, false)
    }

    fn from_state(
        mapper: Mapper,
        class: Arc<ClassDef>,
        attributes: Attributes,
        new_record: bool,
    ) -> Self {
        Self(Rc::new(RefCell::new(DocState {
            mapper,
            class,
            attributes,
            relations: HashMap::new(),
            parent: None,
            new_record,
            saving: false,
        })))
    }

    /// Wrap a nested map stored under `association` of `parent`.
    pub(crate) fn embedded(
        parent: &Document,
        association: &str,
        class: Arc<ClassDef>,
        attributes: Attributes,
    ) -> Self {
        let child = Self::from_state(parent.mapper(), class, attributes, parent.is_new_record());
        child.attach(parent, association);
        child
    }

    pub fn mapper(&self) -> Mapper {
        self.0.borrow().mapper.clone()
    }

    pub fn class(&self) -> Arc<ClassDef> {
        self.0.borrow().class.clone()
    }

    pub fn class_name(&self) -> String {
        self.0.borrow().class.name().to_string()
    }

    /// The document id, if assigned.
    pub fn id(&self) -> Option<Value> {
        match self.0.borrow().attributes.get(ID_FIELD) {
            None | Some(Value::Null) => None,
            Some(id) => Some(id.clone()),
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.0.borrow().new_record
    }

    /// Same underlying instance, not merely equal.
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Typed copy of the attribute store.
    pub fn typed_attributes(&self) -> Attributes {
        self.0.borrow().attributes.clone()
    }

    /// Stored form of the attributes, embedded children included.
    pub fn attributes(&self) -> RawDocument {
        cast_out_document(&self.0.borrow().attributes)
    }

    /// Current value of `name`, or its declared default when unset.
    pub fn read_attribute(&self, name: &str) -> Value {
        let state = self.0.borrow();
        match state.attributes.get(name) {
            Some(value) => value.clone(),
            None => state.class.field_default(name).unwrap_or(Value::Null),
        }
    }

    /// Cast `value` into the declared field `name`. `null` restores the default.
    pub fn write_attribute(&self, name: &str, value: impl Into<JsonValue>) -> Result<()> {
        let class = self.class();
        let field = class.field(name).ok_or_else(|| OdmError::UnknownField {
            class: class.name().to_string(),
            name: name.to_string(),
        })?;
        let typed = self.mapper().caster().cast_in(&value.into(), field)?;
        self.store_attribute(name, typed);
        self.sync_parent();
        Ok(())
    }

    /// Drop `name` from the store; a later read yields the default again.
    pub fn remove_attribute(&self, name: &str) -> Option<Value> {
        let removed = {
            let mut state = self.0.borrow_mut();
            state.relations.remove(name);
            state.attributes.shift_remove(name)
        };
        if removed.is_some() {
            self.sync_parent();
        }
        removed
    }

    /// Embedding parent, if this is an owned child.
    pub fn parent(&self) -> Option<Document> {
        let state = self.0.borrow();
        state
            .parent
            .as_ref()
            .and_then(|link| link.document.upgrade())
            .map(Document)
    }

    /// Parent reached through the inverse name of the association this child sits under.
    pub fn inverse(&self, name: &str) -> Option<Document> {
        let association = self.0.borrow().parent.as_ref()?.association.clone();
        let parent = self.parent()?;
        let assoc = parent.class().association(&association)?.clone();
        (assoc.inverse_name.as_deref() == Some(name)).then_some(parent)
    }

    /// Persist this document, saving referenced documents first.
    ///
    /// Embedded children are stored inside their root, so saving one saves
    /// the root, and a child whose parent is gone cannot be saved at all.
    /// Every referenced document is attempted; the first failure is returned
    /// and this document is then left unsaved.
    pub fn save(&self) -> Result<()> {
        let link = self
            .0
            .borrow()
            .parent
            .as_ref()
            .map(|link| link.document.upgrade());
        match link {
            Some(Some(parent)) => return Document(parent).save(),
            Some(None) => {
                event!(Level::WARN, class = %self.class_name(), "orphaned embedded document");
                return Err(OdmError::Orphaned {
                    class: self.class_name(),
                });
            }
            None => {}
        }
        if self.0.borrow().saving {
            return Ok(());
        }

        let class = self.class();
        let id = self.id().map(|id| id.to_string()).unwrap_or_default();
        let span = info_span!("document.save", class = %class.name(), id = %id);
        let _enter = span.enter();

        self.0.borrow_mut().saving = true;
        let cascaded = self.cascade_save(&class);
        self.0.borrow_mut().saving = false;
        cascaded?;

        let raw = self.attributes();
        if let Err(err) = self.mapper().store().save(class.name(), &raw) {
            event!(Level::ERROR, error = %err, "document save failed");
            return Err(err.into());
        }

        self.mark_persisted();
        event!(Level::DEBUG, "document saved");
        Ok(())
    }

    fn cascade_save(&self, class: &ClassDef) -> Result<()> {
        let mut first_error = None;
        for assoc in class.associations().filter(|a| a.macro_kind.is_referenced()) {
            let related = self.cached_documents(&assoc.name);
            for document in related {
                event!(
                    Level::DEBUG,
                    association = %assoc.name,
                    related = %document.class_name(),
                    "cascading save"
                );
                if let Err(err) = document.save() {
                    event!(
                        Level::WARN,
                        association = %assoc.name,
                        error = %err,
                        "cascaded save failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn mark_persisted(&self) {
        let children: Vec<Document> = {
            let mut state = self.0.borrow_mut();
            state.new_record = false;
            let class = state.class.clone();
            state
                .relations
                .iter()
                .filter(|(name, _)| class.macro_of(name).is_some_and(|m| m.is_owned()))
                .flat_map(|(_, target)| target.documents())
                .collect()
        };
        for child in children {
            child.mark_persisted();
        }
    }

    pub(crate) fn ensure_identity(&self) {
        if self.id().is_some() {
            return;
        }
        let id = {
            let state = self.0.borrow();
            state
                .mapper
                .identity()
                .generate(&state.class, &state.attributes)
        };
        event!(Level::TRACE, class = %self.class_name(), id = %id, "identity generated");
        self.store_attribute(ID_FIELD, id);
        self.restamp_foreign_keys();
        self.sync_parent();
    }

    pub(crate) fn store_attribute(&self, name: &str, value: Value) {
        self.0
            .borrow_mut()
            .attributes
            .insert(name.to_string(), value);
    }

    pub(crate) fn state(&self) -> std::cell::Ref<'_, DocState> {
        self.0.borrow()
    }

    fn attach(&self, parent: &Document, association: &str) {
        self.0.borrow_mut().parent = Some(ParentLink {
            document: Rc::downgrade(&parent.0),
            association: association.to_string(),
        });
    }

    fn detach(&self) {
        self.0.borrow_mut().parent = None;
    }

    /// Take this child out of the slot it currently sits in, unless that slot
    /// is `association` on `owner`.
    fn leave_parent(&self, owner: &Document, association: &str) {
        let link = {
            let state = self.0.borrow();
            state
                .parent
                .as_ref()
                .map(|link| (link.document.upgrade(), link.association.clone()))
        };
        let Some((Some(parent), previous)) = link else {
            return;
        };
        let parent = Document(parent);
        if parent.ptr_eq(owner) && previous == association {
            return;
        }
        {
            let mut state = parent.0.borrow_mut();
            match state.relations.get_mut(&previous) {
                Some(ProxyTarget::One(slot)) => {
                    if slot.as_ref().is_some_and(|child| child.ptr_eq(self)) {
                        *slot = None;
                    }
                }
                Some(ProxyTarget::Many(children)) => children.retain(|child| !child.ptr_eq(self)),
                None => {}
            }
        }
        event!(
            Level::DEBUG,
            class = %self.class_name(),
            from = %previous,
            to = %association,
            "embedded document moved"
        );
        self.detach();
        parent.rebuild_owned(&previous);
    }

    /// True when `other` is this document or one of its embedding ancestors.
    fn is_self_or_ancestor(&self, other: &Document) -> bool {
        let mut current = Some(self.clone());
        while let Some(document) = current {
            if document.ptr_eq(other) {
                return true;
            }
            current = document.parent();
        }
        false
    }

    /// Write this child's attributes back into its parent's store.
    pub(crate) fn sync_parent(&self) {
        let link = {
            let state = self.0.borrow();
            state
                .parent
                .as_ref()
                .map(|link| (link.document.upgrade(), link.association.clone()))
        };
        if let Some((Some(parent), association)) = link {
            Document(parent).rebuild_owned(&association);
        }
    }

    /// Regenerate the nested storage of an owned association from its cached children.
    pub(crate) fn rebuild_owned(&self, association: &str) {
        let target = self.0.borrow().relations.get(association).cloned();
        let stored = match target {
            Some(ProxyTarget::One(Some(child))) => Some(Value::Document(child.typed_attributes())),
            Some(ProxyTarget::One(None)) => None,
            Some(ProxyTarget::Many(children)) => Some(Value::Array(
                children
                    .iter()
                    .map(|child| Value::Document(child.typed_attributes()))
                    .collect(),
            )),
            None => return,
        };
        {
            let mut state = self.0.borrow_mut();
            match stored {
                Some(value) => {
                    state.attributes.insert(association.to_string(), value);
                }
                None => {
                    state.attributes.shift_remove(association);
                }
            }
        }
        self.sync_parent();
    }
}

impl DocState {
    pub(crate) fn class(&self) -> &Arc<ClassDef> {
        &self.class
    }

    pub(crate) fn attributes(&self) -> &Attributes {
        &self.attributes
    }
}

/// Two handles are equal when they are the same instance or share class and id.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self.id(), other.id()) {
            (Some(a), Some(b)) => a == b && self.class_name() == other.class_name(),
            _ => false,
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(state) => f
                .debug_struct("Document")
                .field("class", &state.class.name())
                .field("attributes", &state.attributes)
                .field("new_record", &state.new_record)
                .finish(),
            Err(_) => f.write_str("Document(<borrowed>)"),
        }
    }
}
