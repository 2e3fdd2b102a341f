use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{Level, event};

use super::{AssociationDef, AssociationOptions, ClassDef, KeySide, MacroKind, Schema};
use crate::core::{DataType, Field, OdmError, Result, Value};

/// Declaration of one class, applied to a [`Registry`] as a unit.
///
/// ```
/// use rustmemodm::prelude::*;
///
/// let spec = ClassSpec::new("Person")
///     .field("first_name", DataType::Text)
///     .field_with_default("age", DataType::Integer, 100)
///     .key(&["first_name"])
///     .owned_many("addresses", AssociationOptions::new().inverse_name("addressable"))
///     .accepts_nested_attributes_for(&["addresses"]);
/// # let _ = spec;
/// ```
#[derive(Debug, Clone)]
pub struct ClassSpec {
    name: String,
    declarations: Vec<Declaration>,
}

#[derive(Debug, Clone)]
enum Declaration {
    Field(Field),
    Key(Vec<String>),
    Association {
        name: String,
        macro_kind: MacroKind,
        options: AssociationOptions,
    },
    Nested(Vec<String>),
}

impl ClassSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            declarations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(mut self, name: &str, data_type: DataType) -> Self {
        self.declarations
            .push(Declaration::Field(Field::new(name, data_type)));
        self
    }

    pub fn field_with_default(
        mut self,
        name: &str,
        data_type: DataType,
        default: impl Into<Value>,
    ) -> Self {
        self.declarations.push(Declaration::Field(
            Field::new(name, data_type).with_default(default),
        ));
        self
    }

    /// Fields a composite id is generated from.
    pub fn key(mut self, fields: &[&str]) -> Self {
        self.declarations.push(Declaration::Key(
            fields.iter().map(|f| f.to_string()).collect(),
        ));
        self
    }

    pub fn association(
        mut self,
        name: &str,
        macro_kind: MacroKind,
        options: AssociationOptions,
    ) -> Self {
        self.declarations.push(Declaration::Association {
            name: name.to_string(),
            macro_kind,
            options,
        });
        self
    }

    pub fn owned_one(self, name: &str, options: AssociationOptions) -> Self {
        self.association(name, MacroKind::OwnedOne, options)
    }

    pub fn owned_many(self, name: &str, options: AssociationOptions) -> Self {
        self.association(name, MacroKind::OwnedMany, options)
    }

    pub fn referenced_one(self, name: &str, options: AssociationOptions) -> Self {
        self.association(name, MacroKind::ReferencedOne, options)
    }

    pub fn referenced_many(self, name: &str, options: AssociationOptions) -> Self {
        self.association(name, MacroKind::ReferencedMany, options)
    }

    /// Authorize per-element nested merge for the named associations.
    pub fn accepts_nested_attributes_for(mut self, names: &[&str]) -> Self {
        self.declarations.push(Declaration::Nested(
            names.iter().map(|n| n.to_string()).collect(),
        ));
        self
    }
}

/// Mutable declaration phase of the schema.
///
/// Every declaration is validated immediately; cross-class references
/// (association targets, `OBJECT<Class>` fields) are checked by [`Registry::seal`].
#[derive(Debug, Clone, Default)]
pub struct Registry {
    classes: IndexMap<String, ClassDef>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a whole class declaration. On error nothing from `spec` is kept.
    pub fn declare_class(&mut self, spec: ClassSpec) -> Result<()> {
        let mut staged = self.clone();
        staged.define_class(&spec.name);

        // nested authorizations may name associations declared further down
        let (nested, rest): (Vec<_>, Vec<_>) = spec
            .declarations
            .into_iter()
            .partition(|d| matches!(d, Declaration::Nested(_)));

        for declaration in rest.into_iter().chain(nested) {
            match declaration {
                Declaration::Field(field) => staged.declare_field(&spec.name, field)?,
                Declaration::Key(fields) => {
                    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
                    staged.declare_key(&spec.name, &fields)?
                }
                Declaration::Association {
                    name,
                    macro_kind,
                    options,
                } => staged.declare_association(&spec.name, &name, macro_kind, options)?,
                Declaration::Nested(names) => {
                    let names: Vec<&str> = names.iter().map(String::as_str).collect();
                    staged.accepts_nested_attributes_for(&spec.name, &names)?
                }
            }
        }

        *self = staged;
        Ok(())
    }

    /// Make sure `class` exists. Existing declarations are kept.
    pub fn define_class(&mut self, class: &str) {
        if !self.classes.contains_key(class) {
            event!(Level::DEBUG, class, "class defined");
            self.classes.insert(class.to_string(), ClassDef::new(class));
        }
    }

    pub fn declare_field(&mut self, class: &str, field: Field) -> Result<()> {
        let def = self.class_mut(class)?;
        if def.associations.contains_key(&field.name) {
            return Err(OdmError::invalid_declaration(
                class,
                format!("field '{}' clashes with an association of the same name", field.name),
            ));
        }
        if let Some(default) = &field.default {
            if !field.data_type.is_compatible(default) {
                return Err(OdmError::invalid_declaration(
                    class,
                    format!(
                        "default {} of field '{}' is not a {}",
                        default, field.name, field.data_type
                    ),
                ));
            }
        }
        def.implicit_keys.retain(|key| *key != field.name);
        def.fields.insert(field.name.clone(), field);
        Ok(())
    }

    pub fn declare_key(&mut self, class: &str, fields: &[&str]) -> Result<()> {
        let def = self.class_mut(class)?;
        if fields.is_empty() {
            return Err(OdmError::invalid_declaration(class, "key needs at least one field"));
        }
        if let Some(missing) = fields.iter().find(|f| !def.fields.contains_key(**f)) {
            return Err(OdmError::invalid_declaration(
                class,
                format!("key field '{}' is not declared", missing),
            ));
        }
        def.key_fields = fields.iter().map(|f| f.to_string()).collect();
        Ok(())
    }

    /// Declare (or redeclare) an association on `class`.
    pub fn declare_association(
        &mut self,
        class: &str,
        name: &str,
        macro_kind: MacroKind,
        options: AssociationOptions,
    ) -> Result<()> {
        let mut assoc = AssociationDef::resolve(class, name, macro_kind, options)
            .map_err(|message| OdmError::invalid_declaration(class, message))?;

        let def = self.class_mut(class)?;
        if def.fields.contains_key(name) {
            return Err(OdmError::invalid_declaration(
                class,
                format!("association '{}' clashes with a field of the same name", name),
            ));
        }

        if let Some(key) = local_key(&assoc) {
            if !def.fields.contains_key(key) {
                def.fields.insert(key.to_string(), Field::new(key, DataType::Text));
                def.implicit_keys.push(key.to_string());
            }
        }

        let previous = def.associations.get(name).cloned();
        if let Some(previous) = &previous {
            event!(
                Level::WARN,
                class,
                association = name,
                previous = %previous.macro_kind,
                current = %macro_kind,
                "association redeclared; replacing previous definition"
            );
            assoc.nested = previous.nested;
        }

        def.associations.insert(name.to_string(), Arc::new(assoc));
        if let Some(stale) = previous.as_deref().and_then(local_key) {
            drop_unclaimed_key(def, stale);
        }
        Ok(())
    }

    pub fn accepts_nested_attributes_for(&mut self, class: &str, names: &[&str]) -> Result<()> {
        let def = self.class_mut(class)?;
        for name in names {
            let assoc = def.associations.get_mut(*name).ok_or_else(|| {
                OdmError::invalid_declaration(
                    class,
                    format!("cannot accept nested attributes for unknown association '{}'", name),
                )
            })?;
            Arc::make_mut(assoc).nested = true;
        }
        Ok(())
    }

    pub fn lookup(&self, class: &str, name: &str) -> Option<&AssociationDef> {
        self.classes.get(class)?.association(name).map(Arc::as_ref)
    }

    pub fn macro_of(&self, class: &str, name: &str) -> Option<MacroKind> {
        self.classes.get(class)?.macro_of(name)
    }

    /// Validate cross-class references and freeze the registry.
    ///
    /// Foreign-side keys are added to their target classes here, so a target
    /// may be declared after the class pointing at it.
    pub fn seal(mut self) -> Result<Schema> {
        let mut foreign_keys: Vec<(String, String)> = Vec::new();

        for def in self.classes.values() {
            for field in def.fields.values() {
                if let Some(class) = object_class(&field.data_type) {
                    if !self.classes.contains_key(class) {
                        return Err(OdmError::invalid_declaration(
                            &def.name,
                            format!("field '{}' refers to unknown class '{}'", field.name, class),
                        ));
                    }
                }
            }
            for assoc in def.associations.values() {
                if !self.classes.contains_key(&assoc.target) {
                    return Err(OdmError::invalid_declaration(
                        &def.name,
                        format!(
                            "association '{}' targets unknown class '{}'",
                            assoc.name, assoc.target
                        ),
                    ));
                }
                if assoc.macro_kind.is_referenced() && assoc.key_side == KeySide::Foreign {
                    foreign_keys.push((assoc.target.clone(), assoc.key().to_string()));
                }
            }
        }

        for (target, key) in foreign_keys {
            if let Some(def) = self.classes.get_mut(&target) {
                if !def.fields.contains_key(&key) {
                    event!(Level::DEBUG, class = %target, field = %key, "foreign key field added");
                    def.fields.insert(key.clone(), Field::new(key, DataType::Text));
                }
            }
        }

        event!(Level::INFO, classes = self.classes.len(), "schema sealed");
        Ok(Schema::from_classes(self.classes))
    }

    fn class_mut(&mut self, class: &str) -> Result<&mut ClassDef> {
        self.classes
            .get_mut(class)
            .ok_or_else(|| OdmError::ClassNotFound(class.to_string()))
    }
}

fn local_key(assoc: &AssociationDef) -> Option<&str> {
    (assoc.macro_kind.is_referenced() && assoc.key_side == KeySide::Local).then(|| assoc.key())
}

/// Remove an implicit key field once no association keeps its key there.
fn drop_unclaimed_key(def: &mut ClassDef, key: &str) {
    let claimed = def.associations.values().any(|a| local_key(a) == Some(key));
    if claimed || def.key_fields.iter().any(|k| k == key) {
        return;
    }
    if let Some(pos) = def.implicit_keys.iter().position(|k| k == key) {
        def.implicit_keys.remove(pos);
        def.fields.shift_remove(key);
        event!(Level::DEBUG, class = %def.name, field = key, "implicit key field dropped");
    }
}

fn object_class(data_type: &DataType) -> Option<&str> {
    match data_type {
        DataType::Object(class) => Some(class),
        DataType::Array(inner) => object_class(inner),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_declaration_without_inverse_is_rejected() {
        let mut registry = Registry::new();
        registry
            .declare_class(ClassSpec::new("Person").field("title", DataType::Text))
            .unwrap();
        let err = registry
            .declare_class(ClassSpec::new("Person").owned_one("name", AssociationOptions::new()))
            .unwrap_err();
        assert!(matches!(err, OdmError::InvalidDeclaration { ref class, .. } if class == "Person"));
        // the failed declaration left the class as it was
        assert_eq!(registry.macro_of("Person", "name"), None);
    }

    #[test]
    fn local_key_adds_field_to_declaring_class() {
        let mut registry = Registry::new();
        registry
            .declare_class(ClassSpec::new("Person").referenced_one(
                "employer",
                AssociationOptions::new().key_side(KeySide::Local),
            ))
            .unwrap();
        registry.declare_class(ClassSpec::new("Employer")).unwrap();
        let schema = registry.seal().unwrap();
        assert_eq!(schema.field_type("Person", "employer_id"), Some(DataType::Text));
        assert_eq!(schema.field_type("Employer", "person_id"), None);
    }

    #[test]
    fn redeclaring_local_key_drops_the_stale_key_field() {
        let mut registry = Registry::new();
        registry
            .declare_class(
                ClassSpec::new("Person")
                    .field("boss_id", DataType::Text)
                    .referenced_one("employer", AssociationOptions::new().key_side(KeySide::Local))
                    .referenced_one(
                        "manager",
                        AssociationOptions::new()
                            .class_name("Employer")
                            .key_side(KeySide::Local)
                            .foreign_key("boss_id"),
                    ),
            )
            .unwrap();
        registry.declare_class(ClassSpec::new("Employer")).unwrap();

        registry
            .declare_association(
                "Person",
                "employer",
                MacroKind::ReferencedOne,
                AssociationOptions::new().key_side(KeySide::Local).foreign_key("company_id"),
            )
            .unwrap();
        // hand-declared fields stay even when their association moves away
        registry
            .declare_association(
                "Person",
                "manager",
                MacroKind::ReferencedOne,
                AssociationOptions::new().class_name("Employer"),
            )
            .unwrap();

        let schema = registry.seal().unwrap();
        assert_eq!(schema.field_type("Person", "employer_id"), None);
        assert_eq!(schema.field_type("Person", "company_id"), Some(DataType::Text));
        assert_eq!(schema.field_type("Person", "boss_id"), Some(DataType::Text));
        assert_eq!(schema.field_type("Employer", "person_id"), Some(DataType::Text));
    }

    #[test]
    fn redeclaration_replaces_and_keeps_nested_flag() {
        let mut registry = Registry::new();
        registry
            .declare_class(
                ClassSpec::new("Person")
                    .owned_many("addresses", AssociationOptions::new().inverse_name("addressable"))
                    .accepts_nested_attributes_for(&["addresses"]),
            )
            .unwrap();
        registry
            .declare_association(
                "Person",
                "addresses",
                MacroKind::OwnedMany,
                AssociationOptions::new().inverse_name("owner"),
            )
            .unwrap();
        let assoc = registry.lookup("Person", "addresses").unwrap();
        assert_eq!(assoc.inverse_name.as_deref(), Some("owner"));
        assert!(assoc.nested);
    }

    #[test]
    fn nested_authorization_requires_known_association() {
        let mut registry = Registry::new();
        let err = registry
            .declare_class(ClassSpec::new("Person").accepts_nested_attributes_for(&["pets"]))
            .unwrap_err();
        assert!(matches!(err, OdmError::InvalidDeclaration { .. }));
    }

    #[test]
    fn nested_authorization_may_precede_the_association() {
        let mut registry = Registry::new();
        registry
            .declare_class(
                ClassSpec::new("Person")
                    .accepts_nested_attributes_for(&["addresses"])
                    .owned_many("addresses", AssociationOptions::new().inverse_name("addressable")),
            )
            .unwrap();
        assert!(registry.lookup("Person", "addresses").unwrap().nested);
    }

    #[test]
    fn incompatible_default_is_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .declare_class(
                ClassSpec::new("Person").field_with_default("age", DataType::Integer, "old"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("age"));
    }

    #[test]
    fn key_fields_must_be_declared() {
        let mut registry = Registry::new();
        assert!(
            registry
                .declare_class(ClassSpec::new("Person").key(&["first_name"]))
                .is_err()
        );
        registry
            .declare_class(
                ClassSpec::new("Person")
                    .field("first_name", DataType::Text)
                    .key(&["first_name"]),
            )
            .unwrap();
    }

    #[test]
    fn seal_rejects_unknown_targets() {
        let mut registry = Registry::new();
        registry
            .declare_class(
                ClassSpec::new("Person").referenced_many("posts", AssociationOptions::new()),
            )
            .unwrap();
        let err = registry.seal().unwrap_err();
        assert!(err.to_string().contains("Post"));
    }

    #[test]
    fn field_and_association_names_do_not_clash() {
        let mut registry = Registry::new();
        let err = registry
            .declare_class(
                ClassSpec::new("Person")
                    .field("name", DataType::Text)
                    .owned_one("name", AssociationOptions::new().inverse_name("person")),
            )
            .unwrap_err();
        assert!(matches!(err, OdmError::InvalidDeclaration { .. }));
    }
}
