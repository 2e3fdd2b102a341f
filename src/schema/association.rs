use std::fmt;

use super::inflection;

/// The four relationship kinds a class can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroKind {
    /// Single embedded child stored as a nested map in the parent.
    OwnedOne,
    /// Ordered embedded children stored as a nested list of maps in the parent.
    OwnedMany,
    /// Single independently stored document linked by a foreign key.
    ReferencedOne,
    /// Independently stored documents carrying the owner's id as foreign key.
    ReferencedMany,
}

impl MacroKind {
    pub fn is_owned(self) -> bool {
        matches!(self, Self::OwnedOne | Self::OwnedMany)
    }

    pub fn is_referenced(self) -> bool {
        !self.is_owned()
    }

    pub fn is_many(self) -> bool {
        matches!(self, Self::OwnedMany | Self::ReferencedMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OwnedOne => "owned_one",
            Self::OwnedMany => "owned_many",
            Self::ReferencedOne => "referenced_one",
            Self::ReferencedMany => "referenced_many",
        }
    }
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a referenced relation holds the foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeySide {
    /// The declaring class holds `<association>_id`.
    Local,
    /// The related class holds `<owning_class>_id`.
    #[default]
    Foreign,
}

/// Options accepted when declaring an association.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssociationOptions {
    pub class_name: Option<String>,
    pub inverse_name: Option<String>,
    pub foreign_key: Option<String>,
    pub key_side: Option<KeySide>,
}

impl AssociationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the target class (defaults to the classified association name).
    pub fn class_name(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn inverse_name(mut self, inverse_name: &str) -> Self {
        self.inverse_name = Some(inverse_name.to_string());
        self
    }

    pub fn foreign_key(mut self, foreign_key: &str) -> Self {
        self.foreign_key = Some(foreign_key.to_string());
        self
    }

    pub fn key_side(mut self, key_side: KeySide) -> Self {
        self.key_side = Some(key_side);
        self
    }
}

/// A resolved association entry of a class.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationDef {
    pub name: String,
    pub macro_kind: MacroKind,
    pub target: String,
    pub inverse_name: Option<String>,
    /// Always set for referenced kinds, never for owned ones.
    pub foreign_key: Option<String>,
    pub key_side: KeySide,
    /// Whether nested-attributes merge is authorized for this name.
    pub nested: bool,
}

impl AssociationDef {
    pub(crate) fn resolve(
        owner: &str,
        name: &str,
        macro_kind: MacroKind,
        options: AssociationOptions,
    ) -> Result<Self, String> {
        if name.is_empty() {
            return Err("association name must not be empty".to_string());
        }

        let target = options
            .class_name
            .unwrap_or_else(|| inflection::classify(name));

        if macro_kind.is_owned() {
            let inverse_name = options.inverse_name.ok_or_else(|| {
                format!(
                    "{} association '{}' must declare an inverse name",
                    macro_kind, name
                )
            })?;
            if options.foreign_key.is_some() || options.key_side.is_some() {
                return Err(format!(
                    "{} association '{}' is embedded and takes no foreign key",
                    macro_kind, name
                ));
            }
            return Ok(Self {
                name: name.to_string(),
                macro_kind,
                target,
                inverse_name: Some(inverse_name),
                foreign_key: None,
                key_side: KeySide::Foreign,
                nested: false,
            });
        }

        let key_side = options.key_side.unwrap_or_default();
        if key_side == KeySide::Local && macro_kind == MacroKind::ReferencedMany {
            return Err(format!(
                "referenced_many association '{}' cannot keep its key locally",
                name
            ));
        }
        let foreign_key = options.foreign_key.unwrap_or_else(|| match key_side {
            KeySide::Local => format!("{}_id", name),
            KeySide::Foreign => inflection::foreign_key(owner),
        });

        Ok(Self {
            name: name.to_string(),
            macro_kind,
            target,
            inverse_name: options.inverse_name,
            foreign_key: Some(foreign_key),
            key_side,
            nested: false,
        })
    }

    /// Foreign key name; empty for owned kinds.
    pub fn key(&self) -> &str {
        self.foreign_key.as_deref().unwrap_or_default()
    }
}
