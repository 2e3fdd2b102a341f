use std::sync::Arc;

use rustmemodm::prelude::*;
use rustmemodm::Result;

fn people_registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.declare_class(
        ClassSpec::new("Person")
            .field("title", DataType::Text)
            .owned_one("name", AssociationOptions::new().inverse_name("namable"))
            .owned_many("addresses", AssociationOptions::new().inverse_name("addressable"))
            .referenced_one("game", AssociationOptions::new())
            .referenced_many("posts", AssociationOptions::new())
            .referenced_one(
                "employer",
                AssociationOptions::new().key_side(KeySide::Local),
            ),
    )?;
    registry.declare_class(ClassSpec::new("Name").field("first_name", DataType::Text))?;
    registry.declare_class(ClassSpec::new("Address").field("street", DataType::Text))?;
    registry.declare_class(ClassSpec::new("Game").field("score", DataType::Integer))?;
    registry.declare_class(ClassSpec::new("Post").field("title", DataType::Text))?;
    registry.declare_class(ClassSpec::new("Employer").field("name", DataType::Text))?;
    Ok(registry)
}

#[test]
fn test_owned_associations_require_inverse_name() {
    for kind in [MacroKind::OwnedOne, MacroKind::OwnedMany] {
        let mut registry = Registry::new();
        registry.define_class("Person");
        let res =
            registry.declare_association("Person", "addresses", kind, AssociationOptions::new());
        match res {
            Err(OdmError::InvalidDeclaration { class, message }) => {
                assert_eq!(class, "Person");
                assert!(message.contains("inverse"));
            }
            other => panic!("Expected InvalidDeclaration, got {:?}", other),
        }
    }
}

#[test]
fn test_owned_associations_take_no_foreign_key() {
    let mut registry = Registry::new();
    let res = registry.declare_class(ClassSpec::new("Person").owned_one(
        "name",
        AssociationOptions::new()
            .inverse_name("namable")
            .foreign_key("name_id"),
    ));
    assert!(matches!(res, Err(OdmError::InvalidDeclaration { .. })));
}

#[test]
fn test_macro_reflection() -> Result<()> {
    let schema = people_registry()?.seal()?;

    assert_eq!(schema.macro_of("Person", "name"), Some(MacroKind::OwnedOne));
    assert_eq!(schema.macro_of("Person", "addresses"), Some(MacroKind::OwnedMany));
    assert_eq!(schema.macro_of("Person", "game"), Some(MacroKind::ReferencedOne));
    assert_eq!(schema.macro_of("Person", "posts"), Some(MacroKind::ReferencedMany));
    assert_eq!(schema.macro_of("Person", "title"), None);
    assert_eq!(schema.macro_of("Person", "unknown"), None);

    let addresses = schema.lookup_association("Person", "addresses").unwrap();
    assert_eq!(addresses.target, "Address");
    assert_eq!(addresses.inverse_name.as_deref(), Some("addressable"));
    Ok(())
}

#[test]
fn test_foreign_keys_are_derived_from_the_owner() -> Result<()> {
    let schema = people_registry()?.seal()?;

    let posts = schema.lookup_association("Person", "posts").unwrap();
    assert_eq!(posts.foreign_key.as_deref(), Some("person_id"));
    assert_eq!(schema.field_type("Post", "person_id"), Some(DataType::Text));
    assert_eq!(schema.field_type("Game", "person_id"), Some(DataType::Text));

    let employer = schema.lookup_association("Person", "employer").unwrap();
    assert_eq!(employer.foreign_key.as_deref(), Some("employer_id"));
    assert_eq!(schema.field_type("Person", "employer_id"), Some(DataType::Text));
    Ok(())
}

#[test]
fn test_explicit_class_and_key_override_derivation() -> Result<()> {
    let mut registry = Registry::new();
    registry.declare_class(ClassSpec::new("Person").referenced_many(
        "articles",
        AssociationOptions::new()
            .class_name("Post")
            .foreign_key("author_id"),
    ))?;
    registry.declare_class(ClassSpec::new("Post"))?;
    let schema = registry.seal()?;

    let articles = schema.lookup_association("Person", "articles").unwrap();
    assert_eq!(articles.target, "Post");
    assert_eq!(schema.field_type("Post", "author_id"), Some(DataType::Text));
    assert_eq!(schema.field_type("Post", "person_id"), None);
    Ok(())
}

#[test]
fn test_redeclaring_replaces_the_entry() -> Result<()> {
    let mut registry = people_registry()?;
    registry.declare_association(
        "Person",
        "posts",
        MacroKind::ReferencedMany,
        AssociationOptions::new().foreign_key("writer_id"),
    )?;
    assert_eq!(registry.lookup("Person", "posts").unwrap().key(), "writer_id");

    let schema = registry.seal()?;
    assert_eq!(schema.field_type("Post", "writer_id"), Some(DataType::Text));
    Ok(())
}

#[test]
fn test_referenced_many_cannot_keep_key_locally() {
    let mut registry = Registry::new();
    let res = registry.declare_class(ClassSpec::new("Person").referenced_many(
        "posts",
        AssociationOptions::new().key_side(KeySide::Local),
    ));
    assert!(matches!(res, Err(OdmError::InvalidDeclaration { .. })));
}

#[test]
fn test_global_schema_installs_once() -> Result<()> {
    let schema = people_registry()?.seal()?;
    assert!(Schema::global().is_none());

    schema.clone().install_global()?;
    assert!(matches!(schema.install_global(), Err(OdmError::SchemaInstalled)));

    let global = Schema::global().unwrap();
    assert_eq!(global.macro_of("Person", "posts"), Some(MacroKind::ReferencedMany));

    let mapper = Mapper::from_global(Arc::new(MemoryStore::new())).unwrap();
    let person = mapper.build("Person", serde_json::json!({ "title": "Sir" }))?;
    assert_eq!(person.class_name(), "Person");
    Ok(())
}
