//! Registration of native types into schema types.

use std::sync::Arc;

use gqlengine::{
    Capability, Engine, IsGraphQLArguments, IsGraphQLObject, Options, Reflect, RegistrationError,
    schema::{MetaType, Registry, Role},
};
use pretty_assertions::assert_eq;
use serde::Serialize;

#[derive(Clone, Reflect, Serialize)]
struct Profile {
    #[gql(desc = "a user profile")]
    #[serde(skip)]
    _object: IsGraphQLObject,

    pub user_name: String,

    #[serde(rename = "foo")]
    pub renamed: i32,

    #[serde(rename = "bar")]
    #[gql(name = "baz")]
    pub both: bool,

    #[gql(ignore)]
    pub cache: Vec<u8>,
}

#[derive(Clone, Reflect)]
struct Node {
    #[gql(desc = "a tree node")]
    _object: IsGraphQLObject,

    pub name: String,
    pub children: Vec<Node>,
}

#[derive(Clone, Reflect)]
struct Person {
    #[gql(desc = "a pet owner")]
    _object: IsGraphQLObject,

    pub pet: Option<Pet>,
}

#[derive(Clone, Reflect)]
struct Pet {
    #[gql(desc = "a pet")]
    _object: IsGraphQLObject,

    pub owners: Vec<Person>,
}

#[derive(Clone, Reflect)]
struct Undescribed {
    _object: IsGraphQLObject,

    pub id: i32,
}

#[derive(Clone, Reflect)]
struct AddArgs {
    _args: IsGraphQLArguments,

    pub a: i32,
    pub b: i32,
}

#[derive(Clone, Reflect)]
struct Thing {
    #[gql(name = "Thing", desc = "a thing")]
    _object: IsGraphQLObject,

    pub id: i32,
}

#[derive(Clone, Reflect)]
struct OtherThing {
    #[gql(name = "Thing", desc = "another thing")]
    _object: IsGraphQLObject,

    pub label: String,
}

#[derive(Clone, Reflect)]
struct Car {
    #[gql(desc = "a car")]
    _object: IsGraphQLObject,

    #[gql(embedded)]
    pub engine: Box<Motor>,
}

#[derive(Clone, Reflect)]
struct Motor {
    pub power: i32,

    #[gql(embedded)]
    pub car: Box<Car>,
}

fn object(meta: &MetaType) -> &gqlengine::schema::ObjectMeta {
    match meta {
        MetaType::Object(o) => o,
        other => panic!("expected an object, found {other:?}"),
    }
}

#[test]
fn names_fields() {
    let mut registry = Registry::new();
    let meta = registry
        .register_type(&Profile::native(), Role::Output)
        .unwrap();
    let profile = object(&meta);

    assert_eq!(&*profile.name, "Profile");
    assert_eq!(profile.description.as_deref(), Some("a user profile"));
    assert_eq!(
        profile.fields.iter().map(|f| &*f.name).collect::<Vec<_>>(),
        ["userName", "foo", "baz"],
    );
}

#[test]
fn registers_once_per_base_type() {
    let mut registry = Registry::new();
    let value = registry
        .register_type(&Profile::native(), Role::Output)
        .unwrap();
    let list = registry
        .register_type(&Vec::<Arc<Profile>>::native(), Role::Output)
        .unwrap();
    let optional = registry
        .register_type(&Option::<Profile>::native(), Role::Output)
        .unwrap();

    assert!(Arc::ptr_eq(&value, &list));
    assert!(Arc::ptr_eq(&value, &optional));
}

#[test]
fn registers_self_referencing_types() {
    let mut registry = Registry::new();
    let meta = registry
        .register_type(&Node::native(), Role::Output)
        .unwrap();
    let node = object(&meta);

    let children = node
        .fields
        .iter()
        .find(|f| &*f.name == "children")
        .unwrap();
    assert_eq!(&*children.field_type.name, "Node");
    assert!(children.field_type.is_list);
}

#[test]
fn registers_mutually_referencing_types() {
    let mut registry = Registry::new();
    let person = registry
        .register_type(&Person::native(), Role::Output)
        .unwrap();
    let pet = registry
        .register_type(&Pet::native(), Role::Output)
        .unwrap();

    assert_eq!(&*object(&person).fields[0].field_type.name, "Pet");
    assert_eq!(&*object(&pet).fields[0].field_type.name, "Person");
    assert!(Arc::ptr_eq(
        &pet,
        &registry.register_type(&Pet::native(), Role::Output).unwrap(),
    ));
}

#[test]
fn requires_marker_description() {
    let mut registry = Registry::new();

    assert!(matches!(
        registry.register_type(&Undescribed::native(), Role::Output),
        Err(RegistrationError::MissingDescription {
            capability: Capability::Object,
            ..
        }),
    ));
}

#[test]
fn rejects_duplicate_type_names() {
    let mut registry = Registry::new();
    _ = registry
        .register_type(&Thing::native(), Role::Output)
        .unwrap();

    let err = registry
        .register_type(&OtherThing::native(), Role::Output)
        .unwrap_err();
    assert_eq!(
        err,
        RegistrationError::DuplicateName {
            name: "Thing".into(),
        },
    );
    assert_eq!(err.to_string(), "duplicated GraphQL type name 'Thing'");
}

#[test]
fn rejects_embedding_loops() {
    let mut registry = Registry::new();

    assert_eq!(
        registry
            .register_type(&Car::native(), Role::Output)
            .unwrap_err(),
        RegistrationError::EmbeddingLoop {
            owner: "Motor".into(),
            field: "car".into(),
        },
    );
}

#[test]
fn rejects_duplicate_arguments() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("add", |x: AddArgs, y: AddArgs| async move { x.a + y.b });

    let err = engine.init().unwrap_err();
    assert_eq!(err, RegistrationError::DuplicateArguments { index: 1 });
    assert_eq!(err.to_string(), "more than one 'arguments' parameter[1]");
}

#[test]
fn rejects_unsupported_arguments() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("lookup", |ids: std::collections::HashMap<String, i32>| async move {
        ids.len() as i32
    });

    assert!(matches!(
        engine.init(),
        Err(RegistrationError::UnsupportedArgument { index: 0, .. }),
    ));
}

#[test]
fn exposes_sdl() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("add", |args: AddArgs| async move { args.a + args.b });
    _ = engine.query("tree", || async {
        Node {
            _object: IsGraphQLObject,
            name: "root".into(),
            children: vec![],
        }
    });
    engine.init().unwrap();

    let sdl = engine.sdl().unwrap();
    assert!(sdl.contains("add(a: Int, b: Int): Int"), "{sdl}");
    assert!(sdl.contains("type Node"), "{sdl}");
    assert!(sdl.contains("children: [Node]"), "{sdl}");
}
