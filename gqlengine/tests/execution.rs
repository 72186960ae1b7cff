//! Execution of requests against synthesized resolvers.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use futures::StreamExt as _;
use gqlengine::{
    Context, Engine, Enum, EnumValue, Feedback, FieldError, FieldSelection, IsGraphQLArguments,
    IsGraphQLInput, IsGraphQLInterface, IsGraphQLObject, Object, Options, Reflect,
    RegistrationError, Scalar, SubscriptionSession, Union, Value,
    async_graphql::{PathSegment, Request, Response, Variables},
    reflect::{Dynamic, NativeType},
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::{Value as JsonValue, json};

#[derive(Clone, Debug, Reflect)]
struct Item {
    #[gql(desc = "a listed item")]
    _object: IsGraphQLObject,

    #[gql(required)]
    pub id: i32,
}

#[derive(Clone, Debug, Reflect)]
struct PageArgs {
    _args: IsGraphQLArguments,

    pub page: i32,
    pub size: i32,
}

#[derive(Clone, Debug, Reflect)]
struct AddArgs {
    _args: IsGraphQLArguments,

    pub a: i32,
    pub b: i32,
}

#[derive(Clone, Debug, Reflect)]
struct User {
    #[gql(desc = "a registered user")]
    _object: IsGraphQLObject,

    #[gql(required)]
    pub login: String,

    #[gql(need_resolver)]
    pub greeting: String,
}

#[derive(Clone, Debug, Reflect)]
#[gql(session)]
struct Ticket {
    pub id: i32,
}

impl SubscriptionSession for Ticket {}

#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
#[gql(enum)]
enum Color {
    Red,
    Green,
}

impl Enum for Color {
    fn description() -> String {
        "a traffic light color".into()
    }

    fn values() -> Vec<EnumValue<Self>> {
        vec![
            EnumValue::new("RED", Self::Red).description("stop"),
            EnumValue::new("GREEN", Self::Green),
        ]
    }
}

#[derive(Clone, Debug, Reflect)]
struct ColorArgs {
    _args: IsGraphQLArguments,

    pub color: Color,
}

#[derive(Clone, Debug, Reflect)]
struct Book {
    #[gql(desc = "a printed book")]
    _object: IsGraphQLObject,

    pub title: String,
}

#[derive(Clone, Debug, Reflect)]
#[gql(union)]
enum Hit {
    Item(Item),
    Book(Book),
}

impl Union for Hit {
    fn description() -> String {
        "a search hit".into()
    }

    fn members() -> Vec<NativeType> {
        vec![Item::native(), Book::native()]
    }

    fn into_member(self) -> Dynamic {
        match self {
            Self::Item(item) => item.into_dynamic(),
            Self::Book(book) => book.into_dynamic(),
        }
    }
}

#[derive(Clone, Debug, Reflect)]
struct Named {
    #[gql(desc = "anything with a name")]
    _interface: IsGraphQLInterface,

    pub name: String,
}

#[derive(Clone, Debug, Reflect)]
#[gql(object)]
struct Dog {
    pub name: String,
    pub good: bool,
}

impl Object for Dog {
    fn description() -> String {
        "a dog".into()
    }

    fn interfaces() -> Vec<NativeType> {
        vec![Named::native()]
    }
}

#[derive(Clone, Debug, Reflect)]
#[gql(object)]
struct Cat {
    pub lives: i32,
}

impl Object for Cat {
    fn description() -> String {
        "a cat".into()
    }

    fn interfaces() -> Vec<NativeType> {
        vec![Named::native()]
    }
}

/// Even integer, rejecting odd ones wherever they're written.
#[derive(Clone, Copy, Debug, Reflect)]
#[gql(scalar)]
struct Even(i64);

impl Scalar for Even {
    fn description() -> String {
        "an even integer".into()
    }

    fn serialize(&self) -> Value {
        Value::from(self.0)
    }

    fn parse_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .filter(|n| n % 2 == 0)
                .map(Self)
                .ok_or_else(|| format!("{n} is not even")),
            _ => Err("expected an integer".into()),
        }
    }
}

/// Code written in upper case inline, and taken as is from variables.
#[derive(Clone, Debug, Reflect)]
#[gql(scalar)]
struct Code(String);

impl Scalar for Code {
    fn description() -> String {
        "a code".into()
    }

    fn serialize(&self) -> Value {
        Value::String(self.0.clone())
    }

    fn parse_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(Self(s.clone())),
            _ => Err("expected a string".into()),
        }
    }

    fn parse_literal(value: &Value) -> Result<Self, String> {
        Self::parse_value(value).map(|code| Self(code.0.to_uppercase()))
    }
}

#[derive(Clone, Debug, Reflect)]
struct HalfArgs {
    _args: IsGraphQLArguments,

    pub n: Even,
}

#[derive(Clone, Debug, Reflect)]
struct CodeArgs {
    _args: IsGraphQLArguments,

    pub code: Code,
}

#[derive(Clone, Debug, Reflect)]
struct Filter {
    #[gql(desc = "search filter")]
    _input: IsGraphQLInput,

    pub name: String,

    #[gql(default = 10)]
    pub limit: i32,
}

#[derive(Clone, Debug, Reflect)]
struct SearchArgs {
    _args: IsGraphQLArguments,

    pub filter: Filter,
}

#[derive(Clone, Debug, Reflect)]
struct GreetArgs {
    _args: IsGraphQLArguments,

    pub word: String,
}

#[derive(Clone, Debug, Reflect)]
struct Shelf {
    #[gql(desc = "a shelf of books")]
    _object: IsGraphQLObject,

    pub label: String,
    pub books: Vec<Book>,
}

fn user(login: &str) -> User {
    User {
        _object: IsGraphQLObject,
        login: login.into(),
        greeting: String::new(),
    }
}

fn data(resp: &Response) -> JsonValue {
    assert!(resp.errors.is_empty(), "{:?}", resp.errors);
    resp.data.clone().into_json().unwrap()
}

#[tokio::test]
async fn isolates_panics() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("fine", || async { 1_i32 });
    _ = engine.query("broken", || async {
        if true {
            panic!("boom");
        }
        2_i32
    });
    engine.init().unwrap();

    let (resp, _) = engine.execute("{ fine broken }".into(), Context::new()).await;

    assert_eq!(
        resp.data.clone().into_json().unwrap(),
        json!({"fine": 1, "broken": null}),
    );
    assert_eq!(resp.errors.len(), 1);
    assert_eq!(resp.errors[0].message, "internal error");
    assert_eq!(resp.errors[0].path, [PathSegment::Field("broken".into())]);
}

#[tokio::test]
async fn nulls_failed_nullable_fields_in_place() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("me", || async { user("alice") });
    _ = engine.field_resolver::<User, _, _>("greeting", |_: User| async {
        Err::<String, _>(FieldError::from("no greeting"))
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute("{ me { login greeting } }".into(), Context::new())
        .await;

    assert_eq!(
        resp.data.clone().into_json().unwrap(),
        json!({"me": {"login": "alice", "greeting": null}}),
    );
    assert_eq!(resp.errors[0].message, "no greeting");
    assert_eq!(
        resp.errors[0].path,
        [
            PathSegment::Field("me".into()),
            PathSegment::Field("greeting".into()),
        ],
    );
}

#[tokio::test]
async fn attaches_panic_message_in_debug() {
    let mut engine = Engine::new(Options::default().with_debug(true));
    _ = engine.query("broken", || async {
        if true {
            panic!("boom");
        }
        2_i32
    });
    engine.init().unwrap();

    let (resp, _) = engine.execute("{ broken }".into(), Context::new()).await;

    assert_eq!(resp.errors[0].message, "internal error: boom");
}

#[tokio::test]
async fn propagates_native_errors() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("secret", || async {
        Err::<i32, _>(FieldError::from("access denied"))
    });
    engine.init().unwrap();

    let (resp, _) = engine.execute("{ secret }".into(), Context::new()).await;

    assert_eq!(resp.errors[0].message, "access denied");
}

#[tokio::test]
async fn binds_arguments() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("add", |args: AddArgs| async move { args.a + args.b });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute("{ add(a: 40, b: 2) }".into(), Context::new())
        .await;

    assert_eq!(data(&resp), json!({"add": 42}));
}

#[test]
fn decodes_arguments_weakly() {
    let raw = IndexMap::from([
        ("a".to_owned(), Dynamic::String("40".into())),
        ("b".to_owned(), Dynamic::Bool(true)),
        ("unknown".to_owned(), Dynamic::Int(7)),
    ]);

    let args = AddArgs::from_dynamic(Dynamic::Object(raw)).unwrap();

    assert_eq!((args.a, args.b), (40, 1));
}

#[tokio::test]
async fn composes_pagination() {
    let mut engine = Engine::new(Options::default());
    _ = engine
        .pagination("items", |args: PageArgs| async move {
            let first = (args.page - 1) * args.size;
            (first..first + args.size)
                .map(|id| Item {
                    _object: IsGraphQLObject,
                    id,
                })
                .collect::<Vec<_>>()
        })
        .total(|| async { 7_i64 });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute(
            "{ items(page: 2, size: 3) { page total list { id } } }".into(),
            Context::new(),
        )
        .await;

    assert_eq!(
        data(&resp),
        json!({"items": {
            "page": 2,
            "total": 7,
            "list": [{"id": 3}, {"id": 4}, {"id": 5}],
        }}),
    );
}

#[test]
fn rejects_paginating_non_lists() {
    let mut engine = Engine::new(Options::default());
    _ = engine
        .pagination("count", || async { 1_i32 })
        .total(|| async { 1_i32 });

    assert!(matches!(
        engine.init(),
        Err(RegistrationError::Pagination { .. }),
    ));
}

#[tokio::test]
async fn maps_enum_values_by_name() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("next", |args: ColorArgs| async move {
        match args.color {
            Color::Red => Color::Green,
            Color::Green => Color::Red,
        }
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute("{ next(color: RED) }".into(), Context::new())
        .await;
    assert_eq!(data(&resp), json!({"next": "GREEN"}));

    let (resp, _) = engine
        .execute("{ next(color: BLUE) }".into(), Context::new())
        .await;
    assert!(!resp.errors.is_empty());

    let sdl = engine.sdl().unwrap();
    assert!(sdl.contains("enum Color"), "{sdl}");
}

#[tokio::test]
async fn resolves_union_members() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("hits", || async {
        vec![
            Hit::Item(Item {
                _object: IsGraphQLObject,
                id: 1,
            }),
            Hit::Book(Book {
                _object: IsGraphQLObject,
                title: "Dune".into(),
            }),
        ]
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute(
            "{ hits { __typename ... on Item { id } ... on Book { title } } }".into(),
            Context::new(),
        )
        .await;

    assert_eq!(
        data(&resp),
        json!({"hits": [
            {"__typename": "Item", "id": 1},
            {"__typename": "Book", "title": "Dune"},
        ]}),
    );
}

#[tokio::test]
async fn implements_interfaces() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("dog", || async {
        Dog {
            name: "Rex".into(),
            good: true,
        }
    });
    engine.init().unwrap();

    let sdl = engine.sdl().unwrap();
    assert!(sdl.contains("interface Named"), "{sdl}");
    assert!(sdl.contains("type Dog implements Named"), "{sdl}");

    let (resp, _) = engine
        .execute("{ dog { ... on Named { name } good } }".into(), Context::new())
        .await;
    assert_eq!(data(&resp), json!({"dog": {"name": "Rex", "good": true}}));
}

#[test]
fn rejects_incomplete_interface_implementations() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("cat", || async { Cat { lives: 9 } });

    let err = engine.init().unwrap_err();
    assert!(
        matches!(&err, RegistrationError::Schema { message } if message.contains("\"name\"")),
        "{err}",
    );
}

#[tokio::test]
async fn validates_custom_scalars() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("half", |args: HalfArgs| async move { args.n.0 / 2 });
    engine.init().unwrap();

    let (resp, _) = engine.execute("{ half(n: 4) }".into(), Context::new()).await;
    assert_eq!(data(&resp), json!({"half": 2}));

    let (resp, _) = engine.execute("{ half(n: 3) }".into(), Context::new()).await;
    assert!(!resp.errors.is_empty());
    assert_eq!(resp.data, Value::Null);

    let request = Request::new("query($n: Even) { half(n: $n) }")
        .variables(Variables::from_json(json!({"n": 5})));
    let (resp, _) = engine.execute(request, Context::new()).await;
    assert!(!resp.errors.is_empty());
}

#[tokio::test]
async fn parses_scalar_literals_apart_from_variables() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("echo", |args: CodeArgs| async move { args.code });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute(r#"{ echo(code: "abc") }"#.into(), Context::new())
        .await;
    assert_eq!(data(&resp), json!({"echo": "ABC"}));

    let request = Request::new("query($code: Code) { echo(code: $code) }")
        .variables(Variables::from_json(json!({"code": "abc"})));
    let (resp, _) = engine.execute(request, Context::new()).await;
    assert_eq!(data(&resp), json!({"echo": "abc"}));
}

#[tokio::test]
async fn fills_input_defaults() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("search", |args: SearchArgs| async move {
        format!("{}:{}", args.filter.name, args.filter.limit)
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute(r#"{ search(filter: {name: "x"}) }"#.into(), Context::new())
        .await;
    assert_eq!(data(&resp), json!({"search": "x:10"}));

    let (resp, _) = engine
        .execute(
            r#"{ search(filter: {name: "x", limit: 3}) }"#.into(),
            Context::new(),
        )
        .await;
    assert_eq!(data(&resp), json!({"search": "x:3"}));

    let sdl = engine.sdl().unwrap();
    assert!(sdl.contains("limit: Int = 10"), "{sdl}");
}

#[tokio::test]
async fn reports_selected_fields() {
    let selections = Arc::new(Mutex::new(Vec::new()));
    let mut engine = Engine::new(Options::default());
    let seen = selections.clone();
    _ = engine.query("shelf", move |selection: FieldSelection| {
        let seen = seen.clone();
        async move {
            seen.lock().unwrap().push((
                selection.field_name().to_owned(),
                selection.is_selected(["books/title"]),
            ));
            Shelf {
                _object: IsGraphQLObject,
                label: "sf".into(),
                books: vec![],
            }
        }
    });
    engine.init().unwrap();

    _ = engine.execute("{ shelf { label } }".into(), Context::new()).await;
    _ = engine
        .execute(
            "{ shelf { ... on Shelf { books { title } } } }".into(),
            Context::new(),
        )
        .await;

    assert_eq!(
        *selections.lock().unwrap(),
        [("shelf".to_owned(), false), ("shelf".to_owned(), true)],
    );
}

#[tokio::test]
async fn passes_source_and_arguments_to_field_resolvers() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("me", || async { user("alice") });
    _ = engine.field_resolver::<User, _, _>("greeting", |args: GreetArgs, user: User| async move {
        format!("{}, {}", args.word, user.login)
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute(r#"{ me { greeting(word: "hi") } }"#.into(), Context::new())
        .await;

    assert_eq!(data(&resp), json!({"me": {"greeting": "hi, alice"}}));
}

#[tokio::test]
async fn resolves_fields_by_resolvers() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("me", || async {
        User {
            _object: IsGraphQLObject,
            login: "alice".into(),
            greeting: String::new(),
        }
    });
    _ = engine.field_resolver::<User, _, _>("greeting", |user: User| async move {
        format!("hello, {}", user.login)
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute("{ me { login greeting } }".into(), Context::new())
        .await;

    assert_eq!(
        data(&resp),
        json!({"me": {"login": "alice", "greeting": "hello, alice"}}),
    );
}

#[test]
fn rejects_mismatched_field_resolvers() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("me", || async {
        User {
            _object: IsGraphQLObject,
            login: String::new(),
            greeting: String::new(),
        }
    });
    _ = engine.field_resolver::<User, _, _>("greeting", |_: User| async { 1_i32 });

    assert!(matches!(
        engine.init(),
        Err(RegistrationError::ResultMismatch { .. }),
    ));
}

#[tokio::test]
async fn reads_context() {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("whoami", |ctx: Context| async move {
        ctx.get::<String>().unwrap_or_default()
    });
    engine.init().unwrap();

    let (resp, _) = engine
        .execute("{ whoami }".into(), Context::new().with("bob".to_owned()))
        .await;

    assert_eq!(data(&resp), json!({"whoami": "bob"}));
}

#[tokio::test]
async fn tears_subscriptions_down_once() {
    let feedbacks = Arc::new(Mutex::new(Vec::<Feedback>::new()));
    let unsubscribed = Arc::new(AtomicUsize::new(0));

    let mut engine = Engine::new(Options::default());
    _ = engine.query("ping", || async { 1_i32 });
    let stored = feedbacks.clone();
    let counter = unsubscribed.clone();
    _ = engine
        .subscription("ticks", move |fb: Feedback| {
            let stored = stored.clone();
            async move {
                fb.send_data(1_i32).unwrap();
                stored.lock().unwrap().push(fb);
                (0_i32, Ticket { id: 5 })
            }
        })
        .on_unsubscribe(move |ticket: Ticket| {
            let counter = counter.clone();
            async move {
                assert_eq!(ticket.id, 5);
                _ = counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    engine.init().unwrap();

    let mut stream = engine.execute_stream("subscription { ticks }".into(), Context::new(), None);
    let first = stream.next().await.unwrap();
    assert_eq!(data(&first), json!({"ticks": 1}));

    let fb = feedbacks.lock().unwrap()[0].clone();
    fb.close().await;
    fb.close().await;

    assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
    assert!(fb.is_closed());
    assert!(stream.next().await.is_none());
}
