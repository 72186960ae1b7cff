use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderValue, Request, StatusCode, request::Parts},
    response::Response,
    routing::get,
};
use gqlengine::{
    BoxError, Engine, IsGraphQLArguments, Options, Reflect, RequestContext, ResponseContext,
    Upload,
};
use gqlengine_axum::{graphql, preflight};
use serde_json::{Value, json};
use tower_service::Service as _;

#[derive(Clone, Reflect)]
struct AddArgs {
    _args: IsGraphQLArguments,
    a: i32,
    b: i32,
}

#[derive(Clone, Reflect)]
struct UploadArgs {
    _args: IsGraphQLArguments,
    file: Upload,
}

#[derive(Clone, Debug, Default, Reflect)]
#[gql(request_context)]
struct Session {
    token: String,
}

impl RequestContext for Session {
    fn from_request(parts: &Parts) -> Result<Self, BoxError> {
        let token = parts
            .headers
            .get("x-auth-token")
            .ok_or("missing `X-Auth-Token` header")?
            .to_str()?
            .to_owned();
        Ok(Self { token })
    }
}

#[derive(Clone, Debug, Default, Reflect)]
#[gql(response_context)]
struct Renewal {
    token: String,
}

impl ResponseContext for Renewal {
    fn finalize(&self, headers: &mut axum::http::HeaderMap) -> Result<(), BoxError> {
        _ = headers.insert("x-session", HeaderValue::from_str(&self.token)?);
        Ok(())
    }
}

struct TestApp(Router);

impl TestApp {
    fn new() -> Self {
        let mut engine = Engine::new(Options::default());
        _ = engine.query("add", |args: AddArgs| async move { args.a + args.b });
        _ = engine.mutation("upload", |args: UploadArgs| async move {
            String::from_utf8_lossy(&args.file.content).into_owned()
        });
        engine.init().unwrap();
        Self::with_engine(engine)
    }

    fn with_sessions() -> Self {
        let mut engine = Engine::new(Options::default());
        _ = engine.query("whoami", |session: Session| async move { session.token });
        _ = engine.mutation("renew", |session: Session| async move {
            let token = format!("{}-renewed", session.token);
            (true, Renewal { token })
        });
        engine.init().unwrap();
        Self::with_engine(engine)
    }

    fn with_engine(engine: Engine) -> Self {
        Self(
            Router::new()
                .route("/graphql", get(graphql).post(graphql).options(preflight))
                .with_state(Arc::new(engine)),
        )
    }

    async fn call(&self, req: Request<Body>) -> Response {
        // PANIC: Unwrapping is OK here, because routing is `Infallible`.
        self.0.clone().call(req).await.unwrap()
    }

    async fn post(&self, content_type: &str, body: impl Into<Body>) -> Response {
        let req = Request::post("/graphql")
            .header("content-type", content_type)
            .body(body.into())
            .unwrap();
        self.call(req).await
    }
}

async fn json_body(resp: Response) -> Value {
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_get_request() {
    let app = TestApp::new();

    let req = Request::get("/graphql?query=%7B%20add(a%3A%201%2C%20b%3A%202)%20%7D")
        .body(Body::empty())
        .unwrap();
    let resp = app.call(req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    assert_eq!(json_body(resp).await, json!({"data": {"add": 3}}));
}

#[tokio::test]
async fn test_post_json_with_string_variables() {
    let app = TestApp::new();

    let resp = app
        .post(
            "application/json; charset=utf-8",
            r#"{
                "query": "query($a: Int!) { add(a: $a, b: 40) }",
                "variables": "{\"a\": 2}"
            }"#,
        )
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"data": {"add": 42}}));
}

#[tokio::test]
async fn test_batch_request() {
    let app = TestApp::new();

    let resp = app
        .post(
            "application/json",
            r#"[
                {"query": "{ add(a: 1, b: 1) }"},
                {"query": "{ add(a: 2, b: 2) }"}
            ]"#,
        )
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        json_body(resp).await,
        json!([{"data": {"add": 2}}, {"data": {"add": 4}}]),
    );
}

#[tokio::test]
async fn test_graphql_errors_are_answered_ok() {
    let app = TestApp::new();

    let resp = app.post("application/graphql", "{ unknown }").await;

    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert!(body["errors"].as_array().is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_malformed_requests() {
    let app = TestApp::new();

    let resp = app.post("application/json", "{").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = app.post("text/plain", "{ add(a: 1, b: 1) }").await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_preflight() {
    let app = TestApp::new();

    let req = Request::options("/graphql").body(Body::empty()).unwrap();
    let resp = app.call(req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["access-control-allow-methods"], "POST, GET, OPTIONS");
    assert_eq!(resp.headers()["access-control-max-age"], "86400");
}

#[tokio::test]
async fn test_multipart_upload() {
    let app = TestApp::new();

    let boundary = "gqlengine-boundary";
    let body = format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"operations\"\r\n\r\n\
         {{\"query\": \"mutation($file: Upload!) {{ upload(file: $file) }}\", \
           \"variables\": {{\"file\": null}}}}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"map\"\r\n\r\n\
         {{\"0\": [\"variables.file\"]}}\r\n\
         --{boundary}\r\n\
         Content-Disposition: form-data; name=\"0\"; filename=\"hello.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello world\r\n\
         --{boundary}--\r\n",
    );
    let resp = app
        .post(&format!("multipart/form-data; boundary={boundary}"), body)
        .await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        json_body(resp).await,
        json!({"data": {"upload": "hello world"}}),
    );
}

#[tokio::test]
async fn test_request_context() {
    let app = TestApp::with_sessions();

    let req = Request::post("/graphql")
        .header("content-type", "application/json")
        .header("x-auth-token", "secret")
        .body(Body::from(r#"{"query": "{ whoami }"}"#))
        .unwrap();
    let resp = app.call(req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"data": {"whoami": "secret"}}));
}

#[tokio::test]
async fn test_failed_request_context() {
    let app = TestApp::with_sessions();

    let resp = app
        .post("application/json", r#"{"query": "{ whoami }"}"#)
        .await;

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    assert!(
        String::from_utf8_lossy(&body).contains("missing `X-Auth-Token` header"),
        "{body:?}",
    );
}

#[tokio::test]
async fn test_response_context() {
    let app = TestApp::with_sessions();

    let req = Request::post("/graphql")
        .header("content-type", "application/graphql")
        .header("x-auth-token", "secret")
        .body(Body::from("mutation { renew }"))
        .unwrap();
    let resp = app.call(req).await;

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-session"], "secret-renewed");
    assert_eq!(json_body(resp).await, json!({"data": {"renew": true}}));
}
