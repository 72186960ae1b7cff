//! Types and traits for extracting data from requests.

use std::sync::Arc;

use axum::{
    Form, Json, RequestExt as _,
    body::Body,
    extract::{FromRef, FromRequest, Multipart, Query},
    http::{HeaderValue, Method, Request, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use gqlengine::{
    Engine,
    async_graphql::BatchRequest,
    http::{
        GraphQLBatchRequest, GraphQLRequest,
        upload::{FilePart, UploadMap, bind_uploads},
    },
};

use crate::response::reject;

/// Extractor for [`axum`] to extract a [`EngineRequest`]: a single request or a batch of them,
/// with their uploaded files bound to their variables.
///
/// It accepts:
/// - `GET` requests with a query string;
/// - `POST` requests with an `application/json`, `application/graphql` or
///   `application/x-www-form-urlencoded` body;
/// - `POST` requests with a `multipart/form-data` body, holding `operations`, `map` and the
///   file parts, up to [`Options::multipart_parsing_buffer_size()`] bytes.
///
/// A request failing to decode is rejected with `400 Bad Request`.
///
/// [`Options::multipart_parsing_buffer_size()`]: gqlengine::Options::multipart_parsing_buffer_size
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use axum::{Router, extract::State, routing::post};
/// use gqlengine::{Context, Engine, Options};
/// use gqlengine_axum::{extract::EngineRequest, response::EngineResponse};
///
/// async fn graphql(
///     State(engine): State<Arc<Engine>>,
///     EngineRequest(request): EngineRequest,
/// ) -> EngineResponse {
///     let (response, _) = engine.execute_batch(request, Context::new()).await;
///     EngineResponse::new(response.into())
/// }
///
/// let mut engine = Engine::new(Options::default());
/// _ = engine.query("answer", || async { 42_i32 });
/// engine.init().unwrap();
///
/// let app: Router = Router::new()
///     .route("/graphql", post(graphql))
///     .with_state(Arc::new(engine));
/// ```
#[derive(Debug)]
pub struct EngineRequest(pub BatchRequest);

impl<S> FromRequest<S> for EngineRequest
where
    S: Send + Sync,
    Arc<Engine>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request(mut req: Request<Body>, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .map(HeaderValue::to_str)
            .transpose()
            .map_err(|_| {
                reject(
                    StatusCode::BAD_REQUEST,
                    "`Content-Type` header is not a valid HTTP header string",
                )
            })?
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_owned());

        match (req.method(), content_type.as_deref()) {
            (&Method::GET, _) => req
                .extract_parts::<Query<GraphQLRequest>>()
                .await
                .map(|query| Self::single(query.0))
                .map_err(|e| {
                    reject(
                        StatusCode::BAD_REQUEST,
                        format!("Invalid request query string: {e}"),
                    )
                }),
            (&Method::POST, Some("application/json")) => {
                Json::<GraphQLBatchRequest>::from_request(req, state)
                    .await
                    .map(|req| Self(req.0.into_batch_request()))
                    .map_err(|e| {
                        reject(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {e}"))
                    })
            }
            (&Method::POST, Some("application/graphql")) => String::from_request(req, state)
                .await
                .map(|body| Self::single(GraphQLRequest::new(body, None, None)))
                .map_err(|_| reject(StatusCode::BAD_REQUEST, "Not valid UTF-8 body")),
            (&Method::POST, Some("application/x-www-form-urlencoded")) => {
                Form::<GraphQLRequest>::from_request(req, state)
                    .await
                    .map(|form| Self::single(form.0))
                    .map_err(|e| {
                        reject(StatusCode::BAD_REQUEST, format!("Invalid form body: {e}"))
                    })
            }
            (&Method::POST, Some("multipart/form-data")) => {
                let limit = Arc::<Engine>::from_ref(state)
                    .options()
                    .multipart_parsing_buffer_size();
                let multipart = Multipart::from_request(req, state).await.map_err(|e| {
                    reject(
                        StatusCode::BAD_REQUEST,
                        format!("Invalid multipart body: {e}"),
                    )
                })?;
                multipart_request(multipart, limit).await.map(Self)
            }
            (&Method::POST, _) => Err(reject(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "`Content-Type` header is expected to be either `application/json`, \
                 `application/graphql`, `application/x-www-form-urlencoded` or \
                 `multipart/form-data`",
            )),
            _ => Err(reject(
                StatusCode::METHOD_NOT_ALLOWED,
                "HTTP method is expected to be either GET or POST",
            )),
        }
    }
}

impl EngineRequest {
    fn single(request: GraphQLRequest) -> Self {
        Self(BatchRequest::Single(request.into_request()))
    }
}

/// Decodes the `operations`, the `map` and the file parts of a multipart body, reading at most
/// `limit` bytes.
async fn multipart_request(
    mut multipart: Multipart,
    limit: usize,
) -> Result<BatchRequest, Response> {
    let bad_request = |msg: String| reject(StatusCode::BAD_REQUEST, msg);

    let mut operations = None;
    let mut map = UploadMap::new();
    let mut files = vec![];
    let mut read = 0;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        let filename = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToOwned::to_owned);
        let content: Bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Invalid multipart field `{name}`: {e}")))?;

        read += content.len();
        if read > limit {
            return Err(reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("Multipart body exceeds {limit} bytes"),
            ));
        }

        match name.as_str() {
            "operations" => {
                operations = Some(
                    serde_json::from_slice::<GraphQLBatchRequest>(&content)
                        .map_err(|e| bad_request(format!("Invalid `operations` field: {e}")))?,
                );
            }
            "map" => {
                map = serde_json::from_slice(&content)
                    .map_err(|e| bad_request(format!("Invalid `map` field: {e}")))?;
            }
            _ => files.push(FilePart {
                filename: filename.unwrap_or_else(|| name.clone()),
                name,
                content_type,
                content,
            }),
        }
    }

    let mut batch = operations
        .ok_or_else(|| bad_request("Missing `operations` field".into()))?
        .into_batch_request();
    bind_uploads(&mut batch, &map, &files).map_err(|e| bad_request(e.to_string()))?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use axum::http::Request;
    use gqlengine::Options;

    use super::*;

    fn engine() -> Arc<Engine> {
        Arc::new(Engine::new(
            Options::default().with_multipart_parsing_buffer_size(128),
        ))
    }

    async fn extract(request: Request<Body>) -> Result<BatchRequest, Response> {
        EngineRequest::from_request(request, &engine())
            .await
            .map(|r| r.0)
    }

    fn single(batch: BatchRequest) -> gqlengine::async_graphql::Request {
        match batch {
            BatchRequest::Single(request) => request,
            BatchRequest::Batch(_) => panic!("expected a single request"),
        }
    }

    #[tokio::test]
    async fn convert_get_request() {
        // /?query={ add(a: 2, b: 3) }&variables={"x":1}
        let request = Request::get(
            "/?query=%7B%20add%28a%3A%202%2C%20b%3A%203%29%20%7D&variables=%7B%22x%22%3A1%7D",
        )
        .body(Body::empty())
        .unwrap();

        let request = single(extract(request).await.unwrap());
        assert_eq!(request.query, "{ add(a: 2, b: 3) }");
        assert_eq!(
            request.variables.into_value().into_json().unwrap(),
            serde_json::json!({"x": 1}),
        );
    }

    #[tokio::test]
    async fn convert_simple_post_request() {
        let request = Request::post("/")
            .header("content-type", "application/json; charset=utf-8")
            .body(Body::from(r#"{ "query": "{ add(a: 2, b: 3) }"}"#))
            .unwrap();

        assert_eq!(
            single(extract(request).await.unwrap()).query,
            "{ add(a: 2, b: 3) }",
        );
    }

    #[tokio::test]
    async fn convert_batch_post_request() {
        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from(r#"[{"query": "{ a }"}, {"query": "{ b }"}]"#))
            .unwrap();

        assert!(matches!(
            extract(request).await.unwrap(),
            BatchRequest::Batch(requests) if requests.len() == 2,
        ));
    }

    #[tokio::test]
    async fn convert_graphql_post_request() {
        let request = Request::post("/")
            .header("content-type", "application/graphql")
            .body(Body::from("{ add(a: 2, b: 3) }"))
            .unwrap();

        assert_eq!(
            single(extract(request).await.unwrap()).query,
            "{ add(a: 2, b: 3) }",
        );
    }

    #[tokio::test]
    async fn convert_form_post_request() {
        let request = Request::post("/")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from("query=%7B%20a%20%7D&operationName=A"))
            .unwrap();

        let request = single(extract(request).await.unwrap());
        assert_eq!(request.query, "{ a }");
        assert_eq!(request.operation_name.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn rejects_malformed_requests() {
        let request = Request::post("/")
            .header("content-type", "application/json")
            .body(Body::from("{"))
            .unwrap();
        assert_eq!(
            extract(request).await.unwrap_err().status(),
            StatusCode::BAD_REQUEST,
        );

        let request = Request::post("/")
            .header("content-type", "text/plain")
            .body(Body::from("{ a }"))
            .unwrap();
        assert_eq!(
            extract(request).await.unwrap_err().status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        );

        let request = Request::put("/").body(Body::empty()).unwrap();
        assert_eq!(
            extract(request).await.unwrap_err().status(),
            StatusCode::METHOD_NOT_ALLOWED,
        );
    }

    fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (name, filename, content) in parts {
            body.push_str("--BOUNDARY\r\n");
            match filename {
                Some(filename) => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: text/plain\r\n\r\n",
                )),
                None => body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n",
                )),
            }
            body.push_str(content);
            body.push_str("\r\n");
        }
        body.push_str("--BOUNDARY--\r\n");
        Request::post("/")
            .header("content-type", "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn binds_multipart_uploads() {
        let request = multipart(&[
            (
                "operations",
                None,
                r#"{"query": "q", "variables": {"file": null}}"#,
            ),
            ("map", None, r#"{"0": ["variables.file"]}"#),
            ("0", Some("a.txt"), "hi"),
        ]);

        let request = single(extract(request).await.unwrap());
        assert_eq!(request.uploads.len(), 1);
        assert_eq!(request.uploads[0].filename, "a.txt");
        assert_eq!(request.uploads[0].content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn rejects_unmatched_multipart_paths() {
        let request = multipart(&[
            ("operations", None, r#"{"query": "q"}"#),
            ("map", None, r#"{"0": ["variables.file"]}"#),
            ("0", Some("a.txt"), "hi"),
        ]);

        assert_eq!(
            extract(request).await.unwrap_err().status(),
            StatusCode::BAD_REQUEST,
        );
    }

    #[tokio::test]
    async fn limits_multipart_size() {
        let request = multipart(&[
            ("operations", None, r#"{"query": "q", "variables": {"file": null}}"#),
            ("map", None, r#"{"0": ["variables.file"]}"#),
            ("0", Some("a.txt"), &"x".repeat(100)),
        ]);

        assert_eq!(
            extract(request).await.unwrap_err().status(),
            StatusCode::PAYLOAD_TOO_LARGE,
        );
    }
}
