//! [`EngineResponse`] definition.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use gqlengine::http::GraphQLBatchResponse;

/// Wrapper around a [`GraphQLBatchResponse`], implementing [`IntoResponse`], so it can be returned
/// from [`axum`] handlers.
///
/// The response carries the permissive CORS headers, along with any header written by the
/// response contexts.
#[derive(Debug)]
pub struct EngineResponse {
    response: GraphQLBatchResponse,
    status: StatusCode,
    headers: HeaderMap,
}

impl EngineResponse {
    /// Wraps an executed `response`, answered with `200 OK`.
    pub fn new(response: GraphQLBatchResponse) -> Self {
        Self {
            response,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    /// Overrides the status code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Adds the given `headers` to the response.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }
}

impl IntoResponse for EngineResponse {
    fn into_response(self) -> Response {
        let mut resp = (self.status, self.headers, Json(self.response)).into_response();
        cors(resp.headers_mut());
        resp
    }
}

/// Answers a CORS preflight request: `200 OK` without body.
pub async fn preflight() -> Response {
    let mut resp = StatusCode::OK.into_response();
    let headers = resp.headers_mut();
    cors(headers);
    _ = headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS"),
    );
    _ = headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    resp
}

/// Rejects a request with the given `status` and plain text `message`.
pub(crate) fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    let mut resp = (status, message.into()).into_response();
    cors(resp.headers_mut());
    resp
}

fn cors(headers: &mut HeaderMap) {
    for (name, value) in [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true"),
        (
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Content-Type, X-Auth-Token, x-apollo-tracing, Authorization, Origin, \
             X-Requested-With",
        ),
        (header::ACCESS_CONTROL_EXPOSE_HEADERS, "*"),
    ] {
        _ = headers.insert(name, HeaderValue::from_static(value));
    }
}
