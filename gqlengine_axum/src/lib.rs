#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]

pub mod extract;
pub mod response;
#[cfg(feature = "subscriptions")]
pub mod subscriptions;

use std::sync::Arc;

use axum::{
    extract::{FromRequest as _, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse as _, Response},
};
use gqlengine::{Context, Engine};

#[doc(inline)]
pub use self::response::preflight;
use self::{extract::EngineRequest, response::EngineResponse};

/// Handles a GraphQL request (or a batch of them) over HTTP.
///
/// The request head is turned into the request contexts the handlers ask for, and the response
/// contexts left after execution are written into the response headers. A failing request
/// context rejects the request with `400 Bad Request`, while a failing response context answers
/// `500 Internal Server Error`.
///
/// Requires an [`Arc`]`<`[`Engine`]`>` state.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use axum::{Router, routing::get};
/// use gqlengine::{Engine, Options};
/// use gqlengine_axum::{graphql, preflight};
///
/// let mut engine = Engine::new(Options::default());
/// _ = engine.query("answer", || async { 42_i32 });
/// engine.init().unwrap();
///
/// let app: Router = Router::new()
///     .route("/graphql", get(graphql).post(graphql).options(preflight))
///     .with_state(Arc::new(engine));
/// ```
pub async fn graphql(State(engine): State<Arc<Engine>>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let context = match engine.request_context(&parts, Context::new()) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::debug!(error = %e, "rejected request");
            return response::reject(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    let request = match EngineRequest::from_request(Request::from_parts(parts, body), &engine).await
    {
        Ok(EngineRequest(req)) => req,
        Err(rejection) => return rejection,
    };

    let (response, context) = engine.execute_batch(request, context).await;

    let mut headers = HeaderMap::new();
    let status = match engine.finalize_context(&context, &mut headers) {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "failed to finalize response contexts");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    EngineResponse::new(response.into())
        .with_status(status)
        .with_headers(headers)
        .into_response()
}
