//! Definitions for handling GraphQL subscriptions over the legacy `graphql-ws` protocol.

use std::{convert::Infallible, pin::pin, sync::Arc};

use axum::{
    extract::{
        FromRequestParts as _, Request, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::request::Parts,
    response::{IntoResponse as _, Response},
};
use derive_more::with_trait::{Display, Error};
use futures::{
    SinkExt as _, StreamExt as _, TryStreamExt as _,
    future::{self, BoxFuture, Either, FutureExt as _},
};
use gqlengine::{ContextError, Engine};
use gqlengine_graphql_ws::{Connection, ConnectionConfig, Init, InitPayload};

/// Creates a handler serving the legacy [`graphql-ws` GraphQL over WebSocket Protocol][old].
///
/// The connection is set up by the provided [`Init`], and the request contexts the handlers ask
/// for are built out of the upgrade request, overlaying its [`Context`]. The WebSocket
/// sub-protocol is taken from [`Options::ws_sub_protocol()`].
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
/// use gqlengine_axum::subscriptions;
/// use gqlengine_graphql_ws::ConnectionConfig;
///
/// let mut engine = Engine::new(Options::default());
/// _ = engine.query("answer", || async { 42_i32 });
/// engine.init().unwrap();
///
/// let app: Router = Router::new()
///     .route("/subscriptions", get(subscriptions::graphql_ws(ConnectionConfig::default())))
///     .with_state(Arc::new(engine));
/// ```
///
/// [`Context`]: gqlengine::Context
/// [`Options::ws_sub_protocol()`]: gqlengine::Options::ws_sub_protocol
/// [old]: https://github.com/apollographql/subscriptions-transport-ws/blob/v0.11.0/PROTOCOL.md
pub fn graphql_ws<I>(
    init: I,
) -> impl FnOnce(State<Arc<Engine>>, Request) -> BoxFuture<'static, Response> + Clone + Send + Sync
where
    I: Init + Clone + Sync,
{
    move |State(engine): State<Arc<Engine>>, req: Request| upgrade(engine, req, init).boxed()
}

async fn upgrade<I: Init>(engine: Arc<Engine>, req: Request, init: I) -> Response {
    let (mut parts, _body) = req.into_parts();
    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let protocol = engine.options().ws_sub_protocol().to_owned();
    ws.protocols([protocol]).on_upgrade(move |socket| {
        let init = WithRequestContext {
            init,
            engine: engine.clone(),
            parts,
        };
        serve_ws(socket, engine, init)
    })
}

/// Serves the legacy [`graphql-ws` GraphQL over WebSocket Protocol][old] on the provided
/// [`WebSocket`], until either side closes it.
///
/// Closing the socket stops every subscription still running on it.
///
/// [old]: https://github.com/apollographql/subscriptions-transport-ws/blob/v0.11.0/PROTOCOL.md
pub async fn serve_ws<I: Init>(socket: WebSocket, engine: Arc<Engine>, init: I) {
    let (ws_tx, ws_rx) = socket.split();
    let (conn_tx, conn_rx) = Connection::new(engine, init).split();

    let incoming = ws_rx
        .map_err(ServeError::Axum)
        .try_filter_map(|msg| {
            future::ready(Ok(match msg {
                Message::Text(text) => Some(text.as_str().to_owned()),
                Message::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok(),
                Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
            }))
        })
        .forward(conn_tx.sink_map_err(|e: Infallible| -> ServeError { match e {} }));

    let outgoing = conn_rx
        .map(|msg| {
            serde_json::to_string(&msg)
                .map(|text| Message::Text(text.into()))
                .map_err(ServeError::Serde)
        })
        .forward(ws_tx.sink_map_err(ServeError::Axum));

    match future::select(pin!(incoming), pin!(outgoing)).await {
        Either::Left((Err(e), _)) | Either::Right((Err(e), _)) => {
            tracing::debug!(error = %e, "WebSocket connection failed");
        }
        Either::Left((Ok(()), _)) | Either::Right((Ok(()), _)) => {}
    }
}

/// Possible errors of serving a [`WebSocket`].
#[derive(Debug, Display, Error)]
enum ServeError {
    /// Transport failure.
    #[display("WebSocket error: {_0}")]
    Axum(axum::Error),

    /// Failure to serialize a server message.
    #[display("serialization error: {_0}")]
    Serde(serde_json::Error),
}

/// [`Init`] overlaying the request contexts built out of the upgrade request over the
/// [`Context`] of the wrapped [`Init`].
///
/// [`Context`]: gqlengine::Context
struct WithRequestContext<I> {
    init: I,
    engine: Arc<Engine>,
    parts: Parts,
}

impl<I: Init> Init for WithRequestContext<I> {
    type Error = InitError<I::Error>;
    type Future = BoxFuture<'static, Result<ConnectionConfig, Self::Error>>;

    fn init(self, payload: InitPayload) -> Self::Future {
        let Self {
            init,
            engine,
            parts,
        } = self;
        init.init(payload)
            .map(move |res| -> Result<ConnectionConfig, InitError<I::Error>> {
                let config = res.map_err(InitError::Init)?;
                let context = engine
                    .request_context(&parts, config.context.clone())
                    .map_err(InitError::Context)?;
                Ok(config.with_context(context))
            })
            .boxed()
    }
}

/// Failure of [`WithRequestContext`].
#[derive(Debug, Display, Error)]
enum InitError<E> {
    #[display("{_0}")]
    Init(#[error(not(source))] E),

    #[display("{_0}")]
    Context(#[error(not(source))] ContextError),
}
