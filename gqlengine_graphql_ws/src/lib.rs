#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod client_message;
mod server_message;
mod util;

use std::{
    collections::HashMap, convert::Infallible, error::Error, pin::Pin, sync::Arc, time::Duration,
};

use derive_more::with_trait::Debug;
use futures::{
    Sink, Stream,
    channel::oneshot,
    future::{self, BoxFuture, Either, Future, FutureExt as _},
    stream::{self, BoxStream, SelectAll, StreamExt as _},
    task::{Context as TaskContext, Poll, Waker},
};
use gqlengine::{Context, Engine, http::GraphQLRequest, subscription::Subscriptions};

pub use self::{
    client_message::{ClientMessage, InitPayload, StartPayload},
    server_message::{ConnectionErrorPayload, ServerMessage},
};

/// ConnectionConfig is used to configure the connection once the client sends the ConnectionInit
/// message.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Base [`Context`] every operation of the connection is executed with.
    pub context: Context,

    /// Maximum number of in-flight operations that a connection can have.
    ///
    /// Zero means no limit.
    pub max_in_flight_operations: usize,

    /// Interval at which keep-alives are sent.
    ///
    /// Zero disables keep-alives.
    pub keep_alive_interval: Duration,
}

impl ConnectionConfig {
    /// Constructs the configuration required for a connection to be accepted.
    pub fn new(context: Context) -> Self {
        Self {
            context,
            max_in_flight_operations: 0,
            keep_alive_interval: Duration::from_secs(15),
        }
    }

    /// Specifies the maximum number of in-flight operations that a connection can have. If this
    /// number is exceeded, attempting to start more will result in an error. By default, there is
    /// no limit to in-flight operations.
    #[must_use]
    pub fn with_max_in_flight_operations(mut self, max: usize) -> Self {
        self.max_in_flight_operations = max;
        self
    }

    /// Specifies the interval at which to send keep-alives. Specifying a zero duration will
    /// disable keep-alives. By default, keep-alives are sent every 15 seconds.
    #[must_use]
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Replaces the base [`Context`] of the connection.
    #[must_use]
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(Context::new())
    }
}

impl Init for ConnectionConfig {
    type Error = Infallible;
    type Future = future::Ready<Result<Self, Self::Error>>;

    fn init(self, _payload: InitPayload) -> Self::Future {
        future::ready(Ok(self))
    }
}

/// Init defines the requirements for types that can provide connection configurations when
/// ConnectionInit messages are received. Implementations are provided for `ConnectionConfig`,
/// [`AuthToken`] and closures that meet the requirements.
pub trait Init: Unpin + Send + 'static {
    /// The error that is returned on failure. The formatted error will be used as the contents of
    /// the "message" field sent back to the client.
    type Error: Error;

    /// The future configuration type.
    type Future: Future<Output = Result<ConnectionConfig, Self::Error>> + Send + 'static;

    /// Returns a future for the configuration to use.
    fn init(self, payload: InitPayload) -> Self::Future;
}

impl<F, Fut, E> Init for F
where
    F: FnOnce(InitPayload) -> Fut + Unpin + Send + 'static,
    Fut: Future<Output = Result<ConnectionConfig, E>> + Send + 'static,
    E: Error,
{
    type Error = E;
    type Future = Fut;

    fn init(self, payload: InitPayload) -> Fut {
        self(payload)
    }
}

/// [`Init`] authenticating a connection by the `authToken` of its ConnectionInit message.
///
/// The callback receives the token, empty if the client sent none, and returns the base
/// [`Context`] of the connection. A failure rejects the connection with its message.
#[derive(Clone, Debug)]
pub struct AuthToken<F> {
    config: ConnectionConfig,
    #[debug(skip)]
    auth: F,
}

impl<F> AuthToken<F> {
    /// Authenticates connections with the given `auth` callback, configuring the accepted ones
    /// with the given `config`, whose [`Context`] is replaced by the authenticated one.
    pub fn new(config: ConnectionConfig, auth: F) -> Self {
        Self { config, auth }
    }
}

impl<F, Fut, E> Init for AuthToken<F>
where
    F: FnOnce(String) -> Fut + Unpin + Send + 'static,
    Fut: Future<Output = Result<Context, E>> + Send + 'static,
    E: Error + Send + 'static,
{
    type Error = E;
    type Future = BoxFuture<'static, Result<ConnectionConfig, E>>;

    fn init(self, payload: InitPayload) -> Self::Future {
        let Self { config, auth } = self;
        auth(payload.auth_token.unwrap_or_default())
            .map(move |res| res.map(|context| config.with_context(context)))
            .boxed()
    }
}

enum Reaction {
    ServerMessage(ServerMessage),
    EndStream,
}

impl Reaction {
    /// Converts the reaction into a one-item stream.
    fn into_stream(self) -> BoxStream<'static, Self> {
        stream::once(future::ready(self)).boxed()
    }
}

enum ConnectionState<I: Init> {
    /// PreInit is the state before a ConnectionInit message has been accepted.
    PreInit {
        init: I,
        engine: Arc<Engine>,
        subscriptions: Subscriptions,
    },
    /// Active is the state after a ConnectionInit message has been accepted.
    Active {
        config: Arc<ConnectionConfig>,
        stoppers: HashMap<String, oneshot::Sender<()>>,
        engine: Arc<Engine>,
        subscriptions: Subscriptions,
    },
    /// Terminated is the state after a ConnectionInit message has been rejected.
    Terminated,
}

impl<I: Init> ConnectionState<I> {
    // Each message we receive results in a stream of zero or more reactions. For example, a
    // ConnectionTerminate message results in a one-item stream with the EndStream reaction.
    async fn handle_message(self, msg: ClientMessage) -> (Self, BoxStream<'static, Reaction>) {
        if let ClientMessage::ConnectionTerminate = msg {
            tracing::debug!("connection terminated by the client");
            let subscriptions = match &self {
                Self::Active { subscriptions, .. } => Some(subscriptions.clone()),
                Self::PreInit { .. } | Self::Terminated => None,
            };
            if let Some(subscriptions) = subscriptions {
                subscriptions.stop_all().await;
            }
            return (self, Reaction::EndStream.into_stream());
        }

        match self {
            Self::PreInit {
                init,
                engine,
                subscriptions,
            } => match msg {
                ClientMessage::ConnectionInit { payload } => match init.init(payload).await {
                    Ok(config) => {
                        tracing::debug!("connection accepted");
                        let reactions = Self::acknowledge(config.keep_alive_interval);
                        (
                            Self::Active {
                                config: Arc::new(config),
                                stoppers: HashMap::new(),
                                engine,
                                subscriptions,
                            },
                            reactions,
                        )
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "connection rejected");
                        (
                            Self::Terminated,
                            stream::iter(vec![
                                Reaction::ServerMessage(ServerMessage::ConnectionError {
                                    payload: ConnectionErrorPayload {
                                        message: e.to_string(),
                                    },
                                }),
                                Reaction::EndStream,
                            ])
                            .boxed(),
                        )
                    }
                },
                _ => (
                    Self::PreInit {
                        init,
                        engine,
                        subscriptions,
                    },
                    stream::empty().boxed(),
                ),
            },
            Self::Active {
                config,
                mut stoppers,
                engine,
                subscriptions,
            } => {
                let reactions = match msg {
                    ClientMessage::Start { id, payload } => {
                        // Prune the stoppers of finished operations before accounting the new one.
                        stoppers.retain(|_, tx| !tx.is_canceled());

                        if stoppers.contains_key(&id) {
                            tracing::debug!(id = %id, "operation id already in flight");
                            stream::empty().boxed()
                        } else if config.max_in_flight_operations > 0
                            && stoppers.len() >= config.max_in_flight_operations
                        {
                            stream::iter(vec![
                                Reaction::ServerMessage(ServerMessage::Error {
                                    id: id.clone(),
                                    payload: vec![gqlengine::async_graphql::ServerError::new(
                                        "Too many in-flight operations.",
                                        None,
                                    )],
                                }),
                                Reaction::ServerMessage(ServerMessage::Complete { id }),
                            ])
                            .boxed()
                        } else {
                            tracing::debug!(id = %id, "starting operation");

                            // Create a channel that we can use to cancel the operation.
                            let (tx, rx) = oneshot::channel::<()>();
                            _ = stoppers.insert(id.clone(), tx);

                            let request = GraphQLRequest::new(
                                payload.query,
                                payload.operation_name,
                                payload.variables,
                            )
                            .into_request();
                            let responses = engine.execute_stream(
                                request,
                                config.context.clone(),
                                Some(subscriptions.slot(id.clone())),
                            );
                            let s = {
                                let id = id.clone();
                                responses.map(move |response| {
                                    Reaction::ServerMessage(ServerMessage::response(
                                        id.clone(),
                                        response,
                                    ))
                                })
                            };

                            // Combine this with our oneshot channel so that the stream ends if
                            // the oneshot is ever fired or dropped.
                            let s = stream::unfold((rx, s.boxed()), |(rx, mut s)| async move {
                                let next = match future::select(rx, s.next()).await {
                                    Either::Left(_) => None,
                                    Either::Right((r, rx)) => r.map(|r| (r, rx)),
                                };
                                next.map(|(r, rx)| (r, (rx, s)))
                            });

                            // Once the stream ends, send the Complete message.
                            s.chain(
                                Reaction::ServerMessage(ServerMessage::Complete { id })
                                    .into_stream(),
                            )
                            .boxed()
                        }
                    }
                    ClientMessage::Stop { id } => {
                        tracing::debug!(id = %id, "stopping operation");
                        let live = stoppers.remove(&id).is_some_and(|tx| !tx.is_canceled());
                        _ = subscriptions.stop(&id).await;
                        if live {
                            // The dropped stopper ends the operation stream, which completes it.
                            stream::empty().boxed()
                        } else {
                            Reaction::ServerMessage(ServerMessage::Complete { id }).into_stream()
                        }
                    }
                    _ => stream::empty().boxed(),
                };
                (
                    Self::Active {
                        config,
                        stoppers,
                        engine,
                        subscriptions,
                    },
                    reactions,
                )
            }
            Self::Terminated => (self, stream::empty().boxed()),
        }
    }

    /// Acknowledges an accepted connection, followed by the keep-alives, if any.
    fn acknowledge(keep_alive_interval: Duration) -> BoxStream<'static, Reaction> {
        let ack = Reaction::ServerMessage(ServerMessage::ConnectionAck).into_stream();
        if keep_alive_interval.is_zero() {
            return ack;
        }
        ack.chain(Reaction::ServerMessage(ServerMessage::ConnectionKeepAlive).into_stream())
            .chain(stream::unfold((), move |()| async move {
                tokio::time::sleep(keep_alive_interval).await;
                Some((
                    Reaction::ServerMessage(ServerMessage::ConnectionKeepAlive),
                    (),
                ))
            }))
            .boxed()
    }
}

enum ConnectionSinkState<I: Init> {
    Ready {
        state: ConnectionState<I>,
    },
    HandlingMessage {
        result: BoxFuture<'static, (ConnectionState<I>, BoxStream<'static, Reaction>)>,
    },
    Closing {
        teardown: BoxFuture<'static, ()>,
    },
    Closed,
}

/// Implements the graphql-ws protocol. This is a sink for `TryInto<ClientMessage>` and a stream
/// of `ServerMessage`.
///
/// Closing the sink, or dropping the connection, tears down all its subscriptions.
#[derive(Debug)]
pub struct Connection<I: Init> {
    #[debug(skip)]
    reactions: SelectAll<BoxStream<'static, Reaction>>,
    #[debug(skip)]
    stream_waker: Option<Waker>,
    #[debug(skip)]
    sink_state: ConnectionSinkState<I>,
    subscriptions: Subscriptions,
}

impl<I: Init> Connection<I> {
    /// Creates a new connection, which is a sink for `TryInto<ClientMessage>` and a stream of
    /// `ServerMessage`.
    ///
    /// The `engine` must be initialized.
    ///
    /// The `init` argument is used to provide the context and additional configuration for
    /// connections. This can be a `ConnectionConfig` if the context and configuration are already
    /// known, an [`AuthToken`] authenticating the client, or a closure that gets executed
    /// asynchronously when the client sends the ConnectionInit message.
    pub fn new(engine: Arc<Engine>, init: I) -> Self {
        let subscriptions = Subscriptions::new();
        Self {
            reactions: SelectAll::new(),
            stream_waker: None,
            sink_state: ConnectionSinkState::Ready {
                state: ConnectionState::PreInit {
                    init,
                    engine,
                    subscriptions: subscriptions.clone(),
                },
            },
            subscriptions,
        }
    }

    /// Live subscriptions of this connection.
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    fn is_closing(&self) -> bool {
        matches!(
            self.sink_state,
            ConnectionSinkState::Closing { .. } | ConnectionSinkState::Closed,
        )
    }
}

impl<I, T> Sink<T> for Connection<I>
where
    T: TryInto<ClientMessage>,
    T::Error: Error,
    I: Init,
{
    type Error = Infallible;

    fn poll_ready(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        match &mut self.sink_state {
            ConnectionSinkState::Ready { .. } => Poll::Ready(Ok(())),
            ConnectionSinkState::HandlingMessage { result } => match result.as_mut().poll(cx) {
                Poll::Ready((state, reactions)) => {
                    self.reactions.push(reactions);
                    self.sink_state = ConnectionSinkState::Ready { state };
                    if let Some(waker) = self.stream_waker.take() {
                        waker.wake();
                    }
                    Poll::Ready(Ok(()))
                }
                Poll::Pending => Poll::Pending,
            },
            ConnectionSinkState::Closing { .. } | ConnectionSinkState::Closed => {
                panic!("poll_ready called after close")
            }
        }
    }

    fn start_send(self: Pin<&mut Self>, item: T) -> Result<(), Self::Error> {
        let s = self.get_mut();
        let state = &mut s.sink_state;
        *state = match std::mem::replace(state, ConnectionSinkState::Closed) {
            ConnectionSinkState::Ready { state } => match item.try_into() {
                Ok(msg) => ConnectionSinkState::HandlingMessage {
                    result: state.handle_message(msg).boxed(),
                },
                Err(e) => {
                    // If we weren't able to parse the message, send back an error.
                    tracing::debug!(error = %e, "malformed client message");
                    s.reactions.push(
                        Reaction::ServerMessage(ServerMessage::ConnectionError {
                            payload: ConnectionErrorPayload {
                                message: e.to_string(),
                            },
                        })
                        .into_stream(),
                    );
                    if let Some(waker) = s.stream_waker.take() {
                        waker.wake();
                    }
                    ConnectionSinkState::Ready { state }
                }
            },
            _ => panic!("start_send called when not ready"),
        };
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        <Self as Sink<T>>::poll_ready(self, cx)
    }

    fn poll_close(
        mut self: Pin<&mut Self>,
        cx: &mut TaskContext<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        if !self.is_closing() {
            tracing::debug!("connection closed");
            let subscriptions = self.subscriptions.clone();
            self.sink_state = ConnectionSinkState::Closing {
                teardown: async move { subscriptions.stop_all().await }.boxed(),
            };
            if let Some(waker) = self.stream_waker.take() {
                // Wake up the stream so it can close too.
                waker.wake();
            }
        }
        if let ConnectionSinkState::Closing { teardown } = &mut self.sink_state {
            if teardown.as_mut().poll(cx).is_pending() {
                return Poll::Pending;
            }
            self.sink_state = ConnectionSinkState::Closed;
        }
        Poll::Ready(Ok(()))
    }
}

impl<I: Init> Stream for Connection<I> {
    type Item = ServerMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.stream_waker = Some(cx.waker().clone());

        if self.is_closing() {
            return Poll::Ready(None);
        }

        // Poll the reactions for new outgoing messages.
        if !self.reactions.is_empty() {
            match Pin::new(&mut self.reactions).poll_next(cx) {
                Poll::Ready(Some(reaction)) => match reaction {
                    Reaction::ServerMessage(msg) => return Poll::Ready(Some(msg)),
                    Reaction::EndStream => return Poll::Ready(None),
                },
                Poll::Ready(None) => {
                    // In rare cases, the reaction stream may terminate. For example, this will
                    // happen if the first message we receive does not require any reaction. Just
                    // recreate it in that case.
                    self.reactions = SelectAll::new();
                }
                Poll::Pending => {}
            }
        }
        Poll::Pending
    }
}

impl<I: Init> Drop for Connection<I> {
    fn drop(&mut self) {
        if matches!(self.sink_state, ConnectionSinkState::Closed) {
            return;
        }
        // Teardown handlers are async, so they can only run on a live runtime.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let subscriptions = self.subscriptions.clone();
            drop(runtime.spawn(async move { subscriptions.stop_all().await }));
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        io,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use futures::{sink::SinkExt, stream::StreamExt as _};
    use gqlengine::{Feedback, Options};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    /// Engine with a `user` query reading the connection's context, and a `ticks` subscription
    /// pushing a single value on subscribe.
    fn new_test_engine(feedbacks: Arc<Mutex<Vec<Feedback>>>) -> Arc<Engine> {
        let mut engine = Engine::new(Options::default());
        _ = engine.query("answer", || async { 42_i32 });
        _ = engine.query("user", |ctx: Context| async move {
            ctx.get::<String>().unwrap_or_default()
        });
        _ = engine.subscription("ticks", move |fb: Feedback| {
            let feedbacks = feedbacks.clone();
            async move {
                fb.send_data(1_i32).unwrap();
                feedbacks.lock().unwrap().push(fb);
                0_i32
            }
        });
        engine.init().unwrap();
        Arc::new(engine)
    }

    fn engine() -> Arc<Engine> {
        new_test_engine(Arc::default())
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::default().with_keep_alive_interval(Duration::from_secs(0))
    }

    fn start(id: &str, query: &str) -> ClientMessage {
        ClientMessage::Start {
            id: id.into(),
            payload: StartPayload {
                query: query.into(),
                variables: None,
                operation_name: None,
            },
        }
    }

    fn init() -> ClientMessage {
        ClientMessage::ConnectionInit {
            payload: InitPayload::default(),
        }
    }

    async fn next<I: Init>(conn: &mut Connection<I>) -> serde_json::Value {
        serde_json::to_value(conn.next().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_query() {
        let mut conn = Connection::new(engine(), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "{ answer }")).await.unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "data", "id": "foo", "payload": {"data": {"answer": 42}}}),
        );
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "complete", "id": "foo"}),
        );
    }

    #[tokio::test]
    async fn test_invalid_query() {
        let mut conn = Connection::new(engine(), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "{ unknown }")).await.unwrap();
        let msg = next(&mut conn).await;
        assert_eq!(msg["type"], "error");
        assert_eq!(msg["id"], "foo");
        assert!(msg["payload"].as_array().is_some_and(|e| !e.is_empty()));
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "complete", "id": "foo"}),
        );
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let feedbacks = Arc::new(Mutex::new(vec![]));
        let mut conn = Connection::new(new_test_engine(feedbacks.clone()), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "subscription { ticks }")).await.unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "data", "id": "foo", "payload": {"data": {"ticks": 1}}}),
        );
        assert!(conn.subscriptions().contains("foo"));

        conn.send(start("bar", "subscription { ticks }")).await.unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "data", "id": "bar", "payload": {"data": {"ticks": 1}}}),
        );

        conn.send(ClientMessage::Stop { id: "foo".into() })
            .await
            .unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "complete", "id": "foo"}),
        );
        assert!(!conn.subscriptions().contains("foo"));
        assert!(conn.subscriptions().contains("bar"));

        let closed = feedbacks
            .lock()
            .unwrap()
            .iter()
            .filter(|fb| fb.is_closed())
            .count();
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_close_tears_down_subscriptions() {
        let feedbacks = Arc::new(Mutex::new(vec![]));
        let mut conn = Connection::new(new_test_engine(feedbacks.clone()), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "subscription { ticks }")).await.unwrap();
        assert_eq!(next(&mut conn).await["type"], "data");

        SinkExt::<ClientMessage>::close(&mut conn).await.unwrap();

        assert!(conn.next().await.is_none());
        assert!(!conn.subscriptions().contains("foo"));
        assert!(feedbacks.lock().unwrap().iter().all(Feedback::is_closed));
    }

    #[tokio::test]
    async fn test_terminate() {
        let feedbacks = Arc::new(Mutex::new(vec![]));
        let mut conn = Connection::new(new_test_engine(feedbacks.clone()), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "subscription { ticks }")).await.unwrap();
        assert_eq!(next(&mut conn).await["type"], "data");

        conn.send(ClientMessage::ConnectionTerminate).await.unwrap();
        assert!(feedbacks.lock().unwrap().iter().all(Feedback::is_closed));
    }

    #[tokio::test]
    async fn test_stop_of_unknown_operation() {
        let mut conn = Connection::new(engine(), config());

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(ClientMessage::Stop { id: "nope".into() })
            .await
            .unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "complete", "id": "nope"}),
        );
    }

    #[tokio::test]
    async fn test_init_params_ok() {
        let mut conn = Connection::new(engine(), |payload: InitPayload| async move {
            assert_eq!(payload.extra.get("foo"), Some(&json!("bar")));
            Ok(config()) as Result<_, Infallible>
        });

        conn.send(ClientMessage::ConnectionInit {
            payload: InitPayload {
                auth_token: None,
                extra: json!({"foo": "bar"}).as_object().cloned().unwrap(),
            },
        })
        .await
        .unwrap();

        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));
    }

    #[tokio::test]
    async fn test_init_params_error() {
        let mut conn = Connection::new(engine(), |_: InitPayload| async move {
            Err::<ConnectionConfig, _>(io::Error::other("init error"))
        });

        conn.send(init()).await.unwrap();

        assert_eq!(
            next(&mut conn).await,
            json!({"type": "connection_error", "payload": {"message": "init error"}}),
        );
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn test_auth_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let auth = AuthToken::new(config(), move |token: String| async move {
            _ = counter.fetch_add(1, Ordering::SeqCst);
            if token == "secret" {
                Ok(Context::new().with(String::from("alice")))
            } else {
                Err(io::Error::other("invalid token"))
            }
        });
        let mut conn = Connection::new(engine(), auth);

        conn.send(ClientMessage::ConnectionInit {
            payload: InitPayload {
                auth_token: Some("secret".into()),
                ..InitPayload::default()
            },
        })
        .await
        .unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("me", "{ user }")).await.unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "data", "id": "me", "payload": {"data": {"user": "alice"}}}),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_auth_token_rejected() {
        let auth = AuthToken::new(config(), |_: String| async move {
            Err::<Context, _>(io::Error::other("invalid token"))
        });
        let mut conn = Connection::new(engine(), auth);

        conn.send(init()).await.unwrap();

        assert_eq!(
            next(&mut conn).await,
            json!({"type": "connection_error", "payload": {"message": "invalid token"}}),
        );
        assert!(conn.next().await.is_none());
    }

    #[tokio::test]
    async fn test_max_in_flight_operations() {
        let mut conn = Connection::new(
            engine(),
            ConnectionConfig::default()
                .with_keep_alive_interval(Duration::from_secs(0))
                .with_max_in_flight_operations(1),
        );

        conn.send(init()).await.unwrap();
        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));

        conn.send(start("foo", "subscription { ticks }")).await.unwrap();
        assert_eq!(next(&mut conn).await["type"], "data");

        conn.send(start("bar", "subscription { ticks }")).await.unwrap();
        assert_eq!(
            next(&mut conn).await,
            json!({
                "type": "error",
                "id": "bar",
                "payload": [{"message": "Too many in-flight operations."}],
            }),
        );
        assert_eq!(
            next(&mut conn).await,
            json!({"type": "complete", "id": "bar"}),
        );
    }

    #[tokio::test]
    async fn test_keep_alives() {
        let mut conn = Connection::new(
            engine(),
            ConnectionConfig::default().with_keep_alive_interval(Duration::from_millis(20)),
        );

        conn.send(init()).await.unwrap();

        assert_eq!(next(&mut conn).await, json!({"type": "connection_ack"}));
        for _ in 0..3 {
            assert_eq!(next(&mut conn).await, json!({"type": "ka"}));
        }
    }

    #[tokio::test]
    async fn test_malformed_message() {
        let mut conn = Connection::new(engine(), config());

        conn.send(r#"{"type": "unknown"}"#).await.unwrap();

        assert_eq!(next(&mut conn).await["type"], "connection_error");
    }
}
