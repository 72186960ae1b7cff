use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use axum::{Router, http::request::Parts, routing::get};
use futures::{SinkExt as _, StreamExt as _};
use gqlengine::{BoxError, Context, Engine, Feedback, Options, Reflect, RequestContext};
use gqlengine_axum::subscriptions;
use gqlengine_graphql_ws::{AuthToken, ConnectionConfig};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest as _, http::HeaderValue},
};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Debug, Default, Reflect)]
#[gql(request_context)]
struct Agent {
    name: String,
}

impl RequestContext for Agent {
    fn from_request(parts: &Parts) -> Result<Self, BoxError> {
        let name = parts
            .headers
            .get("user-agent")
            .map(|v| v.to_str())
            .transpose()?
            .unwrap_or_default()
            .to_owned();
        Ok(Self { name })
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("invalid token")]
struct InvalidToken;

fn new_engine() -> Arc<Engine> {
    let mut engine = Engine::new(Options::default());
    _ = engine.query("agent", |agent: Agent| async move { agent.name });
    _ = engine.query("user", |ctx: Context| async move {
        ctx.get::<String>().unwrap_or_default()
    });
    _ = engine.subscription("ticks", |fb: Feedback| async move {
        for i in 1..=3_i32 {
            fb.send_data(i).unwrap();
        }
        fb.close().await;
        0_i32
    });
    engine.init().unwrap();
    Arc::new(engine)
}

#[derive(Clone)]
struct TestApp(Router);

impl TestApp {
    fn new() -> Self {
        let config = ConnectionConfig::default().with_keep_alive_interval(Duration::from_secs(0));
        Self(
            Router::new()
                .route("/subscriptions", get(subscriptions::graphql_ws(config)))
                .with_state(new_engine()),
        )
    }

    fn with_auth() -> Self {
        let config = ConnectionConfig::default().with_keep_alive_interval(Duration::from_secs(0));
        let init = AuthToken::new(config, |token: String| async move {
            if token == "letmein" {
                Ok(Context::new().with("alice".to_owned()))
            } else {
                Err(InvalidToken)
            }
        });
        Self(
            Router::new()
                .route("/subscriptions", get(subscriptions::graphql_ws(init)))
                .with_state(new_engine()),
        )
    }

    async fn connect(self) -> WebSocket {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        _ = tokio::spawn(async move {
            axum::serve(listener, self.0).await.unwrap();
        });

        let mut req = format!("ws://{addr}/subscriptions")
            .into_client_request()
            .unwrap();
        _ = req
            .headers_mut()
            .insert("sec-websocket-protocol", HeaderValue::from_static("graphql-ws"));
        _ = req
            .headers_mut()
            .insert("user-agent", HeaderValue::from_static("test-agent"));
        let (websocket, resp) = connect_async(req).await.unwrap();
        assert_eq!(resp.headers()["sec-websocket-protocol"], "graphql-ws");
        websocket
    }
}

async fn send(websocket: &mut WebSocket, msg: Value) -> Result<(), anyhow::Error> {
    websocket
        .send(Message::Text(msg.to_string().into()))
        .await
        .map_err(|e| anyhow!("Could not send message: {e}"))
}

async fn receive(websocket: &mut WebSocket) -> Result<Value, anyhow::Error> {
    let message = tokio::time::timeout(Duration::from_secs(5), websocket.next())
        .await
        .map_err(|e| anyhow!("Timed out receiving message. Elapsed: {e}"))?;

    match message {
        None => Err(anyhow!("No message received")),
        Some(Err(e)) => Err(anyhow!("WebSocket error: {e:?}")),
        Some(Ok(Message::Text(text))) => {
            serde_json::from_str(&text).map_err(|e| anyhow!("Serde error: {e:?}"))
        }
        Some(Ok(message)) => Err(anyhow!("Expected text message, received: {message:?}")),
    }
}

#[tokio::test]
async fn test_query_over_websocket() -> Result<(), anyhow::Error> {
    let mut ws = TestApp::new().connect().await;

    send(&mut ws, json!({"type": "connection_init", "payload": {}})).await?;
    assert_eq!(receive(&mut ws).await?, json!({"type": "connection_ack"}));

    send(
        &mut ws,
        json!({"type": "start", "id": "1", "payload": {"query": "{ agent }"}}),
    )
    .await?;
    assert_eq!(
        receive(&mut ws).await?,
        json!({"type": "data", "id": "1", "payload": {"data": {"agent": "test-agent"}}}),
    );
    assert_eq!(
        receive(&mut ws).await?,
        json!({"type": "complete", "id": "1"}),
    );

    Ok(())
}

#[tokio::test]
async fn test_subscription_over_websocket() -> Result<(), anyhow::Error> {
    let mut ws = TestApp::new().connect().await;

    send(&mut ws, json!({"type": "connection_init"})).await?;
    assert_eq!(receive(&mut ws).await?, json!({"type": "connection_ack"}));

    send(
        &mut ws,
        json!({"type": "start", "id": "sub", "payload": {"query": "subscription { ticks }"}}),
    )
    .await?;
    for i in 1..=3 {
        assert_eq!(
            receive(&mut ws).await?,
            json!({"type": "data", "id": "sub", "payload": {"data": {"ticks": i}}}),
        );
    }
    assert_eq!(
        receive(&mut ws).await?,
        json!({"type": "complete", "id": "sub"}),
    );

    Ok(())
}

#[tokio::test]
async fn test_auth_token() -> Result<(), anyhow::Error> {
    let mut ws = TestApp::with_auth().connect().await;

    send(
        &mut ws,
        json!({"type": "connection_init", "payload": {"authToken": "letmein"}}),
    )
    .await?;
    assert_eq!(receive(&mut ws).await?, json!({"type": "connection_ack"}));

    send(
        &mut ws,
        json!({"type": "start", "id": "1", "payload": {"query": "{ user agent }"}}),
    )
    .await?;
    assert_eq!(
        receive(&mut ws).await?,
        json!({
            "type": "data",
            "id": "1",
            "payload": {"data": {"user": "alice", "agent": "test-agent"}},
        }),
    );

    Ok(())
}

#[tokio::test]
async fn test_auth_token_rejected() -> Result<(), anyhow::Error> {
    let mut ws = TestApp::with_auth().connect().await;

    send(
        &mut ws,
        json!({"type": "connection_init", "payload": {"authToken": "nope"}}),
    )
    .await?;
    assert_eq!(
        receive(&mut ws).await?,
        json!({"type": "connection_error", "payload": {"message": "invalid token"}}),
    );

    Ok(())
}
