use serde::Deserialize;
use serde_json::{Map, Value as Json};

use crate::util::default_for_null;

/// The payload of a client's "connection_init" message.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct InitPayload {
    /// Token the connection is authenticated with, if any.
    #[serde(rename = "authToken", default)]
    pub auth_token: Option<String>,

    /// Any other parameter sent by the client.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// The payload for a client's "start" message. This triggers execution of a query, mutation, or
/// subscription.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartPayload {
    /// The document body.
    pub query: String,

    /// The optional variables.
    #[serde(default)]
    pub variables: Option<Json>,

    /// The optional operation name (required if the document contains multiple operations).
    #[serde(default)]
    pub operation_name: Option<String>,
}

/// ClientMessage defines the message types that clients can send.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// ConnectionInit is sent by the client upon connecting.
    ConnectionInit {
        /// Optional parameters sent from the client, holding the `authToken`.
        #[serde(default, deserialize_with = "default_for_null")]
        payload: InitPayload,
    },
    /// Start messages are used to execute a GraphQL operation.
    Start {
        /// The id of the operation. It must be unique among the in-flight operations of the
        /// connection, otherwise the message is ignored.
        id: String,

        /// The query, variables, and operation name.
        payload: StartPayload,
    },
    /// Stop messages are used to unsubscribe from a subscription.
    Stop {
        /// The id of the operation to stop.
        id: String,
    },
    /// ConnectionTerminate is used to terminate the connection.
    ConnectionTerminate,
}

impl TryFrom<&str> for ClientMessage {
    type Error = serde_json::Error;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        serde_json::from_str(text)
    }
}

impl TryFrom<String> for ClientMessage {
    type Error = serde_json::Error;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        Self::try_from(text.as_str())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_deserialization() {
        assert_eq!(
            ClientMessage::ConnectionInit {
                payload: InitPayload {
                    auth_token: Some("secret".into()),
                    extra: json!({"foo": "bar"}).as_object().cloned().unwrap(),
                },
            },
            serde_json::from_str(
                r#"{"type": "connection_init", "payload": {"authToken": "secret", "foo": "bar"}}"#,
            )
            .unwrap(),
        );

        assert_eq!(
            ClientMessage::ConnectionInit {
                payload: InitPayload::default(),
            },
            serde_json::from_str(r#"{"type": "connection_init"}"#).unwrap(),
        );

        assert_eq!(
            ClientMessage::ConnectionInit {
                payload: InitPayload::default(),
            },
            serde_json::from_str(r#"{"type": "connection_init", "payload": null}"#).unwrap(),
        );

        assert_eq!(
            ClientMessage::Start {
                id: "foo".into(),
                payload: StartPayload {
                    query: "query MyQuery { __typename }".into(),
                    variables: Some(json!({"foo": "bar"})),
                    operation_name: Some("MyQuery".into()),
                },
            },
            serde_json::from_str(
                r#"{"type": "start", "id": "foo", "payload": {
                "query": "query MyQuery { __typename }",
                "variables": {
                    "foo": "bar"
                },
                "operationName": "MyQuery"
            }}"#
            )
            .unwrap(),
        );

        assert_eq!(
            ClientMessage::Start {
                id: "foo".into(),
                payload: StartPayload {
                    query: "query MyQuery { __typename }".into(),
                    variables: None,
                    operation_name: None,
                },
            },
            serde_json::from_str(
                r#"{"type": "start", "id": "foo", "payload": {
                "query": "query MyQuery { __typename }"
            }}"#
            )
            .unwrap(),
        );

        assert_eq!(
            ClientMessage::Stop { id: "foo".into() },
            ClientMessage::try_from(r#"{"type": "stop", "id": "foo"}"#).unwrap(),
        );

        assert_eq!(
            ClientMessage::ConnectionTerminate,
            ClientMessage::try_from(r#"{"type": "connection_terminate"}"#).unwrap(),
        );
    }

    #[test]
    fn test_unknown_type() {
        assert!(ClientMessage::try_from(r#"{"type": "subscribe", "id": "foo"}"#).is_err());
    }
}
