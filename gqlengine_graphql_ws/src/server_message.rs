use gqlengine::{
    Value,
    async_graphql::{Response, ServerError},
    http::GraphQLResponse,
};
use serde::Serialize;

/// The payload for errors that are not associated with a GraphQL operation.
#[derive(Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionErrorPayload {
    /// The error message.
    pub message: String,
}

/// ServerMessage defines the message types that servers can send.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// ConnectionError is used for errors that are not associated with a GraphQL operation. For
    /// example, this will be used when:
    ///
    ///   * The server is unable to parse a client's message.
    ///   * The client's initialization parameters are rejected.
    ConnectionError {
        /// The error that occurred.
        payload: ConnectionErrorPayload,
    },
    /// ConnectionAck is sent in response to a client's ConnectionInit message if the server
    /// accepted a connection.
    ConnectionAck,
    /// Data contains the result of a query, mutation, or subscription event.
    Data {
        /// The id of the operation that the data is for.
        id: String,

        /// The data and errors that occurred during execution.
        payload: GraphQLResponse,
    },
    /// Error contains an error that occurs before execution, such as validation errors.
    Error {
        /// The id of the operation that triggered this error.
        id: String,

        /// The error(s).
        payload: Vec<ServerError>,
    },
    /// Complete indicates that no more data will be sent for the given operation.
    Complete {
        /// The id of the operation that has completed.
        id: String,
    },
    /// ConnectionKeepAlive is sent periodically after accepting a connection.
    #[serde(rename = "ka")]
    ConnectionKeepAlive,
}

impl ServerMessage {
    /// Wraps a `response` of the operation `id`: a response without data is an error of the
    /// whole operation.
    pub(crate) fn response(id: String, response: Response) -> Self {
        if matches!(response.data, Value::Null) && !response.errors.is_empty() {
            Self::Error {
                id,
                payload: response.errors,
            }
        } else {
            Self::Data {
                id,
                payload: GraphQLResponse(response),
            }
        }
    }
}
