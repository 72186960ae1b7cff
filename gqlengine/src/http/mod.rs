//! Utilities for building HTTP endpoints in a library-agnostic manner

pub mod upload;

use async_graphql::{BatchRequest, BatchResponse, Request, Response, ServerError, Variables};
use serde::{Deserialize, Serialize, de};
use serde_json::Value as Json;

/// The expected structure of the decoded JSON document for either POST or GET requests.
///
/// For POST, you can use Serde to deserialize the incoming JSON data directly
/// into this struct - it derives Deserialize for exactly this reason.
///
/// For GET, the query string deserializes into it as well: `variables` may be given as a JSON
/// string, which is decoded as a JSON document.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct GraphQLRequest {
    /// GraphQL query representing this request.
    pub query: String,

    /// Optional name of the operation associated with this request.
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,

    /// Optional variables to execute the GraphQL operation with.
    #[serde(default, deserialize_with = "deserialize_variables")]
    pub variables: Option<Json>,
}

/// Accepts the variables as a JSON object, or as a string holding one.
fn deserialize_variables<'de, D>(deserializer: D) -> Result<Option<Json>, D::Error>
where
    D: de::Deserializer<'de>,
{
    use de::Error as _;

    match Option::<Json>::deserialize(deserializer)? {
        Some(Json::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Json::String(s)) => serde_json::from_str::<Json>(&s)
            .map(|v| (!v.is_null()).then_some(v))
            .map_err(|e| D::Error::custom(format!("invalid variables: {e}"))),
        Some(Json::Null) | None => Ok(None),
        Some(v) => Ok(Some(v)),
    }
}

impl GraphQLRequest {
    /// Construct a new GraphQL request from parts
    pub fn new(query: String, operation_name: Option<String>, variables: Option<Json>) -> Self {
        Self {
            query,
            operation_name,
            variables,
        }
    }

    /// Returns operation [`Variables`] defined withing this request.
    pub fn variables(&self) -> Variables {
        self.variables
            .clone()
            .map(Variables::from_json)
            .unwrap_or_default()
    }

    /// Converts this request into the one of the execution engine.
    pub fn into_request(self) -> Request {
        let variables = self.variables();
        let mut request = Request::new(self.query).variables(variables);
        if let Some(name) = self.operation_name {
            request = request.operation_name(name);
        }
        request
    }
}

/// Simple wrapper around GraphQLRequest to allow the handling of Batch requests.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum GraphQLBatchRequest {
    /// A single operation request.
    Single(GraphQLRequest),

    /// A batch operation request.
    ///
    /// Empty batch is considered as invalid value, so cannot be deserialized.
    #[serde(deserialize_with = "deserialize_non_empty_batch")]
    Batch(Vec<GraphQLRequest>),
}

fn deserialize_non_empty_batch<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: de::Deserializer<'de>,
    T: Deserialize<'de>,
{
    use de::Error as _;

    let v = Vec::<T>::deserialize(deserializer)?;
    if v.is_empty() {
        Err(D::Error::invalid_length(
            0,
            &"non-empty batch of GraphQL requests",
        ))
    } else {
        Ok(v)
    }
}

impl GraphQLBatchRequest {
    /// Converts this request into the one of the execution engine.
    pub fn into_batch_request(self) -> BatchRequest {
        match self {
            Self::Single(req) => BatchRequest::Single(req.into_request()),
            Self::Batch(reqs) => {
                BatchRequest::Batch(reqs.into_iter().map(GraphQLRequest::into_request).collect())
            }
        }
    }

    /// The operation names of the request.
    pub fn operation_names(&self) -> Vec<Option<&str>> {
        match self {
            Self::Single(req) => vec![req.operation_name.as_deref()],
            Self::Batch(reqs) => reqs.iter().map(|r| r.operation_name.as_deref()).collect(),
        }
    }
}

/// Simple wrapper around the result from executing a GraphQL query
///
/// This struct implements Serialize, so you can simply serialize this
/// to JSON and send it over the wire.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct GraphQLResponse(pub Response);

impl GraphQLResponse {
    /// Constructs an error response outside of the normal execution flow
    pub fn error(message: impl Into<String>) -> Self {
        Self(Response::from_errors(vec![ServerError::new(
            message, None,
        )]))
    }

    /// Was the request executed without any error?
    pub fn is_ok(&self) -> bool {
        self.0.errors.is_empty()
    }
}

/// Simple wrapper around the result (GraphQLResponse) from executing a GraphQLBatchRequest
///
/// This struct implements Serialize, so you can simply serialize this
/// to JSON and send it over the wire.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GraphQLBatchResponse {
    /// Result of a single operation in a GraphQL request.
    Single(GraphQLResponse),
    /// Result of a batch operation in a GraphQL request.
    Batch(Vec<GraphQLResponse>),
}

impl GraphQLBatchResponse {
    /// Returns if all the GraphQLResponse in this operation are ok.
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Single(resp) => resp.is_ok(),
            Self::Batch(resps) => resps.iter().all(GraphQLResponse::is_ok),
        }
    }
}

impl From<BatchResponse> for GraphQLBatchResponse {
    fn from(resp: BatchResponse) -> Self {
        match resp {
            BatchResponse::Single(resp) => Self::Single(GraphQLResponse(resp)),
            BatchResponse::Batch(resps) => {
                Self::Batch(resps.into_iter().map(GraphQLResponse).collect())
            }
        }
    }
}
