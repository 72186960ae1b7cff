use async_graphql::ErrorExtensionValues;
use derive_more::with_trait::{Display, Error};
use itertools::Itertools as _;

use crate::Value;

/// Error of building the schema out of registered types and operations.
///
/// Fatal: it surfaces from [`Engine::init()`](crate::Engine::init) and prevents the schema from
/// being finalized.
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum RegistrationError {
    /// Type which cannot be bound at all.
    #[display("unsupported type to unwrap: {ty}")]
    UnsupportedType {
        /// Native type.
        ty: String,
    },

    /// List of lists.
    #[display("unsupported nested list: {ty}")]
    NestedList {
        /// Native type.
        ty: String,
    },

    /// Handle pointing to a list or to another handle.
    #[display("indirect reference should point to a base type: {ty}")]
    IndirectToNonBase {
        /// Native type.
        ty: String,
    },

    /// Field whose type matches none of the field checkers.
    #[display("unsupported field type '{ty}' of {owner}.{field}")]
    UnsupportedField {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
        /// Native type of the field.
        ty: String,
    },

    /// Embedded field of a non-struct type.
    #[display("embedded field {owner}.{field} should be a struct")]
    EmbeddedNonStruct {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
    },

    /// Embedded struct embedding, directly or not, one of its embedders.
    #[display("embedded field {owner}.{field} embeds its own embedder")]
    EmbeddingLoop {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
    },

    /// Parameter matching none of the parameter kinds.
    #[display("unsupported argument type [{index}]: '{ty}'")]
    UnsupportedArgument {
        /// Position of the parameter.
        index: usize,
        /// Native type of the parameter.
        ty: String,
    },

    /// Second arguments bundle.
    #[display("more than one 'arguments' parameter[{index}]")]
    DuplicateArguments {
        /// Position of the parameter.
        index: usize,
    },

    /// Arguments bundle declared as a list.
    #[display("arguments object should not be a list: {ty}")]
    ListArguments {
        /// Native type of the parameter.
        ty: String,
    },

    /// Second source object.
    #[display("more than one source argument[{index}]")]
    DuplicateSource {
        /// Position of the parameter.
        index: usize,
    },

    /// Source object outside of a field resolver.
    #[display("unexpect source argument[{index}]")]
    UnexpectedSource {
        /// Position of the parameter.
        index: usize,
    },

    /// Field resolver bound to a field without the `need_resolver` tag.
    #[display("the field need not be resolved: {owner}.{field}")]
    NoResolverNeeded {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
    },

    /// Field resolver bound to a missing field.
    #[display("no field '{field}' in {owner}")]
    UnknownField {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
    },

    /// Field resolver returning another type than the field's one.
    #[display("result type '{found}' not match with field {owner}.{field} of type '{expected}'")]
    ResultMismatch {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
        /// Native type of the field.
        expected: String,
        /// Native type of the result.
        found: String,
    },

    /// Return value matching none of the result kinds.
    #[display("unsupported resolve result[{index}]: '{ty}'")]
    UnsupportedResult {
        /// Position of the return value.
        index: usize,
        /// Native type of the return value.
        ty: String,
    },

    /// Second payload.
    #[display("more than one result[{index}]")]
    DuplicateResult {
        /// Position of the return value.
        index: usize,
    },

    /// Second context merged back.
    #[display("more than one response context result[{index}]")]
    DuplicateContextMerge {
        /// Position of the return value.
        index: usize,
    },

    /// Query or subscription without a payload.
    #[display("missing result of operation '{operation}'")]
    MissingPayload {
        /// Operation name.
        operation: String,
    },

    /// Capability marker missing its description tag.
    #[display("{capability} marker of '{ty}' misses a description")]
    MissingDescription {
        /// Native type.
        ty: String,
        /// Capability the marker declares.
        capability: crate::types::Capability,
    },

    /// Type required to implement a capability but doesn't.
    #[display("'{ty}' is not a GraphQL {capability}")]
    NotImplemented {
        /// Native type.
        ty: String,
        /// Required capability.
        capability: crate::types::Capability,
    },

    /// Type referencing itself before its name is known.
    #[display("loop-referred type '{ty}'")]
    LoopReferred {
        /// Native type.
        ty: String,
    },

    /// Struct-shaped scalar with private fields.
    #[display("scalar '{ty}' may not be serialized: field '{field}' is private")]
    NotSerializable {
        /// Native type.
        ty: String,
        /// Private field.
        field: String,
    },

    /// Identifier whose representation isn't an integer or a string.
    #[display("'{ty}' cannot be used as an ID")]
    InvalidId {
        /// Native type.
        ty: String,
    },

    /// Default value tag not parsing into the field's type.
    #[display("invalid default value \"{value}\" of {owner}.{field}: {reason}")]
    InvalidDefault {
        /// Owning type.
        owner: String,
        /// Native field identifier.
        field: String,
        /// Literal value.
        value: String,
        /// Parse failure.
        reason: String,
    },

    /// Malformed delegation.
    #[display("delegated type of '{ty}' should be an object but '{target}'")]
    InvalidDelegation {
        /// Native type.
        ty: String,
        /// Native delegate type.
        target: String,
    },

    /// Union member which isn't an object.
    #[display("member '{member}' of union '{ty}' is not an object")]
    InvalidUnionMember {
        /// Native union type.
        ty: String,
        /// Native member type.
        member: String,
    },

    /// Badly shaped pagination resolvers.
    #[display("{message}")]
    Pagination {
        /// Explanation.
        message: String,
    },

    /// Badly shaped subscription handlers.
    #[display("{message}")]
    Subscription {
        /// Explanation.
        message: String,
    },

    /// Two types exposed under the same name.
    #[display("duplicated GraphQL type name '{name}'")]
    DuplicateName {
        /// GraphQL type name.
        name: String,
    },

    /// Two operations of the same kind under the same name.
    #[display("duplicated {kind} '{name}'")]
    DuplicateOperation {
        /// Operation kind.
        kind: &'static str,
        /// Operation name.
        name: String,
    },

    /// No query declared, while the schema root needs at least one.
    #[display("at least one query is required")]
    MissingQuery,

    /// Error reported by the execution engine while finishing the schema.
    #[display("{message}")]
    Schema {
        /// Explanation.
        message: String,
    },
}

impl RegistrationError {
    pub(crate) fn subscription(message: impl Into<String>) -> Self {
        Self::Subscription {
            message: message.into(),
        }
    }

    pub(crate) fn pagination(message: impl Into<String>) -> Self {
        Self::Pagination {
            message: message.into(),
        }
    }
}

/// Error of resolving a single field.
///
/// Any [`Display`] value converts into it, so resolvers may return their own error types.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldError {
    message: String,
    extensions: Value,
}

impl<T: Display> From<T> for FieldError {
    fn from(e: T) -> Self {
        Self {
            message: e.to_string(),
            extensions: Value::Null,
        }
    }
}

impl FieldError {
    /// Constructs a new [`FieldError`] with additional data put into the `extensions` of the
    /// error object in the response.
    ///
    /// If `extensions` is [`Value::Null`], no extra data is included.
    pub fn new<T: Display>(e: T, extensions: Value) -> Self {
        Self {
            message: e.to_string(),
            extensions,
        }
    }

    /// Returns the message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the extensions of this error.
    pub fn extensions(&self) -> &Value {
        &self.extensions
    }

    pub(crate) fn internal(message: impl Display) -> Self {
        Self::new(
            message,
            Value::from_json(serde_json::json!({"code": "INTERNAL_ERROR"})).unwrap_or_default(),
        )
    }
}

impl From<FieldError> for async_graphql::Error {
    fn from(e: FieldError) -> Self {
        let extensions = match e.extensions {
            Value::Object(map) => {
                let mut values = ErrorExtensionValues::default();
                for (k, v) in map {
                    values.set(k.as_str(), v);
                }
                Some(values)
            }
            Value::Null => None,
            other => {
                let mut values = ErrorExtensionValues::default();
                values.set("data", other);
                Some(values)
            }
        };
        Self {
            message: e.message,
            source: None,
            extensions,
        }
    }
}

/// Aggregated failures of request or response context hooks.
#[derive(Clone, Debug, Display, Error, PartialEq)]
#[display("{kind}: {}", messages.iter().join(";"))]
pub struct ContextError {
    kind: ContextErrorKind,
    messages: Vec<String>,
}

impl ContextError {
    pub(crate) fn new(kind: ContextErrorKind, messages: Vec<String>) -> Self {
        Self { kind, messages }
    }

    /// Returns the individual failure messages.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

/// Stage a [`ContextError`] happened at.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ContextErrorKind {
    /// Building request contexts.
    #[display("multiple request context handling errors")]
    Request,

    /// Finalizing response contexts.
    #[display("finalize contexts errors")]
    Finalize,
}
