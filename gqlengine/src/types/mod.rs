//! Capability contracts a native type may implement, and the machinery classifying native types
//! against them.

mod capability;
mod markers;
pub(crate) mod unwrap;

use std::{any::Any, fmt, sync::Arc};

use crate::{
    Value,
    reflect::{Dynamic, NativeType, Reflect},
};

pub use self::{
    capability::{
        Capability, CapabilityImpl, CapabilityTable, Classifier, EnumItemShape, EnumVTable,
        InputVTable, InterfaceVTable, ObjectVTable, Receiver, RequestContextVTable,
        ResponseContextVTable, ScalarVTable, UnionVTable,
    },
    markers::{IsGraphQLArguments, IsGraphQLInput, IsGraphQLInterface, IsGraphQLObject, Upload},
    unwrap::{UnwrappedInfo, unwrap},
};

/// Boxed error returned by request and response context hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Struct exposed as a GraphQL object type.
pub trait Object: Reflect {
    /// Description of the object type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }

    /// Interfaces this object implements.
    fn interfaces() -> Vec<NativeType> {
        vec![]
    }

    /// Redirects the field walk to a delegate type.
    fn delegation() -> Option<Delegation> {
        None
    }
}

/// Projection of an object onto the delegate type its fields are taken from.
#[derive(Clone)]
pub struct Delegation {
    target: fn() -> NativeType,
    project: Arc<dyn Fn(&(dyn Any + Send + Sync)) -> Option<Dynamic> + Send + Sync>,
}

impl Delegation {
    /// Delegates the fields of `T` to the `D` value computed by `project`.
    pub fn new<T, D, F>(project: F) -> Self
    where
        T: Reflect,
        D: Reflect,
        F: Fn(&T) -> D + Send + Sync + 'static,
    {
        Self {
            target: D::native,
            project: Arc::new(move |outer| {
                outer
                    .downcast_ref::<T>()
                    .map(|o| project(o).into_dynamic())
            }),
        }
    }

    /// Returns the shape of the delegate type.
    pub fn target(&self) -> NativeType {
        (self.target)()
    }

    /// Projects the erased outer value onto the delegate.
    pub fn project(&self, outer: &(dyn Any + Send + Sync)) -> Option<Dynamic> {
        (self.project)(outer)
    }
}

impl fmt::Debug for Delegation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegation")
            .field("target", &self.target())
            .finish_non_exhaustive()
    }
}

/// Struct exposed as a GraphQL input object type.
pub trait Input: Reflect {
    /// Description of the input object type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }
}

/// Value of a GraphQL enum.
#[derive(Clone, Debug)]
pub struct EnumValue<T> {
    /// GraphQL name of the value.
    pub name: String,

    /// Native value.
    pub value: T,

    /// Description of the value.
    pub description: Option<String>,

    /// Deprecation reason of the value.
    pub deprecation: Option<String>,
}

impl<T> EnumValue<T> {
    /// Creates a new [`EnumValue`].
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
            deprecation: None,
        }
    }

    /// Sets the description of this value.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks this value as deprecated.
    #[must_use]
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation = Some(reason.into());
        self
    }
}

/// Type exposed as a GraphQL enum.
pub trait Enum: Reflect + PartialEq {
    /// Description of the enum type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }

    /// Mapping of GraphQL names to native values.
    fn values() -> Vec<EnumValue<Self>>;
}

/// Type exposed as a custom GraphQL scalar.
pub trait Scalar: Reflect {
    /// Description of the scalar type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }

    /// Serializes this value for a response.
    fn serialize(&self) -> Value;

    /// Parses a value received in variables.
    fn parse_value(value: &Value) -> Result<Self, String>;

    /// Parses a value written inline in a document.
    fn parse_literal(value: &Value) -> Result<Self, String> {
        Self::parse_value(value)
    }
}

/// Struct exposed as a GraphQL interface type.
///
/// Objects declare their interfaces via [`Object::interfaces()`].
pub trait Interface: Reflect {
    /// Description of the interface type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }
}

/// Enum exposed as a GraphQL union of object types.
pub trait Union: Reflect {
    /// Description of the union type.
    fn description() -> String;

    /// Overrides the type name, which defaults to the native type name.
    fn name() -> Option<String> {
        None
    }

    /// Member object types.
    fn members() -> Vec<NativeType>;

    /// Projects this value onto the member it holds.
    fn into_member(self) -> Dynamic;
}

/// Newtype exposed as the GraphQL `ID` scalar.
///
/// Its representation must be an integer or a string.
pub trait Id: Reflect {}

/// Struct whose fields define the arguments of a field.
pub trait Arguments: Reflect {}

/// Context value constructed from every incoming HTTP request.
pub trait RequestContext: Reflect {
    /// Builds the context out of the request head.
    fn from_request(parts: &http::request::Parts) -> Result<Self, BoxError>;
}

/// Context value which, when returned by a resolver, is merged into the request context and
/// written into the HTTP response once execution finishes.
pub trait ResponseContext: Reflect {
    /// Writes this context into the response headers.
    fn finalize(&self, headers: &mut http::HeaderMap) -> Result<(), BoxError>;
}

/// Opaque value pairing a subscription's subscribe and unsubscribe handlers.
pub trait SubscriptionSession: Reflect {}
