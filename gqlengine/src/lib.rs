#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

// Required for using `gqlengine_codegen` macros inside this crate to resolve
// absolute `::gqlengine` path correctly, without errors.
extern crate self as gqlengine;

// These are required by the code generated via the `gqlengine_codegen` macros.
#[doc(hidden)]
pub use static_assertions as sa;
#[doc(hidden)]
pub use {async_graphql, futures};

#[doc(inline)]
pub use futures::future::BoxFuture;

// Depend on gqlengine_codegen and re-export everything in it.
// This allows users to just depend on gqlengine and get the derive
// functionality automatically.
pub use gqlengine_codegen::Reflect;

mod context;
mod engine;
mod error;
pub mod http;
mod options;
pub mod pagination;
pub mod plugin;
pub mod reflect;
pub mod resolve;
pub mod schema;
pub mod subscription;
mod tags;
mod timing;
pub mod types;
mod util;

/// Value of a GraphQL response, as produced by the execution engine.
pub use async_graphql::Value;

pub use crate::{
    context::{Context, RequestScope},
    engine::{Engine, MutationBuilder, PaginationBuilder, QueryBuilder, SubscriptionBuilder},
    error::{ContextError, ContextErrorKind, FieldError, RegistrationError},
    options::Options,
    plugin::Plugin,
    reflect::{Dynamic, Reflect},
    resolve::FieldSelection,
    subscription::{Feedback, SendError},
    types::{
        Arguments, BoxError, Capability, Delegation, Enum, EnumValue, Id, Input, Interface,
        IsGraphQLArguments, IsGraphQLInput, IsGraphQLInterface, IsGraphQLObject, Object,
        RequestContext, ResponseContext, Scalar, SubscriptionSession, Union, Upload,
    },
};

/// Result of a field resolver.
pub type FieldResult<T> = Result<T, FieldError>;
