//! Resolver synthesis: binding native functions to schema fields, and marshalling values in
//! between.

mod binder;
pub(crate) mod codec;
mod handler;
mod selection;

pub use self::{
    binder::Resolver,
    handler::{Handler, Outputs, Returns},
    selection::FieldSelection,
};
pub(crate) use self::binder::{Invocation, Outcome, Site};
