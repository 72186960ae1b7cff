//! Schema types built out of native types, and their registry.

pub(crate) mod fields;
pub mod meta;
mod registry;
pub(crate) mod translate;

pub use self::{
    meta::{
        Argument, ArgumentsMeta, Builtin, DeprecationStatus, EnumMeta, Field, FieldType,
        InputObjectMeta, InterfaceMeta, MetaType, Named, ObjectMeta, Role, ScalarMeta, UnionMeta,
    },
    registry::{Catalog, ContextHook, Registry, TypeKey},
};
pub(crate) use self::{fields::RESULT_CHECKERS, meta::Access};
