//! Translation of the frozen schema types into the types of the execution engine.

use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, InputObject, InputValue, Interface, InterfaceField,
    Object, Scalar, Type, Union,
};

use super::meta::{
    Argument, DeprecationStatus, EnumMeta, InputObjectMeta, InterfaceMeta, MetaType, ObjectMeta,
    ScalarMeta, UnionMeta,
};
use crate::engine::{Runtime, settle};

/// Translates every type of the [`Runtime`]'s catalog, in registration order.
pub(crate) fn types(runtime: &Arc<Runtime>) -> Vec<Type> {
    runtime
        .catalog
        .iter()
        .map(|(_, meta)| match &**meta {
            MetaType::Object(meta) => object(runtime, meta).into(),
            MetaType::Interface(meta) => interface(meta).into(),
            MetaType::InputObject(meta) => input_object(meta).into(),
            MetaType::Enum(meta) => enumeration(meta).into(),
            MetaType::Scalar(meta) => scalar(meta).into(),
            MetaType::Union(meta) => union(meta).into(),
        })
        .collect()
}

/// Translates an argument or an input object field.
pub(crate) fn input_value(arg: &Argument) -> InputValue {
    let mut value = InputValue::new(arg.name.as_str(), arg.arg_type.type_ref());
    if let Some(desc) = &arg.description {
        value = value.description(desc.as_str());
    }
    if let Some(default) = &arg.default_value {
        value = value.default_value(default.clone());
    }
    if let DeprecationStatus::Deprecated(reason) = &arg.deprecation_status {
        value = value.deprecation(reason.as_deref());
    }
    value
}

fn object(runtime: &Arc<Runtime>, meta: &ObjectMeta) -> Object {
    let mut object = Object::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        object = object.description(desc.as_str());
    }
    for iface in &meta.interface_names {
        object = object.implement(iface.as_str());
    }
    for field in &meta.fields {
        let resolver = runtime.field_resolvers.get(&(field.owner.id(), field.ident));
        if field.need_resolver && resolver.is_none() {
            tracing::warn!(
                object = %meta.name,
                field = %field.name,
                "no resolver bound to the field, reading it from the struct",
            );
        }

        let shared = Arc::new(field.clone());
        let rt = runtime.clone();
        let mut out = Field::new(field.name.as_str(), field.field_type.type_ref(), move |ctx| {
            let rt = rt.clone();
            let field = shared.clone();
            FieldFuture::new(async move {
                let result = rt.resolve_field(&ctx, &field).await;
                settle(&ctx, Some(&field.field_type), result)
            })
        });
        if let Some(desc) = &field.description {
            out = out.description(desc.as_str());
        }
        if let DeprecationStatus::Deprecated(reason) = &field.deprecation_status {
            out = out.deprecation(reason.as_deref());
        }
        if let Some(arguments) = resolver
            .filter(|_| field.need_resolver)
            .and_then(|r| r.arguments())
        {
            for arg in &arguments.arguments {
                out = out.argument(input_value(arg));
            }
        }
        object = object.field(out);
    }
    object
}

fn interface(meta: &InterfaceMeta) -> Interface {
    let mut iface = Interface::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        iface = iface.description(desc.as_str());
    }
    for field in &meta.fields {
        let mut out = InterfaceField::new(field.name.as_str(), field.field_type.type_ref());
        if let Some(desc) = &field.description {
            out = out.description(desc.as_str());
        }
        if let DeprecationStatus::Deprecated(reason) = &field.deprecation_status {
            out = out.deprecation(reason.as_deref());
        }
        iface = iface.field(out);
    }
    iface
}

fn input_object(meta: &InputObjectMeta) -> InputObject {
    let mut object = InputObject::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        object = object.description(desc.as_str());
    }
    for field in &meta.input_fields {
        object = object.field(input_value(field));
    }
    object
}

fn enumeration(meta: &EnumMeta) -> Enum {
    let mut out = Enum::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        out = out.description(desc.as_str());
    }
    for value in &meta.values {
        let mut item = EnumItem::new(value.name.as_str());
        if let Some(desc) = &value.description {
            item = item.description(desc.as_str());
        }
        if let Some(reason) = &value.deprecation {
            item = item.deprecation(Some(reason.as_str()));
        }
        out = out.item(item);
    }
    out
}

fn scalar(meta: &ScalarMeta) -> Scalar {
    let mut out = Scalar::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        out = out.description(desc.as_str());
    }
    let (parse_value, parse_literal) = (meta.hooks.parse_value, meta.hooks.parse_literal);
    out.validator(move |value| parse_value(value).is_ok() || parse_literal(value).is_ok())
}

fn union(meta: &UnionMeta) -> Union {
    let mut out = Union::new(meta.name.as_str());
    if let Some(desc) = &meta.description {
        out = out.description(desc.as_str());
    }
    for (_, member) in &meta.members {
        out = out.possible_type(member.as_str());
    }
    out
}
