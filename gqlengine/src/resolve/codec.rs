//! Conversions between native [`Dynamic`] values and the values of the execution engine.

use async_graphql::{
    InputType as _, Name, Number, Pos, dynamic::FieldValue, parser::types::Field,
};
use indexmap::IndexMap;

use crate::{
    FieldError, Upload, Value,
    reflect::{Dynamic, Erased},
    schema::{Argument, Builtin, Catalog, FieldType, MetaType, Named, ObjectMeta, Role},
};

/// Encodes a native result into a value of the given schema type.
///
/// Absent values always encode into `null`, non-null checks are up to the execution engine.
pub(crate) fn encode<'a>(
    catalog: &Catalog,
    ty: &FieldType,
    value: Dynamic,
) -> Result<FieldValue<'a>, FieldError> {
    if value.is_null() {
        return Ok(FieldValue::NULL);
    }
    if ty.is_list {
        let items = value
            .weak_list()
            .into_iter()
            .map(|v| encode_named(catalog, ty.named, v))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(FieldValue::list(items));
    }
    encode_named(catalog, ty.named, value)
}

fn encode_named<'a>(
    catalog: &Catalog,
    named: Named,
    value: Dynamic,
) -> Result<FieldValue<'a>, FieldError> {
    if value.is_null() {
        return Ok(FieldValue::NULL);
    }
    let (id, role) = match named {
        Named::Builtin(b) => return Ok(FieldValue::value(builtin(b, value)?)),
        Named::Registered(id, role) => (id, role),
    };
    match catalog.get(id, role).map(|m| &**m) {
        Some(MetaType::Object(meta)) => Ok(FieldValue::owned_any(project(meta, value)?)),
        Some(MetaType::Enum(meta)) => {
            let name = meta
                .name_of(value)
                .ok_or_else(|| FieldError::from(format!("invalid value of enum {}", meta.name)))?;
            Ok(FieldValue::value(Value::Enum(Name::new(name))))
        }
        Some(MetaType::Scalar(meta)) => Ok(FieldValue::value((meta.hooks.serialize)(value)?)),
        Some(MetaType::Union(meta)) => {
            let member = (meta.into_member)(value)?;
            let member_id = member.as_erased().map(Erased::type_id);
            let (object_id, name) = meta
                .members
                .iter()
                .find(|(id, _)| Some(*id) == member_id)
                .ok_or_else(|| {
                    FieldError::from(format!("value is not a member of union {}", meta.name))
                })?;
            let Some(MetaType::Object(object)) =
                catalog.get(*object_id, Role::Output).map(|m| &**m)
            else {
                return Err(FieldError::internal(format!("unknown union member {name}")));
            };
            Ok(FieldValue::owned_any(project(object, member)?).with_type(name.to_string()))
        }
        Some(other) => Err(FieldError::internal(format!(
            "{} is not an output type",
            other.name(),
        ))),
        None => Err(FieldError::internal("unregistered output type")),
    }
}

/// Projects an object value onto its delegate, if the object type delegates its fields.
fn project(meta: &ObjectMeta, value: Dynamic) -> Result<Dynamic, FieldError> {
    let Some(delegation) = &meta.delegation else {
        return Ok(value);
    };
    value
        .as_erased()
        .and_then(|outer| delegation.project(outer.as_any()))
        .ok_or_else(|| FieldError::internal(format!("cannot delegate fields of {}", meta.name)))
}

fn builtin(builtin: Builtin, value: Dynamic) -> Result<Value, FieldError> {
    Ok(match builtin {
        Builtin::Int => match value {
            Dynamic::Uint(n) => Value::from(n),
            other => Value::from(other.weak_i64("Int")?),
        },
        Builtin::Float => {
            Number::from_f64(value.weak_f64("Float")?).map_or(Value::Null, Value::Number)
        }
        Builtin::Boolean => Value::Boolean(value.weak_bool()?),
        Builtin::String | Builtin::Id(_) => Value::String(value.weak_string()?),
        Builtin::Upload | Builtin::Void => Value::Null,
    })
}

/// Where the input values being decoded were written.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Origin<'a> {
    /// All inline in the document, or all in the variables of the request.
    Uniform {
        /// Whether the values are written inline.
        literal: bool,
    },

    /// Arguments of the field being resolved, each written either way.
    Arguments(&'a Field),
}

impl Origin<'_> {
    /// Indicates whether the named value was written inline in the document, variables
    /// included nowhere inside it.
    ///
    /// Absent values take their defaults, which are literals.
    fn is_literal(self, name: &str) -> bool {
        match self {
            Self::Uniform { literal } => literal,
            Self::Arguments(field) => field
                .get_argument(name)
                .is_none_or(|arg| arg.node.clone().into_const().is_some()),
        }
    }
}

/// Decodes an input value of the given schema type into its native representation.
///
/// Custom scalars written inline in the document are parsed by their literal hook, the ones
/// received in variables by their value hook.
pub(crate) fn decode(
    catalog: &Catalog,
    ctx: &async_graphql::Context<'_>,
    ty: &FieldType,
    value: &Value,
    literal: bool,
) -> Result<Dynamic, FieldError> {
    match value {
        Value::Null => Ok(Dynamic::Null),
        Value::List(items) if ty.is_list => items
            .iter()
            .map(|v| decode_named(catalog, ctx, ty.named, v, literal))
            .collect::<Result<_, _>>()
            .map(Dynamic::List),
        single => decode_named(catalog, ctx, ty.named, single, literal),
    }
}

fn decode_named(
    catalog: &Catalog,
    ctx: &async_graphql::Context<'_>,
    named: Named,
    value: &Value,
    literal: bool,
) -> Result<Dynamic, FieldError> {
    if matches!(value, Value::Null) {
        return Ok(Dynamic::Null);
    }
    let (id, role) = match named {
        Named::Builtin(Builtin::Upload) => return upload(ctx, value),
        Named::Builtin(_) => return Ok(plain(value)),
        Named::Registered(id, role) => (id, role),
    };
    match catalog.get(id, role).map(|m| &**m) {
        Some(MetaType::Enum(meta)) => {
            let name = match value {
                Value::Enum(n) => n.as_str(),
                Value::String(s) => s.as_str(),
                _ => return Err(format!("invalid value of enum {}", meta.name).into()),
            };
            meta.value_of(name)
                .cloned()
                .ok_or_else(|| format!("unknown value '{name}' of enum {}", meta.name).into())
        }
        Some(MetaType::Scalar(meta)) => {
            let parse = if literal {
                meta.hooks.parse_literal
            } else {
                meta.hooks.parse_value
            };
            parse(value).map_err(FieldError::from)
        }
        Some(MetaType::InputObject(meta)) => match value {
            Value::Object(fields) => decode_fields(
                catalog,
                ctx,
                &meta.input_fields,
                fields,
                Origin::Uniform { literal },
            ),
            _ => Err(format!("expected an object of {}", meta.name).into()),
        },
        _ => Ok(plain(value)),
    }
}

/// Decodes the `raw` fields of an input object or arguments bundle, keyed by native field
/// identifiers, nesting embedded structs.
///
/// Missing fields take their default value, if any. Unknown fields are ignored.
pub(crate) fn decode_fields(
    catalog: &Catalog,
    ctx: &async_graphql::Context<'_>,
    fields: &[Argument],
    raw: &IndexMap<Name, Value>,
    origin: Origin<'_>,
) -> Result<Dynamic, FieldError> {
    let mut out = IndexMap::new();
    for field in fields {
        let literal = origin.is_literal(field.name.as_str());
        let value = match raw.get(field.name.as_str()).or(field.default_value.as_ref()) {
            Some(v) => decode(catalog, ctx, &field.arg_type, v, literal).map_err(|e| {
                FieldError::new(
                    format!("{}: {}", field.name, e.message()),
                    e.extensions().clone(),
                )
            })?,
            None => Dynamic::Null,
        };
        insert_at(&mut out, &field.path, value);
    }
    Ok(Dynamic::Object(out))
}

fn insert_at(map: &mut IndexMap<String, Dynamic>, path: &[&'static str], value: Dynamic) {
    match path {
        [] => {}
        [last] => {
            _ = map.insert((*last).into(), value);
        }
        [first, rest @ ..] => {
            let entry = map
                .entry((*first).into())
                .or_insert_with(|| Dynamic::Object(IndexMap::new()));
            if !matches!(entry, Dynamic::Object(_)) {
                *entry = Dynamic::Object(IndexMap::new());
            }
            if let Dynamic::Object(inner) = entry {
                insert_at(inner, rest, value);
            }
        }
    }
}

/// Converts a value structurally, leaving the weak typing to the native decoding.
pub(crate) fn plain(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::Null,
        Value::Number(n) => n
            .as_i64()
            .map(Dynamic::Int)
            .or_else(|| n.as_u64().map(Dynamic::Uint))
            .or_else(|| n.as_f64().map(Dynamic::Float))
            .unwrap_or_default(),
        Value::String(s) => Dynamic::String(s.clone()),
        Value::Boolean(b) => Dynamic::Bool(*b),
        Value::Enum(n) => Dynamic::String(n.to_string()),
        Value::Binary(b) => Dynamic::Native(Erased::new(b.clone())),
        Value::List(items) => Dynamic::List(items.iter().map(plain).collect()),
        Value::Object(fields) => Dynamic::Object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), plain(v)))
                .collect(),
        ),
    }
}

/// Reads the file a multipart request bound to the given variable.
fn upload(ctx: &async_graphql::Context<'_>, value: &Value) -> Result<Dynamic, FieldError> {
    let handle = async_graphql::Upload::parse(Some(value.clone()))
        .map_err(|e| FieldError::from(e.into_server_error(Pos::default()).message))?;
    let file = handle.value(ctx)?;
    Ok(Dynamic::Native(Erased::new(Upload {
        filename: file.filename,
        content_type: file.content_type,
        content: file.content,
    })))
}
