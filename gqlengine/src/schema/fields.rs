//! Field checkers and struct field walking.

use std::any::TypeId;

use arcstr::ArcStr;
use async_graphql::{Name, Number};

use super::{
    Registry,
    meta::{Access, Argument, Builtin, Field, FieldType, Named, Role},
    registry::deprecation,
};
use crate::{
    RegistrationError, Value,
    plugin::PluginRun,
    reflect::{BaseKind, BaseType, Dynamic, FieldGetter, FieldShape, NativeType},
    types::{Capability, UnwrappedInfo, unwrap},
    util::to_camel_case,
};

/// Single classification attempt of a native type reference.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Checker {
    Builtin,
    Id,
    Enum,
    Object,
    Union,
    Scalar,
    Input,
    Upload,
}

/// Checkers of input object fields and arguments.
pub(crate) const INPUT_CHECKERS: &[Checker] = &[
    Checker::Builtin,
    Checker::Id,
    Checker::Enum,
    Checker::Scalar,
    Checker::Input,
    Checker::Upload,
];

/// Checkers of object fields.
pub(crate) const FIELD_CHECKERS: &[Checker] = &[
    Checker::Builtin,
    Checker::Id,
    Checker::Enum,
    Checker::Object,
    Checker::Union,
    Checker::Scalar,
];

/// Checkers of resolver payloads.
pub(crate) const RESULT_CHECKERS: &[Checker] = &[
    Checker::Object,
    Checker::Union,
    Checker::Id,
    Checker::Enum,
    Checker::Scalar,
    Checker::Builtin,
];

/// Exposed name of a struct field: an explicit `name` tag, else the serialized name, else the
/// camel-cased native identifier.
pub(crate) fn field_name(shape: &FieldShape) -> ArcStr {
    shape
        .tags
        .name
        .or(shape.tags.json)
        .map(ArcStr::from)
        .unwrap_or_else(|| to_camel_case(shape.ident).as_ref().into())
}

impl Registry {
    /// Classifies `native` with the given checkers, the first match winning.
    ///
    /// Returns [`None`] if no checker matches.
    pub(crate) fn classify(
        &mut self,
        native: &NativeType,
        checkers: &[Checker],
    ) -> Result<Option<FieldType>, RegistrationError> {
        for checker in checkers {
            if let Some(ty) = self.check(native, *checker)? {
                return Ok(Some(ty));
            }
        }
        Ok(None)
    }

    fn check(
        &mut self,
        native: &NativeType,
        checker: Checker,
    ) -> Result<Option<FieldType>, RegistrationError> {
        let registered = |info: &UnwrappedInfo, role, name: ArcStr| {
            FieldType::new(Named::Registered(info.base.id(), role), name).list(info.is_list)
        };
        Ok(match checker {
            Checker::Builtin => {
                let info = unwrap(native)?;
                Builtin::of_kind(info.base.kind())
                    .filter(|_| self.is_plain(&info.base))
                    .map(|b| FieldType::builtin(b).list(info.is_list))
            }
            Checker::Id => {
                let (found, info) = self.classifier.implements(native, Capability::Id)?;
                if !found {
                    return Ok(None);
                }
                let kind = info.base.kind();
                if !kind.is_integer() && kind != BaseKind::String {
                    return Err(RegistrationError::InvalidId {
                        ty: info.base.name().into(),
                    });
                }
                Some(FieldType::builtin(Builtin::Id(kind)).list(info.is_list))
            }
            Checker::Enum => {
                let (found, info) = self.classifier.implements(native, Capability::Enum)?;
                if !found {
                    return Ok(None);
                }
                let name = self.enum_type(&info)?;
                Some(registered(&info, Role::Output, name))
            }
            Checker::Object => match self.as_object(native)? {
                Some(info) => {
                    let name = self.object_type(&info)?;
                    Some(registered(&info, Role::Output, name))
                }
                None => None,
            },
            Checker::Union => {
                let (found, info) = self.classifier.implements(native, Capability::Union)?;
                if !found {
                    return Ok(None);
                }
                let name = self.union_type(&info)?;
                Some(registered(&info, Role::Output, name))
            }
            Checker::Scalar => {
                let (found, info) = self.classifier.implements(native, Capability::Scalar)?;
                if !found {
                    return Ok(None);
                }
                let name = self.scalar_type(&info)?;
                Some(registered(&info, Role::Output, name))
            }
            Checker::Input => match self.as_input(native)? {
                Some(info) => {
                    let name = self.input_type(&info)?;
                    Some(registered(&info, Role::Input, name))
                }
                None => None,
            },
            Checker::Upload => {
                let info = unwrap(native)?;
                (info.base.kind() == BaseKind::Upload)
                    .then(|| FieldType::builtin(Builtin::Upload).list(info.is_list))
            }
        })
    }

    /// Indicates whether the given primitive declares no capability, so it maps onto a builtin
    /// scalar.
    fn is_plain(&mut self, base: &BaseType) -> bool {
        self.classifier
            .descriptor(base)
            .capabilities
            .iter()
            .next()
            .is_none()
    }

    /// Walks the fields of an object or interface type, flattening embedded structs.
    ///
    /// `outer` holds the structs embedding `owner`, outermost first.
    pub(crate) fn object_fields(
        &mut self,
        owner: &BaseType,
        prefix: &[FieldGetter],
        outer: &[TypeId],
        run: &mut PluginRun,
        out: &mut Vec<Field>,
    ) -> Result<(), RegistrationError> {
        let descriptor = self.classifier.descriptor(owner);
        for shape in &descriptor.fields {
            if shape.tags.ignore || shape.marker_of().is_some() {
                continue;
            }
            let native = (shape.native)();
            let mut path = prefix.to_vec();
            path.push(shape.get);

            if shape.tags.embedded {
                let embedded = embedded_struct(owner, shape, &native, outer)?;
                run.embedded_field(shape);
                let mut chain = outer.to_vec();
                chain.push(owner.id());
                self.object_fields(&embedded, &path, &chain, run, out)?;
                continue;
            }

            let ty = self
                .classify(&native, FIELD_CHECKERS)?
                .ok_or_else(|| RegistrationError::UnsupportedField {
                    owner: owner.name().into(),
                    field: shape.ident.into(),
                    ty: native.to_string(),
                })?
                .required(shape.tags.required, shape.tags.element_required);
            let name = field_name(shape);
            run.field(shape, &name, &ty);
            out.push(Field {
                name,
                description: shape.tags.desc.map(ArcStr::from),
                field_type: ty,
                deprecation_status: deprecation(&shape.tags),
                ident: shape.ident,
                owner: *owner,
                need_resolver: shape.tags.need_resolver,
                access: Access::Getters(path),
            });
        }
        Ok(())
    }

    /// Walks the fields of an input object type or arguments bundle, flattening embedded
    /// structs.
    pub(crate) fn input_fields(
        &mut self,
        owner: &BaseType,
        prefix: &[&'static str],
        outer: &[TypeId],
        run: &mut PluginRun,
        out: &mut Vec<Argument>,
    ) -> Result<(), RegistrationError> {
        let descriptor = self.classifier.descriptor(owner);
        for shape in &descriptor.fields {
            if shape.tags.ignore || shape.marker_of().is_some() {
                continue;
            }
            let native = (shape.native)();
            let mut path = prefix.to_vec();
            path.push(shape.ident);

            if shape.tags.embedded {
                let embedded = embedded_struct(owner, shape, &native, outer)?;
                run.embedded_field(shape);
                let mut chain = outer.to_vec();
                chain.push(owner.id());
                self.input_fields(&embedded, &path, &chain, run, out)?;
                continue;
            }

            let ty = self
                .classify(&native, INPUT_CHECKERS)?
                .ok_or_else(|| RegistrationError::UnsupportedField {
                    owner: owner.name().into(),
                    field: shape.ident.into(),
                    ty: native.to_string(),
                })?
                .required(shape.tags.required, shape.tags.element_required);
            let name = field_name(shape);
            run.field(shape, &name, &ty);
            out.push(Argument {
                default_value: self.default_value(owner, shape, &native, &ty)?,
                name,
                description: shape.tags.desc.map(ArcStr::from),
                arg_type: ty,
                deprecation_status: deprecation(&shape.tags),
                path,
            });
        }
        Ok(())
    }

    /// Parses the `default` tag of a field according to the field's kind.
    ///
    /// Indirect and list fields never receive a default.
    fn default_value(
        &self,
        owner: &BaseType,
        shape: &FieldShape,
        native: &NativeType,
        ty: &FieldType,
    ) -> Result<Option<Value>, RegistrationError> {
        let Some(literal) = shape.tags.default else {
            return Ok(None);
        };
        let info = unwrap(native)?;
        if info.indirect || info.is_list {
            return Ok(None);
        }
        let invalid = |reason: &dyn std::fmt::Display| RegistrationError::InvalidDefault {
            owner: owner.name().into(),
            field: shape.ident.into(),
            value: literal.into(),
            reason: reason.to_string(),
        };
        let kind = match ty.named {
            Named::Builtin(Builtin::Id(_)) => {
                return Ok(Some(Value::String(literal.into())));
            }
            Named::Registered(_, Role::Output) if info.base.kind() == BaseKind::Enum => {
                return Ok(Some(Value::Enum(Name::new(literal))));
            }
            _ => info.base.kind(),
        };
        let literal_value = Dynamic::String(literal.into());
        let value = match kind {
            BaseKind::Int(_) => {
                Value::from(literal_value.weak_i64("Int").map_err(|e| invalid(&e))?)
            }
            BaseKind::Uint(_) => {
                Value::from(literal_value.weak_u64("Int").map_err(|e| invalid(&e))?)
            }
            BaseKind::Float(_) => {
                let f = literal_value.weak_f64("Float").map_err(|e| invalid(&e))?;
                Value::Number(Number::from_f64(f).ok_or_else(|| invalid(&"not a finite number"))?)
            }
            BaseKind::Bool => Value::Boolean(literal_value.weak_bool().map_err(|e| invalid(&e))?),
            BaseKind::String => Value::String(literal.into()),
            other => return Err(invalid(&format_args!("no default for {other:?}"))),
        };
        Ok(Some(value))
    }
}

fn embedded_struct(
    owner: &BaseType,
    shape: &FieldShape,
    native: &NativeType,
    outer: &[TypeId],
) -> Result<BaseType, RegistrationError> {
    let info = unwrap(native)?;
    if info.is_list || info.base.kind() != BaseKind::Struct {
        return Err(RegistrationError::EmbeddedNonStruct {
            owner: owner.name().into(),
            field: shape.ident.into(),
        });
    }
    let id = info.base.id();
    if id == owner.id() || outer.contains(&id) {
        return Err(RegistrationError::EmbeddingLoop {
            owner: owner.name().into(),
            field: shape.ident.into(),
        });
    }
    Ok(info.base)
}
