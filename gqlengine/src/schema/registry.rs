//! Memoizing registry of the schema types built out of native types.

use std::{any::TypeId, sync::Arc};

use arcstr::ArcStr;
use fnv::FnvHashMap;

use super::{
    fields::{FIELD_CHECKERS, INPUT_CHECKERS},
    meta::{
        ArgumentsMeta, DeprecationStatus, EnumMeta, FieldType, InputObjectMeta, InterfaceMeta,
        MetaType, Named, ObjectMeta, Role, ScalarMeta, UnionMeta,
    },
};
use crate::{
    RegistrationError,
    plugin::{PluginRole, Plugins},
    reflect::{BaseKind, BaseType, NativeType, Tags},
    types::{
        Capability, CapabilityImpl, Classifier, RequestContextVTable, ResponseContextVTable,
        UnwrappedInfo,
    },
};

/// Key of a registered type: its native identity and role.
pub type TypeKey = (TypeId, Role);

enum Entry {
    /// Construction started, name not known yet.
    Pending,
    /// Name known, fields being walked.
    Placeholder(ArcStr),
    Ready(Arc<MetaType>),
}

/// Context type collected during resolver synthesis.
#[derive(Clone, Copy, Debug)]
pub struct ContextHook<V> {
    /// Native identity of the context type.
    pub id: TypeId,
    /// Native name of the context type.
    pub name: &'static str,
    pub(crate) vtable: V,
}

/// Memoizing, cycle-safe builder of schema types out of native types.
///
/// Every base type registers exactly once per role, however it's referenced. A type is reserved
/// under its name before its fields are walked, so self-referencing and mutually referencing
/// types resolve by name.
#[derive(Default)]
pub struct Registry {
    pub(crate) classifier: Classifier,
    entries: FnvHashMap<TypeKey, Entry>,
    order: Vec<TypeKey>,
    names: FnvHashMap<ArcStr, TypeKey>,
    arguments: FnvHashMap<TypeId, Arc<ArgumentsMeta>>,
    pub(crate) plugins: Plugins,
    request_contexts: Vec<ContextHook<RequestContextVTable>>,
    response_contexts: Vec<ContextHook<ResponseContextVTable>>,
}

impl Registry {
    /// Creates an empty [`Registry`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the given native type for the given role, returning its schema type.
    ///
    /// # Errors
    ///
    /// If the type, or any type it references, can't be bound.
    pub fn register_type(
        &mut self,
        native: &NativeType,
        role: Role,
    ) -> Result<Arc<MetaType>, RegistrationError> {
        let checkers = match role {
            Role::Input => INPUT_CHECKERS,
            Role::Output | Role::Paginated => FIELD_CHECKERS,
        };
        let ty = self
            .classify(native, checkers)?
            .ok_or_else(|| RegistrationError::UnsupportedType {
                ty: native.to_string(),
            })?;
        match ty.named {
            Named::Registered(id, role) => self.get(id, role).ok_or_else(|| {
                RegistrationError::LoopReferred {
                    ty: native.to_string(),
                }
            }),
            Named::Builtin(_) => Err(RegistrationError::UnsupportedType {
                ty: native.to_string(),
            }),
        }
    }

    /// Returns the finished schema type registered under the given key.
    pub fn get(&self, id: TypeId, role: Role) -> Option<Arc<MetaType>> {
        match self.entries.get(&(id, role)) {
            Some(Entry::Ready(meta)) => Some(meta.clone()),
            _ => None,
        }
    }

    /// Iterates over the finished schema types in registration order.
    pub fn types(&self) -> impl Iterator<Item = (TypeKey, &Arc<MetaType>)> {
        self.order.iter().filter_map(|key| match self.entries.get(key) {
            Some(Entry::Ready(meta)) => Some((*key, meta)),
            _ => None,
        })
    }

    /// Returns the request context types collected so far.
    pub fn request_contexts(&self) -> &[ContextHook<RequestContextVTable>] {
        &self.request_contexts
    }

    /// Returns the response context types collected so far.
    pub fn response_contexts(&self) -> &[ContextHook<ResponseContextVTable>] {
        &self.response_contexts
    }

    /// Freezes the finished schema types into a [`Catalog`].
    pub fn freeze(&self) -> Catalog {
        Catalog {
            types: self.types().map(|(k, m)| (k, m.clone())).collect(),
            order: self.types().map(|(k, _)| k).collect(),
        }
    }

    /// Starts the construction of the type under `key`, returning its name if it's already
    /// known.
    pub(crate) fn begin(
        &mut self,
        key: TypeKey,
        native: &BaseType,
    ) -> Result<Option<ArcStr>, RegistrationError> {
        match self.entries.get(&key) {
            Some(Entry::Pending) => Err(RegistrationError::LoopReferred {
                ty: native.name().into(),
            }),
            Some(Entry::Placeholder(name)) => Ok(Some(name.clone())),
            Some(Entry::Ready(meta)) => Ok(Some(meta.name().clone())),
            None => {
                tracing::trace!(ty = native.name(), role = ?key.1, "registering type");
                _ = self.entries.insert(key, Entry::Pending);
                Ok(None)
            }
        }
    }

    /// Reserves the `name` of the type under construction, so references to it resolve.
    pub(crate) fn reserve(&mut self, key: TypeKey, name: ArcStr) -> Result<(), RegistrationError> {
        match self.names.get(&name) {
            Some(existing) if *existing != key => {
                return Err(RegistrationError::DuplicateName { name: name.to_string() });
            }
            _ => {}
        }
        _ = self.names.insert(name.clone(), key);
        _ = self.entries.insert(key, Entry::Placeholder(name));
        Ok(())
    }

    /// Finishes the construction of the type under `key`.
    pub(crate) fn complete(&mut self, key: TypeKey, meta: MetaType) -> ArcStr {
        let name = meta.name().clone();
        _ = self.entries.insert(key, Entry::Ready(Arc::new(meta)));
        self.order.push(key);
        name
    }

    /// Computes the name and description of a type, from its capability marker or from the
    /// implementation of the capability.
    ///
    /// Marker tags win over the implementation.
    fn metadata(
        base: &BaseType,
        capability: Capability,
        marker: Option<Tags>,
        declared: Option<(Option<String>, String)>,
    ) -> Result<(ArcStr, Option<ArcStr>), RegistrationError> {
        if let Some(tags) = marker {
            if tags.desc.is_none() && declared.is_none() {
                return Err(RegistrationError::MissingDescription {
                    ty: base.name().into(),
                    capability,
                });
            }
        }
        let (declared_name, declared_desc) = declared.unzip();
        let name = marker
            .and_then(|t| t.name)
            .map(ArcStr::from)
            .or_else(|| declared_name.flatten().map(ArcStr::from))
            .unwrap_or_else(|| base.name().into());
        let description = marker
            .and_then(|t| t.desc)
            .map(ArcStr::from)
            .or_else(|| declared_desc.filter(|d| !d.is_empty()).map(ArcStr::from));
        Ok((name, description))
    }

    pub(crate) fn object_type(
        &mut self,
        info: &UnwrappedInfo,
    ) -> Result<ArcStr, RegistrationError> {
        let base = info.base;
        let key = (base.id(), Role::Output);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let descriptor = self.classifier.descriptor(&base);
        let vtable = match self
            .classifier
            .implementation(&base, Capability::Object, info.implementing)
        {
            Some(CapabilityImpl::Object(v)) => Some(v),
            _ => None,
        };
        let (name, description) = Self::metadata(
            &base,
            Capability::Object,
            descriptor.marker(Capability::Object).map(|m| m.tags),
            vtable.map(|v| ((v.name)(), (v.description)())),
        )?;
        self.reserve(key, name.clone())?;

        let mut run = self.plugins.begin(PluginRole::Object, &base);
        let delegation = vtable.and_then(|v| (v.delegation)());
        let walked = match &delegation {
            None => base,
            Some(d) => match d.target() {
                NativeType::Base(t) if t.kind() == BaseKind::Struct => t,
                other => {
                    return Err(RegistrationError::InvalidDelegation {
                        ty: base.name().into(),
                        target: other.to_string(),
                    });
                }
            },
        };
        let mut fields = vec![];
        self.object_fields(&walked, &[], &[], &mut run, &mut fields)?;

        let mut interface_names = vec![];
        for iface in vtable.map(|v| (v.interfaces)()).unwrap_or_default() {
            interface_names.push(self.interface_type(&iface)?);
        }

        run.capability(Capability::Object, info.implementing);
        run.finish(&name, description.as_deref());
        Ok(self.complete(
            key,
            MetaType::Object(ObjectMeta {
                name,
                description,
                fields,
                interface_names,
                delegation,
            }),
        ))
    }

    pub(crate) fn interface_type(
        &mut self,
        native: &NativeType,
    ) -> Result<ArcStr, RegistrationError> {
        let (implemented, info) = self.classifier.implements(native, Capability::Interface)?;
        let marker = self.classifier.marked(native, Capability::Interface)?;
        if !implemented && marker.is_none() {
            return Err(RegistrationError::NotImplemented {
                ty: native.to_string(),
                capability: Capability::Interface,
            });
        }
        let base = info.base;
        let key = (base.id(), Role::Output);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let vtable = match self
            .classifier
            .implementation(&base, Capability::Interface, info.implementing)
        {
            Some(CapabilityImpl::Interface(v)) => Some(v),
            _ => None,
        };
        let (name, description) = Self::metadata(
            &base,
            Capability::Interface,
            marker.map(|(tags, _)| tags),
            vtable.map(|v| ((v.name)(), (v.description)())),
        )?;
        self.reserve(key, name.clone())?;

        let mut run = self.plugins.begin(PluginRole::Object, &base);
        let mut fields = vec![];
        self.object_fields(&base, &[], &[], &mut run, &mut fields)?;
        run.capability(Capability::Interface, info.implementing);
        run.finish(&name, description.as_deref());
        Ok(self.complete(
            key,
            MetaType::Interface(InterfaceMeta {
                name,
                description,
                fields,
            }),
        ))
    }

    pub(crate) fn input_type(&mut self, info: &UnwrappedInfo) -> Result<ArcStr, RegistrationError> {
        let base = info.base;
        let key = (base.id(), Role::Input);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let descriptor = self.classifier.descriptor(&base);
        let vtable = match self
            .classifier
            .implementation(&base, Capability::Input, info.implementing)
        {
            Some(CapabilityImpl::Input(v)) => Some(v),
            _ => None,
        };
        let (name, description) = Self::metadata(
            &base,
            Capability::Input,
            descriptor.marker(Capability::Input).map(|m| m.tags),
            vtable.map(|v| ((v.name)(), (v.description)())),
        )?;
        self.reserve(key, name.clone())?;

        let mut run = self.plugins.begin(PluginRole::Input, &base);
        let mut input_fields = vec![];
        self.input_fields(&base, &[], &[], &mut run, &mut input_fields)?;
        run.capability(Capability::Input, info.implementing);
        run.finish(&name, description.as_deref());
        Ok(self.complete(
            key,
            MetaType::InputObject(InputObjectMeta {
                name,
                description,
                input_fields,
            }),
        ))
    }

    pub(crate) fn enum_type(&mut self, info: &UnwrappedInfo) -> Result<ArcStr, RegistrationError> {
        let base = info.base;
        let key = (base.id(), Role::Output);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let Some(CapabilityImpl::Enum(vtable)) =
            self.classifier
                .implementation(&base, Capability::Enum, info.implementing)
        else {
            return Err(RegistrationError::NotImplemented {
                ty: base.name().into(),
                capability: Capability::Enum,
            });
        };
        let (name, description) = Self::metadata(
            &base,
            Capability::Enum,
            None,
            Some(((vtable.name)(), (vtable.description)())),
        )?;
        self.reserve(key, name.clone())?;
        Ok(self.complete(
            key,
            MetaType::Enum(EnumMeta {
                name,
                description,
                values: (vtable.values)(),
                name_of: vtable.name_of,
            }),
        ))
    }

    pub(crate) fn scalar_type(
        &mut self,
        info: &UnwrappedInfo,
    ) -> Result<ArcStr, RegistrationError> {
        let base = info.base;
        let key = (base.id(), Role::Output);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let Some(CapabilityImpl::Scalar(hooks)) =
            self.classifier
                .implementation(&base, Capability::Scalar, info.implementing)
        else {
            return Err(RegistrationError::NotImplemented {
                ty: base.name().into(),
                capability: Capability::Scalar,
            });
        };
        if base.kind() == BaseKind::Struct {
            let descriptor = self.classifier.descriptor(&base);
            if let Some(private) = descriptor.fields.iter().find(|f| !f.exported) {
                return Err(RegistrationError::NotSerializable {
                    ty: base.name().into(),
                    field: private.ident.into(),
                });
            }
        }
        let (name, description) = Self::metadata(
            &base,
            Capability::Scalar,
            None,
            Some(((hooks.name)(), (hooks.description)())),
        )?;
        self.reserve(key, name.clone())?;
        Ok(self.complete(
            key,
            MetaType::Scalar(ScalarMeta {
                name,
                description,
                hooks,
            }),
        ))
    }

    pub(crate) fn union_type(&mut self, info: &UnwrappedInfo) -> Result<ArcStr, RegistrationError> {
        let base = info.base;
        let key = (base.id(), Role::Output);
        if let Some(name) = self.begin(key, &base)? {
            return Ok(name);
        }
        let Some(CapabilityImpl::Union(vtable)) =
            self.classifier
                .implementation(&base, Capability::Union, info.implementing)
        else {
            return Err(RegistrationError::NotImplemented {
                ty: base.name().into(),
                capability: Capability::Union,
            });
        };
        let (name, description) = Self::metadata(
            &base,
            Capability::Union,
            None,
            Some(((vtable.name)(), (vtable.description)())),
        )?;
        self.reserve(key, name.clone())?;

        let mut members = vec![];
        for member in (vtable.members)() {
            let Some(info) = self.as_object(&member)? else {
                return Err(RegistrationError::InvalidUnionMember {
                    ty: base.name().into(),
                    member: member.to_string(),
                });
            };
            if info.is_list {
                return Err(RegistrationError::InvalidUnionMember {
                    ty: base.name().into(),
                    member: member.to_string(),
                });
            }
            let member_name = self.object_type(&info)?;
            members.push((info.base.id(), member_name));
        }
        Ok(self.complete(
            key,
            MetaType::Union(UnionMeta {
                name,
                description,
                members,
                into_member: vtable.into_member,
            }),
        ))
    }

    /// Registers an arguments bundle, flattening its fields into field arguments.
    pub(crate) fn arguments(
        &mut self,
        info: &UnwrappedInfo,
    ) -> Result<Arc<ArgumentsMeta>, RegistrationError> {
        let base = info.base;
        if let Some(meta) = self.arguments.get(&base.id()) {
            return Ok(meta.clone());
        }
        tracing::trace!(ty = base.name(), "registering arguments");
        let mut run = self.plugins.begin(PluginRole::Arguments, &base);
        let mut arguments = vec![];
        self.input_fields(&base, &[], &[], &mut run, &mut arguments)?;
        run.capability(Capability::Arguments, info.implementing);
        run.finish(base.name(), None);

        let meta = Arc::new(ArgumentsMeta { base, arguments });
        _ = self.arguments.insert(base.id(), meta.clone());
        Ok(meta)
    }

    /// Checks whether `native` is an object type, by implementation or by marker.
    pub(crate) fn as_object(
        &mut self,
        native: &NativeType,
    ) -> Result<Option<UnwrappedInfo>, RegistrationError> {
        self.as_struct_with(native, Capability::Object)
    }

    /// Checks whether `native` is an input object type, by implementation or by marker.
    pub(crate) fn as_input(
        &mut self,
        native: &NativeType,
    ) -> Result<Option<UnwrappedInfo>, RegistrationError> {
        self.as_struct_with(native, Capability::Input)
    }

    /// Checks whether `native` is an arguments bundle, by implementation or by marker.
    pub(crate) fn as_arguments(
        &mut self,
        native: &NativeType,
    ) -> Result<Option<UnwrappedInfo>, RegistrationError> {
        self.as_struct_with(native, Capability::Arguments)
    }

    fn as_struct_with(
        &mut self,
        native: &NativeType,
        capability: Capability,
    ) -> Result<Option<UnwrappedInfo>, RegistrationError> {
        let (implemented, info) = self.classifier.implements(native, capability)?;
        if info.base.kind() != BaseKind::Struct {
            return Ok(None);
        }
        if implemented {
            return Ok(Some(info));
        }
        Ok(self
            .classifier
            .marked(native, capability)?
            .map(|(_, info)| info))
    }

    /// Collects a request context type.
    pub(crate) fn request_context(&mut self, base: &BaseType, vtable: RequestContextVTable) {
        if !self.request_contexts.iter().any(|c| c.id == base.id()) {
            self.request_contexts.push(ContextHook {
                id: base.id(),
                name: base.name(),
                vtable,
            });
        }
    }

    /// Collects a response context type.
    pub(crate) fn response_context(&mut self, base: &BaseType, vtable: ResponseContextVTable) {
        if !self.response_contexts.iter().any(|c| c.id == base.id()) {
            self.response_contexts.push(ContextHook {
                id: base.id(),
                name: base.name(),
                vtable,
            });
        }
    }

    /// Reserves and completes a type synthesized by the engine itself.
    pub(crate) fn synthesized(
        &mut self,
        key: TypeKey,
        build: impl FnOnce(&mut Self) -> Result<MetaType, RegistrationError>,
    ) -> Result<ArcStr, RegistrationError> {
        if let Some(Entry::Ready(meta)) = self.entries.get(&key) {
            return Ok(meta.name().clone());
        }
        _ = self.entries.insert(key, Entry::Pending);
        let meta = build(self)?;
        self.reserve(key, meta.name().clone())?;
        Ok(self.complete(key, meta))
    }

    /// Returns the [`FieldType`] of a builtin or registered type named by `named`.
    pub(crate) fn field_type(&self, named: Named) -> Option<FieldType> {
        match named {
            Named::Builtin(b) => Some(FieldType::builtin(b)),
            Named::Registered(id, role) => match self.entries.get(&(id, role))? {
                Entry::Pending => None,
                Entry::Placeholder(name) => Some(FieldType::new(named, name.clone())),
                Entry::Ready(meta) => Some(FieldType::new(named, meta.name().clone())),
            },
        }
    }
}

/// Frozen set of the finished schema types, shared by the resolver adapters.
#[derive(Debug, Default)]
pub struct Catalog {
    types: FnvHashMap<TypeKey, Arc<MetaType>>,
    order: Vec<TypeKey>,
}

impl Catalog {
    /// Returns the schema type registered under the given key.
    pub fn get(&self, id: TypeId, role: Role) -> Option<&Arc<MetaType>> {
        self.types.get(&(id, role))
    }

    /// Iterates over the schema types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeKey, &Arc<MetaType>)> {
        self.order
            .iter()
            .filter_map(|key| self.types.get(key).map(|meta| (*key, meta)))
    }
}

pub(crate) fn deprecation(tags: &Tags) -> DeprecationStatus {
    DeprecationStatus::from_tag(tags.deprecated)
}

