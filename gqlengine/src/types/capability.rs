//! Capability contracts of native types and their type-erased implementations.

use std::{any::TypeId, sync::Arc};

use derive_more::with_trait::Display;
use fnv::FnvHashMap;

use super::{
    BoxError, Delegation, Enum, Input, Interface, Object, RequestContext, ResponseContext, Scalar,
    Union,
    unwrap::{UnwrappedInfo, unwrap},
};
use crate::{
    RegistrationError, Value,
    reflect::{BaseType, DecodeError, Dynamic, NativeType, Reflect, TypeDescriptor},
};

/// Capability contract a native type may satisfy.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Capability {
    /// [`Object`].
    #[display("object")]
    Object,
    /// [`Input`].
    #[display("input")]
    Input,
    /// [`Enum`].
    #[display("enum")]
    Enum,
    /// [`Scalar`].
    #[display("scalar")]
    Scalar,
    /// [`Interface`].
    #[display("interface")]
    Interface,
    /// [`Union`].
    #[display("union")]
    Union,
    /// [`Id`](super::Id).
    #[display("ID")]
    Id,
    /// [`Arguments`](super::Arguments).
    #[display("arguments")]
    Arguments,
    /// [`RequestContext`].
    #[display("request context")]
    RequestContext,
    /// [`ResponseContext`].
    #[display("response context")]
    ResponseContext,
    /// [`SubscriptionSession`](super::SubscriptionSession).
    #[display("subscription session")]
    Session,
}

/// Receiver form a capability is implemented on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Receiver {
    /// The type itself.
    #[default]
    Value,
    /// `Arc` handle of the type.
    Handle,
}

/// Capability implementation, type-erased into a table of functions.
#[derive(Clone)]
pub enum CapabilityImpl {
    /// [`Object`].
    Object(ObjectVTable),
    /// [`Input`].
    Input(InputVTable),
    /// [`Enum`].
    Enum(EnumVTable),
    /// [`Scalar`].
    Scalar(ScalarVTable),
    /// [`Interface`].
    Interface(InterfaceVTable),
    /// [`Union`].
    Union(UnionVTable),
    /// [`Id`](super::Id).
    Id,
    /// [`Arguments`](super::Arguments).
    Arguments,
    /// [`RequestContext`].
    RequestContext(RequestContextVTable),
    /// [`ResponseContext`].
    ResponseContext(ResponseContextVTable),
    /// [`SubscriptionSession`](super::SubscriptionSession).
    Session,
}

impl CapabilityImpl {
    /// Returns the [`Capability`] this implementation satisfies.
    pub fn capability(&self) -> Capability {
        match self {
            Self::Object(_) => Capability::Object,
            Self::Input(_) => Capability::Input,
            Self::Enum(_) => Capability::Enum,
            Self::Scalar(_) => Capability::Scalar,
            Self::Interface(_) => Capability::Interface,
            Self::Union(_) => Capability::Union,
            Self::Id => Capability::Id,
            Self::Arguments => Capability::Arguments,
            Self::RequestContext(_) => Capability::RequestContext,
            Self::ResponseContext(_) => Capability::ResponseContext,
            Self::Session => Capability::Session,
        }
    }
}

/// Capabilities declared by a type.
#[derive(Clone, Default)]
pub struct CapabilityTable {
    entries: Vec<(Receiver, CapabilityImpl)>,
}

impl CapabilityTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the given implementation on the given receiver form.
    #[must_use]
    pub fn with(mut self, receiver: Receiver, implementation: CapabilityImpl) -> Self {
        self.entries.push((receiver, implementation));
        self
    }

    /// Finds the implementation of `capability` on the given receiver form.
    pub fn find(&self, capability: Capability, receiver: Receiver) -> Option<&CapabilityImpl> {
        self.entries
            .iter()
            .find(|(r, i)| *r == receiver && i.capability() == capability)
            .map(|(_, i)| i)
    }

    /// Finds the implementation of `capability` on any receiver form, preferring the value one.
    pub fn get(&self, capability: Capability) -> Option<&CapabilityImpl> {
        self.find(capability, Receiver::Value)
            .or_else(|| self.find(capability, Receiver::Handle))
    }

    /// Iterates over the declared implementations.
    pub fn iter(&self) -> impl Iterator<Item = (Receiver, &CapabilityImpl)> {
        self.entries.iter().map(|(r, i)| (*r, i))
    }
}

/// [`Object`] implementation.
#[derive(Clone, Copy)]
pub struct ObjectVTable {
    /// [`Object::description()`].
    pub description: fn() -> String,
    /// [`Object::name()`].
    pub name: fn() -> Option<String>,
    /// [`Object::interfaces()`].
    pub interfaces: fn() -> Vec<NativeType>,
    /// [`Object::delegation()`].
    pub delegation: fn() -> Option<Delegation>,
}

impl ObjectVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Object>() -> Self {
        Self {
            description: T::description,
            name: T::name,
            interfaces: T::interfaces,
            delegation: T::delegation,
        }
    }
}

/// [`Input`] implementation.
#[derive(Clone, Copy)]
pub struct InputVTable {
    /// [`Input::description()`].
    pub description: fn() -> String,
    /// [`Input::name()`].
    pub name: fn() -> Option<String>,
}

impl InputVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Input>() -> Self {
        Self {
            description: T::description,
            name: T::name,
        }
    }
}

/// [`Interface`] implementation.
#[derive(Clone, Copy)]
pub struct InterfaceVTable {
    /// [`Interface::description()`].
    pub description: fn() -> String,
    /// [`Interface::name()`].
    pub name: fn() -> Option<String>,
}

impl InterfaceVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Interface>() -> Self {
        Self {
            description: T::description,
            name: T::name,
        }
    }
}

/// Type-erased [`EnumValue`](super::EnumValue).
#[derive(Clone, Debug)]
pub struct EnumItemShape {
    /// GraphQL name.
    pub name: String,
    /// Native value.
    pub value: Dynamic,
    /// Description.
    pub description: Option<String>,
    /// Deprecation reason.
    pub deprecation: Option<String>,
}

/// [`Enum`] implementation.
#[derive(Clone, Copy)]
pub struct EnumVTable {
    /// [`Enum::description()`].
    pub description: fn() -> String,
    /// [`Enum::name()`].
    pub name: fn() -> Option<String>,
    /// [`Enum::values()`].
    pub values: fn() -> Vec<EnumItemShape>,
    /// Finds the GraphQL name of a value.
    pub name_of: fn(Dynamic) -> Option<String>,
}

impl EnumVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Enum>() -> Self {
        Self {
            description: T::description,
            name: T::name,
            values: enum_values::<T>,
            name_of: enum_name_of::<T>,
        }
    }
}

fn enum_values<T: Enum>() -> Vec<EnumItemShape> {
    T::values()
        .into_iter()
        .map(|v| EnumItemShape {
            name: v.name,
            value: v.value.into_dynamic(),
            description: v.description,
            deprecation: v.deprecation,
        })
        .collect()
}

fn enum_name_of<T: Enum>(value: Dynamic) -> Option<String> {
    let value = T::from_dynamic(value).ok()?;
    T::values()
        .into_iter()
        .find(|v| v.value == value)
        .map(|v| v.name)
}

/// [`Scalar`] implementation.
#[derive(Clone, Copy)]
pub struct ScalarVTable {
    /// [`Scalar::description()`].
    pub description: fn() -> String,
    /// [`Scalar::name()`].
    pub name: fn() -> Option<String>,
    /// [`Scalar::serialize()`].
    pub serialize: fn(Dynamic) -> Result<Value, DecodeError>,
    /// [`Scalar::parse_value()`].
    pub parse_value: fn(&Value) -> Result<Dynamic, String>,
    /// [`Scalar::parse_literal()`].
    pub parse_literal: fn(&Value) -> Result<Dynamic, String>,
}

impl ScalarVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Scalar>() -> Self {
        Self {
            description: T::description,
            name: T::name,
            serialize: |v| T::from_dynamic(v).map(|s| s.serialize()),
            parse_value: |v| T::parse_value(v).map(Reflect::into_dynamic),
            parse_literal: |v| T::parse_literal(v).map(Reflect::into_dynamic),
        }
    }
}

/// [`Union`] implementation.
#[derive(Clone, Copy)]
pub struct UnionVTable {
    /// [`Union::description()`].
    pub description: fn() -> String,
    /// [`Union::name()`].
    pub name: fn() -> Option<String>,
    /// [`Union::members()`].
    pub members: fn() -> Vec<NativeType>,
    /// [`Union::into_member()`].
    pub into_member: fn(Dynamic) -> Result<Dynamic, DecodeError>,
}

impl UnionVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: Union>() -> Self {
        Self {
            description: T::description,
            name: T::name,
            members: T::members,
            into_member: |v| T::from_dynamic(v).map(Union::into_member),
        }
    }
}

/// [`RequestContext`] implementation.
#[derive(Clone, Copy)]
pub struct RequestContextVTable {
    /// [`RequestContext::from_request()`].
    pub from_request: fn(&http::request::Parts) -> Result<Dynamic, BoxError>,
}

impl RequestContextVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: RequestContext>() -> Self {
        Self {
            from_request: |parts| T::from_request(parts).map(Reflect::into_dynamic),
        }
    }
}

/// [`ResponseContext`] implementation.
#[derive(Clone, Copy)]
pub struct ResponseContextVTable {
    /// [`ResponseContext::finalize()`].
    pub finalize: fn(Dynamic, &mut http::HeaderMap) -> Result<(), BoxError>,
}

impl ResponseContextVTable {
    /// Takes the implementation of `T`.
    pub fn of<T: ResponseContext>() -> Self {
        Self {
            finalize: |v, headers| T::from_dynamic(v)?.finalize(headers),
        }
    }
}

/// Classifies native types against capabilities, caching the results per type.
#[derive(Default)]
pub struct Classifier {
    descriptors: FnvHashMap<TypeId, Arc<TypeDescriptor>>,
    probes: FnvHashMap<(TypeId, Capability), (bool, bool)>,
}

impl Classifier {
    /// Returns the (cached) descriptor of the given base type.
    pub fn descriptor(&mut self, base: &BaseType) -> Arc<TypeDescriptor> {
        self.descriptors
            .entry(base.id())
            .or_insert_with(|| Arc::new(base.descriptor()))
            .clone()
    }

    /// Checks whether `native` satisfies `capability` through a trait implementation.
    ///
    /// Lists are checked by their elements. Handles accept the implementation on either receiver
    /// form, while direct references check the value form first, then the handle one.
    pub fn implements(
        &mut self,
        native: &NativeType,
        capability: Capability,
    ) -> Result<(bool, UnwrappedInfo), RegistrationError> {
        let mut info = unwrap(native)?;
        let (on_value, on_handle) = self.probe(&info.base, capability);
        let found = if info.indirect {
            if on_handle {
                Some(Receiver::Handle)
            } else if on_value {
                Some(Receiver::Value)
            } else {
                None
            }
        } else if on_value {
            Some(Receiver::Value)
        } else if on_handle {
            Some(Receiver::Handle)
        } else {
            None
        };
        if let Some(receiver) = found {
            info.implementing = receiver;
        }
        Ok((found.is_some(), info))
    }

    /// Checks whether `native` declares `capability` with a zero-size marker field, returning
    /// the marker's tags.
    pub fn marked(
        &mut self,
        native: &NativeType,
        capability: Capability,
    ) -> Result<Option<(crate::reflect::Tags, UnwrappedInfo)>, RegistrationError> {
        let info = unwrap(native)?;
        let descriptor = self.descriptor(&info.base);
        Ok(descriptor.marker(capability).map(|m| (m.tags, info)))
    }

    /// Looks up the implementation of `capability` on the given base type.
    pub fn implementation(
        &mut self,
        base: &BaseType,
        capability: Capability,
        receiver: Receiver,
    ) -> Option<CapabilityImpl> {
        let descriptor = self.descriptor(base);
        descriptor
            .capabilities
            .find(capability, receiver)
            .or_else(|| descriptor.capabilities.get(capability))
            .cloned()
    }

    fn probe(&mut self, base: &BaseType, capability: Capability) -> (bool, bool) {
        if let Some(probe) = self.probes.get(&(base.id(), capability)) {
            return *probe;
        }
        let descriptor = self.descriptor(base);
        let probe = (
            descriptor
                .capabilities
                .find(capability, Receiver::Value)
                .is_some(),
            descriptor
                .capabilities
                .find(capability, Receiver::Handle)
                .is_some(),
        );
        _ = self.probes.insert((base.id(), capability), probe);
        probe
    }
}
