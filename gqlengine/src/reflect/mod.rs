//! Runtime type descriptors of native Rust types.
//!
//! Every type crossing the boundary between GraphQL and native code implements [`Reflect`]. The
//! trait exposes the *shape* of a type ([`NativeType`]), its field layout and declared
//! capabilities ([`TypeDescriptor`]), and a lossless conversion to and from the type-erased
//! [`Dynamic`] representation the resolvers operate on.
//!
//! Structs and enums get their implementation from `#[derive(Reflect)]`, primitives and standard
//! wrappers are covered by this module.

mod dynamic;
mod impls;

use std::{
    any::{Any, TypeId},
    fmt,
};

use crate::types::CapabilityTable;

pub use self::dynamic::{DecodeError, Dynamic, Erased};

/// Native type that can be described at runtime and converted to/from a [`Dynamic`] value.
pub trait Reflect: Clone + Send + Sync + Sized + 'static {
    /// Returns the shape of this type.
    fn native() -> NativeType;

    /// Returns the field layout and capability table of this type.
    ///
    /// Only meaningful for base types (structs and enums).
    fn describe() -> TypeDescriptor {
        TypeDescriptor::default()
    }

    /// Converts this value into its [`Dynamic`] representation.
    fn into_dynamic(self) -> Dynamic;

    /// Restores a value from its [`Dynamic`] representation.
    ///
    /// Decoding is weakly typed: numeric strings decode into numbers, booleans into `1`/`0`, and
    /// [`Dynamic::Null`] into the zero value of the type.
    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError>;
}

/// Shape of a native type reference.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeType {
    /// A base type: primitive, struct or enum.
    Base(BaseType),

    /// A handle to another type which may be absent (`Option<T>`, `Box<T>`, `Arc<T>`).
    Indirect(Box<NativeType>),

    /// A sequence of another type (`Vec<T>`, `[T; N]`).
    List(Box<NativeType>),

    /// A type which cannot be bound to GraphQL (maps, functions, channels).
    Unsupported(&'static str),
}

impl NativeType {
    /// Returns the [`BaseType`] reached after stripping lists and handles, if any.
    pub fn innermost(&self) -> Option<&BaseType> {
        match self {
            Self::Base(b) => Some(b),
            Self::Indirect(t) | Self::List(t) => t.innermost(),
            Self::Unsupported(_) => None,
        }
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Base(b) => f.write_str(b.name()),
            Self::Indirect(t) => write!(f, "Option<{t}>"),
            Self::List(t) => write!(f, "Vec<{t}>"),
            Self::Unsupported(what) => write!(f, "<{what}>"),
        }
    }
}

/// Kind of a [`BaseType`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BaseKind {
    /// Signed integer of the given bit width.
    Int(u8),
    /// Unsigned integer of the given bit width.
    Uint(u8),
    /// Floating point number of the given bit width.
    Float(u8),
    /// `bool`.
    Bool,
    /// `String`.
    String,
    /// Struct with named fields.
    Struct,
    /// Enum.
    Enum,
    /// Zero-size capability marker, like [`IsGraphQLObject`](crate::IsGraphQLObject).
    Marker(crate::types::Capability),
    /// [`FieldSelection`](crate::FieldSelection).
    Selection,
    /// Ambient [`Context`](crate::Context).
    Context,
    /// Subscription [`Feedback`](crate::Feedback) handle.
    Feedback,
    /// Uploaded file.
    Upload,
}

impl BaseKind {
    /// Indicates whether this kind is one of the builtin GraphQL scalars.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Self::Int(_) | Self::Uint(_) | Self::Float(_) | Self::Bool | Self::String,
        )
    }

    /// Indicates whether this kind is an integer.
    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int(_) | Self::Uint(_))
    }
}

/// Canonical, dereferenced, non-list type identity.
#[derive(Clone, Copy)]
pub struct BaseType {
    id: TypeId,
    name: &'static str,
    kind: BaseKind,
    describe: fn() -> TypeDescriptor,
}

impl BaseType {
    /// Describes `T` with its short type name.
    pub fn of<T: Reflect>(kind: BaseKind) -> Self {
        Self::named::<T>(short_type_name::<T>(), kind)
    }

    /// Describes `T` under the given `name`.
    pub fn named<T: Reflect>(name: &'static str, kind: BaseKind) -> Self {
        Self {
            id: TypeId::of::<T>(),
            name,
            kind,
            describe: T::describe,
        }
    }

    /// Returns the [`TypeId`] of this type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the native name of this type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the [`BaseKind`] of this type.
    pub fn kind(&self) -> BaseKind {
        self.kind
    }

    /// Returns the [`TypeDescriptor`] of this type.
    pub fn descriptor(&self) -> TypeDescriptor {
        (self.describe)()
    }
}

impl PartialEq for BaseType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for BaseType {}

impl fmt::Debug for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseType")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

/// Field layout and declared capabilities of a base type.
#[derive(Clone, Default)]
pub struct TypeDescriptor {
    /// Fields in declaration order.
    pub fields: Vec<FieldShape>,

    /// Capabilities the type implements.
    pub capabilities: CapabilityTable,
}

impl TypeDescriptor {
    /// Looks up a field by its native identifier.
    pub fn field(&self, ident: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.ident == ident)
    }

    /// Finds the capability marker field of the given kind.
    pub fn marker(&self, capability: crate::types::Capability) -> Option<&FieldShape> {
        self.fields
            .iter()
            .find(|f| f.marker_of() == Some(capability))
    }
}

/// Getter reading one field out of a type-erased struct value.
pub type FieldGetter = fn(&(dyn Any + Send + Sync)) -> Option<Dynamic>;

/// A single struct field.
#[derive(Clone, Copy)]
pub struct FieldShape {
    /// Native identifier of the field.
    pub ident: &'static str,

    /// Shape of the field's type.
    pub native: fn() -> NativeType,

    /// Metadata attached to the field.
    pub tags: Tags,

    /// Indicates whether the field is public.
    pub exported: bool,

    /// Reads this field from a value of the owning struct.
    pub get: FieldGetter,
}

impl FieldShape {
    /// Returns the capability this field marks its owner with, if it's a marker field.
    pub fn marker_of(&self) -> Option<crate::types::Capability> {
        match (self.native)() {
            NativeType::Base(b) => match b.kind() {
                BaseKind::Marker(c) => Some(c),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldShape")
            .field("ident", &self.ident)
            .field("native", &(self.native)())
            .field("tags", &self.tags)
            .field("exported", &self.exported)
            .finish_non_exhaustive()
    }
}

/// Metadata attached to a struct field via `#[gql(...)]` and `#[serde(rename = "...")]`
/// attributes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Tags {
    /// Name the field is serialized with.
    pub json: Option<&'static str>,

    /// Explicit GraphQL name.
    pub name: Option<&'static str>,

    /// GraphQL description.
    pub desc: Option<&'static str>,

    /// Deprecation reason.
    pub deprecated: Option<&'static str>,

    /// Literal default value, parsed according to the field's kind.
    pub default: Option<&'static str>,

    /// Field is non-null.
    pub required: bool,

    /// List elements are non-null.
    pub element_required: bool,

    /// Field is hidden from GraphQL.
    pub ignore: bool,

    /// Field is resolved by a function supplied with
    /// [`Engine::field_resolver()`](crate::Engine::field_resolver).
    pub need_resolver: bool,

    /// Field's own fields are flattened into the owner.
    pub embedded: bool,
}
