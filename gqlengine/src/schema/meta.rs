//! Types used to describe a `GraphQL` schema

use std::{any::TypeId, fmt};

use arcstr::ArcStr;
use async_graphql::dynamic::TypeRef;

use crate::{
    Delegation, Value,
    reflect::{BaseKind, BaseType, Dynamic, FieldGetter},
    types::{EnumItemShape, ScalarVTable},
};

/// Role a base type is registered for.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Role {
    /// Type of input values: arguments and input object fields.
    Input,
    /// Type of output values: object fields and resolver results.
    Output,
    /// Paged-result wrapper synthesized around the type.
    Paginated,
}

/// Whether an item is deprecated, with context.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DeprecationStatus {
    /// The field/variant is not deprecated.
    Current,
    /// The field/variant is deprecated, with an optional reason
    Deprecated(Option<ArcStr>),
}

impl DeprecationStatus {
    pub(crate) fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            None => Self::Current,
            Some("") => Self::Deprecated(None),
            Some(reason) => Self::Deprecated(Some(reason.into())),
        }
    }

    /// If this deprecation status indicates the item is deprecated.
    pub fn is_deprecated(&self) -> bool {
        match self {
            Self::Current => false,
            Self::Deprecated(_) => true,
        }
    }

    /// An optional reason for the deprecation, or none if `Current`.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Current => None,
            Self::Deprecated(rsn) => rsn.as_deref(),
        }
    }
}

/// Builtin GraphQL scalar.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Builtin {
    /// `Int`.
    Int,
    /// `Float`.
    Float,
    /// `Boolean`.
    Boolean,
    /// `String`.
    String,
    /// `ID`, with the kind of its native representation.
    Id(BaseKind),
    /// `Upload`.
    Upload,
    /// `Void`, the result of mutations without payload.
    Void,
}

impl Builtin {
    /// Maps a primitive [`BaseKind`] onto its builtin scalar.
    pub fn of_kind(kind: BaseKind) -> Option<Self> {
        match kind {
            BaseKind::Int(_) | BaseKind::Uint(_) => Some(Self::Int),
            BaseKind::Float(_) => Some(Self::Float),
            BaseKind::Bool => Some(Self::Boolean),
            BaseKind::String => Some(Self::String),
            _ => None,
        }
    }

    /// Returns the GraphQL name of this scalar.
    pub fn name(self) -> &'static str {
        match self {
            Self::Int => TypeRef::INT,
            Self::Float => TypeRef::FLOAT,
            Self::Boolean => TypeRef::BOOLEAN,
            Self::String => TypeRef::STRING,
            Self::Id(_) => TypeRef::ID,
            Self::Upload => TypeRef::UPLOAD,
            Self::Void => "Void",
        }
    }
}

/// Named type a [`FieldType`] refers to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Named {
    /// Builtin scalar.
    Builtin(Builtin),
    /// Registered type, looked up in the registry by its native identity and role.
    Registered(TypeId, Role),
}

/// Reference to a schema type, with its list and non-null wrapping.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldType {
    #[doc(hidden)]
    pub named: Named,
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub is_list: bool,
    #[doc(hidden)]
    pub required: bool,
    #[doc(hidden)]
    pub element_required: bool,
}

impl FieldType {
    /// Creates a nullable, non-list reference to the given named type.
    pub fn new(named: Named, name: impl Into<ArcStr>) -> Self {
        Self {
            named,
            name: name.into(),
            is_list: false,
            required: false,
            element_required: false,
        }
    }

    /// Creates a nullable reference to the given builtin scalar.
    pub fn builtin(builtin: Builtin) -> Self {
        Self::new(Named::Builtin(builtin), builtin.name())
    }

    /// Wraps this reference into a list.
    #[must_use]
    pub fn list(mut self, is_list: bool) -> Self {
        self.is_list = is_list;
        self
    }

    /// Applies the `required` and `element_required` tags.
    #[must_use]
    pub fn required(mut self, required: bool, element_required: bool) -> Self {
        self.required = required;
        self.element_required = element_required;
        self
    }

    /// Constructs the reference of the execution engine.
    ///
    /// List elements are non-null when required, the list itself when the whole value is.
    pub fn type_ref(&self) -> TypeRef {
        let mut ty = TypeRef::named(self.name.as_str());
        if self.is_list {
            if self.element_required {
                ty = TypeRef::NonNull(Box::new(ty));
            }
            ty = TypeRef::List(Box::new(ty));
        }
        if self.required {
            ty = TypeRef::NonNull(Box::new(ty));
        }
        ty
    }

    /// Indicates whether both references point to the same named type with the same list-ness.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.named == other.named && self.is_list == other.is_list
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bang = |required| if required { "!" } else { "" };
        if self.is_list {
            write!(
                f,
                "[{}{}]{}",
                self.name,
                bang(self.element_required),
                bang(self.required),
            )
        } else {
            write!(f, "{}{}", self.name, bang(self.required))
        }
    }
}

/// Object type metadata
#[derive(Debug)]
pub struct ObjectMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub fields: Vec<Field>,
    #[doc(hidden)]
    pub interface_names: Vec<ArcStr>,
    #[doc(hidden)]
    pub delegation: Option<Delegation>,
}

/// Interface type metadata
#[derive(Debug)]
pub struct InterfaceMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub fields: Vec<Field>,
}

/// Input object metadata
#[derive(Debug)]
pub struct InputObjectMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub input_fields: Vec<Argument>,
}

/// Arguments bundle metadata, flattened into the arguments of a field.
#[derive(Debug)]
pub struct ArgumentsMeta {
    #[doc(hidden)]
    pub base: BaseType,
    #[doc(hidden)]
    pub arguments: Vec<Argument>,
}

/// Enum type metadata
pub struct EnumMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub values: Vec<EnumItemShape>,
    pub(crate) name_of: fn(Dynamic) -> Option<String>,
}

impl EnumMeta {
    /// Finds the native value of the GraphQL enum value with the given `name`.
    pub fn value_of(&self, name: &str) -> Option<&Dynamic> {
        self.values
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.value)
    }

    /// Finds the GraphQL name of the given native value.
    pub fn name_of(&self, value: Dynamic) -> Option<String> {
        (self.name_of)(value)
    }
}

impl fmt::Debug for EnumMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumMeta")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

/// Scalar type metadata
pub struct ScalarMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    pub(crate) hooks: ScalarVTable,
}

impl fmt::Debug for ScalarMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarMeta")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Union type metadata
pub struct UnionMeta {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub members: Vec<(TypeId, ArcStr)>,
    pub(crate) into_member: fn(Dynamic) -> Result<Dynamic, crate::reflect::DecodeError>,
}

impl fmt::Debug for UnionMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnionMeta")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

/// Generic type metadata
#[derive(Debug)]
pub enum MetaType {
    #[doc(hidden)]
    Scalar(ScalarMeta),
    #[doc(hidden)]
    Object(ObjectMeta),
    #[doc(hidden)]
    Enum(EnumMeta),
    #[doc(hidden)]
    Interface(InterfaceMeta),
    #[doc(hidden)]
    Union(UnionMeta),
    #[doc(hidden)]
    InputObject(InputObjectMeta),
}

impl MetaType {
    /// Access the name of the type
    pub fn name(&self) -> &ArcStr {
        match self {
            Self::Scalar(ScalarMeta { name, .. })
            | Self::Object(ObjectMeta { name, .. })
            | Self::Enum(EnumMeta { name, .. })
            | Self::Interface(InterfaceMeta { name, .. })
            | Self::Union(UnionMeta { name, .. })
            | Self::InputObject(InputObjectMeta { name, .. }) => name,
        }
    }

    /// Access the description of the type, if applicable
    pub fn description(&self) -> Option<&ArcStr> {
        match self {
            Self::Scalar(ScalarMeta { description, .. })
            | Self::Object(ObjectMeta { description, .. })
            | Self::Enum(EnumMeta { description, .. })
            | Self::Interface(InterfaceMeta { description, .. })
            | Self::Union(UnionMeta { description, .. })
            | Self::InputObject(InputObjectMeta { description, .. }) => description.as_ref(),
        }
    }

    /// Access a field's meta data given its name
    ///
    /// Only objects and interfaces have fields. This method always returns `None` for other types.
    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        match self {
            Self::Object(ObjectMeta { fields, .. })
            | Self::Interface(InterfaceMeta { fields, .. }) => {
                fields.iter().find(|f| f.name == name)
            }
            _ => None,
        }
    }

    /// Access an input field's meta data given its name
    ///
    /// Only input objects have input fields. This method always returns `None` for other types.
    pub fn input_field_by_name(&self, name: &str) -> Option<&Argument> {
        match self {
            Self::InputObject(InputObjectMeta { input_fields, .. }) => {
                input_fields.iter().find(|f| f.name == name)
            }
            _ => None,
        }
    }
}

/// Way a field is read out of the value of its object type.
#[derive(Clone)]
pub(crate) enum Access {
    /// Chain of getters, descending through embedded structs.
    Getters(Vec<FieldGetter>),
    /// Key of a value decoded field-wise.
    Key(&'static str),
}

/// Metadata for a field
#[derive(Clone)]
pub struct Field {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub field_type: FieldType,
    #[doc(hidden)]
    pub deprecation_status: DeprecationStatus,
    /// Native identifier of the field.
    pub ident: &'static str,
    /// Struct declaring the field, which differs from the object type for embedded fields.
    pub owner: BaseType,
    /// Field is resolved by a separately supplied function.
    pub need_resolver: bool,
    pub(crate) access: Access,
}

impl Field {
    /// Reads the owning struct of this field out of a value of the object type.
    pub(crate) fn read_owner(&self, object: &Dynamic) -> Option<Dynamic> {
        match &self.access {
            Access::Getters(path) => {
                let (_, parents) = path.split_last()?;
                descend(object, parents)
            }
            Access::Key(_) => Some(object.clone()),
        }
    }

    /// Reads this field out of a value of the object type.
    pub(crate) fn read(&self, object: &Dynamic) -> Option<Dynamic> {
        match &self.access {
            Access::Getters(path) => descend(object, path),
            Access::Key(key) => match object {
                Dynamic::Object(map) => map.get(*key).cloned(),
                _ => None,
            },
        }
    }
}

fn descend(object: &Dynamic, path: &[FieldGetter]) -> Option<Dynamic> {
    let mut value = object.clone();
    for get in path {
        value = get(value.as_erased()?.as_any())?;
    }
    Some(value)
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("field_type", &self.field_type)
            .field("deprecation_status", &self.deprecation_status)
            .field("ident", &self.ident)
            .field("need_resolver", &self.need_resolver)
            .finish_non_exhaustive()
    }
}

/// Metadata for an argument to a field, or for an input object field
#[derive(Clone, Debug)]
pub struct Argument {
    #[doc(hidden)]
    pub name: ArcStr,
    #[doc(hidden)]
    pub description: Option<ArcStr>,
    #[doc(hidden)]
    pub arg_type: FieldType,
    #[doc(hidden)]
    pub default_value: Option<Value>,
    #[doc(hidden)]
    pub deprecation_status: DeprecationStatus,
    /// Native identifiers leading to the field, through embedded structs.
    pub path: Vec<&'static str>,
}
