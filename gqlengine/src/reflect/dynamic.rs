use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

use derive_more::with_trait::{Display, Error};
use indexmap::IndexMap;

/// Type-erased native value.
///
/// Cloning is cheap: the value is shared until it's taken out with [`Erased::downcast()`].
#[derive(Clone)]
pub struct Erased {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl Erased {
    /// Erases the type of the given `value`.
    pub fn new<T: Clone + Send + Sync + 'static>(value: T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: Arc::new(value),
        }
    }

    /// Returns the [`TypeId`] of the erased value.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the native name of the erased value's type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrows the erased value.
    pub fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &*self.value
    }

    /// Borrows the value if it's of type `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Takes the value out if it's of type `T`, cloning it when still shared.
    pub fn downcast<T: Clone + Send + Sync + 'static>(self) -> Result<T, Self> {
        let Self {
            type_id, type_name, ..
        } = self;
        match self.value.downcast::<T>() {
            Ok(v) => Ok(Arc::unwrap_or_clone(v)),
            Err(value) => Err(Self {
                type_id,
                type_name,
                value,
            }),
        }
    }
}

impl fmt::Debug for Erased {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Erased<{}>", self.type_name)
    }
}

/// Type-erased representation of a [`Reflect`](super::Reflect) value.
#[derive(Clone, Debug, Default)]
pub enum Dynamic {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Floating point number.
    Float(f64),
    /// String.
    String(String),
    /// Sequence of values.
    List(Vec<Dynamic>),
    /// Struct decoded field-wise, keyed by native field identifiers.
    Object(IndexMap<String, Dynamic>),
    /// Native value kept as is.
    Native(Erased),
}

impl Dynamic {
    /// Returns a short name of this value's variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Native(_) => "native",
        }
    }

    /// Indicates whether this value is [`Dynamic::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Decodes this value as a signed integer, weakly.
    pub fn weak_i64(&self, expected: &'static str) -> Result<i64, DecodeError> {
        match self {
            Self::Null => Ok(0),
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Int(n) => Ok(*n),
            Self::Uint(n) => i64::try_from(*n).map_err(|_| DecodeError::out_of_range(expected, n)),
            Self::Float(f) => Ok(f.trunc() as i64),
            Self::String(s) if s.is_empty() => Ok(0),
            Self::String(s) => s
                .trim()
                .parse()
                .map_err(|_| DecodeError::unparsable(expected, s)),
            other => Err(DecodeError::mismatch(expected, other)),
        }
    }

    /// Decodes this value as an unsigned integer, weakly.
    pub fn weak_u64(&self, expected: &'static str) -> Result<u64, DecodeError> {
        match self {
            Self::Uint(n) => Ok(*n),
            Self::String(s) if !s.is_empty() => s
                .trim()
                .parse()
                .map_err(|_| DecodeError::unparsable(expected, s)),
            other => {
                let n = other.weak_i64(expected)?;
                u64::try_from(n).map_err(|_| DecodeError::out_of_range(expected, n))
            }
        }
    }

    /// Decodes this value as a floating point number, weakly.
    pub fn weak_f64(&self, expected: &'static str) -> Result<f64, DecodeError> {
        match self {
            Self::Null => Ok(0.0),
            Self::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::Int(n) => Ok(*n as f64),
            Self::Uint(n) => Ok(*n as f64),
            Self::Float(f) => Ok(*f),
            Self::String(s) if s.is_empty() => Ok(0.0),
            Self::String(s) => s
                .trim()
                .parse()
                .map_err(|_| DecodeError::unparsable(expected, s)),
            other => Err(DecodeError::mismatch(expected, other)),
        }
    }

    /// Decodes this value as a boolean, weakly.
    pub fn weak_bool(&self) -> Result<bool, DecodeError> {
        match self {
            Self::Null => Ok(false),
            Self::Bool(b) => Ok(*b),
            Self::Int(n) => Ok(*n != 0),
            Self::Uint(n) => Ok(*n != 0),
            Self::Float(f) => Ok(*f != 0.0),
            Self::String(s) => match s.trim() {
                "" => Ok(false),
                "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
                "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
                _ => Err(DecodeError::unparsable("bool", s)),
            },
            other => Err(DecodeError::mismatch("bool", other)),
        }
    }

    /// Decodes this value as a string, weakly.
    pub fn weak_string(self) -> Result<String, DecodeError> {
        match self {
            Self::Null => Ok(String::new()),
            Self::Bool(b) => Ok(if b { "1" } else { "0" }.into()),
            Self::Int(n) => Ok(n.to_string()),
            Self::Uint(n) => Ok(n.to_string()),
            Self::Float(f) => Ok(f.to_string()),
            Self::String(s) => Ok(s),
            other => Err(DecodeError::mismatch("String", &other)),
        }
    }

    /// Decodes this value as a list, weakly: [`Dynamic::Null`] is an empty list, and any other
    /// single value is a list of one.
    pub fn weak_list(self) -> Vec<Dynamic> {
        match self {
            Self::Null => vec![],
            Self::List(items) => items,
            other => vec![other],
        }
    }

    /// Takes the erased native value out as `T`.
    pub fn downcast<T: Clone + Send + Sync + 'static>(
        self,
        expected: &'static str,
    ) -> Result<T, DecodeError> {
        match self {
            Self::Native(e) => e
                .downcast()
                .map_err(|e| DecodeError::Mismatch {
                    expected,
                    found: e.type_name(),
                }),
            other => Err(DecodeError::mismatch(expected, &other)),
        }
    }

    /// Borrows the erased native value, if this is one.
    pub fn as_erased(&self) -> Option<&Erased> {
        match self {
            Self::Native(e) => Some(e),
            _ => None,
        }
    }
}

impl From<Erased> for Dynamic {
    fn from(e: Erased) -> Self {
        Self::Native(e)
    }
}

/// Error of restoring a native value from a [`Dynamic`] one.
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum DecodeError {
    /// Value of an incompatible kind.
    #[display("cannot decode {found} into `{expected}`")]
    Mismatch {
        /// Expected native type.
        expected: &'static str,
        /// Found kind.
        found: &'static str,
    },

    /// Numeric value not representable in the target type.
    #[display("value {value} is out of range for `{expected}`")]
    OutOfRange {
        /// Expected native type.
        expected: &'static str,
        /// Rejected value.
        value: String,
    },

    /// String which doesn't parse into the target type.
    #[display("cannot parse \"{value}\" as `{expected}`")]
    Unparsable {
        /// Expected native type.
        expected: &'static str,
        /// Rejected value.
        value: String,
    },

    /// Failure of decoding a struct field.
    #[display("field `{field}`: {message}")]
    Field {
        /// Native identifier of the field.
        field: &'static str,
        /// Underlying error message.
        message: String,
    },
}

impl DecodeError {
    pub(crate) fn mismatch(expected: &'static str, found: &Dynamic) -> Self {
        Self::Mismatch {
            expected,
            found: found.kind(),
        }
    }

    fn out_of_range(expected: &'static str, value: impl ToString) -> Self {
        Self::OutOfRange {
            expected,
            value: value.to_string(),
        }
    }

    fn unparsable(expected: &'static str, value: &str) -> Self {
        Self::Unparsable {
            expected,
            value: value.into(),
        }
    }

    /// Attributes this error to the given struct field.
    pub fn in_field(self, field: &'static str) -> Self {
        Self::Field {
            field,
            message: self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weakly_decodes_integers() {
        assert_eq!(Dynamic::String("42".into()).weak_i64("i32"), Ok(42));
        assert_eq!(Dynamic::Bool(true).weak_i64("i32"), Ok(1));
        assert_eq!(Dynamic::Null.weak_i64("i32"), Ok(0));
        assert_eq!(Dynamic::Float(2.9).weak_i64("i32"), Ok(2));
        assert!(Dynamic::String("forty".into()).weak_i64("i32").is_err());
        assert!(Dynamic::Int(-1).weak_u64("u32").is_err());
    }

    #[test]
    fn weakly_decodes_bools_and_strings() {
        assert_eq!(Dynamic::String("1".into()).weak_bool(), Ok(true));
        assert_eq!(Dynamic::Int(0).weak_bool(), Ok(false));
        assert_eq!(Dynamic::Int(7).weak_string(), Ok("7".into()));
        assert_eq!(Dynamic::Bool(false).weak_string(), Ok("0".into()));
    }

    #[test]
    fn downcasts_erased_values() {
        let value = Dynamic::Native(Erased::new(vec![1u8, 2]));
        assert_eq!(value.clone().downcast::<Vec<u8>>("Vec<u8>"), Ok(vec![1, 2]));
        assert!(value.downcast::<String>("String").is_err());
    }
}
