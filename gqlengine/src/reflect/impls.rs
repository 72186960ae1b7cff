use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::Arc,
};

use super::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType, Reflect};

macro_rules! impl_signed {
    ($($ty:ty => $bits:literal),* $(,)?) => {$(
        impl Reflect for $ty {
            fn native() -> NativeType {
                NativeType::Base(BaseType::of::<Self>(BaseKind::Int($bits)))
            }

            fn into_dynamic(self) -> Dynamic {
                Dynamic::Int(self as i64)
            }

            fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
                let n = value.weak_i64(stringify!($ty))?;
                Self::try_from(n).map_err(|_| DecodeError::OutOfRange {
                    expected: stringify!($ty),
                    value: n.to_string(),
                })
            }
        }
    )*};
}

macro_rules! impl_unsigned {
    ($($ty:ty => $bits:literal),* $(,)?) => {$(
        impl Reflect for $ty {
            fn native() -> NativeType {
                NativeType::Base(BaseType::of::<Self>(BaseKind::Uint($bits)))
            }

            fn into_dynamic(self) -> Dynamic {
                Dynamic::Uint(self as u64)
            }

            fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
                let n = value.weak_u64(stringify!($ty))?;
                Self::try_from(n).map_err(|_| DecodeError::OutOfRange {
                    expected: stringify!($ty),
                    value: n.to_string(),
                })
            }
        }
    )*};
}

impl_signed!(i8 => 8, i16 => 16, i32 => 32, i64 => 64, isize => 64);
impl_unsigned!(u8 => 8, u16 => 16, u32 => 32, u64 => 64, usize => 64);

impl Reflect for f32 {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Float(32)))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Float(self.into())
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.weak_f64("f32").map(|f| f as f32)
    }
}

impl Reflect for f64 {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Float(64)))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Float(self)
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.weak_f64("f64")
    }
}

impl Reflect for bool {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Bool))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Bool(self)
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.weak_bool()
    }
}

impl Reflect for String {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::String))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::String(self)
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.weak_string()
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn native() -> NativeType {
        NativeType::Indirect(Box::new(T::native()))
    }

    fn into_dynamic(self) -> Dynamic {
        self.map_or(Dynamic::Null, T::into_dynamic)
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        match value {
            Dynamic::Null => Ok(None),
            v => T::from_dynamic(v).map(Some),
        }
    }
}

impl<T: Reflect> Reflect for Box<T> {
    fn native() -> NativeType {
        NativeType::Indirect(Box::new(T::native()))
    }

    fn into_dynamic(self) -> Dynamic {
        (*self).into_dynamic()
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        T::from_dynamic(value).map(Box::new)
    }
}

impl<T: Reflect> Reflect for Arc<T> {
    fn native() -> NativeType {
        NativeType::Indirect(Box::new(T::native()))
    }

    fn into_dynamic(self) -> Dynamic {
        Arc::unwrap_or_clone(self).into_dynamic()
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        T::from_dynamic(value).map(Arc::new)
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn native() -> NativeType {
        NativeType::List(Box::new(T::native()))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::List(self.into_iter().map(T::into_dynamic).collect())
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.weak_list().into_iter().map(T::from_dynamic).collect()
    }
}

impl<T: Reflect, const N: usize> Reflect for [T; N] {
    fn native() -> NativeType {
        NativeType::List(Box::new(T::native()))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::List(self.into_iter().map(T::into_dynamic).collect())
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        let items = Vec::<T>::from_dynamic(value)?;
        let len = items.len();
        items.try_into().map_err(|_| DecodeError::OutOfRange {
            expected: std::any::type_name::<Self>(),
            value: format!("list of {len} items"),
        })
    }
}

macro_rules! impl_unsupported_map {
    ($($map:ident<$k:ident, $v:ident> where $($bound:path),+;)*) => {$(
        impl<$k, $v> Reflect for $map<$k, $v>
        where
            $k: Clone + Send + Sync + 'static $(+ $bound)+,
            $v: Clone + Send + Sync + 'static,
        {
            fn native() -> NativeType {
                NativeType::Unsupported("map")
            }

            fn into_dynamic(self) -> Dynamic {
                Dynamic::Native(Erased::new(self))
            }

            fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
                match value {
                    Dynamic::Null => Ok(Self::new()),
                    v => v.downcast(std::any::type_name::<Self>()),
                }
            }
        }
    )*};
}

impl_unsupported_map! {
    HashMap<K, V> where Eq, Hash;
    BTreeMap<K, V> where Ord;
}
