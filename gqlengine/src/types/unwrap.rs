//! Normalization of native type references.

use super::Receiver;
use crate::{
    RegistrationError,
    reflect::{BaseType, NativeType},
};

/// Normalized shape of a native type reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnwrappedInfo {
    /// Reference is a list of the base type.
    pub is_list: bool,

    /// Reference (or its list element) goes through a handle which may be absent.
    pub indirect: bool,

    /// Receiver form which satisfied the classified capability.
    pub implementing: Receiver,

    /// Canonical, dereferenced, non-list type.
    pub base: BaseType,
}

/// Strips lists and handles from the given native type reference.
///
/// # Errors
///
/// - [`RegistrationError::NestedList`] for lists of lists.
/// - [`RegistrationError::IndirectToNonBase`] for handles to lists or to other handles.
/// - [`RegistrationError::UnsupportedType`] for anything which isn't a base type.
pub fn unwrap(native: &NativeType) -> Result<UnwrappedInfo, RegistrationError> {
    match native {
        NativeType::List(elem) => {
            let (indirect, base) = match &**elem {
                NativeType::List(_) => {
                    return Err(RegistrationError::NestedList {
                        ty: native.to_string(),
                    });
                }
                NativeType::Indirect(_) => {
                    let info = unwrap(elem)?;
                    (true, info.base)
                }
                NativeType::Base(b) => (false, *b),
                NativeType::Unsupported(_) => {
                    return Err(RegistrationError::UnsupportedType {
                        ty: native.to_string(),
                    });
                }
            };
            Ok(UnwrappedInfo {
                is_list: true,
                indirect,
                implementing: Receiver::Value,
                base,
            })
        }
        NativeType::Indirect(pointee) => match &**pointee {
            NativeType::Base(b) => Ok(UnwrappedInfo {
                is_list: false,
                indirect: true,
                implementing: Receiver::Value,
                base: *b,
            }),
            _ => Err(RegistrationError::IndirectToNonBase {
                ty: native.to_string(),
            }),
        },
        NativeType::Base(b) => Ok(direct(*b)),
        NativeType::Unsupported(_) => Err(RegistrationError::UnsupportedType {
            ty: native.to_string(),
        }),
    }
}

fn direct(base: BaseType) -> UnwrappedInfo {
    UnwrappedInfo {
        is_list: false,
        indirect: false,
        implementing: Receiver::Value,
        base,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::*;
    use crate::reflect::{BaseKind, Reflect};

    #[test]
    fn unwraps_lists_and_handles() {
        let info = unwrap(&Vec::<Option<i32>>::native()).unwrap();
        assert!(info.is_list);
        assert!(info.indirect);
        assert_eq!(info.base.kind(), BaseKind::Int(32));

        let info = unwrap(&Arc::<String>::native()).unwrap();
        assert!(!info.is_list);
        assert!(info.indirect);
        assert_eq!(info.base, *String::native().innermost().unwrap());

        let info = unwrap(&bool::native()).unwrap();
        assert!(!info.is_list && !info.indirect);
    }

    #[test]
    fn rejects_unsupported_shapes() {
        assert!(matches!(
            unwrap(&Vec::<Vec<u8>>::native()),
            Err(RegistrationError::NestedList { .. }),
        ));
        assert!(matches!(
            unwrap(&Option::<Vec<u8>>::native()),
            Err(RegistrationError::IndirectToNonBase { .. }),
        ));
        assert!(matches!(
            unwrap(&Option::<Box<u8>>::native()),
            Err(RegistrationError::IndirectToNonBase { .. }),
        ));
        assert!(matches!(
            unwrap(&HashMap::<String, u8>::native()),
            Err(RegistrationError::UnsupportedType { .. }),
        ));
    }

    #[test]
    fn is_pure() {
        let native = Vec::<Box<f64>>::native();
        assert_eq!(unwrap(&native), unwrap(&native));
    }
}
