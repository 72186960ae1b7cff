use bytes::Bytes;

use super::Capability;
use crate::reflect::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType, Reflect};

macro_rules! marker {
    ($(#[$attr:meta])* $name:ident => $capability:ident) => {
        $(#[$attr])*
        ///
        /// Embed it as a field of a struct to declare the capability. Its `name` and `desc` tags
        /// supply the type's metadata. The `desc` tag is mandatory unless a trait implementation
        /// describes the type, and it's never needed for arguments bundles.
        #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
        pub struct $name;

        impl Reflect for $name {
            fn native() -> NativeType {
                NativeType::Base(BaseType::of::<Self>(BaseKind::Marker(Capability::$capability)))
            }

            fn into_dynamic(self) -> Dynamic {
                Dynamic::Null
            }

            fn from_dynamic(_: Dynamic) -> Result<Self, DecodeError> {
                Ok(Self)
            }
        }
    };
}

marker!(
    /// Marks its owner as a GraphQL object type.
    IsGraphQLObject => Object
);
marker!(
    /// Marks its owner as a GraphQL input object type.
    IsGraphQLInput => Input
);
marker!(
    /// Marks its owner as a GraphQL interface type.
    IsGraphQLInterface => Interface
);
marker!(
    /// Marks its owner as an arguments bundle.
    IsGraphQLArguments => Arguments
);

/// File received in a multipart request, exposed as the `Upload` input scalar.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Upload {
    /// Name of the file as sent by the client.
    pub filename: String,

    /// MIME type of the file, if sent.
    pub content_type: Option<String>,

    /// Content of the file.
    pub content: Bytes,
}

impl Reflect for Upload {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Upload))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Native(Erased::new(self))
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        match value {
            Dynamic::Null => Ok(Self::default()),
            v => v.downcast("Upload"),
        }
    }
}
