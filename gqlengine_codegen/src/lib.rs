#![doc = include_str!("../README.md")]
#![recursion_limit = "1024"]

mod common;
mod reflect;

use proc_macro::TokenStream;

/// `#[derive(Reflect)]` macro for deriving a `gqlengine::Reflect` implementation for structs and
/// enums.
///
/// # Structs
///
/// Every named field is described in declaration order, with its metadata taken from the
/// `#[gql(...)]` attribute placed on it:
///
/// ```rust,ignore
/// #[derive(Clone, Reflect, Deserialize)]
/// struct User {
///     #[gql(desc = "a user")]
///     _object: IsGraphQLObject,
///
///     #[gql(required, desc = "unique login")]
///     pub login: String,
///
///     #[serde(rename = "avatar_url")]
///     #[gql(deprecated = "use `picture` instead")]
///     pub avatar: Option<String>,
///
///     #[gql(need_resolver)]
///     pub friends: Vec<User>,
///
///     #[gql(embedded)]
///     pub audit: Audit,
///
///     #[gql(ignore)]
///     pub cache: Cache,
/// }
/// ```
///
/// Available field arguments:
/// - `name = "..."`: explicit GraphQL name of the field;
/// - `desc = "..."`: description, falling back to the doc comment of the field;
/// - `deprecated = "..."`: deprecation reason;
/// - `default = "..."`: literal default value of an input field;
/// - `required`: the field is non-null;
/// - `element_required`: elements of a list field are non-null;
/// - `need_resolver`: the field is resolved by a `field_resolver` handler;
/// - `embedded`: fields of the field's struct are flattened into the owner;
/// - `ignore`: the field is hidden, and isn't described at all (its type only has to implement
///   [`Default`]).
///
/// `#[serde(rename = "...")]` of a field is recorded as its serialized name.
///
/// A tuple struct with a single field is transparent: it reflects as its inner value, keeping
/// its own identity. This is the way to declare `ID` newtypes and custom scalars.
///
/// # Enums
///
/// An enum is reflected as an opaque native value, whose GraphQL representation is provided by
/// an `Enum` or `Union` implementation. An enum of unit variants additionally decodes from the
/// names of its variants, and its first variant is its zero value.
///
/// # Capabilities
///
/// The `#[gql(...)]` attribute placed on the type itself lists the capability traits the type
/// implements, so they're recorded in its descriptor:
///
/// ```rust,ignore
/// #[derive(Clone, Reflect)]
/// #[gql(object, interface(handle))]
/// struct Node { /* ... */ }
/// ```
///
/// Available capabilities are `object`, `input`, `enum`, `scalar`, `interface`, `union`, `id`,
/// `arguments`, `request_context`, `response_context` and `session`. Wrapping one into
/// `(handle)` declares it on `Arc<Self>` instead of `Self`.
#[proc_macro_derive(Reflect, attributes(gql))]
pub fn derive_reflect(input: TokenStream) -> TokenStream {
    reflect::derive::expand(input.into())
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
