//! Expansion of `#[derive(Reflect)]` into a `gqlengine::reflect::Reflect` implementation.

use proc_macro2::TokenStream;
use quote::{ToTokens, quote};
use syn::{ext::IdentExt as _, parse_quote, spanned::Spanned as _};

use super::{ContainerAttr, FieldAttr, serde_rename};

/// Name of the attribute holding the arguments of this macro.
const ATTR_NAME: &str = "gql";

/// Expands `#[derive(Reflect)]` macro into generated code.
pub(crate) fn expand(input: TokenStream) -> syn::Result<TokenStream> {
    let ast = syn::parse2::<syn::DeriveInput>(input)?;
    let attr = ContainerAttr::from_attrs(ATTR_NAME, &ast.attrs)?;

    let shape = match &ast.data {
        syn::Data::Struct(data) => match &data.fields {
            syn::Fields::Named(fields) => Shape::Struct(
                fields
                    .named
                    .iter()
                    .map(Field::parse)
                    .collect::<syn::Result<_>>()?,
            ),
            syn::Fields::Unnamed(fields) if fields.unnamed.len() == 1 => {
                Shape::Newtype(fields.unnamed[0].ty.clone())
            }
            syn::Fields::Unnamed(fields) => {
                return Err(syn::Error::new(
                    fields.span(),
                    "tuple structs may only have a single field",
                ));
            }
            syn::Fields::Unit => Shape::Unit,
        },
        syn::Data::Enum(data) => {
            if data.variants.is_empty() {
                return Err(syn::Error::new(
                    ast.ident.span(),
                    "enums without variants cannot be reflected",
                ));
            }
            if data
                .variants
                .iter()
                .all(|v| matches!(v.fields, syn::Fields::Unit))
            {
                Shape::UnitEnum(data.variants.iter().map(|v| v.ident.clone()).collect())
            } else {
                Shape::Enum
            }
        }
        syn::Data::Union(_) => {
            return Err(syn::Error::new(
                ast.span(),
                "unions cannot be reflected, use an enum instead",
            ));
        }
    };

    let definition = Definition {
        ident: ast.ident,
        generics: ast.generics,
        attr,
        shape,
    };
    Ok(definition.into_token_stream())
}

/// Layout of the reflected type.
enum Shape {
    /// Struct with named fields.
    Struct(Vec<Field>),

    /// Tuple struct with a single field.
    Newtype(syn::Type),

    /// Struct without fields.
    Unit,

    /// Enum of unit variants only.
    UnitEnum(Vec<syn::Ident>),

    /// Enum with data-carrying variants.
    Enum,
}

/// Named struct field.
struct Field {
    ident: syn::Ident,
    ty: syn::Type,
    exported: bool,
    attr: FieldAttr,
    json: Option<String>,
}

impl Field {
    fn parse(field: &syn::Field) -> syn::Result<Self> {
        let attr = FieldAttr::from_attrs(ATTR_NAME, &field.attrs)?;
        if let Some(name) = &attr.name {
            if name.starts_with("__") {
                return Err(syn::Error::new(
                    name.span_joined(),
                    "names starting with `__` are reserved for introspection",
                ));
            }
        }
        if attr.embedded && attr.need_resolver {
            return Err(syn::Error::new(
                field.span(),
                "embedded fields cannot be resolved by a field resolver",
            ));
        }
        Ok(Self {
            ident: field
                .ident
                .clone()
                .ok_or_else(|| syn::Error::new(field.span(), "expected a named field"))?,
            ty: field.ty.clone(),
            exported: matches!(field.vis, syn::Visibility::Public(_)),
            json: serde_rename(&field.attrs)?,
            attr,
        })
    }

    /// Native identifier of this field, without the `r#` prefix.
    fn name(&self) -> String {
        self.ident.unraw().to_string()
    }

    /// Generates the `FieldShape` describing this field.
    fn shape(&self) -> TokenStream {
        let ident = &self.ident;
        let name = self.name();
        let ty = &self.ty;
        let exported = self.exported;

        let opt = |v: &Option<String>| match v {
            Some(s) => quote! { ::core::option::Option::Some(#s) },
            None => quote! { ::core::option::Option::None },
        };
        let json = opt(&self.json);
        let gql_name = opt(&self.attr.name.as_ref().map(|n| (**n).clone()));
        let desc = opt(&self.attr.desc.as_ref().map(|d| (**d).clone()));
        let deprecated = opt(&self.attr.deprecated.as_ref().map(|d| (**d).clone()));
        let default = opt(&self.attr.default.as_ref().map(|d| (**d).clone()));
        let FieldAttr {
            required,
            element_required,
            ignore,
            need_resolver,
            embedded,
            ..
        } = self.attr;

        quote! {
            ::gqlengine::reflect::FieldShape {
                ident: #name,
                native: <#ty as ::gqlengine::reflect::Reflect>::native,
                tags: ::gqlengine::reflect::Tags {
                    json: #json,
                    name: #gql_name,
                    desc: #desc,
                    deprecated: #deprecated,
                    default: #default,
                    required: #required,
                    element_required: #element_required,
                    ignore: #ignore,
                    need_resolver: #need_resolver,
                    embedded: #embedded,
                },
                exported: #exported,
                get: |this| {
                    this.downcast_ref::<Self>().map(|this| {
                        ::gqlengine::reflect::Reflect::into_dynamic(
                            ::core::clone::Clone::clone(&this.#ident),
                        )
                    })
                },
            }
        }
    }
}

/// Definition of the type `#[derive(Reflect)]` is applied to.
struct Definition {
    ident: syn::Ident,
    generics: syn::Generics,
    attr: ContainerAttr,
    shape: Shape,
}

impl ToTokens for Definition {
    fn to_tokens(&self, into: &mut TokenStream) {
        self.impl_reflect().to_tokens(into);
        self.assert_capabilities().to_tokens(into);
    }
}

impl Definition {
    /// Returns the native name of the type, used in decoding errors.
    fn name(&self) -> String {
        self.ident.unraw().to_string()
    }

    /// Returns generics of the `Reflect` implementation, bounding every type parameter with
    /// `Reflect`.
    fn impl_generics(&self) -> syn::Generics {
        let mut generics = self.generics.clone();
        let params = generics
            .type_params()
            .map(|p| p.ident.clone())
            .collect::<Vec<_>>();
        let where_clause = generics.make_where_clause();
        for param in params {
            where_clause
                .predicates
                .push(parse_quote! { #param: ::gqlengine::reflect::Reflect });
        }
        generics
    }

    /// Generates the capability table of the type.
    fn capabilities(&self) -> TokenStream {
        let entries = self.attr.capabilities.iter().map(|declared| {
            let (receiver, implementor) = if declared.handle {
                (
                    quote! { ::gqlengine::types::Receiver::Handle },
                    quote! { ::std::sync::Arc<Self> },
                )
            } else {
                (quote! { ::gqlengine::types::Receiver::Value }, quote! { Self })
            };
            let implementation = declared.capability.implementation(&implementor);
            quote! { .with(#receiver, #implementation) }
        });
        quote! {
            ::gqlengine::types::CapabilityTable::new() #( #entries )*
        }
    }

    /// Generates static assertions of the capabilities whose implementations carry no functions,
    /// so the trait is checked once, where the type is defined.
    ///
    /// Generic types are checked by their `describe()` instead.
    fn assert_capabilities(&self) -> TokenStream {
        if !self.generics.params.is_empty() {
            return quote! {};
        }
        let ident = &self.ident;
        let assertions = self.attr.capabilities.iter().filter_map(|declared| {
            let bound = declared.capability.bare_trait()?;
            let ty = if declared.handle {
                quote! { ::std::sync::Arc<#ident> }
            } else {
                quote! { #ident }
            };
            Some(quote! { ::gqlengine::sa::assert_impl_all!(#ty: #bound); })
        });
        quote! { #( #assertions )* }
    }

    /// Generates bound checks of the capabilities carrying no functions inside `describe()` of a
    /// generic type.
    fn check_generic_capabilities(&self) -> TokenStream {
        if self.generics.params.is_empty() {
            return quote! {};
        }
        let checks = self.attr.capabilities.iter().filter_map(|declared| {
            let bound = declared.capability.bare_trait()?;
            let ty = if declared.handle {
                quote! { ::std::sync::Arc<Self> }
            } else {
                quote! { Self }
            };
            Some(quote! {{
                fn implemented<T: ?::core::marker::Sized + #bound>() {}
                implemented::<#ty>();
            }})
        });
        quote! { #( #checks )* }
    }

    fn impl_reflect(&self) -> TokenStream {
        let ident = &self.ident;
        let generics = self.impl_generics();
        let (impl_generics, _, where_clause) = generics.split_for_impl();
        let (_, ty_generics, _) = self.generics.split_for_impl();

        let native = self.native();
        let fields = match &self.shape {
            Shape::Struct(fields) => {
                let shapes = fields.iter().filter(|f| !f.attr.ignore).map(Field::shape);
                quote! { ::std::vec![ #( #shapes ),* ] }
            }
            _ => quote! { ::std::vec::Vec::new() },
        };
        let capabilities = self.capabilities();
        let checks = self.check_generic_capabilities();
        let into_dynamic = self.into_dynamic();
        let from_dynamic = self.from_dynamic();

        quote! {
            #[automatically_derived]
            impl #impl_generics ::gqlengine::reflect::Reflect for #ident #ty_generics
                #where_clause
            {
                fn native() -> ::gqlengine::reflect::NativeType {
                    #native
                }

                fn describe() -> ::gqlengine::reflect::TypeDescriptor {
                    #checks
                    ::gqlengine::reflect::TypeDescriptor {
                        fields: #fields,
                        capabilities: #capabilities,
                    }
                }

                fn into_dynamic(self) -> ::gqlengine::reflect::Dynamic {
                    #into_dynamic
                }

                fn from_dynamic(
                    value: ::gqlengine::reflect::Dynamic,
                ) -> ::core::result::Result<Self, ::gqlengine::reflect::DecodeError> {
                    #from_dynamic
                }
            }
        }
    }

    fn native(&self) -> TokenStream {
        let kind = match &self.shape {
            Shape::Struct(_) | Shape::Unit => quote! { ::gqlengine::reflect::BaseKind::Struct },
            Shape::UnitEnum(_) | Shape::Enum => quote! { ::gqlengine::reflect::BaseKind::Enum },
            Shape::Newtype(inner) => quote! {
                match <#inner as ::gqlengine::reflect::Reflect>::native() {
                    ::gqlengine::reflect::NativeType::Base(base) => base.kind(),
                    _ => ::gqlengine::reflect::BaseKind::Struct,
                }
            },
        };
        quote! {
            ::gqlengine::reflect::NativeType::Base(
                ::gqlengine::reflect::BaseType::of::<Self>(#kind),
            )
        }
    }

    fn into_dynamic(&self) -> TokenStream {
        match &self.shape {
            Shape::Newtype(_) => quote! {
                ::gqlengine::reflect::Reflect::into_dynamic(self.0)
            },
            _ => quote! {
                ::gqlengine::reflect::Dynamic::Native(::gqlengine::reflect::Erased::new(self))
            },
        }
    }

    fn from_dynamic(&self) -> TokenStream {
        let name = self.name();
        let mismatch = quote! {
            ::gqlengine::reflect::DecodeError::Mismatch {
                expected: #name,
                found: other.kind(),
            }
        };
        let downcast = quote! {
            erased.downcast::<Self>().map_err(|e| {
                ::gqlengine::reflect::DecodeError::Mismatch {
                    expected: #name,
                    found: e.type_name(),
                }
            })
        };

        match &self.shape {
            Shape::Struct(fields) => {
                let decoded = fields.iter().any(|f| !f.attr.ignore);
                let binding = if decoded {
                    quote! { mut fields }
                } else {
                    quote! { _ }
                };
                let inits = fields.iter().map(|f| {
                    let ident = &f.ident;
                    if f.attr.ignore {
                        return quote! { #ident: ::core::default::Default::default() };
                    }
                    let ty = &f.ty;
                    let field_name = f.name();
                    quote! {
                        #ident: <#ty as ::gqlengine::reflect::Reflect>::from_dynamic(
                            fields.shift_remove(#field_name).unwrap_or_default(),
                        )
                        .map_err(|e| e.in_field(#field_name))?
                    }
                });
                quote! {
                    let #binding = match value {
                        ::gqlengine::reflect::Dynamic::Native(erased) => return #downcast,
                        ::gqlengine::reflect::Dynamic::Object(map) => map,
                        ::gqlengine::reflect::Dynamic::Null => ::core::default::Default::default(),
                        other => return ::core::result::Result::Err(#mismatch),
                    };
                    ::core::result::Result::Ok(Self { #( #inits ),* })
                }
            }
            Shape::Newtype(inner) => quote! {
                match value {
                    ::gqlengine::reflect::Dynamic::Native(erased) => match erased
                        .downcast::<Self>()
                    {
                        ::core::result::Result::Ok(v) => ::core::result::Result::Ok(v),
                        ::core::result::Result::Err(erased) => {
                            <#inner as ::gqlengine::reflect::Reflect>::from_dynamic(
                                ::gqlengine::reflect::Dynamic::Native(erased),
                            )
                            .map(Self)
                        }
                    },
                    other => {
                        <#inner as ::gqlengine::reflect::Reflect>::from_dynamic(other).map(Self)
                    }
                }
            },
            Shape::Unit => quote! {
                match value {
                    ::gqlengine::reflect::Dynamic::Null
                    | ::gqlengine::reflect::Dynamic::Native(_)
                    | ::gqlengine::reflect::Dynamic::Object(_) => ::core::result::Result::Ok(Self),
                    other => ::core::result::Result::Err(#mismatch),
                }
            },
            Shape::UnitEnum(variants) => {
                let first = &variants[0];
                let names = variants.iter().map(|v| v.unraw().to_string());
                quote! {
                    match value {
                        ::gqlengine::reflect::Dynamic::Native(erased) => #downcast,
                        ::gqlengine::reflect::Dynamic::Null => {
                            ::core::result::Result::Ok(Self::#first)
                        }
                        ::gqlengine::reflect::Dynamic::String(s) => match s.as_str() {
                            #( #names => ::core::result::Result::Ok(Self::#variants), )*
                            _ => ::core::result::Result::Err(
                                ::gqlengine::reflect::DecodeError::Unparsable {
                                    expected: #name,
                                    value: s,
                                },
                            ),
                        },
                        other => ::core::result::Result::Err(#mismatch),
                    }
                }
            }
            Shape::Enum => quote! {
                match value {
                    ::gqlengine::reflect::Dynamic::Native(erased) => #downcast,
                    other => ::core::result::Result::Err(#mismatch),
                }
            },
        }
    }
}
