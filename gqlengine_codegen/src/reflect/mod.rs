//! Code generation for `#[derive(Reflect)]`.

pub(crate) mod derive;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    parse::{Parse, ParseStream},
    spanned::Spanned,
    token,
};

use crate::common::{
    SpanContainer, doc_comment, filter_attrs,
    parse::{
        ParseBufferExt as _,
        attr::{OptionExt as _, err},
    },
};

/// Capability trait a type declares in its `#[gql(...)]` attribute.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Capability {
    Object,
    Input,
    Enum,
    Scalar,
    Interface,
    Union,
    Id,
    Arguments,
    RequestContext,
    ResponseContext,
    Session,
}

impl Capability {
    fn parse_name(ident: &syn::Ident) -> syn::Result<Self> {
        Ok(match ident.to_string().as_str() {
            "object" => Self::Object,
            "input" => Self::Input,
            "enum" => Self::Enum,
            "scalar" => Self::Scalar,
            "interface" => Self::Interface,
            "union" => Self::Union,
            "id" => Self::Id,
            "arguments" => Self::Arguments,
            "request_context" => Self::RequestContext,
            "response_context" => Self::ResponseContext,
            "session" => Self::Session,
            name => return Err(err::unknown_arg(ident, name)),
        })
    }

    /// Generates the `CapabilityImpl` of this capability, implemented by the `implementor` type.
    fn implementation(self, implementor: &TokenStream) -> TokenStream {
        let vtable = |name: &str| {
            let variant = syn::Ident::new(name, proc_macro2::Span::call_site());
            let vtable = quote::format_ident!("{name}VTable");
            quote! {
                ::gqlengine::types::CapabilityImpl::#variant(
                    ::gqlengine::types::#vtable::of::<#implementor>(),
                )
            }
        };
        match self {
            Self::Object => vtable("Object"),
            Self::Input => vtable("Input"),
            Self::Enum => vtable("Enum"),
            Self::Scalar => vtable("Scalar"),
            Self::Interface => vtable("Interface"),
            Self::Union => vtable("Union"),
            Self::RequestContext => vtable("RequestContext"),
            Self::ResponseContext => vtable("ResponseContext"),
            Self::Id => quote! { ::gqlengine::types::CapabilityImpl::Id },
            Self::Arguments => quote! { ::gqlengine::types::CapabilityImpl::Arguments },
            Self::Session => quote! { ::gqlengine::types::CapabilityImpl::Session },
        }
    }

    /// Returns the trait of this capability, if its implementation carries no functions to
    /// check it by.
    fn bare_trait(self) -> Option<TokenStream> {
        match self {
            Self::Id => Some(quote! { ::gqlengine::types::Id }),
            Self::Arguments => Some(quote! { ::gqlengine::types::Arguments }),
            Self::Session => Some(quote! { ::gqlengine::types::SubscriptionSession }),
            _ => None,
        }
    }
}

/// Capability declared on a type, on either its value or its `Arc` handle.
#[derive(Clone, Copy, Debug)]
struct Declared {
    capability: Capability,
    handle: bool,
}

/// Available arguments behind `#[gql]` attribute placed on a struct or enum definition.
#[derive(Debug, Default)]
struct ContainerAttr {
    /// Capabilities the type implements, in declaration order.
    capabilities: Vec<SpanContainer<Declared>>,
}

impl Parse for ContainerAttr {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut out = Self::default();
        while !input.is_empty() {
            let ident = input.parse_any_ident()?;
            let capability = Capability::parse_name(&ident)?;
            let handle = if input.is_next::<token::Paren>() {
                let inner;
                _ = syn::parenthesized!(inner in input);
                let receiver = inner.parse_any_ident()?;
                if receiver != "handle" {
                    return Err(err::unknown_arg(&receiver, &receiver.to_string()));
                }
                true
            } else {
                false
            };
            if out
                .capabilities
                .iter()
                .any(|c| c.capability == capability && c.handle == handle)
            {
                return Err(err::dup_arg(&ident));
            }
            out.capabilities.push(SpanContainer::new(
                ident.span(),
                None,
                Declared { capability, handle },
            ));
            input.try_parse::<token::Comma>()?;
        }
        Ok(out)
    }
}

impl ContainerAttr {
    /// Parses [`ContainerAttr`] from the given multiple `name`d [`syn::Attribute`]s.
    fn from_attrs(name: &str, attrs: &[syn::Attribute]) -> syn::Result<Self> {
        filter_attrs(name, attrs)
            .map(|attr| attr.parse_args::<Self>())
            .try_fold(Self::default(), |mut prev, curr| {
                for declared in curr?.capabilities {
                    if prev
                        .capabilities
                        .iter()
                        .any(|c| c.capability == declared.capability && c.handle == declared.handle)
                    {
                        return Err(err::dup_arg(declared.span_ident()));
                    }
                    prev.capabilities.push(declared);
                }
                Ok(prev)
            })
    }
}

/// Available arguments behind `#[gql]` attribute placed on a struct field.
#[derive(Debug, Default)]
struct FieldAttr {
    name: Option<SpanContainer<String>>,
    desc: Option<SpanContainer<String>>,
    deprecated: Option<SpanContainer<String>>,
    default: Option<SpanContainer<String>>,
    required: bool,
    element_required: bool,
    ignore: bool,
    need_resolver: bool,
    embedded: bool,
}

impl Parse for FieldAttr {
    fn parse(input: ParseStream<'_>) -> syn::Result<Self> {
        let mut out = Self::default();
        while !input.is_empty() {
            let ident = input.parse_any_ident()?;
            match ident.to_string().as_str() {
                "name" | "desc" | "description" | "deprecated" => {
                    input.parse::<token::Eq>()?;
                    let lit = input.parse::<syn::LitStr>()?;
                    let slot = match ident.to_string().as_str() {
                        "name" => &mut out.name,
                        "deprecated" => &mut out.deprecated,
                        _ => &mut out.desc,
                    };
                    slot.replace(SpanContainer::new(ident.span(), Some(lit.span()), lit.value()))
                        .none_or_else(|_| err::dup_arg(&ident))?;
                }
                "default" => {
                    input.parse::<token::Eq>()?;
                    let lit = input.parse::<syn::Lit>()?;
                    let value = literal(&lit)?;
                    out.default
                        .replace(SpanContainer::new(ident.span(), Some(lit.span()), value))
                        .none_or_else(|_| err::dup_arg(&ident))?;
                }
                "required" => set_flag(&mut out.required, &ident)?,
                "element_required" => set_flag(&mut out.element_required, &ident)?,
                "ignore" | "skip" => set_flag(&mut out.ignore, &ident)?,
                "need_resolver" => set_flag(&mut out.need_resolver, &ident)?,
                "embedded" => set_flag(&mut out.embedded, &ident)?,
                name => return Err(err::unknown_arg(&ident, name)),
            }
            input.try_parse::<token::Comma>()?;
        }
        Ok(out)
    }
}

fn set_flag(flag: &mut bool, ident: &syn::Ident) -> syn::Result<()> {
    if *flag {
        return Err(err::dup_arg(ident));
    }
    *flag = true;
    Ok(())
}

/// Renders a literal default value the way it's written.
fn literal(lit: &syn::Lit) -> syn::Result<String> {
    Ok(match lit {
        syn::Lit::Str(s) => s.value(),
        syn::Lit::Int(i) => i.base10_digits().to_owned(),
        syn::Lit::Float(f) => f.base10_digits().to_owned(),
        syn::Lit::Bool(b) => b.value.to_string(),
        other => {
            return Err(syn::Error::new(
                other.span(),
                "default value must be a string, number or boolean literal",
            ));
        }
    })
}

impl FieldAttr {
    /// Parses [`FieldAttr`] from the given multiple `name`d [`syn::Attribute`]s, falling back to
    /// the doc comment for the description.
    fn from_attrs(name: &str, attrs: &[syn::Attribute]) -> syn::Result<Self> {
        let mut out = Self::default();
        for attr in filter_attrs(name, attrs) {
            let curr = attr.parse_args::<Self>()?;
            for (slot, value) in [
                (&mut out.name, curr.name),
                (&mut out.desc, curr.desc),
                (&mut out.deprecated, curr.deprecated),
                (&mut out.default, curr.default),
            ] {
                if let Some(value) = value {
                    let span = value.span_ident();
                    slot.replace(value).none_or_else(|_| err::dup_arg(span))?;
                }
            }
            out.required |= curr.required;
            out.element_required |= curr.element_required;
            out.ignore |= curr.ignore;
            out.need_resolver |= curr.need_resolver;
            out.embedded |= curr.embedded;
        }
        if out.desc.is_none() {
            out.desc = doc_comment(attrs)?.map(|d| {
                let span = attrs
                    .iter()
                    .find(|a| a.path().is_ident("doc"))
                    .map_or_else(proc_macro2::Span::call_site, Spanned::span);
                SpanContainer::new(span, None, d)
            });
        }
        Ok(out)
    }
}

/// Reads the serialized name of a field out of its `#[serde(rename = "...")]` attribute.
///
/// Other `serde` arguments are skipped, as is the `rename(serialize = "...")` form.
fn serde_rename(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut out = None;
    for attr in filter_attrs("serde", attrs) {
        let metas = attr.parse_args_with(
            syn::punctuated::Punctuated::<syn::Meta, token::Comma>::parse_terminated,
        )?;
        for meta in metas {
            let syn::Meta::NameValue(nv) = meta else {
                continue;
            };
            if !nv.path.is_ident("rename") {
                continue;
            }
            if let syn::Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) = &nv.value
            {
                out = Some(lit.value());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod attr_spec {
    use syn::parse_quote;

    use super::*;

    #[test]
    fn parses_field_tags() {
        let field: syn::Field = parse_quote! {
            /// Login of the user.
            #[serde(rename = "user_login", default)]
            #[gql(required, name = "login", default = 10)]
            #[gql(deprecated = "use `handle`")]
            pub login: String
        };

        let attr = FieldAttr::from_attrs("gql", &field.attrs).unwrap();
        assert!(attr.required);
        assert!(!attr.ignore);
        assert_eq!(attr.name.as_ref().map(|v| v.as_str()), Some("login"));
        assert_eq!(attr.default.as_ref().map(|v| v.as_str()), Some("10"));
        assert_eq!(
            attr.deprecated.as_ref().map(|v| v.as_str()),
            Some("use `handle`"),
        );
        assert_eq!(
            attr.desc.as_ref().map(|v| v.as_str()),
            Some("Login of the user."),
        );
        assert_eq!(
            serde_rename(&field.attrs).unwrap().as_deref(),
            Some("user_login"),
        );
    }

    #[test]
    fn rejects_duplicates() {
        let attrs: Vec<syn::Attribute> = vec![
            parse_quote! { #[gql(name = "a")] },
            parse_quote! { #[gql(name = "b")] },
        ];
        assert!(FieldAttr::from_attrs("gql", &attrs).is_err());

        let attrs: Vec<syn::Attribute> = vec![parse_quote! { #[gql(object, object)] }];
        assert!(ContainerAttr::from_attrs("gql", &attrs).is_err());
    }

    #[test]
    fn rejects_unknown_arguments() {
        let attrs: Vec<syn::Attribute> = vec![parse_quote! { #[gql(nullable)] }];
        let err = FieldAttr::from_attrs("gql", &attrs).unwrap_err();
        assert_eq!(err.to_string(), "unknown `nullable` attribute argument");
    }

    #[test]
    fn parses_capabilities() {
        let attrs: Vec<syn::Attribute> = vec![
            parse_quote! { #[gql(object, enum)] },
            parse_quote! { #[gql(interface(handle), object(handle))] },
        ];

        let attr = ContainerAttr::from_attrs("gql", &attrs).unwrap();
        assert_eq!(
            attr.capabilities
                .iter()
                .map(|c| (c.capability, c.handle))
                .collect::<Vec<_>>(),
            [
                (Capability::Object, false),
                (Capability::Enum, false),
                (Capability::Interface, true),
                (Capability::Object, true),
            ],
        );
    }
}
