//! Common functions, definitions and extensions for parsing and code generation.

pub(crate) mod parse;
mod span_container;

pub(crate) use self::span_container::SpanContainer;

/// Filters the provided [`syn::Attribute`]s to contain only ones with the specified `name`.
pub(crate) fn filter_attrs<'a>(
    name: &'a str,
    attrs: &'a [syn::Attribute],
) -> impl Iterator<Item = &'a syn::Attribute> + 'a {
    attrs
        .iter()
        .filter(move |attr| attr.path().is_ident(name))
}

/// Collects the Rust doc comment out of the given `#[doc = ...]` attributes, joining its lines.
///
/// Leading whitespace of every line is trimmed, and empty lines become line breaks.
///
/// # Errors
///
/// If a found `#[doc = ...]` attribute isn't a string literal.
pub(crate) fn doc_comment(attrs: &[syn::Attribute]) -> syn::Result<Option<String>> {
    let mut lines = vec![];
    for attr in attrs {
        let syn::Meta::NameValue(nv) = &attr.meta else {
            continue;
        };
        if !nv.path.is_ident("doc") {
            continue;
        }
        let syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(lit),
            ..
        }) = &nv.value
        else {
            return Err(syn::Error::new_spanned(
                &nv.value,
                "#[doc] attributes may only have a string literal",
            ));
        };
        lines.push(lit.value());
    }
    if lines.is_empty() {
        return Ok(None);
    }
    let joined = lines
        .iter()
        .map(|line| line.trim())
        .fold(String::new(), |mut out, line| {
            if line.is_empty() {
                out.push('\n');
            } else {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                out.push_str(line);
            }
            out
        });
    let trimmed = joined.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_owned()))
}
