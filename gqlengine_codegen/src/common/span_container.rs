use derive_more::with_trait::Deref;
use proc_macro2::Span;

/// Parsed attribute value, remembering the span it was parsed from.
#[derive(Clone, Copy, Debug, Deref)]
pub(crate) struct SpanContainer<T> {
    expr: Option<Span>,
    ident: Span,
    #[deref]
    val: T,
}

impl<T> SpanContainer<T> {
    pub(crate) fn new(ident: Span, expr: Option<Span>, val: T) -> Self {
        Self { expr, ident, val }
    }

    pub(crate) fn span_ident(&self) -> Span {
        self.ident
    }

    /// Returns the span of the value, if any, or the one of the attribute argument otherwise.
    pub(crate) fn span_joined(&self) -> Span {
        self.expr.unwrap_or(self.ident)
    }
}
