//! Builders of root operations, applied when the engine is initialized.

use crate::{
    RegistrationError,
    plugin::OperationKind,
    resolve::{Handler, Resolver, Site},
    schema::Registry,
};

/// Deferred synthesis of a handler into a [`Resolver`].
pub(crate) type Synth = Box<
    dyn Fn(&mut Registry, &str, Site<'_>, bool) -> Result<Resolver, RegistrationError>
        + Send
        + Sync,
>;

pub(crate) fn synth<H, A>(handler: H) -> Synth
where
    H: Handler<A>,
    A: 'static,
{
    Box::new(move |registry, name, site, debug| {
        Resolver::synthesize(registry, name, handler.clone(), site, debug)
    })
}

/// Root operation declared on the engine, not synthesized yet.
pub(crate) struct Declaration {
    pub(crate) kind: OperationKind,
    pub(crate) paginated: bool,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) checkers: Vec<Synth>,
    pub(crate) handler: Synth,
    /// Unsubscribe handler of a subscription, or total count handler of a paged query.
    pub(crate) companion: Option<Synth>,
}

impl Declaration {
    pub(crate) fn new(kind: OperationKind, name: String, handler: Synth) -> Self {
        Self {
            kind,
            paginated: false,
            name,
            description: None,
            tags: vec![],
            checkers: vec![],
            handler,
            companion: None,
        }
    }
}

macro_rules! operation_builder {
    ($(#[$attr:meta])* $builder:ident) => {
        $(#[$attr])*
        #[must_use = "builders do nothing unless used"]
        pub struct $builder<'e> {
            pub(crate) decl: &'e mut Declaration,
        }

        impl $builder<'_> {
            /// Renames the operation.
            pub fn name(self, name: impl Into<String>) -> Self {
                self.decl.name = name.into();
                self
            }

            /// Describes the operation.
            pub fn description(self, description: impl Into<String>) -> Self {
                self.decl.description = Some(description.into());
                self
            }

            /// Lists the operation under the given tags of the `_tags` query.
            pub fn tags<I, S>(self, tags: I) -> Self
            where
                I: IntoIterator<Item = S>,
                S: Into<String>,
            {
                self.decl.tags.extend(tags.into_iter().map(Into::into));
                self
            }

            /// Runs `checker` before the operation's handler, failing the operation with the
            /// checker's error, if any.
            ///
            /// A checker accepts the same parameters as a handler, and returns no payload.
            /// Checkers run in the order they're added.
            pub fn wrap_with<H, A>(self, checker: H) -> Self
            where
                H: Handler<A>,
                A: 'static,
            {
                self.decl.checkers.push(synth(checker));
                self
            }
        }
    };
}

operation_builder!(
    /// Builder of a query, returned by [`Engine::query()`](crate::Engine::query).
    QueryBuilder
);

operation_builder!(
    /// Builder of a mutation, returned by [`Engine::mutation()`](crate::Engine::mutation).
    MutationBuilder
);

operation_builder!(
    /// Builder of a subscription, returned by
    /// [`Engine::subscription()`](crate::Engine::subscription).
    SubscriptionBuilder
);

operation_builder!(
    /// Builder of a paged query, returned by [`Engine::pagination()`](crate::Engine::pagination).
    ///
    /// A paged query requires its total count handler, given via [`PaginationBuilder::total()`].
    PaginationBuilder
);

impl SubscriptionBuilder<'_> {
    /// Specifies the handler tearing the subscription down.
    ///
    /// It's called once, with the [`SubscriptionSession`](crate::SubscriptionSession) returned
    /// by the subscribe handler, if any, when the subscriber stops the subscription or
    /// disconnects.
    pub fn on_unsubscribe<H, A>(self, handler: H) -> Self
    where
        H: Handler<A>,
        A: 'static,
    {
        self.decl.companion = Some(synth(handler));
        self
    }
}

impl PaginationBuilder<'_> {
    /// Specifies the handler counting all the elements, returning an integer.
    pub fn total<H, A>(self, handler: H) -> Self
    where
        H: Handler<A>,
        A: 'static,
    {
        self.decl.companion = Some(synth(handler));
        self
    }
}
