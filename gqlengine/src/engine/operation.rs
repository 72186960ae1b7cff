//! Registered root operations, and the glue the execution engine calls them through.

use std::{any::TypeId, sync::Arc};

use async_graphql::dynamic::{FieldValue, ResolverContext};
use fnv::FnvHashMap;
use futures::{StreamExt as _, stream::BoxStream};

use crate::{
    FieldError, RequestScope,
    pagination::Pagination,
    plugin::OperationKind,
    reflect::Dynamic,
    resolve::{
        FieldSelection, Invocation, Resolver,
        codec::{self, Origin},
    },
    schema::{Argument, Catalog, Field, FieldType},
    subscription::{Feedback, OnClose, SubscriptionSlot},
};

/// What a root operation resolves through.
#[derive(Debug)]
pub(crate) enum Target {
    Single(Resolver),
    Paginated(Pagination),
    Subscription {
        subscribe: Resolver,
        unsubscribe: Option<Resolver>,
    },
}

/// Synthesized root field.
#[derive(Debug)]
pub(crate) struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) tags: Vec<String>,
    pub(crate) checkers: Vec<Resolver>,
    pub(crate) target: Target,
}

impl Operation {
    /// Returns the type of the root field.
    pub(crate) fn payload(&self) -> Option<&FieldType> {
        match &self.target {
            Target::Single(resolver) => resolver.payload(),
            Target::Paginated(pagination) => Some(pagination.wrapper()),
            Target::Subscription { subscribe, .. } => subscribe.payload(),
        }
    }

    /// Returns the schema arguments of the root field, the handler's ones first, then the ones
    /// of the checkers not declared by the handler.
    pub(crate) fn arguments(&self) -> Vec<Argument> {
        let mut out: Vec<Argument> = match &self.target {
            Target::Single(resolver) | Target::Subscription { subscribe: resolver, .. } => resolver
                .arguments()
                .map(|meta| meta.arguments.clone())
                .unwrap_or_default(),
            Target::Paginated(pagination) => pagination.arguments().to_vec(),
        };
        for arg in self
            .checkers
            .iter()
            .filter_map(Resolver::arguments)
            .flat_map(|meta| meta.arguments.iter())
        {
            if !out.iter().any(|a| a.name == arg.name) {
                out.push(arg.clone());
            }
        }
        out
    }
}

/// Settles the `result` of resolving a field of type `ty`.
///
/// A failed nullable field resolves to `null`, and its error is reported under the field's
/// path. A failed non-null field propagates its error to the parent.
pub(crate) fn settle<'a>(
    ctx: &ResolverContext<'a>,
    ty: Option<&FieldType>,
    result: Result<Option<FieldValue<'a>>, FieldError>,
) -> async_graphql::Result<Option<FieldValue<'a>>> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if ty.is_some_and(|ty| ty.required) => Err(e.into()),
        Err(e) => {
            let error = async_graphql::Error::from(e).into_server_error(ctx.ctx.item.pos);
            ctx.ctx.add_error(ctx.ctx.set_error_path(error));
            Ok(None)
        }
    }
}

/// State shared by all the resolver closures of a finalized schema.
#[derive(Debug)]
pub(crate) struct Runtime {
    pub(crate) catalog: Catalog,
    pub(crate) field_resolvers: FnvHashMap<(TypeId, &'static str), Resolver>,
}

impl Runtime {
    /// Returns the scope of the request being executed, if any.
    pub(crate) fn scope(&self, ctx: &ResolverContext<'_>) -> Option<Arc<RequestScope>> {
        ctx.data_opt::<Arc<RequestScope>>().cloned()
    }

    /// Collects the inputs of a `resolver` call, decoding its arguments bundle.
    pub(crate) fn invocation(
        &self,
        ctx: &ResolverContext<'_>,
        resolver: &Resolver,
    ) -> Result<Invocation, FieldError> {
        let arguments = resolver
            .arguments()
            .map(|meta| {
                codec::decode_fields(
                    &self.catalog,
                    ctx.ctx,
                    &meta.arguments,
                    ctx.args.as_index_map(),
                    Origin::Arguments(&ctx.ctx.item.node),
                )
            })
            .transpose()?;
        Ok(self.invocation_with(ctx, resolver, arguments))
    }

    /// Collects the inputs of a `resolver` call, with already decoded `arguments`.
    pub(crate) fn invocation_with(
        &self,
        ctx: &ResolverContext<'_>,
        resolver: &Resolver,
        arguments: Option<Dynamic>,
    ) -> Invocation {
        Invocation {
            arguments,
            scope: self.scope(ctx),
            selection: resolver
                .needs_selection()
                .then(|| FieldSelection::new(ctx.ctx.field())),
            ..Invocation::default()
        }
    }

    async fn check(&self, ctx: &ResolverContext<'_>, op: &Operation) -> Result<(), FieldError> {
        for checker in &op.checkers {
            _ = checker.invoke(self.invocation(ctx, checker)?).await?;
        }
        Ok(())
    }

    /// Resolves a query or mutation root field.
    pub(crate) async fn resolve_operation<'a>(
        &self,
        ctx: &ResolverContext<'a>,
        op: &Operation,
    ) -> Result<Option<FieldValue<'a>>, FieldError> {
        self.check(ctx, op).await?;
        let (ty, value) = match &op.target {
            Target::Single(resolver) => {
                let outcome = resolver.invoke(self.invocation(ctx, resolver)?).await?;
                (resolver.payload(), outcome.payload)
            }
            Target::Paginated(pagination) => (
                Some(pagination.wrapper()),
                pagination.resolve(self, ctx).await?,
            ),
            Target::Subscription { .. } => {
                return Err(FieldError::internal(format!(
                    "subscription {} resolved as a field",
                    op.name,
                )));
            }
        };
        match ty {
            Some(ty) => codec::encode(&self.catalog, ty, value).map(Some),
            None => Ok(None),
        }
    }

    /// Starts a subscription root field, returning the stream of values sent through its
    /// [`Feedback`].
    ///
    /// The subscription registers itself into the [`SubscriptionSlot`] of the request, if any,
    /// only once its subscribe handler succeeded.
    pub(crate) async fn subscribe<'a>(
        self: Arc<Self>,
        ctx: &ResolverContext<'a>,
        op: &Operation,
    ) -> Result<BoxStream<'a, async_graphql::Result<FieldValue<'a>>>, FieldError> {
        let Target::Subscription {
            subscribe,
            unsubscribe,
        } = &op.target
        else {
            return Err(FieldError::internal(format!(
                "{} is not a subscription",
                op.name,
            )));
        };
        self.check(ctx, op).await?;

        let (Some(ty), Some(base)) = (subscribe.payload().cloned(), subscribe.payload_base())
        else {
            return Err(FieldError::internal(format!(
                "subscription {} has no payload",
                op.name,
            )));
        };
        let (feedback, values) = Feedback::channel(base.id(), ty.is_list, base.name());
        let mut input = self.invocation(ctx, subscribe)?;
        input.feedback = Some(feedback.clone());
        let scope = input.scope.clone();
        let outcome = subscribe.invoke(input).await?;

        let on_close = unsubscribe.clone().map(|unsubscribe| {
            let name = op.name.clone();
            let on_close: OnClose = Box::new(move |session| {
                Box::pin(async move {
                    let input = Invocation {
                        scope,
                        session,
                        ..Invocation::default()
                    };
                    if let Err(e) = unsubscribe.invoke(input).await {
                        tracing::warn!(subscription = name, "unsubscribe failed: {}", e.message());
                    }
                })
            });
            on_close
        });
        feedback.subscribed(outcome.session, on_close);
        if let Some(slot) = ctx.data_opt::<SubscriptionSlot>() {
            slot.register(feedback);
        }

        let runtime = self.clone();
        Ok(values
            .map(move |value| {
                codec::encode(&runtime.catalog, &ty, value).map_err(async_graphql::Error::from)
            })
            .boxed())
    }

    /// Resolves a field of an object type, through its field resolver if it has one.
    pub(crate) async fn resolve_field<'a>(
        &self,
        ctx: &ResolverContext<'a>,
        field: &Field,
    ) -> Result<Option<FieldValue<'a>>, FieldError> {
        let Some(parent) = ctx.parent_value.downcast_ref::<Dynamic>() else {
            return Err(FieldError::internal(format!(
                "missing parent of field {}",
                field.name,
            )));
        };
        let value = match self
            .field_resolvers
            .get(&(field.owner.id(), field.ident))
            .filter(|_| field.need_resolver)
        {
            Some(resolver) => {
                let mut input = self.invocation(ctx, resolver)?;
                input.source = field.read_owner(parent);
                resolver.invoke(input).await?.payload
            }
            None => field.read(parent).unwrap_or_default(),
        };
        codec::encode(&self.catalog, &field.field_type, value).map(Some)
    }
}
