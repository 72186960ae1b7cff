//! Synthesis of resolver adapters out of native function signatures.

use std::{
    any::TypeId,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use futures::{FutureExt as _, future::BoxFuture};

use super::{
    FieldSelection,
    handler::{Handler, Returns},
};
use crate::{
    FieldError, RegistrationError, RequestScope,
    reflect::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType},
    schema::{ArgumentsMeta, Builtin, Field, FieldType, RESULT_CHECKERS, Registry},
    subscription::Feedback,
    types::{Capability, CapabilityImpl, unwrap},
    util::panic_message,
};

/// Place a resolver is bound at, restricting its parameters and results.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Site<'a> {
    /// Root query field.
    Query,
    /// Root mutation field.
    Mutation,
    /// Root subscription field, receiving a [`Feedback`].
    Subscribe,
    /// Teardown of a subscription, receiving its session.
    Unsubscribe,
    /// Check running before an operation, without payload.
    Checker,
    /// Field of an object, receiving the struct declaring it.
    Field(&'a Field),
}

impl Site<'_> {
    fn requires_payload(self) -> bool {
        matches!(self, Self::Query | Self::Subscribe | Self::Field(_))
    }

    fn allows_payload(self) -> bool {
        !matches!(self, Self::Checker | Self::Unsubscribe)
    }
}

/// Role of a single parameter.
#[derive(Clone, Debug)]
enum Param {
    /// Arguments bundle, decoded out of the field arguments.
    Arguments(Arc<ArgumentsMeta>),
    /// The ambient [`Context`](crate::Context) itself.
    Context,
    /// Value looked up in the ambient context by its type.
    ContextValue(TypeId),
    /// [`FieldSelection`].
    Selection,
    /// Struct declaring the resolved field.
    Source,
    /// Subscription [`Feedback`].
    Feedback,
    /// Session returned on subscribe.
    Session,
}

/// Role of a single returned value.
#[derive(Clone, Copy, Debug)]
enum Slot {
    Payload,
    Merge { id: TypeId, name: &'static str },
    Session,
}

type Call = Arc<
    dyn Fn(
            Vec<Dynamic>,
        ) -> Result<BoxFuture<'static, Result<Vec<Dynamic>, FieldError>>, DecodeError>
        + Send
        + Sync,
>;

/// Runtime inputs of a single resolver call.
#[derive(Default)]
pub(crate) struct Invocation {
    pub(crate) arguments: Option<Dynamic>,
    pub(crate) scope: Option<Arc<RequestScope>>,
    pub(crate) selection: Option<FieldSelection>,
    pub(crate) source: Option<Dynamic>,
    pub(crate) feedback: Option<Feedback>,
    pub(crate) session: Option<Dynamic>,
}

/// Routed results of a single resolver call.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub(crate) payload: Dynamic,
    pub(crate) session: Option<Dynamic>,
}

/// Adapter binding a native function as a resolver.
#[derive(Clone)]
pub struct Resolver {
    name: String,
    params: Vec<Param>,
    slots: Vec<Slot>,
    arguments: Option<Arc<ArgumentsMeta>>,
    payload: Option<FieldType>,
    payload_base: Option<BaseType>,
    call: Call,
    debug: bool,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("slots", &self.slots)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Synthesizes the adapter of `handler`, bound at the given `site`.
    pub(crate) fn synthesize<H, A>(
        registry: &mut Registry,
        name: &str,
        handler: H,
        site: Site<'_>,
        debug: bool,
    ) -> Result<Self, RegistrationError>
    where
        H: Handler<A>,
    {
        tracing::debug!(resolver = name, ?site, "synthesizing resolver");

        let mut params = vec![];
        let mut arguments = None;
        let mut has_source = false;
        for (index, native) in H::params().into_iter().enumerate() {
            let param = Self::param(
                registry,
                index,
                &native,
                site,
                arguments.is_some(),
                has_source,
            )?;
            match &param {
                Param::Arguments(meta) => arguments = Some(meta.clone()),
                Param::Source => has_source = true,
                _ => {}
            }
            params.push(param);
        }

        let mut slots = vec![];
        let mut payload = None;
        let mut payload_base = None;
        let mut merges = false;
        for (index, native) in <H::Output as Returns>::slots().into_iter().enumerate() {
            let unsupported = || RegistrationError::UnsupportedResult {
                index,
                ty: native.to_string(),
            };
            let info = unwrap(&native).map_err(|_| unsupported())?;
            let (is_response_context, _) = registry
                .classifier
                .implements(&native, Capability::ResponseContext)?;
            if is_response_context {
                if merges {
                    return Err(RegistrationError::DuplicateContextMerge { index });
                }
                merges = true;
                if let Some(CapabilityImpl::ResponseContext(vtable)) = registry
                    .classifier
                    .implementation(&info.base, Capability::ResponseContext, info.implementing)
                {
                    registry.response_context(&info.base, vtable);
                }
                slots.push(Slot::Merge {
                    id: info.base.id(),
                    name: info.base.name(),
                });
                continue;
            }
            if matches!(site, Site::Subscribe)
                && registry.classifier.implements(&native, Capability::Session)?.0
            {
                slots.push(Slot::Session);
                continue;
            }
            if !site.allows_payload() {
                return Err(unsupported());
            }
            if payload.is_some() {
                return Err(RegistrationError::DuplicateResult { index });
            }
            let ty = registry
                .classify(&native, RESULT_CHECKERS)?
                .ok_or_else(unsupported)?;
            payload = Some(ty);
            payload_base = Some(info.base);
            slots.push(Slot::Payload);
        }

        if payload.is_none() {
            if site.requires_payload() {
                return Err(RegistrationError::MissingPayload {
                    operation: name.into(),
                });
            }
            if matches!(site, Site::Mutation) {
                payload = Some(FieldType::builtin(Builtin::Void));
            }
        }

        let call: Call = Arc::new(move |args| {
            let fut = handler.invoke(args)?;
            Ok(Box::pin(async move { Returns::into_slots(fut.await) }))
        });
        Ok(Self {
            name: name.into(),
            params,
            slots,
            arguments,
            payload,
            payload_base,
            call,
            debug,
        })
    }

    fn param(
        registry: &mut Registry,
        index: usize,
        native: &NativeType,
        site: Site<'_>,
        has_arguments: bool,
        has_source: bool,
    ) -> Result<Param, RegistrationError> {
        let unsupported = || RegistrationError::UnsupportedArgument {
            index,
            ty: native.to_string(),
        };
        let info = unwrap(native).map_err(|_| unsupported())?;

        if let Some(info) = registry.as_arguments(native)? {
            if has_arguments {
                return Err(RegistrationError::DuplicateArguments { index });
            }
            if info.is_list {
                return Err(RegistrationError::ListArguments {
                    ty: native.to_string(),
                });
            }
            return Ok(Param::Arguments(registry.arguments(&info)?));
        }

        match info.base.kind() {
            BaseKind::Context => return Ok(Param::Context),
            BaseKind::Selection => return Ok(Param::Selection),
            BaseKind::Feedback if matches!(site, Site::Subscribe) => return Ok(Param::Feedback),
            _ => {}
        }
        if !info.is_list {
            let (is_request_context, found) = registry
                .classifier
                .implements(native, Capability::RequestContext)?;
            if is_request_context {
                if let Some(CapabilityImpl::RequestContext(vtable)) = registry
                    .classifier
                    .implementation(&found.base, Capability::RequestContext, found.implementing)
                {
                    registry.request_context(&found.base, vtable);
                }
                return Ok(Param::ContextValue(found.base.id()));
            }
            if registry
                .classifier
                .implements(native, Capability::ResponseContext)?
                .0
            {
                return Ok(Param::ContextValue(info.base.id()));
            }
            if matches!(site, Site::Unsubscribe)
                && registry.classifier.implements(native, Capability::Session)?.0
            {
                return Ok(Param::Session);
            }
        }

        match site {
            Site::Field(field) if !info.is_list && info.base == field.owner => {
                if has_source {
                    return Err(RegistrationError::DuplicateSource { index });
                }
                Ok(Param::Source)
            }
            Site::Field(_) => Err(unsupported()),
            _ if registry.as_object(native)?.is_some() => {
                Err(RegistrationError::UnexpectedSource { index })
            }
            _ => Err(unsupported()),
        }
    }

    /// Returns the name of the bound operation or field.
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Returns the arguments bundle, if the function declares one.
    pub(crate) fn arguments(&self) -> Option<&Arc<ArgumentsMeta>> {
        self.arguments.as_ref()
    }

    /// Returns the type of the payload, if the function returns one.
    pub(crate) fn payload(&self) -> Option<&FieldType> {
        self.payload.as_ref()
    }

    /// Returns the native base type of the payload, if the function returns one.
    pub(crate) fn payload_base(&self) -> Option<&BaseType> {
        self.payload_base.as_ref()
    }

    /// Indicates whether the function observes the [`FieldSelection`].
    pub(crate) fn needs_selection(&self) -> bool {
        self.params.iter().any(|p| matches!(p, Param::Selection))
    }

    /// Calls the native function, routing its results.
    ///
    /// Panics, both synchronous and inside the returned future, are recovered into an internal
    /// [`FieldError`].
    pub(crate) fn invoke(
        &self,
        input: Invocation,
    ) -> BoxFuture<'static, Result<Outcome, FieldError>> {
        let context = input
            .scope
            .as_ref()
            .map(|s| s.context())
            .unwrap_or_default();
        let args = self
            .params
            .iter()
            .map(|param| match param {
                Param::Arguments(_) => input.arguments.clone().unwrap_or_default(),
                Param::Context => Dynamic::Native(Erased::new(context.clone())),
                Param::ContextValue(id) => context.lookup(*id).cloned().unwrap_or_default(),
                Param::Selection => input
                    .selection
                    .clone()
                    .map(|s| Dynamic::Native(Erased::new(s)))
                    .unwrap_or_default(),
                Param::Source => input.source.clone().unwrap_or_default(),
                Param::Feedback => input
                    .feedback
                    .clone()
                    .map(|f| Dynamic::Native(Erased::new(f)))
                    .unwrap_or_default(),
                Param::Session => input.session.clone().unwrap_or_default(),
            })
            .collect::<Vec<_>>();

        let name = self.name.clone();
        let debug = self.debug;
        let slots = self.slots.clone();
        let scope = input.scope;
        let started = catch_unwind(AssertUnwindSafe(|| (self.call)(args)));
        Box::pin(async move {
            let fut = match started {
                Ok(Ok(fut)) => fut,
                Ok(Err(e)) => return Err(FieldError::from(e)),
                Err(payload) => return Err(panicked(&name, &*payload, debug)),
            };
            let values = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(values) => values?,
                Err(payload) => return Err(panicked(&name, &*payload, debug)),
            };

            let mut outcome = Outcome::default();
            for (slot, value) in slots.into_iter().zip(values) {
                match slot {
                    Slot::Payload => outcome.payload = value,
                    Slot::Session => outcome.session = Some(value),
                    Slot::Merge { id, name } => match &scope {
                        Some(scope) => scope.merge(id, name, value),
                        None => tracing::warn!(context = name, "no request scope to merge into"),
                    },
                }
            }
            Ok(outcome)
        })
    }
}

fn panicked(name: &str, payload: &(dyn std::any::Any + Send), debug: bool) -> FieldError {
    let message = panic_message(payload);
    tracing::error!(resolver = name, "resolver panicked: {message}");
    if debug {
        FieldError::internal(format!("internal error: {message}"))
    } else {
        FieldError::internal("internal error")
    }
}
