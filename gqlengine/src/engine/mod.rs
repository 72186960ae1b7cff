//! Registration facade wiring native types and handlers into an executable schema.

mod builder;
mod operation;

use std::{any::TypeId, fmt, sync::Arc};

use async_graphql::{
    BatchRequest, BatchResponse, Request, Response, ServerError,
    dynamic::{
        Field as RootField, FieldFuture, Object, Scalar, Schema, SubscriptionField,
        SubscriptionFieldFuture,
    },
};
use fnv::{FnvHashMap, FnvHashSet};
use futures::{
    StreamExt as _,
    future::{self, join_all},
    stream::{self, BoxStream},
};

pub use self::builder::{MutationBuilder, PaginationBuilder, QueryBuilder, SubscriptionBuilder};
pub(crate) use self::operation::{Operation, Runtime, Target, settle};
use self::builder::{Declaration, Synth, synth};
use crate::{
    Context, ContextError, ContextErrorKind, Options, Plugin, RegistrationError, RequestScope,
    pagination::Pagination,
    plugin::OperationKind,
    reflect::Reflect,
    resolve::{Handler, Resolver, Site},
    schema::{Builtin, ContextHook, FieldType, MetaType, Registry, Role, translate},
    subscription::SubscriptionSlot,
    tags, timing,
    types::{RequestContextVTable, ResponseContextVTable},
};

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";
const SUBSCRIPTION: &str = "Subscription";

type FieldSynth = Box<
    dyn Fn(&mut Registry, bool) -> Result<((TypeId, &'static str), Resolver), RegistrationError>
        + Send
        + Sync,
>;

/// Entry point of the library: collects operations and field resolvers, builds the schema out
/// of their native signatures on [`Engine::init()`], then executes requests against it.
///
/// ```rust
/// # use gqlengine::{Engine, Options};
/// # async fn doc() {
/// let mut engine = Engine::new(Options::default());
/// engine.query("hello", || async { String::from("world") });
/// engine.init().unwrap();
///
/// let (resp, _) = engine.execute("{ hello }".into(), Default::default()).await;
/// assert!(resp.is_ok());
/// # }
/// ```
pub struct Engine {
    options: Options,
    registry: Registry,
    declarations: Vec<Declaration>,
    field_resolvers: Vec<FieldSynth>,
    schema: Option<Schema>,
    request_contexts: Vec<ContextHook<RequestContextVTable>>,
    response_contexts: Vec<ContextHook<ResponseContextVTable>>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("operations", &self.declarations.len())
            .field("field_resolvers", &self.field_resolvers.len())
            .field("initialized", &self.schema.is_some())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an empty [`Engine`].
    pub fn new(options: Options) -> Self {
        Self {
            options,
            registry: Registry::new(),
            declarations: vec![],
            field_resolvers: vec![],
            schema: None,
            request_contexts: vec![],
            response_contexts: vec![],
        }
    }

    /// Returns the [`Options`] of this [`Engine`].
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Returns the [`Registry`] of the schema types built so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Adds a [`Plugin`] observing the registration.
    pub fn plugin(&mut self, plugin: impl Plugin) -> &mut Self {
        self.registry.plugins.push(Arc::new(plugin));
        self
    }

    fn declare(&mut self, kind: OperationKind, name: &str, handler: Synth) -> &mut Declaration {
        if self.schema.is_some() {
            tracing::warn!(%kind, name, "operation declared after initialization is ignored");
        }
        self.declarations
            .push(Declaration::new(kind, name.into(), handler));
        let last = self.declarations.len() - 1;
        &mut self.declarations[last]
    }

    /// Declares a query resolved by the given `handler`.
    pub fn query<H, A>(&mut self, name: &str, handler: H) -> QueryBuilder<'_>
    where
        H: Handler<A>,
        A: 'static,
    {
        QueryBuilder {
            decl: self.declare(OperationKind::Query, name, synth(handler)),
        }
    }

    /// Declares a mutation resolved by the given `handler`.
    ///
    /// A mutation returning no payload is exposed as returning `Void`.
    pub fn mutation<H, A>(&mut self, name: &str, handler: H) -> MutationBuilder<'_>
    where
        H: Handler<A>,
        A: 'static,
    {
        MutationBuilder {
            decl: self.declare(OperationKind::Mutation, name, synth(handler)),
        }
    }

    /// Declares a subscription started by the given `handler`.
    ///
    /// The handler receives a [`Feedback`](crate::Feedback) to push values through, and
    /// returns a value pinning the type of the pushed values.
    pub fn subscription<H, A>(&mut self, name: &str, handler: H) -> SubscriptionBuilder<'_>
    where
        H: Handler<A>,
        A: 'static,
    {
        SubscriptionBuilder {
            decl: self.declare(OperationKind::Subscription, name, synth(handler)),
        }
    }

    /// Declares a paged query listing elements through the given `handler`.
    ///
    /// The query returns a `{Element}PaginationResults` object with the `page`, the `total`
    /// count, and the `list` of elements.
    pub fn pagination<H, A>(&mut self, name: &str, handler: H) -> PaginationBuilder<'_>
    where
        H: Handler<A>,
        A: 'static,
    {
        let decl = self.declare(OperationKind::Query, name, synth(handler));
        decl.paginated = true;
        PaginationBuilder { decl }
    }

    /// Binds the given `handler` as the resolver of the `field` of the object type `T`.
    ///
    /// The `field` is given by its native identifier or its GraphQL name, and must be tagged
    /// with `need_resolver`. The handler may receive the struct declaring the field, and must
    /// return a value of the field's type.
    pub fn field_resolver<T, H, A>(&mut self, field: &str, handler: H) -> &mut Self
    where
        T: Reflect,
        H: Handler<A>,
        A: 'static,
    {
        if self.schema.is_some() {
            tracing::warn!(field, "field resolver declared after initialization is ignored");
        }
        let field = field.to_owned();
        self.field_resolvers.push(Box::new(move |registry, debug| {
            let meta = registry.register_type(&T::native(), Role::Output)?;
            let MetaType::Object(object) = &*meta else {
                return Err(RegistrationError::NotImplemented {
                    ty: T::native().to_string(),
                    capability: crate::Capability::Object,
                });
            };
            let target = object
                .fields
                .iter()
                .find(|f| f.ident == field.as_str() || f.name.as_str() == field.as_str())
                .ok_or_else(|| RegistrationError::UnknownField {
                    owner: object.name.to_string(),
                    field: field.clone(),
                })?;
            if !target.need_resolver {
                return Err(RegistrationError::NoResolverNeeded {
                    owner: object.name.to_string(),
                    field: target.ident.into(),
                });
            }
            let resolver = Resolver::synthesize(
                registry,
                &format!("{}.{}", object.name, target.name),
                handler.clone(),
                Site::Field(target),
                debug,
            )?;
            if let Some(found) = resolver.payload() {
                if !found.same_shape(&target.field_type) {
                    return Err(RegistrationError::ResultMismatch {
                        owner: object.name.to_string(),
                        field: target.ident.into(),
                        expected: target.field_type.to_string(),
                        found: found.to_string(),
                    });
                }
            }
            Ok(((target.owner.id(), target.ident), resolver))
        }));
        self
    }

    /// Indicates whether [`Engine::init()`] succeeded.
    pub fn is_initialized(&self) -> bool {
        self.schema.is_some()
    }

    /// Builds the schema out of everything declared so far.
    ///
    /// Calling it again once it succeeded does nothing.
    ///
    /// # Errors
    ///
    /// If any declared type, handler or operation can't be bound.
    pub fn init(&mut self) -> Result<(), RegistrationError> {
        if self.schema.is_some() {
            return Ok(());
        }
        let debug = self.options.debug;

        let mut field_resolvers = FnvHashMap::default();
        for declare in &self.field_resolvers {
            let (key, resolver) = declare(&mut self.registry, debug)?;
            _ = field_resolvers.insert(key, resolver);
        }

        let mut operations = Vec::with_capacity(self.declarations.len());
        let mut names = FnvHashSet::default();
        for decl in &self.declarations {
            if !names.insert((decl.kind, decl.name.as_str())) {
                return Err(RegistrationError::DuplicateOperation {
                    kind: decl.kind.as_str(),
                    name: decl.name.clone(),
                });
            }
            let op = Self::operation(&mut self.registry, decl, debug)?;
            if op.kind != OperationKind::Subscription {
                let arguments = match &op.target {
                    Target::Single(resolver) => resolver.arguments().map(|a| &**a),
                    _ => None,
                };
                self.registry
                    .plugins
                    .check_operation(op.kind, &op.name, arguments, op.payload());
            }
            operations.push(Arc::new(op));
        }

        let runtime = Arc::new(Runtime {
            catalog: self.registry.freeze(),
            field_resolvers,
        });
        let schema = self.build_schema(&runtime, &operations)?;

        self.request_contexts = self.registry.request_contexts().to_vec();
        self.response_contexts = self.registry.response_contexts().to_vec();
        self.schema = Some(schema);
        tracing::debug!(operations = operations.len(), "schema initialized");
        Ok(())
    }

    fn operation(
        registry: &mut Registry,
        decl: &Declaration,
        debug: bool,
    ) -> Result<Operation, RegistrationError> {
        let name = decl.name.as_str();
        let checkers = decl
            .checkers
            .iter()
            .map(|checker| checker(registry, name, Site::Checker, debug))
            .collect::<Result<Vec<_>, _>>()?;

        let target = match decl.kind {
            OperationKind::Query if decl.paginated => {
                let list = (decl.handler)(registry, name, Site::Query, debug)?;
                let total = decl.companion.as_ref().ok_or_else(|| {
                    RegistrationError::pagination(format!(
                        "paged query {name} misses its total handler",
                    ))
                })?;
                let total = total(registry, name, Site::Query, debug)?;
                Target::Paginated(Pagination::compose(registry, list, total)?)
            }
            OperationKind::Query => {
                Target::Single((decl.handler)(registry, name, Site::Query, debug)?)
            }
            OperationKind::Mutation => {
                Target::Single((decl.handler)(registry, name, Site::Mutation, debug)?)
            }
            OperationKind::Subscription => Target::Subscription {
                subscribe: (decl.handler)(registry, name, Site::Subscribe, debug)?,
                unsubscribe: decl
                    .companion
                    .as_ref()
                    .map(|unsubscribe| unsubscribe(registry, name, Site::Unsubscribe, debug))
                    .transpose()?,
            },
        };

        Ok(Operation {
            kind: decl.kind,
            name: decl.name.clone(),
            description: decl.description.clone(),
            tags: decl.tags.clone(),
            checkers,
            target,
        })
    }

    fn build_schema(
        &self,
        runtime: &Arc<Runtime>,
        operations: &[Arc<Operation>],
    ) -> Result<Schema, RegistrationError> {
        let mut query = Object::new(QUERY);
        let mut mutation = Object::new(MUTATION);
        let mut subscription = async_graphql::dynamic::Subscription::new(SUBSCRIPTION);
        let (mut has_queries, mut has_mutations, mut has_subscriptions) = (false, false, false);

        for op in operations {
            let ty = op
                .payload()
                .map_or_else(|| FieldType::builtin(Builtin::Void).type_ref(), FieldType::type_ref);
            let arguments = op.arguments();

            if op.kind == OperationKind::Subscription {
                has_subscriptions = true;
                let (rt, shared) = (runtime.clone(), op.clone());
                let mut field = SubscriptionField::new(op.name.as_str(), ty, move |ctx| {
                    let (rt, op) = (rt.clone(), shared.clone());
                    SubscriptionFieldFuture::new(async move {
                        rt.subscribe(&ctx, &op)
                            .await
                            .map_err(async_graphql::Error::from)
                    })
                });
                if let Some(desc) = &op.description {
                    field = field.description(desc.as_str());
                }
                for arg in &arguments {
                    field = field.argument(translate::input_value(arg));
                }
                subscription = subscription.field(field);
                continue;
            }

            let (rt, shared) = (runtime.clone(), op.clone());
            let mut field = RootField::new(op.name.as_str(), ty, move |ctx| {
                let (rt, op) = (rt.clone(), shared.clone());
                FieldFuture::new(async move {
                    let result = rt.resolve_operation(&ctx, &op).await;
                    operation::settle(&ctx, op.payload(), result)
                })
            });
            if let Some(desc) = &op.description {
                field = field.description(desc.as_str());
            }
            for arg in &arguments {
                field = field.argument(translate::input_value(arg));
            }
            if op.kind == OperationKind::Mutation {
                has_mutations = true;
                mutation = mutation.field(field);
            } else {
                has_queries = true;
                query = query.field(field);
            }
        }

        let mut extra = vec![];
        if self.options.tags {
            let (field, types) = tags::build(operations.iter().map(|op| &**op));
            query = query.field(field);
            extra.extend(types);
            has_queries = true;
        }
        if !has_queries {
            return Err(RegistrationError::MissingQuery);
        }

        let mut builder = Schema::build(
            QUERY,
            has_mutations.then_some(MUTATION),
            has_subscriptions.then_some(SUBSCRIPTION),
        )
        .register(query)
        .register(
            Scalar::new(Builtin::Void.name()).description("Result of a mutation without payload"),
        )
        .enable_uploading();
        if has_mutations {
            builder = builder.register(mutation);
        }
        if has_subscriptions {
            builder = builder.register(subscription);
        }
        for ty in translate::types(runtime) {
            builder = builder.register(ty);
        }
        for ty in extra {
            builder = builder.register(ty);
        }
        if self.options.tracing {
            builder = builder.extension(timing::Tracing);
        }
        builder.finish().map_err(|e| RegistrationError::Schema { message: e.0 })
    }

    /// Returns the schema in the SDL, or [`None`] if not initialized.
    pub fn sdl(&self) -> Option<String> {
        self.schema.as_ref().map(Schema::sdl)
    }

    fn uninitialized() -> Response {
        Response::from_errors(vec![ServerError::new("engine is not initialized", None)])
    }

    /// Executes the given query or mutation `request` with the given [`Context`], returning
    /// the response along with the final [`Context`], holding the response contexts merged by
    /// the resolvers.
    pub async fn execute(&self, request: Request, context: Context) -> (Response, Context) {
        let scope = Arc::new(RequestScope::new(context));
        let response = self.execute_in(request, &scope).await;
        (response, Self::unwrap_scope(scope))
    }

    /// Executes the given batch `request` with the given [`Context`], running the requests of a
    /// batch concurrently within the same [`RequestScope`].
    pub async fn execute_batch(
        &self,
        request: BatchRequest,
        context: Context,
    ) -> (BatchResponse, Context) {
        let scope = Arc::new(RequestScope::new(context));
        let response = match request {
            BatchRequest::Single(request) => {
                BatchResponse::Single(self.execute_in(request, &scope).await)
            }
            BatchRequest::Batch(requests) => BatchResponse::Batch(
                join_all(
                    requests
                        .into_iter()
                        .map(|request| self.execute_in(request, &scope)),
                )
                .await,
            ),
        };
        (response, Self::unwrap_scope(scope))
    }

    async fn execute_in(&self, request: Request, scope: &Arc<RequestScope>) -> Response {
        match &self.schema {
            Some(schema) => schema.execute(request.data(scope.clone())).await,
            None => Self::uninitialized(),
        }
    }

    fn unwrap_scope(scope: Arc<RequestScope>) -> Context {
        Arc::try_unwrap(scope)
            .map(RequestScope::into_context)
            .unwrap_or_else(|scope| scope.context())
    }

    /// Executes the given `request` as a stream of responses: a subscription yields a response
    /// per pushed value, any other operation yields a single one.
    ///
    /// A subscription started by the request registers itself into the given `slot`, if any.
    pub fn execute_stream(
        &self,
        request: Request,
        context: Context,
        slot: Option<SubscriptionSlot>,
    ) -> BoxStream<'static, Response> {
        let Some(schema) = &self.schema else {
            return stream::once(future::ready(Self::uninitialized())).boxed();
        };
        let mut request = request.data(Arc::new(RequestScope::new(context)));
        if let Some(slot) = slot {
            request = request.data(slot);
        }
        schema
            .execute_stream_with_session_data(request, Arc::default())
            .boxed()
    }

    /// Builds every request context type used by the registered handlers out of the given
    /// request head, overlaying them over the `base` [`Context`].
    ///
    /// # Errors
    ///
    /// With all the failures of the request context types, if any fails.
    pub fn request_context(
        &self,
        parts: &http::request::Parts,
        base: Context,
    ) -> Result<Context, ContextError> {
        let mut context = base;
        let mut errors = vec![];
        for hook in &self.request_contexts {
            match (hook.vtable.from_request)(parts) {
                Ok(value) => context = context.with_dynamic(hook.id, hook.name, value),
                Err(e) => errors.push(e.to_string()),
            }
        }
        if errors.is_empty() {
            Ok(context)
        } else {
            Err(ContextError::new(ContextErrorKind::Request, errors))
        }
    }

    /// Writes every response context held by the given [`Context`] into the response
    /// `headers`.
    ///
    /// # Errors
    ///
    /// With all the failures of the response context types, if any fails.
    pub fn finalize_context(
        &self,
        context: &Context,
        headers: &mut http::HeaderMap,
    ) -> Result<(), ContextError> {
        let mut errors = vec![];
        for hook in &self.response_contexts {
            if let Some(value) = context.lookup(hook.id) {
                if let Err(e) = (hook.vtable.finalize)(value.clone(), headers) {
                    errors.push(e.to_string());
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContextError::new(ContextErrorKind::Finalize, errors))
        }
    }
}
