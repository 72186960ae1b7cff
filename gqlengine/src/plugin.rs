//! Hooks observing type and operation registration.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use derive_more::with_trait::Display;

use crate::{
    reflect::{BaseType, FieldShape},
    schema::{ArgumentsMeta, FieldType},
    types::{BoxError, Capability, Receiver},
    util::panic_message,
};

/// Opaque per-plugin state, threaded from [`Plugin::before_check()`] to the following hooks of
/// the same registration.
pub type PluginState = Option<Box<dyn Any + Send>>;

/// Registration a plugin hook is invoked for.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PluginRole {
    /// Arguments bundle.
    #[display("arguments")]
    Arguments,
    /// Object type.
    #[display("object")]
    Object,
    /// Input object type.
    #[display("input")]
    Input,
}

/// Kind of a root operation.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum OperationKind {
    /// Query.
    #[display("query")]
    Query,
    /// Mutation.
    #[display("mutation")]
    Mutation,
    /// Subscription.
    #[display("subscription")]
    Subscription,
}

impl OperationKind {
    /// Returns the lowercase name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

/// Observer of the schema registration.
///
/// For every registered arguments bundle, object and input type, the hooks are invoked in this
/// order: [`Plugin::before_check()`], [`Plugin::check_embedded_field()`] for each embedded
/// field, [`Plugin::check_field()`] for each exposed field, [`Plugin::match_capability()`], and
/// [`Plugin::after_check()`]. Query and mutation operations invoke [`Plugin::check_operation()`].
///
/// A hook failing, by returning an error or by panicking, is logged and doesn't affect other
/// plugins nor the registration itself.
pub trait Plugin: Send + Sync + 'static {
    /// Name of this plugin, used in logs.
    fn name(&self) -> &str;

    /// Starts checking a type, returning the state for the following hooks.
    fn before_check(&self, role: PluginRole, ty: &BaseType) -> Result<PluginState, BoxError> {
        let _ = (role, ty);
        Ok(None)
    }

    /// Checks a field whose own fields are flattened into the type.
    fn check_embedded_field(
        &self,
        role: PluginRole,
        state: &mut PluginState,
        field: &FieldShape,
    ) -> Result<(), BoxError> {
        let _ = (role, state, field);
        Ok(())
    }

    /// Checks a field exposed with the given `name` and type.
    fn check_field(
        &self,
        role: PluginRole,
        state: &mut PluginState,
        field: &FieldShape,
        name: &str,
        ty: &FieldType,
    ) -> Result<(), BoxError> {
        let _ = (role, state, field, name, ty);
        Ok(())
    }

    /// Checks the capability the type was classified with.
    fn match_capability(
        &self,
        role: PluginRole,
        state: &mut PluginState,
        capability: Capability,
        receiver: Receiver,
    ) -> Result<(), BoxError> {
        let _ = (role, state, capability, receiver);
        Ok(())
    }

    /// Finishes checking a type exposed with the given `name`.
    fn after_check(
        &self,
        role: PluginRole,
        state: &mut PluginState,
        name: &str,
        description: Option<&str>,
    ) -> Result<(), BoxError> {
        let _ = (role, state, name, description);
        Ok(())
    }

    /// Checks a query or mutation operation.
    fn check_operation(
        &self,
        kind: OperationKind,
        name: &str,
        arguments: Option<&ArgumentsMeta>,
        result: Option<&FieldType>,
    ) -> Result<(), BoxError> {
        let _ = (kind, name, arguments, result);
        Ok(())
    }
}

/// Ordered set of registered [`Plugin`]s.
#[derive(Clone, Default)]
pub(crate) struct Plugins {
    list: Vec<Arc<dyn Plugin>>,
}

impl Plugins {
    pub(crate) fn push(&mut self, plugin: Arc<dyn Plugin>) {
        self.list.push(plugin);
    }

    /// Starts a registration of the given `role`, invoking [`Plugin::before_check()`].
    pub(crate) fn begin(&self, role: PluginRole, ty: &BaseType) -> PluginRun {
        let states = self
            .list
            .iter()
            .map(|p| isolate(p.as_ref(), "before_check", || p.before_check(role, ty)).flatten())
            .collect();
        PluginRun {
            plugins: self.list.clone(),
            role,
            states,
        }
    }

    pub(crate) fn check_operation(
        &self,
        kind: OperationKind,
        name: &str,
        arguments: Option<&ArgumentsMeta>,
        result: Option<&FieldType>,
    ) {
        for p in &self.list {
            _ = isolate(p.as_ref(), "check_operation", || {
                p.check_operation(kind, name, arguments, result)
            });
        }
    }
}

/// Hooks of a single registration, with the state of each plugin.
pub(crate) struct PluginRun {
    plugins: Vec<Arc<dyn Plugin>>,
    role: PluginRole,
    states: Vec<PluginState>,
}

impl PluginRun {
    pub(crate) fn embedded_field(&mut self, field: &FieldShape) {
        let role = self.role;
        self.each("check_embedded_field", |p, s| {
            p.check_embedded_field(role, s, field)
        });
    }

    pub(crate) fn field(&mut self, field: &FieldShape, name: &str, ty: &FieldType) {
        let role = self.role;
        self.each("check_field", |p, s| p.check_field(role, s, field, name, ty));
    }

    pub(crate) fn capability(&mut self, capability: Capability, receiver: Receiver) {
        let role = self.role;
        self.each("match_capability", |p, s| {
            p.match_capability(role, s, capability, receiver)
        });
    }

    pub(crate) fn finish(mut self, name: &str, description: Option<&str>) {
        let role = self.role;
        self.each("after_check", |p, s| p.after_check(role, s, name, description));
    }

    fn each(
        &mut self,
        hook: &'static str,
        mut f: impl FnMut(&dyn Plugin, &mut PluginState) -> Result<(), BoxError>,
    ) {
        for (p, state) in self.plugins.iter().zip(&mut self.states) {
            _ = isolate(p.as_ref(), hook, || f(p.as_ref(), state));
        }
    }
}

/// Invokes a plugin hook, turning its failure into a logged [`None`].
fn isolate<T>(
    plugin: &dyn Plugin,
    hook: &'static str,
    f: impl FnOnce() -> Result<T, BoxError>,
) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Some(v),
        Ok(Err(e)) => {
            tracing::warn!(plugin = plugin.name(), hook, "plugin failed: {e}");
            None
        }
        Err(payload) => {
            tracing::warn!(
                plugin = plugin.name(),
                hook,
                "plugin panicked: {}",
                panic_message(&*payload),
            );
            None
        }
    }
}
