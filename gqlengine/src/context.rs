use std::{
    any::TypeId,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::reflect::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType, Reflect};

/// Ambient values of a request, keyed by their native type.
///
/// A [`Context`] is persistent: [`Context::with()`] returns a new overlay, leaving the original
/// untouched, so cloning is cheap and clones never observe each other's changes.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

struct Node {
    key: TypeId,
    name: &'static str,
    value: Dynamic,
    parent: Option<Arc<Node>>,
}

impl Context {
    /// Creates an empty [`Context`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an overlay of this [`Context`] holding the given `value`, shadowing any
    /// previous value of the same type.
    #[must_use]
    pub fn with<T: Reflect>(&self, value: T) -> Self {
        self.with_dynamic(
            TypeId::of::<T>(),
            std::any::type_name::<T>(),
            value.into_dynamic(),
        )
    }

    pub(crate) fn with_dynamic(&self, key: TypeId, name: &'static str, value: Dynamic) -> Self {
        Self {
            head: Some(Arc::new(Node {
                key,
                name,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Returns the value of type `T`, if this [`Context`] holds one.
    pub fn get<T: Reflect>(&self) -> Option<T> {
        self.lookup(TypeId::of::<T>())
            .and_then(|v| T::from_dynamic(v.clone()).ok())
    }

    /// Indicates whether this [`Context`] holds a value of type `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.lookup(TypeId::of::<T>()).is_some()
    }

    pub(crate) fn lookup(&self, key: TypeId) -> Option<&Dynamic> {
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if n.key == key {
                return Some(&n.value);
            }
            node = n.parent.as_deref();
        }
        None
    }

    fn names(&self) -> Vec<&'static str> {
        let mut names = vec![];
        let mut node = self.head.as_deref();
        while let Some(n) = node {
            if !names.contains(&n.name) {
                names.push(n.name);
            }
            node = n.parent.as_deref();
        }
        names
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl Reflect for Context {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Context))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Native(Erased::new(self))
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        match value {
            Dynamic::Null => Ok(Self::default()),
            v => v.downcast("Context"),
        }
    }
}

/// Live [`Context`] of a single request.
///
/// It's attached to every request as data of the execution engine. Resolvers read the
/// [`Context`] from it, and response contexts they return are merged back into it.
#[derive(Debug, Default)]
pub struct RequestScope {
    context: Mutex<Context>,
}

impl RequestScope {
    /// Creates a new [`RequestScope`] starting from the given `context`.
    pub fn new(context: Context) -> Self {
        Self {
            context: Mutex::new(context),
        }
    }

    /// Returns a snapshot of the current [`Context`].
    pub fn context(&self) -> Context {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overlays the current [`Context`] with the given value.
    pub(crate) fn merge(&self, key: TypeId, name: &'static str, value: Dynamic) {
        let mut context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        *context = context.with_dynamic(key, name, value);
    }

    /// Unwraps the final [`Context`].
    pub fn into_context(self) -> Context {
        self.context
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
