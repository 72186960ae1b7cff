//! Subscription lifecycle: push delivery and teardown.

use std::{
    any::TypeId,
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use derive_more::with_trait::{Display, Error};
use futures::{channel::mpsc, future::BoxFuture};

use crate::{
    reflect::{BaseKind, BaseType, DecodeError, Dynamic, Erased, NativeType, Reflect},
    types::unwrap,
};

/// Error of [`Feedback::send_data()`].
///
/// It fails the single call only, the subscription stays open.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum SendError {
    /// Value of another type than the subscription's one.
    #[display("send {expected} only not {found}")]
    Mismatch {
        /// Type of the subscription.
        expected: String,
        /// Type of the sent value.
        found: String,
    },

    /// Single value sent to a list subscription.
    #[display("requires [{expected}]")]
    ListRequired {
        /// Element type of the subscription.
        expected: String,
    },

    /// List sent to a single value subscription.
    #[display("requires {expected} not [{expected}]")]
    SingleRequired {
        /// Type of the subscription.
        expected: String,
    },

    /// Subscription was already torn down.
    #[display("subscription is closed")]
    Closed,
}

/// Teardown hook, receiving the session returned on subscribe.
pub(crate) type OnClose = Box<dyn FnOnce(Option<Dynamic>) -> BoxFuture<'static, ()> + Send>;

/// Handle pushing values to a single subscriber.
///
/// A subscribe handler receives it as a parameter, and may keep it to call
/// [`Feedback::send_data()`] from any task, any number of times, until the subscription is torn
/// down.
#[derive(Clone)]
pub struct Feedback {
    inner: Arc<Inner>,
}

struct Inner {
    /// Base type and list-ness every sent value must match.
    pinned: (TypeId, bool, String),
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    sender: Option<mpsc::UnboundedSender<Dynamic>>,
    session: Option<Dynamic>,
    on_close: Option<OnClose>,
}

impl Feedback {
    /// Creates a [`Feedback`] pinned to the given base type and list-ness, along with the
    /// receiving end of its values.
    pub(crate) fn channel(
        base: TypeId,
        is_list: bool,
        name: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<Dynamic>) {
        let (tx, rx) = mpsc::unbounded();
        let feedback = Self {
            inner: Arc::new(Inner {
                pinned: (base, is_list, name.into()),
                state: Mutex::new(State {
                    sender: Some(tx),
                    ..State::default()
                }),
            }),
        };
        (feedback, rx)
    }

    /// Records the session returned on subscribe and the hook to run on teardown.
    pub(crate) fn subscribed(&self, session: Option<Dynamic>, on_close: Option<OnClose>) {
        let mut state = self.lock();
        state.session = session;
        state.on_close = on_close;
    }

    /// Pushes a value to the subscriber.
    ///
    /// # Errors
    ///
    /// - If the type of `value` doesn't match the subscription's one.
    /// - If the subscription was already torn down.
    pub fn send_data<T: Reflect>(&self, value: T) -> Result<(), SendError> {
        let (id, is_list, name) = &self.inner.pinned;
        let native = T::native();
        let info = unwrap(&native).map_err(|_| SendError::Mismatch {
            expected: name.clone(),
            found: native.to_string(),
        })?;
        if info.base.id() != *id {
            return Err(SendError::Mismatch {
                expected: name.clone(),
                found: info.base.name().into(),
            });
        }
        match (is_list, info.is_list) {
            (true, false) => {
                return Err(SendError::ListRequired {
                    expected: name.clone(),
                });
            }
            (false, true) => {
                return Err(SendError::SingleRequired {
                    expected: name.clone(),
                });
            }
            _ => {}
        }
        self.lock()
            .sender
            .as_ref()
            .ok_or(SendError::Closed)?
            .unbounded_send(value.into_dynamic())
            .map_err(|_| SendError::Closed)
    }

    /// Tears the subscription down, ending its stream and running the unsubscribe handler.
    ///
    /// Closing an already closed [`Feedback`] is a no-op.
    pub async fn close(&self) {
        let (closed, session, on_close) = {
            let mut state = self.lock();
            let closed = state.sender.take().is_some();
            (closed, state.session.take(), state.on_close.take())
        };
        if !closed {
            return;
        }
        tracing::debug!(subscription = self.inner.pinned.2, "closing subscription");
        if let Some(on_close) = on_close {
            on_close(session).await;
        }
    }

    /// Indicates whether this subscription was torn down.
    pub fn is_closed(&self) -> bool {
        self.lock()
            .sender
            .as_ref()
            .is_none_or(mpsc::UnboundedSender::is_closed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feedback")
            .field("type", &self.inner.pinned.2)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Reflect for Feedback {
    fn native() -> NativeType {
        NativeType::Base(BaseType::of::<Self>(BaseKind::Feedback))
    }

    fn into_dynamic(self) -> Dynamic {
        Dynamic::Native(Erased::new(self))
    }

    fn from_dynamic(value: Dynamic) -> Result<Self, DecodeError> {
        value.downcast("Feedback")
    }
}

/// Live subscriptions of a single connection, keyed by their message id.
#[derive(Clone, Debug, Default)]
pub struct Subscriptions {
    inner: Arc<Mutex<HashMap<String, Feedback>>>,
}

impl Subscriptions {
    /// Creates an empty set of subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot a subscription started by the message `id` registers itself into.
    pub fn slot(&self, id: impl Into<String>) -> SubscriptionSlot {
        SubscriptionSlot {
            id: id.into(),
            subscriptions: self.clone(),
        }
    }

    /// Indicates whether a subscription is registered under the given `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Tears down the subscription registered under the given `id`, returning whether there
    /// was one.
    pub async fn stop(&self, id: &str) -> bool {
        let feedback = self.lock().remove(id);
        match feedback {
            Some(feedback) => {
                feedback.close().await;
                true
            }
            None => false,
        }
    }

    /// Tears down all the subscriptions.
    pub async fn stop_all(&self) {
        let all = self.lock().drain().map(|(_, f)| f).collect::<Vec<_>>();
        for feedback in all {
            feedback.close().await;
        }
    }

    fn insert(&self, id: String, feedback: Feedback) {
        if let Some(previous) = self.lock().insert(id, feedback) {
            tracing::warn!(?previous, "subscription id reused");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Feedback>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registration point of a subscription started by a single message, attached to the request
/// as data of the execution engine.
#[derive(Clone, Debug)]
pub struct SubscriptionSlot {
    id: String,
    subscriptions: Subscriptions,
}

impl SubscriptionSlot {
    /// Registers the successfully subscribed `feedback`.
    pub(crate) fn register(&self, feedback: Feedback) {
        self.subscriptions.insert(self.id.clone(), feedback);
    }
}
