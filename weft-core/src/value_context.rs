//! A chain of immutable key/value layers with cancellation and deadlines.
//!
//! Every request carries a [`ValueContext`]. Middleware derives a new
//! context from the current one (adding a value, a cancellation scope or a
//! deadline) and hands it further down the chain; the parent is never
//! modified. Lookups walk the chain outward from the most recent layer, so
//! the nearest binding of a key shadows any outer one.
//!
//! Cancellation flows downward only: cancelling a scope cancels every
//! context derived from it, never the context it was derived from.
//!
//! # Examples
//!
//! ```
//! use weft_core::value_context::ValueContext;
//!
//! let root = ValueContext::background().with_value("datastore", "main-db");
//! let (scoped, cancel) = root.with_cancel();
//!
//! assert_eq!(scoped.value::<&str>("datastore"), Some(&"main-db"));
//! cancel.cancel();
//! assert!(scoped.is_cancelled());
//! assert!(!root.is_cancelled());
//! ```

use std::any::Any;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::impl_into_weft_error;

/// An immutable, parent-linked key/value context supporting cancellation
/// and deadlines.
///
/// Cloning is cheap: it only bumps a reference count.
#[derive(Clone)]
pub struct ValueContext {
    layer: Arc<Layer>,
}

enum Layer {
    Background,
    Value {
        parent: ValueContext,
        key: Cow<'static, str>,
        value: Arc<dyn Any + Send + Sync>,
    },
    Cancel {
        parent: ValueContext,
        token: CancellationToken,
        deadline: Option<Instant>,
    },
}

impl ValueContext {
    /// Returns an empty context that is never cancelled and has no values.
    #[must_use]
    pub fn background() -> Self {
        Self {
            layer: Arc::new(Layer::Background),
        }
    }

    /// Derives a context that binds `key` to `value`.
    #[must_use]
    pub fn with_value<K, T>(&self, key: K, value: T) -> Self
    where
        K: Into<Cow<'static, str>>,
        T: Any + Send + Sync,
    {
        self.with_raw_value(key, Arc::new(value))
    }

    /// Derives a context that binds `key` to an already type-erased value.
    #[must_use]
    pub fn with_raw_value<K>(&self, key: K, value: Arc<dyn Any + Send + Sync>) -> Self
    where
        K: Into<Cow<'static, str>>,
    {
        Self {
            layer: Arc::new(Layer::Value {
                parent: self.clone(),
                key: key.into(),
                value,
            }),
        }
    }

    /// Derives a context with its own cancellation scope.
    ///
    /// The returned [`CancelHandle`] cancels the new context and everything
    /// derived from it. The new context is also cancelled when any of its
    /// ancestors is.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        self.cancel_layer(None)
    }

    /// Derives a cancellable context that is additionally considered done
    /// once `deadline` passes.
    ///
    /// An ancestor's earlier deadline still applies.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> (Self, CancelHandle) {
        self.cancel_layer(Some(deadline))
    }

    /// Like [`Self::with_deadline`], with the deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> (Self, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    fn cancel_layer(&self, deadline: Option<Instant>) -> (Self, CancelHandle) {
        let token = self
            .token()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        let context = Self {
            layer: Arc::new(Layer::Cancel {
                parent: self.clone(),
                token: token.clone(),
                deadline,
            }),
        };
        (context, CancelHandle { token })
    }

    /// Returns the value bound to `key` if it is of type `T`.
    ///
    /// Only the nearest binding of `key` is considered: if it holds a value
    /// of another type, `None` is returned even if an outer layer binds the
    /// same key to a `T`.
    #[must_use]
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.raw_value(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Returns the type-erased value bound to `key`.
    #[must_use]
    pub fn raw_value(&self, key: &str) -> Option<&Arc<dyn Any + Send + Sync>> {
        let mut current = self;
        loop {
            match &*current.layer {
                Layer::Background => return None,
                Layer::Value {
                    parent,
                    key: layer_key,
                    value,
                } => {
                    if layer_key == key {
                        return Some(value);
                    }
                    current = parent;
                }
                Layer::Cancel { parent, .. } => current = parent,
            }
        }
    }

    /// Returns the earliest deadline along the chain.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let mut earliest: Option<Instant> = None;
        let mut current = self;
        loop {
            match &*current.layer {
                Layer::Background => return earliest,
                Layer::Value { parent, .. } => current = parent,
                Layer::Cancel {
                    parent, deadline, ..
                } => {
                    if let Some(deadline) = *deadline {
                        earliest = Some(earliest.map_or(deadline, |e| e.min(deadline)));
                    }
                    current = parent;
                }
            }
        }
    }

    /// Returns why this context is done, or `None` if it is still live.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.deadline().is_some_and(|deadline| deadline <= Instant::now()) {
            Some(ContextError::DeadlineExceeded)
        } else if self.token().is_some_and(CancellationToken::is_cancelled) {
            Some(ContextError::Canceled)
        } else {
            None
        }
    }

    /// Returns `true` if this context was cancelled or its deadline passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.err().is_some()
    }

    /// Waits until this context is cancelled or its deadline passes.
    ///
    /// Never completes for a context without a cancellation scope.
    pub async fn cancelled(&self) {
        let token = self.token().cloned();
        let deadline = self.deadline();

        let on_cancel = async {
            match token {
                Some(token) => token.cancelled().await,
                None => std::future::pending::<()>().await,
            }
        };
        let on_deadline = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = on_cancel => {},
            () = on_deadline => {},
        }
    }

    fn token(&self) -> Option<&CancellationToken> {
        let mut current = self;
        loop {
            match &*current.layer {
                Layer::Background => return None,
                Layer::Value { parent, .. } => current = parent,
                Layer::Cancel { token, .. } => return Some(token),
            }
        }
    }

    fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        let mut current = self;
        loop {
            match &*current.layer {
                Layer::Background => return keys,
                Layer::Value { parent, key, .. } => {
                    keys.push(key.as_ref());
                    current = parent;
                }
                Layer::Cancel { parent, .. } => current = parent,
            }
        }
    }
}

impl Default for ValueContext {
    fn default() -> Self {
        Self::background()
    }
}

impl Debug for ValueContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueContext")
            .field("keys", &self.keys())
            .field("deadline", &self.deadline())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Cancels the scope created by [`ValueContext::with_cancel`] or
/// [`ValueContext::with_deadline`].
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Cancels the scope and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// The reason a [`ValueContext`] is done.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was cancelled explicitly.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
impl_into_weft_error!(ContextError);
