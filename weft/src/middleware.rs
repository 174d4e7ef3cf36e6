//! Middleware for wrapping request handlers.
//!
//! A middleware takes the rest of the chain as a [`BoxedHandler`] and returns
//! a new handler that may run code before and after it, replace its result,
//! or not call it at all. Middleware are plain [`tower::Layer`]s over
//! [`BoxedHandler`], so any layer with that shape can be registered on a
//! [`Router`](crate::Router).
//!
//! Most middleware are written with [`from_fn`]:
//!
//! ```
//! use weft::middleware::{Next, from_fn};
//! use weft::{Context, Router};
//!
//! let router = Router::new();
//! router.middleware(from_fn(|ctx: Context, next: Next| async move {
//!     ctx.with_value("request-id", "abc123");
//!     next.call(ctx).await
//! }));
//! ```

use std::future::Future;
use std::sync::Arc;

use derive_more::with_trait::Debug;
pub use tower::layer::layer_fn;

use crate::Result;
use crate::context::Context;
use crate::handler::BoxedHandler;

/// The remainder of the middleware chain, ending in the route handler.
pub type Next = BoxedHandler;

/// A component wrapping a [`BoxedHandler`] into another one.
///
/// Implemented for every [`tower::Layer`] over `BoxedHandler` that produces
/// a `BoxedHandler`.
pub trait Middleware: Send + Sync + 'static {
    /// Wraps `next`, returning the handler that runs in its place.
    fn wrap(&self, next: Next) -> BoxedHandler;
}

impl<L> Middleware for L
where
    L: tower::Layer<BoxedHandler, Service = BoxedHandler> + Send + Sync + 'static,
{
    fn wrap(&self, next: Next) -> BoxedHandler {
        self.layer(next)
    }
}

/// A type-erased, cheaply cloneable [`Middleware`].
#[derive(Debug, Clone)]
pub struct BoxedMiddleware {
    #[debug("..")]
    inner: Arc<dyn Middleware>,
}

impl BoxedMiddleware {
    /// Wraps a concrete middleware.
    pub fn new<M: Middleware>(middleware: M) -> Self {
        Self {
            inner: Arc::new(middleware),
        }
    }

    /// Wraps `next` with this middleware.
    #[must_use]
    pub fn wrap(&self, next: Next) -> BoxedHandler {
        self.inner.wrap(next)
    }
}

impl tower::Layer<BoxedHandler> for BoxedMiddleware {
    type Service = BoxedHandler;

    fn layer(&self, next: BoxedHandler) -> BoxedHandler {
        self.wrap(next)
    }
}

/// Folds `chain` around `handler` so that the first middleware in the chain
/// becomes the outermost one.
pub(crate) fn compose(chain: &[BoxedMiddleware], handler: BoxedHandler) -> BoxedHandler {
    chain
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware.wrap(next))
}

/// Creates a middleware from an async function receiving the request
/// context and the rest of the chain.
///
/// The function decides whether, and when, to call `next`. Returning an
/// error without calling it short-circuits the chain.
///
/// # Examples
///
/// ```
/// use weft::middleware::{Next, from_fn};
/// use weft::{Context, StatusCode};
///
/// let require_token = from_fn(|ctx: Context, next: Next| async move {
///     if ctx.header("authorization").is_none() {
///         return Err(ctx.http_error(StatusCode::UNAUTHORIZED, "missing token"));
///     }
///     next.call(ctx).await
/// });
/// # let _ = require_token;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FromFn { f: Arc::new(f) }
}

/// A middleware created by [`from_fn`].
#[derive(Debug)]
pub struct FromFn<F> {
    #[debug("..")]
    f: Arc<F>,
}

impl<F> Clone for FromFn<F> {
    fn clone(&self) -> Self {
        Self {
            f: Arc::clone(&self.f),
        }
    }
}

impl<F, Fut> tower::Layer<BoxedHandler> for FromFn<F>
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    type Service = BoxedHandler;

    fn layer(&self, next: BoxedHandler) -> BoxedHandler {
        let f = Arc::clone(&self.f);
        BoxedHandler::new(move |ctx: Context| f(ctx, next.clone()))
    }
}
