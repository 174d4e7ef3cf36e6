//! Request handlers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use derive_more::with_trait::Debug;

use crate::Result;
use crate::context::Context;

/// An asynchronous function that handles a request through its [`Context`].
///
/// A handler writes its response into the context and returns `Ok(())`, or
/// returns an error that is passed to the error handler of the router that
/// owns the matched route.
///
/// This is implemented for any `async fn(Context) -> weft::Result<()>` and
/// for closures of the same shape. Closures usually need their parameter
/// type spelled out:
///
/// ```
/// use weft::{Context, Router, StatusCode};
///
/// let router = Router::new();
/// router.get("/", |ctx: Context| async move {
///     ctx.text(StatusCode::OK, "hello")
/// });
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid request handler",
    label = "not a valid request handler",
    note = "make sure the function is marked `async`",
    note = "make sure it takes a single `Context` and returns `weft::Result<()>`"
)]
pub trait Handler: Send + Sync + 'static {
    /// Handles the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be handled. The error is
    /// passed to the router's error handler.
    fn call(&self, context: Context) -> impl Future<Output = Result<()>> + Send;

    /// Erases the type of this handler.
    fn into_boxed(self) -> BoxedHandler
    where
        Self: Sized,
    {
        BoxedHandler::new(self)
    }
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send,
{
    fn call(&self, context: Context) -> impl Future<Output = Result<()>> + Send {
        self(context)
    }
}

trait BoxHandler: Send + Sync {
    fn call_boxed(&self, context: Context) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

impl<H: Handler> BoxHandler for H {
    fn call_boxed(&self, context: Context) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(Handler::call(self, context))
    }
}

/// A type-erased, cheaply cloneable [`Handler`].
///
/// Middleware receive the rest of the chain as a `BoxedHandler` and return
/// another one.
#[derive(Debug, Clone)]
pub struct BoxedHandler {
    #[debug("..")]
    inner: Arc<dyn BoxHandler>,
}

impl BoxedHandler {
    /// Wraps a concrete handler.
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }

    /// Runs the handler.
    ///
    /// # Errors
    ///
    /// Returns whatever error the wrapped handler returns.
    pub fn call(&self, context: Context) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.inner.call_boxed(context)
    }
}

impl Handler for BoxedHandler {
    fn call(&self, context: Context) -> impl Future<Output = Result<()>> + Send {
        self.inner.call_boxed(context)
    }

    fn into_boxed(self) -> BoxedHandler {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StatusCode;

    async fn hello(ctx: Context) -> Result<()> {
        ctx.text(StatusCode::OK, "hello")
    }

    #[tokio::test]
    async fn async_fn_is_a_handler() {
        let handler = BoxedHandler::new(hello);
        let ctx = Context::new(http::Request::new(crate::Body::empty()));

        handler.call(ctx.clone()).await.unwrap();

        assert_eq!(ctx.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn boxing_twice_does_not_nest() {
        let handler = hello.into_boxed();
        let again = handler.clone().into_boxed();

        assert!(Arc::ptr_eq(&handler.inner, &again.inner));
    }
}
