//! Error handlers and the built-in policy handlers.
//!
//! A router has three replaceable policy slots:
//!
//! * the error handler, called when a handler or middleware fails or panics
//!   ([`Router::set_error_handler`](crate::Router::set_error_handler)),
//! * the not-found handler, called when no route matches the path
//!   ([`Router::set_not_found_handler`](crate::Router::set_not_found_handler)),
//! * the method-not-allowed handler, called when the path matches a route
//!   registered for other methods only
//!   ([`Router::set_method_not_allowed_handler`](crate::Router::set_method_not_allowed_handler)).
//!
//! Sub-routers inherit these slots from their parent until they set their
//! own. The functions in this module are used when no router in the chain
//! set one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use derive_more::with_trait::Debug;
use tracing::error;

use crate::context::Context;
use crate::{Error, Result, StatusCode};

/// A function that turns a request failure into a response.
///
/// Implemented for any `async fn(Context, Error)` and for closures of the
/// same shape.
///
/// # Examples
///
/// ```
/// use weft::{Context, Error, Router, StatusCode};
///
/// async fn json_errors(ctx: Context, error: Error) {
///     match error.http_error() {
///         Some(http_error) => {
///             let _ = ctx.json(http_error.status(), http_error);
///         }
///         None => {
///             let _ = ctx.text(StatusCode::INTERNAL_SERVER_ERROR, error.to_string());
///         }
///     }
/// }
///
/// let router = Router::new();
/// router.set_error_handler(json_errors);
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a valid error handler",
    label = "not a valid error handler",
    note = "make sure the function is marked `async`",
    note = "make sure it takes a `Context` and an `Error` and returns `()`"
)]
pub trait ErrorHandler: Send + Sync + 'static {
    /// Writes a response for `error` into `context`.
    fn handle(&self, context: Context, error: Error) -> impl Future<Output = ()> + Send;
}

impl<F, Fut> ErrorHandler for F
where
    F: Fn(Context, Error) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn handle(&self, context: Context, error: Error) -> impl Future<Output = ()> + Send {
        self(context, error)
    }
}

trait BoxErrorHandler: Send + Sync {
    fn handle_boxed(
        &self,
        context: Context,
        error: Error,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl<H: ErrorHandler> BoxErrorHandler for H {
    fn handle_boxed(
        &self,
        context: Context,
        error: Error,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(self.handle(context, error))
    }
}

/// A type-erased, cheaply cloneable [`ErrorHandler`].
#[derive(Debug, Clone)]
pub struct BoxedErrorHandler {
    #[debug("..")]
    handler: Arc<dyn BoxErrorHandler>,
}

impl BoxedErrorHandler {
    /// Wraps a concrete error handler.
    pub fn new<H: ErrorHandler>(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// Runs the error handler.
    pub fn handle(&self, context: Context, error: Error) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.handler.handle_boxed(context, error)
    }
}

impl Default for BoxedErrorHandler {
    fn default() -> Self {
        Self::new(default_error_handler)
    }
}

/// The error handler used when none is set: logs the error and responds
/// with 500 and a plain-text body.
pub async fn default_error_handler(context: Context, error: Error) {
    error!(%error, status = %error.status_code(), "request failed");
    write_internal_server_error(&context);
}

/// The not-found handler used when none is set: 404 with a plain-text body.
///
/// # Errors
///
/// Never fails.
pub async fn default_not_found_handler(context: Context) -> Result<()> {
    context.text(StatusCode::NOT_FOUND, "404 page not found")
}

/// The method-not-allowed handler used when none is set: 405 with a
/// plain-text body.
///
/// # Errors
///
/// Never fails.
pub async fn default_method_not_allowed_handler(context: Context) -> Result<()> {
    context.text(StatusCode::METHOD_NOT_ALLOWED, "405 Method Not Allowed")
}

/// Last-resort response when an error handler itself failed.
pub(crate) fn write_internal_server_error(context: &Context) {
    let _ = context.text(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error");
}
