//! Error types and the error-handling policy.
//!
//! Every failure returned by a handler or a middleware is an [`Error`]. The
//! router that owns the matched route passes it, together with the request
//! [`Context`](crate::Context), to its [error handler](handler::ErrorHandler)
//! exactly once.

pub mod handler;

#[doc(inline)]
pub use weft_core::error::{Error, HttpError, UncaughtPanic, impl_into_weft_error};
