//! Error handling types and utilities for weft applications.
//!
//! [`Error`] is the single failure type flowing through handlers,
//! middleware and error handlers. [`HttpError`] is the structured variant a
//! custom error handler can branch on, and [`UncaughtPanic`] wraps a panic
//! caught while running a request.

pub(crate) mod error_impl;
mod http_error;
mod uncaught_panic;

pub use error_impl::{Error, impl_into_weft_error};
pub use http_error::HttpError;
pub use uncaught_panic::UncaughtPanic;
