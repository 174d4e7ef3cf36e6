//! Core types and functionality for the weft router.
//!
//! This crate provides the foundational building blocks for
//! [weft](https://docs.rs/weft/latest/weft/): the request/response body
//! type, the error types, the route parameter carrier, and the cancellable
//! value-context chain that travels with every request.
//!
//! Most applications should use the main `weft` crate rather than depending
//! on `weft-core` directly.

mod body;

pub mod error;
pub mod headers;
pub mod params;
pub mod value_context;

pub use body::Body;
pub use error::Error;

/// A type alias for an HTTP status code.
pub type StatusCode = http::StatusCode;

/// A type alias for an HTTP method.
pub type Method = http::Method;

/// A type alias for a result that can return a [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
