//! weft is a minimalist HTTP routing and middleware-composition layer built
//! on top of [axum](https://github.com/tokio-rs/axum)'s server.
//!
//! ## Features
//!
//! * **Routing**: handlers are registered per method and path pattern, with
//!   named (`/users/:id`) and catch-all (`/files/*path`) segments. Requests
//!   whose path matches only routes of other methods get a 405 with an
//!   `Allow` header instead of a 404.
//! * **Sub-routers**: [`Router::sub_router`] nests routes under a prefix.
//!   A sub-router starts from a snapshot of its parent's middleware and
//!   inherits the parent's error handling and bound context until it sets
//!   its own.
//! * **Middleware**: any [`tower::Layer`] over a handler; the first
//!   registered middleware runs outermost.
//! * **Request context**: every handler receives a [`Context`] with the
//!   request, the response being written, the route parameters, a
//!   cancellable [`ValueContext`](value_context::ValueContext) chain and a
//!   per-request store.
//! * **Centralized errors**: handler failures and panics go to one error
//!   handler per router, which can render structured
//!   [`HttpError`](error::HttpError)s however it likes.
//!
//! ## Examples
//!
//! ```no_run
//! use weft::{Context, Router, StatusCode};
//!
//! async fn hello(ctx: Context) -> weft::Result<()> {
//!     let name = ctx.param("name").unwrap_or("world").to_owned();
//!     ctx.text(StatusCode::OK, format!("hello {name}"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> weft::Result<()> {
//!     let app = Router::new();
//!     app.get("/hello/:name", hello);
//!     app.serve("127.0.0.1:8000").await
//! }
//! ```

#![warn(missing_docs, rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod router;
pub mod server;
mod static_files;

pub use weft_core::{Body, Method, Result, StatusCode, params, value_context};
pub use {bytes, http};

pub use crate::context::Context;
pub use crate::error::Error;
pub use crate::handler::{BoxedHandler, Handler};
pub use crate::router::Router;

/// An HTTP request as seen by handlers and [`Router::dispatch`].
pub type Request = http::Request<Body>;

/// An HTTP response produced by [`Router::dispatch`].
pub type Response = http::Response<Body>;

/// The head of a [`Request`]: method, URI, version and headers.
pub type RequestHead = http::request::Parts;
