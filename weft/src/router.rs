//! Routers, sub-routers and request dispatch.
//!
//! A [`Router`] registers handlers for `(method, pattern)` pairs, carries a
//! chain of middleware and dispatches requests. [`Router::sub_router`]
//! creates a child that registers into the same route table under a longer
//! prefix:
//!
//! * the child starts with a copy of the parent's middleware chain taken at
//!   creation time; middleware added to either one afterwards stays local,
//! * the error, not-found and method-not-allowed handlers and the bound
//!   value context are looked up through the parent until the child sets
//!   its own.
//!
//! Every route runs under the middleware chain of the router it was
//! registered on, as that chain is when the request arrives.
//!
//! # Examples
//!
//! ```
//! use weft::middleware::{Next, from_fn};
//! use weft::{Context, Router, StatusCode};
//!
//! let app = Router::new();
//! app.get("/hello/:name", |ctx: Context| async move {
//!     let name = ctx.param("name").unwrap_or_default().to_owned();
//!     ctx.text(StatusCode::OK, format!("hello {name}"))
//! });
//!
//! let admin = app.sub_router("/admin");
//! admin.middleware(from_fn(|ctx: Context, next: Next| async move {
//!     if ctx.header("authorization").is_none() {
//!         return Err(ctx.http_error(StatusCode::UNAUTHORIZED, "unauthorized"));
//!     }
//!     next.call(ctx).await
//! }));
//! admin.get("/", |ctx: Context| async move { ctx.text(StatusCode::OK, "admin") });
//! ```

pub(crate) mod table;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::FutureExt;
use http::header::ALLOW;
use parking_lot::RwLock;
use tracing::{Instrument, debug, debug_span, error};
use weft_core::params::Params;
use weft_core::value_context::ValueContext;

use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::handler::{
    BoxedErrorHandler, ErrorHandler, default_method_not_allowed_handler,
    default_not_found_handler, write_internal_server_error,
};
use crate::error::{Error, UncaughtPanic};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, compose};
use crate::router::table::{MethodFilter, Resolution, RouteEntry, RouteTable, join_path};
use crate::{Method, Request, Response, Result, static_files};

/// A handle on a router node.
///
/// Cloning a `Router` yields another handle on the same node. Registration
/// methods take `&self` and return it, so calls can be chained.
#[derive(Clone)]
pub struct Router {
    shared: Arc<Shared>,
    node: Arc<Node>,
}

/// State shared by a root router and all of its sub-routers.
struct Shared {
    table: RwLock<RouteTable>,
    config: ServerConfig,
}

/// A node of the router tree.
pub(crate) struct Node {
    prefix: String,
    parent: Option<Arc<Node>>,
    middleware: ArcSwap<Vec<BoxedMiddleware>>,
    bound_context: ArcSwapOption<ValueContext>,
    error_handler: ArcSwapOption<BoxedErrorHandler>,
    not_found_handler: ArcSwapOption<BoxedHandler>,
    method_not_allowed_handler: ArcSwapOption<BoxedHandler>,
}

impl Node {
    pub(crate) fn root() -> Self {
        Self::with_parent(String::new(), None, Vec::new())
    }

    fn child(parent: &Arc<Node>, prefix: &str) -> Self {
        let prefix = join_path(&parent.prefix, prefix)
            .trim_end_matches('/')
            .to_owned();
        let chain = parent.middleware.load_full();
        Self::with_parent(prefix, Some(Arc::clone(parent)), Vec::clone(&chain))
    }

    fn with_parent(prefix: String, parent: Option<Arc<Node>>, chain: Vec<BoxedMiddleware>) -> Self {
        Self {
            prefix,
            parent,
            middleware: ArcSwap::from_pointee(chain),
            bound_context: ArcSwapOption::empty(),
            error_handler: ArcSwapOption::empty(),
            not_found_handler: ArcSwapOption::empty(),
            method_not_allowed_handler: ArcSwapOption::empty(),
        }
    }

    /// This node followed by its parent, grandparent and so on.
    fn ancestors(&self) -> impl Iterator<Item = &Node> {
        std::iter::successors(Some(self), |node| node.parent.as_deref())
    }

    fn root_node(&self) -> &Node {
        let mut node = self;
        while let Some(parent) = node.parent.as_deref() {
            node = parent;
        }
        node
    }

    /// Bound contexts of this node and its ancestors, nearest first.
    fn bound_contexts(&self) -> Vec<ValueContext> {
        self.ancestors()
            .filter_map(|node| node.bound_context.load_full())
            .map(|context| ValueContext::clone(&context))
            .collect()
    }

    fn error_handler(&self) -> BoxedErrorHandler {
        self.ancestors()
            .find_map(|node| node.error_handler.load_full())
            .map_or_else(BoxedErrorHandler::default, |handler| {
                BoxedErrorHandler::clone(&handler)
            })
    }

    fn not_found_handler(&self) -> BoxedHandler {
        self.ancestors()
            .find_map(|node| node.not_found_handler.load_full())
            .map_or_else(
                || default_not_found_handler.into_boxed(),
                |handler| BoxedHandler::clone(&handler),
            )
    }

    fn method_not_allowed_handler(&self) -> BoxedHandler {
        self.ancestors()
            .find_map(|node| node.method_not_allowed_handler.load_full())
            .map_or_else(
                || default_method_not_allowed_handler.into_boxed(),
                |handler| BoxedHandler::clone(&handler),
            )
    }
}

impl Router {
    /// Creates a root router with the default [`ServerConfig`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a root router with the given configuration.
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(RouteTable::new()),
                config,
            }),
            node: Arc::new(Node::root()),
        }
    }

    /// Returns the configuration of the root router.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Returns the full path prefix of this router.
    ///
    /// Empty for a root router.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.node.prefix
    }

    /// Registers a handler for `GET` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or conflicts with a route already
    /// registered for the same method.
    pub fn get<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::GET, pattern, handler)
    }

    /// Registers a handler for `POST` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn post<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::POST, pattern, handler)
    }

    /// Registers a handler for `PUT` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn put<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Registers a handler for `DELETE` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn delete<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// Registers a handler for `HEAD` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn head<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::HEAD, pattern, handler)
    }

    /// Registers a handler for `OPTIONS` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn options<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::OPTIONS, pattern, handler)
    }

    /// Registers a handler for `PATCH` requests to `pattern`.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn patch<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Registers a handler for requests of any method to `pattern`.
    ///
    /// A route registered for the request's exact method takes precedence.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or conflicts with another route
    /// registered with `any`.
    pub fn any<H: Handler>(&self, pattern: &str, handler: H) -> &Self {
        self.register(MethodFilter::Any, pattern, handler.into_boxed())
    }

    /// Registers a handler for `method` requests to `pattern`.
    ///
    /// `pattern` is relative to this router's prefix. It may contain named
    /// segments (`/users/:id`) and end with a catch-all (`/files/*path`).
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn handle<H: Handler>(&self, method: Method, pattern: &str, handler: H) -> &Self {
        self.register(MethodFilter::One(method), pattern, handler.into_boxed())
    }

    fn register(&self, methods: MethodFilter, pattern: &str, handler: BoxedHandler) -> &Self {
        let path = join_path(&self.node.prefix, pattern);
        debug!(?methods, %path, "registering route");
        let entry = RouteEntry {
            handler,
            node: Arc::clone(&self.node),
        };
        if let Err(error) = self.shared.table.write().insert(methods, &path, entry) {
            panic!("could not register route `{path}`: {error}");
        }
        self
    }

    /// Serves the files under `dir` at `GET prefix/*filepath`.
    ///
    /// Missing files, directories and paths containing `..` get a 404.
    ///
    /// # Panics
    ///
    /// See [`Router::get`].
    pub fn static_files<P: Into<PathBuf>>(&self, prefix: &str, dir: P) -> &Self {
        let pattern = format!("{}/*filepath", prefix.trim_end_matches('/'));
        self.get(&pattern, static_files::StaticFiles::new(dir))
    }

    /// Creates a child router whose routes live under `prefix`.
    ///
    /// The child starts with a snapshot of this router's middleware chain.
    /// It looks up the policy handlers and the bound context through this
    /// router until it sets its own.
    #[must_use]
    pub fn sub_router(&self, prefix: &str) -> Router {
        let node = Node::child(&self.node, prefix);
        debug!(prefix = %node.prefix, "creating sub-router");
        Self {
            shared: Arc::clone(&self.shared),
            node: Arc::new(node),
        }
    }

    /// Appends a middleware to this router's chain.
    ///
    /// Middleware run in registration order, the first one outermost. Only
    /// this router's routes are affected, including routes registered
    /// before this call; sub-routers created earlier keep their own copy.
    pub fn middleware<M: Middleware>(&self, middleware: M) -> &Self {
        let middleware = BoxedMiddleware::new(middleware);
        self.node.middleware.rcu(|chain| {
            let mut chain = Vec::clone(chain);
            chain.push(middleware.clone());
            chain
        });
        self
    }

    /// Appends several middleware, in order.
    pub fn middlewares<I, M>(&self, middlewares: I) -> &Self
    where
        I: IntoIterator<Item = M>,
        M: Middleware,
    {
        for middleware in middlewares {
            self.middleware(middleware);
        }
        self
    }

    /// Removes every middleware from this router's chain.
    ///
    /// Sub-routers created afterwards start empty as well.
    pub fn reset_middleware(&self) -> &Self {
        self.node.middleware.store(Arc::new(Vec::new()));
        self
    }

    /// Sets the base value context of requests handled by this router's
    /// routes and its sub-routers' routes.
    ///
    /// A sub-router that binds its own context shadows only the keys it
    /// binds; lookups of other keys fall through to this router's context.
    pub fn bind_context(&self, context: ValueContext) -> &Self {
        self.node.bound_context.store(Some(Arc::new(context)));
        self
    }

    /// Sets the handler receiving failures of this router's routes.
    pub fn set_error_handler<H: ErrorHandler>(&self, handler: H) -> &Self {
        self.node
            .error_handler
            .store(Some(Arc::new(BoxedErrorHandler::new(handler))));
        self
    }

    /// Sets the handler for requests matching no route.
    ///
    /// Only consulted on the root router; sub-routers can set it for
    /// symmetry and pass it to their own children.
    pub fn set_not_found_handler<H: Handler>(&self, handler: H) -> &Self {
        self.node
            .not_found_handler
            .store(Some(Arc::new(handler.into_boxed())));
        self
    }

    /// Sets the handler for requests whose path matches only routes of
    /// other methods.
    ///
    /// Only consulted on the root router, like
    /// [`Router::set_not_found_handler`]. The `Allow` response header is set
    /// before the handler runs.
    pub fn set_method_not_allowed_handler<H: Handler>(&self, handler: H) -> &Self {
        self.node
            .method_not_allowed_handler
            .store(Some(Arc::new(handler.into_boxed())));
        self
    }

    /// Dispatches a request and returns the response.
    ///
    /// Never fails: routing misses go to the not-found or
    /// method-not-allowed handler, and handler failures (including panics)
    /// go to the error handler of the router owning the route.
    pub async fn dispatch(&self, request: Request) -> Response {
        let span = debug_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
        );
        self.dispatch_inner(request).instrument(span).await
    }

    async fn dispatch_inner(&self, request: Request) -> Response {
        let resolution = self
            .shared
            .table
            .read()
            .resolve(request.method(), request.uri().path());
        let root = self.node.root_node();
        let body_limit = self.shared.config.body_limit;

        let context = match resolution {
            Resolution::Found { entry, params } => {
                debug!(prefix = %entry.node.prefix, ?params, "route matched");
                let node = entry.node;
                let context =
                    Context::for_route(request, params, node.bound_contexts(), body_limit);
                let work = async {
                    let chain = node.middleware.load_full();
                    compose(&chain, entry.handler).call(context.clone()).await
                };
                run(&context, node.error_handler(), work).await;
                context
            }
            Resolution::MethodNotAllowed { allowed } => {
                debug!(?allowed, "method not allowed");
                let context =
                    Context::for_route(request, Params::new(), root.bound_contexts(), body_limit);
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Err(error) = context.set_header(ALLOW.as_str(), &allow) {
                    debug!(%error, "could not set the Allow header");
                }
                let handler = root.method_not_allowed_handler();
                run(&context, root.error_handler(), handler.call(context.clone())).await;
                context
            }
            Resolution::NotFound => {
                debug!("no route matched");
                let context =
                    Context::for_route(request, Params::new(), root.bound_contexts(), body_limit);
                let handler = root.not_found_handler();
                run(&context, root.error_handler(), handler.call(context.clone())).await;
                context
            }
        };

        context.take_response()
    }
}

/// Runs `work`, sending a failure or a panic to `error_handler` exactly
/// once. An error handler that panics is replaced by a plain 500 response.
async fn run<F>(context: &Context, error_handler: BoxedErrorHandler, work: F)
where
    F: Future<Output = Result<()>> + Send,
{
    let error = match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok(())) => return,
        Ok(Err(error)) => error,
        Err(payload) => {
            let panic = UncaughtPanic::new(payload);
            error!(
                panic = panic.message().as_deref().unwrap_or("<non-string payload>"),
                "handler panicked"
            );
            Error::from(panic)
        }
    };

    debug!(%error, "passing error to the error handler");
    let handled = AssertUnwindSafe(error_handler.handle(context.clone(), error))
        .catch_unwind()
        .await;
    if handled.is_err() {
        error!("error handler panicked; responding with 500");
        context.reset_response();
        write_internal_server_error(context);
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.node.prefix)
            .field("middleware", &self.node.middleware.load().len())
            .field("table", &*self.shared.table.read())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Next, from_fn};
    use crate::{Body, StatusCode};

    fn tag(letter: &'static str) -> impl Middleware {
        from_fn(move |ctx: Context, next: Next| async move {
            ctx.write(letter);
            next.call(ctx).await
        })
    }

    async fn body_of(router: &Router, method: Method, uri: &str) -> (StatusCode, String) {
        let request = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.dispatch(request).await;
        let status = response.status();
        let body = response.into_body().into_bytes().await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    async fn done(ctx: Context) -> Result<()> {
        ctx.write("!");
        Ok(())
    }

    async fn fail(_ctx: Context) -> Result<()> {
        Err(Error::internal("boom"))
    }

    async fn broken_error_handler(_ctx: Context, _error: Error) {
        panic!("error handler is broken");
    }

    #[test]
    fn sub_router_prefixes_nest() {
        let root = Router::new();
        let api = root.sub_router("/api/");
        let v1 = api.sub_router("/v1");
        let slash = root.sub_router("/");

        assert_eq!(root.prefix(), "");
        assert_eq!(api.prefix(), "/api");
        assert_eq!(v1.prefix(), "/api/v1");
        assert_eq!(slash.prefix(), "");
    }

    #[test]
    fn chain_is_copied_at_fork() {
        let root = Router::new();
        root.middleware(tag("A"));
        let child = root.sub_router("/child");
        root.middleware(tag("B"));
        child.middleware(tag("C"));

        assert_eq!(root.node.middleware.load().len(), 2);
        assert_eq!(child.node.middleware.load().len(), 2);
    }

    #[test]
    fn reset_then_fork_starts_empty() {
        let root = Router::new();
        root.middleware(tag("A"));
        root.reset_middleware();
        let child = root.sub_router("/child");

        assert!(child.node.middleware.load().is_empty());
    }

    #[tokio::test]
    async fn middleware_added_after_route_applies() {
        let root = Router::new();
        root.get("/", done);
        root.middleware(tag("A"));

        assert_eq!(body_of(&root, Method::GET, "/").await.1, "A!");
    }

    #[tokio::test]
    async fn bound_context_is_inherited_live() {
        let root = Router::new();
        let child = root.sub_router("/child");
        child.get("/", |ctx: Context| async move {
            let value = ctx.value::<&str>("db").map_or("none", |value| *value);
            ctx.text(StatusCode::OK, value)
        });
        root.bind_context(ValueContext::background().with_value("db", "main"));

        assert_eq!(body_of(&root, Method::GET, "/child").await.1, "main");

        child.bind_context(ValueContext::background().with_value("db", "replica"));
        assert_eq!(body_of(&root, Method::GET, "/child").await.1, "replica");
    }

    #[tokio::test]
    async fn error_handler_is_inherited_live() {
        let root = Router::new();
        let child = root.sub_router("/child");
        child.get("/", fail);
        root.set_error_handler(|ctx: Context, _error: Error| async move {
            let _ = ctx.text(StatusCode::IM_A_TEAPOT, "root handler");
        });

        let (status, body) = body_of(&root, Method::GET, "/child").await;

        assert_eq!(status, StatusCode::IM_A_TEAPOT);
        assert_eq!(body, "root handler");
    }

    #[tokio::test]
    async fn dispatch_through_sub_router_handle() {
        let root = Router::new();
        let child = root.sub_router("/child");
        root.get("/", done);

        assert_eq!(body_of(&child, Method::GET, "/").await.1, "!");
    }

    #[tokio::test]
    async fn panicking_error_handler_falls_back_to_500() {
        let root = Router::new();
        root.get("/", |ctx: Context| async move {
            ctx.write("partial");
            Err::<(), _>(Error::internal("first"))
        });
        root.set_error_handler(broken_error_handler);

        let (status, body) = body_of(&root, Method::GET, "/").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "500 Internal Server Error");
    }

    #[test]
    #[should_panic(expected = "could not register route `/users/:name`")]
    fn conflicting_route_panics() {
        let root = Router::new();
        root.get("/users/:id", done);
        root.get("/users/:name", done);
    }
}
