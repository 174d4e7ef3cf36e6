//! Running a router as an HTTP server.
//!
//! The server is `axum::serve` over hyper; every request is converted into
//! a [`Request`] and dispatched with [`Router::dispatch`]. [`RouterService`]
//! exposes the same dispatch as a [`tower::Service`] for embedding a router
//! in another tower stack.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::handler::HandlerWithoutStateExt as _;
use thiserror::Error;
use tracing::info;

use crate::{Body, Error, Request, Response, Router};

impl Router {
    /// Serves this router at `address` until Ctrl+C or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn serve(&self, address: &str) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(StartServerError)?;

        self.serve_at(listener).await
    }

    /// Serves this router at the address from its [`ServerConfig`].
    ///
    /// [`ServerConfig`]: crate::config::ServerConfig
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the server fails.
    pub async fn serve_with_config(&self) -> crate::Result<()> {
        let address = self.config().address.clone();
        self.serve(&address).await
    }

    /// Serves this router on an already bound listener until Ctrl+C or
    /// SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve_at(&self, listener: tokio::net::TcpListener) -> crate::Result<()> {
        self.serve_at_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves this router on `listener` until `shutdown_signal` completes,
    /// then finishes in-flight requests and returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails.
    pub async fn serve_at_with_shutdown(
        &self,
        listener: tokio::net::TcpListener,
        shutdown_signal: impl Future<Output = ()> + Send + 'static,
    ) -> crate::Result<()> {
        let router = self.clone();
        let handler = move |axum_request: axum::extract::Request| async move {
            let request = axum_request.map(Body::from);
            router.dispatch(request).await.map(axum::body::Body::new)
        };

        info!(
            "Starting the server at http://{}",
            listener.local_addr().map_err(StartServerError)?
        );

        axum::serve(listener, handler.into_make_service())
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(StartServerError)?;
        info!("Server stopped");

        Ok(())
    }
}

#[derive(Debug, Error)]
#[error("failed to start the server: {0}")]
pub(crate) struct StartServerError(#[from] pub(crate) std::io::Error);

impl From<StartServerError> for Error {
    fn from(error: StartServerError) -> Self {
        Error::wrap(error)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// A [`tower::Service`] dispatching requests to a [`Router`].
///
/// # Examples
///
/// ```
/// use tower::ServiceExt;
/// use weft::server::RouterService;
/// use weft::{Body, Context, Router, StatusCode};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> weft::Result<()> {
/// let router = Router::new();
/// router.get("/", |ctx: Context| async move { ctx.text(StatusCode::OK, "hi") });
///
/// let request = http::Request::get("/").body(Body::empty()).unwrap();
/// let response = RouterService::new(router).oneshot(request).await?;
/// assert_eq!(response.status(), StatusCode::OK);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RouterService {
    router: Router,
}

impl RouterService {
    /// Create a new router service.
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self { router }
    }
}

impl tower::Service<Request> for RouterService {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = crate::Result<Self::Response>> + Send>>;
    type Response = Response;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let router = self.router.clone();
        Box::pin(async move { Ok(router.dispatch(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tower::ServiceExt;

    use super::*;
    use crate::{Context, StatusCode};

    #[tokio::test]
    async fn router_service_dispatches() {
        let router = Router::new();
        router.get("/ping", |ctx: Context| async move {
            ctx.text(StatusCode::OK, "pong")
        });

        let request = http::Request::get("/ping").body(Body::empty()).unwrap();
        let response = RouterService::new(router).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.into_body().into_bytes().await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn bind_failure_is_an_error() {
        let error = Router::new().serve("not an address").await.unwrap_err();

        assert!(error.to_string().starts_with("failed to start the server"));
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let router = Router::new();
        router.get("/", |ctx: Context| async move { ctx.text(StatusCode::OK, "up") });

        let result = router
            .serve_at_with_shutdown(listener, tokio::time::sleep(Duration::from_millis(10)))
            .await;

        assert!(result.is_ok());
    }
}
