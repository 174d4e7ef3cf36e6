//! The per-request context.
//!
//! A [`Context`] is created for every dispatched request and handed to the
//! middleware chain and the route handler. It bundles:
//!
//! * the inbound request head and body,
//! * the buffered outbound response,
//! * the route parameters extracted by the matcher,
//! * the request's [`ValueContext`] chain, seeded from the owning router's
//!   bound context,
//! * a mutable string-keyed store for passing data between middleware and
//!   handlers of the same request.
//!
//! `Context` is a cheap handle: clones refer to the same request.

mod response_writer;

use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::debug;
use weft_core::headers::{
    HTML_CONTENT_TYPE, JSON_CONTENT_TYPE, PLAIN_TEXT_CONTENT_TYPE, URLENCODED_FORM_CONTENT_TYPE,
};
use weft_core::params::Params;
use weft_core::value_context::ValueContext;

pub(crate) use self::response_writer::ResponseWriter;
use crate::config::DEFAULT_BODY_LIMIT;
use crate::error::HttpError;
use crate::{Body, Error, Request, RequestHead, Response, Result, StatusCode};

/// The request-scoped context passed through middleware to the handler.
///
/// # Examples
///
/// ```
/// use weft::{Context, Router, StatusCode};
///
/// let router = Router::new();
/// router.get("/hello/:name", |ctx: Context| async move {
///     let name = ctx.param("name").unwrap_or("stranger").to_owned();
///     ctx.text(StatusCode::OK, format!("hello {name}"))
/// });
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    head: RequestHead,
    body: Mutex<Option<Body>>,
    form: OnceCell<Vec<(String, String)>>,
    params: Params,
    value_context: Mutex<ValueContext>,
    inherited: Vec<ValueContext>,
    store: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
    response: Mutex<ResponseWriter>,
    body_limit: usize,
}

impl Context {
    /// Creates a context for `request` with no route parameters and a
    /// background value context.
    ///
    /// Routers create contexts themselves; this is mostly useful for
    /// exercising a handler directly.
    #[must_use]
    pub fn new(request: Request) -> Self {
        Self::for_route(request, Params::new(), Vec::new(), DEFAULT_BODY_LIMIT)
    }

    /// `bound` holds the bound contexts of the owning router and its
    /// ancestors, nearest first. The nearest one seeds the request's value
    /// context; the others are consulted by [`Self::value`] for keys the
    /// request's chain does not bind.
    pub(crate) fn for_route(
        request: Request,
        params: Params,
        bound: Vec<ValueContext>,
        body_limit: usize,
    ) -> Self {
        let (head, body) = request.into_parts();
        let mut bound = bound.into_iter();
        let value_context = bound.next().unwrap_or_else(ValueContext::background);
        Self {
            inner: Arc::new(ContextInner {
                head,
                body: Mutex::new(Some(body)),
                form: OnceCell::new(),
                params,
                value_context: Mutex::new(value_context),
                inherited: bound.collect(),
                store: Mutex::new(HashMap::new()),
                response: Mutex::new(ResponseWriter::default()),
                body_limit,
            }),
        }
    }

    /// Returns the head (method, URI, version, headers) of the request.
    #[must_use]
    pub fn request_head(&self) -> &RequestHead {
        &self.inner.head
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.inner.head.method
    }

    /// Returns the request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.inner.head.uri
    }

    /// Returns the path of the request URI.
    #[must_use]
    pub fn path(&self) -> &str {
        self.inner.head.uri.path()
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.head.headers
    }

    /// Returns the first value of the request header `name`.
    ///
    /// Header names are case-insensitive. Values that are not visible ASCII
    /// are treated as absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .head
            .headers
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// Returns the first value of the URL query parameter `name`.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft::{Body, Context};
    ///
    /// let request = http::Request::get("/search?q=rust&page=2")
    ///     .body(Body::empty())
    ///     .unwrap();
    /// let ctx = Context::new(request);
    ///
    /// assert_eq!(ctx.query("q").as_deref(), Some("rust"));
    /// assert_eq!(ctx.query("missing"), None);
    /// ```
    #[must_use]
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.inner.head.uri.query()?;
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Returns the first value of the form field `name`.
    ///
    /// For `POST`, `PUT` and `PATCH` requests with a URL-encoded form body,
    /// the body is read (once, up to the configured body limit) and its
    /// fields take precedence over URL query parameters of the same name.
    /// For any other request, only the query is consulted.
    pub async fn form(&self, name: &str) -> Option<String> {
        self.form_values()
            .await
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    async fn form_values(&self) -> &[(String, String)] {
        self.inner
            .form
            .get_or_init(|| async {
                let mut values = self.read_form_body().await;
                if let Some(query) = self.inner.head.uri.query() {
                    values.extend(form_urlencoded::parse(query.as_bytes()).into_owned());
                }
                values
            })
            .await
    }

    async fn read_form_body(&self) -> Vec<(String, String)> {
        let has_body = matches!(
            self.inner.head.method,
            Method::POST | Method::PUT | Method::PATCH
        );
        let is_form = self
            .header(CONTENT_TYPE.as_str())
            .is_some_and(|content_type| content_type.starts_with(URLENCODED_FORM_CONTENT_TYPE));
        if !has_body || !is_form {
            return Vec::new();
        }

        match self.body_bytes().await {
            Ok(bytes) => form_urlencoded::parse(&bytes).into_owned().collect(),
            Err(error) => {
                debug!(%error, "could not read form body");
                Vec::new()
            }
        }
    }

    /// Takes the request body, leaving `None` in its place.
    ///
    /// Returns `None` if the body was already taken, including by
    /// [`Self::form`], [`Self::body_bytes`] or [`Self::decode_json`].
    #[must_use]
    pub fn take_body(&self) -> Option<Body> {
        self.inner.body.lock().take()
    }

    /// Reads the whole request body, up to the configured body limit.
    ///
    /// A body that was already taken reads as empty.
    ///
    /// # Errors
    ///
    /// Returns a 400 Bad Request error if the body cannot be read or exceeds
    /// the limit.
    pub async fn body_bytes(&self) -> Result<Bytes> {
        match self.take_body() {
            Some(body) => body.into_bytes_limited(self.inner.body_limit).await,
            None => Ok(Bytes::new()),
        }
    }

    /// Deserializes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Returns a 400 Bad Request error if the body cannot be read or is not
    /// valid JSON for `T`.
    pub async fn decode_json<T: DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.body_bytes().await?;
        Ok(serde_json::from_slice(&bytes).map_err(JsonError::Decode)?)
    }

    /// Returns the value of the route parameter `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.inner.params.get(name)
    }

    /// Returns all route parameters.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.inner.params
    }

    /// Stores `value` under `key` for the rest of this request.
    ///
    /// The store is separate from the [`ValueContext`]: it is mutable, and
    /// visible only to middleware and handlers of the same request.
    pub fn set<K: Into<String>, T: Any + Send + Sync>(&self, key: K, value: T) {
        self.inner.store.lock().insert(key.into(), Arc::new(value));
    }

    /// Returns the type-erased value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.store.lock().get(key).cloned()
    }

    /// Returns the value stored under `key` if it is a `T`.
    #[must_use]
    pub fn get_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.get(key).and_then(|value| value.downcast::<T>().ok())
    }

    /// Returns the current value context of the request.
    #[must_use]
    pub fn value_context(&self) -> ValueContext {
        self.inner.value_context.lock().clone()
    }

    /// Replaces the value context of the request.
    ///
    /// Middleware use this to hand a derived context (for example one with
    /// a deadline) to the rest of the chain.
    pub fn set_value_context(&self, value_context: ValueContext) {
        *self.inner.value_context.lock() = value_context;
    }

    /// Derives the request's value context with `key` bound to `value`.
    pub fn with_value<K, T>(&self, key: K, value: T)
    where
        K: Into<Cow<'static, str>>,
        T: Any + Send + Sync,
    {
        let mut value_context = self.inner.value_context.lock();
        *value_context = value_context.with_value(key, value);
    }

    /// Returns the nearest value bound to `key`, if it is a `T`.
    ///
    /// The request's value context is searched first, then the contexts
    /// bound by the routers above the owning one, innermost first.
    #[must_use]
    pub fn value<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let value = self.inner.value_context.lock().raw_value(key).cloned();
        let value = value.or_else(|| {
            self.inner
                .inherited
                .iter()
                .find_map(|context| context.raw_value(key).cloned())
        })?;
        value.downcast::<T>().ok()
    }

    /// Sets the response status code.
    ///
    /// Only the first status takes effect; writing the body without a
    /// status commits 200 OK.
    pub fn write_header(&self, status: StatusCode) {
        self.inner.response.lock().write_header(status);
    }

    /// Appends `data` to the response body.
    pub fn write<T: AsRef<[u8]>>(&self, data: T) {
        self.inner.response.lock().write(data.as_ref());
    }

    /// Returns the response status, if already written.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.response.lock().status()
    }

    /// Returns `true` once the response status has been written.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.response.lock().is_committed()
    }

    /// Returns the first value of the response header `name` set so far.
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.inner
            .response
            .lock()
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    }

    /// Sets the response header `name`, replacing any previous values.
    ///
    /// Ignored once the response is committed.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` or `value` is not a valid header name or
    /// value.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        if let Some(headers) = self.inner.response.lock().headers_mut() {
            headers.insert(name, value);
        }
        Ok(())
    }

    /// Appends a value to the response header `name`.
    ///
    /// Ignored once the response is committed.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` or `value` is not a valid header name or
    /// value.
    pub fn add_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        if let Some(headers) = self.inner.response.lock().headers_mut() {
            headers.append(name, value);
        }
        Ok(())
    }

    /// Writes a `text/plain` response.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` lets handlers end with this call.
    pub fn text<T: Into<String>>(&self, status: StatusCode, body: T) -> Result<()> {
        self.respond(status, PLAIN_TEXT_CONTENT_TYPE, body.into().as_bytes());
        Ok(())
    }

    /// Writes a `text/html` response.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` lets handlers end with this call.
    pub fn html<T: Into<String>>(&self, status: StatusCode, body: T) -> Result<()> {
        self.respond(status, HTML_CONTENT_TYPE, body.into().as_bytes());
        Ok(())
    }

    /// Serializes `value` and writes it as an `application/json` response.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized. Nothing is written
    /// in that case.
    pub fn json<T: Serialize + ?Sized>(&self, status: StatusCode, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value).map_err(JsonError::Encode)?;
        self.respond(status, JSON_CONTENT_TYPE, &body);
        Ok(())
    }

    /// Writes a response with an arbitrary content type.
    ///
    /// # Errors
    ///
    /// Returns an error if `content_type` is not a valid header value.
    pub fn bytes<T: AsRef<[u8]>>(
        &self,
        status: StatusCode,
        content_type: &str,
        data: T,
    ) -> Result<()> {
        self.set_header(CONTENT_TYPE.as_str(), content_type)?;
        let mut response = self.inner.response.lock();
        response.write_header(status);
        response.write(data.as_ref());
        Ok(())
    }

    /// Writes a response without a body.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` lets handlers end with this call.
    pub fn no_content(&self, status: StatusCode) -> Result<()> {
        self.write_header(status);
        Ok(())
    }

    /// Redirects the client to `location` with the given 3xx status.
    ///
    /// # Errors
    ///
    /// Returns an error if `location` is not a valid header value.
    pub fn redirect(&self, status: StatusCode, location: &str) -> Result<()> {
        self.set_header(LOCATION.as_str(), location)?;
        self.write_header(status);
        Ok(())
    }

    /// Builds an [`HttpError`] as a [`weft::Error`](Error), writing nothing.
    ///
    /// Return it from a handler to let the router's error handler render it.
    #[must_use]
    pub fn http_error<T: Into<String>>(&self, status: StatusCode, description: T) -> Error {
        HttpError::new(status, description).into()
    }

    fn respond(&self, status: StatusCode, content_type: &'static str, body: &[u8]) {
        let mut response = self.inner.response.lock();
        if let Some(headers) = response.headers_mut() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        response.write_header(status);
        response.write(body);
    }

    /// Moves the buffered response out, leaving an empty one behind.
    pub(crate) fn take_response(&self) -> Response {
        std::mem::take(&mut *self.inner.response.lock()).into_response()
    }

    /// Discards everything written to the response so far.
    pub(crate) fn reset_response(&self) {
        *self.inner.response.lock() = ResponseWriter::default();
    }

    #[cfg(test)]
    pub(crate) fn written_body(&self) -> String {
        String::from_utf8_lossy(self.inner.response.lock().body()).into_owned()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.inner.head.method)
            .field("uri", &self.inner.head.uri)
            .field("params", &self.inner.params)
            .field("value_context", &*self.inner.value_context.lock())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes()).map_err(InvalidHeader::Name)?;
    let value = HeaderValue::from_str(value).map_err(InvalidHeader::Value)?;
    Ok((name, value))
}

#[derive(Debug, Error)]
enum InvalidHeader {
    #[error("invalid header name: {0}")]
    Name(http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    Value(http::header::InvalidHeaderValue),
}
crate::error::impl_into_weft_error!(InvalidHeader);

/// An error returned when JSON cannot be encoded into a response or decoded
/// from a request.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum JsonError {
    /// The response value could not be serialized.
    #[error("could not serialize JSON: {0}")]
    Encode(serde_json::Error),
    /// The request body was not valid JSON for the requested type.
    #[error("could not parse JSON request body: {0}")]
    Decode(serde_json::Error),
}

impl From<JsonError> for Error {
    fn from(error: JsonError) -> Self {
        let status = match error {
            JsonError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            JsonError::Decode(_) => StatusCode::BAD_REQUEST,
        };
        Error::with_status(error, status)
    }
}
