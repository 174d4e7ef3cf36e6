//! The structured HTTP error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::StatusCode;

/// A failure carrying an HTTP status code and a human-readable description.
///
/// Returning an `HttpError` from a handler does not write anything by
/// itself; it travels to the router's error handler like any other
/// [`Error`](crate::Error), which can recover it with
/// [`Error::http_error`](crate::Error::http_error) and render it, for
/// instance as JSON.
///
/// # Examples
///
/// ```
/// use weft_core::StatusCode;
/// use weft_core::error::HttpError;
///
/// let error = HttpError::new(StatusCode::BAD_REQUEST, "bad request");
/// assert_eq!(error.status(), StatusCode::BAD_REQUEST);
/// assert_eq!(error.to_string(), "400: bad request");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {description}")]
pub struct HttpError {
    /// Numeric HTTP status code.
    pub code: u16,
    /// Description of what went wrong.
    pub description: String,
}

impl HttpError {
    /// Creates a new `HttpError`.
    #[must_use]
    pub fn new<T: Into<String>>(status: StatusCode, description: T) -> Self {
        Self {
            code: status.as_u16(),
            description: description.into(),
        }
    }

    /// Returns the status code as a [`StatusCode`].
    ///
    /// Codes outside the valid HTTP range (which can only appear through
    /// deserialization) map to 500 Internal Server Error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<HttpError> for crate::Error {
    fn from(err: HttpError) -> Self {
        let status = err.status();
        crate::Error::with_status(err, status)
    }
}
