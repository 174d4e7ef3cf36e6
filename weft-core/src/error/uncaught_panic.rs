//! Error types and utilities for handling uncaught panics.

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::error::error_impl::impl_into_weft_error;

/// An error that represents a panic raised by a handler or middleware while
/// a request was being processed.
///
/// The dispatch pipeline catches the panic and hands this error to the
/// router's error handler, so a single misbehaving request never takes the
/// server down.
///
/// # Examples
///
/// ```
/// use weft_core::error::UncaughtPanic;
///
/// let panic = UncaughtPanic::new(Box::new("something went wrong"));
/// assert_eq!(panic.message().as_deref(), Some("something went wrong"));
/// ```
#[derive(Debug, Clone, Error)]
#[error("an unexpected error occurred")]
pub struct UncaughtPanic {
    payload: Arc<Mutex<Box<dyn Any + Send + 'static>>>,
}
impl_into_weft_error!(UncaughtPanic, INTERNAL_SERVER_ERROR);

impl UncaughtPanic {
    /// Creates a new `UncaughtPanic` with the given panic payload.
    #[must_use]
    pub fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self {
            payload: Arc::new(Mutex::new(payload)),
        }
    }

    /// Returns the panic message, if the payload was a string.
    ///
    /// `panic!("literal")` produces a `&'static str` payload and formatted
    /// panics produce a `String`; anything else yields `None`.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let payload = self.payload.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(message) = payload.downcast_ref::<&'static str>() {
            Some((*message).to_owned())
        } else {
            payload.downcast_ref::<String>().cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, StatusCode};

    #[test]
    fn formatted_panic_message() {
        let panic = UncaughtPanic::new(Box::new(format!("index {} out of range", 3)));

        assert_eq!(panic.message().as_deref(), Some("index 3 out of range"));
    }

    #[test]
    fn opaque_payload_has_no_message() {
        let panic = UncaughtPanic::new(Box::new(42_u32));

        assert_eq!(panic.message(), None);
    }

    #[test]
    fn converts_to_internal_server_error() {
        let error = Error::from(UncaughtPanic::new(Box::new("boom")));

        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_string(), "an unexpected error occurred");
    }
}
