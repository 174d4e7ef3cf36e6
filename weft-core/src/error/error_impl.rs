use std::error::Error as StdError;
use std::fmt::Display;
use std::ops::Deref;

use derive_more::with_trait::Debug;

use crate::StatusCode;
use crate::error::HttpError;

/// An error that can occur while handling a request.
///
/// Any failure returned from a handler or a middleware ends up as an
/// `Error` and is passed to the error handler of the router that owns the
/// matched route.
pub struct Error {
    repr: Box<ErrorImpl>,
}

impl Error {
    /// Create a new error with a custom error message or error type.
    ///
    /// This method is used to create a new error that does not have a specific
    /// HTTP status code associated with it. If in the chain of `Error` sources
    /// there is an error with a status code, it will be used instead. If not,
    /// the default status code of 500 Internal Server Error will be used.
    #[must_use]
    pub fn wrap<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            repr: Box::new(ErrorImpl {
                inner: error.into(),
                status_code: None,
            }),
        }
    }

    /// Create a new error with a custom error message or error type.
    ///
    /// The error will be associated with a 500 Internal Server Error
    /// status code.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::Error;
    ///
    /// let error = Error::internal("An error occurred");
    /// let error = Error::internal(std::io::Error::other("An error occurred"));
    /// ```
    #[must_use]
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self::with_status(error, StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Create a new error with a custom error message or error type and a
    /// specific HTTP status code.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::{Error, StatusCode};
    ///
    /// let error = Error::with_status("Invalid input", StatusCode::BAD_REQUEST);
    /// assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    /// ```
    #[must_use]
    pub fn with_status<E>(error: E, status_code: StatusCode) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        let error = Self {
            repr: Box::new(ErrorImpl {
                inner: error.into(),
                status_code: Some(status_code),
            }),
        };
        Self::wrap(WithStatusCode(error))
    }

    /// Returns the HTTP status code associated with this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::{Error, StatusCode};
    ///
    /// let error = Error::internal("Something went wrong");
    /// assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    ///
    /// let error = Error::wrap("no status attached");
    /// assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    /// ```
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        self.inner()
            .repr
            .status_code
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Returns a reference to inner `Error`, if `self` is wrapping a wrapper.
    /// Otherwise, it returns `self`.
    ///
    /// This is useful for extracting the original error when it has been
    /// wrapped multiple times on its way through the middleware chain.
    #[must_use]
    pub fn inner(&self) -> &Self {
        let mut error: &dyn StdError = self;
        while let Some(inner) = error.source() {
            if let Some(error) = inner.downcast_ref::<Self>()
                && !error.is_wrapper()
            {
                return error;
            }
            error = inner;
        }
        self
    }

    /// Returns `true` if this error is a wrapper around another error.
    ///
    /// In other words, this returns `true` if the error has been created
    /// with [`Error::wrap`], which means it does not have a specific
    /// HTTP status code associated with it.
    #[must_use]
    pub fn is_wrapper(&self) -> bool {
        self.repr.status_code.is_none()
    }

    /// Returns the structured [`HttpError`] carried by this error, if any.
    ///
    /// Error handlers use this to tell structured failures apart from
    /// opaque ones.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::error::HttpError;
    /// use weft_core::{Error, StatusCode};
    ///
    /// let error = Error::from(HttpError::new(StatusCode::BAD_REQUEST, "bad request"));
    /// let http_error = error.http_error().unwrap();
    /// assert_eq!(http_error.code, 400);
    ///
    /// assert!(Error::internal("opaque").http_error().is_none());
    /// ```
    #[must_use]
    pub fn http_error(&self) -> Option<&HttpError> {
        let mut error: Option<&(dyn StdError + 'static)> = Some(self.repr.inner.as_ref());
        while let Some(current) = error {
            if let Some(http_error) = current.downcast_ref::<HttpError>() {
                return Some(http_error);
            }
            // `Error::source` skips over its own payload, so descend manually
            error = match current.downcast_ref::<Self>() {
                Some(nested) => Some(nested.repr.inner.as_ref()),
                None => current.source(),
            };
        }
        None
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(&self.repr, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.repr.inner, f)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.repr.inner.source()
    }
}

impl Deref for Error {
    type Target = dyn StdError + Send + Sync;

    fn deref(&self) -> &Self::Target {
        &*self.repr.inner
    }
}

#[derive(Debug)]
struct ErrorImpl {
    inner: Box<dyn StdError + Send + Sync>,
    status_code: Option<StatusCode>,
}

/// Indicates that the inner `Error` has a status code associated with it.
///
/// This is important, as we need to have this `Error` to be returned
/// by `std::error::Error::source` to be able to extract the status code.
#[derive(Debug)]
struct WithStatusCode(Error);

impl Display for WithStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl StdError for WithStatusCode {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.0)
    }
}

#[macro_export]
macro_rules! impl_into_weft_error {
    ($error_ty:ty) => {
        impl From<$error_ty> for $crate::Error {
            fn from(err: $error_ty) -> Self {
                $crate::Error::internal(err)
            }
        }
    };
    ($error_ty:ty, $status_code:ident) => {
        impl From<$error_ty> for $crate::Error {
            fn from(err: $error_ty) -> Self {
                $crate::Error::with_status(err, $crate::StatusCode::$status_code)
            }
        }
    };
}
pub use impl_into_weft_error;
