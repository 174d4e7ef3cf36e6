use std::error::Error as StdError;
use std::fmt::{Debug, Formatter};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Frame, SizeHint};
use sync_wrapper::SyncWrapper;

use crate::error::impl_into_weft_error;
use crate::{Error, Result};

/// A type that represents an HTTP request or response body.
///
/// Request bodies coming from the server are backed by the transport's
/// streaming body; everything produced by handlers is a fixed buffer.
///
/// # Examples
///
/// ```
/// use weft_core::Body;
///
/// let body = Body::fixed("Hello, world!");
/// ```
#[derive(Debug)]
pub struct Body {
    inner: BodyInner,
}

enum BodyInner {
    Fixed(Bytes),
    Axum(SyncWrapper<axum::body::Body>),
}

impl Debug for BodyInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(data) => f.debug_tuple("Fixed").field(data).finish(),
            Self::Axum(_) => f.debug_tuple("Axum").field(&"...").finish(),
        }
    }
}

impl Body {
    #[must_use]
    const fn new(inner: BodyInner) -> Self {
        Self { inner }
    }

    /// Create an empty body.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::Body;
    ///
    /// let body = Body::empty();
    /// ```
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(BodyInner::Fixed(Bytes::new()))
    }

    /// Create a body instance with the given fixed data.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::Body;
    ///
    /// let body = Body::fixed("Hello, world!");
    /// ```
    #[must_use]
    pub fn fixed<T: Into<Bytes>>(data: T) -> Self {
        Self::new(BodyInner::Fixed(data.into()))
    }

    /// Convert this [`Body`] instance into a byte array.
    ///
    /// This method reads the entire body into memory. For a way to read the
    /// body while limiting the memory usage, see [`Self::into_bytes_limited`].
    ///
    /// # Errors
    ///
    /// This method returns an error if reading the body fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::Body;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> weft_core::Result<()> {
    /// let body = Body::fixed("Hello, world!");
    /// let bytes = body.into_bytes().await?;
    /// assert_eq!(bytes, "Hello, world!".as_bytes());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn into_bytes(self) -> Result<Bytes> {
        self.into_bytes_limited(usize::MAX).await
    }

    /// Convert this [`Body`] instance into a byte array, failing if the body
    /// is larger than `limit` bytes.
    ///
    /// # Errors
    ///
    /// This method returns an error if reading the body fails or if the body
    /// is larger than the limit.
    ///
    /// # Examples
    ///
    /// ```
    /// use weft_core::Body;
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> weft_core::Result<()> {
    /// let body = Body::fixed("Hello, world!");
    /// assert!(body.into_bytes_limited(4).await.is_err());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn into_bytes_limited(self, limit: usize) -> Result<Bytes> {
        use http_body_util::BodyExt;

        Ok(http_body_util::Limited::new(self, limit)
            .collect()
            .await
            .map(http_body_util::Collected::to_bytes)
            .map_err(ReadRequestBody)?)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<axum::body::Body> for Body {
    fn from(body: axum::body::Body) -> Self {
        Self::new(BodyInner::Axum(SyncWrapper::new(body)))
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<std::result::Result<Frame<Self::Data>, Self::Error>>> {
        match self.get_mut().inner {
            BodyInner::Fixed(ref mut data) => {
                if data.is_empty() {
                    Poll::Ready(None)
                } else {
                    let data = std::mem::take(data);
                    Poll::Ready(Some(Ok(Frame::data(data))))
                }
            }
            BodyInner::Axum(ref mut axum_body) => {
                let axum_body = axum_body.get_mut();
                Pin::new(axum_body)
                    .poll_frame(cx)
                    .map_err(|error| ReadRequestBody(Box::new(error)).into())
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            BodyInner::Fixed(data) => data.is_empty(),
            BodyInner::Axum(_) => false,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            BodyInner::Fixed(data) => SizeHint::with_exact(data.len() as u64),
            BodyInner::Axum(_) => SizeHint::new(),
        }
    }
}

macro_rules! body_from_impl {
    ($ty:ty) => {
        impl From<$ty> for Body {
            fn from(buf: $ty) -> Self {
                Self::new(BodyInner::Fixed(Bytes::from(buf)))
            }
        }
    };
}

body_from_impl!(&'static [u8]);
body_from_impl!(Vec<u8>);

body_from_impl!(&'static str);
body_from_impl!(String);

body_from_impl!(Bytes);

#[derive(Debug, thiserror::Error)]
#[error("could not retrieve request body: {0}")]
struct ReadRequestBody(#[source] Box<dyn StdError + Send + Sync>);
impl_into_weft_error!(ReadRequestBody, BAD_REQUEST);
