use bytes::BytesMut;
use http::HeaderMap;
use tracing::debug;

use crate::{Body, Response, StatusCode};

/// The buffered outbound response of a single request.
///
/// The status is fixed by the first call to [`Self::write_header`] or the
/// first body write (which implies 200 OK). From then on the response is
/// committed: later status and header changes are ignored.
#[derive(Debug, Default)]
pub(crate) struct ResponseWriter {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseWriter {
    pub(crate) fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.status.is_some()
    }

    pub(crate) fn write_header(&mut self, status: StatusCode) {
        if let Some(written) = self.status {
            debug!(%written, ignored = %status, "superfluous write_header call");
            return;
        }
        self.status = Some(status);
    }

    /// Returns the headers if they can still be modified.
    pub(crate) fn headers_mut(&mut self) -> Option<&mut HeaderMap> {
        if self.is_committed() {
            debug!("response already committed; header change ignored");
            None
        } else {
            Some(&mut self.headers)
        }
    }

    pub(crate) fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn write(&mut self, data: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
    }

    pub(crate) fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_response(self) -> Response {
        let mut response = Response::new(Body::fixed(self.body.freeze()));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = self.headers;
        response
    }
}
