//! Serving files from a directory.
//!
//! See [`Router::static_files`](crate::Router::static_files).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use weft_core::headers::OCTET_STREAM_CONTENT_TYPE;

use crate::context::Context;
use crate::handler::Handler;
use crate::{Result, StatusCode};

/// Name of the catch-all route parameter holding the requested file path.
const FILEPATH_PARAM: &str = "filepath";

/// A handler serving the files below a directory.
#[derive(Debug, Clone)]
pub(crate) struct StaticFiles {
    dir: Arc<PathBuf>,
}

impl StaticFiles {
    pub(crate) fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: Arc::new(dir.into()),
        }
    }

    async fn serve(&self, ctx: Context) -> Result<()> {
        let requested = ctx.param(FILEPATH_PARAM).unwrap_or_default();
        let Some(path) = resolve(&self.dir, requested) else {
            debug!(requested, "rejected static file path");
            return not_found(&ctx);
        };

        match tokio::fs::read(&path).await {
            Ok(contents) => {
                let mime_type = mime_guess::from_path(&path)
                    .first_raw()
                    .unwrap_or(OCTET_STREAM_CONTENT_TYPE);
                ctx.bytes(StatusCode::OK, mime_type, contents)
            }
            Err(error) => {
                debug!(path = %path.display(), %error, "static file not readable");
                not_found(&ctx)
            }
        }
    }
}

impl Handler for StaticFiles {
    fn call(&self, context: Context) -> impl Future<Output = Result<()>> + Send {
        self.serve(context)
    }
}

fn not_found(ctx: &Context) -> Result<()> {
    ctx.text(StatusCode::NOT_FOUND, "404 page not found")
}

/// Maps a request path onto a file below `dir`.
///
/// Returns `None` for paths that would leave `dir`.
fn resolve(dir: &Path, requested: &str) -> Option<PathBuf> {
    let mut path = dir.to_path_buf();
    for segment in requested.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if segment == ".." || segment.contains('\\') {
            return None;
        }
        path.push(segment);
    }
    Some(path)
}
