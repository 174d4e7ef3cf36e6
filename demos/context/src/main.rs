use std::collections::BTreeMap;
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::util::SubscriberInitExt;
use weft::middleware::{Next, from_fn};
use weft::value_context::ValueContext;
use weft::{Context, Error, Router, StatusCode};

const DATASTORE_KEY: &str = "datastore";

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    listen: u16,
    /// Bearer token required by the /admin routes
    #[arg(long, default_value = "secret")]
    admin_token: String,
}

/// Greetings and visit counts shared by every request.
#[derive(Debug, Default)]
struct Datastore {
    greetings: RwLock<BTreeMap<String, String>>,
    visits: RwLock<BTreeMap<String, u64>>,
}

#[derive(Debug, Serialize)]
struct Stats {
    greetings: BTreeMap<String, String>,
    visits: BTreeMap<String, u64>,
}

fn datastore(ctx: &Context) -> weft::Result<Arc<Datastore>> {
    ctx.value::<Datastore>(DATASTORE_KEY)
        .ok_or_else(|| Error::internal("datastore missing from the bound context"))
}

async fn hello(ctx: Context) -> weft::Result<()> {
    let name = ctx.param("name").unwrap_or_default().to_owned();
    let store = datastore(&ctx)?;

    *store.visits.write().entry(name.clone()).or_default() += 1;
    let greeting = store
        .greetings
        .read()
        .get(&name)
        .cloned()
        .unwrap_or_else(|| "hello".to_owned());

    ctx.text(StatusCode::OK, format!("{greeting} {name}"))
}

async fn set_greeting(ctx: Context) -> weft::Result<()> {
    let name = ctx.param("name").unwrap_or_default().to_owned();
    let Some(greeting) = ctx.form("greeting").await.filter(|g| !g.is_empty()) else {
        return Err(ctx.http_error(StatusCode::BAD_REQUEST, "missing `greeting` field"));
    };

    datastore(&ctx)?.greetings.write().insert(name, greeting);
    ctx.no_content(StatusCode::NO_CONTENT)
}

async fn stats(ctx: Context) -> weft::Result<()> {
    let store = datastore(&ctx)?;
    let stats = Stats {
        greetings: store.greetings.read().clone(),
        visits: store.visits.read().clone(),
    };
    ctx.json(StatusCode::OK, &stats)
}

async fn json_errors(ctx: Context, error: Error) {
    let http_error = match error.http_error() {
        Some(http_error) => http_error.clone(),
        None => {
            tracing::error!(%error, "request failed");
            weft::error::HttpError::new(error.status_code(), "internal server error")
        }
    };
    if let Err(error) = ctx.json(http_error.status(), &http_error) {
        tracing::error!(%error, "could not render error response");
    }
}

fn app(admin_token: String) -> Router {
    let router = Router::new();
    router
        .bind_context(
            ValueContext::background().with_value(DATASTORE_KEY, Datastore::default()),
        )
        .set_error_handler(json_errors)
        .middleware(from_fn(|ctx: Context, next: Next| async move {
            info!(method = %ctx.method(), path = ctx.path(), "request");
            next.call(ctx).await
        }));
    router
        .get("/hello/:name", hello)
        .post("/hello/:name", set_greeting);

    let expected = Arc::new(format!("Bearer {admin_token}"));
    let admin = router.sub_router("/admin");
    admin.middleware(from_fn(move |ctx: Context, next: Next| {
        let expected = Arc::clone(&expected);
        async move {
            if ctx.header("authorization") != Some(expected.as_str()) {
                return Err(ctx.http_error(StatusCode::UNAUTHORIZED, "invalid admin token"));
            }
            next.call(ctx).await
        }
    }));
    admin.get("/stats", stats);

    router
}

#[tokio::main]
async fn main() -> weft::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .finish()
        .init();

    app(cli.admin_token)
        .serve(&format!("0.0.0.0:{}", cli.listen))
        .await
}
