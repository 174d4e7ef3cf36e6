use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::header::{ALLOW, CONTENT_TYPE};
use weft::error::HttpError;
use weft::middleware::{Next, from_fn};
use weft::test::{Client, TestRequestBuilder};
use weft::value_context::ValueContext;
use weft::{Context, Error, Response, Router, StatusCode};

async fn body_string(response: Response) -> String {
    let bytes = response.into_body().into_bytes().await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn hello(ctx: Context) -> weft::Result<()> {
    let name = ctx.param("name").unwrap_or_default().to_owned();
    ctx.text(StatusCode::OK, format!("hello {name}"))
}

async fn ok(ctx: Context) -> weft::Result<()> {
    ctx.text(StatusCode::OK, "ok")
}

async fn explode(_ctx: Context) -> weft::Result<()> {
    panic!("boom")
}

async fn bad_request(ctx: Context) -> weft::Result<()> {
    Err(ctx.http_error(StatusCode::BAD_REQUEST, "bad request"))
}

async fn json_error_handler(ctx: Context, error: Error) {
    match error.http_error() {
        Some(http_error) => {
            let _ = ctx.json(http_error.status(), http_error);
        }
        None => {
            let _ = ctx.text(error.status_code(), error.to_string());
        }
    }
}

fn tag(letter: &'static str) -> impl weft::middleware::Middleware {
    from_fn(move |ctx: Context, next: Next| async move {
        ctx.write(letter);
        next.call(ctx).await
    })
}

async fn write_d(ctx: Context) -> weft::Result<()> {
    ctx.write("D");
    Ok(())
}

#[tokio::test]
async fn named_parameter() {
    let router = Router::new();
    router.get("/hello/:name", hello);
    let client = Client::new(router);

    let response = client.get("/hello/anthony").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello anthony");
}

#[tokio::test]
async fn routes_per_method() {
    let router = Router::new();
    router
        .get("/item", |ctx: Context| async move { ctx.text(StatusCode::OK, "get") })
        .post("/item", |ctx: Context| async move {
            ctx.text(StatusCode::CREATED, "post")
        })
        .delete("/item", |ctx: Context| async move {
            ctx.no_content(StatusCode::NO_CONTENT)
        });
    let client = Client::new(router);

    let response = client.get("/item").await;
    assert_eq!(body_string(response).await, "get");

    let response = client.post("/item").await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_string(response).await, "post");

    let response = client
        .request(TestRequestBuilder::delete("/item").build())
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn any_matches_every_method() {
    let router = Router::new();
    router.any("/anything", ok);
    let client = Client::new(router);

    for request in [
        TestRequestBuilder::get("/anything").build(),
        TestRequestBuilder::put("/anything").build(),
        TestRequestBuilder::patch("/anything").build(),
    ] {
        assert_eq!(client.request(request).await.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let router = Router::new();
    router.get("/known", ok);
    let client = Client::new(router);

    let response = client.get("/unknown").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "404 page not found");
}

#[tokio::test]
async fn wrong_method_is_method_not_allowed() {
    let router = Router::new();
    router.get("/resource", ok).put("/resource", ok);
    let client = Client::new(router);

    let response = client.post("/resource").await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET, PUT");
    assert_eq!(body_string(response).await, "405 Method Not Allowed");
}

#[tokio::test]
async fn custom_not_found_and_method_not_allowed() {
    let router = Router::new();
    router
        .get("/only-get", ok)
        .set_not_found_handler(|ctx: Context| async move {
            ctx.text(StatusCode::NOT_FOUND, "nothing here")
        })
        .set_method_not_allowed_handler(|ctx: Context| async move {
            ctx.text(StatusCode::METHOD_NOT_ALLOWED, "try another verb")
        });
    let client = Client::new(router);

    let response = client.get("/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await, "nothing here");

    let response = client.post("/only-get").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "GET");
    assert_eq!(body_string(response).await, "try another verb");
}

#[tokio::test]
async fn sub_router_root_route() {
    let router = Router::new();
    let sub = router.sub_router("/test");
    sub.get("/", |ctx: Context| async move { ctx.text(StatusCode::OK, "sub root") });
    sub.get("/child", ok);
    let client = Client::new(router);

    let response = client.get("/test").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "sub root");

    assert_eq!(client.get("/test/child").await.status(), StatusCode::OK);
    assert_eq!(client.get("/child").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn nested_sub_routers() {
    let router = Router::new();
    let api = router.sub_router("/api/");
    let v1 = api.sub_router("v1");
    v1.get("/users/:id", |ctx: Context| async move {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        ctx.text(StatusCode::OK, id)
    });
    let client = Client::new(router);

    assert_eq!(v1.prefix(), "/api/v1");
    let response = client.get("/api/v1/users/42").await;
    assert_eq!(body_string(response).await, "42");
}

#[tokio::test]
async fn static_files_served_under_prefix() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("style.css"), "body {}").unwrap();
    let router = Router::new();
    router.static_files("/static", dir.path());
    let client = Client::new(router);

    let response = client.get("/static/style.css").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "text/css");
    assert_eq!(body_string(response).await, "body {}");
    assert_eq!(
        client.get("/static/../Cargo.toml").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn middleware_order() {
    let router = Router::new();
    router.middleware(tag("A")).middleware(tag("B")).middleware(tag("C"));
    router.get("/", write_d);
    let client = Client::new(router);

    let response = client.get("/").await;

    assert_eq!(body_string(response).await, "ABCD");
}

#[tokio::test]
async fn sub_router_inherits_a_snapshot_of_middleware() {
    let router = Router::new();
    router.middleware(tag("A"));
    let sub = router.sub_router("/sub");
    router.middleware(tag("B"));
    sub.middleware(tag("C"));
    router.get("/", write_d);
    sub.get("/", write_d);
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/").await).await, "ABD");
    assert_eq!(body_string(client.get("/sub").await).await, "ACD");
}

#[tokio::test]
async fn reset_middleware_on_sub_router() {
    let router = Router::new();
    router.middleware(tag("A"));
    let sub = router.sub_router("/bare");
    sub.reset_middleware();
    sub.get("/", write_d);
    router.get("/", write_d);
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/bare").await).await, "D");
    assert_eq!(body_string(client.get("/").await).await, "AD");
}

#[derive(Debug)]
struct Datastore {
    name: &'static str,
}

#[tokio::test]
async fn bound_context_reaches_handlers() {
    let router = Router::new();
    router.bind_context(ValueContext::background().with_value("db", Datastore { name: "main" }));
    let admin = router.sub_router("/admin");
    admin.get("/", |ctx: Context| async move {
        let db = ctx.value::<Datastore>("db");
        ctx.text(StatusCode::OK, db.map_or("none", |db| db.name))
    });
    let client = Client::new(router);

    let response = client.get("/admin").await;

    assert_eq!(body_string(response).await, "main");
}

#[tokio::test]
async fn value_context_across_middleware() {
    let router = Router::new();
    router
        .middleware(from_fn(|ctx: Context, next: Next| async move {
            ctx.with_value("m1", "first".to_owned());
            next.call(ctx).await
        }))
        .middleware(from_fn(|ctx: Context, next: Next| async move {
            ctx.with_value("m2", "second".to_owned());
            next.call(ctx).await
        }));
    router.get("/", |ctx: Context| async move {
        let m1 = ctx.value::<String>("m1").unwrap_or_default();
        let m2 = ctx.value::<String>("m2").unwrap_or_default();
        ctx.text(StatusCode::OK, format!("{m1} {m2}"))
    });
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/").await).await, "first second");
}

#[tokio::test]
async fn error_handler_runs_once_and_stops_the_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let reached = Arc::new(AtomicUsize::new(0));
    let router = Router::new();
    router.set_error_handler({
        let calls = Arc::clone(&calls);
        move |ctx: Context, error: Error| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let _ = ctx.text(error.status_code(), error.to_string());
            }
        }
    });
    router.middleware(from_fn(|ctx: Context, _next: Next| async move {
        Err(ctx.http_error(StatusCode::UNAUTHORIZED, "no token"))
    }));
    router.get("/", {
        let reached = Arc::clone(&reached);
        move |ctx: Context| {
            let reached = Arc::clone(&reached);
            async move {
                reached.fetch_add(1, Ordering::SeqCst);
                ctx.text(StatusCode::OK, "handler")
            }
        }
    });
    let client = Client::new(router);

    let response = client.get("/").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_string(response).await, "401: no token");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn http_error_rendered_as_json() {
    let router = Router::new();
    router.set_error_handler(json_error_handler);
    router.get("/", bad_request);
    let client = Client::new(router);

    let response = client.get("/").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    let body = body_string(response).await;
    assert_eq!(body, r#"{"code":400,"description":"bad request"}"#);
    let decoded: HttpError = serde_json::from_str(&body).unwrap();
    assert_eq!(decoded, HttpError::new(StatusCode::BAD_REQUEST, "bad request"));
}

#[tokio::test]
async fn sub_router_error_handler_overrides_parent() {
    let router = Router::new();
    let api = router.sub_router("/api");
    api.set_error_handler(json_error_handler);
    router.get("/", bad_request);
    api.get("/", bad_request);
    let client = Client::new(router);

    let response = client.get("/").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "500 Internal Server Error");

    let response = client.get("/api").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn panic_is_caught() {
    let router = Router::new();
    router.set_error_handler(json_error_handler);
    router.get("/panic", explode).get("/fine", ok);
    let client = Client::new(router);

    let response = client.get("/panic").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "an unexpected error occurred");

    assert_eq!(client.get("/fine").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn query_form_and_headers() {
    let router = Router::new();
    router.post("/submit", |ctx: Context| async move {
        let page = ctx.query("page").unwrap_or_default();
        let user = ctx.form("user").await.unwrap_or_default();
        let agent = ctx.header("x-agent").unwrap_or_default().to_owned();
        ctx.set_header("x-handled-by", "weft")?;
        ctx.text(StatusCode::OK, format!("{page} {user} {agent}"))
    });
    let client = Client::new(router);

    let request = TestRequestBuilder::post("/submit?page=3")
        .header("x-agent", "tests")
        .form_data(&[("user", "anthony")])
        .build();
    let response = client.request(request).await;

    assert_eq!(response.headers()["x-handled-by"], "weft");
    assert_eq!(body_string(response).await, "3 anthony tests");
}

#[tokio::test]
async fn store_shared_between_middleware_and_handler() {
    let router = Router::new();
    router.middleware(from_fn(|ctx: Context, next: Next| async move {
        ctx.set("user", 7_u32);
        next.call(ctx).await
    }));
    router.get("/", |ctx: Context| async move {
        let user = ctx.get_as::<u32>("user").map_or(0, |user| *user);
        ctx.text(StatusCode::OK, user.to_string())
    });
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/").await).await, "7");
}

#[tokio::test]
async fn json_body_decoding() {
    #[derive(serde::Deserialize)]
    struct Greeting {
        name: String,
    }

    let router = Router::new();
    router.set_error_handler(json_error_handler);
    router.put("/greet", |ctx: Context| async move {
        let greeting: Greeting = ctx.decode_json().await?;
        ctx.text(StatusCode::OK, greeting.name)
    });
    let client = Client::new(router);

    let request = TestRequestBuilder::put("/greet")
        .json(&serde_json::json!({"name": "weft"}))
        .build();
    assert_eq!(body_string(client.request(request).await).await, "weft");

    let request = TestRequestBuilder::put("/greet")
        .json(&serde_json::json!({"nom": "weft"}))
        .build();
    assert_eq!(
        client.request(request).await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn sub_router_binding_shadows_only_its_own_keys() {
    let router = Router::new();
    router.bind_context(
        ValueContext::background()
            .with_value("a", "root-a")
            .with_value("b", "root-b"),
    );
    let sub = router.sub_router("/sub");
    sub.bind_context(ValueContext::background().with_value("b", "sub-b"));
    let read = |ctx: Context| async move {
        let a = ctx.value::<&str>("a").map_or("none", |a| *a);
        let b = ctx.value::<&str>("b").map_or("none", |b| *b);
        ctx.text(StatusCode::OK, format!("a={a} b={b}"))
    };
    router.get("/", read);
    sub.get("/", read);
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/sub").await).await, "a=root-a b=sub-b");
    assert_eq!(body_string(client.get("/").await).await, "a=root-a b=root-b");
}

#[tokio::test]
async fn head_route() {
    let router = Router::new();
    router.head("/status", |ctx: Context| async move {
        ctx.set_header("x-alive", "yes")?;
        ctx.no_content(StatusCode::OK)
    });
    let client = Client::new(router);

    let response = client
        .request(TestRequestBuilder::new(weft::Method::HEAD, "/status").build())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-alive"], "yes");
    assert_eq!(client.get("/status").await.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn options_route() {
    let router = Router::new();
    router.options("/resource", |ctx: Context| async move {
        ctx.set_header("allow", "GET, OPTIONS")?;
        ctx.no_content(StatusCode::NO_CONTENT)
    });
    let client = Client::new(router);

    let response = client
        .request(TestRequestBuilder::new(weft::Method::OPTIONS, "/resource").build())
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[ALLOW], "GET, OPTIONS");
}

#[tokio::test]
async fn handle_custom_method() {
    let purge = weft::Method::from_bytes(b"PURGE").unwrap();
    let router = Router::new();
    router.handle(purge.clone(), "/cache/:key", |ctx: Context| async move {
        let key = ctx.param("key").unwrap_or_default().to_owned();
        ctx.text(StatusCode::OK, format!("purged {key}"))
    });
    let client = Client::new(router);

    let response = client
        .request(TestRequestBuilder::new(purge, "/cache/users").build())
        .await;
    assert_eq!(body_string(response).await, "purged users");

    let response = client.get("/cache/users").await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[ALLOW], "PURGE");
}

#[tokio::test]
async fn middlewares_registers_in_order() {
    let router = Router::new();
    router.middlewares([tag("A"), tag("B"), tag("C")]);
    router.get("/", write_d);
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/").await).await, "ABCD");
}

#[tokio::test]
async fn sibling_sub_routers_are_isolated() {
    let router = Router::new();
    router.middleware(tag("R"));
    let left = router.sub_router("/left");
    let right = router.sub_router("/right");
    left.middleware(tag("L"));
    right.middleware(tag("X"));
    left.get("/", write_d);
    right.get("/", write_d);
    router.get("/", write_d);
    let client = Client::new(router);

    assert_eq!(body_string(client.get("/left").await).await, "RLD");
    assert_eq!(body_string(client.get("/right").await).await, "RXD");
    assert_eq!(body_string(client.get("/").await).await, "RD");
}
