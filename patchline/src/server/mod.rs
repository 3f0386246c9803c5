//! HTTP front end for the content index.
//!
//! | Route         | Response                                             |
//! |---------------|------------------------------------------------------|
//! | `GET /`       | current manifest JSON, `503` while the index is not ready |
//! | `GET /reload` | starts a full rebuild, answers `200` immediately      |
//! | anything else | `404`                                                |
//!
//! Every request is logged with the remote endpoint, the `X-Forwarded-For`
//! header when a proxy sets it, the method and the path.

mod error;

pub use error::{ServerError, ServerResult};

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::index::ContentIndex;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Build the router serving `index`.
pub fn router(index: ContentIndex) -> Router {
    Router::new()
        .route("/", get(manifest))
        .route("/reload", get(reload))
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .with_state(index)
}

/// Bind `addr` and serve until the process ends.
pub async fn serve(index: ContentIndex, addr: SocketAddr) -> ServerResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_listener(listener, index, std::future::pending()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(
    listener: TcpListener,
    index: ContentIndex,
    shutdown: F,
) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr().map_err(ServerError::Serve)?;
    info!(addr = %local, root = %index.root().display(), "Index server listening");

    axum::serve(
        listener,
        router(index).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(ServerError::Serve)
}

async fn manifest(State(index): State<ContentIndex>) -> Response {
    match index.serve() {
        Some(body) => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )],
            body,
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("index is {}", index.state().name()),
        )
            .into_response(),
    }
}

async fn reload(State(index): State<ContentIndex>) -> StatusCode {
    index.reload_in_background();
    StatusCode::OK
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn log_request(request: Request, next: Next) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let forwarded_for = request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    info!(
        remote = %remote,
        forwarded_for = forwarded_for.as_deref().unwrap_or(""),
        method = %request.method(),
        path = %request.uri(),
        "Request"
    );

    next.run(request).await
}
