//! HTTP server - the status page and the progress event stream.
//!
//! Routes (under the configured base path):
//! - `GET /zip-download`      static status page
//! - `GET /zip-download/api`  `text/event-stream` driven by `ProgressStream`

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::streaming::{ChannelSink, ProgressStream, BASE_URL_PARAM};

/// Status page, compiled into the binary
const STATUS_PAGE: &str = include_str!("../../templates/status.html");

pub const STATUS_ROUTE: &str = "/zip-download";
pub const STREAM_ROUTE: &str = "/zip-download/api";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    stream: Arc<ProgressStream>,
}

impl AppState {
    pub fn new(stream: ProgressStream) -> Self {
        Self {
            stream: Arc::new(stream),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(ProgressStream::new(config.target.clone()).with_keep_alive(config.keep_alive))
    }
}

/// Last value of `name` in the query. Repeated keys are allowed.
fn last_param(params: Vec<(String, String)>, name: &str) -> Option<String> {
    params
        .into_iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value)
        .last()
}

/// Build the router, mounted under `base_path` (`/` for the root).
pub fn router(state: AppState, base_path: &str) -> Router {
    let routes = Router::new()
        .route(STATUS_ROUTE, get(status_page))
        .route(STREAM_ROUTE, get(zip_stream))
        .with_state(state);

    let app = match base_path.trim_end_matches('/') {
        "" => routes,
        prefix => Router::new().nest(prefix, routes),
    };

    app.layer(TraceLayer::new_for_http())
}

async fn status_page() -> Html<&'static str> {
    Html(STATUS_PAGE)
}

/// Start an archive run and stream its progress.
///
/// A missing `baseUrl` is reported inside the stream, so this always
/// answers 200 with an event stream.
async fn zip_stream(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let base_url = last_param(params, BASE_URL_PARAM);
    let (mut sink, rx) = ChannelSink::channel();
    let stream = state.stream.clone();

    tokio::spawn(async move {
        let outcome = stream.run(base_url.as_deref(), &mut sink).await;
        debug!(?outcome, "Progress stream ended");
    });

    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frame_stream(rx)),
    )
        .into_response()
}

/// Response body over the sink's receiver. Ends when the controller drops
/// its sink; dropping the body (client gone) closes the channel.
fn frame_stream(
    rx: mpsc::Receiver<Bytes>,
) -> impl futures::Stream<Item = std::result::Result<Bytes, Infallible>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|frame| (Ok(frame), rx))
    })
}

/// Serve until Ctrl-C.
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let app = router(AppState::from_config(&config), &config.base_path);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    let addr = listener.local_addr().context("Failed to read local address")?;

    info!(
        %addr,
        base_path = %config.base_path,
        root = %config.target.root().display(),
        archive = %config.target.archive_path().display(),
        "nbzip listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("nbzip stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
