//! Route table and request middleware

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::media::FrameBuffer;
use crate::session::{StreamDispatcher, StreamSession};
use crate::stats::ServerCounters;

use super::config::ServerConfig;
use super::page::index_page;

/// Path of the index page
pub const INDEX_PATH: &str = "/index.html";

/// Path of the MJPEG stream
pub const STREAM_PATH: &str = "/stream.mjpg";

/// State shared by every request
#[derive(Clone)]
pub struct HttpState {
    config: Arc<ServerConfig>,
    frames: Arc<FrameBuffer>,
    counters: Arc<ServerCounters>,
    limiter: Option<Arc<Semaphore>>,
    next_session_id: Arc<AtomicU64>,
}

impl HttpState {
    /// State for a server streaming frames from `frames`
    pub fn new(config: ServerConfig, frames: Arc<FrameBuffer>) -> Self {
        let limiter = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config: Arc::new(config),
            frames,
            counters: Arc::new(ServerCounters::new()),
            limiter,
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Server-wide counters
    pub fn counters(&self) -> &Arc<ServerCounters> {
        &self.counters
    }
}

/// Build the router for `/`, the index page and the stream
pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(redirect_to_index))
        .route(INDEX_PATH, get(index))
        .route(STREAM_PATH, get(stream))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), limit_requests))
        .layer(middleware::from_fn(only_get))
        .with_state(state)
}

async fn redirect_to_index() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, INDEX_PATH)]).into_response()
}

async fn index(State(state): State<HttpState>) -> Response {
    let page = index_page(state.config.page_width, state.config.page_height);
    ([(header::CONTENT_TYPE, "text/html")], page).into_response()
}

async fn stream(State(state): State<HttpState>, request: Request) -> Response {
    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    let session = StreamSession::new(session_id, peer_addr(&request));

    StreamDispatcher::new(
        session,
        Arc::clone(&state.frames),
        Arc::clone(&state.counters),
        &state.config,
    )
    .into_response()
}

async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND)
}

async fn only_get(request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        tracing::debug!(
            method = %request.method(),
            path = request.uri().path(),
            "Unsupported method"
        );
        return error_response(StatusCode::NOT_IMPLEMENTED);
    }
    next.run(request).await
}

/// Reject requests over `max_connections` with a 503
///
/// The permit lives as long as the response body, so an open stream keeps
/// its slot until the client goes away.
async fn limit_requests(
    State(state): State<HttpState>,
    request: Request,
    next: Next,
) -> Response {
    let permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer_addr(&request), "Request rejected: limit reached");
                state.counters.request_rejected();
                return error_response(StatusCode::SERVICE_UNAVAILABLE);
            }
        },
        None => None,
    };

    state.counters.request_accepted();
    tracing::debug!(
        peer = %peer_addr(&request),
        path = request.uri().path(),
        "Request"
    );

    let response = next.run(request).await;
    match permit {
        Some(permit) => hold_while_sending(response, permit),
        None => response,
    }
}

fn hold_while_sending(response: Response, permit: OwnedSemaphorePermit) -> Response {
    let (parts, body) = response.into_parts();
    let body = body.into_data_stream().map(move |chunk| {
        let _held = &permit;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(body))
}

fn error_response(status: StatusCode) -> Response {
    let page = format!(
        "<html><head><title>Error response</title></head>\
         <body><h1>Error response</h1><p>Error code: {}</p><p>Message: {}.</p></body></html>\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    (status, [(header::CONTENT_TYPE, "text/html;charset=utf-8")], page).into_response()
}

// Requests built in-process (tests) carry no peer
fn peer_addr(request: &Request) -> SocketAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)))
}
