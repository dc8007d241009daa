//! Local HTTP server serving canned download bodies.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

pub const XLSX_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// One canned response under `/download/{name}`.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
    pub file_name: Option<String>,
    /// Time spent "in flight" before the response starts.
    pub delay: Duration,
    /// Answer 503 to this many requests before serving the body.
    pub fail_first: usize,
    /// Send the body as a first chunk, then never finish.
    pub stalls: bool,
}

impl Route {
    pub fn file(file_name: &str, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            body,
            content_type: XLSX_TYPE.to_string(),
            file_name: Some(file_name.to_string()),
            delay: Duration::ZERO,
            fail_first: 0,
            stalls: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_type: "text/plain".to_string(),
            file_name: None,
            delay: Duration::ZERO,
            fail_first: 0,
            stalls: false,
        }
    }

    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_first(mut self, times: usize) -> Self {
        self.fail_first = times;
        self
    }

    pub fn stalls(mut self) -> Self {
        self.stalls = true;
        self
    }
}

#[derive(Default)]
struct ServerState {
    routes: HashMap<String, Route>,
    hits: Mutex<HashMap<String, usize>>,
    cookies: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct TestServer {
    pub base_url: String,
    state: Arc<ServerState>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let state = Arc::new(ServerState {
            routes: routes
                .into_iter()
                .map(|(name, route)| (name.to_string(), route))
                .collect(),
            ..ServerState::default()
        });

        let app = Router::new()
            .route("/download/:name", get(serve_download))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn hits(&self, name: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// `Cookie` header values seen so far.
    pub fn cookies_seen(&self) -> Vec<String> {
        self.state.cookies.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_download(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(route) = state.routes.get(&name).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if let Some(cookie) = headers.get(COOKIE).and_then(|v| v.to_str().ok()) {
        state.cookies.lock().unwrap().push(cookie.to_string());
    }
    let hit = {
        let mut hits = state.hits.lock().unwrap();
        let count = hits.entry(name).or_insert(0);
        *count += 1;
        *count
    };

    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);
    tokio::time::sleep(route.delay).await;
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    if hit <= route.fail_first {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let status = StatusCode::from_u16(route.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, route.content_type.as_str());
    if let Some(file_name) = &route.file_name {
        builder = builder.header(
            CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        );
    }

    let body = if route.stalls {
        let first = Bytes::from(route.body);
        let stream = futures_util::stream::unfold(Some(first), |chunk| async move {
            match chunk {
                Some(bytes) => Some((Ok::<Bytes, std::io::Error>(bytes), None)),
                None => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    None
                }
            }
        });
        Body::from_stream(stream)
    } else {
        Body::from(route.body)
    };

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
