//! Router construction: RPC and WebSocket routes behind the security gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_REQUEST_HEADERS, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::{get, post};
use tinytorrent_telemetry::{http_trace_layer, propagate_request_id_layer, set_request_id_layer};
use tower::ServiceBuilder;
use tracing::debug;
use url::form_urlencoded;

use crate::broadcast::ClientId;
use crate::event_loop::LoopHandle;
use crate::security::{Rejection, Route, SecurityPolicy};
use crate::ws;

/// Largest accepted RPC body.
pub(crate) const MAX_BODY_BYTES: usize = 1 << 20;

/// State shared by every HTTP handler.
pub(crate) struct ServerState {
    pub(crate) policy: SecurityPolicy,
    pub(crate) rpc_path: String,
    pub(crate) ws_path: String,
    pub(crate) event_loop: LoopHandle,
    next_client: AtomicU64,
}

impl ServerState {
    pub(crate) fn new(
        policy: SecurityPolicy,
        rpc_path: String,
        ws_path: String,
        event_loop: LoopHandle,
    ) -> Self {
        Self {
            policy,
            rpc_path,
            ws_path,
            event_loop,
            next_client: AtomicU64::new(1),
        }
    }

    fn route(&self, path: &str) -> Route {
        if path == self.rpc_path {
            Route::Rpc
        } else if path == self.ws_path {
            Route::WebSocket
        } else {
            Route::Other
        }
    }

    pub(crate) fn next_client_id(&self) -> ClientId {
        self.next_client.fetch_add(1, Ordering::Relaxed)
    }
}

pub(crate) fn build_router(state: Arc<ServerState>) -> Router {
    let gate = middleware::from_fn_with_state(Arc::clone(&state), security_gate);
    let layered = ServiceBuilder::new()
        .layer(set_request_id_layer())
        .layer(propagate_request_id_layer())
        .layer(http_trace_layer());
    Router::new()
        .route(&state.rpc_path, post(handle_rpc))
        .route(&state.ws_path, get(ws::upgrade))
        .fallback(not_found)
        .layer(gate)
        .layer(layered)
        .with_state(state)
}

fn query_token(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
}

async fn security_gate(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let policy = &state.policy;
    let route = state.route(request.uri().path());
    policy.check_host(request.headers(), route)?;

    match route {
        Route::Other => Ok(next.run(request).await),
        Route::WebSocket => {
            policy.check_origin(request.headers())?;
            let token = query_token(request.uri());
            if !policy.authorized(request.headers(), token.as_deref()) {
                debug!("websocket upgrade rejected; invalid token");
                return Err(SecurityPolicy::invalid_token());
            }
            Ok(next.run(request).await)
        }
        Route::Rpc => {
            let origin = policy.check_origin(request.headers())?;
            if request.method() == Method::OPTIONS {
                let requested = request
                    .headers()
                    .get(ACCESS_CONTROL_REQUEST_HEADERS)
                    .and_then(|value| value.to_str().ok());
                return Ok(policy.preflight(origin.as_ref(), requested));
            }
            let cors = policy.cors_headers(origin.as_ref(), None);
            if !policy.authorized(request.headers(), None) {
                debug!("rpc request rejected; bad credentials");
                return Err(policy.unauthorized(cors));
            }
            policy.check_session(request.headers(), cors.clone())?;
            let mut response = next.run(request).await;
            response.headers_mut().extend(cors);
            Ok(response)
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

async fn handle_rpc(State(state): State<Arc<ServerState>>, request: Request) -> Response {
    if declared_length(request.headers()).is_some_and(|length| length > MAX_BODY_BYTES) {
        return Rejection::payload_too_large().into_response();
    }
    let payload = match to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "rpc body rejected");
            return Rejection::payload_too_large().into_response();
        }
    };
    match state.event_loop.call(payload).await {
        Some(body) => (
            [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response(),
        None => Rejection::unavailable().into_response(),
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}
