//! Tower layers for request identifiers and HTTP spans.
//!
//! # Design
//! - Provides dedicated layers for generating and propagating `x-request-id`.
//! - Every request runs inside an `http.request` span that records status and latency.

use std::time::Duration;

use axum::http::{HeaderValue, Request, Response};
use rand::Rng;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;

use crate::init::build_sha;

/// Header carrying the request identifier.
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Generates random 128-bit hexadecimal request identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRandomRequestId;

impl MakeRequestId for MakeRandomRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let value: u128 = rand::rng().random();
        HeaderValue::from_str(&format!("{value:032x}"))
            .ok()
            .map(RequestId::new)
    }
}

/// Factory for the `x-request-id` generator layer.
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRandomRequestId> {
    SetRequestIdLayer::x_request_id(MakeRandomRequestId)
}

/// Layer that propagates an incoming `x-request-id` header.
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Builds the `http.request` span for each request.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpRequestSpan;

impl<B> MakeSpan<B> for HttpRequestSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = request
            .headers()
            .get(HEADER_REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            route = %request.uri().path(),
            request_id = %request_id,
            build_sha = %build_sha(),
            status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty
        )
    }
}

/// Records status code and latency on the request span.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordResponse;

impl<B> OnResponse<B> for RecordResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        span.record("status_code", response.status().as_u16());
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        span.record("latency_ms", latency_ms);
        tracing::debug!(parent: span, status = response.status().as_u16(), latency_ms, "request finished");
    }
}

/// Trace layer wired with [`HttpRequestSpan`] and [`RecordResponse`].
pub type HttpTraceLayer =
    TraceLayer<SharedClassifier<ServerErrorsAsFailures>, HttpRequestSpan, DefaultOnRequest, RecordResponse>;

/// Factory for the HTTP trace layer.
#[must_use]
pub fn http_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(HttpRequestSpan)
        .on_response(RecordResponse)
}
