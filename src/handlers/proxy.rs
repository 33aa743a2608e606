//! Proxy route handlers.
//!
//! Proxy routes sit outside the API CORS layer: pre-flights are answered
//! here and every response, errors included, carries the permissive CORS
//! headers written by [`apply_cors`].

use axum::{
    extract::{Path, Request, State},
    http::Method,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::RelayError;
use crate::proxy::{apply_cors, preflight_response};
use crate::server::AppState;

/// Forward `/proxy/{code}/{*target}` to the upstream
pub async fn forward(
    State(state): State<Arc<AppState>>,
    Path((code, target)): Path<(String, String)>,
    request: Request,
) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }

    // Prefer the undecoded remainder so the upstream path keeps its escapes.
    let target = raw_target(request.uri().path()).map_or(target, str::to_owned);
    match state.proxy.forward(&code, &target, request).await {
        Ok(response) => response,
        Err(e) => with_cors(e),
    }
}

/// `/proxy/{code}` with no upstream target
pub async fn missing_target(request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight_response();
    }
    with_cors(RelayError::BadRequest("missing upstream target".to_string()))
}

fn with_cors(error: RelayError) -> Response {
    let mut response = error.into_response();
    apply_cors(response.headers_mut());
    response
}

/// The part of `/proxy/{code}/...` after the code segment, as received.
fn raw_target(path: &str) -> Option<&str> {
    let (_code, rest) = path.strip_prefix("/proxy/")?.split_once('/')?;
    Some(rest)
}
