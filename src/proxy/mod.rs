//! Header-rewriting reverse proxy.
//!
//! Forwards `/proxy/{code}/{host/path}` requests to an allow-listed
//! upstream. The code's identity hint is read from the [`HandoffStore`]
//! and injected into the forwarded-address headers; a fixed set of other
//! request headers is overwritten and transport-level response headers are
//! dropped. See [`headers`] for the exact rules.
//!
//! # Failure model
//!
//! Every failure before the upstream answers maps to a [`RelayError`] and
//! a single error response. Once the upstream status and headers have been
//! handed to the server, later failures (a body error or the overall
//! timeout firing mid-stream) are logged and end the body stream; no second
//! status is ever written. Dropping the response, e.g. because the caller
//! disconnected, drops the upstream request with it.

pub mod headers;
pub mod target;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;

use crate::error::RelayError;
use crate::store::HandoffStore;

pub use headers::{
    apply_cors, normalize_response_headers, rewrite_request_headers, RewriteProfile,
};
pub use target::{authority, parse_target, AllowList};

/// Configuration for [`RewritingProxy`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub allow_list: AllowList,
    pub profile: RewriteProfile,
    /// Upper bound for one upstream exchange, body included.
    pub timeout: Duration,
    /// Largest request body buffered for forwarding.
    pub max_body_bytes: usize,
    /// Scheme used to reach the upstream. `https` outside of tests.
    pub upstream_scheme: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            allow_list: AllowList::default(),
            profile: RewriteProfile::default(),
            timeout: Duration::from_secs(30),
            max_body_bytes: 1_048_576, // 1 MB
            upstream_scheme: "https".to_string(),
        }
    }
}

/// Reverse proxy that parameterizes header rewriting from the handoff store.
pub struct RewritingProxy {
    store: Arc<HandoffStore>,
    config: ProxyConfig,
    client: reqwest::Client,
}

impl RewritingProxy {
    /// Creates a proxy reading identity hints from `store`.
    ///
    /// Redirects are returned to the caller rather than followed.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be constructed (TLS backend setup).
    pub fn new(store: Arc<HandoffStore>, config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            store,
            config,
            client,
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Forwards `request` to the upstream encoded in `target`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::BadRequest`]: `target` is empty or not a URL
    /// - [`RelayError::Forbidden`]: host not on the allow-list (no upstream call)
    /// - [`RelayError::PayloadTooLarge`]: body exceeds `max_body_bytes`
    /// - [`RelayError::BadGateway`]: upstream unreachable
    /// - [`RelayError::GatewayTimeout`]: no upstream response within `timeout`
    pub async fn forward(
        &self,
        code: &str,
        target: &str,
        request: Request,
    ) -> Result<Response, RelayError> {
        let (parts, body) = request.into_parts();

        let url = parse_target(&self.config.upstream_scheme, target, parts.uri.query())?;
        self.config.allow_list.check(&url)?;

        // Copied out so no store lock is held across the upstream call.
        let hint = self.store.identity_hint(code);
        let outgoing = rewrite_request_headers(
            &parts.headers,
            hint.as_deref(),
            &self.config.profile,
            &authority(&url),
        );

        let body = self.read_body(body).await?;

        tracing::debug!(
            code,
            method = %parts.method,
            host = url.host_str().unwrap_or_default(),
            identity = hint.is_some(),
            "forwarding upstream"
        );

        let upstream = self
            .client
            .request(parts.method.clone(), url.clone())
            .headers(outgoing)
            .body(body)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;

        let status = upstream.status();
        tracing::info!(
            code,
            method = %parts.method,
            host = url.host_str().unwrap_or_default(),
            status = status.as_u16(),
            "proxied"
        );

        let headers = normalize_response_headers(upstream.headers());
        let stream_code = code.to_owned();
        let stream = upstream.bytes_stream().inspect_err(move |e| {
            tracing::warn!(
                code = %stream_code,
                error = %e,
                "upstream body failed after headers were sent"
            );
        });

        let mut response = Response::new(Body::from_stream(stream));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    async fn read_body(&self, body: Body) -> Result<bytes::Bytes, RelayError> {
        let limit = self.config.max_body_bytes;
        axum::body::to_bytes(body, limit).await.map_err(|e| {
            if is_length_limit(&e) {
                RelayError::PayloadTooLarge { limit }
            } else {
                RelayError::BadRequest(format!("failed to read request body: {e}"))
            }
        })
    }

    fn classify(&self, error: &reqwest::Error) -> RelayError {
        if error.is_timeout() {
            RelayError::GatewayTimeout {
                after: self.config.timeout,
            }
        } else {
            RelayError::BadGateway(error_chain(error))
        }
    }
}

/// Local answer to an `OPTIONS` pre-flight on a proxy path.
pub fn preflight_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    apply_cors(headers);
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

fn is_length_limit(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if err.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        source = err.source();
    }
    false
}

/// `error: cause: cause` rendering; reqwest's top-level message omits the cause.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
