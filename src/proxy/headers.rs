//! Pure header rewriting rules for the proxy hop.
//!
//! Both directions are plain functions over [`HeaderMap`] so they can be
//! tested without any client or server plumbing.

use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};

/// Caller headers copied to the upstream request.
pub const FORWARDED_REQUEST_HEADERS: [HeaderName; 3] = [
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::CONTENT_TYPE,
];

/// Transport-level upstream response headers never echoed to the caller.
pub const EXCLUDED_RESPONSE_HEADERS: [&str; 4] = [
    "transfer-encoding",
    "content-encoding",
    "connection",
    "keep-alive",
];

/// Both forwarded-client-address headers carry the identity hint.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";

/// Fixed values written on every upstream request.
#[derive(Debug, Clone)]
pub struct RewriteProfile {
    pub user_agent: HeaderValue,
    /// `None` omits the header.
    pub origin: Option<HeaderValue>,
    /// `None` omits the header.
    pub referer: Option<HeaderValue>,
}

impl Default for RewriteProfile {
    fn default() -> Self {
        Self {
            user_agent: HeaderValue::from_static(concat!(
                "handoff-relay/",
                env!("CARGO_PKG_VERSION")
            )),
            origin: None,
            referer: None,
        }
    }
}

/// Builds the outgoing request headers for one proxied call.
///
/// The result starts empty: only [`FORWARDED_REQUEST_HEADERS`] are copied
/// from `original`. `Host`, `User-Agent`, `Origin` and `Referer` come from
/// `authority` and `profile`. When `identity_hint` is a valid header value,
/// `X-Forwarded-For` and `X-Real-IP` are set to it; caller-supplied values
/// for those headers are never forwarded.
///
/// # Examples
///
/// ```
/// use axum::http::HeaderMap;
/// use handoff_relay::proxy::{rewrite_request_headers, RewriteProfile};
///
/// let mut original = HeaderMap::new();
/// original.insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
/// original.insert("cookie", "secret=1".parse().unwrap());
///
/// let out = rewrite_request_headers(
///     &original,
///     Some("203.0.113.5"),
///     &RewriteProfile::default(),
///     "api.example.com",
/// );
/// assert_eq!(out["x-forwarded-for"], "203.0.113.5");
/// assert_eq!(out["x-real-ip"], "203.0.113.5");
/// assert_eq!(out["host"], "api.example.com");
/// assert!(out.get("cookie").is_none());
/// ```
pub fn rewrite_request_headers(
    original: &HeaderMap,
    identity_hint: Option<&str>,
    profile: &RewriteProfile,
    authority: &str,
) -> HeaderMap {
    let mut out = HeaderMap::new();

    for name in &FORWARDED_REQUEST_HEADERS {
        for value in original.get_all(name) {
            out.append(name.clone(), value.clone());
        }
    }

    if let Ok(host) = HeaderValue::from_str(authority) {
        out.insert(header::HOST, host);
    }
    out.insert(header::USER_AGENT, profile.user_agent.clone());
    if let Some(origin) = &profile.origin {
        out.insert(header::ORIGIN, origin.clone());
    }
    if let Some(referer) = &profile.referer {
        out.insert(header::REFERER, referer.clone());
    }

    match identity_hint.map(HeaderValue::from_str) {
        Some(Ok(value)) => {
            out.insert(X_FORWARDED_FOR, value.clone());
            out.insert(X_REAL_IP, value);
        },
        Some(Err(_)) => {
            tracing::warn!("identity hint is not a valid header value; not forwarded");
        },
        None => {},
    }

    out
}

/// Builds the caller-facing response headers from the upstream's.
///
/// Drops [`EXCLUDED_RESPONSE_HEADERS`] and forces permissive CORS headers.
/// Repeated headers such as `set-cookie` are preserved.
pub fn normalize_response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len() + 3);
    for (name, value) in upstream {
        if EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    apply_cors(&mut out);
    out
}

/// Overwrites the allow-origin, allow-methods and allow-headers CORS headers.
pub fn apply_cors(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("*"),
    );
}
