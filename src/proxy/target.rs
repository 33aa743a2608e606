//! Proxy target parsing and upstream allow-listing.

use url::Url;

use crate::error::RelayError;

/// Parses the `{host/path}` remainder of a proxy path into an upstream URL.
///
/// `query` is the caller's raw query string, appended unchanged.
///
/// # Errors
///
/// [`RelayError::BadRequest`] when the remainder is empty, does not parse,
/// or has no host.
///
/// # Examples
///
/// ```
/// use handoff_relay::proxy::parse_target;
///
/// let url = parse_target("https", "api.example.com/v1/items", Some("page=2")).unwrap();
/// assert_eq!(url.as_str(), "https://api.example.com/v1/items?page=2");
/// ```
pub fn parse_target(scheme: &str, remainder: &str, query: Option<&str>) -> Result<Url, RelayError> {
    let remainder = remainder.trim_start_matches('/');
    if remainder.is_empty() {
        return Err(RelayError::BadRequest("missing upstream target".to_string()));
    }

    let mut raw = format!("{scheme}://{remainder}");
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        raw.push('?');
        raw.push_str(q);
    }

    let url = Url::parse(&raw)
        .map_err(|e| RelayError::BadRequest(format!("invalid upstream target {remainder}: {e}")))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(RelayError::BadRequest(format!(
            "upstream target {remainder} has no host"
        )));
    }
    Ok(url)
}

/// The `host[:port]` part of `url`, used as the outgoing `Host` header.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Upstream domains the proxy may forward to.
///
/// A host is permitted when it equals a listed domain or is a subdomain of
/// one (ends with `.` followed by the domain). Matching is ASCII
/// case-insensitive. Substring containment does not count:
/// `example.com.attacker.net` does not match `example.com`.
///
/// # Examples
///
/// ```
/// use handoff_relay::proxy::AllowList;
///
/// let allow = AllowList::new(["example.com"]);
/// assert!(allow.permits("example.com"));
/// assert!(allow.permits("api.EXAMPLE.com"));
/// assert!(!allow.permits("notexample.com"));
/// assert!(!allow.permits("example.com.attacker.net"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    domains: Vec<String>,
}

impl AllowList {
    /// Builds an allow-list, normalizing each domain to lowercase without
    /// leading or trailing dots. Empty entries are ignored.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// Whether `host` is an allowed domain or one of its subdomains.
    pub fn permits(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Checks the host of `url`.
    ///
    /// # Errors
    ///
    /// [`RelayError::Forbidden`] when the host is not permitted.
    pub fn check(&self, url: &Url) -> Result<(), RelayError> {
        let host = url.host_str().unwrap_or_default();
        if self.permits(host) {
            Ok(())
        } else {
            Err(RelayError::Forbidden {
                host: host.to_string(),
            })
        }
    }
}
