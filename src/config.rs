//! Relay configuration.
//!
//! Every option can be given on the command line or through the
//! environment; command-line flags take precedence.
//!
//! | Variable                      | Default   | Meaning                               |
//! |-------------------------------|-----------|---------------------------------------|
//! | `PORT`                        | 3000      | Listening port                        |
//! | `RELAY_BIND`                  | 0.0.0.0   | Listening address                     |
//! | `RELAY_TTL_SECS`              | 1800      | Entry time-to-live                    |
//! | `RELAY_REAP_INTERVAL_SECS`    | 300       | Reaper period                         |
//! | `RELAY_ALLOWED_DOMAINS`       | (none)    | Comma-separated proxy allow-list      |
//! | `RELAY_USER_AGENT`            | crate UA  | User-Agent sent upstream              |
//! | `RELAY_ORIGIN`                | (unset)   | Origin sent upstream                  |
//! | `RELAY_REFERER`               | (unset)   | Referer sent upstream                 |
//! | `RELAY_UPSTREAM_TIMEOUT_SECS` | 30        | Upstream exchange timeout             |
//! | `RELAY_MAX_BODY_BYTES`        | 1048576   | Largest proxied request body          |
//! | `RELAY_UPSTREAM_SCHEME`       | https     | Upstream scheme (http for local use)  |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderValue;
use clap::Parser;

use crate::proxy::{AllowList, ProxyConfig, RewriteProfile};

/// Command-line and environment configuration for the relay.
#[derive(Debug, Clone, Parser)]
#[command(name = "handoff-relay", version, about)]
pub struct RelayConfig {
    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Address to bind.
    #[arg(long, env = "RELAY_BIND", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Seconds of inactivity after which an entry expires.
    #[arg(long, env = "RELAY_TTL_SECS", default_value_t = 1800, value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_secs: u64,

    /// Seconds between reaper cycles.
    #[arg(long, env = "RELAY_REAP_INTERVAL_SECS", default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
    pub reap_interval_secs: u64,

    /// Upstream domains the proxy may reach (subdomains included).
    #[arg(long = "allowed-domain", env = "RELAY_ALLOWED_DOMAINS", value_delimiter = ',')]
    pub allowed_domains: Vec<String>,

    /// User-Agent written on proxied requests.
    #[arg(long, env = "RELAY_USER_AGENT", value_parser = parse_header_value)]
    pub user_agent: Option<HeaderValue>,

    /// Origin written on proxied requests.
    #[arg(long, env = "RELAY_ORIGIN", value_parser = parse_header_value)]
    pub origin: Option<HeaderValue>,

    /// Referer written on proxied requests.
    #[arg(long, env = "RELAY_REFERER", value_parser = parse_header_value)]
    pub referer: Option<HeaderValue>,

    /// Seconds allowed for one upstream exchange.
    #[arg(long, env = "RELAY_UPSTREAM_TIMEOUT_SECS", default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub upstream_timeout_secs: u64,

    /// Largest request body forwarded by the proxy.
    #[arg(long, env = "RELAY_MAX_BODY_BYTES", default_value_t = 1_048_576)]
    pub max_body_bytes: usize,

    /// Scheme used for upstream requests.
    #[arg(long, env = "RELAY_UPSTREAM_SCHEME", default_value = "https", value_parser = ["https", "http"])]
    pub upstream_scheme: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            ttl_secs: 1800,
            reap_interval_secs: 300,
            allowed_domains: Vec::new(),
            user_agent: None,
            origin: None,
            referer: None,
            upstream_timeout_secs: 30,
            max_body_bytes: 1_048_576,
            upstream_scheme: "https".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    /// Proxy settings derived from this configuration.
    pub fn proxy_config(&self) -> ProxyConfig {
        let defaults = RewriteProfile::default();
        ProxyConfig {
            allow_list: AllowList::new(&self.allowed_domains),
            profile: RewriteProfile {
                user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
                origin: self.origin.clone(),
                referer: self.referer.clone(),
            },
            timeout: Duration::from_secs(self.upstream_timeout_secs),
            max_body_bytes: self.max_body_bytes,
            upstream_scheme: self.upstream_scheme.clone(),
        }
    }
}

fn parse_header_value(raw: &str) -> Result<HeaderValue, String> {
    HeaderValue::from_str(raw).map_err(|e| format!("not a valid header value: {e}"))
}
