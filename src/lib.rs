//! Handoff Relay
//!
//! A rendezvous service that lets two parties hand work to each other
//! through a short shared code, plus a reverse proxy that forwards
//! requests on behalf of a code's owner.
//!
//! # Usage
//!
//! ```bash
//! RELAY_ALLOWED_DOMAINS=api.example.com handoff-relay --port 3000
//! ```
//!
//! # Features
//!
//! - Task and result slots per code, each replaced by the next publish
//! - Inactivity expiry with a background reaper
//! - `/proxy/{code}/{host/path}` forwarding with header rewriting, the
//!   code's recorded client address injected as `X-Forwarded-For`
//! - Upstream allow-list, request body limit and timeout
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use handoff_relay::store::{HandoffStore, ResultPayload, TaskPayload};
//!
//! let store = HandoffStore::new(Duration::from_secs(1800));
//! store.publish_task("AB12", TaskPayload::new("u1", "t1")).unwrap();
//! assert_eq!(store.fetch_task("AB12").unwrap().subject_id, "u1");
//!
//! store.publish_result("AB12", ResultPayload::new("s1")).unwrap();
//! assert!(store.fetch_task("AB12").is_none());
//! assert_eq!(store.fetch_result("AB12").unwrap().status, "completed");
//! ```

pub mod clock;
pub mod config;
pub mod error;
mod handlers;
pub mod proxy;
pub mod server;
pub mod store;

pub use config::RelayConfig;
pub use error::RelayError;
pub use server::{router, AppState, RelayServer};
pub use store::HandoffStore;
