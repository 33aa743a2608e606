//! HTTP handlers for the relay routes.

pub mod api;
pub mod proxy;
pub mod status;
