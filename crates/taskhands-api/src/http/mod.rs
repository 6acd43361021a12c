//! HTTP handlers and routing.

pub mod handlers;
pub mod monitoring;
pub mod routes;
