//! # TaskHands API
//!
//! HTTP control surface over a [`taskhands_scheduler::SchedulerCore`]:
//! list tasks, start/stop/restart them, run them once, and edit their
//! descriptors.

pub mod error;
pub mod http;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use http::routes::create_router;
pub use server::{ApiConfig, ApiServer};
pub use state::AppState;
