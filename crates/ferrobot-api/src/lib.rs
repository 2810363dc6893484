//! `ferrobot-api` – HTTP control surface for a [`Manager`].
//!
//! The server is a thin adapter: every route reads from the manager or calls
//! a registered command handler. Attach it with [`Manager::with_api`] and it
//! is started before the robots and stopped after them.
//!
//! # Modules
//!
//! | Module | Contents |
//! |---|---|
//! | [`config`] | [`ApiConfig`] and its `FERROBOT_API_*` overrides |
//! | [`routes`] | Route table, command dispatch, SSE event streams |
//! | [`auth`] | HTTP Basic authentication |
//! | [`cors`] | Origin glob patterns and the CORS layer |
//! | [`server`] | [`ApiServer`] and its state machine |
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ferrobot_api::{ApiConfig, ApiServer};
//! use ferrobot_kernel::Manager;
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = ApiServer::new(ApiConfig::new().with_port("8080"));
//!     let manager = Manager::new().with_api(Arc::new(api));
//!     manager.run_until_signal().await.expect("manager failed");
//! }
//! ```
//!
//! [`Manager`]: ferrobot_kernel::Manager
//! [`Manager::with_api`]: ferrobot_kernel::Manager::with_api

pub mod auth;
pub mod config;
pub mod cors;
pub mod routes;
pub mod server;
#[cfg(feature = "tls")]
mod tls;

pub use config::ApiConfig;
pub use cors::CorsConfig;
pub use routes::{ApiError, router};
pub use server::{ApiServer, ServerState, ServerStatus};
