//! The vote-submission HTTP API.
//!
//! Thin axum layer over the admission pipeline: handlers extract the
//! client's network identity, hash it, and translate every pipeline
//! verdict and error into a stable HTTP status. Also home to the TOML
//! configuration surface and the graceful shutdown controller shared by
//! the API and fanout processes.

pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod shutdown;

pub use config::LivepollConfig;
pub use error::{ApiError, ServerError};
pub use handlers::AppState;
pub use server::ApiServer;
pub use shutdown::ShutdownController;
