//! Shared utilities for the LivePoll core.

pub mod hash;
pub mod logging;
pub mod time;

pub use hash::{hash_address, hash_fingerprint, hash_value};
pub use logging::{init_tracing, init_tracing_with};
pub use time::format_duration_ms;
