//! Abstract storage traits for the LivePoll core.
//!
//! Poll CRUD, vote persistence, and tally bookkeeping belong to an external
//! relational store; this crate defines the interface boundary the admission
//! pipeline talks to, plus an in-memory backend for tests and
//! single-instance deployments. The rest of the workspace depends only on
//! the traits.

pub mod error;
pub mod memory;
pub mod poll;
pub mod vote;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use poll::PollStore;
pub use vote::VoteStore;
