//! Nullable infrastructure for deterministic testing.
//!
//! External effects (wall-clock time, fanout transport) are abstracted so
//! tests can control them programmatically: time only advances when told
//! to, and published tallies are captured instead of sent anywhere.
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod publisher;

pub use clock::NullClock;
pub use publisher::RecordingPublisher;
