//! Real-time fanout server for live poll updates.
//!
//! Maintains per-poll viewer groups over broadcast channels. Clients join
//! and leave polls over a WebSocket; the server pushes viewer counts on
//! every membership change and tally updates whenever the admission
//! pipeline reports an accepted vote through `/emit`.

pub mod groups;
pub mod protocol;
pub mod server;

pub use groups::ViewerGroups;
pub use protocol::{ClientMessage, ServerEvent};
pub use server::FanoutServer;
