//! Poll lookup at the storage boundary.

use livepoll_types::{Poll, PollId};

use crate::error::StoreError;

/// Read access to stored polls.
///
/// The admission pipeline only needs existence, expiry, and the option set;
/// poll creation and editing are owned by the external application.
pub trait PollStore: Send + Sync {
    /// Fetch a poll by id, `Ok(None)` when it does not exist.
    fn get_poll(&self, id: &PollId) -> Result<Option<Poll>, StoreError>;

    /// Insert or replace a poll. Used for seeding and by tests.
    fn put_poll(&self, poll: Poll) -> Result<(), StoreError>;
}
