//! One-way hashes of requester identities.
//!
//! Raw network addresses and device fingerprints never enter the core; they
//! are hashed (SHA-256, lowercase hex) at the API boundary and only the
//! digests flow through rate limiting, trust scoring, and storage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA-256 hex digest of a requester's network address.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressHash(String);

impl AddressHash {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 hex digest of a client device fingerprint.
///
/// At most one vote per `(poll, device hash)` pair is ever recorded; the
/// storage layer enforces this as a unique constraint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceHash(String);

impl DeviceHash {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
