//! One-way hashing of requester identities.
//!
//! Raw IP addresses and device fingerprints are hashed before anything in
//! the core sees them; the digests are what rate limiting and duplicate
//! detection key on.

use livepoll_types::{AddressHash, DeviceHash};
use sha2::{Digest, Sha256};

/// SHA-256 of `value`, rendered as 64 lowercase hex characters.
pub fn hash_value(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    hex::encode(digest)
}

/// Hash a requester's network address.
pub fn hash_address(address: &str) -> AddressHash {
    AddressHash::new(hash_value(address))
}

/// Hash a client device fingerprint.
pub fn hash_fingerprint(fingerprint: &str) -> DeviceHash {
    DeviceHash::new(hash_value(fingerprint))
}
