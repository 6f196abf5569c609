//! Single-use request tokens guarding against replayed submissions.
//!
//! Every voting page load carries a fresh 32-byte random token. The first
//! submission that presents a token consumes it; any later submission with
//! the same token is a replay. Tokens the tracker has never seen are
//! accepted on first use and registered as consumed in one atomic
//! insert-if-absent, so two concurrent submissions racing on the same token
//! can never both pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use livepoll_types::Timestamp;
use rand::Rng;

use crate::error::AdmissionError;
use crate::redis_backend::RedisBackend;

/// Tokens are valid for 5 minutes.
pub const NONCE_TTL_MS: u64 = 5 * 60 * 1_000;

/// Hex length of a 32-byte token.
pub const NONCE_HEX_LEN: usize = 64;

/// A well-formed nonce token: 64 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NonceToken(String);

impl NonceToken {
    /// Generate a fresh cryptographically random token.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::rng().random();
        Self(hex::encode(bytes))
    }

    /// Parse a client-supplied token, rejecting anything that is not
    /// exactly 64 hex characters. No registry lookup happens for
    /// malformed input.
    pub fn parse(raw: &str) -> Result<Self, NonceRejection> {
        if raw.len() != NONCE_HEX_LEN || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(NonceRejection::Malformed);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NonceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a token was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceRejection {
    /// Token has already been consumed.
    Replay,
    /// Token was seen but its validity window has passed. Distinct from
    /// "never seen": a stale retry must not silently succeed as first use.
    Expired,
    /// Wrong length or encoding.
    Malformed,
}

impl fmt::Display for NonceRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NonceRejection::Replay => "replay",
            NonceRejection::Expired => "expired",
            NonceRejection::Malformed => "malformed",
        };
        f.write_str(s)
    }
}

/// Result of validating a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NonceVerdict {
    Valid,
    Rejected(NonceRejection),
}

#[derive(Clone, Copy, Debug)]
struct NonceEntry {
    used: bool,
    expires_at: Timestamp,
}

/// In-process token registry.
#[derive(Default)]
struct MemoryNonces {
    entries: Mutex<HashMap<String, NonceEntry>>,
}

impl MemoryNonces {
    fn register(&self, token: &NonceToken, now: Timestamp) {
        let mut entries = self.entries.lock().expect("nonce lock poisoned");
        entries.insert(
            token.as_str().to_string(),
            NonceEntry {
                used: false,
                expires_at: now.plus(NONCE_TTL_MS),
            },
        );
    }

    fn validate(&self, token: &NonceToken, now: Timestamp) -> NonceVerdict {
        let mut entries = self.entries.lock().expect("nonce lock poisoned");

        // The entry API makes first-use an atomic insert-if-absent; there
        // is no window where two submissions both observe "not present".
        match entries.entry(token.as_str().to_string()) {
            std::collections::hash_map::Entry::Vacant(vacant) => {
                vacant.insert(NonceEntry {
                    used: true,
                    expires_at: now.plus(NONCE_TTL_MS),
                });
                NonceVerdict::Valid
            }
            std::collections::hash_map::Entry::Occupied(mut occupied) => {
                let entry = *occupied.get();
                // Used wins over expired: a consumed token is a replay no
                // matter how late it comes back. The Redis script keeps the
                // same order.
                if entry.used {
                    return NonceVerdict::Rejected(NonceRejection::Replay);
                }
                if entry.expires_at <= now {
                    occupied.remove();
                    return NonceVerdict::Rejected(NonceRejection::Expired);
                }
                occupied.get_mut().used = true;
                NonceVerdict::Valid
            }
        }
    }

    fn sweep(&self, now: Timestamp) -> usize {
        let mut entries = self.entries.lock().expect("nonce lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().expect("nonce lock poisoned").len()
    }
}

enum NonceStore {
    Memory(MemoryNonces),
    Redis(RedisBackend),
}

/// Tracks single-use request tokens to prevent replayed vote submissions.
///
/// Owns its registry explicitly; construct one at process start and hand it
/// to the pipeline. The in-process registry is swapped for the shared Redis
/// backend in multi-instance deployments, with identical verdict semantics.
pub struct NonceTracker {
    store: NonceStore,
}

impl NonceTracker {
    pub fn in_memory() -> Self {
        Self {
            store: NonceStore::Memory(MemoryNonces::default()),
        }
    }

    pub fn with_redis(backend: RedisBackend) -> Self {
        Self {
            store: NonceStore::Redis(backend),
        }
    }

    /// Issue a fresh token, registered as unused with a 5 minute expiry.
    pub async fn issue(&self, now: Timestamp) -> Result<NonceToken, AdmissionError> {
        let token = NonceToken::generate();
        match &self.store {
            NonceStore::Memory(memory) => memory.register(&token, now),
            NonceStore::Redis(redis) => redis.register_nonce(&token, now).await?,
        }
        Ok(token)
    }

    /// Validate a client-supplied token.
    ///
    /// Every outcome is definitive and returned synchronously; nothing here
    /// is retried. Backend failures on the shared store surface as
    /// [`AdmissionError::StoreUnavailable`] (fail-closed).
    pub async fn validate(
        &self,
        raw: &str,
        now: Timestamp,
    ) -> Result<NonceVerdict, AdmissionError> {
        let token = match NonceToken::parse(raw) {
            Ok(token) => token,
            Err(rejection) => return Ok(NonceVerdict::Rejected(rejection)),
        };

        match &self.store {
            NonceStore::Memory(memory) => Ok(memory.validate(&token, now)),
            NonceStore::Redis(redis) => redis.validate_nonce(&token, now).await,
        }
    }

    /// Drop expired entries from the in-process registry. The Redis backend
    /// expires keys by TTL and needs no sweeping. Returns the number of
    /// entries removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        match &self.store {
            NonceStore::Memory(memory) => memory.sweep(now),
            NonceStore::Redis(_) => 0,
        }
    }

    /// Number of tracked tokens (in-process registry only).
    pub fn tracked(&self) -> usize {
        match &self.store {
            NonceStore::Memory(memory) => memory.len(),
            NonceStore::Redis(_) => 0,
        }
    }
}
