//! Shared-store backend for rate limiting and nonce tracking.
//!
//! Single-instance deployments keep counters in process memory; fleets
//! point every instance at the same Redis so the sliding windows and
//! replay registry are globally consistent. Policy semantics are identical
//! to the in-process backends.
//!
//! Failure policy is fail-closed: a Redis error rejects the submission
//! (surfaced as [`AdmissionError::StoreUnavailable`]) instead of silently
//! falling back to per-instance counters, which would mix two inconsistent
//! counter sets across the fleet.

use livepoll_types::{AddressHash, Timestamp};
use rand::Rng;
use redis::AsyncCommands;
use tracing::info;

use crate::error::AdmissionError;
use crate::nonce::{NonceRejection, NonceToken, NonceVerdict, NONCE_TTL_MS};
use crate::ratelimit::{
    RateVerdict, COOLDOWN_MS, PENALTY_MS, RATE_WINDOW_MS, TRUST_DELTA_ABUSIVE, TRUST_DELTA_CLEAN,
    TRUST_DELTA_NEUTRAL, WHITELIST_MS,
};

/// Validates a nonce in one atomic round trip. Key values are
/// `"0:<expires_at_ms>"` (issued, unused) or `"1:<expires_at_ms>"` (used);
/// keys outlive the validity window by one extra TTL so a stale retry is
/// reported as `expired` rather than accepted as first use.
///
/// Verdict order matches the in-process registry exactly: a consumed token
/// is `replay` even past its validity window, and expiry is inclusive of
/// the boundary millisecond.
const NONCE_SCRIPT: &str = r#"
local v = redis.call('GET', KEYS[1])
if not v then
  redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
  return 'valid'
end
if string.sub(v, 1, 2) == '1:' then
  return 'replay'
end
local expires = tonumber(string.sub(v, 3))
if expires <= tonumber(ARGV[3]) then
  redis.call('DEL', KEYS[1])
  return 'expired'
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 'valid'
"#;

/// Connection handle to the shared counter store.
#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
}

impl RedisBackend {
    /// Open a client for `url`. Connections are established lazily per
    /// request; a bad URL fails here, an unreachable server fails at
    /// check time.
    pub fn connect(url: &str) -> Result<Self, AdmissionError> {
        let client = redis::Client::open(url)
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;
        info!("shared counter store configured");
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, AdmissionError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))
    }

    /// Sliding-window check, mirroring the in-process policy: cooldown
    /// short-circuit, then record + prune + classify.
    pub async fn check_rate(
        &self,
        address: &AddressHash,
        now: Timestamp,
    ) -> Result<RateVerdict, AdmissionError> {
        let mut conn = self.conn().await?;
        let now_ms = now.as_millis();

        let cooldown_key = format!("livepoll:cooldown:{address}");
        let cooldown_ttl: i64 = conn
            .pttl(&cooldown_key)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;
        if cooldown_ttl > 0 {
            return Ok(RateVerdict {
                trust_delta: TRUST_DELTA_ABUSIVE,
                cooldown_ms: cooldown_ttl as u64,
            });
        }

        // Record this request and prune the trailing window. The member
        // carries a random suffix so same-millisecond requests still count
        // individually.
        let rate_key = format!("livepoll:rate:{address}");
        let member = format!("{now_ms}-{:08x}", rand::rng().random::<u32>());
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&rate_key)
            .arg(now_ms)
            .arg(&member)
            .ignore()
            // Exclusive upper bound: a request exactly one window old is
            // still counted, same as the in-process pruning.
            .cmd("ZREMRANGEBYSCORE")
            .arg(&rate_key)
            .arg(0)
            .arg(format!("({}", now_ms.saturating_sub(RATE_WINDOW_MS)))
            .ignore()
            .cmd("PEXPIRE")
            .arg(&rate_key)
            .arg(PENALTY_MS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;

        let count: u64 = conn
            .zcard(&rate_key)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;

        if count <= 2 {
            let whitelist_key = format!("livepoll:whitelist:{address}");
            let _: () = redis::cmd("SET")
                .arg(&whitelist_key)
                .arg("1")
                .arg("PX")
                .arg(WHITELIST_MS)
                .query_async(&mut conn)
                .await
                .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;
            return Ok(RateVerdict {
                trust_delta: TRUST_DELTA_CLEAN,
                cooldown_ms: 0,
            });
        }

        if count <= 5 {
            return Ok(RateVerdict {
                trust_delta: TRUST_DELTA_NEUTRAL,
                cooldown_ms: 0,
            });
        }

        let penalty_key = format!("livepoll:penalty:{address}");
        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&cooldown_key)
            .arg("1")
            .arg("PX")
            .arg(COOLDOWN_MS)
            .ignore()
            .cmd("SET")
            .arg(&penalty_key)
            .arg("1")
            .arg("PX")
            .arg(PENALTY_MS)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;

        Ok(RateVerdict {
            trust_delta: TRUST_DELTA_ABUSIVE,
            cooldown_ms: COOLDOWN_MS,
        })
    }

    /// Register a freshly issued token as unused.
    pub async fn register_nonce(
        &self,
        token: &NonceToken,
        now: Timestamp,
    ) -> Result<(), AdmissionError> {
        let mut conn = self.conn().await?;
        let key = format!("livepoll:nonce:{token}");
        let value = format!("0:{}", now.plus(NONCE_TTL_MS).as_millis());
        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("PX")
            .arg(NONCE_TTL_MS * 2)
            .query_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Atomically consume a token, with the same verdicts as the
    /// in-process registry.
    pub async fn validate_nonce(
        &self,
        token: &NonceToken,
        now: Timestamp,
    ) -> Result<NonceVerdict, AdmissionError> {
        let mut conn = self.conn().await?;
        let key = format!("livepoll:nonce:{token}");
        let used_value = format!("1:{}", now.plus(NONCE_TTL_MS).as_millis());

        let verdict: String = redis::Script::new(NONCE_SCRIPT)
            .key(&key)
            .arg(&used_value)
            .arg(NONCE_TTL_MS * 2)
            .arg(now.as_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AdmissionError::StoreUnavailable(e.to_string()))?;

        Ok(match verdict.as_str() {
            "valid" => NonceVerdict::Valid,
            "expired" => NonceVerdict::Rejected(NonceRejection::Expired),
            _ => NonceVerdict::Rejected(NonceRejection::Replay),
        })
    }
}
