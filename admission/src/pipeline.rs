//! The admission pipeline — one verdict per vote submission.
//!
//! Ordering is deliberate: cheap stateless checks (payload shape, nonce,
//! staleness) run before any store access; the duplicate check — a
//! correctness invariant — runs before rate limiting and trust scoring,
//! which are heuristics and must never cause a correctness check to be
//! skipped. The authoritative duplicate guard is the store's atomic unique
//! insert, so two racing submissions for one device yield exactly one
//! `Accepted` and one `Duplicate`.

use std::sync::Arc;
use std::time::Duration;

use livepoll_publisher::TallyPublisher;
use livepoll_store::{PollStore, StoreError, VoteStore};
use livepoll_types::{AddressHash, OptionId, PollId, Timestamp, VoteRecord};
use livepoll_utils::{format_duration_ms, hash_fingerprint};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::AdmissionError;
use crate::nonce::{NonceTracker, NonceVerdict};
use crate::outcome::{RejectReason, VoteOutcome};
use crate::ratelimit::RateLimiter;
use crate::trust::{evaluate, TrustSignals};

/// Submissions older than this (or from the future) are rejected.
pub const MAX_SUBMISSION_AGE_MS: u64 = 5 * 60 * 1_000;

/// Fingerprints shorter than this are considered malformed.
pub const MIN_FINGERPRINT_LEN: usize = 10;

/// How often the background sweep prunes expired nonce and rate entries.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A parsed vote submission, after transport-level extraction.
///
/// The raw network address never reaches the pipeline; the API layer hashes
/// it. The fingerprint arrives raw because its shape is validated here,
/// then only its hash is used.
#[derive(Clone, Debug)]
pub struct VoteRequest {
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub fingerprint: String,
    pub address_hash: AddressHash,
    pub behavior_score: Option<u8>,
    pub verified: Option<bool>,
    pub timestamp: Option<Timestamp>,
    pub nonce: Option<String>,
}

impl VoteRequest {
    fn validate(&self) -> Result<(), AdmissionError> {
        let mut problems = Vec::new();
        if self.poll_id.is_empty() {
            problems.push("poll_id is empty");
        }
        if self.option_id.is_empty() {
            problems.push("option_id is empty");
        }
        if self.fingerprint.len() < MIN_FINGERPRINT_LEN {
            problems.push("fingerprint too short");
        }
        if matches!(self.behavior_score, Some(score) if score > 10) {
            problems.push("behavior_score out of range");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(AdmissionError::InvalidPayload(problems.join(", ")))
        }
    }
}

/// Orchestrates nonce validation, staleness and poll checks, duplicate
/// detection, rate limiting, trust evaluation, vote persistence, and the
/// fanout notification.
pub struct AdmissionPipeline {
    polls: Arc<dyn PollStore>,
    votes: Arc<dyn VoteStore>,
    nonces: NonceTracker,
    limiter: RateLimiter,
    publisher: Arc<dyn TallyPublisher>,
}

impl AdmissionPipeline {
    pub fn new(
        polls: Arc<dyn PollStore>,
        votes: Arc<dyn VoteStore>,
        nonces: NonceTracker,
        limiter: RateLimiter,
        publisher: Arc<dyn TallyPublisher>,
    ) -> Self {
        Self {
            polls,
            votes,
            nonces,
            limiter,
            publisher,
        }
    }

    /// The nonce tracker, for issuing tokens to voting pages.
    pub fn nonces(&self) -> &NonceTracker {
        &self.nonces
    }

    /// Run one submission through the full admission sequence.
    pub async fn submit(
        &self,
        request: &VoteRequest,
        now: Timestamp,
    ) -> Result<VoteOutcome, AdmissionError> {
        request.validate()?;

        // Replay protection, before any store access.
        if let Some(raw) = &request.nonce {
            if let NonceVerdict::Rejected(rejection) = self.nonces.validate(raw, now).await? {
                debug!(poll_id = %request.poll_id, %rejection, "nonce rejected");
                return Ok(VoteOutcome::Rejected {
                    reason: rejection.into(),
                });
            }
        }

        // Stale or future-dated submissions are terminal.
        if let Some(sent_at) = request.timestamp {
            if sent_at > now || sent_at.elapsed_since(now) > MAX_SUBMISSION_AGE_MS {
                return Ok(VoteOutcome::Rejected {
                    reason: RejectReason::StaleTimestamp,
                });
            }
        }

        let poll = self
            .polls
            .get_poll(&request.poll_id)?
            .ok_or_else(|| AdmissionError::PollNotFound(request.poll_id.clone()))?;

        if !poll.has_option(&request.option_id) {
            return Err(AdmissionError::InvalidPayload(format!(
                "option {} does not belong to poll {}",
                request.option_id, request.poll_id
            )));
        }

        if poll.is_expired(now) {
            return Ok(VoteOutcome::PollExpired);
        }

        // Correctness check before heuristics: at most one vote per device
        // per poll. Advisory here, authoritative at insert time.
        let device_hash = hash_fingerprint(&request.fingerprint);
        if self.votes.has_vote(&request.poll_id, &device_hash)? {
            return Ok(VoteOutcome::Duplicate);
        }

        let rate = self.limiter.check(&request.address_hash, now).await?;
        let signals = TrustSignals {
            is_new_device: true,
            clean_address: rate.trust_delta >= 0,
            behavior_score: request.behavior_score.unwrap_or(0),
            verified: request.verified.unwrap_or(false),
            has_rate_limit_issue: rate.cooldown_ms > 0,
            cooldown_ms: rate.cooldown_ms,
        };
        let verdict = evaluate(&signals);
        if !verdict.allowed {
            info!(
                poll_id = %request.poll_id,
                cooldown = %format_duration_ms(verdict.cooldown_ms),
                "vote not admitted"
            );
            return Ok(VoteOutcome::RateLimited {
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "not admitted".to_string()),
                cooldown_ms: verdict.cooldown_ms,
            });
        }

        let record = VoteRecord {
            poll_id: request.poll_id.clone(),
            option_id: request.option_id.clone(),
            address_hash: request.address_hash.clone(),
            device_hash,
            verified: request.verified.unwrap_or(false),
            timestamp: now,
        };
        match self.votes.insert_vote(record) {
            Ok(()) => {}
            // Lost the race against a concurrent submission from the same
            // device; report it the same way as the advisory check would.
            Err(StoreError::Duplicate(_)) => return Ok(VoteOutcome::Duplicate),
            Err(e) => return Err(e.into()),
        }

        let counts = self.votes.tallies(&request.poll_id)?;
        self.publisher.publish(&request.poll_id, &counts);
        info!(poll_id = %request.poll_id, option_id = %request.option_id, "vote accepted");

        Ok(VoteOutcome::Accepted { counts })
    }

    /// Prune expired nonce and rate-limit entries.
    pub fn sweep(&self, now: Timestamp) {
        let nonces = self.nonces.sweep(now);
        let rates = self.limiter.sweep(now);
        if nonces + rates > 0 {
            debug!(nonces, rates, "swept expired admission entries");
        }
    }

    /// Spawn the periodic sweep as an owned background task.
    ///
    /// Runs until the shutdown channel fires. The sweep itself cannot fail;
    /// a tick that finds nothing to remove simply defers to the next one.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => pipeline.sweep(Timestamp::now()),
                    _ = shutdown.recv() => {
                        debug!("admission sweeper stopping");
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for AdmissionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPipeline")
            .field("tracked_nonces", &self.nonces.tracked())
            .field("tracked_addresses", &self.limiter.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livepoll_nullables::RecordingPublisher;
    use livepoll_store::MemoryStore;
    use livepoll_types::{Poll, PollOption};

    const NOW: u64 = 1_700_000_000_000;

    struct Fixture {
        pipeline: Arc<AdmissionPipeline>,
        publisher: Arc<RecordingPublisher>,
        store: Arc<MemoryStore>,
    }

    fn fixture_with_expiry(expires_at: Option<u64>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .put_poll(Poll {
                id: PollId::new("poll-1"),
                question: "best editor?".to_string(),
                created_at: Timestamp::new(NOW - 1_000),
                expires_at: expires_at.map(Timestamp::new),
                options: vec![
                    PollOption {
                        id: OptionId::new("opt-a"),
                        label: "vim".to_string(),
                        sort_order: 0,
                    },
                    PollOption {
                        id: OptionId::new("opt-b"),
                        label: "emacs".to_string(),
                        sort_order: 1,
                    },
                ],
            })
            .unwrap();

        let publisher = Arc::new(RecordingPublisher::new());
        let pipeline = Arc::new(AdmissionPipeline::new(
            store.clone(),
            store.clone(),
            NonceTracker::in_memory(),
            RateLimiter::in_memory(),
            publisher.clone(),
        ));
        Fixture {
            pipeline,
            publisher,
            store,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_expiry(None)
    }

    fn request(device: &str, address: &str) -> VoteRequest {
        VoteRequest {
            poll_id: PollId::new("poll-1"),
            option_id: OptionId::new("opt-a"),
            fingerprint: format!("{device}-fingerprint"),
            address_hash: AddressHash::new(format!("{address:0>64}")),
            behavior_score: Some(8),
            verified: None,
            timestamp: Some(Timestamp::new(NOW)),
            nonce: None,
        }
    }

    #[tokio::test]
    async fn accepted_vote_is_stored_and_published() {
        let fx = fixture();
        let outcome = fx
            .pipeline
            .submit(&request("dev-1", "a1"), Timestamp::new(NOW))
            .await
            .unwrap();

        match outcome {
            VoteOutcome::Accepted { counts } => {
                assert_eq!(counts.len(), 2);
                assert_eq!(counts[0].count, 1);
                assert_eq!(counts[1].count, 0);
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(fx.store.vote_count(), 1);
        assert_eq!(fx.publisher.publish_count(), 1);
    }

    #[tokio::test]
    async fn second_vote_from_same_device_is_duplicate() {
        let fx = fixture();
        let now = Timestamp::new(NOW);

        fx.pipeline.submit(&request("dev-1", "a1"), now).await.unwrap();
        let outcome = fx
            .pipeline
            .submit(&request("dev-1", "a2"), now)
            .await
            .unwrap();

        assert_eq!(outcome, VoteOutcome::Duplicate);
        assert_eq!(fx.publisher.publish_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_same_device_submissions_admit_exactly_one() {
        let fx = fixture();
        let now = Timestamp::new(NOW);

        let mut tasks = Vec::new();
        for i in 0..4 {
            let pipeline = fx.pipeline.clone();
            // Distinct addresses so rate limiting stays out of the picture.
            let req = request("shared-device", &format!("a{i}"));
            tasks.push(tokio::spawn(async move {
                pipeline.submit(&req, now).await.unwrap()
            }));
        }

        let mut accepted = 0;
        let mut duplicate = 0;
        for task in tasks {
            match task.await.unwrap() {
                VoteOutcome::Accepted { .. } => accepted += 1,
                VoteOutcome::Duplicate => duplicate += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(duplicate, 3);
        assert_eq!(fx.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn expired_poll_rejected_even_when_everything_else_passes() {
        let fx = fixture_with_expiry(Some(NOW - 1));
        let outcome = fx
            .pipeline
            .submit(&request("dev-1", "a1"), Timestamp::new(NOW))
            .await
            .unwrap();
        assert_eq!(outcome, VoteOutcome::PollExpired);
        assert_eq!(fx.store.vote_count(), 0);
    }

    #[tokio::test]
    async fn unknown_poll_is_not_found() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.poll_id = PollId::new("missing");
        let err = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::PollNotFound(_)));
    }

    #[tokio::test]
    async fn option_from_another_poll_is_invalid() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.option_id = OptionId::new("opt-zzz");
        let err = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn short_fingerprint_is_invalid() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.fingerprint = "short".to_string();
        let err = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.timestamp = Some(Timestamp::new(NOW - MAX_SUBMISSION_AGE_MS - 1));
        let outcome = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VoteOutcome::Rejected {
                reason: RejectReason::StaleTimestamp
            }
        );
    }

    #[tokio::test]
    async fn future_timestamp_is_rejected() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.timestamp = Some(Timestamp::new(NOW + 10_000));
        let outcome = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VoteOutcome::Rejected {
                reason: RejectReason::StaleTimestamp
            }
        );
    }

    #[tokio::test]
    async fn replayed_nonce_is_rejected_before_store_access() {
        let fx = fixture();
        let now = Timestamp::new(NOW);
        let token = fx.pipeline.nonces().issue(now).await.unwrap();

        let mut first = request("dev-1", "a1");
        first.nonce = Some(token.as_str().to_string());
        let mut second = request("dev-2", "a2");
        second.nonce = Some(token.as_str().to_string());

        assert!(matches!(
            fx.pipeline.submit(&first, now).await.unwrap(),
            VoteOutcome::Accepted { .. }
        ));
        assert_eq!(
            fx.pipeline.submit(&second, now).await.unwrap(),
            VoteOutcome::Rejected {
                reason: RejectReason::NonceReplay
            }
        );
        // The replayed submission never reached the store.
        assert_eq!(fx.store.vote_count(), 1);
    }

    #[tokio::test]
    async fn low_behavior_score_rejected_with_engagement_reason() {
        let fx = fixture();
        let mut req = request("dev-1", "a1");
        req.behavior_score = Some(6);
        let outcome = fx
            .pipeline
            .submit(&req, Timestamp::new(NOW))
            .await
            .unwrap();

        match outcome {
            VoteOutcome::RateLimited {
                reason,
                cooldown_ms,
            } => {
                assert!(reason.contains("engagement"));
                assert_eq!(cooldown_ms, 0);
            }
            other => panic!("expected trust rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sustained_traffic_from_one_address_is_rate_limited() {
        let fx = fixture();
        let now = Timestamp::new(NOW);

        // Five devices behind one address get through (the later ones as
        // neutral); the sixth trips the cooldown.
        for i in 0..5 {
            let req = request(&format!("dev-{i}"), "shared-nat");
            assert!(matches!(
                fx.pipeline.submit(&req, now.plus(i)).await.unwrap(),
                VoteOutcome::Accepted { .. }
            ));
        }

        let sixth = request("dev-5", "shared-nat");
        match fx.pipeline.submit(&sixth, now.plus(5)).await.unwrap() {
            VoteOutcome::RateLimited {
                reason,
                cooldown_ms,
            } => {
                assert!(reason.contains("too many requests"));
                assert_eq!(cooldown_ms, crate::ratelimit::COOLDOWN_MS);
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert_eq!(fx.store.vote_count(), 5);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let fx = fixture();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = fx
            .pipeline
            .spawn_sweeper(Duration::from_millis(10), shutdown_rx);
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
