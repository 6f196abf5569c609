//! Trust evaluation — the final admit/reject decision for a vote.
//!
//! [`evaluate`] is a pure function over the collected signals: no side
//! effects, no I/O, deterministic given its inputs. That keeps the policy
//! independently unit-testable without any network or storage dependency.

/// Signals collected for one submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrustSignals {
    /// No vote from this device exists yet on this poll.
    pub is_new_device: bool,
    /// The rate limiter returned a non-negative trust delta.
    pub clean_address: bool,
    /// Behavioral score 0–10, see [`behavior_score`].
    pub behavior_score: u8,
    /// An authenticated identity was presented.
    pub verified: bool,
    /// The address is under an active rate-limit cooldown.
    pub has_rate_limit_issue: bool,
    /// Remaining cooldown, carried into the verdict for client backoff.
    pub cooldown_ms: u64,
}

/// The admit/reject decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrustVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    /// How long the client should back off before retrying; zero when
    /// retrying sooner would not help (or when allowed).
    pub cooldown_ms: u64,
}

impl TrustVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            cooldown_ms: 0,
        }
    }

    fn reject(reason: &str, cooldown_ms: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.to_string()),
            cooldown_ms,
        }
    }
}

/// Minimum behavioral score for admission.
///
/// The composition in [`behavior_score`] caps each dimension at 5, so 7
/// requires evidence from both time-on-page and pointer movement; a bot
/// faking only one signal cannot cross it.
pub const BEHAVIOR_THRESHOLD: u8 = 7;

/// Evaluate the signals, first match wins.
pub fn evaluate(signals: &TrustSignals) -> TrustVerdict {
    // Hard block: the address is actively cooling down.
    if signals.has_rate_limit_issue {
        return TrustVerdict::reject(
            "too many requests from your network; please wait a few minutes and try again",
            signals.cooldown_ms,
        );
    }

    // Bot check: admission requires engagement on both dimensions.
    if signals.behavior_score < BEHAVIOR_THRESHOLD {
        return TrustVerdict::reject(
            "insufficient engagement signal; please spend a moment reading the poll \
             and make your selection carefully",
            0,
        );
    }

    TrustVerdict::allow()
}

/// Compose the 0–10 behavior score from its two dimensions.
///
/// Time on page contributes `min(seconds, 5)`; pointer movement contributes
/// 5 for three or more movement events, partial credit of 3 for exactly
/// two, and nothing below that. Neither dimension alone can reach the
/// admission threshold of 7.
pub fn behavior_score(seconds_on_page: u64, pointer_events: u32) -> u8 {
    let time_component = seconds_on_page.min(5) as u8;
    let pointer_component = match pointer_events {
        0 | 1 => 0,
        2 => 3,
        _ => 5,
    };
    (time_component + pointer_component).min(10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn signals(behavior_score: u8) -> TrustSignals {
        TrustSignals {
            is_new_device: true,
            clean_address: true,
            behavior_score,
            verified: false,
            has_rate_limit_issue: false,
            cooldown_ms: 0,
        }
    }

    #[test]
    fn rate_limit_issue_rejects_with_cooldown() {
        let verdict = evaluate(&TrustSignals {
            has_rate_limit_issue: true,
            cooldown_ms: 600_000,
            ..signals(10)
        });
        assert!(!verdict.allowed);
        assert_eq!(verdict.cooldown_ms, 600_000);
        assert!(verdict.reason.unwrap().contains("too many requests"));
    }

    #[test]
    fn score_six_rejected_for_engagement() {
        let verdict = evaluate(&signals(6));
        assert!(!verdict.allowed);
        assert!(verdict.reason.unwrap().contains("engagement"));
        assert_eq!(verdict.cooldown_ms, 0);
    }

    #[test]
    fn score_eight_allowed() {
        let verdict = evaluate(&signals(8));
        assert!(verdict.allowed);
        assert!(verdict.reason.is_none());
    }

    #[test]
    fn score_exactly_at_threshold_allowed() {
        assert!(evaluate(&signals(7)).allowed);
    }

    #[test]
    fn rate_limit_outranks_good_behavior() {
        let verdict = evaluate(&TrustSignals {
            has_rate_limit_issue: true,
            cooldown_ms: 1_000,
            ..signals(10)
        });
        assert!(!verdict.allowed);
        assert!(verdict.reason.unwrap().contains("too many requests"));
    }

    #[test]
    fn behavior_score_composition() {
        // 5s + 2 events: full time credit, partial pointer credit.
        assert_eq!(behavior_score(5, 2), 8);
        // 3s + 3 events: partial time, full pointer.
        assert_eq!(behavior_score(3, 3), 8);
        // 4s + 2 events: one short of the threshold.
        assert_eq!(behavior_score(4, 2), 7);
        assert_eq!(behavior_score(3, 2), 6);
        // Neither dimension alone can reach 7.
        assert_eq!(behavior_score(120, 0), 5);
        assert_eq!(behavior_score(0, 50), 5);
        assert_eq!(behavior_score(0, 0), 0);
    }

    proptest! {
        #[test]
        fn evaluate_is_deterministic(
            behavior_score in 0u8..=10,
            is_new_device: bool,
            clean_address: bool,
            verified: bool,
            has_rate_limit_issue: bool,
            cooldown_ms in 0u64..10_000_000,
        ) {
            let input = TrustSignals {
                is_new_device,
                clean_address,
                behavior_score,
                verified,
                has_rate_limit_issue,
                cooldown_ms,
            };
            prop_assert_eq!(evaluate(&input), evaluate(&input));
        }

        #[test]
        fn behavior_score_never_exceeds_ten(
            seconds in 0u64..100_000,
            events in 0u32..100_000,
        ) {
            prop_assert!(behavior_score(seconds, events) <= 10);
        }
    }
}
