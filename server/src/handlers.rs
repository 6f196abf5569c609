//! HTTP handlers for the vote API.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use livepoll_admission::nonce::NONCE_TTL_MS;
use livepoll_admission::{AdmissionError, AdmissionPipeline, VoteOutcome, VoteRequest};
use livepoll_store::{PollStore, VoteStore};
use livepoll_types::{OptionCount, OptionId, Poll, PollId, Timestamp};
use livepoll_utils::hash_address;

use crate::error::ApiError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AdmissionPipeline>,
    pub polls: Arc<dyn PollStore>,
    pub votes: Arc<dyn VoteStore>,
}

/// The wire shape of a vote submission.
#[derive(Debug, Deserialize)]
pub struct VoteSubmission {
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub fingerprint: String,
    pub behavior_score: Option<u8>,
    pub verified: Option<bool>,
    pub timestamp: Option<u64>,
    pub nonce: Option<String>,
}

#[derive(Serialize)]
struct PollSnapshot {
    poll: Poll,
    expired: bool,
    counts: Vec<OptionCount>,
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Issue a single-use request token for the voting page.
pub async fn issue_nonce(State(state): State<AppState>) -> Result<Response, ApiError> {
    let token = state.pipeline.nonces().issue(Timestamp::now()).await?;
    let body = serde_json::json!({
        "nonce": token.as_str(),
        "expires_in_ms": NONCE_TTL_MS,
    });
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// Read-only poll snapshot with current tallies.
pub async fn poll_snapshot(
    State(state): State<AppState>,
    Path(poll_id): Path<String>,
) -> Result<Response, ApiError> {
    let poll_id = PollId::new(poll_id);
    let poll = state
        .polls
        .get_poll(&poll_id)?
        .ok_or_else(|| AdmissionError::PollNotFound(poll_id.clone()))?;
    let counts = state.votes.tallies(&poll_id)?;
    let snapshot = PollSnapshot {
        expired: poll.is_expired(Timestamp::now()),
        poll,
        counts,
    };
    Ok((StatusCode::OK, Json(snapshot)).into_response())
}

/// Submit a vote. One verdict per request; every outcome has a stable
/// status code so clients can branch without parsing prose.
pub async fn submit_vote(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<VoteSubmission>,
) -> Result<Response, ApiError> {
    let address = client_address(&headers, peer);
    let request = VoteRequest {
        poll_id: body.poll_id,
        option_id: body.option_id,
        fingerprint: body.fingerprint,
        address_hash: hash_address(&address),
        behavior_score: body.behavior_score,
        verified: body.verified,
        timestamp: body.timestamp.map(Timestamp::new),
        nonce: body.nonce,
    };

    let outcome = state.pipeline.submit(&request, Timestamp::now()).await?;
    debug!(poll_id = %request.poll_id, ?outcome, "vote verdict");
    Ok(outcome_response(outcome))
}

fn outcome_response(outcome: VoteOutcome) -> Response {
    match outcome {
        VoteOutcome::Accepted { counts } => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "status": "accepted", "counts": counts })),
        )
            .into_response(),
        VoteOutcome::Duplicate => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "duplicate",
                "reason": "this device has already voted on this poll",
            })),
        )
            .into_response(),
        VoteOutcome::PollExpired => (
            StatusCode::GONE,
            Json(serde_json::json!({
                "status": "expired",
                "reason": "this poll has closed",
            })),
        )
            .into_response(),
        VoteOutcome::RateLimited {
            reason,
            cooldown_ms,
        } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "status": "rate_limited",
                "reason": reason,
                "cooldown_ms": cooldown_ms,
            })),
        )
            .into_response(),
        VoteOutcome::Rejected { reason } => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "status": "rejected",
                "reason": reason.code(),
                "message": reason.message(),
            })),
        )
            .into_response(),
    }
}

/// The client's network identity: first `x-forwarded-for` hop, then
/// `x-real-ip`, then the socket peer. Only ever stored as a hash.
fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    peer.ip().to_string()
}
