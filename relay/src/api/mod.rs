// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod error;

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use alloy::primitives::{Address, B256};
use score_core::job::{JobId, JobRecord, JobStatus, MinedReceipt};
use score_core::window::WindowLedger;

use crate::accounts::AccountsClient;
use crate::chain::Chain;
use crate::dispatch::{PendingQueue, Reply, Responder, Submission};
use crate::jobs::JobRegistry;
use crate::leaderboard::LeaderboardClient;

pub use error::ApiError;

/// Board score a privileged unlock drives the wallet up to.
const UNLOCK_TARGET_SCORE: u64 = 1_200;
const DEFAULT_GAME_ID: u64 = 64;

#[derive(Debug, Clone)]
pub struct RelayLimits {
    pub window: Duration,
    pub per_window_limit: u64,
    pub event_min: u64,
    pub event_max: u64,
    pub confirmations: u64,
    pub tx_timeout: Duration,
    pub batch_interval: Duration,
    pub respond_after: Duration,
    /// Failsafe deadline: a reply is guaranteed within this bound even if the
    /// lane never picks the submission up.
    pub hard_timeout: Duration,
}

pub struct AppState<C: Chain> {
    pub chain: Arc<C>,
    pub queue: Arc<PendingQueue>,
    pub jobs: Arc<JobRegistry>,
    pub ledger: Arc<WindowLedger>,
    pub leaderboard: Arc<LeaderboardClient>,
    pub accounts: Arc<AccountsClient>,
    pub limits: RelayLimits,
}

pub fn router<C: Chain>(state: Arc<AppState<C>>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/submitscore", post(submit_score::<C>))
        .route("/api/v1/s3cr3tUnlockAll", post(unlock_all::<C>))
        .route("/api/v1/jobs/{id}", get(job_status::<C>))
        .route("/api/v1/getleaderboard", get(get_leaderboard::<C>))
        .route("/health", get(health::<C>))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitScoreRequest {
    wallet_address: String,
    score: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UnlockAllRequest {
    wallet_address: String,
    game_id: Option<u64>,
}

async fn submit_score<C: Chain>(
    State(state): State<Arc<AppState<C>>>,
    req: Result<Json<SubmitScoreRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let player = parse_address(&req.wallet_address)?;

    let limits = &state.limits;
    if req.score < limits.event_min || req.score > limits.event_max {
        return Err(ApiError::score_hacking(
            format!(
                "score {} outside allowed per-event range [{}, {}]",
                req.score, limits.event_min, limits.event_max
            ),
            None,
        ));
    }

    let job_id = Uuid::new_v4();
    state
        .ledger
        .reserve(player, req.score, job_id)
        .map_err(|denial| ApiError::score_hacking(denial.to_string(), Some(denial)))?;
    state
        .jobs
        .put(job_id, JobRecord::new_queued(player, req.score, false));

    Ok(enqueue_and_await(&state, job_id, player, req.score, false, true).await)
}

async fn unlock_all<C: Chain>(
    State(state): State<Arc<AppState<C>>>,
    req: Result<Json<UnlockAllRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = req.map_err(|err| ApiError::bad_request(format!("invalid JSON: {err}")))?;
    let player = parse_address(&req.wallet_address)?;
    let game_id = req.game_id.unwrap_or(DEFAULT_GAME_ID);

    match state.accounts.wallet_has_username(player).await {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::AccountNotSet),
        Err(err) => return Err(ApiError::check_wallet(err.to_string())),
    }

    let current = state
        .leaderboard
        .wallet_score(game_id, player)
        .await
        .map_err(|err| ApiError::aggregate_failed(err.to_string()))?;
    let delta = UNLOCK_TARGET_SCORE.saturating_sub(current);
    if delta == 0 {
        return Err(ApiError::AlreadyMaxed { current });
    }

    let job_id = Uuid::new_v4();
    state
        .jobs
        .put(job_id, JobRecord::new_queued(player, delta, true));

    Ok(enqueue_and_await(&state, job_id, player, delta, true, false).await)
}

/// Pushes the submission onto the pending queue, arms the failsafe timer and
/// suspends until exactly one reply path wins.
async fn enqueue_and_await<C: Chain>(
    state: &AppState<C>,
    job_id: JobId,
    player: Address,
    score: u64,
    skip_window: bool,
    reservation_held: bool,
) -> Response {
    let (reply_tx, reply_rx) = oneshot::channel();
    let responder = Arc::new(Responder::new(reply_tx));

    state.queue.push_back(Submission {
        job_id,
        player,
        score,
        skip_window,
        reservation_held,
        responder: Arc::clone(&responder),
        accepted_at: Instant::now(),
    });

    let hard_timeout = state.limits.hard_timeout;
    let approx_batch_in_ms = state.limits.batch_interval.as_millis() as u64;
    let failsafe_responder = Arc::clone(&responder);
    let failsafe = tokio::spawn(async move {
        tokio::time::sleep(hard_timeout).await;
        if failsafe_responder.resolve(Reply::Queued {
            job_id,
            approx_batch_in_ms,
        }) {
            warn!(%job_id, "failsafe fired before any dispatch outcome");
        }
    });
    responder.register_timer(failsafe.abort_handle());

    match reply_rx.await {
        Ok(reply) => render_reply(reply),
        Err(_) => ApiError::internal_error("dispatch lane dropped the reply").into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MinedResponse {
    ok: bool,
    tx_hash: B256,
    block_number: u64,
    status: u64,
    gas_used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    to: Option<Address>,
    from: Address,
    nonce: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    ok: bool,
    queued: bool,
    job_id: String,
    status_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    approx_batch_in_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TxFailedResponse {
    error: &'static str,
    code: &'static str,
    reason: String,
}

fn render_reply(reply: Reply) -> Response {
    match reply {
        Reply::Mined(mined) => (
            StatusCode::OK,
            Json(MinedResponse {
                ok: true,
                tx_hash: mined.tx_hash,
                block_number: mined.block_number,
                status: mined.status,
                gas_used: mined.gas_used,
                to: mined.to,
                from: mined.from,
                nonce: mined.nonce,
            }),
        )
            .into_response(),
        Reply::Acked {
            job_id,
            nonce,
            ack_ms,
        } => accepted_response(job_id, Some(nonce), Some(ack_ms), None),
        Reply::Queued {
            job_id,
            approx_batch_in_ms,
        } => accepted_response(job_id, None, None, Some(approx_batch_in_ms)),
        Reply::Hacking { reason, window } => {
            ApiError::score_hacking(reason, window).into_response()
        }
        Reply::Failed {
            code,
            reason,
            timeout,
        } => {
            let status = if timeout {
                StatusCode::GATEWAY_TIMEOUT
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(TxFailedResponse {
                    error: "Transaction failed",
                    code,
                    reason,
                }),
            )
                .into_response()
        }
    }
}

fn accepted_response(
    job_id: JobId,
    nonce: Option<u64>,
    ack_ms: Option<u64>,
    approx_batch_in_ms: Option<u64>,
) -> Response {
    (
        StatusCode::ACCEPTED,
        [("x-job-id", job_id.to_string())],
        Json(AcceptedResponse {
            ok: true,
            queued: true,
            job_id: job_id.to_string(),
            status_url: status_url(job_id),
            nonce,
            ack_ms,
            approx_batch_in_ms,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobView {
    ok: bool,
    status: JobStatus,
    job_id: String,
    wallet_address: Address,
    score: u64,
    created_at: u64,
    #[serde(skip_serializing_if = "is_false")]
    unlock_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sent_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_hash: Option<B256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receipt: Option<MinedReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl JobView {
    fn project(job_id: JobId, record: &JobRecord) -> Self {
        Self {
            ok: true,
            status: record.status,
            job_id: job_id.to_string(),
            wallet_address: record.player,
            score: record.score,
            created_at: unix_millis(record.created_at),
            unlock_all: record.unlock_all,
            nonce: record.nonce,
            sent_at: record.sent_at.map(unix_millis),
            tx_hash: record.tx_hash,
            receipt: record.receipt,
            code: record.code.clone(),
            reason: record.reason.clone(),
        }
    }
}

async fn job_status<C: Chain>(
    State(state): State<Arc<AppState<C>>>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job_id = Uuid::parse_str(&id).map_err(|_| ApiError::JobNotFound)?;
    let record = state.jobs.get(&job_id).ok_or(ApiError::JobNotFound)?;
    Ok(Json(JobView::project(job_id, &record)))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    #[serde(rename = "gameId")]
    game_id: Option<u64>,
}

async fn get_leaderboard<C: Chain>(
    State(state): State<Arc<AppState<C>>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Response, ApiError> {
    let game_id = query.game_id.unwrap_or(DEFAULT_GAME_ID);
    let board = state
        .leaderboard
        .aggregate(game_id)
        .await
        .map_err(|err| ApiError::aggregate_failed(err.to_string()))?;
    Ok(Json(board).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    block_number: Option<u64>,
    signer: Address,
    queue_depth: usize,
    window_ms: u64,
    per_minute_limit: u64,
    event_range: [u64; 2],
    confirmations: u64,
    tx_timeout_ms: u64,
    batch_interval_ms: u64,
    respond_after_ms: u64,
}

async fn health<C: Chain>(State(state): State<Arc<AppState<C>>>) -> Json<HealthResponse> {
    let (status, chain_id, block_number) = match state.chain.status().await {
        Ok(snapshot) => ("ok", Some(snapshot.chain_id), Some(snapshot.block_number)),
        Err(err) => {
            warn!(error = %err, "health probe could not reach the chain");
            ("degraded", None, None)
        }
    };
    let limits = &state.limits;
    Json(HealthResponse {
        status,
        chain_id,
        block_number,
        signer: state.chain.signer_address(),
        queue_depth: state.queue.len(),
        window_ms: limits.window.as_millis() as u64,
        per_minute_limit: limits.per_window_limit,
        event_range: [limits.event_min, limits.event_max],
        confirmations: limits.confirmations,
        tx_timeout_ms: limits.tx_timeout.as_millis() as u64,
        batch_interval_ms: limits.batch_interval.as_millis() as u64,
        respond_after_ms: limits.respond_after.as_millis() as u64,
    })
}

fn parse_address(value: &str) -> Result<Address, ApiError> {
    Address::from_str(value.trim())
        .map_err(|_| ApiError::bad_request(format!("invalid wallet address: {value:?}")))
}

fn status_url(job_id: JobId) -> String {
    format!("/api/v1/jobs/{job_id}")
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}
