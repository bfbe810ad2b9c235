// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use score_core::window::WindowDenial;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{reason}")]
    ScoreHacking {
        reason: String,
        window: Option<WindowDenial>,
    },
    #[error("wallet has no username set")]
    AccountNotSet,
    #[error("NO_DELTA: wallet already at or above the unlock target (current {current})")]
    AlreadyMaxed { current: u64 },
    #[error("job not found")]
    JobNotFound,
    #[error("{0}")]
    CheckWallet(String),
    #[error("{0}")]
    AggregateFailed(String),
    #[error("{0}")]
    InternalError(String),
}

/// Window diagnostics attached to an anti-cheat rejection.
#[derive(Debug, Serialize)]
struct WindowDiagnostics {
    used: u64,
    incoming: u64,
    limit: u64,
    seconds: u64,
}

impl From<&WindowDenial> for WindowDiagnostics {
    fn from(denial: &WindowDenial) -> Self {
        Self {
            used: denial.used,
            incoming: denial.incoming,
            limit: denial.limit,
            seconds: denial.window.as_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    ok: bool,
    code: &'static str,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    window: Option<WindowDiagnostics>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn score_hacking(reason: impl Into<String>, window: Option<WindowDenial>) -> Self {
        Self::ScoreHacking {
            reason: reason.into(),
            window,
        }
    }

    pub fn check_wallet(message: impl Into<String>) -> Self {
        Self::CheckWallet(message.into())
    }

    pub fn aggregate_failed(message: impl Into<String>) -> Self {
        Self::AggregateFailed(message.into())
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::ScoreHacking { .. } | Self::AccountNotSet => StatusCode::FORBIDDEN,
            Self::AlreadyMaxed { .. } => StatusCode::CONFLICT,
            Self::JobNotFound => StatusCode::NOT_FOUND,
            Self::CheckWallet(_) => StatusCode::BAD_GATEWAY,
            Self::AggregateFailed(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::ScoreHacking { .. } => "SUSPECTED_SCORE_HACKING",
            Self::AccountNotSet => "ACCOUNT_NOT_SET",
            Self::AlreadyMaxed { .. } => "ALREADY_MAXED",
            Self::JobNotFound => "JOB_NOT_FOUND",
            Self::CheckWallet(_) => "CHECK_WALLET_ERROR",
            Self::AggregateFailed(_) => "AGGREGATE_FAILED",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let window = match &self {
            Self::ScoreHacking { window, .. } => window.as_ref().map(WindowDiagnostics::from),
            _ => None,
        };
        let body = ErrorResponse {
            ok: false,
            code: self.code(),
            reason: self.to_string(),
            window,
        };
        (self.status(), Json(body)).into_response()
    }
}
