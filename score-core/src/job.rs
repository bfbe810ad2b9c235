// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::fmt;
use std::time::{Duration, SystemTime};

use alloy_primitives::{Address, B256};
use serde::Serialize;
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Sent,
    Mined,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Mined => "mined",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Chain-confirmed outcome kept on a mined job.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MinedReceipt {
    pub block_number: u64,
    pub status: u64,
    pub gas_used: u64,
}

/// One submission's lifecycle record.
///
/// Writers are the intake (create) and the dispatch lane (transitions);
/// `mined` and `failed` are terminal, so a late competing writer is a no-op.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub created_at: SystemTime,
    pub player: Address,
    pub score: u64,
    pub unlock_all: bool,
    pub nonce: Option<u64>,
    pub sent_at: Option<SystemTime>,
    pub tx_hash: Option<B256>,
    pub receipt: Option<MinedReceipt>,
    pub code: Option<String>,
    pub reason: Option<String>,
}

impl JobRecord {
    pub fn new_queued(player: Address, score: u64, unlock_all: bool) -> Self {
        Self {
            status: JobStatus::Queued,
            created_at: SystemTime::now(),
            player,
            score,
            unlock_all,
            nonce: None,
            sent_at: None,
            tx_hash: None,
            receipt: None,
            code: None,
            reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Mined | JobStatus::Failed)
    }

    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or_default()
    }

    /// Marks the job sent under `nonce`. Called just before the transaction
    /// leaves, so a crash mid-send still shows the consumed nonce.
    pub fn mark_sent(&mut self, nonce: u64) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Sent;
        self.sent_at = Some(SystemTime::now());
        self.nonce = Some(nonce);
    }

    pub fn record_tx_hash(&mut self, tx_hash: B256) {
        if self.is_terminal() {
            return;
        }
        self.tx_hash = Some(tx_hash);
    }

    pub fn mark_mined(&mut self, receipt: MinedReceipt) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Mined;
        self.receipt = Some(receipt);
    }

    pub fn mark_failed(&mut self, code: &str, reason: impl Into<String>) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.code = Some(code.to_string());
        self.reason = Some(reason.into());
    }

    /// Returns a requeued job to `queued`, clearing the send bookkeeping.
    pub fn reset_queued(&mut self) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Queued;
        self.sent_at = None;
        self.nonce = None;
    }
}
