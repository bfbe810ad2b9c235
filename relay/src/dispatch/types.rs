// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use alloy::primitives::{Address, B256};
use score_core::job::JobId;
use score_core::window::WindowDenial;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

/// One client submission travelling from intake to its terminal reply.
#[derive(Debug)]
pub struct Submission {
    pub job_id: JobId,
    pub player: Address,
    pub score: u64,
    /// Privileged submissions bypass the window ledger entirely.
    pub skip_window: bool,
    /// Whether a ledger reservation is currently charged for this item.
    pub reservation_held: bool,
    pub responder: Arc<Responder>,
    pub accepted_at: Instant,
}

/// Terminal outcome delivered to the waiting HTTP handler.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Receipt arrived inside the ack window: full 200 payload.
    Mined(MinedReply),
    /// Transaction is in the mempool but not mined yet: 202 with the nonce.
    Acked { job_id: JobId, nonce: u64, ack_ms: u64 },
    /// Failsafe fired before any send: 202 without a nonce.
    Queued {
        job_id: JobId,
        approx_batch_in_ms: u64,
    },
    /// Admission recheck denied the item inside the lane.
    Hacking {
        reason: String,
        window: Option<WindowDenial>,
    },
    /// Send or confirmation failure; `timeout` selects 504 over 500.
    Failed {
        code: &'static str,
        reason: String,
        timeout: bool,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct MinedReply {
    pub tx_hash: B256,
    pub block_number: u64,
    pub status: u64,
    pub gas_used: u64,
    pub to: Option<Address>,
    pub from: Address,
    pub nonce: u64,
}

/// Once-only reply slot shared by the receipt waiter, the early-ack timer and
/// the intake failsafe. The first `resolve` wins, consumes the sender and
/// aborts every armed timer; later calls are no-ops.
#[derive(Debug)]
pub struct Responder {
    inner: Mutex<ResponderInner>,
}

#[derive(Debug)]
struct ResponderInner {
    reply_to: Option<oneshot::Sender<Reply>>,
    timers: Vec<AbortHandle>,
}

impl Responder {
    pub fn new(reply_to: oneshot::Sender<Reply>) -> Self {
        Self {
            inner: Mutex::new(ResponderInner {
                reply_to: Some(reply_to),
                timers: Vec::new(),
            }),
        }
    }

    /// Delivers `reply` if nobody else has. Returns whether this call won.
    pub fn resolve(&self, reply: Reply) -> bool {
        let mut inner = self.lock();
        let Some(reply_to) = inner.reply_to.take() else {
            return false;
        };
        for timer in inner.timers.drain(..) {
            timer.abort();
        }
        drop(inner);
        // A dropped receiver means the client went away; the job record
        // already carries the outcome, so the lost send is fine.
        let _ = reply_to.send(reply);
        true
    }

    /// Registers a timer task to abort once a reply wins. If the slot is
    /// already resolved the timer is aborted on the spot.
    pub fn register_timer(&self, handle: AbortHandle) {
        let mut inner = self.lock();
        if inner.reply_to.is_some() {
            inner.timers.push(handle);
        } else {
            handle.abort();
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.lock().reply_to.is_none()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResponderInner> {
        self.inner.lock().expect("responder mutex poisoned")
    }
}

/// Shared pending queue between intake (append) and the dispatch lane
/// (drain-all, front-requeue after a mid-batch send failure). Plain FIFO
/// except for the requeue path, hence a deque rather than a channel.
#[derive(Debug, Default)]
pub struct PendingQueue {
    items: Mutex<VecDeque<Submission>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, submission: Submission) {
        self.lock().push_back(submission);
    }

    pub fn drain_all(&self) -> VecDeque<Submission> {
        std::mem::take(&mut *self.lock())
    }

    /// Reinserts `items` at the front, preserving their relative order.
    pub fn requeue_front(&self, items: impl DoubleEndedIterator<Item = Submission>) {
        let mut queue = self.lock();
        for item in items.rev() {
            queue.push_front(item);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Submission>> {
        self.items.lock().expect("pending queue mutex poisoned")
    }
}
