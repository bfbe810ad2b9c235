// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use score_core::job::MinedReceipt;
use score_core::window::WindowLedger;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::chain::{Chain, ChainError, ReceiptSummary};
use crate::jobs::JobRegistry;

use super::types::{MinedReply, PendingQueue, Reply, Submission};

pub mod codes {
    pub const SUSPECTED_SCORE_HACKING: &str = "SUSPECTED_SCORE_HACKING";
    pub const NONCE_FETCH_FAILED: &str = "NONCE_FETCH_FAILED";
    pub const TX_SEND_FAILED: &str = "TX_SEND_FAILED";
    pub const TX_WAIT_TIMEOUT: &str = "TX_WAIT_TIMEOUT";
    pub const TX_CONFIRM_FAILED: &str = "TX_CONFIRM_FAILED";
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub batch_interval: Duration,
    /// Early-ack deadline after each send.
    pub ack_after: Duration,
    /// Upper bound on a background receipt wait.
    pub tx_timeout: Duration,
    /// Gas limit used when estimation fails.
    pub gas_estimate_fallback: u64,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchStop {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    shutdown: AtomicBool,
    notify: Notify,
}

impl DispatchStop {
    pub fn request_shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Relaxed);
        self.inner.notify.notify_waiters();
    }

    fn is_shutdown_requested(&self) -> bool {
        self.inner.shutdown.load(Ordering::Relaxed)
    }

    async fn notified(&self) {
        self.inner.notify.notified().await;
    }
}

/// Single writer over the signer's nonce sequence.
///
/// One tick at a time: a tick drains the whole pending queue, assigns
/// contiguous nonces to the items that survive admission, and serializes the
/// sends while receipt waits run in parallel. A send failure aborts the rest
/// of the batch so the chain never sees a nonce gap.
pub struct DispatchLane<C: Chain> {
    chain: Arc<C>,
    queue: Arc<PendingQueue>,
    jobs: Arc<JobRegistry>,
    ledger: Arc<WindowLedger>,
    config: DispatchConfig,
    stop: DispatchStop,
}

impl<C: Chain> DispatchLane<C> {
    pub fn new(
        chain: Arc<C>,
        queue: Arc<PendingQueue>,
        jobs: Arc<JobRegistry>,
        ledger: Arc<WindowLedger>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            chain,
            queue,
            jobs,
            ledger,
            config,
            stop: DispatchStop::default(),
        }
    }

    pub fn spawn(self) -> (JoinHandle<()>, DispatchStop) {
        let stop = self.stop.clone();
        let handle = tokio::spawn(async move { self.run().await });
        (handle, stop)
    }

    async fn run(self) {
        let mut tick = tokio::time::interval(self.config.batch_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.stop.is_shutdown_requested() {
                        break;
                    }
                    self.run_tick().await;
                }
                _ = self.stop.notified() => break,
            }
        }
        debug!("dispatch lane stopped");
    }

    async fn run_tick(&self) {
        let mut batch = self.queue.drain_all();
        if batch.is_empty() {
            return;
        }

        let base_nonce = match self.chain.pending_nonce().await {
            Ok(nonce) => nonce,
            Err(err) => {
                warn!(error = %err, items = batch.len(), "base nonce fetch failed; failing batch");
                self.fail_batch(batch, &err);
                return;
            }
        };
        let fees = self.chain.fee_quote().await;
        debug!(base_nonce, items = batch.len(), "dispatching batch");

        let mut nonce = base_nonce;
        while let Some(mut item) = batch.pop_front() {
            // Admission recheck: items requeued after a prior send failure had
            // their reservation released and must win the window again.
            if !item.skip_window && !item.reservation_held {
                match self.ledger.reserve(item.player, item.score, item.job_id) {
                    Ok(()) => item.reservation_held = true,
                    Err(denial) => {
                        self.jobs.update(&item.job_id, |job| {
                            job.mark_failed(codes::SUSPECTED_SCORE_HACKING, denial.to_string())
                        });
                        item.responder.resolve(Reply::Hacking {
                            reason: denial.to_string(),
                            window: Some(denial),
                        });
                        // Nonce not consumed; the next item takes it.
                        continue;
                    }
                }
            }

            let estimate = match self
                .chain
                .estimate_update_gas(item.player, item.score, nonce)
                .await
            {
                Ok(gas) => gas,
                Err(err) => {
                    warn!(job_id = %item.job_id, error = %err, "gas estimate failed; using fallback");
                    self.config.gas_estimate_fallback
                }
            };
            let gas_limit = estimate.saturating_mul(12) / 10 + 5_000;

            // Sent is recorded before the wire call so the consumed nonce is
            // visible even if we crash between send and acknowledgement.
            self.jobs.update(&item.job_id, |job| job.mark_sent(nonce));

            match self
                .chain
                .send_update(item.player, item.score, nonce, gas_limit, fees)
                .await
            {
                Ok(tx_hash) => {
                    self.jobs
                        .update(&item.job_id, |job| job.record_tx_hash(tx_hash));
                    info!(
                        job_id = %item.job_id,
                        tx_hash = %tx_hash,
                        nonce,
                        queued_ms = item.accepted_at.elapsed().as_millis() as u64,
                        "tx sent"
                    );
                    self.arm_early_ack(&item, nonce);
                    self.spawn_receipt_waiter(item, nonce, tx_hash);
                    nonce += 1;
                }
                Err(err) => {
                    warn!(job_id = %item.job_id, nonce, error = %err, "send failed; aborting batch tail");
                    self.jobs.update(&item.job_id, |job| {
                        job.mark_failed(codes::TX_SEND_FAILED, err.to_string())
                    });
                    if item.reservation_held {
                        self.ledger.rollback(item.player, item.job_id);
                    }
                    item.responder.resolve(Reply::Failed {
                        code: codes::TX_SEND_FAILED,
                        reason: err.to_string(),
                        timeout: false,
                    });
                    // The node may have accepted nonce-1 but not this one;
                    // sending past the hole would strand the whole tail in the
                    // mempool. Requeue the remainder for the next tick.
                    self.release_and_requeue(batch);
                    return;
                }
            }
        }
    }

    fn fail_batch(&self, batch: VecDeque<Submission>, err: &ChainError) {
        for item in batch {
            self.jobs.update(&item.job_id, |job| {
                job.mark_failed(codes::NONCE_FETCH_FAILED, err.to_string())
            });
            if item.reservation_held {
                self.ledger.rollback(item.player, item.job_id);
            }
            item.responder.resolve(Reply::Failed {
                code: codes::NONCE_FETCH_FAILED,
                reason: err.to_string(),
                timeout: false,
            });
        }
    }

    fn release_and_requeue(&self, mut rest: VecDeque<Submission>) {
        let requeued = rest.len();
        for item in rest.iter_mut() {
            if item.reservation_held {
                self.ledger.rollback(item.player, item.job_id);
                item.reservation_held = false;
            }
            self.jobs.update(&item.job_id, |job| job.reset_queued());
        }
        self.queue.requeue_front(rest.into_iter());
        if requeued > 0 {
            info!(requeued, "batch tail returned to the front of the queue");
        }
    }

    fn arm_early_ack(&self, item: &Submission, nonce: u64) {
        let responder = Arc::clone(&item.responder);
        let job_id = item.job_id;
        let ack_after = self.config.ack_after;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ack_after).await;
            let ack_ms = ack_after.as_millis() as u64;
            if responder.resolve(Reply::Acked {
                job_id,
                nonce,
                ack_ms,
            }) {
                debug!(%job_id, nonce, "receipt not in before ack deadline; answered 202");
            }
        });
        item.responder.register_timer(timer.abort_handle());
    }

    fn spawn_receipt_waiter(&self, item: Submission, nonce: u64, tx_hash: alloy::primitives::B256) {
        let chain = Arc::clone(&self.chain);
        let jobs = Arc::clone(&self.jobs);
        let ledger = Arc::clone(&self.ledger);
        let tx_timeout = self.config.tx_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(tx_timeout, chain.wait_receipt(tx_hash)).await {
                Ok(Ok(receipt)) => {
                    jobs.update(&item.job_id, |job| {
                        job.mark_mined(MinedReceipt {
                            block_number: receipt.block_number,
                            status: receipt.status,
                            gas_used: receipt.gas_used,
                        })
                    });
                    info!(
                        job_id = %item.job_id,
                        tx_hash = %tx_hash,
                        block_number = receipt.block_number,
                        "tx mined"
                    );
                    item.responder.resolve(Reply::Mined(mined_reply(&receipt, nonce)));
                }
                Ok(Err(err)) => {
                    warn!(job_id = %item.job_id, error = %err, "receipt wait failed");
                    jobs.update(&item.job_id, |job| {
                        job.mark_failed(codes::TX_CONFIRM_FAILED, err.to_string())
                    });
                    if item.reservation_held {
                        ledger.rollback(item.player, item.job_id);
                    }
                    item.responder.resolve(Reply::Failed {
                        code: codes::TX_CONFIRM_FAILED,
                        reason: err.to_string(),
                        timeout: false,
                    });
                }
                Err(_) => {
                    warn!(job_id = %item.job_id, tx_hash = %tx_hash, "receipt wait timed out");
                    jobs.update(&item.job_id, |job| {
                        job.mark_failed(
                            codes::TX_WAIT_TIMEOUT,
                            format!("no receipt within {}ms", tx_timeout.as_millis()),
                        )
                    });
                    if item.reservation_held {
                        ledger.rollback(item.player, item.job_id);
                    }
                    item.responder.resolve(Reply::Failed {
                        code: codes::TX_WAIT_TIMEOUT,
                        reason: format!("no receipt within {}ms", tx_timeout.as_millis()),
                        timeout: true,
                    });
                }
            }
        });
    }
}

fn mined_reply(receipt: &ReceiptSummary, nonce: u64) -> MinedReply {
    MinedReply {
        tx_hash: receipt.tx_hash,
        block_number: receipt.block_number,
        status: receipt.status,
        gas_used: receipt.gas_used,
        to: receipt.to,
        from: receipt.from,
        nonce,
    }
}
