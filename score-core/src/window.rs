// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use alloy_primitives::Address;
use thiserror::Error;

use crate::job::JobId;

#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub window: Duration,
    pub limit: u64,
}

/// Diagnostic payload for a denied reservation, surfaced verbatim to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "window budget exhausted: {used} used + {incoming} incoming exceeds {limit} per {}s",
    .window.as_secs()
)]
pub struct WindowDenial {
    pub used: u64,
    pub incoming: u64,
    pub limit: u64,
    pub window: Duration,
}

#[derive(Debug)]
struct WindowEntry {
    at: Instant,
    score: u64,
    job_id: JobId,
}

#[derive(Debug, Default)]
struct WalletWindow {
    entries: VecDeque<WindowEntry>,
    sum: u64,
}

impl WalletWindow {
    fn purge(&mut self, window: Duration, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.at) <= window {
                break;
            }
            let expired = self.entries.pop_front().expect("checked front");
            self.sum -= expired.score;
        }
    }
}

/// Per-wallet rolling score budget with an optimistic reserve discipline.
///
/// A reservation counts against the wallet's budget from intake until the
/// submission either mines (the entry ages out naturally) or fails (the owner
/// must roll it back). All three operations are atomic under one mutex, so
/// concurrent intakes cannot both read a passing sum and overshoot the cap.
pub struct WindowLedger {
    config: WindowConfig,
    wallets: Mutex<HashMap<Address, WalletWindow>>,
}

impl WindowLedger {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            wallets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Reserves `score` against the wallet's window budget.
    pub fn reserve(&self, player: Address, score: u64, job_id: JobId) -> Result<(), WindowDenial> {
        let now = Instant::now();
        let mut wallets = self.lock();
        let wallet = wallets.entry(player).or_default();
        wallet.purge(self.config.window, now);

        let projected = wallet.sum.saturating_add(score);
        if projected > self.config.limit {
            let denial = WindowDenial {
                used: wallet.sum,
                incoming: score,
                limit: self.config.limit,
                window: self.config.window,
            };
            if wallet.entries.is_empty() {
                wallets.remove(&player);
            }
            return Err(denial);
        }

        wallet.entries.push_back(WindowEntry {
            at: now,
            score,
            job_id,
        });
        wallet.sum = projected;
        Ok(())
    }

    /// Releases the reservation made under `job_id`, if it is still live.
    ///
    /// Keyed strictly on the job id; every reservation carries a unique one.
    pub fn rollback(&self, player: Address, job_id: JobId) {
        let mut wallets = self.lock();
        let Some(wallet) = wallets.get_mut(&player) else {
            return;
        };
        if let Some(index) = wallet
            .entries
            .iter()
            .rposition(|entry| entry.job_id == job_id)
            && let Some(entry) = wallet.entries.remove(index)
        {
            wallet.sum -= entry.score;
        }
        if wallet.entries.is_empty() {
            wallets.remove(&player);
        }
    }

    /// Drops expired entries for every wallet; empty wallets are removed.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut wallets = self.lock();
        wallets.retain(|_, wallet| {
            wallet.purge(self.config.window, now);
            !wallet.entries.is_empty()
        });
    }

    /// Current live sum for a wallet, after a lazy purge.
    pub fn used(&self, player: Address) -> u64 {
        let now = Instant::now();
        let mut wallets = self.lock();
        match wallets.get_mut(&player) {
            Some(wallet) => {
                wallet.purge(self.config.window, now);
                wallet.sum
            }
            None => 0,
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Address, WalletWindow>> {
        self.wallets.lock().expect("window ledger mutex poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::{WindowConfig, WindowLedger};
    use alloy_primitives::Address;
    use std::time::Duration;
    use uuid::Uuid;

    fn ledger(limit: u64) -> WindowLedger {
        WindowLedger::new(WindowConfig {
            window: Duration::from_secs(60),
            limit,
        })
    }

    fn player(seed: u8) -> Address {
        Address::from_slice(&[seed; 20])
    }

    #[test]
    fn reserve_accumulates_until_limit_and_reports_diagnostics() {
        let ledger = ledger(100);
        let wallet = player(0x11);

        ledger.reserve(wallet, 60, Uuid::new_v4()).expect("first fits");
        ledger.reserve(wallet, 40, Uuid::new_v4()).expect("exactly at cap fits");

        let denial = ledger
            .reserve(wallet, 1, Uuid::new_v4())
            .expect_err("over cap must deny");
        assert_eq!(denial.used, 100);
        assert_eq!(denial.incoming, 1);
        assert_eq!(denial.limit, 100);
        assert_eq!(denial.window, Duration::from_secs(60));
        assert_eq!(ledger.used(wallet), 100, "denied reserve must not mutate");
    }

    #[test]
    fn rollback_releases_only_the_matching_job() {
        let ledger = ledger(100);
        let wallet = player(0x22);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        // Same score on both entries: rollback must still pick by job id.
        ledger.reserve(wallet, 30, first).expect("reserve first");
        ledger.reserve(wallet, 30, second).expect("reserve second");

        ledger.rollback(wallet, first);
        assert_eq!(ledger.used(wallet), 30);

        ledger.rollback(wallet, first);
        assert_eq!(ledger.used(wallet), 30, "repeated rollback is a no-op");

        ledger.rollback(wallet, second);
        assert_eq!(ledger.used(wallet), 0);
        assert_eq!(ledger.wallet_count(), 0, "empty wallets are evicted");
    }

    #[test]
    fn expired_entries_fall_out_of_the_sum() {
        let ledger = WindowLedger::new(WindowConfig {
            window: Duration::from_millis(20),
            limit: 100,
        });
        let wallet = player(0x33);

        ledger.reserve(wallet, 80, Uuid::new_v4()).expect("reserve");
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(ledger.used(wallet), 0);
        ledger
            .reserve(wallet, 80, Uuid::new_v4())
            .expect("budget is back after expiry");
    }

    #[test]
    fn purge_expired_sweeps_every_wallet() {
        let ledger = WindowLedger::new(WindowConfig {
            window: Duration::from_millis(10),
            limit: 100,
        });
        ledger.reserve(player(0x44), 10, Uuid::new_v4()).expect("reserve");
        ledger.reserve(player(0x55), 20, Uuid::new_v4()).expect("reserve");
        std::thread::sleep(Duration::from_millis(30));

        ledger.purge_expired();
        assert_eq!(ledger.wallet_count(), 0);
    }

    #[test]
    fn wallets_are_independent() {
        let ledger = ledger(50);
        ledger.reserve(player(0x66), 50, Uuid::new_v4()).expect("reserve");
        ledger
            .reserve(player(0x77), 50, Uuid::new_v4())
            .expect("other wallet has its own budget");
    }
}
