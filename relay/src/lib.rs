// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Score-submission relay between untrusted game clients and an EVM contract.
//!
//! Flow: API -> window ledger -> pending queue -> dispatch lane -> chain.
//! The dispatch lane is the single writer that owns the signer nonce sequence;
//! receipt waits run in parallel while sends stay strictly ordered.
pub mod accounts;
pub mod api;
pub mod chain;
pub mod dispatch;
pub mod jobs;
pub mod leaderboard;
