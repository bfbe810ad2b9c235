// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Domain state for the score-submission relay.
//!
//! The window ledger enforces the per-wallet anti-cheat budget; job records
//! track a submission from intake to its on-chain fate. Neither depends on an
//! async runtime, so both can be exercised directly from unit tests.
pub mod job;
pub mod window;
