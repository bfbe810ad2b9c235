// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod evm;

use std::future::Future;

use alloy::primitives::{Address, B256};
use thiserror::Error;

pub use evm::{EvmChain, EvmChainConfig};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("rpc transport: {reason}")]
    Transport { reason: String },
    #[error("transaction rejected: {reason}")]
    Rejected { reason: String },
}

impl ChainError {
    pub fn transport(reason: impl ToString) -> Self {
        Self::Transport {
            reason: reason.to_string(),
        }
    }

    pub fn rejected(reason: impl ToString) -> Self {
        Self::Rejected {
            reason: reason.to_string(),
        }
    }
}

/// Fee overrides for one batch. Every field is optional: an RPC that cannot
/// quote EIP-1559 fees degrades to a legacy gas price, and a node that can
/// quote neither leaves pricing to the signer defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeeQuote {
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

/// Chain-confirmed outcome of a sent transaction.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptSummary {
    pub tx_hash: B256,
    pub block_number: u64,
    pub status: u64,
    pub gas_used: u64,
    pub from: Address,
    pub to: Option<Address>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChainStatus {
    pub chain_id: u64,
    pub block_number: u64,
}

/// Everything the dispatch lane needs from the EVM node and signer.
///
/// The lane is generic over this trait so its ordering and rollback rules can
/// be exercised against a scripted chain; `EvmChain` is the production
/// implementation.
pub trait Chain: Send + Sync + 'static {
    /// Signer transaction count at the pending block tag.
    fn pending_nonce(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Best-effort fee data for the coming batch; never fails the batch.
    fn fee_quote(&self) -> impl Future<Output = FeeQuote> + Send;

    fn estimate_update_gas(
        &self,
        player: Address,
        score: u64,
        nonce: u64,
    ) -> impl Future<Output = Result<u64, ChainError>> + Send;

    /// Submits the update and returns once the node acknowledges the send.
    /// The receipt is observed separately through [`Chain::wait_receipt`].
    fn send_update(
        &self,
        player: Address,
        score: u64,
        nonce: u64,
        gas_limit: u64,
        fees: FeeQuote,
    ) -> impl Future<Output = Result<B256, ChainError>> + Send;

    /// Waits for the receipt of `tx_hash`. Callers bound this with a timeout.
    fn wait_receipt(
        &self,
        tx_hash: B256,
    ) -> impl Future<Output = Result<ReceiptSummary, ChainError>> + Send;

    fn signer_address(&self) -> Address;

    fn status(&self) -> impl Future<Output = Result<ChainStatus, ChainError>> + Send;
}
