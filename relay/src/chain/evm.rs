// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use tokio::time::sleep;
use tracing::{info, warn};

use super::{Chain, ChainError, ChainStatus, FeeQuote, ReceiptSummary};

sol! {
    #[sol(rpc)]
    contract PlayerBoard {
        function updatePlayerData(address player, uint256 scoreAmount, uint256 transactionAmount) external;
        function GAME_ROLE() external view returns (bytes32);
        function hasRole(bytes32 role, address account) external view returns (bool);
    }
}

// Every score update counts as one transaction on the board.
const TRANSACTION_AMOUNT: u64 = 1;

#[derive(Debug, Clone)]
pub struct EvmChainConfig {
    pub rpc_url: String,
    pub private_key: String,
    pub contract_address: Address,
    pub confirmations: u64,
    pub receipt_poll_interval: Duration,
}

/// Alloy-backed [`Chain`] over an HTTP provider with a local signer.
pub struct EvmChain {
    provider: DynProvider,
    contract: Address,
    signer: Address,
    confirmations: u64,
    receipt_poll_interval: Duration,
}

impl EvmChain {
    pub fn connect(config: EvmChainConfig) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = config
            .private_key
            .trim()
            .trim_start_matches("0x")
            .parse()
            .map_err(|err| ChainError::rejected(format!("invalid private key: {err}")))?;
        let signer_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let url = config
            .rpc_url
            .parse()
            .map_err(|err| ChainError::rejected(format!("invalid rpc url: {err}")))?;
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url).erased();

        Ok(Self {
            provider,
            contract: config.contract_address,
            signer: signer_address,
            confirmations: config.confirmations.max(1),
            receipt_poll_interval: config.receipt_poll_interval,
        })
    }

    /// Boot-time snapshot: chain id, head block, and whether the signer holds
    /// the game role. A missing role (or an unreachable node) is a warning,
    /// not a boot failure; the health endpoint keeps reporting afterwards.
    pub async fn announce(&self) {
        match self.status().await {
            Ok(status) => info!(
                chain_id = status.chain_id,
                block_number = status.block_number,
                signer = %self.signer,
                contract = %self.contract,
                "chain reachable"
            ),
            Err(err) => warn!(error = %err, "chain unreachable at boot"),
        }

        let board = PlayerBoard::new(self.contract, self.provider.clone());
        match board.GAME_ROLE().call().await {
            Ok(role) => match board.hasRole(role, self.signer).call().await {
                Ok(true) => info!(signer = %self.signer, "signer holds GAME_ROLE"),
                Ok(false) => warn!(
                    signer = %self.signer,
                    "signer lacks GAME_ROLE; updates will revert until granted"
                ),
                Err(err) => warn!(error = %err, "hasRole probe failed"),
            },
            Err(err) => warn!(error = %err, "GAME_ROLE probe failed"),
        }
    }
}

impl Chain for EvmChain {
    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .map_err(ChainError::transport)
    }

    async fn fee_quote(&self) -> FeeQuote {
        match self.provider.estimate_eip1559_fees().await {
            Ok(estimate) => FeeQuote {
                max_fee_per_gas: Some(estimate.max_fee_per_gas),
                max_priority_fee_per_gas: Some(estimate.max_priority_fee_per_gas),
                gas_price: None,
            },
            Err(err) => {
                warn!(error = %err, "eip-1559 fee estimate failed; trying legacy gas price");
                match self.provider.get_gas_price().await {
                    Ok(price) => FeeQuote {
                        gas_price: Some(price),
                        ..FeeQuote::default()
                    },
                    Err(err) => {
                        warn!(error = %err, "gas price fetch failed; sending without overrides");
                        FeeQuote::default()
                    }
                }
            }
        }
    }

    async fn estimate_update_gas(
        &self,
        player: Address,
        score: u64,
        nonce: u64,
    ) -> Result<u64, ChainError> {
        let board = PlayerBoard::new(self.contract, self.provider.clone());
        board
            .updatePlayerData(player, U256::from(score), U256::from(TRANSACTION_AMOUNT))
            .from(self.signer)
            .nonce(nonce)
            .estimate_gas()
            .await
            .map_err(ChainError::transport)
    }

    async fn send_update(
        &self,
        player: Address,
        score: u64,
        nonce: u64,
        gas_limit: u64,
        fees: FeeQuote,
    ) -> Result<B256, ChainError> {
        let board = PlayerBoard::new(self.contract, self.provider.clone());
        let mut call = board
            .updatePlayerData(player, U256::from(score), U256::from(TRANSACTION_AMOUNT))
            .nonce(nonce)
            .gas(gas_limit);

        if let Some(max_fee) = fees.max_fee_per_gas {
            call = call.max_fee_per_gas(max_fee);
            if let Some(priority) = fees.max_priority_fee_per_gas {
                call = call.max_priority_fee_per_gas(priority);
            }
        } else if let Some(price) = fees.gas_price {
            call = call.gas_price(price);
        }

        let pending = call.send().await.map_err(ChainError::rejected)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_receipt(&self, tx_hash: B256) -> Result<ReceiptSummary, ChainError> {
        loop {
            if let Some(receipt) = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(ChainError::transport)?
            {
                let block_number = receipt.block_number.unwrap_or_default();
                if self.confirmations > 1 {
                    let target = block_number + self.confirmations - 1;
                    loop {
                        let head = self
                            .provider
                            .get_block_number()
                            .await
                            .map_err(ChainError::transport)?;
                        if head >= target {
                            break;
                        }
                        sleep(self.receipt_poll_interval).await;
                    }
                }
                return Ok(ReceiptSummary {
                    tx_hash,
                    block_number,
                    status: u64::from(receipt.status()),
                    gas_used: receipt.gas_used,
                    from: receipt.from,
                    to: receipt.to,
                });
            }
            sleep(self.receipt_poll_interval).await;
        }
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    async fn status(&self) -> Result<ChainStatus, ChainError> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .map_err(ChainError::transport)?;
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(ChainError::transport)?;
        Ok(ChainStatus {
            chain_id,
            block_number,
        })
    }
}
