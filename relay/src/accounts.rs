// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Wallet-has-username probe against the upstream account service.
//! Used only by the privileged unlock path.

use std::time::Duration;

use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("accounts base url is not configured")]
    Unconfigured,
    #[error("wallet probe transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("wallet probe returned {status}")]
    Status { status: u16 },
}

#[derive(Debug, Deserialize)]
struct UsernameProbeResponse {
    #[serde(rename = "hasUsername")]
    has_username: bool,
}

pub struct AccountsClient {
    http: reqwest::Client,
    base_url: String,
}

impl AccountsClient {
    pub fn new(base_url: String, request_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { http, base_url }
    }

    pub async fn wallet_has_username(&self, wallet: Address) -> Result<bool, AccountsError> {
        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(AccountsError::Unconfigured);
        }
        let url = format!("{base}/api/wallet/{wallet:#x}/username");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AccountsError::Status {
                status: response.status().as_u16(),
            });
        }
        let body: UsernameProbeResponse = response.json().await?;
        Ok(body.has_username)
    }
}
