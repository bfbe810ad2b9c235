// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tracing_subscriber::EnvFilter;

use relay::accounts::AccountsClient;
use relay::api::{AppState, RelayLimits};
use relay::chain::{EvmChain, EvmChainConfig};
use relay::dispatch::{DispatchConfig, DispatchLane, PendingQueue};
use relay::jobs::JobRegistry;
use relay::leaderboard::{LeaderboardClient, LeaderboardConfig};
use score_core::window::{WindowConfig, WindowLedger};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SCORE_WINDOW_MS: u64 = 60_000;
const DEFAULT_SCORE_PER_MIN_LIMIT: u64 = 10_000;
const DEFAULT_MIN_SCORE_EVENT: u64 = 0;
const DEFAULT_MAX_SCORE_EVENT: u64 = 100;
const DEFAULT_TX_CONFIRMATIONS: u64 = 1;
const DEFAULT_TX_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_BATCH_INTERVAL_MS: u64 = 5_000;
const DEFAULT_RESPOND_AFTER_MS: u64 = 5_000;
const DEFAULT_LEADERBOARD_CACHE_MS: u64 = 15_000;
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_GAS_ESTIMATE_FALLBACK: u64 = 120_000;
const DEFAULT_MAX_PAGE_WALK: u64 = 50;
const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 10_000;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
const JOB_TTL: Duration = Duration::from_secs(15 * 60);
const JOB_EVICT_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let chain = Arc::new(EvmChain::connect(EvmChainConfig {
        rpc_url: config.rpc_url.clone(),
        private_key: config.private_key.clone(),
        contract_address: config.contract_address,
        confirmations: config.confirmations,
        receipt_poll_interval: RECEIPT_POLL_INTERVAL,
    })?);
    chain.announce().await;

    let ledger = Arc::new(WindowLedger::new(WindowConfig {
        window: config.window,
        limit: config.per_window_limit,
    }));
    let jobs = Arc::new(JobRegistry::new(JOB_TTL));
    let queue = Arc::new(PendingQueue::new());

    let lane = DispatchLane::new(
        Arc::clone(&chain),
        Arc::clone(&queue),
        Arc::clone(&jobs),
        Arc::clone(&ledger),
        DispatchConfig {
            batch_interval: config.batch_interval,
            ack_after: config.respond_after,
            tx_timeout: config.tx_timeout,
            gas_estimate_fallback: DEFAULT_GAS_ESTIMATE_FALLBACK,
        },
    );
    let (mut lane_handle, lane_stop) = lane.spawn();

    spawn_janitors(Arc::clone(&jobs), Arc::clone(&ledger), config.window);

    let leaderboard = Arc::new(LeaderboardClient::new(LeaderboardConfig {
        base_url: config.leaderboard_base.clone(),
        cache_ttl: config.leaderboard_cache_ttl,
        max_page_walk: DEFAULT_MAX_PAGE_WALK,
        request_timeout: config.upstream_timeout,
    }));
    let accounts = Arc::new(AccountsClient::new(
        config.leaderboard_base.clone(),
        config.upstream_timeout,
    ));

    let state = Arc::new(AppState {
        chain,
        queue,
        jobs,
        ledger,
        leaderboard,
        accounts,
        limits: RelayLimits {
            window: config.window,
            per_window_limit: config.per_window_limit,
            event_min: config.event_min,
            event_max: config.event_max,
            confirmations: config.confirmations,
            tx_timeout: config.tx_timeout,
            batch_interval: config.batch_interval,
            respond_after: config.respond_after,
            hard_timeout: config.hard_timeout,
        },
    });

    let app = relay::api::router(state, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;

    tracing::info!(port = config.port, "listening");
    tokio::select! {
        server_result = axum::serve(listener, app) => {
            lane_stop.request_shutdown();
            lane_handle.await?;
            server_result?;
        }
        lane_result = &mut lane_handle => {
            lane_result?;
            return Err("dispatch lane exited unexpectedly".into());
        }
    }

    Ok(())
}

fn spawn_janitors(jobs: Arc<JobRegistry>, ledger: Arc<WindowLedger>, window: Duration) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(JOB_EVICT_INTERVAL);
        loop {
            tick.tick().await;
            let evicted = jobs.evict_expired();
            if evicted > 0 {
                tracing::debug!(evicted, "evicted expired job records");
            }
        }
    });

    let sweep = window.min(Duration::from_secs(30)).max(Duration::from_millis(100));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweep);
        loop {
            tick.tick().await;
            ledger.purge_expired();
        }
    });
}

struct Config {
    rpc_url: String,
    private_key: String,
    contract_address: Address,
    port: u16,
    window: Duration,
    per_window_limit: u64,
    event_min: u64,
    event_max: u64,
    confirmations: u64,
    tx_timeout: Duration,
    batch_interval: Duration,
    respond_after: Duration,
    hard_timeout: Duration,
    leaderboard_base: String,
    leaderboard_cache_ttl: Duration,
    upstream_timeout: Duration,
    max_body_bytes: usize,
}

impl Config {
    fn from_env() -> Result<Self, String> {
        let batch_interval_ms = env_u64("BATCH_INTERVAL_MS", DEFAULT_BATCH_INTERVAL_MS).max(1);
        let respond_after_ms = env_u64("RESPOND_AFTER_MS", DEFAULT_RESPOND_AFTER_MS).max(1);
        // A reply is guaranteed one batch plus one ack window plus slack after
        // intake, even if the dispatcher never touches the item.
        let hard_timeout_ms = env_u64(
            "REQUEST_HARD_TIMEOUT_MS",
            batch_interval_ms + respond_after_ms + 5_000,
        )
        .max(1);

        let contract_address = env_required("CONTRACT_ADDRESS")?
            .parse::<Address>()
            .map_err(|err| format!("CONTRACT_ADDRESS is not a valid address: {err}"))?;

        let event_min = env_u64("MIN_SCORE_EVENT", DEFAULT_MIN_SCORE_EVENT);
        let event_max = env_u64("MAX_SCORE_EVENT", DEFAULT_MAX_SCORE_EVENT);
        if event_min > event_max {
            return Err(format!(
                "MIN_SCORE_EVENT {event_min} exceeds MAX_SCORE_EVENT {event_max}"
            ));
        }

        let leaderboard_base = env_string("LEADERBOARD_BASE", "");
        if leaderboard_base.trim().is_empty() {
            tracing::warn!("LEADERBOARD_BASE is not set; leaderboard and unlock paths will fail");
        }

        Ok(Self {
            rpc_url: env_required("RPC_URL")?,
            private_key: env_required("PRIVATE_KEY")?,
            contract_address,
            port: env_u64("PORT", u64::from(DEFAULT_PORT)) as u16,
            window: Duration::from_millis(
                env_u64("SCORE_WINDOW_MS", DEFAULT_SCORE_WINDOW_MS).max(1),
            ),
            per_window_limit: env_u64("SCORE_PER_MIN_LIMIT", DEFAULT_SCORE_PER_MIN_LIMIT),
            event_min,
            event_max,
            confirmations: env_u64("TX_CONFIRMATIONS", DEFAULT_TX_CONFIRMATIONS).max(1),
            tx_timeout: Duration::from_millis(env_u64("TX_TIMEOUT_MS", DEFAULT_TX_TIMEOUT_MS)),
            batch_interval: Duration::from_millis(batch_interval_ms),
            respond_after: Duration::from_millis(respond_after_ms),
            hard_timeout: Duration::from_millis(hard_timeout_ms),
            leaderboard_base,
            leaderboard_cache_ttl: Duration::from_millis(env_u64(
                "LEADERBOARD_CACHE_MS",
                DEFAULT_LEADERBOARD_CACHE_MS,
            )),
            upstream_timeout: Duration::from_millis(env_u64(
                "UPSTREAM_TIMEOUT_MS",
                DEFAULT_UPSTREAM_TIMEOUT_MS,
            )),
            max_body_bytes: env_usize("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| format!("required environment variable {key} is not set"))
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}
