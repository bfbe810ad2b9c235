// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod parse;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

pub use parse::{BoardPage, BoardRow, select_board, value_as_u64};

#[derive(Debug, Error)]
pub enum LeaderboardError {
    #[error("leaderboard base url is not configured")]
    Unconfigured,
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status} for page {page}")]
    Status { status: u16, page: u64 },
    #[error("no board payload for game {game_id} on page 1")]
    NoBoard { game_id: u64 },
}

#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    pub base_url: String,
    pub cache_ttl: Duration,
    pub max_page_walk: u64,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBoard {
    pub ok: bool,
    pub game_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Value>,
    pub score_pagination: Value,
    pub transaction_pagination: Value,
    pub score_data: Vec<BoardRow>,
    pub transaction_data: Vec<BoardRow>,
    pub source: BoardSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSource {
    pub base: String,
    pub pages: u64,
    pub fetched_at: u64,
}

struct CacheSlot {
    fetched_at: Instant,
    board: AggregatedBoard,
}

/// Multi-page aggregator over the upstream leaderboard site, with a TTL cache
/// keyed by game id. Page walks stop early on a doubly-empty page and keep
/// partial results on any upstream or parse error past page 1.
pub struct LeaderboardClient {
    http: reqwest::Client,
    config: LeaderboardConfig,
    cache: Mutex<HashMap<u64, CacheSlot>>,
}

impl LeaderboardClient {
    pub fn new(config: LeaderboardConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self {
            http,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn aggregate(&self, game_id: u64) -> Result<AggregatedBoard, LeaderboardError> {
        if let Some(hit) = self.cache_hit(game_id) {
            return Ok(hit);
        }

        let board = self.walk_pages(game_id).await?;
        let mut cache = self.lock_cache();
        cache.insert(
            game_id,
            CacheSlot {
                fetched_at: Instant::now(),
                board: board.clone(),
            },
        );
        Ok(board)
    }

    /// Cache-aware current score of `player` on the board; 0 when absent.
    pub async fn wallet_score(
        &self,
        game_id: u64,
        player: Address,
    ) -> Result<u64, LeaderboardError> {
        let board = self.aggregate(game_id).await?;
        let wanted = format!("{player:#x}");
        let score = board
            .score_data
            .iter()
            .find(|row| row.wallet_address.eq_ignore_ascii_case(&wanted))
            .and_then(|row| row.score.as_ref())
            .and_then(value_as_u64)
            .unwrap_or(0);
        Ok(score)
    }

    fn cache_hit(&self, game_id: u64) -> Option<AggregatedBoard> {
        let cache = self.lock_cache();
        let slot = cache.get(&game_id)?;
        let age = slot.fetched_at.elapsed();
        if age >= self.config.cache_ttl {
            return None;
        }
        let mut board = slot.board.clone();
        board.cached = Some(true);
        board.cache_ms = Some(age.as_millis() as u64);
        Some(board)
    }

    async fn walk_pages(&self, game_id: u64) -> Result<AggregatedBoard, LeaderboardError> {
        let first_html = self.fetch_page(game_id, 1).await?;
        let first = select_board(&first_html, game_id)
            .ok_or(LeaderboardError::NoBoard { game_id })?;

        let planned = first.total_pages().min(self.config.max_page_walk);
        let mut score_seen = HashSet::new();
        let mut transaction_seen = HashSet::new();
        let mut score_data = Vec::new();
        let mut transaction_data = Vec::new();
        merge_rows(&mut score_data, &mut score_seen, first.score_data.clone());
        merge_rows(
            &mut transaction_data,
            &mut transaction_seen,
            first.transaction_data.clone(),
        );

        let mut walked = 1;
        for page in 2..=planned {
            let html = match self.fetch_page(game_id, page).await {
                Ok(html) => html,
                Err(err) => {
                    warn!(game_id, page, error = %err, "page walk stopped; keeping partial board");
                    break;
                }
            };
            let Some(parsed) = select_board(&html, game_id) else {
                warn!(game_id, page, "page had no board payload; keeping partial board");
                break;
            };
            walked = page;
            if parsed.is_empty() {
                debug!(game_id, page, "empty page ends the walk early");
                break;
            }
            merge_rows(&mut score_data, &mut score_seen, parsed.score_data);
            merge_rows(
                &mut transaction_data,
                &mut transaction_seen,
                parsed.transaction_data,
            );
        }

        sort_by_rank(&mut score_data);
        sort_by_rank(&mut transaction_data);

        Ok(AggregatedBoard {
            ok: true,
            game_id,
            game_name: first.game_name,
            last_updated: first.last_updated,
            score_pagination: first.score_pagination,
            transaction_pagination: first.transaction_pagination,
            score_data,
            transaction_data,
            source: BoardSource {
                base: self.config.base_url.clone(),
                pages: walked,
                fetched_at: unix_millis(),
            },
            cached: None,
            cache_ms: None,
        })
    }

    async fn fetch_page(&self, game_id: u64, page: u64) -> Result<String, LeaderboardError> {
        let base = self.config.base_url.trim_end_matches('/');
        if base.is_empty() {
            return Err(LeaderboardError::Unconfigured);
        }
        let url = format!("{base}/game/{game_id}?page={page}");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(LeaderboardError::Status {
                status: response.status().as_u16(),
                page,
            });
        }
        Ok(response.text().await?)
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<u64, CacheSlot>> {
        self.cache.lock().expect("leaderboard cache mutex poisoned")
    }
}

fn merge_rows(dest: &mut Vec<BoardRow>, seen: &mut HashSet<(String, String)>, rows: Vec<BoardRow>) {
    for row in rows {
        let key = (row.user_id.to_string(), row.wallet_address.to_lowercase());
        if seen.insert(key) {
            dest.push(row);
        }
    }
}

fn sort_by_rank(rows: &mut [BoardRow]) {
    rows.sort_by_key(|row| row.rank.unwrap_or(u64::MAX));
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::{BoardRow, merge_rows, sort_by_rank};
    use serde_json::json;
    use std::collections::HashSet;

    fn row(user_id: u64, wallet: &str, rank: Option<u64>) -> BoardRow {
        BoardRow {
            user_id: json!(user_id),
            wallet_address: wallet.to_string(),
            rank,
            score: Some(json!(10)),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn merge_drops_duplicate_user_and_wallet_pairs() {
        let mut dest = Vec::new();
        let mut seen = HashSet::new();

        merge_rows(
            &mut dest,
            &mut seen,
            vec![row(1, "0xAA", Some(1)), row(2, "0xbb", Some(2))],
        );
        // Same user, same wallet with different casing: a duplicate.
        merge_rows(
            &mut dest,
            &mut seen,
            vec![row(1, "0xaa", Some(9)), row(3, "0xaa", Some(3))],
        );

        assert_eq!(dest.len(), 3);
        let pairs: Vec<(String, String)> = dest
            .iter()
            .map(|r| (r.user_id.to_string(), r.wallet_address.to_lowercase()))
            .collect();
        let unique: HashSet<_> = pairs.iter().cloned().collect();
        assert_eq!(pairs.len(), unique.len());
    }

    #[test]
    fn rows_sort_by_rank_with_unranked_last() {
        let mut rows = vec![row(1, "0xaa", Some(3)), row(2, "0xbb", None), row(3, "0xcc", Some(1))];
        sort_by_rank(&mut rows);

        let order: Vec<Option<u64>> = rows.iter().map(|r| r.rank).collect();
        assert_eq!(order, vec![Some(1), Some(3), None]);
    }
}
