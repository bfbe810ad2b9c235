// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Extraction of board payloads from upstream HTML.
//!
//! The upstream site streams its data as framework flight frames:
//! `self.__next_f.push([1, "<escaped>"])`, where the escaped string unescapes
//! to `<index>:<json-array>` and element 4 of that array is the board object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

const FRAME_MARKER: &str = "self.__next_f.push([1,\"";

/// One upstream page, as embedded in its HTML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BoardPage {
    pub game_id: Option<Value>,
    pub game_name: Option<String>,
    pub last_updated: Option<Value>,
    pub score_pagination: Value,
    pub transaction_pagination: Value,
    pub score_data: Vec<BoardRow>,
    pub transaction_data: Vec<BoardRow>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardRow {
    #[serde(default)]
    pub user_id: Value,
    #[serde(default)]
    pub wallet_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl BoardPage {
    pub fn is_empty(&self) -> bool {
        self.score_data.is_empty() && self.transaction_data.is_empty()
    }

    /// Page count claimed by the page itself, never below 1.
    pub fn total_pages(&self) -> u64 {
        let score = pagination_total(&self.score_pagination);
        let transaction = pagination_total(&self.transaction_pagination);
        score.max(transaction).max(1)
    }

    fn matches_game(&self, game_id: u64) -> bool {
        if self.game_id.as_ref().and_then(value_as_u64) == Some(game_id) {
            return true;
        }
        self.score_data
            .iter()
            .chain(self.transaction_data.iter())
            .any(|row| row.extra.get("gameId").and_then(value_as_u64) == Some(game_id))
    }
}

/// Picks the board payload for `game_id` out of a page's HTML.
pub fn select_board(html: &str, game_id: u64) -> Option<BoardPage> {
    extract_stream_frames(html)
        .iter()
        .filter_map(|frame| board_candidate(frame))
        .filter_map(|value| BoardPage::deserialize(value).ok())
        .find(|page| page.matches_game(game_id))
}

/// All unescaped flight frames embedded in `html`, in document order.
pub fn extract_stream_frames(html: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut rest = html;
    while let Some(at) = rest.find(FRAME_MARKER) {
        let body = &rest[at + FRAME_MARKER.len()..];
        let Some(end) = string_literal_end(body) else {
            break;
        };
        // The literal body uses JSON escaping, so borrowing serde_json's
        // string parser handles \", \\ and \uXXXX in one go.
        if let Ok(frame) = serde_json::from_str::<String>(&format!("\"{}\"", &body[..end])) {
            frames.push(frame);
        }
        rest = &body[end..];
    }
    frames
}

/// Index of the closing quote of a string literal, honoring escapes.
fn string_literal_end(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Board object candidate from one `<index>:<json-array>` frame.
fn board_candidate(frame: &str) -> Option<Value> {
    let (_, payload) = frame.split_once(':')?;
    let value: Value = serde_json::from_str(payload).ok()?;
    let candidate = value.as_array()?.get(3)?.clone();
    let object = candidate.as_object()?;
    if object.contains_key("gameId") || object.contains_key("scoreData") {
        Some(candidate)
    } else {
        None
    }
}

fn pagination_total(pagination: &Value) -> u64 {
    pagination
        .get("totalPages")
        .and_then(value_as_u64)
        .unwrap_or(0)
}

/// Upstream ids arrive as numbers or numeric strings, depending on the field.
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
