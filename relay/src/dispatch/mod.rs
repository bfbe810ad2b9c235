// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

mod lane;
mod types;

pub use lane::{DispatchConfig, DispatchLane, DispatchStop, codes};
pub use types::{MinedReply, PendingQueue, Reply, Responder, Submission};
