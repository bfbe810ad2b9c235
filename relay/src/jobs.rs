// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use score_core::job::{JobId, JobRecord};
use uuid::Uuid;

/// Concurrent map of job id to lifecycle record.
///
/// Writers are the intake (create) and the dispatch lane (update); the job
/// status endpoint reads. Per-key locking comes from the shard map, so a
/// mutator runs atomically with respect to readers of the same record.
pub struct JobRegistry {
    jobs: DashMap<JobId, JobRecord>,
    ttl: Duration,
}

impl JobRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            jobs: DashMap::new(),
            ttl,
        }
    }

    pub fn create(&self, player: Address, score: u64, unlock_all: bool) -> JobId {
        let id = Uuid::new_v4();
        self.put(id, JobRecord::new_queued(player, score, unlock_all));
        id
    }

    /// Inserts a record under a caller-generated id (the intake generates the
    /// id first so the ledger reservation can reference it).
    pub fn put(&self, id: JobId, record: JobRecord) {
        self.jobs.insert(id, record);
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.clone())
    }

    pub fn update(&self, id: &JobId, mutate: impl FnOnce(&mut JobRecord)) {
        if let Some(mut entry) = self.jobs.get_mut(id) {
            mutate(&mut entry);
        }
    }

    /// Drops records older than the registry TTL; returns how many went.
    pub fn evict_expired(&self) -> usize {
        let before = self.jobs.len();
        let ttl = self.ttl;
        self.jobs.retain(|_, record| record.age() < ttl);
        before - self.jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
