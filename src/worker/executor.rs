//! Worker Pool Implementation
//!
//! Spawns workers that repeatedly claim the lowest pending chunk through the
//! coordinator and search it on a blocking thread.
//!
//! ## Worker States
//! `Idle -> Searching -> Idle` after a completed or aborted chunk,
//! `Searching -> Stopped` on a match or when the cluster is terminal, and
//! `Idle -> Exhausted` once every chunk is completed without a match.

use super::search::{ChunkOutcome, SearchRequest, search_range};
use crate::cluster::ClaimedChunk;
use crate::coordinator::Coordinator;

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Searching,
    /// A match was found, here or elsewhere, or the peer is shutting down.
    Stopped,
    /// Every chunk is completed and none matched.
    Exhausted,
}

pub struct WorkerPool {
    coordinator: Arc<Coordinator>,
    worker_count: usize,
    poll_interval: u64,
}

impl WorkerPool {
    pub fn new(coordinator: Arc<Coordinator>, worker_count: usize, poll_interval: u64) -> Arc<Self> {
        Arc::new(Self {
            coordinator,
            worker_count: worker_count.max(1),
            poll_interval,
        })
    }

    /// Spawns the workers and returns their handles. Each resolves to the
    /// worker's final state.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<WorkerState>> {
        tracing::info!("Starting {} search workers", self.worker_count);

        (0..self.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.worker_loop(worker_id).await })
            })
            .collect()
    }

    /// Runs the pool to the end. `Stopped` wins over `Exhausted`.
    pub async fn run(self: &Arc<Self>) -> WorkerState {
        let mut result = WorkerState::Exhausted;
        for handle in self.start() {
            match handle.await {
                Ok(WorkerState::Exhausted) => {}
                Ok(_) => result = WorkerState::Stopped,
                Err(e) => {
                    tracing::error!("Worker task failed: {}", e);
                    result = WorkerState::Stopped;
                }
            }
        }
        result
    }

    async fn worker_loop(&self, worker_id: usize) -> WorkerState {
        tracing::debug!("Worker {} started", worker_id);
        let shutdown = self.coordinator.shutdown_token();
        let idle_wait = self.coordinator.timings().target_poll();
        let mut state = WorkerState::Idle;

        loop {
            if self.coordinator.is_terminal() || shutdown.is_cancelled() {
                tracing::info!("Worker {} stopped", worker_id);
                return WorkerState::Stopped;
            }

            let Some(claimed) = self.coordinator.claim_next_chunk().await else {
                if self.coordinator.status_snapshot().exhausted() {
                    tracing::info!("Worker {} finished: every chunk searched", worker_id);
                    return WorkerState::Exhausted;
                }
                // No Target yet, or the rest is claimed by others.
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(idle_wait) => {}
                }
                continue;
            };

            state = transition(worker_id, state, WorkerState::Searching);
            let chunk_id = claimed.chunk.id;

            match self.search(claimed).await {
                Ok(ChunkOutcome::Exhausted) => {
                    self.coordinator.report_complete(chunk_id).await;
                }
                Ok(ChunkOutcome::Found { index, candidate }) => {
                    tracing::info!(
                        "Worker {} matched index {} in chunk {}",
                        worker_id,
                        index,
                        chunk_id
                    );
                    self.coordinator.report_found(chunk_id, &candidate).await;
                    return transition(worker_id, state, WorkerState::Stopped);
                }
                Ok(ChunkOutcome::Aborted { tested }) => {
                    tracing::debug!(
                        "Worker {} abandoned chunk {} after {} candidates",
                        worker_id,
                        chunk_id,
                        tested
                    );
                    self.coordinator.release(chunk_id).await;
                }
                Ok(ChunkOutcome::Terminated { .. }) => {
                    return transition(worker_id, state, WorkerState::Stopped);
                }
                Err(e) => {
                    tracing::warn!("Worker {} failed on chunk {}: {}", worker_id, chunk_id, e);
                    self.coordinator.release(chunk_id).await;
                    tokio::time::sleep(idle_wait).await;
                }
            }

            state = transition(worker_id, state, WorkerState::Idle);
        }
    }

    async fn search(&self, claimed: ClaimedChunk) -> Result<ChunkOutcome> {
        let terminal = self.coordinator.cluster().terminal_token();
        let poll_interval = self.poll_interval;

        let outcome = tokio::task::spawn_blocking(move || {
            let hasher = claimed.algorithm.fingerprinter();
            search_range(&SearchRequest {
                space: claimed.space.as_ref(),
                chunk: claimed.chunk,
                fingerprint: claimed.fingerprint.as_bytes(),
                hasher: hasher.as_ref(),
                cancel: &claimed.token,
                terminal: &terminal,
                poll_interval,
            })
        })
        .await??;

        Ok(outcome)
    }
}

fn transition(worker_id: usize, from: WorkerState, to: WorkerState) -> WorkerState {
    if from != to {
        tracing::trace!("Worker {}: {:?} -> {:?}", worker_id, from, to);
    }
    to
}
