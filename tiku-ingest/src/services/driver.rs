//! Convergence driver
//!
//! The control loop: SCANNING → DISPATCHING → PERSISTING, looping until the
//! scanner finds nothing incomplete or progress stalls. Every stop condition
//! is named; neither a stall nor the round ceiling is an error, because a
//! cold re-run against the flushed store resumes exactly where this run
//! stopped.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;

use crate::models::{
    Catalog, ExtractionField, RunReport, RunSession, RunState, StopReason, WorkItem,
};
use crate::services::asset_resolver::AssetResolver;
use crate::services::checkpoint_store::CheckpointStore;
use crate::services::scanner;
use crate::services::validator::Normalizer;
use crate::services::voter::{Consensus, ConsensusVoter, VoteOutcome};

/// Driver tunables
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Concurrent voter calls per batch; 1 = fully sequential
    pub batch_size: usize,
    /// Consecutive zero-acceptance rounds before stopping as stalled
    pub stall_rounds: u32,
    /// Hard round ceiling, independent of the stall condition
    pub max_rounds: u32,
    /// Shuffle the work list each round to avoid bias toward early items
    pub shuffle: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            stall_rounds: 3,
            max_rounds: 200,
            shuffle: false,
        }
    }
}

/// Drives one field's extraction to convergence
pub struct ConvergenceDriver {
    catalog: Catalog,
    resolver: AssetResolver,
    store: CheckpointStore,
    voter: ConsensusVoter,
    normalizer: Normalizer,
    config: DriverConfig,
    session: RunSession,
}

impl ConvergenceDriver {
    pub fn new(
        field: ExtractionField,
        catalog: Catalog,
        resolver: AssetResolver,
        store: CheckpointStore,
        voter: ConsensusVoter,
        normalizer: Normalizer,
        config: DriverConfig,
    ) -> Self {
        Self {
            catalog,
            resolver,
            store,
            voter,
            normalizer,
            config,
            session: RunSession::new(field),
        }
    }

    pub fn session(&self) -> &RunSession {
        &self.session
    }

    /// Run rounds until a stop condition fires, then report
    pub async fn run(mut self) -> Result<RunReport> {
        tracing::info!(
            session_id = %self.session.session_id,
            field = %self.session.field,
            total_items = self.catalog.total_items(),
            store_entries = self.store.len(),
            "Starting convergence run"
        );

        let mut zero_rounds = 0u32;
        let mut fallback_keys: Vec<String> = Vec::new();

        let stop_reason = loop {
            self.session.transition_to(RunState::Scanning);
            let mut pending =
                scanner::incomplete_items(&self.catalog, &self.store, &self.normalizer);

            if pending.is_empty() {
                break StopReason::Success;
            }

            if self.config.shuffle {
                pending.shuffle(&mut rand::thread_rng());
            }

            self.session.round += 1;
            tracing::info!(
                session_id = %self.session.session_id,
                round = self.session.round,
                pending = pending.len(),
                "Round scan complete"
            );

            self.session.transition_to(RunState::Dispatching);
            let mut accepted: Vec<(WorkItem, VoteOutcome)> = Vec::new();
            for batch in pending.chunks(self.config.batch_size.max(1)) {
                accepted.extend(self.dispatch_batch(batch).await);
            }

            self.session.transition_to(RunState::Persisting);
            for (item, outcome) in &accepted {
                if outcome.consensus == Consensus::LongestFallback {
                    fallback_keys.push(item.key());
                }
                tracing::info!(
                    session_id = %self.session.session_id,
                    item = %item,
                    consensus = outcome.consensus.label(),
                    attempts = outcome.attempts,
                    "Accepted value"
                );
                self.store
                    .upsert(item.key(), outcome.value.clone())
                    .with_context(|| format!("persisting accepted value for {}", item))?;
            }
            self.store.flush().context("flushing checkpoint store")?;
            self.session.accepted_total += accepted.len();

            tracing::info!(
                session_id = %self.session.session_id,
                round = self.session.round,
                accepted = accepted.len(),
                store_entries = self.store.len(),
                "Round complete"
            );

            if accepted.is_empty() {
                zero_rounds += 1;
            } else {
                zero_rounds = 0;
            }

            if zero_rounds >= self.config.stall_rounds {
                break StopReason::Stalled { rounds: zero_rounds };
            }
            if self.session.round >= self.config.max_rounds {
                break StopReason::CeilingReached;
            }
        };

        self.session.stop(stop_reason);

        let groups = scanner::completion_by_group(&self.catalog, &self.store, &self.normalizer);

        tracing::info!(
            session_id = %self.session.session_id,
            reason = ?stop_reason,
            rounds = self.session.round,
            accepted_total = self.session.accepted_total,
            "Convergence run stopped"
        );
        for completion in &groups {
            tracing::info!(
                session_id = %self.session.session_id,
                group = completion.group,
                complete = completion.complete,
                total = completion.total,
                "Group completion"
            );
        }

        Ok(RunReport {
            session_id: self.session.session_id,
            field: self.session.field,
            stop_reason,
            rounds: self.session.round,
            accepted_total: self.session.accepted_total,
            groups,
            fallback_keys,
        })
    }

    /// Vote one batch of items concurrently.
    ///
    /// Items that fail for any reason (no asset, unreadable file, no
    /// surviving candidate) simply produce nothing; one item's failure never
    /// blocks another's.
    async fn dispatch_batch(&self, batch: &[WorkItem]) -> Vec<(WorkItem, VoteOutcome)> {
        let prompt = self.session.field.prompt();

        let futures = batch.iter().map(|&item| async move {
            let path = match self.resolver.resolve(&item) {
                Some(path) => path,
                None => return None,
            };

            let image = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(
                        item = %item,
                        path = %path.display(),
                        error = %e,
                        "Failed to read asset"
                    );
                    return None;
                }
            };

            self.voter
                .vote(&item, &image, prompt)
                .await
                .map(|outcome| (item, outcome))
        });

        futures::future::join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}
