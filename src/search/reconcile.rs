//! Full rebuild of the index from the authoritative record set

use crate::error::Result;
use crate::models::Challenge;
use crate::search::keys::{Keyspace, Registry};
use crate::search::writer::IndexWriter;
use crate::state::{IndexStore, StoreOp};
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// Supplies the full set of live challenges
#[async_trait]
pub trait ChallengeSource: Send + Sync {
    async fn all_challenges(&self) -> Result<Vec<Challenge>>;
}

#[async_trait]
impl ChallengeSource for Vec<Challenge> {
    async fn all_challenges(&self) -> Result<Vec<Challenge>> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Indexed ids absent from the source
    pub stale_removed: usize,
    /// Challenges (re)indexed
    pub indexed: usize,
    /// Challenges rejected by validation
    pub skipped: usize,
    pub duration_ms: u64,
}

pub struct Reconciler {
    store: Arc<dyn IndexStore>,
    keys: Keyspace,
    writer: Arc<IndexWriter>,
    concurrency: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn IndexStore>,
        keys: Keyspace,
        writer: Arc<IndexWriter>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            keys,
            writer,
            concurrency: concurrency.max(1),
        }
    }

    /// Make the index reflect exactly `challenges`.
    ///
    /// Stale ids are removed, facet registries are rebuilt from the live
    /// records, and every record is upserted. When an id appears more than
    /// once the last occurrence wins.
    pub async fn reconcile(&self, challenges: &[Challenge]) -> Result<ReconcileReport> {
        let start = Instant::now();

        let mut latest: HashMap<&str, &Challenge> = HashMap::with_capacity(challenges.len());
        for challenge in challenges {
            latest.insert(challenge.challenge_id.as_str(), challenge);
        }
        if latest.len() < challenges.len() {
            warn!(
                records = challenges.len(),
                unique = latest.len(),
                "Duplicate challenge ids in reconcile input, keeping the last of each"
            );
        }

        // ids can outlive their payload in the facet sets
        let mut indexed: HashSet<String> = self
            .store
            .hkeys(&self.keys.raw_data())
            .await?
            .into_iter()
            .collect();
        indexed.extend(self.store.smembers(&self.keys.all()).await?);
        let stale: Vec<&String> = indexed
            .iter()
            .filter(|id| !latest.contains_key(id.as_str()))
            .collect();

        for id in &stale {
            self.writer.remove(id).await?;
        }

        self.store
            .apply(
                Registry::iter()
                    .map(|registry| StoreOp::del(self.keys.registry(registry)))
                    .collect(),
            )
            .await?;

        let outcomes: Vec<bool> = stream::iter(latest.into_values().cloned())
            .map(|challenge: Challenge| async move {
                match self.writer.upsert(&challenge).await {
                    Ok(()) => Ok(true),
                    Err(e) if e.is_caller_error() => {
                        warn!(
                            challenge_id = %challenge.challenge_id,
                            error = %e,
                            "Skipping invalid challenge during reconcile"
                        );
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            })
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let indexed_count = outcomes.iter().filter(|ok| **ok).count();
        let report = ReconcileReport {
            stale_removed: stale.len(),
            indexed: indexed_count,
            skipped: outcomes.len() - indexed_count,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            stale_removed = report.stale_removed,
            indexed = report.indexed,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "Index reconciled"
        );

        Ok(report)
    }

    pub async fn reconcile_from(&self, source: &dyn ChallengeSource) -> Result<ReconcileReport> {
        let challenges = source.all_challenges().await?;
        self.reconcile(&challenges).await
    }

    /// Reconcile from `source` every `period`, starting immediately
    pub fn spawn_periodic(
        self: Arc<Self>,
        source: Arc<dyn ChallengeSource>,
        period: Duration,
    ) -> JoinHandle<()> {
        info!(period_secs = period.as_secs(), "Starting periodic reconcile");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if let Err(e) = self.reconcile_from(source.as_ref()).await {
                    error!(error = %e, "Periodic reconcile failed");
                }
            }
        })
    }
}
