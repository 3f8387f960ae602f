//! Main challenge index service

use crate::config::{Config, IndexConfig};
use crate::error::{AppError, Result};
use crate::models::Challenge;
use crate::search::keys::{Keyspace, Registry};
use crate::search::planner::QueryPlanner;
use crate::search::query::SearchRequest;
use crate::search::reconcile::{ChallengeSource, ReconcileReport, Reconciler};
use crate::search::sorter::ResultSorter;
use crate::search::writer::IndexWriter;
use crate::state::{create_store, IndexStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Faceted, phonetic search over challenges backed by an [`IndexStore`]
#[derive(Clone)]
pub struct ChallengeIndex {
    store: Arc<dyn IndexStore>,
    keys: Keyspace,
    config: Arc<IndexConfig>,
    writer: Arc<IndexWriter>,
    planner: Arc<QueryPlanner>,
    sorter: Arc<ResultSorter>,
    reconciler: Arc<Reconciler>,
}

impl ChallengeIndex {
    pub fn new(store: Arc<dyn IndexStore>, config: IndexConfig) -> Result<Self> {
        config.validate()?;

        let keys = Keyspace::new(config.key_prefix.clone());
        let writer = Arc::new(IndexWriter::new(store.clone(), keys.clone(), &config));
        let planner = Arc::new(QueryPlanner::new(store.clone(), keys.clone(), &config));
        let sorter = Arc::new(ResultSorter::new(store.clone(), keys.clone()));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            keys.clone(),
            writer.clone(),
            config.reconcile_concurrency,
        ));

        Ok(Self {
            store,
            keys,
            config: Arc::new(config),
            writer,
            planner,
            sorter,
            reconciler,
        })
    }

    /// Connect to the configured store and build the index on top of it
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = create_store(&config.store).await?;

        info!(
            backend = ?config.store.backend,
            key_prefix = %config.index.key_prefix,
            "Challenge index initialized"
        );

        Self::new(store, config.index.clone())
    }

    pub fn keys(&self) -> &Keyspace {
        &self.keys
    }

    pub fn store(&self) -> &Arc<dyn IndexStore> {
        &self.store
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Index a challenge, replacing any previous entries for its id
    pub async fn upsert(&self, challenge: &Challenge) -> Result<()> {
        self.writer.upsert(challenge).await
    }

    /// Remove a challenge; returns whether it was indexed
    pub async fn remove(&self, challenge_id: &str) -> Result<bool> {
        self.writer.remove(challenge_id).await
    }

    /// The indexed payload of a challenge
    pub async fn find(&self, challenge_id: &str) -> Result<Option<Challenge>> {
        self.writer.find(challenge_id).await
    }

    /// Challenges matching every filter of `request`, in sort order
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Challenge>> {
        let start = Instant::now();

        let Some(result) = self.planner.plan(request).await? else {
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Search matched nothing"
            );
            return Ok(Vec::new());
        };

        let sort_by = request.sort_by.or(self.config.default_sort);
        let ids = self
            .sorter
            .ordered_ids(&result.key, sort_by, request.order)
            .await?;
        let challenges = self.sorter.materialize(&ids).await?;

        debug!(
            matched = result.count,
            returned = challenges.len(),
            sort_by = ?sort_by,
            order = ?request.order,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Search completed"
        );

        Ok(challenges)
    }

    /// Search with loosely typed parameters, see [`SearchRequest::from_params`]
    pub async fn search_params(&self, params: &Value) -> Result<Vec<Challenge>> {
        let request = SearchRequest::from_params(params)?;
        self.search(&request).await
    }

    /// Make the index reflect exactly `challenges`
    pub async fn reconcile(&self, challenges: &[Challenge]) -> Result<ReconcileReport> {
        self.reconciler.reconcile(challenges).await
    }

    pub async fn reconcile_from(&self, source: &dyn ChallengeSource) -> Result<ReconcileReport> {
        self.reconciler.reconcile_from(source).await
    }

    /// Start reconciling from `source` every `index.reconcile_interval_secs`
    pub fn spawn_reconciler(&self, source: Arc<dyn ChallengeSource>) -> Result<JoinHandle<()>> {
        let period = self.config.reconcile_interval().ok_or_else(|| {
            AppError::Configuration(
                "index.reconcile_interval_secs must be set to start periodic reconcile"
                    .to_string(),
            )
        })?;

        Ok(self.reconciler.clone().spawn_periodic(source, period))
    }

    /// Every name ever registered for a facet, sorted
    pub async fn known_names(&self, registry: Registry) -> Result<Vec<String>> {
        let mut names = self.store.smembers(&self.keys.registry(registry)).await?;
        names.sort();
        Ok(names)
    }

    /// Ids with an indexed payload, sorted
    pub async fn indexed_ids(&self) -> Result<Vec<String>> {
        let mut ids = self.store.hkeys(&self.keys.raw_data()).await?;
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ObservabilityConfig, StoreBackend, StoreConfig};
    use crate::search::query::SortField;
    use crate::state::create_in_memory_store;
    use chrono::Utc;
    use serde_json::json;

    fn index() -> ChallengeIndex {
        ChallengeIndex::new(create_in_memory_store(), IndexConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = IndexConfig {
            key_prefix: " ".to_string(),
            ..IndexConfig::default()
        };
        assert!(ChallengeIndex::new(create_in_memory_store(), config).is_err());
    }

    #[tokio::test]
    async fn test_from_config_in_memory() {
        let config = Config {
            store: StoreConfig {
                backend: StoreBackend::InMemory,
                redis_url: None,
            },
            index: IndexConfig::default(),
            observability: ObservabilityConfig::default(),
        };

        let index = ChallengeIndex::from_config(&config).await.unwrap();
        assert!(index.indexed_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_sort_applies() {
        let index = index();
        assert_eq!(index.config().default_sort, Some(SortField::Title));

        for (id, name) in [("1", "Zebra"), ("2", "Mango"), ("3", "Apple")] {
            index
                .upsert(&Challenge::new(id, name, "Code", Utc::now()))
                .await
                .unwrap();
        }

        let names: Vec<String> = index
            .search(&SearchRequest::new())
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Apple", "Mango", "Zebra"]);
    }

    #[tokio::test]
    async fn test_search_params_fails_fast() {
        let index = index();
        let err = index
            .search_params(&json!({"platfroms": ["heroku"]}))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_FILTER");
    }

    #[tokio::test]
    async fn test_spawn_reconciler_requires_interval() {
        let index = index();
        let source: Arc<dyn ChallengeSource> = Arc::new(Vec::<Challenge>::new());
        assert!(matches!(
            index.spawn_reconciler(source),
            Err(AppError::Configuration(_))
        ));
    }
}
