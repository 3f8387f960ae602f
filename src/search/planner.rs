//! Resolves search filters into a single result set

use crate::config::{IndexConfig, RangeBounds};
use crate::error::Result;
use crate::search::keys::Keyspace;
use crate::search::phonetic::phonetic_codes;
use crate::search::query::{FacetFilter, NumericFilter, SearchRequest};
use crate::state::IndexStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// A non-empty set of matching ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultSet {
    pub key: String,
    pub count: u64,
}

pub struct QueryPlanner {
    store: Arc<dyn IndexStore>,
    keys: Keyspace,
    ttl: Duration,
    isolate: bool,
    prize_money_bounds: RangeBounds,
    participant_bounds: RangeBounds,
}

impl QueryPlanner {
    pub fn new(store: Arc<dyn IndexStore>, keys: Keyspace, config: &IndexConfig) -> Self {
        Self {
            store,
            keys,
            ttl: config.ephemeral_ttl(),
            isolate: config.isolate_ephemeral_keys,
            prize_money_bounds: config.prize_money_bounds,
            participant_bounds: config.participant_bounds,
        }
    }

    /// Resolve `request` to the set of matching ids.
    ///
    /// Returns `None` as soon as any filter is known to match nothing.
    /// A request without filters matches every indexed challenge.
    pub async fn plan(&self, request: &SearchRequest) -> Result<Option<ResultSet>> {
        let filters = request.facet_filters();
        let seed = self.isolate.then(Uuid::new_v4);

        if filters.is_empty() {
            return self.non_empty(self.keys.all()).await;
        }

        let mut resolved = Vec::with_capacity(filters.len());
        for filter in &filters {
            match self.resolve(filter, seed).await? {
                Some(key) => resolved.push(key),
                None => {
                    debug!(facet = %filter.facet(), "Filter matches nothing");
                    return Ok(None);
                }
            }
        }

        if resolved.len() == 1 {
            return self.non_empty(resolved.remove(0)).await;
        }

        let dest = self.keys.ephemeral(&filters, seed)?;
        let count = self.store.inter_store(&dest, &resolved, self.ttl).await?;
        debug!(
            filters = filters.len(),
            matches = count,
            key = %dest,
            "Intersected filter sets"
        );

        Ok((count > 0).then_some(ResultSet { key: dest, count }))
    }

    async fn non_empty(&self, key: String) -> Result<Option<ResultSet>> {
        let count = self.store.scard(&key).await?;
        Ok((count > 0).then_some(ResultSet { key, count }))
    }

    /// The key holding the ids matching one filter
    async fn resolve(&self, filter: &FacetFilter, seed: Option<Uuid>) -> Result<Option<String>> {
        match filter {
            FacetFilter::Query(text) => {
                let keys = phonetic_codes([text.as_str()])
                    .iter()
                    .map(|code| self.keys.metaphone(code))
                    .collect();
                self.union(filter, keys, seed).await
            }
            FacetFilter::Categories(names) => {
                let keys = names.iter().map(|name| self.keys.category(name)).collect();
                self.union(filter, keys, seed).await
            }
            FacetFilter::Platforms(names) => {
                let keys = names.iter().map(|name| self.keys.platform(name)).collect();
                self.union(filter, keys, seed).await
            }
            FacetFilter::Technologies(names) => {
                let keys = names.iter().map(|name| self.keys.technology(name)).collect();
                self.union(filter, keys, seed).await
            }
            FacetFilter::Community(name) => Ok(Some(self.keys.community(name))),
            FacetFilter::State(state) => Ok(Some(self.keys.state(*state))),
            FacetFilter::PrizeMoney(NumericFilter::Exact(value)) => {
                Ok(Some(self.keys.prize_money(*value)))
            }
            FacetFilter::PrizeMoney(range) => {
                let (min, max) = range.bounds(self.prize_money_bounds);
                self.range(filter, &self.keys.prize_money_scores(), min, max, seed)
                    .await
            }
            FacetFilter::Participants(NumericFilter::Exact(value)) => {
                Ok(Some(self.keys.participants(*value)))
            }
            FacetFilter::Participants(range) => {
                let (min, max) = range.bounds(self.participant_bounds);
                self.range(filter, &self.keys.participant_scores(), min, max, seed)
                    .await
            }
        }
    }

    /// OR over `keys`, materialized only when there is more than one
    async fn union(
        &self,
        filter: &FacetFilter,
        mut keys: Vec<String>,
        seed: Option<Uuid>,
    ) -> Result<Option<String>> {
        match keys.len() {
            0 => Ok(None),
            1 => Ok(keys.pop()),
            _ => {
                let dest = self.keys.ephemeral(filter, seed)?;
                let count = self.store.union_store(&dest, &keys, self.ttl).await?;
                Ok((count > 0).then_some(dest))
            }
        }
    }

    /// Ids scored within `min..=max`, copied into a set
    async fn range(
        &self,
        filter: &FacetFilter,
        scores: &str,
        min: u64,
        max: u64,
        seed: Option<Uuid>,
    ) -> Result<Option<String>> {
        let ids = self
            .store
            .zrange_by_score(scores, min as f64, max as f64)
            .await?;
        if ids.is_empty() {
            return Ok(None);
        }

        let dest = self.keys.ephemeral(filter, seed)?;
        self.store.replace_set(&dest, &ids, self.ttl).await?;
        Ok(Some(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChallengeState;
    use crate::state::{InMemoryStore, StoreOp};

    async fn seeded() -> (Arc<InMemoryStore>, QueryPlanner) {
        let store = Arc::new(InMemoryStore::new());
        let keys = Keyspace::new("test");
        store
            .apply(vec![
                StoreOp::sadd(keys.all(), "a"),
                StoreOp::sadd(keys.all(), "b"),
                StoreOp::sadd(keys.platform("heroku"), "a"),
                StoreOp::sadd(keys.platform("aws"), "b"),
                StoreOp::sadd(keys.state(ChallengeState::Open), "a"),
                StoreOp::zadd(keys.prize_money_scores(), "a", 1500.0),
                StoreOp::zadd(keys.prize_money_scores(), "b", 3000.0),
            ])
            .await
            .unwrap();

        let planner = QueryPlanner::new(store.clone(), keys, &IndexConfig::default());
        (store, planner)
    }

    #[tokio::test]
    async fn test_empty_request_matches_all() {
        let (_, planner) = seeded().await;
        let result = planner.plan(&SearchRequest::new()).await.unwrap().unwrap();
        assert_eq!(result.key, "test:all");
        assert_eq!(result.count, 2);
    }

    #[tokio::test]
    async fn test_single_facet_uses_facet_key() {
        let (store, planner) = seeded().await;
        let result = planner
            .plan(&SearchRequest::new().with_platforms(["Heroku"]))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.key, "test:platforms:heroku");
        assert!(store.keys_with_prefix("test:temp:").is_empty());
    }

    #[tokio::test]
    async fn test_union_within_facet_and_intersection_across() {
        let (store, planner) = seeded().await;
        let request = SearchRequest::new()
            .with_platforms(["heroku", "aws"])
            .with_state(ChallengeState::Open);

        let result = planner.plan(&request).await.unwrap().unwrap();
        assert_eq!(result.count, 1);
        assert_eq!(store.smembers(&result.key).await.unwrap(), vec!["a"]);

        let temp = store.keys_with_prefix("test:temp:");
        assert_eq!(temp.len(), 2);
        for key in temp {
            assert!(store.ttl(&key).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_range_replaces_previous_result() {
        let (store, planner) = seeded().await;
        let request = SearchRequest::new()
            .with_prize_money(NumericFilter::range(Some(1000), Some(2000)));

        let first = planner.plan(&request).await.unwrap().unwrap();
        assert_eq!(store.smembers(&first.key).await.unwrap(), vec!["a"]);

        store
            .apply(vec![StoreOp::zadd(
                Keyspace::new("test").prize_money_scores(),
                "a",
                5000.0,
            )])
            .await
            .unwrap();
        store
            .apply(vec![StoreOp::zadd(
                Keyspace::new("test").prize_money_scores(),
                "b",
                1200.0,
            )])
            .await
            .unwrap();

        let second = planner.plan(&request).await.unwrap().unwrap();
        assert_eq!(second.key, first.key);
        assert_eq!(store.smembers(&second.key).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_unmatched_filters_short_circuit() {
        let (_, planner) = seeded().await;

        let empty_range = SearchRequest::new()
            .with_prize_money(NumericFilter::range(Some(10_000), None));
        assert!(planner.plan(&empty_range).await.unwrap().is_none());

        let unknown_platform = SearchRequest::new().with_platforms(["azure"]);
        assert!(planner.plan(&unknown_platform).await.unwrap().is_none());

        // no phonetic code can be derived from punctuation or stop words
        let stop_words = SearchRequest::new().with_query("the ???");
        assert!(planner.plan(&stop_words).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_isolated_keys_differ_per_search() {
        let store = Arc::new(InMemoryStore::new());
        let keys = Keyspace::new("test");
        store
            .apply(vec![
                StoreOp::sadd(keys.platform("heroku"), "a"),
                StoreOp::sadd(keys.platform("aws"), "a"),
            ])
            .await
            .unwrap();
        let config = IndexConfig {
            isolate_ephemeral_keys: true,
            ..IndexConfig::default()
        };
        let planner = QueryPlanner::new(store.clone(), keys, &config);
        let request = SearchRequest::new().with_platforms(["heroku", "aws"]);

        let first = planner.plan(&request).await.unwrap().unwrap();
        let second = planner.plan(&request).await.unwrap().unwrap();
        assert_ne!(first.key, second.key);
    }
}
