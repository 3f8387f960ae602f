//! Orders a result set and loads its payloads

use crate::error::Result;
use crate::models::Challenge;
use crate::search::keys::Keyspace;
use crate::search::query::{SortField, SortOrder};
use crate::state::{IndexStore, SortRequest};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ResultSorter {
    store: Arc<dyn IndexStore>,
    keys: Keyspace,
}

impl ResultSorter {
    pub fn new(store: Arc<dyn IndexStore>, keys: Keyspace) -> Self {
        Self { store, keys }
    }

    /// Ids of `set_key` ordered by the per-id sort values of `sort_by`.
    ///
    /// Without a sort field the store's own member order is kept.
    pub async fn ordered_ids(
        &self,
        set_key: &str,
        sort_by: Option<SortField>,
        order: SortOrder,
    ) -> Result<Vec<String>> {
        match sort_by {
            Some(field) => {
                let request = SortRequest {
                    by_pattern: self.keys.sort_pattern(field),
                    alpha: field.is_alpha(),
                    descending: order == SortOrder::Desc,
                };
                self.store.sort(set_key, &request).await
            }
            None => self.store.smembers(set_key).await,
        }
    }

    /// Payloads for `ids`, in the same order.
    ///
    /// Ids without a payload (removed meanwhile) and payloads that fail to
    /// decode are skipped.
    pub async fn materialize(&self, ids: &[String]) -> Result<Vec<Challenge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let payloads = self.store.hmget(&self.keys.raw_data(), ids).await?;
        let mut challenges = Vec::with_capacity(ids.len());

        for (id, payload) in ids.iter().zip(payloads) {
            let Some(payload) = payload else {
                debug!(challenge_id = %id, "No payload for matched id, skipping");
                continue;
            };

            match serde_json::from_str::<Challenge>(&payload) {
                Ok(challenge) => challenges.push(challenge),
                Err(e) => warn!(
                    challenge_id = %id,
                    error = %e,
                    "Skipping challenge with undecodable payload"
                ),
            }
        }

        Ok(challenges)
    }
}
