//! Writes and removes challenge index entries

use crate::config::IndexConfig;
use crate::error::Result;
use crate::models::{Challenge, ChallengeState};
use crate::search::keys::{normalize_value, Keyspace, Registry};
use crate::search::phonetic::phonetic_codes;
use crate::search::query::SortField;
use crate::state::{IndexStore, StoreOp};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use validator::Validate;

/// Every index entry derived from one challenge
#[derive(Debug, Clone, PartialEq)]
pub struct IndexArtifacts {
    pub challenge_id: String,
    /// Facet sets containing the id
    pub memberships: Vec<String>,
    /// (registry key, facet value)
    pub registrations: Vec<(String, String)>,
    /// (sorted set key, score)
    pub scores: Vec<(String, f64)>,
    /// (sort key, sort value)
    pub sort_values: Vec<(String, String)>,
}

fn unique_values<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|value| normalize_value(value))
        .filter(|value| !value.is_empty() && seen.insert(value.clone()))
        .collect()
}

impl IndexArtifacts {
    pub fn for_challenge(challenge: &Challenge, keys: &Keyspace, public_community: &str) -> Self {
        let category = normalize_value(&challenge.challenge_type);
        let platforms = unique_values(&challenge.platforms);
        let technologies = unique_values(&challenge.technologies);
        let community = challenge
            .community()
            .map(normalize_value)
            .unwrap_or_else(|| normalize_value(public_community));

        let mut memberships = vec![keys.all()];
        memberships.extend(
            phonetic_codes(challenge.keyword_sources())
                .iter()
                .map(|code| keys.metaphone(code)),
        );
        memberships.push(keys.category(&category));
        memberships.extend(platforms.iter().map(|name| keys.platform(name)));
        memberships.extend(technologies.iter().map(|name| keys.technology(name)));
        memberships.push(keys.state(challenge.state));
        memberships.push(keys.community(&community));
        memberships.push(keys.prize_money(challenge.total_prize_money));
        memberships.push(keys.participants(challenge.participant_count));

        let mut registrations = vec![(keys.registry(Registry::Categories), category.clone())];
        registrations.extend(
            platforms
                .into_iter()
                .map(|name| (keys.registry(Registry::Platforms), name)),
        );
        registrations.extend(
            technologies
                .into_iter()
                .map(|name| (keys.registry(Registry::Technologies), name)),
        );
        registrations.push((keys.registry(Registry::Communities), community));

        let scores = vec![
            (
                keys.prize_money_scores(),
                challenge.total_prize_money as f64,
            ),
            (
                keys.participant_scores(),
                challenge.participant_count as f64,
            ),
        ];

        let id = challenge.challenge_id.as_str();
        let sort_values = SortField::iter()
            .map(|field| {
                let value = match field {
                    SortField::Title => challenge.name.clone(),
                    SortField::EndDate => challenge.end_date_key(),
                    SortField::PrizeMoney => challenge.total_prize_money.to_string(),
                    SortField::Participants => challenge.participant_count.to_string(),
                    SortField::Category => category.clone(),
                };
                (keys.sort_value(field, id), value)
            })
            .collect();

        Self {
            challenge_id: challenge.challenge_id.clone(),
            memberships,
            registrations,
            scores,
            sort_values,
        }
    }

    /// Operations writing the entries, `payload` included
    pub fn insert_ops(&self, keys: &Keyspace, payload: String) -> Vec<StoreOp> {
        let id = self.challenge_id.as_str();
        let recorded = keys.memberships(id);
        let mut ops = vec![StoreOp::hset(keys.raw_data(), id, payload)];
        ops.extend(self.memberships.iter().map(|key| StoreOp::sadd(key, id)));
        ops.extend(
            self.memberships
                .iter()
                .map(|key| StoreOp::sadd(&recorded, key)),
        );
        ops.extend(
            self.registrations
                .iter()
                .map(|(key, name)| StoreOp::sadd(key, name)),
        );
        ops.extend(
            self.scores
                .iter()
                .map(|(key, score)| StoreOp::zadd(key, id, *score)),
        );
        ops.extend(
            self.sort_values
                .iter()
                .map(|(key, value)| StoreOp::set(key, value)),
        );
        ops
    }

    /// Removal of every entry addressable by id alone.
    ///
    /// Registries are left alone; facet sets come from the membership record.
    pub fn id_only_removal(id: &str, keys: &Keyspace) -> Vec<StoreOp> {
        let mut ops = vec![
            StoreOp::del(keys.memberships(id)),
            StoreOp::hdel(keys.raw_data(), id),
            StoreOp::srem(keys.all(), id),
            StoreOp::srem(keys.state(ChallengeState::Open), id),
            StoreOp::srem(keys.state(ChallengeState::Closed), id),
            StoreOp::zrem(keys.prize_money_scores(), id),
            StoreOp::zrem(keys.participant_scores(), id),
        ];
        ops.extend(SortField::iter().map(|field| StoreOp::del(keys.sort_value(field, id))));
        ops
    }
}

/// Maintains index entries for challenges
///
/// Writes for the same id are serialized so that a concurrent update and
/// removal cannot interleave their remove and insert steps.
pub struct IndexWriter {
    store: Arc<dyn IndexStore>,
    keys: Keyspace,
    public_community: String,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl IndexWriter {
    pub fn new(store: Arc<dyn IndexStore>, keys: Keyspace, config: &IndexConfig) -> Self {
        Self {
            store,
            keys,
            public_community: config.public_community.clone(),
            locks: DashMap::new(),
        }
    }

    pub fn artifacts(&self, challenge: &Challenge) -> IndexArtifacts {
        IndexArtifacts::for_challenge(challenge, &self.keys, &self.public_community)
    }

    /// Index a challenge, replacing whatever was indexed under its id
    pub async fn upsert(&self, challenge: &Challenge) -> Result<()> {
        challenge.validate()?;
        let payload = serde_json::to_string(challenge)?;
        let artifacts = self.artifacts(challenge);
        let id = challenge.challenge_id.as_str();

        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.upsert_locked(id, artifacts, payload).await
        };
        drop(lock);
        self.release_lock(id);

        result
    }

    async fn upsert_locked(&self, id: &str, artifacts: IndexArtifacts, payload: String) -> Result<()> {
        if self.remove_locked(id).await? {
            info!(challenge_id = %id, "Replaced previous index entries");
        }

        let ops = artifacts.insert_ops(&self.keys, payload);
        debug!(
            challenge_id = %id,
            operations = ops.len(),
            memberships = artifacts.memberships.len(),
            "Writing index entries"
        );
        self.store.apply(ops).await?;

        info!(challenge_id = %id, "Challenge indexed");
        Ok(())
    }

    /// Remove a challenge from every index entry.
    ///
    /// Returns whether the id was indexed. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: &str) -> Result<bool> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.remove_locked(id).await
        };
        drop(lock);
        self.release_lock(id);

        result
    }

    async fn remove_locked(&self, id: &str) -> Result<bool> {
        let indexed = self.store.hexists(&self.keys.raw_data(), id).await?;
        let recorded = self.store.smembers(&self.keys.memberships(id)).await?;
        if !indexed && recorded.is_empty() {
            return Ok(false);
        }

        let mut ops: Vec<StoreOp> = recorded.iter().map(|key| StoreOp::srem(key, id)).collect();
        ops.extend(IndexArtifacts::id_only_removal(id, &self.keys));
        debug!(
            challenge_id = %id,
            memberships = recorded.len(),
            "Removing index entries"
        );
        self.store.apply(ops).await?;

        if !indexed {
            warn!(challenge_id = %id, "Removed facet memberships of an id without raw data");
        }
        info!(challenge_id = %id, "Challenge removed from index");
        Ok(true)
    }

    /// The stored payload for `id`
    pub async fn find(&self, id: &str) -> Result<Option<Challenge>> {
        match self.store.hget(&self.keys.raw_data(), id).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn release_lock(&self, id: &str) {
        self.locks.remove_if(id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
