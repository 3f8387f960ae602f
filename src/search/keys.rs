//! Index key layout
//!
//! Every key lives under one prefix (default `search:challenge`):
//!
//! ```text
//! <p>:raw_data                   hash   id -> JSON payload
//! <p>:all                        set    every indexed id
//! <p>:metaphones:<CODE>          set
//! <p>:categories:<name>          set    (+ <p>:category_names)
//! <p>:platforms:<name>           set    (+ <p>:platform_names)
//! <p>:technologies:<name>        set    (+ <p>:technology_names)
//! <p>:community:<name>           set    (+ <p>:community_names)
//! <p>:open, <p>:closed           set
//! <p>:prize_money                zset   id -> prize
//! <p>:prize_money:<value>        set
//! <p>:participants               zset   id -> count
//! <p>:participants:<value>       set
//! <p>:sort:<field>:<id>          string
//! <p>:members:<id>               set    facet sets holding <id>
//! <p>:temp:<sha256>[:<uuid>]     set    ephemeral, expires
//! ```

use crate::error::Result;
use crate::models::ChallengeState;
use crate::search::query::SortField;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// Sets recording every facet value ever indexed
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Registry {
    Categories,
    Platforms,
    Technologies,
    Communities,
}

impl Registry {
    fn key_name(self) -> &'static str {
        match self {
            Registry::Categories => "category_names",
            Registry::Platforms => "platform_names",
            Registry::Technologies => "technology_names",
            Registry::Communities => "community_names",
        }
    }
}

/// Normalized form of a text facet value
pub fn normalize_value(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Builds every key the index reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyspace {
    prefix: String,
}

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, name: &str) -> String {
        format!("{}:{}", self.prefix, name)
    }

    fn facet(&self, facet: &str, value: &str) -> String {
        format!("{}:{}:{}", self.prefix, facet, normalize_value(value))
    }

    /// Hash of id -> serialized challenge
    pub fn raw_data(&self) -> String {
        self.key("raw_data")
    }

    /// Set of every indexed id
    pub fn all(&self) -> String {
        self.key("all")
    }

    /// Phonetic codes are stored as produced (uppercase)
    pub fn metaphone(&self, code: &str) -> String {
        format!("{}:metaphones:{}", self.prefix, code)
    }

    pub fn category(&self, name: &str) -> String {
        self.facet("categories", name)
    }

    pub fn platform(&self, name: &str) -> String {
        self.facet("platforms", name)
    }

    pub fn technology(&self, name: &str) -> String {
        self.facet("technologies", name)
    }

    pub fn community(&self, name: &str) -> String {
        self.facet("community", name)
    }

    pub fn state(&self, state: ChallengeState) -> String {
        self.key(&state.to_string())
    }

    pub fn registry(&self, registry: Registry) -> String {
        self.key(registry.key_name())
    }

    /// Sorted set of id -> prize money
    pub fn prize_money_scores(&self) -> String {
        self.key("prize_money")
    }

    /// Ids whose prize money is exactly `value`
    pub fn prize_money(&self, value: u64) -> String {
        format!("{}:prize_money:{}", self.prefix, value)
    }

    /// Sorted set of id -> participant count
    pub fn participant_scores(&self) -> String {
        self.key("participants")
    }

    /// Ids whose participant count is exactly `value`
    pub fn participants(&self, value: u64) -> String {
        format!("{}:participants:{}", self.prefix, value)
    }

    /// Every facet set `id` was added to, so removal never depends on its payload
    pub fn memberships(&self, id: &str) -> String {
        format!("{}:members:{}", self.prefix, id)
    }

    pub fn sort_value(&self, field: SortField, id: &str) -> String {
        format!("{}:sort:{}:{}", self.prefix, field, id)
    }

    /// `SORT ... BY` pattern for a sort field
    pub fn sort_pattern(&self, field: SortField) -> String {
        self.sort_value(field, "*")
    }

    /// Ephemeral key named after the content hash of `input`.
    ///
    /// Identical inputs map to the same key unless a `seed` is given.
    pub fn ephemeral<T: Serialize + ?Sized>(&self, input: &T, seed: Option<Uuid>) -> Result<String> {
        let digest = content_hash(input)?;
        Ok(match seed {
            Some(seed) => format!("{}:temp:{}:{}", self.prefix, digest, seed),
            None => format!("{}:temp:{}", self.prefix, digest),
        })
    }

    /// Prefix shared by every ephemeral key
    pub fn ephemeral_prefix(&self) -> String {
        self.key("temp:")
    }
}

/// SHA-256 hex digest of the canonical JSON form of `input`
pub fn content_hash<T: Serialize + ?Sized>(input: &T) -> Result<String> {
    let canonical = serde_json::to_vec(input)?;

    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}
