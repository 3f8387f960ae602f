use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single write against the backing store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
    ZAdd { key: String, member: String, score: f64 },
    ZRem { key: String, member: String },
    Set { key: String, value: String },
    Del { key: String },
    HSet { key: String, field: String, value: String },
    HDel { key: String, field: String },
}

impl StoreOp {
    pub fn sadd(key: impl Into<String>, member: impl Into<String>) -> Self {
        StoreOp::SAdd {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn srem(key: impl Into<String>, member: impl Into<String>) -> Self {
        StoreOp::SRem {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn zadd(key: impl Into<String>, member: impl Into<String>, score: f64) -> Self {
        StoreOp::ZAdd {
            key: key.into(),
            member: member.into(),
            score,
        }
    }

    pub fn zrem(key: impl Into<String>, member: impl Into<String>) -> Self {
        StoreOp::ZRem {
            key: key.into(),
            member: member.into(),
        }
    }

    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        StoreOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        StoreOp::Del { key: key.into() }
    }

    pub fn hset(key: impl Into<String>, field: impl Into<String>, value: impl Into<String>) -> Self {
        StoreOp::HSet {
            key: key.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn hdel(key: impl Into<String>, field: impl Into<String>) -> Self {
        StoreOp::HDel {
            key: key.into(),
            field: field.into(),
        }
    }

    /// Key the operation writes to
    pub fn key(&self) -> &str {
        match self {
            StoreOp::SAdd { key, .. }
            | StoreOp::SRem { key, .. }
            | StoreOp::ZAdd { key, .. }
            | StoreOp::ZRem { key, .. }
            | StoreOp::Set { key, .. }
            | StoreOp::Del { key }
            | StoreOp::HSet { key, .. }
            | StoreOp::HDel { key, .. } => key,
        }
    }
}

/// `SORT key BY pattern [ALPHA] ASC|DESC`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortRequest {
    /// Weight key pattern; the first `*` is replaced by the member
    pub by_pattern: String,
    /// Lexical instead of numeric comparison
    pub alpha: bool,
    pub descending: bool,
}

impl SortRequest {
    pub fn weight_key(&self, member: &str) -> String {
        self.by_pattern.replacen('*', member, 1)
    }
}

/// Set / sorted-set key-value store the index is projected into
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Apply a batch of writes in order. Not transactional: a failure may
    /// leave part of the batch applied.
    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()>;

    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hkeys(&self, key: &str) -> Result<Vec<String>>;

    /// Values for `fields`, positionally; `None` where a field is absent
    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;

    async fn scard(&self, key: &str) -> Result<u64>;

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Remaining time to live; `None` for missing keys and keys without expiry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Overwrite `dest` with the union of `keys` and expire it after `ttl`.
    /// Returns the cardinality of `dest`.
    async fn union_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64>;

    /// Overwrite `dest` with the intersection of `keys` and expire it after `ttl`.
    /// Returns the cardinality of `dest`.
    async fn inter_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64>;

    /// Overwrite `dest` with exactly `members` and expire it after `ttl`.
    /// Returns the cardinality of `dest`.
    async fn replace_set(&self, dest: &str, members: &[String], ttl: Duration) -> Result<u64>;

    /// Members of a sorted set with `min <= score <= max`, by ascending score
    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Members of the set at `key` ordered by external weight keys
    async fn sort(&self, key: &str, request: &SortRequest) -> Result<Vec<String>>;

    async fn ping(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
enum Stored {
    Value(String),
    Set(HashSet<String>),
    SortedSet(HashMap<String, f64>),
    Hash(HashMap<String, String>),
}

impl Stored {
    fn is_empty(&self) -> bool {
        match self {
            Stored::Value(_) => false,
            Stored::Set(set) => set.is_empty(),
            Stored::SortedSet(zset) => zset.is_empty(),
            Stored::Hash(hash) => hash.is_empty(),
        }
    }
}

fn wrong_type(key: &str) -> AppError {
    AppError::Store(format!(
        "WRONGTYPE Operation against key '{}' holding the wrong kind of value",
        key
    ))
}

/// In-memory store with Redis semantics (for development and testing)
///
/// Empty collections disappear, expiry is checked lazily on access.
/// Anything touching both maps locks `entries` before `expiries`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, Stored>>,
    expiries: Arc<DashMap<String, Instant>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn key_count(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| {
                self.expiries
                    .get(entry.key())
                    .map_or(true, |deadline| *deadline > now)
            })
            .count()
    }

    /// Live keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| key.starts_with(prefix))
            .filter(|key| {
                self.expiries
                    .get(key)
                    .map_or(true, |deadline| *deadline > now)
            })
            .collect();
        keys.sort();
        keys
    }

    fn expire_stale(&self, key: &str) {
        let now = Instant::now();
        let expired = |_: &String, deadline: &Instant| *deadline <= now;

        if self.expiries.get(key).map_or(false, |deadline| *deadline <= now) {
            // the deadline is checked again under the entry lock
            self.entries
                .remove_if(key, |_, _| self.expiries.remove_if(key, expired).is_some());
            self.expiries.remove_if(key, expired);
        }
    }

    fn delete(&self, key: &str) {
        let entry = self.entries.entry(key.to_string());
        self.expiries.remove(key);
        if let Entry::Occupied(occupied) = entry {
            occupied.remove();
        }
    }

    fn read<T>(&self, key: &str, f: impl FnOnce(Option<&Stored>) -> Result<T>) -> Result<T> {
        self.expire_stale(key);
        let entry = self.entries.get(key);
        f(entry.as_deref())
    }

    fn read_set(&self, key: &str) -> Result<HashSet<String>> {
        self.read(key, |entry| match entry {
            None => Ok(HashSet::new()),
            Some(Stored::Set(set)) => Ok(set.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn read_value(&self, key: &str) -> Result<Option<String>> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Stored::Value(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn read_hash<T>(&self, key: &str, f: impl FnOnce(Option<&HashMap<String, String>>) -> T) -> Result<T> {
        self.read(key, |entry| match entry {
            None => Ok(f(None)),
            Some(Stored::Hash(hash)) => Ok(f(Some(hash))),
            Some(_) => Err(wrong_type(key)),
        })
    }

    fn read_sorted_set(&self, key: &str) -> Result<HashMap<String, f64>> {
        self.read(key, |entry| match entry {
            None => Ok(HashMap::new()),
            Some(Stored::SortedSet(zset)) => Ok(zset.clone()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    /// Mutate the collection at `key`, creating it from `empty` when absent
    fn write(&self, key: &str, empty: Stored, f: impl FnOnce(&mut Stored) -> Result<()>) -> Result<()> {
        self.expire_stale(key);
        let mut entry = self.entries.entry(key.to_string()).or_insert(empty);
        f(entry.value_mut())
    }

    /// Mutate an existing collection; drop the key once `f` reports it empty
    fn shrink(&self, key: &str, f: impl FnOnce(&mut Stored) -> Result<bool>) -> Result<()> {
        self.expire_stale(key);
        let now_empty = match self.entries.get_mut(key) {
            Some(mut entry) => f(entry.value_mut())?,
            None => return Ok(()),
        };

        if now_empty {
            // a concurrent write may have refilled it
            self.entries.remove_if(key, |_, stored| {
                let empty = stored.is_empty();
                if empty {
                    self.expiries.remove(key);
                }
                empty
            });
        }
        Ok(())
    }

    fn apply_op(&self, op: StoreOp) -> Result<()> {
        match op {
            StoreOp::SAdd { key, member } => {
                self.write(&key, Stored::Set(HashSet::new()), |entry| match entry {
                    Stored::Set(set) => {
                        set.insert(member);
                        Ok(())
                    }
                    _ => Err(wrong_type(&key)),
                })
            }
            StoreOp::SRem { key, member } => self.shrink(&key, |entry| match entry {
                Stored::Set(set) => {
                    set.remove(&member);
                    Ok(set.is_empty())
                }
                _ => Err(wrong_type(&key)),
            }),
            StoreOp::ZAdd { key, member, score } => {
                self.write(&key, Stored::SortedSet(HashMap::new()), |entry| match entry {
                    Stored::SortedSet(zset) => {
                        zset.insert(member, score);
                        Ok(())
                    }
                    _ => Err(wrong_type(&key)),
                })
            }
            StoreOp::ZRem { key, member } => self.shrink(&key, |entry| match entry {
                Stored::SortedSet(zset) => {
                    zset.remove(&member);
                    Ok(zset.is_empty())
                }
                _ => Err(wrong_type(&key)),
            }),
            StoreOp::Set { key, value } => {
                let entry = self.entries.entry(key);
                self.expiries.remove(entry.key());
                entry.insert(Stored::Value(value));
                Ok(())
            }
            StoreOp::Del { key } => {
                self.delete(&key);
                Ok(())
            }
            StoreOp::HSet { key, field, value } => {
                self.write(&key, Stored::Hash(HashMap::new()), |entry| match entry {
                    Stored::Hash(hash) => {
                        hash.insert(field, value);
                        Ok(())
                    }
                    _ => Err(wrong_type(&key)),
                })
            }
            StoreOp::HDel { key, field } => self.shrink(&key, |entry| match entry {
                Stored::Hash(hash) => {
                    hash.remove(&field);
                    Ok(hash.is_empty())
                }
                _ => Err(wrong_type(&key)),
            }),
        }
    }

    /// Replace `dest` with `members`, deleting it when empty
    fn store_set(&self, dest: &str, members: HashSet<String>, ttl: Duration) -> u64 {
        let count = members.len() as u64;
        if members.is_empty() {
            self.delete(dest);
        } else {
            let entry = self.entries.entry(dest.to_string());
            self.expiries.insert(dest.to_string(), Instant::now() + ttl);
            entry.insert(Stored::Set(members));
        }
        count
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()> {
        for op in ops {
            self.apply_op(op)?;
        }
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        self.read_hash(key, |hash| hash.map_or(false, |h| h.contains_key(field)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.read_hash(key, |hash| hash.and_then(|h| h.get(field).cloned()))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        self.read_hash(key, |hash| {
            hash.map(|h| h.keys().cloned().collect())
                .unwrap_or_default()
        })
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        self.read_hash(key, |hash| {
            fields
                .iter()
                .map(|field| hash.and_then(|h| h.get(field).cloned()))
                .collect()
        })
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.read_set(key)?.into_iter().collect())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.read(key, |entry| match entry {
            None => Ok(false),
            Some(Stored::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        self.read(key, |entry| match entry {
            None => Ok(0),
            Some(Stored::Set(set)) => Ok(set.len() as u64),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        self.read(key, |entry| match entry {
            None => Ok(None),
            Some(Stored::SortedSet(zset)) => Ok(zset.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.read_value(key)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.expire_stale(key);
        let deadline = self.expiries.get(key).map(|deadline| *deadline);
        Ok(deadline.map(|deadline| deadline.saturating_duration_since(Instant::now())))
    }

    async fn union_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64> {
        let mut union = HashSet::new();
        for key in keys {
            union.extend(self.read_set(key)?);
        }
        Ok(self.store_set(dest, union, ttl))
    }

    async fn inter_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64> {
        let mut sets = keys
            .iter()
            .map(|key| self.read_set(key))
            .collect::<Result<Vec<_>>>()?;
        sets.sort_by_key(HashSet::len);

        let mut sets = sets.into_iter();
        let mut intersection = sets.next().unwrap_or_default();
        for set in sets {
            intersection.retain(|member| set.contains(member));
        }
        Ok(self.store_set(dest, intersection, ttl))
    }

    async fn replace_set(&self, dest: &str, members: &[String], ttl: Duration) -> Result<u64> {
        Ok(self.store_set(dest, members.iter().cloned().collect(), ttl))
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut hits: Vec<(String, f64)> = self
            .read_sorted_set(key)?
            .into_iter()
            .filter(|(_, score)| *score >= min && *score <= max)
            .collect();
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        Ok(hits.into_iter().map(|(member, _)| member).collect())
    }

    async fn sort(&self, key: &str, request: &SortRequest) -> Result<Vec<String>> {
        let members = self.read_set(key)?;

        let mut ordered: Vec<String> = if request.alpha {
            let mut weighted = members
                .into_iter()
                .map(|member| {
                    let weight = self.read_value(&request.weight_key(&member))?;
                    Ok((member, weight))
                })
                .collect::<Result<Vec<_>>>()?;
            // a missing weight sorts before any present one, as in Redis
            weighted.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            weighted.into_iter().map(|(member, _)| member).collect()
        } else {
            let mut weighted = members
                .into_iter()
                .map(|member| {
                    let weight = match self.read_value(&request.weight_key(&member))? {
                        None => 0.0,
                        Some(raw) => raw.trim().parse::<f64>().map_err(|_| {
                            AppError::Store(
                                "One or more scores can't be converted into double".to_string(),
                            )
                        })?,
                    };
                    Ok((member, weight))
                })
                .collect::<Result<Vec<_>>>()?;
            weighted.sort_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            weighted.into_iter().map(|(member, _)| member).collect()
        };

        if request.descending {
            ordered.reverse();
        }
        Ok(ordered)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
