use crate::error::{AppError, Result};
use crate::state::{IndexStore, SortRequest, StoreOp};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::collections::HashSet;
use std::time::Duration;

/// Redis-backed index store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

fn failed(action: &'static str) -> impl FnOnce(RedisError) -> AppError {
    move |e| AppError::Store(format!("Failed to {}: {}", action, e))
}

/// Redis rejects EXPIRE 0; a sub-second TTL rounds up
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisStore {
    /// Connect and verify the server answers
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::Configuration(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(failed("connect to Redis"))?;

        let store = Self { connection };
        store.ping().await?;

        tracing::info!("Initialized Redis index store");
        Ok(store)
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl IndexStore for RedisStore {
    async fn apply(&self, ops: Vec<StoreOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        // Pipelined, not MULTI: partial application is tolerated
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                StoreOp::SAdd { key, member } => pipe.sadd(key, member).ignore(),
                StoreOp::SRem { key, member } => pipe.srem(key, member).ignore(),
                StoreOp::ZAdd { key, member, score } => pipe.zadd(key, member, *score).ignore(),
                StoreOp::ZRem { key, member } => pipe.zrem(key, member).ignore(),
                StoreOp::Set { key, value } => pipe.set(key, value).ignore(),
                StoreOp::Del { key } => pipe.del(key).ignore(),
                StoreOp::HSet { key, field, value } => pipe.hset(key, field, value).ignore(),
                StoreOp::HDel { key, field } => pipe.hdel(key, field).ignore(),
            };
        }

        let mut conn = self.conn();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(failed("apply index writes"))?;

        tracing::trace!(ops = ops.len(), "Applied index writes");
        Ok(())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.conn();
        conn.hexists(key, field)
            .await
            .map_err(failed("check hash field"))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.hget(key, field).await.map_err(failed("read hash field"))
    }

    async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.hkeys(key).await.map_err(failed("list hash fields"))
    }

    async fn hmget(&self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn();
        redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await
            .map_err(failed("read hash fields"))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.smembers(key).await.map_err(failed("read set members"))
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn();
        conn.sismember(key, member)
            .await
            .map_err(failed("check set membership"))
    }

    async fn scard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn();
        conn.scard(key).await.map_err(failed("count set members"))
    }

    async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>> {
        let mut conn = self.conn();
        conn.zscore(key, member)
            .await
            .map_err(failed("read sorted set score"))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(failed("read key"))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn();
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(failed("read key ttl"))?;

        // -2: missing, -1: no expiry
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn union_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64> {
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SUNIONSTORE")
            .arg(dest)
            .arg(keys)
            .cmd("EXPIRE")
            .arg(dest)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(failed("union sets"))?;
        Ok(count)
    }

    async fn inter_store(&self, dest: &str, keys: &[String], ttl: Duration) -> Result<u64> {
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("SINTERSTORE")
            .arg(dest)
            .arg(keys)
            .cmd("EXPIRE")
            .arg(dest)
            .arg(ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(failed("intersect sets"))?;
        Ok(count)
    }

    async fn replace_set(&self, dest: &str, members: &[String], ttl: Duration) -> Result<u64> {
        let mut pipe = redis::pipe();
        pipe.atomic().del(dest).ignore();
        if !members.is_empty() {
            pipe.sadd(dest, members)
                .ignore()
                .cmd("EXPIRE")
                .arg(dest)
                .arg(ttl_secs(ttl))
                .ignore();
        }

        let mut conn = self.conn();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(failed("replace set"))?;

        Ok(members.iter().collect::<HashSet<_>>().len() as u64)
    }

    async fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn();
        conn.zrangebyscore(key, min, max)
            .await
            .map_err(failed("range sorted set"))
    }

    async fn sort(&self, key: &str, request: &SortRequest) -> Result<Vec<String>> {
        let mut cmd = redis::cmd("SORT");
        cmd.arg(key).arg("BY").arg(&request.by_pattern);
        if request.alpha {
            cmd.arg("ALPHA");
        }
        cmd.arg(if request.descending { "DESC" } else { "ASC" });

        let mut conn = self.conn();
        cmd.query_async(&mut conn).await.map_err(failed("sort set"))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(failed("ping Redis"))?;
        Ok(())
    }
}
