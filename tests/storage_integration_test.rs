use challenge_index::{
    config::IndexConfig,
    models::Challenge,
    search::{ChallengeIndex, NumericFilter, SearchRequest, SortField, SortOrder},
    state::{IndexStore, InMemoryStore, RedisStore, SortRequest, StoreOp},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379/15";

/// Keys of one test run never collide with another's
fn unique_prefix() -> String {
    format!("test:{}", Uuid::new_v4())
}

/// Test suite that runs against any IndexStore implementation
async fn test_store_operations(store: Arc<dyn IndexStore>) {
    let p = unique_prefix();
    let set = format!("{}:set", p);
    let hash = format!("{}:hash", p);
    let zset = format!("{}:zset", p);
    let value = format!("{}:value", p);

    store
        .apply(vec![
            StoreOp::sadd(&set, "a"),
            StoreOp::sadd(&set, "b"),
            StoreOp::hset(&hash, "a", "{\"x\":1}"),
            StoreOp::zadd(&zset, "a", 10.0),
            StoreOp::zadd(&zset, "b", 20.0),
            StoreOp::set(&value, "hello"),
        ])
        .await
        .unwrap();

    // Test 1: Sets
    assert_eq!(store.scard(&set).await.unwrap(), 2);
    assert!(store.sismember(&set, "a").await.unwrap());
    let mut members = store.smembers(&set).await.unwrap();
    members.sort();
    assert_eq!(members, vec!["a", "b"]);

    // Test 2: Hashes
    assert!(store.hexists(&hash, "a").await.unwrap());
    assert_eq!(store.hget(&hash, "a").await.unwrap().as_deref(), Some("{\"x\":1}"));
    assert_eq!(
        store
            .hmget(&hash, &["missing".to_string(), "a".to_string()])
            .await
            .unwrap(),
        vec![None, Some("{\"x\":1}".to_string())]
    );
    assert_eq!(store.hkeys(&hash).await.unwrap(), vec!["a"]);

    // Test 3: Sorted sets
    assert_eq!(store.zscore(&zset, "b").await.unwrap(), Some(20.0));
    assert_eq!(
        store.zrange_by_score(&zset, 10.0, 15.0).await.unwrap(),
        vec!["a"]
    );

    // Test 4: Strings
    assert_eq!(store.get(&value).await.unwrap().as_deref(), Some("hello"));

    // Test 5: Removal empties and deletes keys
    store
        .apply(vec![
            StoreOp::srem(&set, "a"),
            StoreOp::srem(&set, "b"),
            StoreOp::hdel(&hash, "a"),
            StoreOp::zrem(&zset, "a"),
            StoreOp::del(&value),
        ])
        .await
        .unwrap();

    assert_eq!(store.scard(&set).await.unwrap(), 0);
    assert!(!store.hexists(&hash, "a").await.unwrap());
    assert_eq!(store.zscore(&zset, "a").await.unwrap(), None);
    assert!(store.get(&value).await.unwrap().is_none());

    store.apply(vec![StoreOp::del(&zset)]).await.unwrap();
}

async fn test_set_algebra(store: Arc<dyn IndexStore>) {
    let p = unique_prefix();
    let left = format!("{}:left", p);
    let right = format!("{}:right", p);
    let union = format!("{}:union", p);
    let inter = format!("{}:inter", p);
    let range = format!("{}:range", p);
    let ttl = Duration::from_secs(30);

    store
        .apply(vec![
            StoreOp::sadd(&left, "1"),
            StoreOp::sadd(&left, "2"),
            StoreOp::sadd(&right, "2"),
            StoreOp::sadd(&right, "3"),
        ])
        .await
        .unwrap();

    let keys = vec![left.clone(), right.clone()];
    assert_eq!(store.union_store(&union, &keys, ttl).await.unwrap(), 3);
    assert_eq!(store.inter_store(&inter, &keys, ttl).await.unwrap(), 1);
    assert_eq!(store.smembers(&inter).await.unwrap(), vec!["2"]);

    // Derived keys always expire
    for key in [&union, &inter] {
        let remaining = store.ttl(key).await.unwrap().unwrap();
        assert!(remaining <= ttl && remaining > Duration::ZERO);
    }

    // Replacing drops previous members
    store
        .replace_set(&range, &["1".to_string(), "2".to_string()], ttl)
        .await
        .unwrap();
    store
        .replace_set(&range, &["3".to_string()], ttl)
        .await
        .unwrap();
    assert_eq!(store.smembers(&range).await.unwrap(), vec!["3"]);
    assert!(store.ttl(&range).await.unwrap().is_some());

    store
        .apply(
            [&left, &right, &union, &inter, &range]
                .into_iter()
                .map(StoreOp::del)
                .collect(),
        )
        .await
        .unwrap();
}

async fn test_sort_by_pattern(store: Arc<dyn IndexStore>) {
    let p = unique_prefix();
    let set = format!("{}:set", p);

    let mut ops = Vec::new();
    for (id, title, prize) in [("x", "beta", "9"), ("y", "alpha", "100"), ("z", "gamma", "20")] {
        ops.push(StoreOp::sadd(&set, id));
        ops.push(StoreOp::set(format!("{}:title:{}", p, id), title));
        ops.push(StoreOp::set(format!("{}:prize:{}", p, id), prize));
    }
    store.apply(ops).await.unwrap();

    let alpha = SortRequest {
        by_pattern: format!("{}:title:*", p),
        alpha: true,
        descending: false,
    };
    assert_eq!(store.sort(&set, &alpha).await.unwrap(), vec!["y", "x", "z"]);

    let numeric_desc = SortRequest {
        by_pattern: format!("{}:prize:*", p),
        alpha: false,
        descending: true,
    };
    assert_eq!(
        store.sort(&set, &numeric_desc).await.unwrap(),
        vec!["y", "z", "x"]
    );

    let mut cleanup = vec![StoreOp::del(&set)];
    for id in ["x", "y", "z"] {
        cleanup.push(StoreOp::del(format!("{}:title:{}", p, id)));
        cleanup.push(StoreOp::del(format!("{}:prize:{}", p, id)));
    }
    store.apply(cleanup).await.unwrap();
}

async fn test_index_round_trip(store: Arc<dyn IndexStore>) {
    let config = IndexConfig {
        key_prefix: unique_prefix(),
        ..IndexConfig::default()
    };
    let index = ChallengeIndex::new(store, config).unwrap();

    let mut first = Challenge::new("c1", "Ruby on Heroku", "Code", Utc::now());
    first.platforms = vec!["Heroku".to_string()];
    first.total_prize_money = 1500;
    let mut second = Challenge::new("c2", "Apex on Salesforce", "Code", Utc::now());
    second.platforms = vec!["Salesforce".to_string()];
    second.total_prize_money = 3000;

    index.upsert(&first).await.unwrap();
    index.upsert(&second).await.unwrap();

    let request = SearchRequest::new()
        .with_categories(["code"])
        .with_prize_money(NumericFilter::range(Some(1000), None))
        .sort_by(SortField::PrizeMoney)
        .order(SortOrder::Desc);
    let results = index.search(&request).await.unwrap();
    assert_eq!(
        results
            .iter()
            .map(|c| c.challenge_id.as_str())
            .collect::<Vec<_>>(),
        vec!["c2", "c1"]
    );

    let ruby = SearchRequest::new().with_query("ruby");
    assert_eq!(index.search(&ruby).await.unwrap(), vec![first]);

    let report = index.reconcile(&[]).await.unwrap();
    assert_eq!(report.stale_removed, 2);
    assert!(index.indexed_ids().await.unwrap().is_empty());
}

// InMemoryStore tests
fn in_memory() -> Arc<dyn IndexStore> {
    Arc::new(InMemoryStore::new())
}

#[tokio::test]
async fn test_inmemory_operations() {
    test_store_operations(in_memory()).await;
}

#[tokio::test]
async fn test_inmemory_set_algebra() {
    test_set_algebra(in_memory()).await;
}

#[tokio::test]
async fn test_inmemory_sort() {
    test_sort_by_pattern(in_memory()).await;
}

#[tokio::test]
async fn test_inmemory_index_round_trip() {
    test_index_round_trip(in_memory()).await;
}

#[tokio::test]
async fn test_inmemory_wrong_type() {
    let store = in_memory();
    store.apply(vec![StoreOp::set("k", "v")]).await.unwrap();
    assert!(store.smembers("k").await.is_err());
}

// RedisStore tests (conditional on Redis being available)
async fn redis_store() -> Option<Arc<dyn IndexStore>> {
    match RedisStore::new(REDIS_URL).await {
        Ok(store) => Some(Arc::new(store)),
        Err(_) => {
            eprintln!("Skipping test: Redis not available");
            None
        }
    }
}

#[tokio::test]
async fn test_redis_operations() {
    if let Some(store) = redis_store().await {
        test_store_operations(store).await;
    }
}

#[tokio::test]
async fn test_redis_set_algebra() {
    if let Some(store) = redis_store().await {
        test_set_algebra(store).await;
    }
}

#[tokio::test]
async fn test_redis_sort() {
    if let Some(store) = redis_store().await {
        test_sort_by_pattern(store).await;
    }
}

#[tokio::test]
async fn test_redis_index_round_trip() {
    if let Some(store) = redis_store().await {
        test_index_round_trip(store).await;
    }
}
