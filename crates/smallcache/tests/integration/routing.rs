use crate::cluster;

#[tokio::test]
async fn test_remote_key_is_loaded_by_owner() {
    smallcache_test::setup();

    let [a, b] = cluster(["A", "B"]);
    let key = a.key_owned_by(&b, "alice");

    let value = a.group.get(&key).await.unwrap();

    assert_eq!(value.to_string(), format!("{key}@B"));
    assert_eq!(
        b.hits.all_hits(),
        [(format!("/_smallcache/scores/{key}"), 1)]
    );
    assert_eq!(a.hits.accesses(), 0);
    assert_eq!((a.loads(), b.loads()), (0, 1));
    assert!(b.group.is_cached(&key));
    assert!(!a.group.is_cached(&key));

    // The requesting shard does not keep a copy, the owner answers from its cache.
    let value = a.group.get(&key).await.unwrap();
    assert_eq!(value.to_string(), format!("{key}@B"));
    assert_eq!(b.hits.accesses(), 1);
    assert_eq!(b.loads(), 1);
}

#[tokio::test]
async fn test_owned_key_is_loaded_locally() {
    smallcache_test::setup();

    let [a, b] = cluster(["A", "B"]);
    let key = b.key_owned_by(&b, "bob");

    for _ in 0..2 {
        let value = b.group.get(&key).await.unwrap();
        assert_eq!(value.to_string(), format!("{key}@B"));
    }

    assert_eq!(a.hits.accesses(), 0);
    assert_eq!(b.hits.accesses(), 0);
    assert_eq!((a.loads(), b.loads()), (0, 1));
}

#[tokio::test]
async fn test_concurrent_misses_share_one_peer_request() {
    smallcache_test::setup();

    let [a, b] = cluster(["A", "B"]);
    let key = a.key_owned_by(&b, "carol");

    let requests = (0..10).map(|_| a.group.get(&key));
    let results = futures::future::join_all(requests).await;

    for result in results {
        assert_eq!(result.unwrap().to_string(), format!("{key}@B"));
    }
    assert_eq!(b.hits.accesses(), 1);
    assert_eq!(b.loads(), 1);
}

#[tokio::test]
async fn test_unreachable_owner_falls_back_to_local_load() {
    smallcache_test::setup();

    let [a, mut b] = cluster(["A", "B"]);
    let key = a.key_owned_by(&b, "dave");
    b.shutdown().await;

    let value = a.group.get(&key).await.unwrap();

    assert_eq!(value.to_string(), format!("{key}@A"));
    assert_eq!((a.loads(), b.loads()), (1, 0));
    assert!(a.group.is_cached(&key));
}

#[tokio::test]
async fn test_owner_failure_falls_back_to_local_load() {
    smallcache_test::setup();

    let [a, b] = cluster(["A", "B"]);
    // B answers with 500, A then tries its own loader which fails the same way.
    let key = a.key_owned_by(&b, "missing");

    let err = a.group.get(&key).await.unwrap_err();

    assert_eq!(err.to_string(), format!("{key} not exist"));
    assert_eq!(b.hits.accesses(), 1);
    assert_eq!((a.loads(), b.loads()), (1, 1));
    assert!(!a.group.is_cached(&key));
    assert!(!b.group.is_cached(&key));
}

#[tokio::test]
async fn test_keys_are_escaped() {
    smallcache_test::setup();

    let [a, b] = cluster(["A", "B"]);
    let key = a.key_owned_by(&b, "user/ü x?");

    let value = a.group.get(&key).await.unwrap();

    assert_eq!(value.to_string(), format!("{key}@B"));
    let hits = b.hits.all_hits();
    assert_eq!(hits.len(), 1);
    assert!(
        hits[0].0.starts_with("/_smallcache/scores/user%2F%C3%BC%20x%3F"),
        "{hits:?}"
    );
    assert!(b.group.is_cached(&key));
}

#[tokio::test]
async fn test_every_shard_agrees_on_owner() {
    smallcache_test::setup();

    let shards = cluster(["A", "B", "C"]);
    for i in 0..20 {
        let key = format!("key-{i}");
        let owner = shards[0].pool.owner(&key).unwrap();
        let owner = shards.iter().find(|shard| shard.url == owner).unwrap();

        for shard in &shards {
            let value = shard.group.get(&key).await.unwrap();
            assert_eq!(value.to_string(), format!("{key}@{}", owner.name));
        }
    }

    let loads: usize = shards.iter().map(|shard| shard.loads()).sum();
    assert_eq!(loads, 20);
}
