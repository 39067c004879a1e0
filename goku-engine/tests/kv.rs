mod common;

use goku_engine::{Config, ErrorType, Goku};
use goku_types::{EventType, SetOptions, MAX_KEY_SIZE, MAX_VALUE_SIZE};

use common::{assert_events, setup};

#[tokio::test]
async fn empty_store_not_found() {
    let goku = setup().await;

    let err = goku.client().get("").await.unwrap_err();
    assert!(matches!(err.variant, ErrorType::NotFound));

    let err = goku.client().get("missing").await.unwrap_err();
    assert!(matches!(err.variant, ErrorType::NotFound));

    assert_events(&goku, "", &[]).await;
}

#[tokio::test]
async fn invalid_keys() {
    let goku = setup().await;
    let cl = goku.client();

    let too_long = "s".repeat(MAX_KEY_SIZE + 1);
    for key in ["", too_long.as_str(), "a%b"] {
        let err = cl.set(key, b"", SetOptions::default()).await.unwrap_err();
        assert!(matches!(err.variant, ErrorType::InvalidKey), "key={key:?}");
    }

    // Longest valid key
    cl.set(&"s".repeat(MAX_KEY_SIZE), b"", SetOptions::default())
        .await
        .unwrap();

    assert_events(&goku, "", &[EventType::Set]).await;
}

#[tokio::test]
async fn oversized_value() {
    let goku = setup().await;
    let cl = goku.client();

    cl.set("k", &vec![0u8; MAX_VALUE_SIZE], SetOptions::default())
        .await
        .unwrap();

    let err = cl
        .set("k", &vec![0u8; MAX_VALUE_SIZE + 1], SetOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err.variant, ErrorType::InvalidValue));
}

#[tokio::test]
async fn set_then_get() {
    let goku = setup().await;
    let cl = goku.client();

    cl.set("k", b"v1", SetOptions::default()).await.unwrap();

    let kv = cl.get("k").await.unwrap();
    assert_eq!(kv.key, "k");
    assert_eq!(kv.value, b"v1");
    assert_eq!(kv.version, 1);
    assert_eq!(kv.created_ref, 1);
    assert_eq!(kv.updated_ref, 1);
    assert_eq!(kv.deleted_ref, 0);
    assert_eq!(kv.lease_id, 1);

    cl.set("k", b"v2", SetOptions::default()).await.unwrap();

    let kv = cl.get("k").await.unwrap();
    assert_eq!(kv.value, b"v2");
    assert_eq!(kv.version, 2);
    assert_eq!(kv.created_ref, 1);
    assert_eq!(kv.updated_ref, 2);
}

#[tokio::test]
async fn updates_bump_the_version() {
    let goku = setup().await;
    let cl = goku.client();

    let assert_kv = |kv: goku_types::KV, version: i64, value: &str| {
        assert_eq!(kv.version, version);
        assert_eq!(kv.value, value.as_bytes());
    };

    for (version, value) in [(1, ""), (2, "1"), (3, "aba"), (4, "")] {
        cl.set("key", value.as_bytes(), SetOptions::default())
            .await
            .unwrap();
        assert_kv(cl.get("key").await.unwrap(), version, value);
    }

    assert_events(&goku, "", &[EventType::Set; 4]).await;
}

#[tokio::test]
async fn delete_then_recreate() {
    let goku = setup().await;
    let cl = goku.client();

    cl.set("key", b"", SetOptions::default()).await.unwrap();
    cl.set("key", b"1", SetOptions::default()).await.unwrap();

    cl.delete("key").await.unwrap();
    let err = cl.get("key").await.unwrap_err();
    assert!(matches!(err.variant, ErrorType::NotFound));

    // Deleting a tombstone is a not-found, not a no-op
    let err = cl.delete("key").await.unwrap_err();
    assert!(matches!(err.variant, ErrorType::NotFound));

    cl.set("key", b"new", SetOptions::default()).await.unwrap();

    let kv = cl.get("key").await.unwrap();
    assert_eq!(kv.value, b"new");
    assert_eq!(kv.version, 4);
    // The first incarnation's created_ref survives the tombstone, the lease
    // does not.
    assert_eq!(kv.created_ref, 1);
    assert_eq!(kv.updated_ref, 4);
    assert_eq!(kv.deleted_ref, 0);
    assert_eq!(kv.lease_id, 2);

    assert_events(
        &goku,
        "",
        &[
            EventType::Set,
            EventType::Set,
            EventType::Delete,
            EventType::Set,
        ],
    )
    .await;
}

#[tokio::test]
async fn list_returns_keys_in_order() {
    let goku = setup().await;
    let cl = goku.client();

    for i in 0..20 {
        cl.set(&i.to_string(), b"", SetOptions::default())
            .await
            .unwrap();
    }

    let kvs = cl.list("").await.unwrap();
    assert_eq!(kvs.len(), 20);

    let keys = cl
        .list("1")
        .await
        .unwrap()
        .into_iter()
        .map(|kv| kv.key)
        .collect::<Vec<_>>();
    assert_eq!(
        keys,
        vec!["1", "10", "11", "12", "13", "14", "15", "16", "17", "18", "19"]
    );

    assert!(cl.list("nope").await.unwrap().is_empty());
}

#[tokio::test]
async fn list_skips_tombstones() {
    let goku = setup().await;
    let cl = goku.client();

    cl.set("a", b"", SetOptions::default()).await.unwrap();
    cl.set("b", b"", SetOptions::default()).await.unwrap();
    cl.delete("a").await.unwrap();

    let keys = cl
        .list("")
        .await
        .unwrap()
        .into_iter()
        .map(|kv| kv.key)
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["b"]);
}

#[tokio::test]
async fn create_only() {
    let goku = setup().await;
    let cl = goku.client();

    cl.set("k", b"", SetOptions::default().create_only())
        .await
        .unwrap();

    let err = cl
        .set("k", b"", SetOptions::default().create_only())
        .await
        .unwrap_err();
    assert!(matches!(err.variant, ErrorType::Conditional));

    // Tombstones count as prior existence
    cl.delete("k").await.unwrap();
    let err = cl
        .set("k", b"", SetOptions::default().create_only())
        .await
        .unwrap_err();
    assert!(matches!(err.variant, ErrorType::Conditional));
}

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("goku.db");
    let path = path.to_str().unwrap();

    {
        let goku = Goku::open(Config::new(path)).await.unwrap();
        goku.client()
            .set("k", b"v", SetOptions::default())
            .await
            .unwrap();
    }

    let goku = Goku::open(Config::new(path)).await.unwrap();
    let kv = goku.client().get("k").await.unwrap();
    assert_eq!(kv.value, b"v");
    assert_eq!(kv.version, 1);
    assert_events(&goku, "", &[EventType::Set]).await;
}

#[tokio::test]
async fn prev_version() {
    let goku = setup().await;
    let cl = goku.client();

    // On a non-existent key the check is a version mismatch
    let err = cl
        .set("k", b"", SetOptions::default().with_prev_version(1))
        .await
        .unwrap_err();
    assert!(matches!(err.variant, ErrorType::Conditional));

    cl.set("k", b"", SetOptions::default()).await.unwrap();

    cl.set("k", b"", SetOptions::default().with_prev_version(1))
        .await
        .unwrap();

    let err = cl
        .set("k", b"", SetOptions::default().with_prev_version(1))
        .await
        .unwrap_err();
    assert!(matches!(err.variant, ErrorType::Conditional));

    assert_eq!(cl.get("k").await.unwrap().version, 2);
}
