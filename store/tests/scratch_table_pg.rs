//! Exercises `ScratchTableStore` via `StoreFactory` against a real Postgres
//! container: insert/len/chunks/difference/clear, and two group-id
//! partitions of the same physical table staying isolated from each other.
//! Needs a Docker daemon; skip entirely when one isn't reachable.

use deadpool_postgres::{Pool, Runtime};
use sql::PostgresSqlProvider;
use std::sync::Arc;
use store::StoreFactory;
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::postgres::Postgres;

async fn start_postgres() -> ContainerAsync<Postgres> {
    Postgres::default()
        .start()
        .await
        .expect("starting the postgres container for this test")
}

async fn connect_pool(container: &ContainerAsync<Postgres>) -> Pool {
    let host_port = container.get_host_port_ipv4(5432).await.expect("mapped port");
    let mut cfg = deadpool_postgres::Config::new();
    cfg.host = Some("127.0.0.1".to_string());
    cfg.port = Some(host_port);
    cfg.dbname = Some("postgres".to_string());
    cfg.user = Some("postgres".to_string());
    cfg.password = Some("postgres".to_string());
    cfg.create_pool(Some(Runtime::Tokio1), tokio_postgres::NoTls).expect("building the pool")
}

#[tokio::test]
async fn scratch_table_store_roundtrips_and_isolates_group_ids() {
    let container = start_postgres().await;
    let pool = connect_pool(&container).await;

    let factory = StoreFactory::new(pool, Arc::new(PostgresSqlProvider), "storage_data".to_string(), true);
    factory.ensure_scratch_table().await.expect("creating the scratch table");

    let store_a = factory.new_store();
    let store_b = factory.new_store();

    assert!(store_a.is_empty().await.expect("checking store_a emptiness"));

    let values: Vec<String> = (0..2_500).map(|n| n.to_string()).collect();
    store_a.insert_many(&values).await.expect("inserting into store_a");
    store_b.insert_many(&["9999".to_string()]).await.expect("inserting into store_b");

    assert_eq!(store_a.len().await.expect("reading store_a's length"), values.len());
    assert_eq!(store_b.len().await.expect("reading store_b's length"), 1);

    let mut collected: Vec<String> = Vec::new();
    for chunk in store_a.chunks(500).await.expect("chunking store_a") {
        collected.extend(chunk);
    }
    collected.sort_by_key(|v| v.parse::<i64>().expect("every value is numeric"));
    let mut expected = values.clone();
    expected.sort_by_key(|v| v.parse::<i64>().expect("every value is numeric"));
    assert_eq!(collected, expected);

    let disjoint = store_b.difference(store_a.as_ref()).await.expect("diffing store_b against store_a");
    assert_eq!(disjoint, vec!["9999".to_string()]);

    store_a.clear().await.expect("clearing store_a");
    assert!(store_a.is_empty().await.expect("checking store_a after clear"));
    assert_eq!(store_b.len().await.expect("store_b survives store_a's clear"), 1);

    factory.drop_scratch_table().await.expect("dropping the scratch table");
}
