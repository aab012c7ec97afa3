//! Runs the fixed-point collector against a real Postgres container with a
//! small key/t1/t2 foreign-key chain and checks the key-scoped closure
//! property: rows reachable from the seeded key end up collected, rows that
//! belong to a different key do not. Needs a Docker daemon; skip entirely
//! when one isn't reachable.

use collector::{Collector, CollectorConfig, Seeds, StoreMap};
use deadpool_postgres::{Pool, Runtime};
use model::store_trait::KeyValueStore;
use schema::{introspect, IntrospectionOptions};
use sql::{PostgresSqlProvider, SqlProvider};
use std::collections::HashSet;
use std::sync::Arc;
use store::InMemoryStore;
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

/// Two tenants, each with one `t1` row and one dependent `t2` row, so the
/// test can assert the collector pulls tenant 1's chain and not tenant 2's.
async fn seed_two_tenants(pool: &Pool) {
    let client = pool.get().await.expect("acquiring a setup connection");
    client
        .batch_execute(
            "CREATE TABLE tenant (id serial PRIMARY KEY);
             CREATE TABLE t1 (id serial PRIMARY KEY, tenant_id int REFERENCES tenant(id));
             CREATE TABLE t2 (id serial PRIMARY KEY, t1_id int REFERENCES t1(id));
             INSERT INTO tenant (id) VALUES (1), (2);
             INSERT INTO t1 (id, tenant_id) VALUES (10, 1), (20, 2);
             INSERT INTO t2 (id, t1_id) VALUES (100, 10), (200, 20);",
        )
        .await
        .expect("seeding the two-tenant fixture");
}

#[tokio::test]
async fn collect_pulls_only_the_seeded_tenants_chain() {
    let container = start_postgres().await;
    let pool = connect_pool(&container).await;
    seed_two_tenants(&pool).await;

    let sql: Arc<dyn SqlProvider> = Arc::new(PostgresSqlProvider);
    let options = IntrospectionOptions {
        schema_name: "public".to_string(),
        key_table_name: "tenant".to_string(),
        key_column_names: vec!["tenant_id".to_string()],
        key_table_hierarchy_column_name: None,
        excluded_tables: HashSet::new(),
        generic_fk_tables: HashSet::new(),
        scratch_table_name: "storage_data".to_string(),
        tables_limit_per_transaction: 100,
    };
    let graph = introspect(&pool, &sql, &options).await.expect("introspecting the test schema");

    let stores: StoreMap = graph
        .tables
        .keys()
        .map(|name| (name.clone(), Box::new(InMemoryStore::new()) as Box<dyn KeyValueStore>))
        .collect();

    let seeds = Seeds {
        key_table_name: "tenant".to_string(),
        key_column_values: vec!["1".to_string()],
        full_transfer_tables: HashSet::new(),
    };

    let collector = Collector::new(
        pool.clone(),
        Arc::clone(&sql),
        CollectorConfig {
            schema_name: "public".to_string(),
            collector_chunk_size: 1000,
            async_separation_coefficient: 0,
            validate_data_before_transferring: true,
        },
    );
    collector.collect(&graph, &stores, &seeds).await.expect("collecting the closure");

    let t1_values = stores.get("t1").expect("t1 store exists").chunks(100).await.expect("reading t1's chunks");
    let t1_values: Vec<String> = t1_values.into_iter().flatten().collect();
    assert_eq!(t1_values, vec!["10".to_string()]);

    let t2_values = stores.get("t2").expect("t2 store exists").chunks(100).await.expect("reading t2's chunks");
    let t2_values: Vec<String> = t2_values.into_iter().flatten().collect();
    assert_eq!(t2_values, vec!["100".to_string()]);
}
