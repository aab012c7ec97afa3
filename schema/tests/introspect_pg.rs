//! Runs `introspect()` against a real Postgres container with the
//! scenario-1 key/t1/t2 foreign-key chain and checks the FK graph it builds.
//! Needs a Docker daemon; skip entirely when one isn't reachable.

use deadpool_postgres::{Pool, Runtime};
use schema::{introspect, IntrospectionOptions};
use sql::{PostgresSqlProvider, SqlProvider};
use std::collections::HashSet;
use std::sync::Arc;
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

async fn apply_scenario_1(pool: &Pool) {
    let client = pool.get().await.expect("acquiring a setup connection");
    client
        .batch_execute(
            "CREATE TABLE tenant (id serial PRIMARY KEY);
             CREATE TABLE t1 (id serial PRIMARY KEY, tenant_id int REFERENCES tenant(id));
             CREATE TABLE t2 (id serial PRIMARY KEY, t1_id int REFERENCES t1(id));",
        )
        .await
        .expect("creating the scenario-1 tables");
}

#[tokio::test]
async fn introspect_wires_the_forward_and_reverse_fk_graph() {
    let container = start_postgres().await;
    let pool = connect_pool(&container).await;
    apply_scenario_1(&pool).await;

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

    assert!(graph.tables.contains_key("tenant"));
    let t1 = graph.tables.get("t1").expect("t1 was discovered");
    let fk = t1.columns.iter().find(|c| c.name == "tenant_id").expect("tenant_id column");
    assert_eq!(fk.constraint_table.as_deref(), Some("tenant"));

    let tenant = graph.tables.get("tenant").expect("tenant was discovered");
    let reverse_cols = tenant.revert_foreign_tables.get("t1").expect("t1 reverse-referenced tenant");
    assert!(reverse_cols.contains("tenant_id"));

    let t2 = graph.tables.get("t2").expect("t2 was discovered");
    let fk = t2.columns.iter().find(|c| c.name == "t1_id").expect("t1_id column");
    assert_eq!(fk.constraint_table.as_deref(), Some("t1"));
}
