//! Shared helpers for the `PostgreSQL` store tests.

pub use super::cluster::{BoxError, PostgresCluster, postgres_cluster};
use super::cluster::{ManagedCluster, TemporaryDatabase};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use proxy_groups::proxy_group::adapters::postgres::PostgresProxyGroupStore;
use uuid::Uuid;

/// Schema of the proxy group tables.
pub const CREATE_SCHEMA_SQL: &str =
    include_str!("../../migrations/2026-05-04-000000_create_proxy_group_tables/up.sql");

/// Template database holding the migrated schema.
pub const TEMPLATE_DB: &str = "proxy_groups_test_template";

/// One group with two member proxies, one free proxy, and three hosts of
/// which two belong to the group.
pub const TOPOLOGY_SQL: &str = "
    INSERT INTO proxy_group (proxy_groupid, name, failover_delay, min_online)
        VALUES (1, 'core', '60', '{$MIN_ONLINE}');
    INSERT INTO proxy (proxyid, name, proxy_groupid)
        VALUES (10, 'edge-10', 1), (11, 'edge-11', 1), (12, 'spare', NULL);
    INSERT INTO proxy_rtdata (proxyid, lastaccess)
        VALUES (10, '2026-05-04 08:00:00+00'), (11, NULL);
    INSERT INTO hosts (hostid, proxy_groupid)
        VALUES (100, 1), (101, 1), (102, NULL);
";

/// Store bound to a scratch database.
///
/// Field order matters: the store's pool closes before the database drops.
pub struct StoreContext {
    /// Store under test.
    pub store: PostgresProxyGroupStore,
    /// URL of the scratch database, for direct assertions.
    pub url: String,
    _database: TemporaryDatabase,
}

impl StoreContext {
    /// Creates a migrated scratch database and a store over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the template, the database, or the pool cannot
    /// be created.
    pub fn create(cluster: &'static ManagedCluster) -> Result<Self, BoxError> {
        cluster.ensure_template(TEMPLATE_DB, apply_migrations)?;
        let database =
            cluster.temporary_database(&format!("test_{}", Uuid::new_v4().simple()), TEMPLATE_DB)?;
        let url = database.url();
        let pool = Pool::builder()
            .max_size(2)
            .build(ConnectionManager::<PgConnection>::new(url.clone()))
            .map_err(|err| Box::new(err) as BoxError)?;
        Ok(Self {
            store: PostgresProxyGroupStore::new(pool),
            url,
            _database: database,
        })
    }

    /// Creates a context with [`TOPOLOGY_SQL`] loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if setup or seeding fails.
    pub fn seeded(cluster: &'static ManagedCluster) -> Result<Self, BoxError> {
        let context = Self::create(cluster)?;
        context.execute(TOPOLOGY_SQL)?;
        Ok(context)
    }

    /// Runs raw SQL against the scratch database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or the statements fail.
    pub fn execute(&self, sql: &str) -> Result<(), BoxError> {
        let mut connection =
            PgConnection::establish(&self.url).map_err(|err| Box::new(err) as BoxError)?;
        connection
            .batch_execute(sql)
            .map_err(|err| Box::new(err) as BoxError)
    }

    /// Reads the persisted `state` column of one row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn state_of(&self, table: &str, key: &str, id: i64) -> Result<i32, BoxError> {
        #[derive(QueryableByName)]
        struct StateRow {
            #[diesel(sql_type = diesel::sql_types::Integer)]
            state: i32,
        }

        let mut connection =
            PgConnection::establish(&self.url).map_err(|err| Box::new(err) as BoxError)?;
        let row = diesel::sql_query(format!("SELECT state FROM {table} WHERE {key} = $1"))
            .bind::<diesel::sql_types::BigInt, _>(id)
            .get_result::<StateRow>(&mut connection)
            .map_err(|err| Box::new(err) as BoxError)?;
        Ok(row.state)
    }
}

fn apply_migrations(url: &str) -> Result<(), BoxError> {
    let mut connection = PgConnection::establish(url).map_err(|err| Box::new(err) as BoxError)?;
    connection
        .batch_execute(CREATE_SCHEMA_SQL)
        .map_err(|err| Box::new(err) as BoxError)
}
