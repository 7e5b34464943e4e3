//! `PostgreSQL` adapter for proxy group state and host mappings.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresProxyGroupStore, ProxyGroupPgPool};
