//! Adapter implementations for proxy group ports.
//!
//! - [`memory::InMemoryProxyGroupStore`]: thread-safe in-memory store and
//!   topology source for tests and embedding
//! - [`postgres::PostgresProxyGroupStore`]: `PostgreSQL` persistence using
//!   Diesel
//! - [`macros::UserMacroTable`]: configured user macros
//! - [`activity::ActivityMonitor`]: busy/idle accounting

pub mod activity;
pub mod macros;
pub mod memory;
pub mod postgres;
