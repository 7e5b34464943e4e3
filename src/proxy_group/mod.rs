//! Proxy group management.
//!
//! Keeps an in-memory view of proxy groups, proxies and host assignments
//! synchronised with the database, runs the proxy and group health state
//! machines, assigns hosts to online proxies and persists only the changes.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - The shared cache in [`cache`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - The manager loop and update service in [`services`]

pub mod adapters;
pub mod cache;
pub mod domain;
pub mod ports;
pub mod services;
