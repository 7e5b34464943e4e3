//! Proxy groups: failover and host balancing for groups of monitoring
//! proxies.
//!
//! A manager thread reloads group and proxy definitions, evaluates proxy and
//! group health, assigns monitored hosts to online proxies and writes the
//! changes back to `PostgreSQL`. An update service thread applies live
//! relocation notifications received over [`ipc`]. Both share the cache in
//! [`proxy_group::cache`].
//!
//! # Modules
//!
//! - [`proxy_group`]: domain, cache, ports, adapters and services
//! - [`ipc`]: message framing and endpoints
//! - [`config`]: TOML configuration
//! - [`telemetry`]: tracing setup

pub mod config;
pub mod ipc;
pub mod proxy_group;
pub mod telemetry;
