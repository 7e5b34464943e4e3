//! Port contracts for proxy group management.
//!
//! Ports define the infrastructure-agnostic seams used by the manager and
//! the update service. All ports are synchronous; both services run on
//! dedicated threads.

pub mod activity;
pub mod macros;
pub mod store;
pub mod topology;

pub use activity::{ActivityReporter, ActivityState};
pub use macros::MacroResolver;
pub use store::{ProxyGroupStore, StoreError, StoreResult};
pub use topology::TopologySource;
