//! Orchestration services for proxy group management.
//!
//! - [`ProxyGroupManager`] owns the control loop
//! - [`UpdateService`] applies live relocation notifications

mod manager;
mod shutdown;
mod update_service;

pub use manager::{
    CycleReport, FlushResult, ManagerError, ManagerPorts, ManagerSettings, ProcessIdentity,
    ProxyGroupManager,
};
pub use shutdown::ShutdownSignal;
pub use update_service::{
    RECEIVE_TIMEOUT, UpdateService, UpdateServiceError, UpdateServiceHandle,
};
