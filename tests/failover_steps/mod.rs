//! Step definitions for proxy group failover scenarios.

pub mod given;
pub mod then;
pub mod when;
pub mod world;
