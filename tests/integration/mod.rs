//! Integration test modules for mixhost
//!
//! - lifecycle: module load, processing and teardown
//! - worker: deferred work scheduling and delivery
//! - reconfigure: in-place and reload reconfiguration
//! - session: presets, state and UI traffic
//! - catalog: discovery and host-level loading

pub mod catalog;
pub mod lifecycle;
pub mod reconfigure;
pub mod session;
