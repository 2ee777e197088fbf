//! Configuration module.
//!
//! This module provides the YAML configuration store, the category policy
//! document and the file-watch driven reload monitor.

pub mod debounce;
pub mod monitor;
pub mod policy;
pub mod store;

pub use debounce::ReloadMarkers;
pub use monitor::{ConfigChangeMonitor, MonitorConfig, MonitorOutcome};
pub use policy::CategoryPolicy;
pub use store::{Baseline, ConfigSnapshot, ConfigStore, EMBEDDED_BASELINE};
