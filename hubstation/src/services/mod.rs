//! Application services.

pub mod container;

pub use container::{ContainerOptions, ServiceContainer, ServiceDependencies};
