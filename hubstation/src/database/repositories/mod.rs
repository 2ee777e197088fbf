//! Repository layer for database access.

pub mod history;
pub mod profile;

pub use history::*;
pub use profile::*;
