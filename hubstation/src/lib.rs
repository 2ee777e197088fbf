//! hubstation library crate.
//!
//! Download dispatch for torrent-style backends with hot-reloaded
//! configuration. The binary wires these modules together through
//! [`services::ServiceContainer`].

pub mod config;
pub mod constants;
pub mod database;
pub mod dispatch;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod notification;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod services;
pub mod site;
pub mod subtitle;
pub mod utils;

pub use error::{Error, Result};
