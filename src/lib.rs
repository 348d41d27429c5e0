//! safegate - incremental EU Safety Gate (RAPEX) alert sync
//!
//! This crate provides:
//! - A delta loader mirroring the Opendatasoft Safety Gate dataset into SQLite
//! - A daily cron schedule and an HTTP trigger for the same sync
//! - A product safety check comparing products against recent alerts

pub mod check;
pub mod commands;
pub mod config;
pub mod error;
pub mod meta;
pub mod scheduler;
pub mod server;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
