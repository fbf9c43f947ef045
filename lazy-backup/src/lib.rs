//! lazy-backup library crate.
//!
//! Scheduled database backups uploaded to remote storage, with run history and
//! multi-channel notifications.

pub mod auth;
pub mod backup;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod notification;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{Error, Result};
