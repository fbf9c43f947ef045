//! Service layer module.
//!
//! This module provides the service container and the management API used by
//! front ends.

pub mod container;
pub mod manager;
pub mod sync;

pub use container::ServiceContainer;
pub use manager::BackupManager;
pub use sync::{SyncConfig, SyncReport};
