//! Scheduler module for cron-driven backup runs.
//!
//! The Scheduler is responsible for:
//! - Keeping exactly one live trigger per job name
//! - Firing due jobs on a periodic clock
//! - Running each firing as an independent task through the [`JobExecutor`]
//! - Manual triggers and schedule snapshots

pub mod cron;
pub mod executor;
pub mod registry;
pub mod service;

pub use cron::{
    CronSchedule, next_run_times, next_run_times_in, parse_timezone, validate_cron_expression,
};
pub use executor::{JobExecutor, folder_name};
pub use registry::{JobRegistry, ScheduledJob};
pub use service::{Scheduler, SchedulerConfig};
