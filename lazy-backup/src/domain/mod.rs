//! Domain types shared by the scheduler, executor and dispatcher.

pub mod channel;
pub mod history;
pub mod job;
pub mod token;

pub use channel::{ChannelConfig, ChannelKind, ChannelSettings};
pub use history::{ArtifactInfo, BackupRun, RunStatus};
pub use job::{BackupMode, JobConfig, database_kind_of};
pub use token::OAuthToken;

fn default_true() -> bool {
    true
}
