//! Child-process helpers shared across the workspace.
//!
//! Dump tools write their artifact to stdout and diagnostics to stderr, so the
//! main helper here streams stdout straight into a file and keeps stderr around
//! for the error message.

use std::ffi::OsStr;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Stdio;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` that is killed when dropped.
///
/// Dropping the future that drives the child (for example on timeout) also
/// terminates the process.
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(true);
    cmd
}

/// Run `cmd` with stdout redirected into `output_path`.
///
/// The file is created (or truncated) before the process starts. A non-zero
/// exit status is turned into an error carrying the trimmed stderr output.
pub async fn run_to_file(mut cmd: tokio::process::Command, output_path: &Path) -> io::Result<()> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();
    let file = File::create(output_path)?;

    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(file))
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|e| {
        io::Error::new(e.kind(), format!("failed to spawn {}: {}", program, e))
    })?;
    let output = child.wait_with_output().await?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(io::Error::other(format!(
        "{} exited with {}: {}",
        program,
        output.status,
        stderr.trim()
    )))
}
