//! One-shot sync pipe inherited by the shim.
//!
//! The shim confirms the container PID by writing a single JSON report to an
//! inherited file descriptor. Rust has no equivalent of handing a child an
//! extra descriptor out of the box, so the write end is `dup2`-ed into place
//! below the stdio descriptors via `pre_exec`.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::io;
use std::os::raw::c_int;
use std::os::unix::io::{FromRawFd, RawFd};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::time;

/// Descriptor number the shim observes for the sync pipe: the write end is
/// the only descriptor inherited beyond stdio, so it lands right after
/// stderr.
pub const SYNC_PIPE_FD: RawFd = 3;

/// Report written by the shim once the fate of the container is known.
#[derive(Debug, Deserialize)]
pub struct ShimReport {
    #[serde(default)]
    pub kind: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub stderr: String,

    #[serde(default)]
    pub pid: i32,
}

impl ShimReport {
    /// Whether the report confirms a spawned container.
    pub fn is_container_pid(&self) -> bool {
        self.kind == "container_pid" && self.pid > 0
    }
}

/// One-shot pipe whose write end is inherited by the shim.
#[derive(Debug)]
pub struct SyncPipe {
    reader: tokio::fs::File,
    write_fd: RawFd,
    write_open: bool,
}

impl SyncPipe {
    pub fn new() -> Result<Self> {
        let (read_fd, write_fd) = create_pipe()?;
        let file = unsafe { std::fs::File::from_raw_fd(read_fd) };
        Ok(Self {
            reader: tokio::fs::File::from_std(file),
            write_fd,
            write_open: true,
        })
    }

    /// The raw descriptor to `dup2` into the child as [`SYNC_PIPE_FD`].
    pub fn child_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Close our copy of the write end. Must happen before reading the
    /// report, otherwise the read can never observe EOF.
    pub fn close_write(&mut self) {
        if self.write_open {
            unsafe { libc::close(self.write_fd) };
            self.write_open = false;
        }
    }

    /// Read the shim's single report, bounded by `timeout`.
    pub async fn read_report(mut self, timeout: Duration) -> Result<ShimReport> {
        let mut buf = Vec::new();
        time::timeout(timeout, self.reader.read_to_end(&mut buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(Error::IoError)?;

        serde_json::from_slice(&buf).map_err(|e| {
            Error::ShimSyncError(format!(
                "failed to decode report [{}]: {}",
                String::from_utf8_lossy(&buf),
                e
            ))
        })
    }
}

impl Drop for SyncPipe {
    fn drop(&mut self) {
        self.close_write();
    }
}

// Both ends carry `FD_CLOEXEC`; the child's copy is produced by `dup2`,
// which clears the flag on the duplicate.
fn create_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds = [-1 as c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}
