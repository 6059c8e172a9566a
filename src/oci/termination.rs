//! Parsing of the termination record the shim writes when a container
//! process ends.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use log::error;
use serde::Deserialize;

const REASON_EXITED: &str = "exited";
const REASON_SIGNALED: &str = "signaled";

#[derive(Debug, Deserialize)]
struct Attrs {
    at: DateTime<Utc>,

    #[serde(default, rename = "exitCode")]
    exit_code: i32,

    #[serde(default)]
    signal: i32,

    reason: String,
}

/// Validated termination status of a container process.
#[derive(Debug)]
pub struct TerminationStatus {
    raw: Attrs,
}

/// Parse and validate the raw bytes of an exit file.
pub fn parse_exit_file(bytes: &[u8]) -> Result<TerminationStatus> {
    let raw: Attrs = serde_json::from_slice(bytes)
        .map_err(|e| Error::ShimSyncError(format!("malformed exit file: {}", e)))?;

    if raw.reason != REASON_EXITED && raw.reason != REASON_SIGNALED {
        return Err(Error::ShimSyncError(format!(
            "unexpected termination reason \"{}\"",
            raw.reason
        )));
    }
    if raw.reason == REASON_EXITED && !(0..=127).contains(&raw.exit_code) {
        return Err(Error::ShimSyncError(format!(
            "unexpected exit code {}",
            raw.exit_code
        )));
    }
    if raw.reason == REASON_SIGNALED && raw.signal <= 0 {
        return Err(Error::ShimSyncError(format!(
            "unexpected signal {}",
            raw.signal
        )));
    }
    Ok(TerminationStatus { raw })
}

impl TerminationStatus {
    /// Wall-clock time of the termination.
    pub fn at(&self) -> DateTime<Utc> {
        self.raw.at
    }

    pub fn is_signaled(&self) -> bool {
        self.raw.reason == REASON_SIGNALED
    }

    /// Exit code of a normally exited container. Asking for it on a signaled
    /// termination is a caller bug; it is logged and reported as `-1`.
    pub fn exit_code(&self) -> i32 {
        if self.is_signaled() {
            error!("exit_code() must not be used when the container was killed by a signal");
            return -1;
        }
        self.raw.exit_code
    }

    /// Signal that terminated the container. Asking for it on a normal exit
    /// is a caller bug; it is logged and reported as `-1`.
    pub fn signal(&self) -> i32 {
        if !self.is_signaled() {
            error!("signal() must not be used when the container exited normally");
            return -1;
        }
        self.raw.signal
    }
}
