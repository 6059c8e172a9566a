//! Error handling primitives for the container lifecycle core.

use crate::container::ContainerStatus;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A container identifier which is not exactly 32 hex characters.
    #[error("bad container ID format")]
    BadIdFormat,

    /// An ID, name or directory which is already registered.
    #[error("container {0} already exists")]
    Duplicate(String),

    #[error("container not found")]
    NotFound,

    /// The operation is not valid in the container's current lifecycle state.
    #[error("wrong container status \"{actual}\", expected one of {expected:?}")]
    BadState {
        actual: ContainerStatus,
        expected: Vec<ContainerStatus>,
    },

    #[error("can't access container directory: {0}")]
    DirAccessFailed(String),

    /// The OCI runtime CLI returned a nonzero exit status.
    #[error("OCI runtime execution failed, stderr=[{stderr}]")]
    RuntimeError { stderr: String },

    /// The shim sync pipe or a shim-written record carried malformed or
    /// unsuccessful data.
    #[error("shim sync failed: {0}")]
    ShimSyncError(String),

    #[error("timed out waiting for the shim report")]
    Timeout,

    /// The container survived both the TERM and the KILL phase of a stop.
    #[error("cannot kill container, status={0}")]
    CannotKill(ContainerStatus),

    #[error(transparent)]
    IoError(#[from] io::Error),

    #[error("container state (de)serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("OCI runtime spec generation failed: {0}")]
    SpecError(#[from] oci_spec::OciSpecError),
}

impl Error {
    /// Whether this error signals that the target is already gone, which
    /// idempotent cleanup paths treat as success.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound => true,
            Error::IoError(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
