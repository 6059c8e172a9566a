//! Interfaces to the OCI runtime binary and its shim helper.

pub mod pipe;
pub mod runc;
pub mod shimmy;
pub mod spec;
pub mod termination;

pub use runc::RuncRuntime;
pub use runc::RuncRuntimeBuilder;

use crate::container::ContainerId;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// State of a container as reported by `<runtime> state`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StateResp {
    pub id: String,

    #[serde(default)]
    pub pid: i32,

    pub status: String,

    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

/// An OCI container runtime. The default implementation shells out to the
/// runtime CLI; the interface is defined so a library binding fits as well.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// Prepare a new container through the shim: the container process is
    /// cloned but its payload is not started. Resolves to the container PID
    /// reported over the sync pipe, or fails with `Timeout` when no report
    /// arrives within `timeout`.
    #[allow(clippy::too_many_arguments)]
    async fn create_container(
        &self,
        id: &ContainerId,
        bundle_dir: &Path,
        logfile: &Path,
        exitfile: &Path,
        attachfile: &Path,
        stdin: bool,
        stdin_once: bool,
        timeout: Duration,
    ) -> Result<i32>;

    /// Execute the user-defined process in a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<()>;

    /// Send the given signal to the container's init process.
    async fn kill_container(&self, id: &ContainerId, signal: Signal) -> Result<()>;

    /// Release all runtime resources held by the container.
    async fn delete_container(&self, id: &ContainerId) -> Result<()>;

    /// Query the runtime's view of the container.
    async fn container_state(&self, id: &ContainerId) -> Result<StateResp>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_resp_parses_runtime_output() {
        let resp: StateResp = serde_json::from_str(
            r#"{
                "ociVersion": "1.0.2",
                "id": "0123456789abcdef0123456789abcdef",
                "pid": 4422,
                "status": "running",
                "bundle": "/var/lib/crust/containers/x/bundle",
                "created": "2021-03-01T12:00:00.000000Z"
            }"#,
        )
        .unwrap();
        assert_eq!(resp.id, "0123456789abcdef0123456789abcdef");
        assert_eq!(resp.pid, 4422);
        assert_eq!(resp.status, "running");
        assert!(resp.created.is_some());
    }

    #[test]
    fn state_resp_tolerates_missing_optionals() {
        let resp: StateResp =
            serde_json::from_str(r#"{"id": "abc", "status": "stopped"}"#).unwrap();
        assert_eq!(resp.pid, 0);
        assert!(resp.created.is_none());
    }
}
