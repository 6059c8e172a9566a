//! Container records and their lifecycle status.

mod id;
mod map;

pub use id::ContainerId;
pub use map::ContainerMap;

use crate::error::Result;
use chrono::{DateTime, Utc};
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    PartialEq,
    Serialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
/// Lifecycle status of a container as tracked by the manager.
pub enum ContainerStatus {
    /// The runtime has finished preparing the container but its process has
    /// not been started.
    Created,

    /// The container process is executing.
    Running,

    /// The container process has exited.
    Stopped,

    /// The OCI runtime reported a state this manager does not track; only
    /// produced while refreshing or restoring.
    Unknown,
}

impl ContainerStatus {
    /// Map the status string reported by `<runtime> state`.
    pub fn from_runtime(status: &str) -> Self {
        match status {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "stopped" => ContainerStatus::Stopped,
            _ => ContainerStatus::Unknown,
        }
    }

    /// The state name exposed through the CRI surface.
    pub fn as_cri_str(&self) -> &'static str {
        match self {
            ContainerStatus::Created => "CREATED",
            ContainerStatus::Running => "RUNNING",
            ContainerStatus::Stopped => "EXITED",
            ContainerStatus::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, CopyGetters, Debug, Deserialize, Getters, Serialize)]
#[serde(rename_all = "camelCase")]
/// Per-container mutable state, serialized to `state.json` in the container
/// directory. The identifier, name and log path are fixed at creation.
pub struct Container {
    #[get = "pub"]
    id: ContainerId,

    #[get = "pub"]
    name: String,

    #[get = "pub"]
    log_path: PathBuf,

    #[get_copy = "pub"]
    status: ContainerStatus,

    created_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,

    #[get_copy = "pub"]
    exit_code: i32,
}

impl Container {
    pub fn new(id: ContainerId, name: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            log_path: log_path.into(),
            status: ContainerStatus::Unknown,
            created_at: None,
            started_at: None,
            finished_at: None,
            exit_code: 0,
        }
    }

    pub fn set_status(&mut self, status: ContainerStatus) {
        self.status = status;
    }

    pub fn set_created_at(&mut self, at: DateTime<Utc>) {
        self.created_at = Some(at);
    }

    pub fn set_started_at(&mut self, at: DateTime<Utc>) {
        self.started_at = Some(at);
    }

    pub fn set_finished_at(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub fn set_exit_code(&mut self, code: i32) {
        self.exit_code = code;
    }

    /// Creation time as wall-clock nanoseconds; zero when not yet set.
    pub fn created_at_nanos(&self) -> i64 {
        Self::nanos(self.created_at)
    }

    pub fn started_at_nanos(&self) -> i64 {
        Self::nanos(self.started_at)
    }

    pub fn finished_at_nanos(&self) -> i64 {
        Self::nanos(self.finished_at)
    }

    fn nanos(at: Option<DateTime<Utc>>) -> i64 {
        at.and_then(|t| t.timestamp_nanos_opt()).unwrap_or(0)
    }

    /// Serialize the record into its persistent `state.json` form.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a record from its persistent `state.json` form.
    pub fn from_json(blob: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(blob)?)
    }
}
