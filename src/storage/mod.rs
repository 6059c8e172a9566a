//! On-disk container storage.

pub mod default_container_store;

pub use default_container_store::DefaultContainerStore;

use crate::container::{ContainerId, ContainerMap};
use crate::error::Result;
use crate::rollback::Rollback;
use getset::Getters;
use std::path::{Path, PathBuf};

/// Handle to one container's directory tree below the store root.
#[derive(Clone, Debug, Getters)]
pub struct ContainerHandle {
    #[get = "pub"]
    /// The container this handle belongs to.
    container_id: ContainerId,

    #[get = "pub"]
    /// The per-container directory.
    container_dir: PathBuf,
}

impl ContainerHandle {
    pub(crate) fn new(container_id: ContainerId, container_dir: PathBuf) -> Self {
        Self {
            container_id,
            container_dir,
        }
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.container_dir.join("bundle")
    }

    pub fn rootfs_dir(&self) -> PathBuf {
        self.bundle_dir().join("rootfs")
    }

    pub fn runtime_spec_file(&self) -> PathBuf {
        self.bundle_dir().join("config.json")
    }

    pub fn state_file(&self) -> PathBuf {
        self.container_dir.join("state.json")
    }
}

/// Persistent store for container directories, bundles and state files.
/// The lifecycle manager serializes all access, so implementations carry no
/// locking of their own.
pub trait ContainerStore {
    /// The directory all container state lives under.
    fn root_dir(&self) -> &Path;

    /// Create the container directory (mode 0700). When a rollback log is
    /// given, a compensating `delete_container` is recorded.
    fn create_container(
        &self,
        id: &ContainerId,
        rollback: Option<&mut Rollback<ContainerMap>>,
    ) -> Result<ContainerHandle>;

    /// Create the OCI bundle: copy the rootfs source tree and write the
    /// runtime spec file (mode 0644).
    fn create_container_bundle(
        &self,
        id: &ContainerId,
        spec: &[u8],
        rootfs: &Path,
    ) -> Result<()>;

    /// Look up the directory handle for a container, `None` when the
    /// container is unknown to the store.
    fn get_container(&self, id: &ContainerId) -> Result<Option<ContainerHandle>>;

    /// Recursively remove the container directory; succeeds when it is
    /// already gone.
    fn delete_container(&self, id: &ContainerId) -> Result<()>;

    /// Enumerate all container directories with well-formed names. Entries
    /// with malformed names are logged and skipped.
    fn find_containers(&self) -> Result<Vec<ContainerHandle>>;

    fn container_state_read(&self, id: &ContainerId) -> Result<Vec<u8>>;

    /// Replace `state.json` atomically: the new content is written to a
    /// sibling temporary and renamed over the target, so readers only ever
    /// observe complete state.
    fn container_state_write_atomic(&self, id: &ContainerId, state: &[u8]) -> Result<()>;

    /// Unlink `state.json`, marking the container ready for cleanup. Fails
    /// when the file is already gone; callers treat that as success.
    fn container_state_delete_atomic(&self, id: &ContainerId) -> Result<()>;
}
