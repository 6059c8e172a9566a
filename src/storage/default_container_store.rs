//! The default directory-tree backed container store.

use crate::container::{ContainerId, ContainerMap};
use crate::error::{Error, Result};
use crate::fsutil;
use crate::rollback::Rollback;
use crate::storage::{ContainerHandle, ContainerStore};
use getset::Getters;
use log::warn;
use std::fs;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Getters)]
/// Store keeping every container under `<root>/containers/<id>/`.
pub struct DefaultContainerStore {
    #[get]
    root_dir: PathBuf,
}

impl DefaultContainerStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    fn containers_dir(&self) -> PathBuf {
        self.root_dir.join("containers")
    }

    fn container_dir(&self, id: &ContainerId) -> PathBuf {
        self.containers_dir().join(id.as_str())
    }

    /// Handle for a container which must exist on disk.
    fn handle(&self, id: &ContainerId) -> Result<ContainerHandle> {
        self.get_container(id)?.ok_or(Error::NotFound)
    }
}

impl ContainerStore for DefaultContainerStore {
    fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn create_container(
        &self,
        id: &ContainerId,
        rollback: Option<&mut Rollback<ContainerMap>>,
    ) -> Result<ContainerHandle> {
        let dir = self.container_dir(id);
        match fsutil::exists(&dir) {
            Ok(true) => return Err(Error::Duplicate(id.to_string())),
            Ok(false) => {}
            Err(e) => return Err(Error::DirAccessFailed(e.to_string())),
        }

        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&dir)
            .map_err(|e| Error::DirAccessFailed(e.to_string()))?;

        if let Some(rb) = rollback {
            let store = self.clone();
            let id = id.clone();
            rb.add(move |_: &mut ContainerMap| store.delete_container(&id));
        }
        Ok(ContainerHandle::new(id.clone(), dir))
    }

    fn create_container_bundle(&self, id: &ContainerId, spec: &[u8], rootfs: &Path) -> Result<()> {
        let handle = self.handle(id)?;

        fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(handle.bundle_dir())?;
        fsutil::copy_dir(rootfs, &handle.rootfs_dir())?;

        let spec_file = handle.runtime_spec_file();
        fs::write(&spec_file, spec)?;
        fs::set_permissions(&spec_file, fs::Permissions::from_mode(0o644))?;
        Ok(())
    }

    fn get_container(&self, id: &ContainerId) -> Result<Option<ContainerHandle>> {
        let dir = self.container_dir(id);
        match fsutil::exists(&dir) {
            Ok(true) => Ok(Some(ContainerHandle::new(id.clone(), dir))),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::DirAccessFailed(e.to_string())),
        }
    }

    fn delete_container(&self, id: &ContainerId) -> Result<()> {
        match fs::remove_dir_all(self.container_dir(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn find_containers(&self) -> Result<Vec<ContainerHandle>> {
        let entries = match fs::read_dir(self.containers_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().map(ContainerId::parse) {
                Some(Ok(id)) => handles.push(ContainerHandle::new(id, entry.path())),
                _ => warn!(
                    "container store: skipping unexpected dir {:?}",
                    entry.path()
                ),
            }
        }
        Ok(handles)
    }

    fn container_state_read(&self, id: &ContainerId) -> Result<Vec<u8>> {
        let handle = self.handle(id)?;
        Ok(fs::read(handle.state_file())?)
    }

    fn container_state_write_atomic(&self, id: &ContainerId, state: &[u8]) -> Result<()> {
        let handle = self.handle(id)?;
        let state_file = handle.state_file();
        let tmp_file = state_file.with_extension("json.writing");

        fs::write(&tmp_file, state)?;
        fs::set_permissions(&tmp_file, fs::Permissions::from_mode(0o600))?;
        fs::rename(&tmp_file, &state_file)?;
        Ok(())
    }

    fn container_state_delete_atomic(&self, id: &ContainerId) -> Result<()> {
        let handle = self.handle(id)?;
        fs::remove_file(handle.state_file())?;
        Ok(())
    }
}
