//! In-memory container index.

use crate::container::{Container, ContainerId};
use crate::error::{Error, Result};
use crate::rollback::Rollback;
use std::collections::HashMap;

/// Dual-keyed index over all containers known to the manager. Every record is
/// reachable by ID and by name, and both keys are unique. The map carries no
/// lock of its own; the lifecycle manager serializes all access.
#[derive(Debug, Default)]
pub struct ContainerMap {
    by_id: HashMap<ContainerId, Container>,
    by_name: HashMap<String, ContainerId>,
}

impl ContainerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under both keys. When a rollback log is given, a
    /// compensating `del` is recorded so a failed operation can unregister
    /// the container again.
    pub fn add(
        &mut self,
        cont: Container,
        rollback: Option<&mut Rollback<ContainerMap>>,
    ) -> Result<()> {
        if self.by_id.contains_key(cont.id()) {
            return Err(Error::Duplicate(cont.id().to_string()));
        }
        if self.by_name.contains_key(cont.name()) {
            return Err(Error::Duplicate(cont.name().clone()));
        }

        let id = cont.id().clone();
        self.by_name.insert(cont.name().clone(), id.clone());
        self.by_id.insert(id.clone(), cont);

        if let Some(rb) = rollback {
            rb.add(move |m: &mut ContainerMap| {
                m.del(&id);
                Ok(())
            });
        }
        Ok(())
    }

    pub fn get(&self, id: &ContainerId) -> Option<&Container> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &ContainerId) -> Option<&mut Container> {
        self.by_id.get_mut(id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Container> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }

    /// Snapshot of all records; ordering is unspecified.
    pub fn all(&self) -> Vec<Container> {
        self.by_id.values().cloned().collect()
    }

    /// Remove a container from both keys. Removing an unknown ID is a no-op.
    pub fn del(&mut self, id: &ContainerId) -> bool {
        match self.by_id.remove(id) {
            Some(cont) => {
                self.by_name.remove(cont.name());
                true
            }
            None => false,
        }
    }
}
