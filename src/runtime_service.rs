//! The container lifecycle manager.
//!
//! Tracks every container through three layers: the in-memory index, the
//! per-container `state.json` on disk and the OCI runtime's own state. One
//! lock serializes all mutations. Status changes are written optimistically
//! before the corresponding runtime command is issued; refreshing against the
//! runtime repairs any divergence a failed command leaves behind.

mod attach;

pub use attach::{AttachInput, AttachOutput};

use crate::container::{Container, ContainerId, ContainerMap, ContainerStatus};
use crate::error::{Error, Result};
use crate::oci::spec::{self, SpecOptions};
use crate::oci::termination;
use crate::oci::Runtime;
use crate::rollback::Rollback;
use crate::storage::{ContainerStore, DefaultContainerStore};
use chrono::Utc;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use log::{error, warn};
use nix::sys::signal::Signal;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

/// How long the sync-pipe read may take before container creation fails.
const CREATE_SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff schedule while waiting for a started container to be reported
/// running.
const STARTED_POLL_DELAYS: [Duration; 5] = [
    Duration::from_millis(250),
    Duration::from_millis(250),
    Duration::from_millis(500),
    Duration::from_millis(500),
    Duration::from_millis(500),
];

/// Backoff schedule applied after each kill signal while waiting for a
/// container to be reported stopped.
const STOPPED_POLL_DELAYS: [Duration; 2] =
    [Duration::from_millis(250), Duration::from_millis(250)];

#[derive(Builder, Clone, CopyGetters, Debug, Getters)]
#[builder(pattern = "owned", setter(into))]
/// Inputs for creating a container.
pub struct ContainerOptions {
    #[get = "pub"]
    /// Human-readable container name, unique within the daemon.
    name: String,

    #[get = "pub"]
    /// Binary to execute inside the container.
    command: String,

    #[get = "pub"]
    #[builder(default)]
    /// Arguments passed to the command.
    args: Vec<String>,

    #[get = "pub"]
    /// Pre-extracted rootfs copied into the bundle.
    rootfs_path: PathBuf,

    #[get_copy = "pub"]
    #[builder(default)]
    /// Mount the rootfs read-only.
    rootfs_readonly: bool,

    #[get_copy = "pub"]
    #[builder(default)]
    /// Keep the container's stdin open.
    stdin: bool,

    #[get_copy = "pub"]
    #[builder(default)]
    /// Close stdin after the first attached client detaches.
    stdin_once: bool,
}

/// Manages container lifecycles by composing the in-memory index, the
/// on-disk store and the OCI runtime adapter.
///
/// All methods are safe to call concurrently; they serialize on one internal
/// lock, which also covers every suspension point of an operation. Only
/// attach escapes the lock for the duration of its stream forwarding.
pub struct RuntimeService {
    /// The single serializing lock over the container index.
    cmap: Mutex<ContainerMap>,
    runtime: Box<dyn Runtime>,
    store: DefaultContainerStore,
    log_dir: PathBuf,
    exit_dir: PathBuf,
    attach_dir: PathBuf,
}

impl RuntimeService {
    /// Build the service and restore all containers surviving in the store.
    pub async fn new(
        runtime: Box<dyn Runtime>,
        store: DefaultContainerStore,
        log_dir: impl Into<PathBuf>,
        exit_dir: impl Into<PathBuf>,
        attach_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let service = Self {
            cmap: Mutex::new(ContainerMap::new()),
            runtime,
            store,
            log_dir: log_dir.into(),
            exit_dir: exit_dir.into(),
            attach_dir: attach_dir.into(),
        };
        service.restore().await?;
        Ok(service)
    }

    /// Prepare a new container: index it, lay out its directory and bundle,
    /// and have the runtime clone its process without starting the payload.
    /// Any failure unwinds all partial progress, so either the whole
    /// container is registered or nothing is.
    pub async fn create_container(&self, options: ContainerOptions) -> Result<Container> {
        let mut cmap = self.cmap.lock().await;
        let mut rollback = Rollback::new();

        match self
            .try_create_container(&mut cmap, &mut rollback, options)
            .await
        {
            Ok(cont) => Ok(cont),
            Err(e) => {
                rollback.execute(&mut cmap);
                Err(e)
            }
        }
    }

    async fn try_create_container(
        &self,
        cmap: &mut ContainerMap,
        rollback: &mut Rollback<ContainerMap>,
        options: ContainerOptions,
    ) -> Result<Container> {
        let id = ContainerId::random();
        let cont = Container::new(
            id.clone(),
            options.name().clone(),
            self.container_log_file(&id),
        );
        cmap.add(cont, Some(rollback))?;

        let hcont = self.store.create_container(&id, Some(rollback))?;

        let spec = spec::new_spec(SpecOptions {
            command: options.command().clone(),
            args: options.args().clone(),
            root_path: hcont.rootfs_dir(),
            root_readonly: options.rootfs_readonly(),
        })?;
        self.store
            .create_container_bundle(&id, &spec, options.rootfs_path())?;

        let cont = cmap.get_mut(&id).ok_or(Error::NotFound)?;
        self.optimistic_change_container_status(cont, ContainerStatus::Created)?;
        let logfile = cont.log_path().clone();

        self.runtime
            .create_container(
                &id,
                &hcont.bundle_dir(),
                &logfile,
                &self.container_exit_file(&id),
                &self.container_attach_file(&id),
                options.stdin(),
                options.stdin_once(),
                CREATE_SYNC_TIMEOUT,
            )
            .await?;

        let cont = cmap.get_mut(&id).ok_or(Error::NotFound)?;
        cont.set_created_at(Utc::now());
        self.store
            .container_state_write_atomic(&id, &cont.to_json()?)?;
        Ok(cont.clone())
    }

    /// Start the user-defined process of a created container and wait until
    /// the runtime reports it running.
    pub async fn start_container(&self, id: &ContainerId) -> Result<()> {
        let mut cmap = self.cmap.lock().await;

        let cont = cmap.get_mut(id).ok_or(Error::NotFound)?;
        assert_status(cont.status(), &[ContainerStatus::Created])?;

        self.optimistic_change_container_status(cont, ContainerStatus::Running)?;
        self.runtime.start_container(id).await?;
        self.wait_container_started(&mut cmap, id).await?;

        let cont = cmap.get_mut(id).ok_or(Error::NotFound)?;
        cont.set_started_at(Utc::now());
        self.store
            .container_state_write_atomic(id, &cont.to_json()?)?;
        Ok(())
    }

    /// Stop a container: TERM first, escalating to KILL when it does not
    /// stop within the fixed backoff schedule.
    ///
    /// The caller-supplied timeout is accepted for interface compatibility;
    /// the escalation schedule is not apportioned from it.
    pub async fn stop_container(&self, id: &ContainerId, _timeout: Duration) -> Result<()> {
        let mut cmap = self.cmap.lock().await;

        let cont = cmap.get_mut(id).ok_or(Error::NotFound)?;
        assert_status(
            cont.status(),
            &[ContainerStatus::Created, ContainerStatus::Running],
        )?;

        self.optimistic_change_container_status(cont, ContainerStatus::Stopped)?;
        self.runtime.kill_container(id, Signal::SIGTERM).await?;
        if self.wait_container_stopped(&mut cmap, id).await.is_err() {
            self.runtime.kill_container(id, Signal::SIGKILL).await?;
            self.wait_container_stopped(&mut cmap, id).await?;
        }
        Ok(())
    }

    /// Remove a container from the daemon, the store and the runtime. The
    /// steps run best-effort-forward; repeating the call converges on full
    /// removal.
    pub async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        let mut cmap = self.cmap.lock().await;
        cmap.get(id).ok_or(Error::NotFound)?;

        // Dropping the state file first marks the container as ready for
        // cleanup even if a later step fails.
        match self.store.container_state_delete_atomic(id) {
            Ok(()) => {}
            Err(ref e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.runtime.delete_container(id).await?;
        cmap.del(id);
        self.store.delete_container(id)
    }

    /// All containers, refreshed against the runtime and sorted by creation
    /// time (ties broken by ID).
    pub async fn list_containers(&self) -> Result<Vec<Container>> {
        let mut cmap = self.cmap.lock().await;

        let ids: Vec<ContainerId> = cmap.all().iter().map(|c| c.id().clone()).collect();
        let mut containers = Vec::with_capacity(ids.len());
        for id in &ids {
            containers.push(self.refresh_container(&mut cmap, id).await?);
        }
        sort_containers(&mut containers);
        Ok(containers)
    }

    /// A single container, refreshed against the runtime.
    pub async fn get_container(&self, id: &ContainerId) -> Result<Container> {
        let mut cmap = self.cmap.lock().await;
        self.refresh_container(&mut cmap, id).await
    }

    /// Reconcile one record with the runtime's view and persist the result.
    /// A stopped container additionally gets its termination status folded
    /// in from the shim's exit file.
    async fn refresh_container(
        &self,
        cmap: &mut ContainerMap,
        id: &ContainerId,
    ) -> Result<Container> {
        let state = self.runtime.container_state(id).await?;
        let status = ContainerStatus::from_runtime(&state.status);

        let cont = cmap.get_mut(id).ok_or(Error::NotFound)?;
        cont.set_status(status);

        if status == ContainerStatus::Stopped {
            let ts = termination::parse_exit_file(&fs::read(self.container_exit_file(id))?)?;
            cont.set_finished_at(ts.at());
            cont.set_exit_code(if ts.is_signaled() {
                128 + ts.signal()
            } else {
                ts.exit_code()
            });
        }

        self.store
            .container_state_write_atomic(id, &cont.to_json()?)?;
        Ok(cont.clone())
    }

    /// Re-index every container surviving in the store. Per-container
    /// corruption is logged and skipped or purged; it never aborts the
    /// restore as a whole.
    async fn restore(&self) -> Result<()> {
        let mut cmap = self.cmap.lock().await;

        for handle in self.store.find_containers()? {
            let id = handle.container_id().clone();

            let blob = match self.store.container_state_read(&id) {
                Ok(blob) => blob,
                Err(e) => {
                    warn!("failed to read state of container {}: {}", id, e);
                    self.purge_broken_container(&mut cmap, &id);
                    continue;
                }
            };
            let cont = match Container::from_json(&blob) {
                Ok(cont) => cont,
                Err(e) => {
                    // Left on disk, pending manual intervention.
                    warn!("failed to decode state of container {}: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = cmap.add(cont, None) {
                warn!("failed to index restored container {}: {}", id, e);
                continue;
            }
            if let Err(e) = self.refresh_container(&mut cmap, &id).await {
                warn!("failed to refresh restored container {}: {}", id, e);
                self.purge_broken_container(&mut cmap, &id);
            }
        }
        Ok(())
    }

    fn purge_broken_container(&self, cmap: &mut ContainerMap, id: &ContainerId) {
        cmap.del(id);
        if let Err(e) = self.store.delete_container(id) {
            error!("failed to purge broken container {}: {}", id, e);
        }
    }

    async fn wait_container_started(
        &self,
        cmap: &mut ContainerMap,
        id: &ContainerId,
    ) -> Result<()> {
        let mut status = ContainerStatus::Unknown;
        for delay in STARTED_POLL_DELAYS.iter() {
            time::sleep(*delay).await;
            status = self.refresh_container(cmap, id).await?.status();
            if status == ContainerStatus::Running {
                return Ok(());
            }
            if status != ContainerStatus::Created {
                break;
            }
        }
        Err(Error::BadState {
            actual: status,
            expected: vec![ContainerStatus::Running],
        })
    }

    async fn wait_container_stopped(
        &self,
        cmap: &mut ContainerMap,
        id: &ContainerId,
    ) -> Result<()> {
        let mut status = ContainerStatus::Unknown;
        for delay in STOPPED_POLL_DELAYS.iter() {
            time::sleep(*delay).await;
            status = self.refresh_container(cmap, id).await?.status();
            if status == ContainerStatus::Stopped {
                return Ok(());
            }
        }
        Err(Error::CannotKill(status))
    }

    /// Record the intended status and persist it before the corresponding
    /// runtime command is issued.
    fn optimistic_change_container_status(
        &self,
        cont: &mut Container,
        status: ContainerStatus,
    ) -> Result<()> {
        cont.set_status(status);
        let blob = cont.to_json()?;
        self.store.container_state_write_atomic(cont.id(), &blob)
    }

    fn container_log_file(&self, id: &ContainerId) -> PathBuf {
        self.log_dir.join(format!("{}.log", id))
    }

    fn container_exit_file(&self, id: &ContainerId) -> PathBuf {
        self.exit_dir.join(id.as_str())
    }

    fn container_attach_file(&self, id: &ContainerId) -> PathBuf {
        self.attach_dir.join(id.as_str())
    }
}

fn sort_containers(containers: &mut [Container]) {
    containers.sort_by(|a, b| {
        a.created_at_nanos()
            .cmp(&b.created_at_nanos())
            .then_with(|| a.id().cmp(b.id()))
    });
}

fn assert_status(actual: ContainerStatus, expected: &[ContainerStatus]) -> Result<()> {
    if expected.contains(&actual) {
        return Ok(());
    }
    Err(Error::BadState {
        actual,
        expected: expected.to_vec(),
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::oci::StateResp;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex as StdMutex};
    use tempfile::TempDir;

    #[derive(Default)]
    pub struct MockInner {
        pub statuses: HashMap<String, String>,
        pub kills: Vec<Signal>,
        pub fail_create_with_timeout: bool,
        pub stop_on_term: bool,
        pub exit_payload: Option<String>,
    }

    /// Scriptable OCI runtime standing in for the real CLI adapter.
    #[derive(Clone, Default)]
    pub struct MockRuntime {
        pub inner: Arc<StdMutex<MockInner>>,
        pub exit_dir: PathBuf,
    }

    impl MockRuntime {
        pub fn new(exit_dir: impl Into<PathBuf>) -> Self {
            Self {
                inner: Arc::default(),
                exit_dir: exit_dir.into(),
            }
        }

        pub fn set_status(&self, id: &ContainerId, status: &str) {
            self.inner
                .lock()
                .unwrap()
                .statuses
                .insert(id.to_string(), status.into());
        }

        pub fn kills(&self) -> Vec<Signal> {
            self.inner.lock().unwrap().kills.clone()
        }

        fn write_exit_file(&self, id: &str, signal: Option<i32>) {
            let payload = self.inner.lock().unwrap().exit_payload.clone();
            let payload = payload.unwrap_or_else(|| match signal {
                Some(sig) => format!(
                    r#"{{"at": "{}", "signal": {}, "reason": "signaled"}}"#,
                    Utc::now().to_rfc3339(),
                    sig
                ),
                None => format!(
                    r#"{{"at": "{}", "exitCode": 0, "reason": "exited"}}"#,
                    Utc::now().to_rfc3339()
                ),
            });
            fs::write(self.exit_dir.join(id), payload).unwrap();
        }
    }

    #[async_trait]
    impl Runtime for MockRuntime {
        async fn create_container(
            &self,
            id: &ContainerId,
            _bundle_dir: &Path,
            _logfile: &Path,
            _exitfile: &Path,
            _attachfile: &Path,
            _stdin: bool,
            _stdin_once: bool,
            _timeout: Duration,
        ) -> Result<i32> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_create_with_timeout {
                return Err(Error::Timeout);
            }
            inner.statuses.insert(id.to_string(), "created".into());
            Ok(4242)
        }

        async fn start_container(&self, id: &ContainerId) -> Result<()> {
            let mut inner = self.inner.lock().unwrap();
            match inner.statuses.get_mut(id.as_str()) {
                Some(status) => {
                    *status = "running".into();
                    Ok(())
                }
                None => Err(Error::RuntimeError {
                    stderr: "container does not exist".into(),
                }),
            }
        }

        async fn kill_container(&self, id: &ContainerId, signal: Signal) -> Result<()> {
            let stops = {
                let mut inner = self.inner.lock().unwrap();
                if !inner.statuses.contains_key(id.as_str()) {
                    return Err(Error::RuntimeError {
                        stderr: "container does not exist".into(),
                    });
                }
                inner.kills.push(signal);
                let stops = signal == Signal::SIGKILL || inner.stop_on_term;
                if stops {
                    inner.statuses.insert(id.to_string(), "stopped".into());
                }
                stops
            };
            if stops {
                let sig = if signal == Signal::SIGKILL { Some(9) } else { None };
                self.write_exit_file(id.as_str(), sig);
            }
            Ok(())
        }

        async fn delete_container(&self, id: &ContainerId) -> Result<()> {
            self.inner.lock().unwrap().statuses.remove(id.as_str());
            Ok(())
        }

        async fn container_state(&self, id: &ContainerId) -> Result<StateResp> {
            match self.inner.lock().unwrap().statuses.get(id.as_str()) {
                Some(status) => Ok(StateResp {
                    id: id.to_string(),
                    pid: 4242,
                    status: status.clone(),
                    created: None,
                }),
                None => Err(Error::RuntimeError {
                    stderr: "container does not exist".into(),
                }),
            }
        }
    }

    pub struct TestDaemon {
        pub root: TempDir,
        pub mock: MockRuntime,
        pub service: RuntimeService,
    }

    pub async fn new_test_daemon() -> Result<TestDaemon> {
        let root = TempDir::new()?;
        for sub in &["log", "exits", "attach", "lib"] {
            fs::create_dir_all(root.path().join(sub))?;
        }
        let mock = MockRuntime::new(root.path().join("exits"));
        let service = RuntimeService::new(
            Box::new(mock.clone()),
            DefaultContainerStore::new(root.path().join("lib")),
            root.path().join("log"),
            root.path().join("exits"),
            root.path().join("attach"),
        )
        .await?;
        Ok(TestDaemon {
            root,
            mock,
            service,
        })
    }

    pub fn new_rootfs() -> Result<TempDir> {
        let rootfs = TempDir::new()?;
        fs::create_dir_all(rootfs.path().join("bin"))?;
        fs::write(rootfs.path().join("bin/echo"), b"fake binary")?;
        Ok(rootfs)
    }

    pub fn echo_options(name: &str, rootfs: &Path) -> ContainerOptions {
        ContainerOptionsBuilder::default()
            .name(name)
            .command("/bin/echo")
            .args(vec!["hello".to_string()])
            .rootfs_path(rootfs)
            .build()
            .unwrap()
    }

    fn containers_dir_entries(daemon: &TestDaemon) -> usize {
        match fs::read_dir(daemon.root.path().join("lib/containers")) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    #[tokio::test]
    async fn create_registers_everything() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let cont = daemon
            .service
            .create_container(echo_options("alpine-echo", rootfs.path()))
            .await?;

        assert_eq!(cont.id().as_str().len(), 32);
        assert_eq!(cont.name(), "alpine-echo");
        assert_eq!(cont.status(), ContainerStatus::Created);
        assert!(cont.created_at_nanos() > 0);

        // All three layers know the container.
        let listed = daemon.service.list_containers().await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), cont.id());

        let cdir = daemon
            .root
            .path()
            .join("lib/containers")
            .join(cont.id().as_str());
        assert!(cdir.join("state.json").is_file());
        assert!(cdir.join("bundle/config.json").is_file());
        assert_eq!(
            fs::read(cdir.join("bundle/rootfs/bin/echo"))?,
            b"fake binary"
        );
        Ok(())
    }

    #[tokio::test]
    async fn create_with_duplicate_name_fails() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        daemon
            .service
            .create_container(echo_options("same-name", rootfs.path()))
            .await?;
        let second = daemon
            .service
            .create_container(echo_options("same-name", rootfs.path()))
            .await;

        assert!(matches!(second, Err(Error::Duplicate(_))));
        assert_eq!(containers_dir_entries(&daemon), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_create_unwinds_all_state() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        daemon.mock.inner.lock().unwrap().fail_create_with_timeout = true;

        let res = daemon
            .service
            .create_container(echo_options("doomed", rootfs.path()))
            .await;

        assert!(matches!(res, Err(Error::Timeout)));
        assert!(daemon.service.list_containers().await?.is_empty());
        assert_eq!(containers_dir_entries(&daemon), 0);

        // The name is free for reuse afterwards.
        daemon.mock.inner.lock().unwrap().fail_create_with_timeout = false;
        daemon
            .service
            .create_container(echo_options("doomed", rootfs.path()))
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn start_runs_container() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        let cont = daemon
            .service
            .create_container(echo_options("starter", rootfs.path()))
            .await?;

        daemon.service.start_container(cont.id()).await?;

        let refreshed = daemon.service.get_container(cont.id()).await?;
        assert_eq!(refreshed.status(), ContainerStatus::Running);
        assert!(refreshed.started_at_nanos() > refreshed.created_at_nanos());
        Ok(())
    }

    #[tokio::test]
    async fn start_requires_created_status() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        let cont = daemon
            .service
            .create_container(echo_options("restarter", rootfs.path()))
            .await?;
        daemon.service.start_container(cont.id()).await?;

        let second = daemon.service.start_container(cont.id()).await;
        assert!(matches!(second, Err(Error::BadState { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn start_of_unknown_container_fails() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let res = daemon
            .service
            .start_container(&ContainerId::random())
            .await;
        assert!(matches!(res, Err(Error::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn stop_terminates_with_term() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        daemon.mock.inner.lock().unwrap().stop_on_term = true;

        let cont = daemon
            .service
            .create_container(echo_options("polite", rootfs.path()))
            .await?;
        daemon.service.start_container(cont.id()).await?;
        daemon
            .service
            .stop_container(cont.id(), Duration::from_secs(10))
            .await?;

        assert_eq!(daemon.mock.kills(), vec![Signal::SIGTERM]);
        let refreshed = daemon.service.get_container(cont.id()).await?;
        assert_eq!(refreshed.status(), ContainerStatus::Stopped);
        assert_eq!(refreshed.exit_code(), 0);
        assert!(refreshed.finished_at_nanos() > refreshed.started_at_nanos());
        Ok(())
    }

    #[tokio::test]
    async fn stop_escalates_to_kill() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let cont = daemon
            .service
            .create_container(echo_options("stubborn", rootfs.path()))
            .await?;
        daemon.service.start_container(cont.id()).await?;

        // TERM is ignored by this container; only KILL stops it.
        daemon
            .service
            .stop_container(cont.id(), Duration::from_secs(10))
            .await?;

        assert_eq!(
            daemon.mock.kills(),
            vec![Signal::SIGTERM, Signal::SIGKILL]
        );
        let refreshed = daemon.service.get_container(cont.id()).await?;
        assert_eq!(refreshed.status(), ContainerStatus::Stopped);
        assert_eq!(refreshed.exit_code(), 128 + 9);
        Ok(())
    }

    #[tokio::test]
    async fn exit_code_uses_literal_code_for_normal_exit() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        {
            let mut inner = daemon.mock.inner.lock().unwrap();
            inner.stop_on_term = true;
            inner.exit_payload = Some(format!(
                r#"{{"at": "{}", "exitCode": 3, "reason": "exited"}}"#,
                Utc::now().to_rfc3339()
            ));
        }

        let cont = daemon
            .service
            .create_container(echo_options("coded", rootfs.path()))
            .await?;
        daemon.service.start_container(cont.id()).await?;
        daemon
            .service
            .stop_container(cont.id(), Duration::from_secs(10))
            .await?;

        let refreshed = daemon.service.get_container(cont.id()).await?;
        assert_eq!(refreshed.exit_code(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn remove_converges_to_absence() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;
        let cont = daemon
            .service
            .create_container(echo_options("removable", rootfs.path()))
            .await?;

        daemon.service.remove_container(cont.id()).await?;

        assert!(daemon.service.list_containers().await?.is_empty());
        assert_eq!(containers_dir_entries(&daemon), 0);
        assert!(daemon
            .mock
            .inner
            .lock()
            .unwrap()
            .statuses
            .is_empty());

        // Idempotent: repeating reports the container as gone.
        let second = daemon.service.remove_container(cont.id()).await;
        assert!(matches!(second, Err(Error::NotFound)));
        Ok(())
    }

    #[tokio::test]
    async fn list_is_sorted_by_creation_time() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let first = daemon
            .service
            .create_container(echo_options("first", rootfs.path()))
            .await?;
        let second = daemon
            .service
            .create_container(echo_options("second", rootfs.path()))
            .await?;
        let third = daemon
            .service
            .create_container(echo_options("third", rootfs.path()))
            .await?;

        let listed = daemon.service.list_containers().await?;
        let ids: Vec<&ContainerId> = listed.iter().map(|c| c.id()).collect();
        assert_eq!(ids, vec![first.id(), second.id(), third.id()]);
        Ok(())
    }

    #[test]
    fn list_order_ties_break_by_id() {
        let at = Utc::now();
        let mut a = Container::new(ContainerId::random(), "a", "/log/a.log");
        let mut b = Container::new(ContainerId::random(), "b", "/log/b.log");
        a.set_created_at(at);
        b.set_created_at(at);

        let mut containers = vec![a.clone(), b.clone()];
        sort_containers(&mut containers);
        let mut expected = vec![a.id().clone(), b.id().clone()];
        expected.sort();
        assert_eq!(
            containers.iter().map(|c| c.id().clone()).collect::<Vec<_>>(),
            expected
        );
    }

    #[tokio::test]
    async fn restore_round_trips_containers() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let one = daemon
            .service
            .create_container(echo_options("one", rootfs.path()))
            .await?;
        let two = daemon
            .service
            .create_container(echo_options("two", rootfs.path()))
            .await?;

        // Simulate a daemon crash: in-memory state is dropped, disk and
        // runtime state survive.
        let TestDaemon { root, mock, service } = daemon;
        drop(service);

        let restored = RuntimeService::new(
            Box::new(mock.clone()),
            DefaultContainerStore::new(root.path().join("lib")),
            root.path().join("log"),
            root.path().join("exits"),
            root.path().join("attach"),
        )
        .await?;

        let listed = restored.list_containers().await?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id(), one.id());
        assert_eq!(listed[0].name(), "one");
        assert_eq!(listed[0].created_at_nanos(), one.created_at_nanos());
        assert_eq!(listed[0].log_path(), one.log_path());
        assert_eq!(listed[1].id(), two.id());
        Ok(())
    }

    #[tokio::test]
    async fn restore_purges_unreadable_state() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let cont = daemon
            .service
            .create_container(echo_options("broken", rootfs.path()))
            .await?;

        let TestDaemon { root, mock, service } = daemon;
        drop(service);

        // The state file is gone while the directory survives.
        let cdir = root.path().join("lib/containers").join(cont.id().as_str());
        fs::remove_file(cdir.join("state.json"))?;

        let restored = RuntimeService::new(
            Box::new(mock.clone()),
            DefaultContainerStore::new(root.path().join("lib")),
            root.path().join("log"),
            root.path().join("exits"),
            root.path().join("attach"),
        )
        .await?;

        assert!(restored.list_containers().await?.is_empty());
        assert!(!cdir.exists());
        Ok(())
    }

    #[tokio::test]
    async fn restore_leaves_undecodable_state_alone() -> Result<()> {
        let daemon = new_test_daemon().await?;
        let rootfs = new_rootfs()?;

        let cont = daemon
            .service
            .create_container(echo_options("mangled", rootfs.path()))
            .await?;

        let TestDaemon { root, mock, service } = daemon;
        drop(service);

        let cdir = root.path().join("lib/containers").join(cont.id().as_str());
        fs::write(cdir.join("state.json"), b"{corrupted")?;

        let restored = RuntimeService::new(
            Box::new(mock.clone()),
            DefaultContainerStore::new(root.path().join("lib")),
            root.path().join("log"),
            root.path().join("exits"),
            root.path().join("attach"),
        )
        .await?;

        assert!(restored.list_containers().await?.is_empty());
        // Pending manual intervention, the directory is kept.
        assert!(cdir.exists());
        Ok(())
    }
}
