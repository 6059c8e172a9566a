//! Daemon bootstrap: logging, directory preparation and lifecycle manager
//! wiring.

use crate::config::Config;
use crate::oci::RuncRuntimeBuilder;
use crate::runtime_service::RuntimeService;
use crate::storage::DefaultContainerStore;
use anyhow::{bail, Context, Result};
use clap::crate_name;
use log::{debug, info};
use std::env;
use std::fs;
use tokio::signal::unix::{signal, SignalKind};

/// Server is the main instance hosting the container lifecycle manager.
pub struct Server {
    config: Config,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Server { config }
    }

    /// Prepare the host directories, restore surviving containers and run
    /// until a termination signal arrives.
    ///
    /// The RPC transport and the streaming server consume the lifecycle
    /// manager in-process; their wire surfaces live outside this crate.
    pub async fn start(self) -> Result<()> {
        self.set_logging_verbosity()
            .context("set logging verbosity")?;

        let sock_path = self.config.listen();
        if !sock_path.is_absolute() {
            bail!(
                "specified socket path {} is not absolute",
                sock_path.display()
            )
        }

        let exit_dir = self.config.run_root().join("exits");
        let attach_dir = self.config.run_root().join("attach");
        for dir in [
            self.config.lib_root(),
            self.config.container_log_root(),
            &exit_dir,
            &attach_dir,
        ]
        .iter()
        {
            fs::create_dir_all(dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
        }

        let runtime = RuncRuntimeBuilder::default()
            .shimmy_path(self.config.shimmy_path())
            .runtime_path(self.config.runtime_path())
            .root_path(self.config.runtime_root())
            .build()
            .context("build OCI runtime adapter")?;

        let service = RuntimeService::new(
            Box::new(runtime),
            DefaultContainerStore::new(self.config.lib_root()),
            self.config.container_log_root(),
            &exit_dir,
            &attach_dir,
        )
        .await
        .context("restore containers")?;

        info!(
            "Lifecycle manager ready, managing containers under {}",
            self.config.lib_root().display()
        );

        // Handle shutdown based on signals
        let mut shutdown_terminate = signal(SignalKind::terminate())?;
        let mut shutdown_interrupt = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = shutdown_interrupt.recv() => {
                info!("Got interrupt signal, shutting down server");
            }
            _ = shutdown_terminate.recv() => {
                info!("Got termination signal, shutting down server");
            }
        }

        drop(service);
        self.cleanup()
    }

    /// Initialize the logger and set the verbosity to the provided level.
    fn set_logging_verbosity(&self) -> Result<()> {
        // Set the logging verbosity via the env
        env::set_var(
            "RUST_LOG",
            format!("{}={}", crate_name!(), self.config.log_level()),
        );

        // Initialize the logger
        env_logger::try_init().context("init env logger")
    }

    /// Cleanup the server and persist any data if necessary.
    fn cleanup(self) -> Result<()> {
        debug!("Cleaning up server");
        Ok(())
    }
}
