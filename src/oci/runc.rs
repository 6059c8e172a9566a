//! Interface to the OCI runtime CLI and the shim supervising its containers.

use crate::container::ContainerId;
use crate::error::{Error, Result};
use crate::oci::pipe::{SyncPipe, SYNC_PIPE_FD};
use crate::oci::shimmy;
use crate::oci::{Runtime, StateResp};
use async_trait::async_trait;
use derive_builder::Builder;
use getset::Getters;
use log::{debug, LevelFilter};
use nix::sys::signal::Signal;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

#[derive(Builder, Debug, Getters)]
#[builder(pattern = "owned", setter(into))]
/// RuncRuntime drives the OCI runtime binary through its command line
/// interface, delegating container supervision to the shim.
pub struct RuncRuntime {
    #[get]
    /// Path to the shim binary.
    shimmy_path: PathBuf,

    #[get]
    /// Path to the OCI runtime binary.
    runtime_path: PathBuf,

    #[get]
    /// Runtime state root, passed to every invocation via `--root`.
    root_path: PathBuf,
}

impl RuncRuntime {
    /// Run `<runtime> --root <root> <args...>` and return its stdout.
    async fn run_runtime(&self, args: Vec<String>) -> Result<Vec<u8>> {
        let mut full_args = vec!["--root".to_string(), self.root_path.display().to_string()];
        full_args.extend(args);

        let output = Command::new(&self.runtime_path)
            .args(&full_args)
            .output()
            .await?;
        debug_log(&self.runtime_path, &full_args, &output);
        check_output(output)
    }
}

#[async_trait]
impl Runtime for RuncRuntime {
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
    ) -> Result<i32> {
        use shimmy::Arg;

        let mut sync_pipe = SyncPipe::new()?;

        let mut args = vec![
            Arg::ShimmyPidfile(bundle_dir.join("shimmy.pid")),
            Arg::ShimmyLogLevel(LevelFilter::Info),
            Arg::Runtime(self.runtime_path.clone()),
            Arg::RuntimeArg(format!("--root={}", self.root_path.display())),
            Arg::Bundle(bundle_dir.to_path_buf()),
            Arg::ContainerId(id.to_string()),
            Arg::ContainerPidfile(bundle_dir.join("container.pid")),
            Arg::ContainerLogfile(logfile.to_path_buf()),
            Arg::ContainerExitfile(exitfile.to_path_buf()),
            Arg::ContainerAttachfile(attachfile.to_path_buf()),
        ];
        if stdin {
            args.push(Arg::Stdin);
        }
        if stdin_once {
            args.push(Arg::StdinOnce);
        }
        args.push(Arg::SyncpipeFd(SYNC_PIPE_FD));
        let args: Vec<String> = args.iter().map(ToString::to_string).collect();

        let mut cmd = Command::new(&self.shimmy_path);
        cmd.args(&args);
        let child_fd = sync_pipe.child_fd();
        unsafe {
            cmd.pre_exec(move || {
                if child_fd == SYNC_PIPE_FD {
                    // Already in the right slot; only drop close-on-exec.
                    let flags = libc::fcntl(SYNC_PIPE_FD, libc::F_GETFD);
                    if flags == -1
                        || libc::fcntl(SYNC_PIPE_FD, libc::F_SETFD, flags & !libc::FD_CLOEXEC)
                            == -1
                    {
                        return Err(io::Error::last_os_error());
                    }
                } else if libc::dup2(child_fd, SYNC_PIPE_FD) == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        // The shim's foreground process only validates its inputs, forks the
        // supervisor and exits, so this wait is near-instant.
        let output = cmd.output().await?;
        debug_log(&self.shimmy_path, &args, &output);
        check_output(output)?;

        // With our write end closed, the report read observes EOF as soon as
        // the supervisor has written it and closed its copy.
        sync_pipe.close_write();
        let report = sync_pipe.read_report(timeout).await?;
        if report.is_container_pid() {
            Ok(report.pid)
        } else {
            Err(Error::ShimSyncError(format!(
                "unexpected shim report: {:?}",
                report
            )))
        }
    }

    async fn start_container(&self, id: &ContainerId) -> Result<()> {
        self.run_runtime(vec!["start".into(), id.to_string()])
            .await
            .map(|_| ())
    }

    async fn kill_container(&self, id: &ContainerId, signal: Signal) -> Result<()> {
        self.run_runtime(vec![
            "kill".into(),
            id.to_string(),
            short_signal_name(signal),
        ])
        .await
        .map(|_| ())
    }

    async fn delete_container(&self, id: &ContainerId) -> Result<()> {
        self.run_runtime(vec!["delete".into(), id.to_string()])
            .await
            .map(|_| ())
    }

    async fn container_state(&self, id: &ContainerId) -> Result<StateResp> {
        let stdout = self
            .run_runtime(vec!["state".into(), id.to_string()])
            .await?;
        Ok(serde_json::from_slice(&stdout)?)
    }
}

/// Canonical short signal name as understood by `<runtime> kill`, e.g.
/// `TERM` or `KILL`.
fn short_signal_name(signal: Signal) -> String {
    format!("{:?}", signal)
        .trim_start_matches("SIG")
        .to_string()
}

fn check_output(output: Output) -> Result<Vec<u8>> {
    if !output.status.success() {
        return Err(Error::RuntimeError {
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}

fn debug_log(binary: &Path, args: &[String], output: &Output) {
    debug!(
        "stdout:[{}] stderr:[{}] status:{} exec {} {}",
        String::from_utf8_lossy(&output.stdout).trim(),
        String::from_utf8_lossy(&output.stderr).trim(),
        output.status,
        binary.display(),
        args.join(" ")
    );
}
