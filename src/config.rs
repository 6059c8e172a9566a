//! Configuration related structures
use clap::Parser;
use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_LISTEN: &str = "/var/run/crust/crust.sock";
pub const DEFAULT_LIB_ROOT: &str = "/var/lib/crust";
pub const DEFAULT_RUN_ROOT: &str = "/var/run/crust";
pub const DEFAULT_CONTAINER_LOG_ROOT: &str = "/var/log/crust/containers";
pub const DEFAULT_STREAMING_ADDR: &str = "127.0.0.1:8881";
pub const DEFAULT_SHIMMY_PATH: &str = "/usr/local/bin/shimmy";
pub const DEFAULT_RUNTIME_PATH: &str = "/usr/bin/runc";
pub const DEFAULT_RUNTIME_ROOT: &str = "/var/run/crust-runc";

#[derive(Builder, Clone, CopyGetters, Debug, Deserialize, Getters, Parser, Serialize)]
#[builder(default, pattern = "owned", setter(into))]
#[serde(rename_all = "kebab-case")]
#[clap(name = "crustd", version)]
/// crustd - a minimal container runtime interface daemon
pub struct Config {
    #[get_copy = "pub"]
    #[clap(
        default_value("info"),
        env("CRUST_LOG_LEVEL"),
        long("log-level"),
        short('l'),
        value_name("LEVEL")
    )]
    /// The logging level of the daemon
    log_level: LevelFilter,

    #[get = "pub"]
    #[clap(
        default_value("/var/run/crust/crust.sock"),
        env("CRUST_LISTEN"),
        long("listen"),
        value_name("PATH")
    )]
    /// The unix socket path the RPC transport binds
    listen: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/var/lib/crust"),
        env("CRUST_LIB_ROOT"),
        long("lib-root"),
        value_name("DIR")
    )]
    /// Where long-lived container state is stored
    lib_root: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/var/run/crust"),
        env("CRUST_RUN_ROOT"),
        long("run-root"),
        value_name("DIR")
    )]
    /// Where volatile runtime files (exit records, attach sockets) live
    run_root: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/var/log/crust/containers"),
        env("CRUST_CONTAINER_LOG_ROOT"),
        long("container-log-root"),
        value_name("DIR")
    )]
    /// Where container stdout/stderr logs are written
    container_log_root: PathBuf,

    #[get_copy = "pub"]
    #[clap(
        default_value("127.0.0.1:8881"),
        env("CRUST_STREAMING_ADDR"),
        long("streaming-addr"),
        value_name("ADDR")
    )]
    /// Address of the streaming server brokering attach URLs
    streaming_addr: SocketAddr,

    #[get = "pub"]
    #[clap(
        default_value("/usr/local/bin/shimmy"),
        env("CRUST_SHIMMY_PATH"),
        long("shimmy-path"),
        value_name("PATH")
    )]
    /// Path of the shim binary
    shimmy_path: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/usr/bin/runc"),
        env("CRUST_RUNTIME_PATH"),
        long("runtime-path"),
        value_name("PATH")
    )]
    /// Path of the OCI runtime binary
    runtime_path: PathBuf,

    #[get = "pub"]
    #[clap(
        default_value("/var/run/crust-runc"),
        env("CRUST_RUNTIME_ROOT"),
        long("runtime-root"),
        value_name("DIR")
    )]
    /// State root handed to the OCI runtime
    runtime_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            listen: DEFAULT_LISTEN.into(),
            lib_root: DEFAULT_LIB_ROOT.into(),
            run_root: DEFAULT_RUN_ROOT.into(),
            container_log_root: DEFAULT_CONTAINER_LOG_ROOT.into(),
            streaming_addr: SocketAddr::from(([127, 0, 0, 1], 8881)),
            shimmy_path: DEFAULT_SHIMMY_PATH.into(),
            runtime_path: DEFAULT_RUNTIME_PATH.into(),
            runtime_root: DEFAULT_RUNTIME_ROOT.into(),
        }
    }
}
