//! Command-line argument model for the shim helper.

use log::LevelFilter;
use std::fmt;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use strum::AsRefStr;

#[derive(AsRefStr, Clone, Debug, Eq, Hash, PartialEq)]
#[strum(serialize_all = "kebab_case")]
/// Available arguments for shimmy.
pub enum Arg {
    /// Path the shim writes its own PID to.
    ShimmyPidfile(PathBuf),

    /// Shim log verbosity.
    ShimmyLogLevel(LevelFilter),

    /// Path of the OCI runtime binary.
    Runtime(PathBuf),

    /// Additional argument passed through to the runtime. Can be specified
    /// multiple times.
    RuntimeArg(String),

    /// Bundle path.
    Bundle(PathBuf),

    /// Container ID.
    ContainerId(String),

    /// Path the shim writes the container PID to.
    ContainerPidfile(PathBuf),

    /// Container log file.
    ContainerLogfile(PathBuf),

    /// Path of the termination record written when the container exits.
    ContainerExitfile(PathBuf),

    /// Path of the attach socket served by the shim.
    ContainerAttachfile(PathBuf),

    /// Keep the container's stdin open.
    Stdin,

    /// Close stdin after the first attached client detaches.
    StdinOnce,

    /// Inherited descriptor the sync report is written to.
    SyncpipeFd(RawFd),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use crate::oci::shimmy::Arg::*;
        write!(f, "--")?;

        fn write_kv<K, V>(f: &mut fmt::Formatter<'_>, key: K, value: V) -> fmt::Result
        where
            K: AsRef<str>,
            V: fmt::Display,
        {
            write!(f, "{}={}", key.as_ref(), value)
        }

        match self {
            ShimmyPidfile(path) => write_kv(f, self, path.display()),
            ShimmyLogLevel(level) => write_kv(f, self, level),
            Runtime(path) => write_kv(f, self, path.display()),
            // The runtime argument is forwarded verbatim, wrapped in single
            // quotes so the shim does not parse it as its own flag.
            RuntimeArg(arg) => write!(f, "{}='{}'", self.as_ref(), arg),
            Bundle(path) => write_kv(f, self, path.display()),
            ContainerId(id) => write_kv(f, self, id),
            ContainerPidfile(path) => write_kv(f, self, path.display()),
            ContainerLogfile(path) => write_kv(f, self, path.display()),
            ContainerExitfile(path) => write_kv(f, self, path.display()),
            ContainerAttachfile(path) => write_kv(f, self, path.display()),
            SyncpipeFd(fd) => write_kv(f, self, fd),
            _ => write!(f, "{}", self.as_ref()),
        }
    }
}
