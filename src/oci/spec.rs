//! OCI runtime spec generation for container bundles.

use crate::error::Result;
use oci_spec::runtime::{
    LinuxBuilder, LinuxNamespace, LinuxNamespaceBuilder, LinuxNamespaceType, Mount, MountBuilder,
    ProcessBuilder, RootBuilder, Spec, SpecBuilder,
};
use std::path::PathBuf;

/// Serialized OCI runtime spec, ready to be written as `config.json`.
pub type RuntimeSpec = Vec<u8>;

/// Inputs for generating a container's runtime spec.
#[derive(Clone, Debug, Default)]
pub struct SpecOptions {
    /// Binary to execute inside the container.
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Absolute path of the container rootfs.
    pub root_path: PathBuf,
    /// Mount the rootfs read-only.
    pub root_readonly: bool,
}

/// Generate a host-specific Linux runtime spec for the given options.
pub fn new_spec(options: SpecOptions) -> Result<RuntimeSpec> {
    let spec = build_spec(options)?;
    Ok(serde_json::to_vec_pretty(&spec)?)
}

fn build_spec(options: SpecOptions) -> Result<Spec> {
    let mut process_args = vec![options.command];
    process_args.extend(options.args);

    let process = ProcessBuilder::default()
        .terminal(false)
        .args(process_args)
        .env(vec![
            "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string(),
            "TERM=xterm".to_string(),
        ])
        .cwd("/")
        .build()?;

    let root = RootBuilder::default()
        .path(options.root_path)
        .readonly(options.root_readonly)
        .build()?;

    let spec = SpecBuilder::default()
        .version("1.0.2")
        .process(process)
        .root(root)
        .mounts(default_mounts()?)
        .linux(
            LinuxBuilder::default()
                .namespaces(default_namespaces()?)
                .build()?,
        )
        .build()?;
    Ok(spec)
}

fn default_namespaces() -> Result<Vec<LinuxNamespace>> {
    let types = [
        LinuxNamespaceType::Pid,
        LinuxNamespaceType::Network,
        LinuxNamespaceType::Ipc,
        LinuxNamespaceType::Uts,
        LinuxNamespaceType::Mount,
    ];
    let mut namespaces = Vec::with_capacity(types.len());
    for t in types.iter() {
        namespaces.push(LinuxNamespaceBuilder::default().typ(*t).build()?);
    }
    Ok(namespaces)
}

fn default_mounts() -> Result<Vec<Mount>> {
    let mut mounts = Vec::new();

    mounts.push(
        MountBuilder::default()
            .destination("/proc")
            .typ("proc")
            .source("proc")
            .build()?,
    );
    mounts.push(
        MountBuilder::default()
            .destination("/dev")
            .typ("tmpfs")
            .source("tmpfs")
            .options(vec![
                "nosuid".to_string(),
                "strictatime".to_string(),
                "mode=755".to_string(),
                "size=65536k".to_string(),
            ])
            .build()?,
    );
    mounts.push(
        MountBuilder::default()
            .destination("/dev/pts")
            .typ("devpts")
            .source("devpts")
            .options(vec![
                "nosuid".to_string(),
                "noexec".to_string(),
                "newinstance".to_string(),
                "ptmxmode=0666".to_string(),
                "mode=0620".to_string(),
            ])
            .build()?,
    );
    mounts.push(
        MountBuilder::default()
            .destination("/dev/shm")
            .typ("tmpfs")
            .source("shm")
            .options(vec![
                "nosuid".to_string(),
                "noexec".to_string(),
                "nodev".to_string(),
                "mode=1777".to_string(),
                "size=65536k".to_string(),
            ])
            .build()?,
    );
    mounts.push(
        MountBuilder::default()
            .destination("/dev/mqueue")
            .typ("mqueue")
            .source("mqueue")
            .options(vec![
                "nosuid".to_string(),
                "noexec".to_string(),
                "nodev".to_string(),
            ])
            .build()?,
    );
    mounts.push(
        MountBuilder::default()
            .destination("/sys")
            .typ("sysfs")
            .source("sysfs")
            .options(vec![
                "nosuid".to_string(),
                "noexec".to_string(),
                "nodev".to_string(),
                "ro".to_string(),
            ])
            .build()?,
    );
    Ok(mounts)
}
