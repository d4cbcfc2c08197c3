//! A sysfs-shaped filesystem built on the synthetic node tree.
//!
//! The layout mirrors the top level of Linux's `/sys`. Only `devices/system/cpu`,
//! `bus/cpu/devices` and `module` have content; everything else is an empty directory so that
//! tools probing for the usual paths find them.

/// CPU directories, range files and device links.
pub mod cpu;
/// Per-module directories.
pub mod module;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fs::{Credentials, FsResult, InodePerms, Node};
use crate::vfs::{FilesystemType, MountContext, MountOptions};

pub use cpu::{CpuDeviceLinks, CpuDirs, cpu_range};
pub use module::ModuleDirs;

/// The name sysfs is registered under.
pub const SYSFS_NAME: &str = "sysfs";

/// Default number of CPU cores reported, independent of the host.
pub const MAX_CPU_CORES: u32 = 1024;

/// Largest `max_cpu_cores` accepted. Larger values are clamped when building a tree.
pub const CPU_CORES_LIMIT: u32 = 1 << 16;

/// Inputs for the sysfs content generators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SysfsConfig {
    /// Number of CPUs reported by `devices/system/cpu`. Not probed from the host.
    pub max_cpu_cores: u32,
    /// Names listed under `module/`.
    pub modules: Vec<String>,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            max_cpu_cores: MAX_CPU_CORES,
            modules: Vec::new(),
        }
    }
}

impl SysfsConfig {
    /// Returns a list of human-readable problems with this configuration. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_cpu_cores == 0 {
            errors.push("sysfs.max-cpu-cores must be at least 1".to_owned());
        } else if self.max_cpu_cores > CPU_CORES_LIMIT {
            errors.push(format!(
                "sysfs.max-cpu-cores must be at most {CPU_CORES_LIMIT}, got {}",
                self.max_cpu_cores
            ));
        }
        for name in &self.modules {
            if !crate::fs::node::is_valid_name(name) {
                errors.push(format!("sysfs.modules: {name:?} is not a valid module name"));
            }
        }
        errors
    }
}

/// The sysfs filesystem type.
#[derive(Debug, Clone, Default)]
pub struct SysfsType {
    config: SysfsConfig,
}

impl SysfsType {
    /// A sysfs type whose mounts are built from `config`.
    #[must_use]
    pub fn new(config: SysfsConfig) -> Self {
        Self { config }
    }

    /// The configuration mounts are built from.
    #[must_use]
    pub fn config(&self) -> &SysfsConfig {
        &self.config
    }

    /// Build a fresh sysfs tree.
    #[must_use]
    pub fn build_tree(&self) -> Node {
        let cores = self.config.max_cpu_cores.clamp(1, CPU_CORES_LIMIT);
        let dir = || Node::dir(InodePerms::DIR_DEFAULT);

        Node::dir(InodePerms::DIR_DEFAULT)
            .with("block", dir())
            .with(
                "bus",
                dir().with(
                    "cpu",
                    dir().with(
                        "devices",
                        Node::dynamic_dir(InodePerms::DIR_DEFAULT, CpuDeviceLinks::new(cores)),
                    ),
                ),
            )
            .with("class", dir().with("power_supply", dir()))
            .with("dev", dir().with("block", dir()).with("char", dir()))
            .with(
                "devices",
                dir().with("system", dir().with("cpu", CpuDirs::new(cores).node())),
            )
            .with("firmware", dir())
            .with("fs", dir())
            .with("kernel", dir().with("debug", dir()))
            .with(
                "module",
                Node::dynamic_dir(
                    InodePerms::DIR_DEFAULT,
                    ModuleDirs::new(&self.config.modules),
                ),
            )
            .with("power", dir())
    }
}

impl FilesystemType for SysfsType {
    fn name(&self) -> &str {
        SYSFS_NAME
    }

    fn get_filesystem(
        &self,
        _ctx: &MountContext,
        _creds: &Credentials,
        source: &str,
        _opts: &MountOptions,
    ) -> FsResult<Node> {
        debug!(
            source,
            cores = self.config.max_cpu_cores,
            modules = self.config.modules.len(),
            "building sysfs tree"
        );
        Ok(self.build_tree())
    }
}
