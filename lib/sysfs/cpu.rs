//! `devices/system/cpu` and `bus/cpu/devices`.

use crate::fs::{ChildGenerator, INodeType, InodePerms, Node, StaticContent, from_display};

/// The CPU list format used by `online`, `possible` and `present`: `0-(n-1)`. Zero cores is
/// reported as one.
#[must_use]
pub fn cpu_range(n: u32) -> String {
    format!("0-{}", n.max(1) - 1)
}

fn range_file(cores: u32) -> Node {
    Node::file(
        InodePerms::FILE_READ_ONLY,
        from_display(move || cpu_range(cores)),
    )
}

/// Parses `cpuK`, accepting only canonical decimal `K` below `n`.
fn parse_cpu_name(name: &str, n: u32) -> Option<u32> {
    let digits = name.strip_prefix("cpu")?;
    let k: u32 = digits.parse().ok()?;
    (k < n && k.to_string() == digits).then_some(k)
}

/// Per-CPU directories under `devices/system/cpu`, synthesized on first lookup.
#[derive(Debug, Clone, Copy)]
pub struct CpuDirs {
    cores: u32,
}

impl CpuDirs {
    /// Directories `cpu0` .. `cpu(cores-1)`.
    #[must_use]
    pub fn new(cores: u32) -> Self {
        Self { cores }
    }

    /// The `devices/system/cpu` directory: the range files plus the per-CPU directories.
    #[must_use]
    pub fn node(self) -> Node {
        let cores = self.cores;
        Node::dynamic_dir(InodePerms::DIR_DEFAULT, self)
            .with("online", range_file(cores))
            .with("possible", range_file(cores))
            .with("present", range_file(cores))
    }
}

impl ChildGenerator for CpuDirs {
    fn list(&self) -> Vec<(String, INodeType)> {
        (0..self.cores)
            .map(|k| (format!("cpu{k}"), INodeType::Directory))
            .collect()
    }

    fn generate(&self, name: &str) -> Option<Node> {
        parse_cpu_name(name, self.cores)?;
        Some(Node::dir(InodePerms::DIR_DEFAULT).with(
            "online",
            Node::file(InodePerms::FILE_READ_ONLY, StaticContent::from_static(b"1\n")),
        ))
    }
}

/// `bus/cpu/devices`: one symlink per CPU pointing back into `devices/system/cpu`.
#[derive(Debug, Clone, Copy)]
pub struct CpuDeviceLinks {
    cores: u32,
}

impl CpuDeviceLinks {
    /// Links `cpu0` .. `cpu(cores-1)`.
    #[must_use]
    pub fn new(cores: u32) -> Self {
        Self { cores }
    }
}

impl ChildGenerator for CpuDeviceLinks {
    fn list(&self) -> Vec<(String, INodeType)> {
        (0..self.cores)
            .map(|k| (format!("cpu{k}"), INodeType::Symlink))
            .collect()
    }

    fn generate(&self, name: &str) -> Option<Node> {
        let k = parse_cpu_name(name, self.cores)?;
        Some(Node::symlink(format!("../../../devices/system/cpu/cpu{k}")))
    }
}
