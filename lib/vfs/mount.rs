//! Mount namespaces.

use std::sync::Arc;
use std::time::SystemTime;

use crate::fs::{Dentry, PathOperation};

/// Ambient inputs for building a filesystem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountContext {
    /// Stamped as the modification time of every node in the new tree.
    pub now: SystemTime,
}

impl MountContext {
    /// A context stamped with the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self::at(SystemTime::now())
    }

    /// A context stamped with `now`. Deterministic, for tests.
    #[must_use]
    pub fn at(now: SystemTime) -> Self {
        Self { now }
    }
}

impl Default for MountContext {
    fn default() -> Self {
        Self::now()
    }
}

/// Options passed through to a filesystem type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    /// Filesystem-specific option string, as in the `data` argument of `mount(2)`.
    pub data: Option<String>,
    /// Recorded on the namespace. Synthetic trees reject writes regardless.
    pub read_only: bool,
}

/// A mounted filesystem instance and the root that path resolution starts from.
#[derive(Debug, Clone)]
pub struct MountNamespace {
    id: u64,
    fs_type: Arc<str>,
    source: String,
    opts: MountOptions,
    root: Dentry,
}

impl MountNamespace {
    pub(crate) fn new(
        id: u64,
        fs_type: Arc<str>,
        source: String,
        opts: MountOptions,
        root: Dentry,
    ) -> Self {
        Self {
            id,
            fs_type,
            source,
            opts,
            root,
        }
    }

    /// Identifier, unique per [`Vfs`](crate::vfs::Vfs).
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the mounted filesystem type.
    #[must_use]
    pub fn fs_type(&self) -> &str {
        &self.fs_type
    }

    /// The source string given at mount time.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The options given at mount time.
    #[must_use]
    pub fn options(&self) -> &MountOptions {
        &self.opts
    }

    /// The root of the mounted tree.
    #[must_use]
    pub fn root(&self) -> &Dentry {
        &self.root
    }

    /// A path operation resolving `path` from the root of this namespace.
    #[must_use]
    pub fn path_op_at_root(&self, path: impl Into<String>) -> PathOperation {
        PathOperation::new(self.root.clone(), self.root.clone(), path)
    }

    /// A path operation resolving a relative `path` from `start`, confined to this namespace.
    #[must_use]
    pub fn path_op_at(&self, start: &Dentry, path: impl Into<String>) -> PathOperation {
        PathOperation::new(self.root.clone(), start.clone(), path)
    }
}
