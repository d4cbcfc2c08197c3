//! The caller-facing layer: mount filesystem types by name and open paths within them.

/// Per-process descriptor table.
pub mod fdtable;
/// Mount contexts, options and namespaces.
pub mod mount;
/// Filesystem-type registry.
pub mod registry;

pub use fdtable::FdTable;
pub use mount::{MountContext, MountNamespace, MountOptions};
pub use registry::{FilesystemType, Registry, RegistryBuilder, global, install_global};

use std::sync::Arc;

use tracing::debug;

use crate::fs::inode::FsCore;
use crate::fs::{
    AccessPolicy, Attr, Credentials, Dentry, FsError, FsResult, Inode, OpenFile, OpenOptions,
    PathOperation, Resolver,
};
use crate::sync::atomic::{AtomicU64, Ordering};

/// Mounts filesystems from a [`Registry`] and serves path-based operations against them.
#[derive(Debug)]
pub struct Vfs {
    registry: Arc<Registry>,
    resolver: Resolver,
    next_mount_id: AtomicU64,
}

impl Vfs {
    /// A VFS mounting from `registry`, checking permissions with Unix mode bits.
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            resolver: Resolver::default(),
            next_mount_id: AtomicU64::new(1),
        }
    }

    /// Replace the permission policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.resolver = Resolver::new(policy);
        self
    }

    /// The registry mounts are looked up in.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The path resolver, including its permission policy.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Build a fresh instance of the filesystem type `name` and bind it as a new namespace root.
    ///
    /// Nodes without an explicit owner are owned by `creds`.
    ///
    /// # Errors
    ///
    /// `NotFound` if `name` is not registered, `InvalidArgument` if the filesystem type built a
    /// root that is not a directory, or whatever the filesystem type itself reports.
    pub fn new_mount_namespace(
        &self,
        ctx: &MountContext,
        creds: &Credentials,
        source: &str,
        name: &str,
        opts: &MountOptions,
    ) -> FsResult<MountNamespace> {
        let fs_type = self.registry.get(name).ok_or(FsError::NotFound)?;
        let node = fs_type.get_filesystem(ctx, creds, source, opts)?;
        if !node.is_dir() {
            return Err(FsError::InvalidArgument("filesystem root is not a directory"));
        }

        let fs_name: Arc<str> = Arc::from(name);
        let core = FsCore::new(Arc::clone(&fs_name), ctx.now, creds.uid, creds.gid);
        let root = Dentry::root(Inode::materialize_root(node, &core));
        let id = self.next_mount_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, fs_type = name, source, "mounted");
        Ok(MountNamespace::new(
            id,
            fs_name,
            source.to_owned(),
            opts.clone(),
            root,
        ))
    }

    /// Resolve a path with this VFS's permission policy.
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve(&self, creds: &Credentials, pop: &PathOperation) -> FsResult<Dentry> {
        self.resolver.resolve(creds, pop)
    }

    /// Resolve `pop` and open the result.
    ///
    /// `O_NOFOLLOW` in `opts` overrides `pop.follow_final`. The caller owns the returned file
    /// and releases its inode reference by dropping it.
    ///
    /// # Errors
    ///
    /// Any resolution error, `PermissionDenied` if `creds` may not read the node, or an
    /// [`OpenFile::open`] error.
    pub fn open_at(
        &self,
        creds: &Credentials,
        pop: &PathOperation,
        opts: OpenOptions,
    ) -> FsResult<OpenFile> {
        let dentry = if opts.follows_final() {
            self.resolve(creds, pop)?
        } else {
            self.resolve(creds, &pop.clone().no_follow())?
        };
        if !self
            .resolver
            .policy()
            .can_read(creds, &dentry.inode().access_attr())
        {
            return Err(FsError::PermissionDenied);
        }
        dentry.open(opts)
    }

    /// Attributes of the node at `pop`.
    ///
    /// # Errors
    ///
    /// Any resolution error.
    pub fn getattr_at(&self, creds: &Credentials, pop: &PathOperation) -> FsResult<Attr> {
        Ok(self.resolve(creds, pop)?.inode().getattr())
    }

    /// Target of the symlink at `pop`. A final symlink is never followed.
    ///
    /// # Errors
    ///
    /// Any resolution error, or `InvalidArgument` if the node is not a symlink.
    pub fn readlink_at(&self, creds: &Credentials, pop: &PathOperation) -> FsResult<Arc<str>> {
        self.resolve(creds, &pop.clone().no_follow())?
            .inode()
            .readlink()
    }
}
