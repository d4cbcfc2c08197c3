//! Owned descriptions of subtrees.
//!
//! A [`Node`] is what a filesystem type (or a dynamic directory's generator) hands to the
//! framework: a plain value describing a directory, file or symlink, together with any children.
//! Mounting or a first lookup materializes it into [`Inode`](crate::fs::Inode)s. Because a child
//! `Node` is moved into its parent, a node can only ever end up under one parent.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::fs::{ChildGenerator, ContentGenerator, InodeAddr, InodePerms};

/// Hook run exactly once, synchronously, when an inode's last reference is released.
pub type ReleaseHook = Box<dyn FnOnce(InodeAddr) + Send + 'static>;

/// The variant-specific part of a [`Node`].
pub(crate) enum NodeKind {
    Dir {
        children: BTreeMap<String, Node>,
    },
    DynamicDir {
        children: BTreeMap<String, Node>,
        generator: Arc<dyn ChildGenerator>,
    },
    File {
        content: Arc<dyn ContentGenerator>,
    },
    Symlink {
        target: String,
    },
}

/// A not-yet-materialized inode and its subtree.
pub struct Node {
    pub(crate) perms: InodePerms,
    pub(crate) owner: Option<(u32, u32)>,
    pub(crate) kind: NodeKind,
    pub(crate) on_release: Option<ReleaseHook>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            NodeKind::Dir { children } => format!("Dir({} children)", children.len()),
            NodeKind::DynamicDir { children, .. } => {
                format!("DynamicDir({} static children)", children.len())
            }
            NodeKind::File { .. } => "File".to_owned(),
            NodeKind::Symlink { target } => format!("Symlink({target:?})"),
        };
        f.debug_struct("Node")
            .field("perms", &self.perms)
            .field("owner", &self.owner)
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

/// Returns `true` if `name` can appear as a single directory entry.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/') && !name.contains('\0')
}

impl Node {
    fn new(perms: InodePerms, kind: NodeKind) -> Self {
        Self {
            perms,
            owner: None,
            kind,
            on_release: None,
        }
    }

    /// An empty static directory.
    #[must_use]
    pub fn dir(perms: InodePerms) -> Self {
        Self::new(
            perms,
            NodeKind::Dir {
                children: BTreeMap::new(),
            },
        )
    }

    /// A directory whose children beyond the static ones are synthesized by `generator`.
    #[must_use]
    pub fn dynamic_dir(perms: InodePerms, generator: impl ChildGenerator) -> Self {
        Self::new(
            perms,
            NodeKind::DynamicDir {
                children: BTreeMap::new(),
                generator: Arc::new(generator),
            },
        )
    }

    /// A regular file whose content is produced by `content` on every open.
    #[must_use]
    pub fn file(perms: InodePerms, content: impl ContentGenerator) -> Self {
        Self::new(
            perms,
            NodeKind::File {
                content: Arc::new(content),
            },
        )
    }

    /// A symbolic link to `target`, which may be absolute or relative to the link's parent.
    #[must_use]
    pub fn symlink(target: impl Into<String>) -> Self {
        Self::new(
            InodePerms::SYMLINK,
            NodeKind::Symlink {
                target: target.into(),
            },
        )
    }

    /// Add a static child, replacing any previous child of the same name.
    ///
    /// # Panics
    ///
    /// Panics if `self` is not a directory or `name` is not a valid entry name. Both are
    /// mistakes in the code building the tree, not runtime conditions.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, child: Node) -> Self {
        let name = name.into();
        assert!(is_valid_name(&name), "invalid directory entry name {name:?}");
        match &mut self.kind {
            NodeKind::Dir { children } | NodeKind::DynamicDir { children, .. } => {
                children.insert(name, child);
            }
            NodeKind::File { .. } | NodeKind::Symlink { .. } => {
                panic!("cannot add child {name:?} to a non-directory node");
            }
        }
        self
    }

    /// Set the owning user and group. Defaults to the credentials the filesystem was mounted
    /// with.
    #[must_use]
    pub fn owned_by(mut self, uid: u32, gid: u32) -> Self {
        self.owner = Some((uid, gid));
        self
    }

    /// Run `hook` when the materialized inode is torn down.
    #[must_use]
    pub fn on_release(mut self, hook: impl FnOnce(InodeAddr) + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    /// Returns `true` for static and dynamic directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Dir { .. } | NodeKind::DynamicDir { .. })
    }
}
