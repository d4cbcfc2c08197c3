//! Named edges into the tree.

use std::fmt;
use std::sync::Arc;

use crate::fs::{FsResult, Inode, OpenFile, OpenOptions};

struct DentryInner {
    name: Arc<str>,
    inode: Inode,
    parent: Option<Dentry>,
}

/// A named, directed edge from a parent to a child inode.
///
/// A dentry holds a counted reference on its inode and on every ancestor dentry it was reached
/// through, so a resolved path stays valid for as long as the dentry is held. Cloning is cheap
/// and shares the same underlying edge.
#[derive(Clone)]
pub struct Dentry(Arc<DentryInner>);

impl Dentry {
    /// The dentry for a filesystem root. Its name is `/` and it has no parent.
    #[must_use]
    pub fn root(inode: Inode) -> Self {
        Self(Arc::new(DentryInner {
            name: Arc::from("/"),
            inode,
            parent: None,
        }))
    }

    /// A child edge called `name` below this dentry.
    #[must_use]
    pub fn child(&self, name: impl Into<Arc<str>>, inode: Inode) -> Self {
        Self(Arc::new(DentryInner {
            name: name.into(),
            inode,
            parent: Some(self.clone()),
        }))
    }

    /// The entry name. `/` for a root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// The inode this edge points at.
    #[must_use]
    pub fn inode(&self) -> &Inode {
        &self.0.inode
    }

    /// The dentry this one was reached through, or `None` for a root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.0.parent.clone()
    }

    /// Returns `true` if both dentries point at the same inode.
    #[must_use]
    pub fn same_inode(&self, other: &Self) -> bool {
        Inode::ptr_eq(self.inode(), other.inode())
    }

    /// The absolute path of this dentry within its filesystem.
    #[must_use]
    pub fn path(&self) -> String {
        let mut names = Vec::new();
        let mut cur = Some(self);
        while let Some(d) = cur {
            if d.0.parent.is_some() {
                names.push(d.name());
            }
            cur = d.0.parent.as_ref();
        }
        names.reverse();
        format!("/{}", names.join("/"))
    }

    /// Open the node this dentry points at.
    ///
    /// Permission checks are the caller's responsibility; see
    /// [`Vfs::open_at`](crate::vfs::Vfs::open_at).
    ///
    /// # Errors
    ///
    /// See [`OpenOptions`] for how flags are validated.
    pub fn open(&self, opts: OpenOptions) -> FsResult<OpenFile> {
        OpenFile::open(self.clone(), opts)
    }
}

impl fmt::Debug for Dentry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dentry")
            .field("name", &self.0.name)
            .field("inode", &self.0.inode)
            .finish_non_exhaustive()
    }
}
