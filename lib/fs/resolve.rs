//! Path walking against a mounted tree.
//!
//! Resolution is iterative: the path is split into a queue of components and a symlink is
//! handled by splicing its target's components in front of whatever remains, then continuing
//! from the link's anchor (the root for an absolute target, the link's parent otherwise).

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::trace;

use crate::fs::{AccessPolicy, Credentials, Dentry, FsError, FsResult, ModeBits};

/// The number of symlinks a single resolution may follow before failing.
pub const MAX_SYMLINK_TRAVERSALS: usize = 40;

/// Everything a path walk needs besides the caller's credentials.
#[derive(Debug, Clone)]
pub struct PathOperation {
    /// Anchor for absolute paths and for absolute symlink targets. `..` never climbs above it.
    pub root: Dentry,
    /// Anchor for relative paths.
    pub start: Dentry,
    /// Slash-separated path. Empty means `start` itself.
    pub path: String,
    /// Whether a symlink in the final position is followed.
    pub follow_final: bool,
}

impl PathOperation {
    /// A path operation anchored at `root` that follows a final symlink.
    #[must_use]
    pub fn new(root: Dentry, start: Dentry, path: impl Into<String>) -> Self {
        Self {
            root,
            start,
            path: path.into(),
            follow_final: true,
        }
    }

    /// Leave a final symlink unresolved.
    #[must_use]
    pub fn no_follow(mut self) -> Self {
        self.follow_final = false;
        self
    }
}

fn components(path: &str) -> impl DoubleEndedIterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Walks paths, consulting an [`AccessPolicy`] at every directory it passes through.
#[derive(Clone)]
pub struct Resolver {
    policy: Arc<dyn AccessPolicy>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Arc::new(ModeBits))
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    /// A resolver that checks permissions with `policy`.
    #[must_use]
    pub fn new(policy: Arc<dyn AccessPolicy>) -> Self {
        Self { policy }
    }

    /// The permission policy in use.
    #[must_use]
    pub fn policy(&self) -> &dyn AccessPolicy {
        self.policy.as_ref()
    }

    /// Resolve `pop.path` to a dentry.
    ///
    /// Repeated slashes and `.` are ignored. `..` goes to the parent dentry but never above
    /// `pop.root`. A trailing slash requires the result to be a directory and forces a final
    /// symlink to be followed. Dynamic directories passed through may synthesize and cache
    /// children; nothing else is modified.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a component does not exist, or a symlink target is empty.
    /// - `NotADirectory` if a component other than the last is not a directory.
    /// - `PermissionDenied` if `creds` may not traverse a directory on the way.
    /// - `TooManySymlinks` after [`MAX_SYMLINK_TRAVERSALS`] symlinks.
    pub fn resolve(&self, creds: &Credentials, pop: &PathOperation) -> FsResult<Dentry> {
        let trailing_slash = pop.path.ends_with('/');
        let mut cur = if pop.path.starts_with('/') {
            pop.root.clone()
        } else {
            pop.start.clone()
        };
        let mut pending: VecDeque<String> = components(&pop.path).map(str::to_owned).collect();
        let mut links = 0usize;

        while let Some(name) = pending.pop_front() {
            if !cur.inode().is_dir() {
                return Err(FsError::NotADirectory);
            }
            if !self.policy.can_traverse(creds, &cur.inode().access_attr()) {
                trace!(dir = %cur.path(), uid = creds.uid, "traverse denied");
                return Err(FsError::PermissionDenied);
            }

            match name.as_str() {
                "." => continue,
                ".." => {
                    if !cur.same_inode(&pop.root)
                        && let Some(parent) = cur.parent()
                    {
                        cur = parent;
                    }
                    continue;
                }
                _ => {}
            }

            let child = cur.inode().lookup(&name)?;
            trace!(parent = cur.inode().ino(), name = %name, ino = child.ino(), "resolved component");

            let is_final = pending.is_empty();
            if child.is_symlink() && (!is_final || pop.follow_final || trailing_slash) {
                links += 1;
                if links > MAX_SYMLINK_TRAVERSALS {
                    return Err(FsError::TooManySymlinks);
                }
                let target = child.readlink()?;
                if target.is_empty() {
                    return Err(FsError::NotFound);
                }
                trace!(name = %name, target = %target, "following symlink");
                for c in components(&target).rev() {
                    pending.push_front(c.to_owned());
                }
                if target.starts_with('/') {
                    cur = pop.root.clone();
                }
                continue;
            }

            cur = cur.child(name, child);
        }

        if trailing_slash && !cur.inode().is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(cur)
    }
}
