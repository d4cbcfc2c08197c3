//! Caller identity and the permission-check seam.
//!
//! Path resolution never decides permissions itself. It asks an [`AccessPolicy`], which is an
//! external collaborator. [`ModeBits`] is the ordinary Unix owner/group/other check and is what
//! a [`Vfs`](crate::vfs::Vfs) uses unless told otherwise.

use crate::fs::{Attr, InodePerms};

/// The identity a request is made under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    /// Effective user ID.
    pub uid: u32,
    /// Effective group ID.
    pub gid: u32,
    /// Supplementary group IDs.
    pub groups: Vec<u32>,
}

impl Credentials {
    /// Credentials for `uid`/`gid` with no supplementary groups.
    #[must_use]
    pub fn new(uid: u32, gid: u32) -> Self {
        Self {
            uid,
            gid,
            groups: Vec::new(),
        }
    }

    /// Superuser credentials.
    #[must_use]
    pub fn root() -> Self {
        Self::new(0, 0)
    }

    /// Add a supplementary group.
    #[must_use]
    pub fn with_group(mut self, gid: u32) -> Self {
        self.groups.push(gid);
        self
    }

    /// Returns `true` if `gid` is the primary or a supplementary group.
    #[must_use]
    pub fn in_group(&self, gid: u32) -> bool {
        self.gid == gid || self.groups.contains(&gid)
    }
}

/// Permission checks consulted during path resolution and open.
pub trait AccessPolicy: Send + Sync + 'static {
    /// May `creds` search (traverse) the directory described by `attr`?
    fn can_traverse(&self, creds: &Credentials, attr: &Attr) -> bool;

    /// May `creds` read the node described by `attr`?
    fn can_read(&self, creds: &Credentials, attr: &Attr) -> bool;
}

/// Classic Unix mode-bit checks. uid 0 bypasses both checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeBits;

impl ModeBits {
    fn allows(
        creds: &Credentials,
        attr: &Attr,
        owner: InodePerms,
        group: InodePerms,
        other: InodePerms,
    ) -> bool {
        if creds.uid == 0 {
            return true;
        }
        let class = if creds.uid == attr.uid {
            owner
        } else if creds.in_group(attr.gid) {
            group
        } else {
            other
        };
        attr.perms.contains(class)
    }
}

impl AccessPolicy for ModeBits {
    fn can_traverse(&self, creds: &Credentials, attr: &Attr) -> bool {
        Self::allows(
            creds,
            attr,
            InodePerms::OWNER_EXECUTE,
            InodePerms::GROUP_EXECUTE,
            InodePerms::OTHER_EXECUTE,
        )
    }

    fn can_read(&self, creds: &Credentials, attr: &Attr) -> bool {
        Self::allows(
            creds,
            attr,
            InodePerms::OWNER_READ,
            InodePerms::GROUP_READ,
            InodePerms::OTHER_READ,
        )
    }
}

/// A policy that allows everything. Useful for tests that are not about permissions.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_traverse(&self, _creds: &Credentials, _attr: &Attr) -> bool {
        true
    }

    fn can_read(&self, _creds: &Credentials, _attr: &Attr) -> bool {
        true
    }
}
