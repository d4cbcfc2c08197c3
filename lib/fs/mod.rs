//! The synthetic node tree and the operations defined over it.
/// Content generators for regular files and dynamic directories.
pub mod content;
/// Caller credentials and the permission-check collaborator.
pub mod creds;
/// Named edges into the tree.
pub mod dentry;
/// Error taxonomy.
pub mod error;
/// Open-file handles and their content snapshots.
pub mod file;
/// Counted inode handles and per-variant operations.
pub mod inode;
/// Owned subtree descriptions materialized into inodes.
pub mod node;
/// Atomic reference count with a terminal released state.
pub mod refcount;
/// Path walking against a mounted tree.
pub mod resolve;

pub use content::{ChildGenerator, ContentGenerator, StaticContent, from_display};
pub use creds::{AccessPolicy, AllowAll, Credentials, ModeBits};
pub use dentry::Dentry;
pub use error::{FsError, FsResult};
pub use file::{OpenFile, OpenOptions};
pub use inode::{DirIter, Inode, InodeState, WeakInode};
pub use node::{Node, ReleaseHook};
pub use resolve::{MAX_SYMLINK_TRAVERSALS, PathOperation, Resolver};

use std::time::SystemTime;

use bitflags::bitflags;

/// Type representing an inode identifier.
pub type InodeAddr = u64;

/// Type representing a file descriptor number handed out by a descriptor table.
pub type Fd = u32;

/// Type representing an open-file handle number. Unique per filesystem instance.
pub type FileHandle = u64;

bitflags! {
    /// Permission bits for an inode, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodePerms: u16 {
        /// Other: execute (search, for directories) permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: write permission.
        const OTHER_WRITE   = 1 << 1;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;

        /// Group: execute (search, for directories) permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: write permission.
        const GROUP_WRITE   = 1 << 4;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;

        /// Owner: execute (search, for directories) permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: write permission.
        const OWNER_WRITE   = 1 << 7;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// Sticky bit.
        const STICKY        = 1 << 9;
        /// Set-group-ID bit.
        const SETGID        = 1 << 10;
        /// Set-user-ID bit.
        const SETUID        = 1 << 11;

        /// Other: read, write, and execute.
        const OTHER_RWX = Self::OTHER_READ.bits()
            | Self::OTHER_WRITE.bits()
            | Self::OTHER_EXECUTE.bits();
        /// Group: read, write, and execute.
        const GROUP_RWX = Self::GROUP_READ.bits()
            | Self::GROUP_WRITE.bits()
            | Self::GROUP_EXECUTE.bits();
        /// Owner: read, write, and execute.
        const OWNER_RWX = Self::OWNER_READ.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits();
    }
}

impl InodePerms {
    /// `0o755`, the default mode of synthetic directories.
    pub const DIR_DEFAULT: Self = Self::OWNER_RWX
        .union(Self::GROUP_READ)
        .union(Self::GROUP_EXECUTE)
        .union(Self::OTHER_READ)
        .union(Self::OTHER_EXECUTE);

    /// `0o444`, the default mode of synthetic read-only files.
    pub const FILE_READ_ONLY: Self = Self::OWNER_READ
        .union(Self::GROUP_READ)
        .union(Self::OTHER_READ);

    /// `0o777`, the mode Linux reports for every symlink.
    pub const SYMLINK: Self = Self::OWNER_RWX.union(Self::GROUP_RWX).union(Self::OTHER_RWX);

    /// Build permissions from a numeric mode such as `0o644`. Bits above `0o7777` are ignored.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "mode is masked to 12 bits before narrowing"
    )]
    pub const fn from_mode(mode: u32) -> Self {
        Self::from_bits_truncate((mode & 0o7777) as u16)
    }

    /// The numeric mode, e.g. `0o755`.
    #[must_use]
    #[allow(clippy::cast_lossless, reason = "From is not const")]
    pub const fn mode(self) -> u32 {
        self.bits() as u32
    }
}

bitflags! {
    /// Flags for opening a file, similar to Unix open(2) flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        /// Open for reading only.
        const RDONLY = libc::O_RDONLY;
        /// Open for writing only.
        const WRONLY = libc::O_WRONLY;
        /// Open for reading and writing.
        const RDWR = libc::O_RDWR;

        /// Append on each write.
        const APPEND = libc::O_APPEND;
        /// Truncate to zero length.
        const TRUNC = libc::O_TRUNC;
        /// Create file if it does not exist.
        const CREAT = libc::O_CREAT;
        /// Error if file already exists (with `CREAT`).
        const EXCL = libc::O_EXCL;

        /// Non-blocking mode.
        const NONBLOCK = libc::O_NONBLOCK;
        /// Do not follow a final symlink.
        const NOFOLLOW = libc::O_NOFOLLOW;
        /// Set close-on-exec.
        const CLOEXEC = libc::O_CLOEXEC;
        /// Fail if not a directory.
        const DIRECTORY = libc::O_DIRECTORY;
    }
}

impl OpenFlags {
    /// Returns `true` if these flags ask for any kind of modification.
    #[must_use]
    pub fn wants_write(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR | Self::APPEND | Self::TRUNC | Self::CREAT)
    }
}

/// The type of an inode entry in the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum INodeType {
    /// A regular file.
    File,
    /// A directory, static or dynamic.
    Directory,
    /// A symbolic link.
    Symlink,
}

/// Entry type reported by directory iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirentType {
    /// A directory.
    Directory,
    /// A regular file.
    RegularFile,
    /// A symbolic link.
    Symlink,
}

impl DirentType {
    /// The `d_type` value `getdents(2)` would report.
    #[must_use]
    pub fn to_dt(self) -> u8 {
        match self {
            Self::Directory => libc::DT_DIR,
            Self::RegularFile => libc::DT_REG,
            Self::Symlink => libc::DT_LNK,
        }
    }
}

impl From<INodeType> for DirentType {
    fn from(itype: INodeType) -> Self {
        match itype {
            INodeType::File => Self::RegularFile,
            INodeType::Directory => Self::Directory,
            INodeType::Symlink => Self::Symlink,
        }
    }
}

/// Attributes of an inode, as reported by `getattr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The address of this inode, unique within its filesystem instance.
    pub ino: InodeAddr,
    /// The variant of this inode.
    pub itype: INodeType,
    /// Permission bits.
    pub perms: InodePerms,
    /// The user ID of the owner of this inode.
    pub uid: u32,
    /// The group ID of the owner of this inode.
    pub gid: u32,
    /// Link count: 2 for directories, 1 otherwise.
    pub nlink: u32,
    /// Size in bytes. For regular files this is the length of generated content; for symlinks
    /// the length of the target.
    pub size: u64,
    /// Preferred I/O block size.
    pub blksize: u32,
    /// Time the owning filesystem was mounted.
    pub mtime: SystemTime,
    /// Name of the filesystem type that built this inode.
    pub fs_type: std::sync::Arc<str>,
}

impl Attr {
    /// The full `st_mode` value: file-type bits plus permission bits.
    #[must_use]
    pub fn st_mode(&self) -> u32 {
        let ifmt = match self.itype {
            INodeType::File => libc::S_IFREG,
            INodeType::Directory => libc::S_IFDIR,
            INodeType::Symlink => libc::S_IFLNK,
        };
        #[allow(
            clippy::useless_conversion,
            reason = "mode_t is u16 on some targets and u32 on others"
        )]
        let ifmt = u32::from(ifmt);
        ifmt | self.perms.mode()
    }
}

/// A directory entry yielded by iteration over a directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    /// The name of this entry within its parent directory.
    pub name: String,
    /// The type of the entry.
    pub dtype: DirentType,
}
