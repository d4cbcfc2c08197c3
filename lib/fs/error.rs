//! Error taxonomy shared by every filesystem operation.

use thiserror::Error;

use crate::fs::Fd;

/// Errors reported by lookups, path resolution, opens, reads and the filesystem-type registry.
///
/// All of these are reported synchronously to the immediate caller and none are retried
/// internally: a purely in-memory tree has no transient failure mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// A path component, or a filesystem-type name, does not exist.
    #[error("no such file or directory")]
    NotFound,

    /// A non-final path component (or a directory-only operation's target) is not a directory.
    #[error("not a directory")]
    NotADirectory,

    /// A file-only operation was applied to a directory.
    #[error("is a directory")]
    IsADirectory,

    /// The caller's credentials failed a traverse or read check.
    #[error("permission denied")]
    PermissionDenied,

    /// Symlink resolution exceeded the traversal limit, or a final symlink was opened with
    /// `O_NOFOLLOW`.
    #[error("too many levels of symbolic links")]
    TooManySymlinks,

    /// A filesystem type with this name is already registered.
    #[error("filesystem type {0:?} is already registered")]
    AlreadyRegistered(String),

    /// The request implies a write; synthetic trees are read-only.
    #[error("read-only file system")]
    ReadOnlyFilesystem,

    /// The descriptor is not open in this table.
    #[error("bad file descriptor {0}")]
    BadFileDescriptor(Fd),

    /// The operation is not meaningful for this node (e.g. `readlink` on a regular file).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;

impl From<FsError> for i32 {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => libc::ENOENT,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::PermissionDenied => libc::EACCES,
            FsError::TooManySymlinks => libc::ELOOP,
            FsError::AlreadyRegistered(_) => libc::EEXIST,
            FsError::ReadOnlyFilesystem => libc::EROFS,
            FsError::BadFileDescriptor(_) => libc::EBADF,
            FsError::InvalidArgument(_) => libc::EINVAL,
        }
    }
}

impl From<FsError> for std::io::Error {
    fn from(e: FsError) -> Self {
        Self::from_raw_os_error(i32::from(e))
    }
}
