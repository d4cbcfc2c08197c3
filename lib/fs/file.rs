//! Open-file handles.
//!
//! Opening a regular file runs its content generator exactly once and captures the result. Every
//! later read on that handle is served from the captured bytes, so two opens of the same file
//! never observe each other and a concurrent re-open that sees newer content leaves earlier
//! handles untouched.

use std::io::SeekFrom;

use bytes::Bytes;
use tracing::debug;

use crate::fs::{
    Attr, Dentry, DirEntry, DirIter, FileHandle, FsError, FsResult, INodeType, Inode, OpenFlags,
};
use crate::sync::{Mutex, lock};

/// How to open a node.
///
/// Synthetic trees are read-only, so the only accepted access mode is `O_RDONLY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// `open(2)`-style flags.
    pub flags: OpenFlags,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::read_only()
    }
}

impl OpenOptions {
    /// Options with the given flags.
    #[must_use]
    pub fn new(flags: OpenFlags) -> Self {
        Self { flags }
    }

    /// `O_RDONLY`.
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(OpenFlags::RDONLY)
    }

    /// `O_RDONLY | O_DIRECTORY`.
    #[must_use]
    pub fn directory() -> Self {
        Self::new(OpenFlags::RDONLY | OpenFlags::DIRECTORY)
    }

    /// Whether path resolution should follow a symlink in the final position.
    #[must_use]
    pub fn follows_final(self) -> bool {
        !self.flags.contains(OpenFlags::NOFOLLOW)
    }
}

/// A caller-owned handle on an opened node.
///
/// Holds a counted reference on the node (through its dentry) until dropped.
pub struct OpenFile {
    fh: FileHandle,
    dentry: Dentry,
    flags: OpenFlags,
    /// `Some` for regular files, `None` for directories.
    content: Option<Bytes>,
    cursor: Mutex<u64>,
}

impl OpenFile {
    /// Open the node `dentry` points at.
    ///
    /// # Errors
    ///
    /// - `ReadOnlyFilesystem` if the flags ask for any kind of write.
    /// - `TooManySymlinks` if the node is a symlink (only reachable with `O_NOFOLLOW`).
    /// - `NotADirectory` if `O_DIRECTORY` was given for a non-directory.
    pub fn open(dentry: Dentry, opts: OpenOptions) -> FsResult<Self> {
        if opts.flags.wants_write() {
            return Err(FsError::ReadOnlyFilesystem);
        }
        let inode = dentry.inode();
        let content = match inode.itype() {
            INodeType::Symlink => return Err(FsError::TooManySymlinks),
            INodeType::Directory => None,
            INodeType::File if opts.flags.contains(OpenFlags::DIRECTORY) => {
                return Err(FsError::NotADirectory);
            }
            INodeType::File => Some(inode.generate_content()?),
        };
        let fh = inode.next_file_handle();
        debug!(
            fh,
            ino = inode.ino(),
            path = %dentry.path(),
            len = content.as_ref().map(Bytes::len),
            "opened"
        );
        Ok(Self {
            fh,
            dentry,
            flags: opts.flags,
            content,
            cursor: Mutex::new(0),
        })
    }

    /// The handle number, unique within the owning filesystem instance.
    #[must_use]
    pub fn fh(&self) -> FileHandle {
        self.fh
    }

    /// The dentry this file was opened through.
    #[must_use]
    pub fn dentry(&self) -> &Dentry {
        &self.dentry
    }

    /// The opened inode.
    #[must_use]
    pub fn inode(&self) -> &Inode {
        self.dentry.inode()
    }

    /// The flags this file was opened with.
    #[must_use]
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    fn snapshot(&self) -> FsResult<&Bytes> {
        self.content.as_ref().ok_or(FsError::IsADirectory)
    }

    /// Attributes of the opened node. For a regular file the size is the length of this handle's
    /// snapshot, which may differ from what a newer open would see.
    #[must_use]
    pub fn stat(&self) -> Attr {
        match &self.content {
            Some(content) => self.inode().attr_with_size(content.len() as u64),
            None => self.inode().getattr(),
        }
    }

    /// Read up to `len` bytes at `offset` without moving the cursor. Reading at or past the end
    /// returns an empty buffer.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on a directory handle.
    pub fn read_at(&self, offset: u64, len: usize) -> FsResult<Bytes> {
        let content = self.snapshot()?;
        let start = usize::try_from(offset).map_or(content.len(), |o| o.min(content.len()));
        let end = start.saturating_add(len).min(content.len());
        Ok(content.slice(start..end))
    }

    /// Read up to `len` bytes at the cursor and advance it.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on a directory handle.
    pub fn read(&self, len: usize) -> FsResult<Bytes> {
        let mut cursor = lock(&self.cursor);
        let out = self.read_at(*cursor, len)?;
        *cursor += out.len() as u64;
        Ok(out)
    }

    /// Everything from the cursor to the end of the snapshot. Leaves the cursor at the end.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on a directory handle.
    pub fn read_to_end(&self) -> FsResult<Bytes> {
        self.read(usize::MAX)
    }

    /// Move the cursor, returning its new position.
    ///
    /// # Errors
    ///
    /// `IsADirectory` on a directory handle, `InvalidArgument` if the result would be negative.
    pub fn seek(&self, pos: SeekFrom) -> FsResult<u64> {
        let len = self.snapshot()?.len() as u64;
        let mut cursor = lock(&self.cursor);
        let next = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(d) => len.checked_add_signed(d),
            SeekFrom::Current(d) => cursor.checked_add_signed(d),
        };
        let next = next.ok_or(FsError::InvalidArgument("seek before start of file"))?;
        *cursor = next;
        Ok(next)
    }

    /// A fresh, name-sorted snapshot of the directory's entries.
    ///
    /// # Errors
    ///
    /// `NotADirectory` on a regular-file handle.
    pub fn iterate(&self) -> FsResult<DirIter> {
        self.inode().iterate()
    }

    /// Paged directory listing.
    ///
    /// Takes a fresh snapshot, skips the first `offset` entries and calls `filler` with each
    /// remaining entry and the offset to resume after it. Stops early when `filler` returns
    /// `true` (the caller's buffer is full).
    ///
    /// # Errors
    ///
    /// `NotADirectory` on a regular-file handle.
    pub fn readdir(
        &self,
        offset: u64,
        mut filler: impl FnMut(&DirEntry, u64) -> bool,
    ) -> FsResult<()> {
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        for (i, entry) in self.iterate()?.enumerate().skip(skip) {
            if filler(&entry, i as u64 + 1) {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        debug!(fh = self.fh, ino = self.inode().ino(), "closed");
    }
}

impl std::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenFile")
            .field("fh", &self.fh)
            .field("dentry", &self.dentry)
            .field("flags", &self.flags)
            .field("len", &self.content.as_ref().map(Bytes::len))
            .finish_non_exhaustive()
    }
}
