//! Per-process descriptor table.
//!
//! Descriptors name open-file descriptions. `dup` adds another descriptor for the same
//! description, and the description (with its inode reference) goes away on the last `close`.
//! The per-description descriptor counts live in a [`DropWard`] whose release hook removes the
//! description from the table.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::drop_ward::{DropWard, StatelessDrop};
use crate::fs::{
    Attr, Credentials, DirentType, Fd, FsError, FsResult, OpenFile, OpenOptions, PathOperation,
};
use crate::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use crate::vfs::Vfs;

/// Identifies an open-file description within one table.
type DescriptionId = u64;

type Descriptions = scc::HashMap<DescriptionId, Arc<OpenFile>>;

/// First descriptor handed out. 0, 1 and 2 are left for standard streams.
const FIRST_FD: Fd = 3;

/// Drops an open-file description once no descriptor refers to it.
struct CloseDescription;

impl StatelessDrop<Descriptions, DescriptionId> for CloseDescription {
    fn delete(files: &Descriptions, id: &DescriptionId) {
        if let Some((_, file)) = files.remove_sync(id) {
            debug!(fh = file.fh(), ino = file.inode().ino(), "released open-file description");
        }
    }
}

/// Maps descriptor numbers to open files.
pub struct FdTable {
    fds: scc::HashMap<Fd, DescriptionId>,
    ward: DropWard<Descriptions, DescriptionId, CloseDescription>,
    next_fd: AtomicU32,
    next_id: AtomicU64,
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FdTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fds: scc::HashMap::default(),
            ward: DropWard::new(scc::HashMap::default()),
            next_fd: AtomicU32::new(FIRST_FD),
            next_id: AtomicU64::new(1),
        }
    }

    fn alloc_fd(&self, id: DescriptionId) -> Fd {
        loop {
            let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
            if self.fds.insert_sync(fd, id).is_ok() {
                return fd;
            }
        }
    }

    fn description(&self, fd: Fd) -> FsResult<(DescriptionId, Arc<OpenFile>)> {
        let id = self
            .fds
            .read_sync(&fd, |_, id| *id)
            .ok_or(FsError::BadFileDescriptor(fd))?;
        let file = self
            .ward
            .ctx()
            .read_sync(&id, |_, f| Arc::clone(f))
            .ok_or(FsError::BadFileDescriptor(fd))?;
        Ok((id, file))
    }

    /// Install an already-open file and return its descriptor.
    pub fn install(&self, file: OpenFile) -> Fd {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let fh = file.fh();
        // Fresh ids are never present, so the insert cannot collide.
        drop(self.ward.ctx().insert_sync(id, Arc::new(file)));
        self.ward.inc(id);
        let fd = self.alloc_fd(id);
        debug!(fd, fh, "installed descriptor");
        fd
    }

    /// Resolve and open a path, returning a new descriptor.
    ///
    /// # Errors
    ///
    /// Whatever [`Vfs::open_at`] reports.
    pub fn open_at(
        &self,
        vfs: &Vfs,
        creds: &Credentials,
        pop: &PathOperation,
        opts: OpenOptions,
    ) -> FsResult<Fd> {
        let file = vfs.open_at(creds, pop, opts)?;
        Ok(self.install(file))
    }

    /// The open file behind `fd`.
    ///
    /// The returned handle keeps the file alive even if `fd` is closed concurrently.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open.
    pub fn get(&self, fd: Fd) -> FsResult<Arc<OpenFile>> {
        self.description(fd).map(|(_, file)| file)
    }

    /// Positional read.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open, `IsADirectory` for a directory.
    pub fn read_at(&self, fd: Fd, offset: u64, len: usize) -> FsResult<Bytes> {
        self.get(fd)?.read_at(offset, len)
    }

    /// Read from the description's cursor.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open, `IsADirectory` for a directory.
    pub fn read(&self, fd: Fd, len: usize) -> FsResult<Bytes> {
        self.get(fd)?.read(len)
    }

    /// Attributes of the open file.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open.
    pub fn fstat(&self, fd: Fd) -> FsResult<Attr> {
        Ok(self.get(fd)?.stat())
    }

    /// All entries of an open directory, by name.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open, `NotADirectory` for a regular file.
    pub fn iterate_directory(&self, fd: Fd) -> FsResult<BTreeMap<String, DirentType>> {
        Ok(self
            .get(fd)?
            .iterate()?
            .map(|entry| (entry.name, entry.dtype))
            .collect())
    }

    /// A new descriptor for the same open-file description as `fd`.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open.
    pub fn dup(&self, fd: Fd) -> FsResult<Fd> {
        let (id, _) = self.description(fd)?;
        // A concurrent final close may have released the description in between.
        self.ward
            .inc_existing(&id)
            .ok_or(FsError::BadFileDescriptor(fd))?;
        let new_fd = self.alloc_fd(id);
        debug!(fd, new_fd, "duplicated descriptor");
        Ok(new_fd)
    }

    /// Close `fd`. The final close of a description releases its inode reference before this
    /// returns.
    ///
    /// # Errors
    ///
    /// `BadFileDescriptor` if `fd` is not open.
    pub fn close(&self, fd: Fd) -> FsResult<()> {
        let (_, id) = self
            .fds
            .remove_sync(&fd)
            .ok_or(FsError::BadFileDescriptor(fd))?;
        let remaining = self.ward.dec(&id);
        debug!(fd, remaining = ?remaining, "closed descriptor");
        Ok(())
    }

    /// Number of open descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Returns `true` if no descriptor is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Number of distinct open-file descriptions.
    #[must_use]
    pub fn descriptions(&self) -> usize {
        self.ward.len()
    }
}

impl std::fmt::Debug for FdTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FdTable")
            .field("fds", &self.fds.len())
            .field("descriptions", &self.ward.len())
            .finish()
    }
}
