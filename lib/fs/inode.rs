//! Counted inode handles.
//!
//! An [`Inode`] is a strong, counted handle to a node in a mounted tree. Creating or cloning a
//! handle acquires a reference; dropping it releases one. Holders include a parent's child map
//! (or a dynamic directory's child cache), every [`Dentry`](crate::fs::Dentry) and every
//! [`OpenFile`](crate::fs::OpenFile). When the final handle is dropped the node's release hook
//! runs right there, on that thread, before `drop` returns.
//!
//! Ownership only points downwards. Children refer back to their parent through a
//! [`WeakInode`], which never keeps the parent alive.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::once_backed::OnceBackedCache;
use crate::fs::node::{NodeKind, is_valid_name};
use crate::fs::refcount::{RefCount, RefState, Release};
use crate::fs::{
    Attr, ChildGenerator, ContentGenerator, DirEntry, DirentType, FileHandle, FsError, FsResult,
    INodeType, InodeAddr, InodePerms, Node, ReleaseHook,
};
use crate::sync::atomic::{AtomicU64, Ordering};
use crate::sync::{Mutex, lock};

/// Lifecycle state of an inode.
pub type InodeState = RefState;

/// Marks a regular file whose content has never been bound to an open file.
const SIZE_UNKNOWN: u64 = u64::MAX;

/// Block size reported in attributes.
const BLOCK_SIZE: u32 = 4096;

/// State shared by every inode of one mounted filesystem instance.
pub(crate) struct FsCore {
    fs_type: Arc<str>,
    next_ino: AtomicU64,
    next_fh: AtomicU64,
    mtime: SystemTime,
    uid: u32,
    gid: u32,
}

impl FsCore {
    pub(crate) fn new(fs_type: Arc<str>, mtime: SystemTime, uid: u32, gid: u32) -> Arc<Self> {
        Arc::new(Self {
            fs_type,
            next_ino: AtomicU64::new(1),
            next_fh: AtomicU64::new(1),
            mtime,
            uid,
            gid,
        })
    }

    fn alloc_ino(&self) -> InodeAddr {
        self.next_ino.fetch_add(1, Ordering::Relaxed)
    }
}

enum Kind {
    StaticDir {
        children: BTreeMap<Arc<str>, Inode>,
    },
    DynamicDir {
        children: BTreeMap<Arc<str>, Inode>,
        generator: Arc<dyn ChildGenerator>,
        cache: OnceBackedCache<Arc<str>, Inode>,
    },
    File {
        content: Arc<dyn ContentGenerator>,
        /// Length of the most recently bound snapshot, or [`SIZE_UNKNOWN`].
        last_size: AtomicU64,
    },
    Symlink {
        target: Arc<str>,
    },
}

pub(crate) struct InodeData {
    ino: InodeAddr,
    perms: InodePerms,
    uid: u32,
    gid: u32,
    parent: Weak<InodeData>,
    fs: Arc<FsCore>,
    kind: Kind,
    refs: RefCount,
    on_release: Mutex<Option<ReleaseHook>>,
}

impl InodeData {
    fn itype(&self) -> INodeType {
        match self.kind {
            Kind::StaticDir { .. } | Kind::DynamicDir { .. } => INodeType::Directory,
            Kind::File { .. } => INodeType::File,
            Kind::Symlink { .. } => INodeType::Symlink,
        }
    }
}

/// A counted handle to a node of a mounted tree.
pub struct Inode {
    data: Arc<InodeData>,
}

/// A non-owning reference to an inode, used for parent back-references.
#[derive(Clone, Default)]
pub struct WeakInode(Weak<InodeData>);

impl WeakInode {
    /// Acquire a new counted handle, or `None` if the inode has been released.
    #[must_use]
    pub fn upgrade(&self) -> Option<Inode> {
        let data = self.0.upgrade()?;
        data.refs.acquire().ok()?;
        Some(Inode { data })
    }
}

impl fmt::Debug for WeakInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakInode")
    }
}

fn materialize_children(
    children: BTreeMap<String, Node>,
    parent: &Weak<InodeData>,
    fs: &Arc<FsCore>,
) -> BTreeMap<Arc<str>, Inode> {
    children
        .into_iter()
        .map(|(name, node)| (Arc::from(name), Inode::materialize(node, parent, fs)))
        .collect()
}

impl Inode {
    /// Turn `node` (and its static subtree) into live inodes whose parent is `parent`.
    pub(crate) fn materialize(node: Node, parent: &Weak<InodeData>, fs: &Arc<FsCore>) -> Self {
        let Node {
            perms,
            owner,
            kind,
            on_release,
        } = node;
        let ino = fs.alloc_ino();
        let (uid, gid) = owner.unwrap_or((fs.uid, fs.gid));

        let data = Arc::new_cyclic(|this: &Weak<InodeData>| {
            let kind = match kind {
                NodeKind::Dir { children } => Kind::StaticDir {
                    children: materialize_children(children, this, fs),
                },
                NodeKind::DynamicDir {
                    children,
                    generator,
                } => Kind::DynamicDir {
                    children: materialize_children(children, this, fs),
                    generator,
                    cache: OnceBackedCache::default(),
                },
                NodeKind::File { content } => Kind::File {
                    content,
                    last_size: AtomicU64::new(SIZE_UNKNOWN),
                },
                NodeKind::Symlink { target } => Kind::Symlink {
                    target: Arc::from(target),
                },
            };
            InodeData {
                ino,
                perms,
                uid,
                gid,
                parent: parent.clone(),
                fs: Arc::clone(fs),
                kind,
                refs: RefCount::new(),
                on_release: Mutex::new(on_release),
            }
        });
        if let Err(e) = data.refs.activate() {
            unreachable!("freshly built inode {ino} was already {:?}", e.0);
        }
        Self { data }
    }

    /// Materialize `node` as the root of a new filesystem instance.
    pub(crate) fn materialize_root(node: Node, fs: &Arc<FsCore>) -> Self {
        Self::materialize(node, &Weak::new(), fs)
    }

    /// The inode address, unique within its filesystem instance.
    #[must_use]
    pub fn ino(&self) -> InodeAddr {
        self.data.ino
    }

    /// The variant of this inode.
    #[must_use]
    pub fn itype(&self) -> INodeType {
        self.data.itype()
    }

    /// Returns `true` for static and dynamic directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.itype() == INodeType::Directory
    }

    /// Returns `true` for symlinks.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.itype() == INodeType::Symlink
    }

    /// Name of the filesystem type this inode belongs to.
    #[must_use]
    pub fn fs_type(&self) -> &str {
        &self.data.fs.fs_type
    }

    /// Returns `true` if both handles refer to the same inode.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }

    /// Number of outstanding counted handles.
    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.data.refs.count()
    }

    /// Lifecycle state. Always `Active` while observed through a live handle.
    #[must_use]
    pub fn state(&self) -> InodeState {
        self.data.refs.state()
    }

    /// Explicitly acquire another reference. Equivalent to `clone`.
    #[must_use]
    pub fn acquire(&self) -> Self {
        self.clone()
    }

    /// Explicitly release this reference. Equivalent to `drop`.
    ///
    /// If this was the final reference the release hook has run by the time this returns.
    pub fn release(self) {
        drop(self);
    }

    /// A non-owning reference to this inode.
    #[must_use]
    pub fn downgrade(&self) -> WeakInode {
        WeakInode(Arc::downgrade(&self.data))
    }

    /// The parent directory, or `None` for a filesystem root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        WeakInode(self.data.parent.clone()).upgrade()
    }

    pub(crate) fn next_file_handle(&self) -> FileHandle {
        self.data.fs.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    /// Attributes of this inode.
    ///
    /// A regular file reports the size of the content most recently bound to an open file. If
    /// it has never been opened, content is generated transiently to answer and then discarded.
    #[must_use]
    pub fn getattr(&self) -> Attr {
        let size = match &self.data.kind {
            Kind::StaticDir { .. } | Kind::DynamicDir { .. } => 0,
            Kind::File { content, last_size } => match last_size.load(Ordering::Acquire) {
                SIZE_UNKNOWN => content.generate().len() as u64,
                n => n,
            },
            Kind::Symlink { target } => target.len() as u64,
        };
        self.attr_with_size(size)
    }

    /// Attributes for permission checks. Never runs a content generator; `size` is 0.
    pub(crate) fn access_attr(&self) -> Attr {
        self.attr_with_size(0)
    }

    pub(crate) fn attr_with_size(&self, size: u64) -> Attr {
        let d = &self.data;
        let itype = d.itype();
        Attr {
            ino: d.ino,
            itype,
            perms: d.perms,
            uid: d.uid,
            gid: d.gid,
            nlink: if itype == INodeType::Directory { 2 } else { 1 },
            size,
            blksize: BLOCK_SIZE,
            mtime: d.fs.mtime,
            fs_type: Arc::clone(&d.fs.fs_type),
        }
    }

    /// Resolve a single path component within this directory.
    ///
    /// `.` is this directory and `..` its parent (a root is its own parent). For a dynamic
    /// directory a name that is not yet cached is synthesized by its generator; concurrent first
    /// lookups of the same name all receive the same inode.
    ///
    /// # Errors
    ///
    /// `NotADirectory` if this is not a directory, `NotFound` if no such child exists.
    pub fn lookup(&self, name: &str) -> FsResult<Self> {
        match &self.data.kind {
            Kind::File { .. } | Kind::Symlink { .. } => return Err(FsError::NotADirectory),
            Kind::StaticDir { .. } | Kind::DynamicDir { .. } => {}
        }
        match name {
            "." => return Ok(self.clone()),
            ".." => return Ok(self.parent().unwrap_or_else(|| self.clone())),
            _ if !is_valid_name(name) => return Err(FsError::NotFound),
            _ => {}
        }

        match &self.data.kind {
            Kind::StaticDir { children } => children.get(name).cloned().ok_or(FsError::NotFound),
            Kind::DynamicDir {
                children,
                generator,
                cache,
            } => {
                if let Some(child) = children.get(name) {
                    return Ok(child.clone());
                }
                cache.get_or_try_init(Arc::from(name), || {
                    let node = generator.generate(name).ok_or(FsError::NotFound)?;
                    let child = Self::materialize(node, &Arc::downgrade(&self.data), &self.data.fs);
                    debug!(
                        parent = self.data.ino,
                        name,
                        ino = child.ino(),
                        "synthesized dynamic child"
                    );
                    Ok(child)
                })
            }
            Kind::File { .. } | Kind::Symlink { .. } => Err(FsError::NotADirectory),
        }
    }

    /// Snapshot the entries of this directory, sorted by name.
    ///
    /// Names are captured when this is called; later changes to the tree or to a dynamic
    /// generator's state are not reflected in the returned iterator.
    ///
    /// # Errors
    ///
    /// `NotADirectory` if this is not a directory.
    pub fn iterate(&self) -> FsResult<DirIter> {
        let mut entries: BTreeMap<String, DirentType> = BTreeMap::new();
        let statics = match &self.data.kind {
            Kind::StaticDir { children } => children,
            Kind::DynamicDir {
                children,
                generator,
                ..
            } => {
                for (name, itype) in generator.list() {
                    if is_valid_name(&name) {
                        entries.insert(name, itype.into());
                    } else {
                        warn!(dir = self.data.ino, name = %name, "generator listed an invalid name");
                    }
                }
                children
            }
            Kind::File { .. } | Kind::Symlink { .. } => return Err(FsError::NotADirectory),
        };
        // Static children shadow generated names.
        for (name, child) in statics {
            entries.insert(name.to_string(), child.itype().into());
        }
        Ok(DirIter::new(
            entries
                .into_iter()
                .map(|(name, dtype)| DirEntry { name, dtype })
                .collect(),
        ))
    }

    /// The target of this symlink.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if this is not a symlink.
    pub fn readlink(&self) -> FsResult<Arc<str>> {
        match &self.data.kind {
            Kind::Symlink { target } => Ok(Arc::clone(target)),
            Kind::StaticDir { .. } | Kind::DynamicDir { .. } | Kind::File { .. } => {
                Err(FsError::InvalidArgument("not a symlink"))
            }
        }
    }

    /// Run this file's content generator once and record the snapshot size.
    pub(crate) fn generate_content(&self) -> FsResult<Bytes> {
        match &self.data.kind {
            Kind::File { content, last_size } => {
                let bytes = content.generate();
                last_size.store(bytes.len() as u64, Ordering::Release);
                Ok(bytes)
            }
            Kind::StaticDir { .. } | Kind::DynamicDir { .. } => Err(FsError::IsADirectory),
            Kind::Symlink { .. } => Err(FsError::InvalidArgument("cannot read a symlink")),
        }
    }
}

impl Clone for Inode {
    fn clone(&self) -> Self {
        if let Err(e) = self.data.refs.acquire() {
            unreachable!("cloning a live handle to inode {} found it {:?}", self.data.ino, e.0);
        }
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl Drop for Inode {
    fn drop(&mut self) {
        match self.data.refs.release() {
            Ok(Release::Remaining(_)) => {}
            Ok(Release::Last) => {
                let hook = lock(&self.data.on_release).take();
                if let Some(hook) = hook {
                    hook(self.data.ino);
                }
            }
            Err(e) => {
                warn!(ino = self.data.ino, state = ?e.0, "released an inode that was not active");
            }
        }
    }
}

impl PartialEq for Inode {
    fn eq(&self, other: &Self) -> bool {
        Self::ptr_eq(self, other)
    }
}

impl Eq for Inode {}

impl fmt::Debug for Inode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inode")
            .field("ino", &self.data.ino)
            .field("itype", &self.data.itype())
            .field("refs", &self.data.refs.state())
            .finish()
    }
}

/// A restartable, name-sorted snapshot of a directory's entries.
#[derive(Debug, Clone)]
pub struct DirIter {
    entries: Arc<[DirEntry]>,
    pos: usize,
}

impl DirIter {
    fn new(entries: Vec<DirEntry>) -> Self {
        Self {
            entries: entries.into(),
            pos: 0,
        }
    }

    /// Start over from the first entry of the same snapshot.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// All entries of the snapshot, regardless of the current position.
    #[must_use]
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }
}

impl Iterator for DirIter {
    type Item = DirEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entries.get(self.pos)?.clone();
        self.pos += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.entries.len().saturating_sub(self.pos);
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for DirIter {}
