#![allow(dead_code, missing_docs, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use kernfs::fs::{
    AllowAll, ContentGenerator, Credentials, Dentry, DirentType, FsResult, InodeAddr, Node,
    OpenFile, OpenOptions, PathOperation,
};
use kernfs::sysfs::{SYSFS_NAME, SysfsConfig, SysfsType};
use kernfs::vfs::{
    FilesystemType, MountContext, MountNamespace, MountOptions, Registry, RegistryBuilder, Vfs,
};

/// A filesystem type whose tree is produced by a closure, so tests can mount arbitrary shapes.
pub struct TreeFs<F> {
    name: &'static str,
    build: F,
}

impl<F> TreeFs<F>
where
    F: Fn() -> Node + Send + Sync + 'static,
{
    pub fn new(name: &'static str, build: F) -> Self {
        Self { name, build }
    }
}

impl<F> FilesystemType for TreeFs<F>
where
    F: Fn() -> Node + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn get_filesystem(
        &self,
        _ctx: &MountContext,
        _creds: &Credentials,
        _source: &str,
        _opts: &MountOptions,
    ) -> FsResult<Node> {
        Ok((self.build)())
    }
}

/// A mounted filesystem plus the credentials tests act with.
pub struct TestSystem {
    pub vfs: Vfs,
    pub mns: MountNamespace,
    pub creds: Credentials,
}

impl TestSystem {
    /// Mount the first registered type in `builder` under `name`, acting as root.
    pub fn mount(builder: RegistryBuilder, name: &str) -> Self {
        let vfs = Vfs::new(Arc::new(builder.build()));
        let creds = Credentials::root();
        let mns = vfs
            .new_mount_namespace(
                &MountContext::now(),
                &creds,
                "",
                name,
                &MountOptions::default(),
            )
            .expect("mount should succeed");
        Self { vfs, mns, creds }
    }

    /// sysfs with default configuration.
    pub fn sysfs() -> Self {
        Self::sysfs_with(SysfsConfig::default())
    }

    pub fn sysfs_with(config: SysfsConfig) -> Self {
        let mut builder = Registry::builder();
        builder.must_register(SYSFS_NAME, SysfsType::new(config));
        Self::mount(builder, SYSFS_NAME)
    }

    /// A tree built by `build`, with every permission check allowed.
    pub fn tree(build: impl Fn() -> Node + Send + Sync + 'static) -> Self {
        let mut builder = Registry::builder();
        builder.must_register("testfs", TreeFs::new("testfs", build));
        let mut sys = Self::mount(builder, "testfs");
        sys.vfs = sys.vfs.with_policy(Arc::new(AllowAll));
        sys
    }

    /// A tree built by `build`, checked with Unix mode bits.
    pub fn tree_with_modes(build: impl Fn() -> Node + Send + Sync + 'static) -> Self {
        let mut builder = Registry::builder();
        builder.must_register("testfs", TreeFs::new("testfs", build));
        Self::mount(builder, "testfs")
    }

    pub fn as_user(mut self, creds: Credentials) -> Self {
        self.creds = creds;
        self
    }

    pub fn root(&self) -> &Dentry {
        self.mns.root()
    }

    pub fn path_op_at_root(&self, path: &str) -> PathOperation {
        self.mns.path_op_at_root(path)
    }

    pub fn resolve(&self, path: &str) -> FsResult<Dentry> {
        self.vfs.resolve(&self.creds, &self.path_op_at_root(path))
    }

    pub fn open(&self, path: &str) -> FsResult<OpenFile> {
        self.vfs
            .open_at(&self.creds, &self.path_op_at_root(path), OpenOptions::default())
    }

    /// Open `path`, read it to the end and close it.
    pub fn read_to_end(&self, path: &str) -> String {
        let file = self
            .open(path)
            .unwrap_or_else(|e| panic!("open {path:?} failed: {e}"));
        let bytes = file.read_to_end().unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub fn list(&self, path: &str) -> BTreeMap<String, DirentType> {
        let dir = self
            .vfs
            .open_at(&self.creds, &self.path_op_at_root(path), OpenOptions::directory())
            .unwrap_or_else(|e| panic!("opendir {path:?} failed: {e}"));
        dir.iterate()
            .unwrap()
            .map(|e| (e.name, e.dtype))
            .collect()
    }

    /// Assert the directory at `path` holds exactly `expected`.
    pub fn assert_directory_is(&self, path: &str, expected: &[(&str, DirentType)]) {
        let want: BTreeMap<String, DirentType> = expected
            .iter()
            .map(|(n, t)| ((*n).to_owned(), *t))
            .collect();
        assert_eq!(self.list(path), want, "unexpected entries in {path:?}");
    }
}

/// File content that counts how many times it was generated. Each generation returns
/// `"<prefix><n>"` where `n` is the call number starting at 1.
#[derive(Clone)]
pub struct CountingContent {
    pub prefix: &'static str,
    pub calls: Arc<AtomicUsize>,
}

impl CountingContent {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ContentGenerator for CountingContent {
    fn generate(&self) -> Bytes {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Bytes::from(format!("{}{n}", self.prefix))
    }
}

/// Records every inode address whose release hook ran.
#[derive(Clone, Default)]
pub struct ReleaseLog {
    released: Arc<std::sync::Mutex<Vec<InodeAddr>>>,
}

impl ReleaseLog {
    pub fn hook(&self) -> impl FnOnce(InodeAddr) + Send + 'static {
        let released = Arc::clone(&self.released);
        move |ino| released.lock().unwrap().push(ino)
    }

    pub fn released(&self) -> Vec<InodeAddr> {
        self.released.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.released.lock().unwrap().len()
    }
}
