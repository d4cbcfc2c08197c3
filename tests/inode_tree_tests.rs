#![allow(clippy::unwrap_used, clippy::expect_used, missing_docs)]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{CountingContent, TestSystem};
use kernfs::fs::{
    ChildGenerator, DirEntry, DirentType, FsError, INodeType, Inode, InodePerms, Node,
    StaticContent,
};

fn ro_file(content: &'static [u8]) -> Node {
    Node::file(
        InodePerms::FILE_READ_ONLY,
        StaticContent::from_static(content),
    )
}

fn dir() -> Node {
    Node::dir(InodePerms::DIR_DEFAULT)
}

/// Generates `gen-<i>` directories for `i < count`, counting calls to `generate`.
#[derive(Clone)]
struct Numbered {
    count: usize,
    generated: Arc<AtomicUsize>,
}

impl ChildGenerator for Numbered {
    fn list(&self) -> Vec<(String, INodeType)> {
        (0..self.count)
            .rev()
            .map(|i| (format!("gen-{i}"), INodeType::Directory))
            .chain([("shadowed".to_owned(), INodeType::Directory)])
            .collect()
    }

    fn generate(&self, name: &str) -> Option<Node> {
        let i: usize = name.strip_prefix("gen-")?.parse().ok()?;
        (i < self.count).then(|| {
            self.generated.fetch_add(1, Ordering::SeqCst);
            dir().with("leaf", ro_file(b"leaf"))
        })
    }
}

fn sample_tree(generated: &Arc<AtomicUsize>) -> Node {
    dir()
        .with("zeta", dir())
        .with("alpha", ro_file(b"alpha"))
        .with("link", Node::symlink("alpha"))
        .with(
            "dyn",
            Node::dynamic_dir(
                InodePerms::DIR_DEFAULT,
                Numbered {
                    count: 3,
                    generated: Arc::clone(generated),
                },
            )
            .with("shadowed", ro_file(b"static wins")),
        )
}

fn sample() -> (TestSystem, Arc<AtomicUsize>) {
    let generated = Arc::new(AtomicUsize::new(0));
    let g = Arc::clone(&generated);
    (TestSystem::tree(move || sample_tree(&g)), generated)
}

#[test]
fn iterate_is_name_sorted_with_construction_types() {
    let (sys, _) = sample();
    let entries: Vec<DirEntry> = sys.root().inode().iterate().unwrap().collect();
    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["alpha", "dyn", "link", "zeta"]);
    sys.assert_directory_is(
        "/",
        &[
            ("alpha", DirentType::RegularFile),
            ("dyn", DirentType::Directory),
            ("link", DirentType::Symlink),
            ("zeta", DirentType::Directory),
        ],
    );
}

#[test]
fn iterate_is_restartable_snapshot() {
    let (sys, _) = sample();
    let mut it = sys.root().inode().iterate().unwrap();
    assert_eq!(it.len(), 4);
    let first: Vec<_> = it.by_ref().take(2).collect();
    assert_eq!(it.len(), 2);
    it.rewind();
    let again: Vec<_> = it.by_ref().take(2).collect();
    assert_eq!(first, again, "rewinding replays the same snapshot");
    assert_eq!(it.entries().len(), 4);
}

#[test]
fn dynamic_listing_merges_and_static_shadows() {
    let (sys, generated) = sample();
    sys.assert_directory_is(
        "/dyn",
        &[
            ("gen-0", DirentType::Directory),
            ("gen-1", DirentType::Directory),
            ("gen-2", DirentType::Directory),
            ("shadowed", DirentType::RegularFile),
        ],
    );
    assert_eq!(
        generated.load(Ordering::SeqCst),
        0,
        "listing does not synthesize children"
    );
    assert_eq!(sys.read_to_end("/dyn/shadowed"), "static wins");
}

#[test]
fn dynamic_lookup_is_cached() {
    let (sys, generated) = sample();
    let d = sys.resolve("/dyn").unwrap();
    let a = d.inode().lookup("gen-1").unwrap();
    let b = d.inode().lookup("gen-1").unwrap();
    assert!(Inode::ptr_eq(&a, &b), "second lookup must hit the cache");
    assert_eq!(generated.load(Ordering::SeqCst), 1);
    assert_eq!(sys.read_to_end("/dyn/gen-1/leaf"), "leaf");
    assert_eq!(generated.load(Ordering::SeqCst), 1);
}

#[test]
fn dynamic_lookup_of_unknown_name_is_not_found() {
    let (sys, generated) = sample();
    let d = sys.resolve("/dyn").unwrap();
    assert_eq!(d.inode().lookup("gen-9").unwrap_err(), FsError::NotFound);
    assert_eq!(d.inode().lookup("nope").unwrap_err(), FsError::NotFound);
    assert_eq!(generated.load(Ordering::SeqCst), 0);
}

#[test]
fn lookup_dot_and_dotdot() {
    let (sys, _) = sample();
    let root = sys.root().inode();
    let zeta = root.lookup("zeta").unwrap();
    assert!(Inode::ptr_eq(&zeta.lookup(".").unwrap(), &zeta));
    assert!(Inode::ptr_eq(&zeta.lookup("..").unwrap(), root));
    assert!(
        Inode::ptr_eq(&root.lookup("..").unwrap(), root),
        "the root is its own parent"
    );
    assert!(root.parent().is_none());
    assert!(Inode::ptr_eq(&zeta.parent().unwrap(), root));
}

#[test]
fn lookup_on_non_directory_fails() {
    let (sys, _) = sample();
    let alpha = sys.root().inode().lookup("alpha").unwrap();
    assert_eq!(alpha.lookup("x").unwrap_err(), FsError::NotADirectory);
    assert_eq!(alpha.iterate().unwrap_err(), FsError::NotADirectory);
    let link = sys.root().inode().lookup("link").unwrap();
    assert_eq!(link.lookup("x").unwrap_err(), FsError::NotADirectory);
}

#[test]
fn lookup_rejects_names_with_slashes() {
    let (sys, _) = sample();
    assert_eq!(
        sys.root().inode().lookup("zeta/x").unwrap_err(),
        FsError::NotFound
    );
    assert_eq!(sys.root().inode().lookup("").unwrap_err(), FsError::NotFound);
}

#[test]
fn readlink_only_on_symlinks() {
    let (sys, _) = sample();
    let root = sys.root().inode();
    assert_eq!(&*root.lookup("link").unwrap().readlink().unwrap(), "alpha");
    assert!(matches!(
        root.lookup("alpha").unwrap().readlink(),
        Err(FsError::InvalidArgument(_))
    ));
    assert!(matches!(root.readlink(), Err(FsError::InvalidArgument(_))));
}

#[test]
fn getattr_reports_type_mode_and_size() {
    let (sys, _) = sample();
    let root = sys.root().inode();

    let attr = root.getattr();
    assert_eq!(attr.itype, INodeType::Directory);
    assert_eq!(attr.perms.mode(), 0o755);
    assert_eq!(attr.st_mode(), u32::from(libc::S_IFDIR) | 0o755);
    assert_eq!(attr.nlink, 2);
    assert_eq!(&*attr.fs_type, "testfs");
    assert_eq!((attr.uid, attr.gid), (0, 0), "owned by the mounting credentials");

    let alpha = root.lookup("alpha").unwrap().getattr();
    assert_eq!(alpha.itype, INodeType::File);
    assert_eq!(alpha.size, 5);
    assert_eq!(alpha.perms.mode(), 0o444);

    let link = root.lookup("link").unwrap().getattr();
    assert_eq!(link.itype, INodeType::Symlink);
    assert_eq!(link.size, 5, "symlink size is the target length");
    assert_eq!(link.perms.mode(), 0o777);
}

#[test]
fn inode_numbers_are_unique() {
    let (sys, _) = sample();
    let root = sys.root().inode();
    let mut inos: Vec<u64> = ["alpha", "dyn", "link", "zeta"]
        .iter()
        .map(|n| root.lookup(n).unwrap().ino())
        .chain([root.ino()])
        .collect();
    inos.sort_unstable();
    inos.dedup();
    assert_eq!(inos.len(), 5);
}

#[test]
fn explicit_owner_overrides_mount_credentials() {
    let sys = TestSystem::tree(|| dir().with("mine", dir().owned_by(1000, 100)));
    let attr = sys.resolve("/mine").unwrap().inode().getattr();
    assert_eq!((attr.uid, attr.gid), (1000, 100));
}

#[test]
fn getattr_before_open_does_not_bind_content() {
    let content = CountingContent::new("gen-");
    let c = content.clone();
    let sys = TestSystem::tree(move || {
        dir().with("f", Node::file(InodePerms::FILE_READ_ONLY, c.clone()))
    });
    let f = sys.resolve("/f").unwrap();

    assert_eq!(f.inode().getattr().size, 5, "\"gen-1\" generated transiently");
    assert_eq!(f.inode().getattr().size, 5, "\"gen-2\" generated transiently");
    assert_eq!(content.calls(), 2, "transient results are not cached");

    let open = sys.open("/f").unwrap();
    assert_eq!(open.read_to_end().unwrap().as_ref(), b"gen-3");
    assert_eq!(f.inode().getattr().size, 5);
    assert_eq!(content.calls(), 3, "after an open, getattr uses the bound size");
}

#[test]
#[should_panic(expected = "invalid directory entry name")]
fn building_with_a_bad_name_panics() {
    let _ = dir().with("a/b", dir());
}

#[test]
#[should_panic(expected = "non-directory")]
fn adding_a_child_to_a_file_panics() {
    let _ = ro_file(b"x").with("child", dir());
}
