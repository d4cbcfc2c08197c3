//! kernfs shared library: a framework for synthetic, in-memory filesystems.

/// Caching primitives for the node tree.
pub mod cache;
pub mod drop_ward;
/// The synthetic node tree and the operations defined over it.
pub mod fs;
/// A sysfs-shaped filesystem type.
pub mod sysfs;
pub mod sync;
/// Filesystem-type registry, mount namespaces and descriptor tables.
pub mod vfs;
