//! Filesystem-type registry.
//!
//! Registration happens once, during initialization, through a [`RegistryBuilder`]. Building it
//! yields an immutable [`Registry`], so there is no way to register after the first mount can
//! observe the table.

use std::fmt;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::fs::{Credentials, FsError, FsResult, Node};
use crate::vfs::{MountContext, MountOptions};

/// A kind of filesystem that can be mounted, such as `sysfs`.
pub trait FilesystemType: Send + Sync + 'static {
    /// The name this type is normally registered under.
    fn name(&self) -> &str;

    /// Build a fresh tree for a new mount.
    ///
    /// The returned node must be a directory; it becomes the mount's root. Called once per
    /// mount, and every call must produce an independent tree.
    ///
    /// # Errors
    ///
    /// Any error is returned to the caller of the mount unchanged.
    fn get_filesystem(
        &self,
        ctx: &MountContext,
        creds: &Credentials,
        source: &str,
        opts: &MountOptions,
    ) -> FsResult<Node>;
}

/// Collects filesystem types before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    types: FxHashMap<String, Arc<dyn FilesystemType>>,
}

impl RegistryBuilder {
    /// An empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `fs_type` under `name`.
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if `name` is taken. The existing entry is kept.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        fs_type: impl FilesystemType,
    ) -> FsResult<&mut Self> {
        let name = name.into();
        if self.types.contains_key(&name) {
            return Err(FsError::AlreadyRegistered(name));
        }
        debug!(name = %name, "registered filesystem type");
        self.types.insert(name, Arc::new(fs_type));
        Ok(self)
    }

    /// Register `fs_type` under its own [`name`](FilesystemType::name).
    ///
    /// # Errors
    ///
    /// `AlreadyRegistered` if that name is taken.
    pub fn register_type(&mut self, fs_type: impl FilesystemType) -> FsResult<&mut Self> {
        let name = fs_type.name().to_owned();
        self.register(name, fs_type)
    }

    /// Register `fs_type` under `name`, treating a duplicate as a bug in initialization code.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already registered.
    pub fn must_register(
        &mut self,
        name: impl Into<String>,
        fs_type: impl FilesystemType,
    ) -> &mut Self {
        if let Err(e) = self.register(name, fs_type) {
            panic!("filesystem type registration failed during init: {e}");
        }
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> Registry {
        Registry { types: self.types }
    }
}

impl fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("RegistryBuilder")
            .field("types", &names)
            .finish()
    }
}

/// An immutable table of filesystem types, looked up by name when mounting.
pub struct Registry {
    types: FxHashMap<String, Arc<dyn FilesystemType>>,
}

impl Registry {
    /// Start building a registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The filesystem type registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn FilesystemType>> {
        self.types.get(name).cloned()
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.names())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<Registry>> = OnceLock::new();

/// Install the process-wide registry. Can succeed only once per process.
///
/// # Errors
///
/// `AlreadyRegistered` if a global registry is already installed.
pub fn install_global(registry: Registry) -> FsResult<Arc<Registry>> {
    let registry = Arc::new(registry);
    GLOBAL
        .set(Arc::clone(&registry))
        .map_err(|_| FsError::AlreadyRegistered("global filesystem registry".to_owned()))?;
    debug!(types = ?registry.names(), "installed global filesystem registry");
    Ok(registry)
}

/// The process-wide registry, if one has been installed.
#[must_use]
pub fn global() -> Option<Arc<Registry>> {
    GLOBAL.get().cloned()
}
