//! `module/`: one directory per loaded module.

use std::sync::Arc;

use crate::fs::{ChildGenerator, INodeType, InodePerms, Node, StaticContent};

/// Synthesizes a directory with a `refcnt` file for each configured module name.
#[derive(Debug, Clone)]
pub struct ModuleDirs {
    names: Arc<[String]>,
}

impl ModuleDirs {
    /// Directories for `names`. Duplicates collapse into one entry.
    #[must_use]
    pub fn new(names: &[String]) -> Self {
        let mut names = names.to_vec();
        names.sort_unstable();
        names.dedup();
        Self {
            names: names.into(),
        }
    }
}

impl ChildGenerator for ModuleDirs {
    fn list(&self) -> Vec<(String, INodeType)> {
        self.names
            .iter()
            .map(|n| (n.clone(), INodeType::Directory))
            .collect()
    }

    fn generate(&self, name: &str) -> Option<Node> {
        self.names.binary_search_by(|n| n.as_str().cmp(name)).ok()?;
        Some(Node::dir(InodePerms::DIR_DEFAULT).with(
            "refcnt",
            Node::file(InodePerms::FILE_READ_ONLY, StaticContent::from_static(b"0\n")),
        ))
    }
}
