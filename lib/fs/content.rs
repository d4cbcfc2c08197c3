//! Producers of synthetic content.
//!
//! A [`ContentGenerator`] backs every regular file: it is invoked once per open and the bytes it
//! returns become that open file's immutable snapshot. A [`ChildGenerator`] backs every dynamic
//! directory: it enumerates the names that currently exist and synthesizes a [`Node`] for a
//! name on first lookup.
//!
//! Both must be pure functions of the ambient state they capture. They must not block on I/O and
//! must not care which caller asked.

use std::fmt::{Display, Write as _};

use bytes::Bytes;

use crate::fs::{INodeType, Node};

/// Produces the bytes of a regular file.
pub trait ContentGenerator: Send + Sync + 'static {
    /// Generate the full content of the file as of now.
    fn generate(&self) -> Bytes;
}

impl<F> ContentGenerator for F
where
    F: Fn() -> Bytes + Send + Sync + 'static,
{
    fn generate(&self) -> Bytes {
        self()
    }
}

/// Content fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticContent(pub Bytes);

impl StaticContent {
    /// Wrap a static byte string.
    #[must_use]
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }
}

impl ContentGenerator for StaticContent {
    fn generate(&self) -> Bytes {
        self.0.clone()
    }
}

/// A generator that formats the [`Display`] value returned by `f`.
pub fn from_display<F, D>(f: F) -> impl ContentGenerator
where
    F: Fn() -> D + Send + Sync + 'static,
    D: Display,
{
    move || {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = write!(out, "{}", f());
        Bytes::from(out)
    }
}

/// Synthesizes the children of a dynamic directory.
pub trait ChildGenerator: Send + Sync + 'static {
    /// The names (and their types) that exist right now, in any order.
    ///
    /// Directory iteration calls this once per pass and sorts the result, so the listing is a
    /// snapshot of this instant.
    fn list(&self) -> Vec<(String, INodeType)>;

    /// Build the child called `name`, or `None` if no such child exists.
    ///
    /// Called at most once per name per directory while the synthesized child stays cached,
    /// even under concurrent lookups.
    fn generate(&self, name: &str) -> Option<Node>;
}
