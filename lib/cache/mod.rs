/// Synchronous deduplicating cache used for lazily created directory children.
pub mod once_backed;
