pub mod memory;

use crate::core::{RawDocument, StoreResult, Value};

pub use memory::MemoryStore;

/// Document persistence collaborator.
///
/// Documents travel in raw form, already cast out. Implementations must:
/// - key documents by their `_id` within a class;
/// - return `find_many_by_foreign_key` results in insertion order;
/// - report failures as [`crate::PersistError`] values, never panic.
pub trait DocumentStore: Send + Sync {
    /// Insert or replace a document of `class`.
    fn save(&self, class: &str, document: &RawDocument) -> StoreResult<()>;

    /// First document of `class` whose `key` equals `value`.
    ///
    /// Returns `Ok(None)` if nothing matches.
    fn find_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Option<RawDocument>>;

    /// Every document of `class` whose `key` equals `value`.
    fn find_many_by_foreign_key(
        &self,
        class: &str,
        key: &str,
        value: &Value,
    ) -> StoreResult<Vec<RawDocument>>;
}
