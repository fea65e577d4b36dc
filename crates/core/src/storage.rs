//! Storage port for per-dataset schema and annotation blobs.
//!
//! The engine never talks to a database directly. The persistence crate
//! implements [`AnnotationStorage`] against the relational store.
//!
//! Writes are conditional on a [`Revision`] read before the documents, so
//! two processes editing the same dataset cannot overwrite each other's
//! work: the slower one gets [`CoreError::Conflict`] and starts over.

use async_trait::async_trait;

use crate::annotation_schema::Schema;
use crate::annotation_values::AnnotationStore;
use crate::error::CoreError;

/// Write counter of a dataset. Every successful write bumps it by one.
pub type Revision = i64;

/// Keyed access to the two persisted documents of a dataset.
///
/// Every method returns [`CoreError::NotFound`] when the dataset itself
/// does not exist and [`CoreError::Persistence`] when the backing store
/// fails.
#[async_trait]
pub trait AnnotationStorage: Send + Sync {
    /// Current revision. Read it before the documents it guards.
    async fn revision(&self, key: &str) -> Result<Revision, CoreError>;

    /// Current schema, or `None` when no fields were ever saved.
    async fn read_schema(&self, key: &str) -> Result<Option<Schema>, CoreError>;

    /// Current annotation store; empty when nothing was ever recorded.
    async fn read_store(&self, key: &str) -> Result<AnnotationStore, CoreError>;

    /// Upsert the store document (the empty store is written as the empty
    /// marker) if the dataset is still at `expected`.
    ///
    /// Returns [`CoreError::Conflict`] and writes nothing when another
    /// writer got there first.
    async fn write_store(
        &self,
        key: &str,
        store: &AnnotationStore,
        expected: Revision,
    ) -> Result<(), CoreError>;

    /// Persist a schema together with its migrated store, both or neither,
    /// if the dataset is still at `expected`.
    ///
    /// `store` is `None` when the stored values need no rewrite.
    async fn commit(
        &self,
        key: &str,
        schema: &Schema,
        store: Option<&AnnotationStore>,
        expected: Revision,
    ) -> Result<(), CoreError>;
}
