//! Read-modify-write orchestration for schema edits and value edits.
//!
//! Each operation takes the dataset's lock, reads the current documents
//! through the [`AnnotationStorage`] port, computes the new state fully in
//! memory and writes it back in one go. Nothing is written when any step
//! before the write fails.
//!
//! The lock only covers engines sharing one [`DatasetLocks`]. Writers in
//! other processes are caught by the revision check at write time, after
//! which the whole cycle is repeated on a fresh read.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::annotation_schema::Schema;
use crate::annotation_values::{summarize, AnnotationStore, AnnotationSummary, IncomingAnnotations};
use crate::error::CoreError;
use crate::locks::DatasetLocks;
use crate::reconciliation::{apply_change_set, compute_change_set, merge_annotations, ChangeSummary};
use crate::storage::AnnotationStorage;

/// Attempts per operation before a lost race is reported as a conflict.
pub const MAX_ATTEMPTS: u32 = 5;

/// Schema and recorded values of one dataset, as shown by the explorer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetAnnotations {
    /// `None` when no annotation fields were ever configured.
    pub fields: Option<Schema>,
    pub annotations: AnnotationStore,
}

/// What a schema save did to the stored values.
///
/// The item counts are those of the store as read; they differ only when
/// `migrated` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSaveOutcome {
    pub changes: ChangeSummary,
    /// Whether the annotation store was rewritten.
    pub migrated: bool,
    pub items_before: usize,
    pub items_after: usize,
}

/// What a value merge did to the stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub items_upserted: usize,
    pub items_removed: usize,
    pub total_items: usize,
}

/// Runs schema and value edits against a storage backend, serialized per dataset.
pub struct AnnotationEngine<S> {
    storage: S,
    locks: Arc<DatasetLocks>,
}

impl<S: AnnotationStorage> AnnotationEngine<S> {
    /// Engines handed the same `locks` never interleave edits of a dataset.
    pub fn new(storage: S, locks: Arc<DatasetLocks>) -> Self {
        Self { storage, locks }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the schema and store of a dataset as one consistent snapshot.
    pub async fn load(&self, key: &str) -> Result<DatasetAnnotations, CoreError> {
        let _guard = self.locks.acquire(key).await?;
        retry_on_conflict(key, "load", || self.read_snapshot(key)).await
    }

    /// Per-field counts of annotated items.
    pub async fn summary(&self, key: &str) -> Result<AnnotationSummary, CoreError> {
        let snapshot = self.load(key).await?;
        Ok(summarize(snapshot.fields.as_ref(), &snapshot.annotations))
    }

    /// Replace the dataset's schema and reconcile the stored values with it.
    ///
    /// The submitted schema is validated before anything is read. Stored
    /// values are only rewritten when a previous schema exists, some values
    /// were recorded, and the diff actually touches them.
    pub async fn save_schema(
        &self,
        key: &str,
        new_schema: Schema,
    ) -> Result<SchemaSaveOutcome, CoreError> {
        new_schema.validate()?;

        let _guard = self.locks.acquire(key).await?;
        let outcome =
            retry_on_conflict(key, "save_schema", || self.try_save_schema(key, &new_schema))
                .await?;

        tracing::info!(
            dataset = %key,
            fields = new_schema.len(),
            migrated = outcome.migrated,
            fields_deleted = outcome.changes.fields_deleted,
            labels_renamed = outcome.changes.labels_renamed,
            options_deleted = outcome.changes.options_deleted,
            options_renamed = outcome.changes.options_renamed,
            items_before = outcome.items_before,
            items_after = outcome.items_after,
            "Annotation fields saved"
        );

        Ok(outcome)
    }

    /// Merge a partial batch of records into the dataset's store.
    pub async fn save_annotations(
        &self,
        key: &str,
        incoming: IncomingAnnotations,
    ) -> Result<MergeOutcome, CoreError> {
        let _guard = self.locks.acquire(key).await?;
        let outcome =
            retry_on_conflict(key, "save_annotations", || self.try_merge(key, &incoming)).await?;

        tracing::info!(
            dataset = %key,
            items_upserted = outcome.items_upserted,
            items_removed = outcome.items_removed,
            total_items = outcome.total_items,
            "Annotations saved"
        );

        Ok(outcome)
    }

    async fn read_snapshot(&self, key: &str) -> Result<DatasetAnnotations, CoreError> {
        let revision = self.storage.revision(key).await?;
        let fields = self.storage.read_schema(key).await?;
        let annotations = self.storage.read_store(key).await?;

        if self.storage.revision(key).await? != revision {
            return Err(CoreError::Conflict(format!(
                "dataset '{key}' changed while it was being read"
            )));
        }

        Ok(DatasetAnnotations {
            fields,
            annotations,
        })
    }

    async fn try_save_schema(
        &self,
        key: &str,
        new_schema: &Schema,
    ) -> Result<SchemaSaveOutcome, CoreError> {
        let revision = self.storage.revision(key).await?;
        let old_schema = self.storage.read_schema(key).await?;
        let store = self.storage.read_store(key).await?;

        let mut outcome = SchemaSaveOutcome {
            items_before: store.len(),
            items_after: store.len(),
            ..SchemaSaveOutcome::default()
        };
        let mut migrated_store = None;

        if let Some(old_schema) = old_schema {
            if !store.is_empty() {
                let cs = compute_change_set(&old_schema, new_schema);
                outcome.changes = cs.summary();

                if !cs.is_empty() {
                    let migrated = apply_change_set(store, &cs);
                    outcome.migrated = true;
                    outcome.items_after = migrated.len();
                    migrated_store = Some(migrated);
                }
            }
        }

        self.storage
            .commit(key, new_schema, migrated_store.as_ref(), revision)
            .await?;

        Ok(outcome)
    }

    async fn try_merge(
        &self,
        key: &str,
        incoming: &IncomingAnnotations,
    ) -> Result<MergeOutcome, CoreError> {
        let revision = self.storage.revision(key).await?;
        let store = self.storage.read_store(key).await?;

        let items_removed = incoming
            .iter()
            .filter(|(id, record)| record.is_empty() && store.contains(id))
            .count();
        let items_upserted = incoming.values().filter(|r| !r.is_empty()).count();

        let merged = merge_annotations(store, incoming.clone());
        self.storage.write_store(key, &merged, revision).await?;

        Ok(MergeOutcome {
            items_upserted,
            items_removed,
            total_items: merged.len(),
        })
    }
}

/// Run `attempt` until it stops failing with [`CoreError::Conflict`], at
/// most [`MAX_ATTEMPTS`] times.
async fn retry_on_conflict<T, F, Fut>(
    key: &str,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(CoreError::Conflict(reason)) if tries < MAX_ATTEMPTS => {
                tracing::debug!(
                    dataset = %key,
                    operation,
                    tries,
                    %reason,
                    "Lost a write race, retrying"
                );
                tries += 1;
            }
            Err(CoreError::Conflict(reason)) => {
                tracing::warn!(
                    dataset = %key,
                    operation,
                    tries,
                    %reason,
                    "Giving up after repeated write races"
                );
                return Err(CoreError::Conflict(reason));
            }
            result => return result,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
