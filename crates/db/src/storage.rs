//! Postgres implementation of the annotation storage port.

use async_trait::async_trait;
use explorer_core::annotation_schema::Schema;
use explorer_core::annotation_values::AnnotationStore;
use explorer_core::error::CoreError;
use explorer_core::storage::{AnnotationStorage, Revision};

use crate::repositories::{AnnotationRepo, DatasetRepo};
use crate::DbPool;

/// Stores schema documents on the `datasets` row and annotation documents
/// in the `annotations` table. Every write is conditional on the row's
/// `revision`.
#[derive(Clone)]
pub struct PgAnnotationStorage {
    pool: DbPool,
}

impl PgAnnotationStorage {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Explain why a conditional write matched no row.
    async fn rejected_write(&self, key: &str, expected: Revision) -> CoreError {
        match DatasetRepo::find_revision(&self.pool, key).await {
            Ok(None) => dataset_not_found(key),
            Ok(Some(current)) => {
                tracing::info!(dataset = %key, expected, current, "Stale dataset revision");
                CoreError::Conflict(format!(
                    "dataset '{key}' was written concurrently (revision {expected} -> {current})"
                ))
            }
            Err(e) => persistence(key, e),
        }
    }
}

fn dataset_not_found(key: &str) -> CoreError {
    CoreError::NotFound {
        entity: "Dataset",
        key: key.to_string(),
    }
}

fn persistence(key: &str, err: sqlx::Error) -> CoreError {
    tracing::error!(dataset = %key, error = %err, "Annotation storage failure");
    CoreError::Persistence(err.to_string())
}

#[async_trait]
impl AnnotationStorage for PgAnnotationStorage {
    async fn revision(&self, key: &str) -> Result<Revision, CoreError> {
        DatasetRepo::find_revision(&self.pool, key)
            .await
            .map_err(|e| persistence(key, e))?
            .ok_or_else(|| dataset_not_found(key))
    }

    async fn read_schema(&self, key: &str) -> Result<Option<Schema>, CoreError> {
        let fields = DatasetRepo::find_annotation_fields(&self.pool, key)
            .await
            .map_err(|e| persistence(key, e))?
            .ok_or_else(|| dataset_not_found(key))?;

        match fields {
            Some(blob) if !blob.trim().is_empty() => Schema::decode(&blob).map(Some),
            _ => Ok(None),
        }
    }

    async fn read_store(&self, key: &str) -> Result<AnnotationStore, CoreError> {
        let blob = AnnotationRepo::find_for_dataset(&self.pool, key)
            .await
            .map_err(|e| persistence(key, e))?
            .ok_or_else(|| dataset_not_found(key))?;

        AnnotationStore::decode(blob.as_deref().unwrap_or_default())
    }

    async fn write_store(
        &self,
        key: &str,
        store: &AnnotationStore,
        expected: Revision,
    ) -> Result<(), CoreError> {
        let blob = store.encode()?;
        let written = AnnotationRepo::save_if_current(&self.pool, key, &blob, expected)
            .await
            .map_err(|e| persistence(key, e))?;

        match written {
            Some(_) => Ok(()),
            None => Err(self.rejected_write(key, expected).await),
        }
    }

    async fn commit(
        &self,
        key: &str,
        schema: &Schema,
        store: Option<&AnnotationStore>,
        expected: Revision,
    ) -> Result<(), CoreError> {
        let fields_blob = schema.encode()?;
        let store_blob = store.map(AnnotationStore::encode).transpose()?;

        let written = AnnotationRepo::save_with_fields(
            &self.pool,
            key,
            &fields_blob,
            store_blob.as_deref(),
            expected,
        )
        .await
        .map_err(|e| persistence(key, e))?;

        match written {
            Some(_) => Ok(()),
            None => Err(self.rejected_write(key, expected).await),
        }
    }
}
