//! Repository for the `annotations` table.

use sqlx::{PgExecutor, PgPool};

use crate::models::annotation::AnnotationDocument;
use crate::repositories::DatasetRepo;

/// Column list for annotations queries.
const COLUMNS: &str = "key, annotations, updated_at";

/// Reads and upserts the per-dataset annotation document.
pub struct AnnotationRepo;

impl AnnotationRepo {
    /// Find the annotation document of a dataset.
    pub async fn find_by_key(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<AnnotationDocument>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM annotations WHERE key = $1");
        sqlx::query_as::<_, AnnotationDocument>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Fetch the raw document joined against its dataset.
    ///
    /// The outer `Option` is `None` when the dataset does not exist, the
    /// inner one when it was never annotated.
    pub async fn find_for_dataset(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<String>>(
            "SELECT a.annotations
             FROM datasets d
             LEFT JOIN annotations a ON a.key = d.key
             WHERE d.key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Insert or replace the annotation document of a dataset.
    pub async fn upsert<'e, E>(executor: E, key: &str, annotations: &str) -> Result<(), sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            "INSERT INTO annotations (key, annotations) VALUES ($1, $2) \
             ON CONFLICT (key) DO UPDATE \
             SET annotations = EXCLUDED.annotations, updated_at = now()",
        )
        .bind(key)
        .bind(annotations)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Replace the annotation document if the dataset is still at
    /// `expected`, in one transaction with the revision bump.
    ///
    /// Returns the new revision, or `None` (and writes nothing) when the
    /// dataset is missing or was written by someone else in the meantime.
    pub async fn save_if_current(
        pool: &PgPool,
        key: &str,
        annotations: &str,
        expected: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(revision) = DatasetRepo::bump_revision(&mut *tx, key, expected).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        Self::upsert(&mut *tx, key, annotations).await?;

        tx.commit().await?;
        Ok(Some(revision))
    }

    /// Write a schema document and, optionally, its migrated annotation
    /// document in one transaction, if the dataset is still at `expected`.
    ///
    /// Returns the new revision, or `None` (and writes nothing) when the
    /// dataset is missing or was written by someone else in the meantime.
    pub async fn save_with_fields(
        pool: &PgPool,
        key: &str,
        annotation_fields: &str,
        annotations: Option<&str>,
        expected: i64,
    ) -> Result<Option<i64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(revision) = DatasetRepo::bump_revision(&mut *tx, key, expected).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        DatasetRepo::update_annotation_fields(&mut *tx, key, annotation_fields).await?;

        if let Some(annotations) = annotations {
            Self::upsert(&mut *tx, key, annotations).await?;
        }

        tx.commit().await?;
        Ok(Some(revision))
    }
}
