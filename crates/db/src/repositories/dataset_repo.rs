//! Repository for the `datasets` table.

use sqlx::{PgExecutor, PgPool};

use crate::models::dataset::Dataset;

/// Column list for datasets queries.
const COLUMNS: &str = "key, annotation_fields, revision, created_at, updated_at";

/// Provides lookups and annotation-schema updates for datasets.
///
/// Datasets are created by the import layer; `create` exists for it and
/// for tests.
pub struct DatasetRepo;

impl DatasetRepo {
    /// Register a dataset without annotation fields.
    pub async fn create(pool: &PgPool, key: &str) -> Result<Dataset, sqlx::Error> {
        let query = format!("INSERT INTO datasets (key) VALUES ($1) RETURNING {COLUMNS}");
        sqlx::query_as::<_, Dataset>(&query)
            .bind(key)
            .fetch_one(pool)
            .await
    }

    /// Find a dataset by its key.
    pub async fn find_by_key(pool: &PgPool, key: &str) -> Result<Option<Dataset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM datasets WHERE key = $1");
        sqlx::query_as::<_, Dataset>(&query)
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Fetch only the raw annotation schema document.
    ///
    /// The outer `Option` is `None` when the dataset does not exist, the
    /// inner one when it has no annotation fields yet.
    pub async fn find_annotation_fields(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<Option<String>>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<String>>(
            "SELECT annotation_fields FROM datasets WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(pool)
        .await
    }

    /// Current write revision; `None` when the dataset does not exist.
    pub async fn find_revision(pool: &PgPool, key: &str) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT revision FROM datasets WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    /// Advance the revision from `expected` to the next one.
    ///
    /// Returns the new revision, or `None` when the dataset is missing or
    /// already past `expected`. The row stays locked until the surrounding
    /// transaction ends, so concurrent writers of the same dataset queue up
    /// here and all but the first see a stale revision.
    pub async fn bump_revision<'e, E>(
        executor: E,
        key: &str,
        expected: i64,
    ) -> Result<Option<i64>, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query_scalar::<_, i64>(
            "UPDATE datasets SET revision = revision + 1, updated_at = now() \
             WHERE key = $1 AND revision = $2 \
             RETURNING revision",
        )
        .bind(key)
        .bind(expected)
        .fetch_optional(executor)
        .await
    }

    /// Overwrite the annotation schema document.
    ///
    /// Returns `false` if no dataset has this key.
    pub async fn update_annotation_fields<'e, E>(
        executor: E,
        key: &str,
        annotation_fields: &str,
    ) -> Result<bool, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            "UPDATE datasets SET annotation_fields = $1, updated_at = now() WHERE key = $2",
        )
        .bind(annotation_fields)
        .bind(key)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a dataset together with its annotations.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, key: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM datasets WHERE key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
