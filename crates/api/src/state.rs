use std::sync::Arc;

use explorer_core::engine::AnnotationEngine;
use explorer_core::locks::DatasetLocks;
use explorer_db::PgAnnotationStorage;

use crate::config::ServerConfig;

/// The annotation engine wired to Postgres.
pub type Engine = AnnotationEngine<PgAnnotationStorage>;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything non-`Clone` sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: explorer_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Per-dataset edit locks of this process.
    pub locks: Arc<DatasetLocks>,
    /// Annotation engine.
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(pool: explorer_db::DbPool, config: ServerConfig) -> Self {
        let locks = Arc::new(DatasetLocks::new(config.lock_wait));
        let engine = AnnotationEngine::new(
            PgAnnotationStorage::new(pool.clone()),
            Arc::clone(&locks),
        );
        Self {
            pool,
            config: Arc::new(config),
            locks,
            engine: Arc::new(engine),
        }
    }
}
