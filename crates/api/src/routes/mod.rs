pub mod explorer;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /explorer/datasets/{key}                              fields + annotations
/// /explorer/datasets/{key}/annotation-fields            get, save (reconciles values)
/// /explorer/datasets/{key}/annotations                  get, merge
/// /explorer/datasets/{key}/annotations/summary          per-field counts
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/explorer/datasets", explorer::router())
}
