//! Resource CRUD routes. Handlers resolve the resource from the first path segment; the rest of
//! the path is the key, one segment per key column (`/spreads/{fertilizer_id}/{plot_number}`).

use crate::handlers::entity::{create, delete, list, patch, read, replace};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/*key",
            get(read).put(replace).patch(patch).delete(delete),
        )
        .with_state(state)
}
