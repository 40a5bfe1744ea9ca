use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// Moderation queue. Nested under `/admin` and wrapped in the admin guard, so
/// a non-admin token gets 403 before any handler runs.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/restaurants/pending
        .route("/restaurants/pending", get(handlers::get_pending_restaurants))
        // PUT /admin/restaurants/{id}/approve
        .route(
            "/restaurants/{id}/approve",
            put(handlers::approve_restaurant),
        )
        // PUT /admin/restaurants/{id}/reject
        .route("/restaurants/{id}/reject", put(handlers::reject_restaurant))
}
