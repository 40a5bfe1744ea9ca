use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::post,
};

/// Authenticated Router Module
///
/// Every handler here receives a verified `AuthUser`; the guard layer sits on the
/// router above this module.
///
/// `max_upload_bytes` caps the multipart body of the photo route only.
pub fn authenticated_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::<AppState>::new()
        // POST /restaurants
        // Submits a listing; it starts `pending` and earns the creator +10.
        .route("/restaurants", post(handlers::create_restaurant))
        // POST /restaurants/{id}/photos
        // Multipart form, one or more files in the `photos` field.
        .route(
            "/restaurants/{id}/photos",
            post(handlers::upload_photos).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        // POST /reviews
        // 1–5 rating on any existing restaurant; earns the author +5.
        .route("/reviews", post(handlers::create_review))
}
