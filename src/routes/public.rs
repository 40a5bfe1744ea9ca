use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a token. The restaurant listing only ever returns
/// `approved` rows.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Returns {"status":"OK"}.
        .route("/health", get(handlers::health))
        // POST /register
        // Creates a `user` account.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Email + password for a bearer token.
        .route("/login", post(handlers::login))
        // GET /restaurants?name=...&category=...&page=...&limit=...
        .route("/restaurants", get(handlers::get_restaurants))
}
