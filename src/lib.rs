use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod handlers;
pub mod models;
pub mod moderation;
pub mod repository;
pub mod reputation;
pub mod storage;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::{AdminUser, AuthUser, TokenService};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::{AppConfig, Env};
pub use credentials::{CredentialService, PasswordHasher};
pub use moderation::ModerationService;
pub use repository::{PostgresRepository, RepositoryState};
pub use reputation::ReputationLedger;
pub use storage::{LocalDiskStorage, MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler and schema, served at `/api-docs/openapi.json`
/// and browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::register_user, handlers::login,
        handlers::get_restaurants, handlers::create_restaurant, handlers::upload_photos,
        handlers::create_review, handlers::get_pending_restaurants,
        handlers::approve_restaurant, handlers::reject_restaurant
    ),
    components(
        schemas(
            models::Role, models::RestaurantStatus, models::Restaurant, models::Photo,
            models::Review, models::RegisterRequest, models::LoginRequest,
            models::CreateRestaurantRequest, models::CreateReviewRequest,
            models::PhotoUploadForm, models::MessageResponse, models::TokenResponse,
            models::ModerationResponse, models::HealthResponse, models::ErrorResponse,
        )
    ),
    tags(
        (name = "restaurant-reviews", description = "Restaurant discovery, reviews and moderation API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Single shared container for every service a handler can reach. Cloned per
/// request; all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Persistence layer (Postgres in production, in-memory in tests).
    pub repo: RepositoryState,
    /// Photo storage backend.
    pub storage: StorageState,
    pub config: AppConfig,
    /// Bearer token issuance and verification.
    pub tokens: TokenService,
    pub hasher: PasswordHasher,
}

impl AppState {
    /// Builds the state from its parts. The token service is derived from
    /// `config.jwt_secret` and the hasher from `config.bcrypt_cost`.
    pub fn new(
        repo: RepositoryState,
        storage: StorageState,
        config: AppConfig,
    ) -> Result<Self, auth::TokenError> {
        let tokens = TokenService::new(&config.jwt_secret)?;
        let hasher = PasswordHasher::new(config.bcrypt_cost);
        Ok(Self {
            repo,
            storage,
            config,
            tokens,
            hasher,
        })
    }

    pub fn moderation(&self) -> ModerationService {
        ModerationService::new(self.repo.clone())
    }

    pub fn credentials(&self) -> CredentialService {
        CredentialService::new(self.repo.clone(), self.hasher, self.tokens.clone())
    }

    pub fn ledger(&self) -> ReputationLedger {
        ReputationLedger::new(self.repo.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenService {
    fn from_ref(app_state: &AppState) -> TokenService {
        app_state.tokens.clone()
    }
}

/// auth_middleware
///
/// Guard for `authenticated_routes`. Extracting `AuthUser` is the whole check:
/// a missing or invalid token rejects with 401 before the handler runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Guard for `admin_routes`: 401 without a valid token, 403 for any role but `admin`.
async fn admin_middleware(_admin: AdminUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// cors_layer
///
/// Only the configured frontend origin may send credentialed requests. An origin
/// that is not a valid header value falls back to a permissive, credential-less layer.
fn cors_layer(origin: &str) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::OPTIONS];
    match HeaderValue::from_str(origin) {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(methods)
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(origin, "CORS_ORIGIN is not a valid header value, allowing any origin");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(methods)
                .allow_headers(Any)
        }
    }
}

/// create_router
///
/// Assembles the routing tree, applies the access guards per router and the
/// observability layers globally.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origin);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 1. Base Router Assembly
    let mut base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no guard.
        .merge(public::public_routes())
        // Authenticated Routes: valid bearer token required.
        .merge(
            authenticated::authenticated_routes(state.config.max_upload_bytes).route_layer(
                middleware::from_fn_with_state(state.clone(), auth_middleware),
            ),
        )
        // Admin Routes: valid bearer token with role `admin`.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        );

    // Locally stored photos are served by the API itself.
    if state.config.env == Env::Local {
        base_router = base_router.nest_service("/uploads", ServeDir::new(&state.config.upload_dir));
    }

    let base_router = base_router.with_state(state);

    // 2. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`: method, uri and the `x-request-id` so every log line of
/// one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
