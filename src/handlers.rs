use crate::{
    AppState,
    auth::{AdminUser, AuthUser},
    error::{ApiError, ValidatedJson, parse_id},
    models::{
        CreateRestaurantRequest, CreateReviewRequest, ErrorResponse, HealthResponse,
        LoginRequest, MessageResponse, ModerationResponse, Photo, PhotoUploadForm,
        RegisterRequest, Restaurant, Review, TokenResponse,
    },
    moderation::{ModerationAction, RestaurantFilter},
    reputation::Contribution,
    storage::photo_object_key,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    http::StatusCode,
};

// --- Query Structs ---

/// RestaurantQuery
///
/// Raw query parameters for GET /restaurants. Kept as strings so bad or repeated
/// values fall back to defaults (see `RestaurantFilter::from_query`) instead of
/// rejecting the request.
#[derive(Debug, Default, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RestaurantQuery {
    /// Page number, 1-based. Defaults to 1.
    pub page: Option<String>,
    /// Page size. Defaults to 10.
    pub limit: Option<String>,
    /// Case-insensitive substring of the restaurant name.
    pub name: Option<String>,
    /// Case-insensitive substring of the category.
    pub category: Option<String>,
}

impl RestaurantQuery {
    /// Builds the query from raw pairs, keeping the first value of a repeated key.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = RestaurantQuery::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "page" => &mut query.page,
                "limit" => &mut query.limit,
                "name" => &mut query.name,
                "category" => &mut query.category,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query
    }
}

impl From<&RestaurantQuery> for RestaurantFilter {
    fn from(query: &RestaurantQuery) -> Self {
        RestaurantFilter::from_query(
            query.page.as_deref(),
            query.limit.as_deref(),
            query.name.as_deref(),
            query.category.as_deref(),
        )
    }
}

// --- Handlers ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

/// register_user
///
/// [Public Route] Creates a `user` account. The role is never read from the body.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registered", body = MessageResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 409, description = "Email or username taken", body = ErrorResponse)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    state.credentials().register(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully".to_string(),
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email + password for a 72-hour bearer token.
/// Unknown email and wrong password are indistinguishable to the client.
#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.credentials().login(payload).await?;
    Ok(Json(TokenResponse { token }))
}

/// get_restaurants
///
/// [Public Route] Approved restaurants only, with optional name/category search
/// and page/limit pagination.
#[utoipa::path(
    get,
    path = "/restaurants",
    params(RestaurantQuery),
    responses((status = 200, description = "Approved restaurants", body = [Restaurant]))
)]
pub async fn get_restaurants(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    let filter = RestaurantFilter::from(&RestaurantQuery::from_pairs(pairs));
    let restaurants = state.moderation().list_public(&filter).await?;
    Ok(Json(restaurants))
}

/// create_restaurant
///
/// [Authenticated Route] Submits a listing. It starts `pending` and the creator
/// earns reputation.
#[utoipa::path(
    post,
    path = "/restaurants",
    request_body = CreateRestaurantRequest,
    responses(
        (status = 201, description = "Created (pending moderation)", body = Restaurant),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
pub async fn create_restaurant(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateRestaurantRequest>,
) -> Result<(StatusCode, Json<Restaurant>), ApiError> {
    let restaurant = state.moderation().create(payload, id).await?;
    Ok((StatusCode::CREATED, Json(restaurant)))
}

/// upload_photos
///
/// [Authenticated Route] Stores every `photos` part through the storage service
/// and records one Photo row per file, all in one transaction.
#[utoipa::path(
    post,
    path = "/restaurants/{id}/photos",
    params(("id" = i64, Path, description = "Restaurant ID")),
    request_body(content = PhotoUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Photos stored", body = [Photo]),
        (status = 400, description = "No photos or bad form", body = ErrorResponse),
        (status = 404, description = "Unknown restaurant", body = ErrorResponse),
        (status = 413, description = "Photo over the upload limit", body = ErrorResponse)
    )
)]
pub async fn upload_photos(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Vec<Photo>>, ApiError> {
    let mut multipart = multipart?;
    let restaurant_id = parse_id(&raw_id, "restaurant")?;
    if state.repo.get_restaurant(restaurant_id).await?.is_none() {
        return Err(ApiError::NotFound("restaurant not found".to_string()));
    }

    let mut urls = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("photos") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await?;

        let key = photo_object_key(restaurant_id, &file_name);
        let url = state
            .storage
            .store(&key, &content_type, bytes)
            .await
            .map_err(|e| ApiError::internal(format!("error uploading file: {e}")))?;
        urls.push(url);
    }

    if urls.is_empty() {
        return Err(ApiError::Validation(
            "at least one file in the 'photos' field is required".to_string(),
        ));
    }

    let photos = state.repo.add_photos(restaurant_id, urls).await?;
    tracing::info!(restaurant_id, user_id, count = photos.len(), "photos uploaded");
    Ok(Json(photos))
}

/// create_review
///
/// [Authenticated Route] Posts a 1–5 review; the author earns reputation.
#[utoipa::path(
    post,
    path = "/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "Unknown restaurant", body = ErrorResponse)
    )
)]
pub async fn create_review(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreateReviewRequest>,
) -> Result<(StatusCode, Json<Review>), ApiError> {
    let review = state.repo.create_review(payload, id).await?;
    state.ledger().reward(id, Contribution::Review).await;
    tracing::info!(review_id = review.id, restaurant_id = review.restaurant_id, user_id = id, "review added");
    Ok((StatusCode::CREATED, Json(review)))
}

/// get_pending_restaurants
///
/// [Admin Route] Every listing awaiting moderation, unfiltered.
#[utoipa::path(
    get,
    path = "/admin/restaurants/pending",
    responses(
        (status = 200, description = "Pending restaurants", body = [Restaurant]),
        (status = 403, description = "Not an admin", body = ErrorResponse)
    )
)]
pub async fn get_pending_restaurants(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Restaurant>>, ApiError> {
    Ok(Json(state.moderation().list_pending().await?))
}

/// approve_restaurant
///
/// [Admin Route] Sets status to `approved`, whatever it was before.
#[utoipa::path(
    put,
    path = "/admin/restaurants/{id}/approve",
    params(("id" = i64, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Approved", body = ModerationResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown restaurant", body = ErrorResponse)
    )
)]
pub async fn approve_restaurant(
    admin: AdminUser,
    state: State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ModerationResponse>, ApiError> {
    moderate(admin, state, &raw_id, ModerationAction::Approve).await
}

/// reject_restaurant
///
/// [Admin Route] Sets status to `rejected`, whatever it was before.
#[utoipa::path(
    put,
    path = "/admin/restaurants/{id}/reject",
    params(("id" = i64, Path, description = "Restaurant ID")),
    responses(
        (status = 200, description = "Rejected", body = ModerationResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 404, description = "Unknown restaurant", body = ErrorResponse)
    )
)]
pub async fn reject_restaurant(
    admin: AdminUser,
    state: State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ModerationResponse>, ApiError> {
    moderate(admin, state, &raw_id, ModerationAction::Reject).await
}

async fn moderate(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    raw_id: &str,
    action: ModerationAction,
) -> Result<Json<ModerationResponse>, ApiError> {
    let restaurant_id = parse_id(raw_id, "restaurant")?;
    let restaurant = state.moderation().transition(restaurant_id, action).await?;
    tracing::info!(admin_id = admin.id, restaurant_id, ?action, "moderation action applied");
    Ok(Json(ModerationResponse {
        message: action.message().to_string(),
        restaurant,
    }))
}
