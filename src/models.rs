use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

// --- Closed Enumerations (Mapped to Postgres enum types) ---

/// Role
///
/// The two account roles. Stored as the Postgres enum `user_role` and carried
/// inside every bearer token, so an unknown role string can never reach a handler.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// RestaurantStatus
///
/// Moderation state of a listing. Transitions are owned by `crate::moderation`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[sqlx(type_name = "restaurant_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum RestaurantStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RestaurantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RestaurantStatus::Pending => "pending",
            RestaurantStatus::Approved => "approved",
            RestaurantStatus::Rejected => "rejected",
        }
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Account record from the `users` table. Never serialized to clients: the
/// password hash stays inside the process.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    // Only ever changed through `ReputationLedger`.
    pub reputation: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// NewUser
///
/// Insert payload for the `users` table. The hash is produced by
/// `credentials::PasswordHasher`; the role is decided by the caller, never the client.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Restaurant
///
/// A listing from the `restaurants` table. `photos` and `reviews` are not columns;
/// the repository attaches them after the main query.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub category: String,
    pub description: String,
    pub status: RestaurantStatus,
    // FK to users.id (the submitting account).
    pub created_by: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,

    #[sqlx(skip)]
    #[serde(default)]
    pub photos: Vec<Photo>,
    #[sqlx(skip)]
    #[serde(default)]
    pub reviews: Vec<Review>,
}

/// Photo
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Photo {
    pub id: i64,
    pub url: String,
    pub restaurant_id: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Review
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    pub rating: i32,
    pub comment: String,
    pub user_id: i64,
    pub restaurant_id: i64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

// --- Request Payloads (Input Schemas) ---

/// Rejects empty and whitespace-only strings.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("required"));
    }
    Ok(())
}

/// RegisterRequest
///
/// Input payload for POST /register. Has no `role` field: registration always yields `Role::User`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct RegisterRequest {
    #[validate(custom(function = "not_blank"))]
    pub username: String,
    #[validate(custom(function = "not_blank"), email)]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(custom(function = "not_blank"), email)]
    pub email: String,
    #[validate(custom(function = "not_blank"))]
    pub password: String,
}

/// CreateRestaurantRequest
///
/// Input payload for POST /restaurants. Status and creator are never client-settable.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateRestaurantRequest {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(custom(function = "not_blank"))]
    pub address: String,
    #[validate(custom(function = "not_blank"))]
    pub category: String,
    #[validate(custom(function = "not_blank"))]
    pub description: String,
}

/// CreateReviewRequest
///
/// Input payload for POST /reviews. The author comes from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
    #[validate(custom(function = "not_blank"))]
    pub comment: String,
    #[validate(range(min = 1, message = "restaurant_id is required"))]
    pub restaurant_id: i64,
}

/// PhotoUploadForm
///
/// Documents the multipart body of POST /restaurants/{id}/photos. Never constructed;
/// the handler streams the parts directly.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PhotoUploadForm {
    /// One or more image files, each sent as a `photos` part.
    #[schema(value_type = Vec<String>, format = Binary)]
    pub photos: Vec<Vec<u8>>,
}

// --- Response Schemas (Output) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenResponse {
    pub token: String,
}

/// ModerationResponse
///
/// Returned by the approve/reject endpoints: a confirmation plus the listing as stored.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ModerationResponse {
    pub message: String,
    pub restaurant: Restaurant,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct HealthResponse {
    pub status: String,
}

/// ErrorResponse
///
/// The single error shape every failing request returns.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}
