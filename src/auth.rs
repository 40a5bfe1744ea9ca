use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    models::{Role, User},
};

/// Lifetime of every issued token.
pub const TOKEN_TTL_HOURS: i64 = 72;

/// Claims
///
/// The payload carried inside each bearer token: `{user_id, role, exp}`.
/// Verification is stateless; nothing here is looked up in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Primary key of the account the token was issued to.
    pub user_id: i64,
    /// Role at issuance time. A later role change only takes effect on the next login.
    pub role: Role,
    /// Expiration (unix seconds).
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MissingSecret,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// TokenService
///
/// Issues and verifies HS256 tokens with a single shared secret. Rotating the
/// secret invalidates every outstanding token; there is no revocation list.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    /// Builds the service from the configured secret. An empty secret is a
    /// misconfiguration and is refused.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is mandatory and checked without grace period.
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        })
    }

    /// Mints a token for `user` expiring `TOKEN_TTL_HOURS` from now.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_with_expiry(user.id, user.role, Utc::now() + self.ttl)
    }

    pub fn issue_with_expiry(
        &self,
        user_id: i64,
        role: Role,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            user_id,
            role,
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Checks signature, shape and expiry, returning the embedded claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::InvalidToken)
    }
}

/// AuthUser
///
/// The resolved identity of an authenticated request, taken straight from the
/// verified claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            id: claims.user_id,
            role: claims.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Identity resolution layer of the access guard:
/// 1. Reuses an identity already placed in the request extensions by the middleware.
/// 2. Missing `Authorization` header → 401 "authorization required".
/// 3. Not `Bearer <token>`, bad signature, malformed or expired → 401 "invalid credentials".
/// 4. Success → the identity is stored in the extensions for downstream extractors.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(ApiError::authorization_required)?;

        let token = header_value
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                tracing::warn!("authorization header is not a bearer token");
                ApiError::invalid_credentials()
            })?;

        let tokens = TokenService::from_ref(state);
        let claims = tokens.verify(token).map_err(|e| {
            tracing::warn!(error = %e, "bearer token rejected");
            ApiError::invalid_credentials()
        })?;

        let user = AuthUser::from(claims);
        parts.extensions.insert(user);
        Ok(user)
    }
}

/// AdminUser
///
/// Admin gate of the access guard: resolves `AuthUser` first, then fails with
/// 403 unless the role is `admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub AuthUser);

/// Role check on an already-resolved identity.
pub fn require_admin(user: AuthUser) -> Result<AdminUser, ApiError> {
    if !user.is_admin() {
        tracing::warn!(user_id = user.id, role = user.role.as_str(), "admin route denied");
        return Err(ApiError::Forbidden);
    }
    Ok(AdminUser(user))
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    TokenService: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        require_admin(user)
    }
}
