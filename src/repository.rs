use crate::models::{
    CreateRestaurantRequest, CreateReviewRequest, NewUser, Photo, Restaurant, RestaurantStatus,
    Review, User,
};
use crate::moderation::RestaurantFilter;
use async_trait::async_trait;
use sqlx::{PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;

/// RepoError
///
/// Store failures, with the two constraint classes the handlers care about
/// split out from the generic database error.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique constraint rejected the write. Carries the constraint name.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// A referenced row does not exist. Carries the constraint name.
    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            if db_err.is_unique_violation() {
                return RepoError::UniqueViolation(constraint);
            }
            if db_err.is_foreign_key_violation() {
                return RepoError::ForeignKeyViolation(constraint);
            }
        }
        RepoError::Database(err)
    }
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository Trait
///
/// The explicit store handle injected into every component. Handlers and
/// services only see this contract, so tests can swap in an in-memory store.
///
/// **Send + Sync + async_trait** are required to make the trait object (`Arc<dyn Repository>`)
/// shareable across Axum's task boundaries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Credential Store ---
    async fn create_user(&self, user: NewUser) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn get_user(&self, id: i64) -> RepoResult<Option<User>>;

    // --- Reputation Ledger ---
    /// Atomic `reputation = reputation + amount`. Returns false when no row matched.
    async fn increment_reputation(&self, user_id: i64, amount: i64) -> RepoResult<bool>;

    // --- Restaurants ---
    async fn create_restaurant(
        &self,
        req: CreateRestaurantRequest,
        created_by: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Restaurant>;
    async fn get_restaurant(&self, id: i64) -> RepoResult<Option<Restaurant>>;
    /// Public listing. Must only ever return `approved` rows.
    async fn list_approved_restaurants(&self, filter: &RestaurantFilter)
    -> RepoResult<Vec<Restaurant>>;
    async fn list_pending_restaurants(&self) -> RepoResult<Vec<Restaurant>>;
    /// Single-statement status write. `None` when the id is unknown.
    async fn set_restaurant_status(
        &self,
        id: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Option<Restaurant>>;

    // --- Photos & Reviews ---
    async fn add_photos(&self, restaurant_id: i64, urls: Vec<String>) -> RepoResult<Vec<Photo>>;
    async fn create_review(&self, req: CreateReviewRequest, user_id: i64) -> RepoResult<Review>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// Escapes `%`, `_` and `\` so user input matches literally inside ILIKE.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, reputation, created_at, updated_at, deleted_at";
const RESTAURANT_COLUMNS: &str = "id, name, address, category, description, status, created_by, created_at, updated_at, deleted_at";
const PHOTO_COLUMNS: &str = "id, url, restaurant_id, created_at, updated_at, deleted_at";
const REVIEW_COLUMNS: &str =
    "id, rating, comment, user_id, restaurant_id, created_at, updated_at, deleted_at";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
/// Every read filters soft-deleted rows (`deleted_at IS NULL`).
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads photos and reviews for a batch of restaurants with one query each.
    async fn attach_children(&self, restaurants: &mut [Restaurant]) -> RepoResult<()> {
        if restaurants.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = restaurants.iter().map(|r| r.id).collect();

        let photos = sqlx::query_as::<_, Photo>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE restaurant_id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let reviews = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE restaurant_id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut photos_by_restaurant: HashMap<i64, Vec<Photo>> = HashMap::new();
        for photo in photos {
            photos_by_restaurant
                .entry(photo.restaurant_id)
                .or_default()
                .push(photo);
        }
        let mut reviews_by_restaurant: HashMap<i64, Vec<Review>> = HashMap::new();
        for review in reviews {
            reviews_by_restaurant
                .entry(review.restaurant_id)
                .or_default()
                .push(review);
        }

        for restaurant in restaurants.iter_mut() {
            restaurant.photos = photos_by_restaurant.remove(&restaurant.id).unwrap_or_default();
            restaurant.reviews = reviews_by_restaurant.remove(&restaurant.id).unwrap_or_default();
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// create_user
    ///
    /// Relies on the `users_username_key` / `users_email_key` constraints for
    /// duplicate detection, so concurrent registrations cannot both succeed.
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let created = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// increment_reputation
    ///
    /// Delegates the add to Postgres in one statement; no read-modify-write here.
    async fn increment_reputation(&self, user_id: i64, amount: i64) -> RepoResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET reputation = reputation + $1, updated_at = NOW() WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(amount)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_restaurant(
        &self,
        req: CreateRestaurantRequest,
        created_by: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Restaurant> {
        let restaurant = sqlx::query_as::<_, Restaurant>(&format!(
            "INSERT INTO restaurants (name, address, category, description, status, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RESTAURANT_COLUMNS}"
        ))
        .bind(req.name.trim())
        .bind(req.address.trim())
        .bind(req.category.trim())
        .bind(req.description.trim())
        .bind(status)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(restaurant)
    }

    async fn get_restaurant(&self, id: i64) -> RepoResult<Option<Restaurant>> {
        let restaurant = sqlx::query_as::<_, Restaurant>(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(restaurant)
    }

    /// list_approved_restaurants
    ///
    /// QueryBuilder keeps every user-supplied value parameterized.
    /// **Security**: `status = 'approved'` is part of the base query, not an optional filter.
    async fn list_approved_restaurants(
        &self,
        filter: &RestaurantFilter,
    ) -> RepoResult<Vec<Restaurant>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE deleted_at IS NULL AND status = "
        ));
        builder.push_bind(RestaurantStatus::Approved);

        if let Some(name) = &filter.name {
            builder.push(" AND name ILIKE ");
            builder.push_bind(like_pattern(name));
        }
        if let Some(category) = &filter.category {
            builder.push(" AND category ILIKE ");
            builder.push_bind(like_pattern(category));
        }

        // Insertion order; pagination is stable across requests.
        builder.push(" ORDER BY id ASC LIMIT ");
        builder.push_bind(filter.limit);
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset());

        let mut restaurants = builder
            .build_query_as::<Restaurant>()
            .fetch_all(&self.pool)
            .await?;
        self.attach_children(&mut restaurants).await?;
        Ok(restaurants)
    }

    async fn list_pending_restaurants(&self) -> RepoResult<Vec<Restaurant>> {
        let mut restaurants = sqlx::query_as::<_, Restaurant>(&format!(
            "SELECT {RESTAURANT_COLUMNS} FROM restaurants WHERE deleted_at IS NULL AND status = $1 ORDER BY id ASC"
        ))
        .bind(RestaurantStatus::Pending)
        .fetch_all(&self.pool)
        .await?;
        self.attach_children(&mut restaurants).await?;
        Ok(restaurants)
    }

    /// set_restaurant_status
    ///
    /// Unconditional write: the current status is not consulted.
    async fn set_restaurant_status(
        &self,
        id: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Option<Restaurant>> {
        let restaurant = sqlx::query_as::<_, Restaurant>(&format!(
            "UPDATE restaurants SET status = $1, updated_at = NOW() WHERE id = $2 AND deleted_at IS NULL RETURNING {RESTAURANT_COLUMNS}"
        ))
        .bind(status)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match restaurant {
            Some(mut restaurant) => {
                self.attach_children(std::slice::from_mut(&mut restaurant)).await?;
                Ok(Some(restaurant))
            }
            None => Ok(None),
        }
    }

    /// add_photos
    ///
    /// All rows of one upload commit together.
    async fn add_photos(&self, restaurant_id: i64, urls: Vec<String>) -> RepoResult<Vec<Photo>> {
        let mut tx = self.pool.begin().await?;
        let mut photos = Vec::with_capacity(urls.len());
        for url in urls {
            let photo = sqlx::query_as::<_, Photo>(&format!(
                "INSERT INTO photos (url, restaurant_id) VALUES ($1, $2) RETURNING {PHOTO_COLUMNS}"
            ))
            .bind(url)
            .bind(restaurant_id)
            .fetch_one(&mut *tx)
            .await?;
            photos.push(photo);
        }
        tx.commit().await?;
        Ok(photos)
    }

    async fn create_review(&self, req: CreateReviewRequest, user_id: i64) -> RepoResult<Review> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "INSERT INTO reviews (rating, comment, user_id, restaurant_id) VALUES ($1, $2, $3, $4) RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(req.rating)
        .bind(req.comment.trim())
        .bind(user_id)
        .bind(req.restaurant_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(review)
    }
}
