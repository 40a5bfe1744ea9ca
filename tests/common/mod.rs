#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use restaurant_reviews::{
    AppConfig, AppState, MockStorageService, create_router,
    models::{
        CreateRestaurantRequest, CreateReviewRequest, NewUser, Photo, Restaurant,
        RestaurantStatus, Review, Role, User,
    },
    moderation::RestaurantFilter,
    repository::{RepoError, RepoResult, Repository, RepositoryState},
    storage::StorageState,
};
use serde_json::Value;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use tower::ServiceExt;

// --- In-Memory Repository ---

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    restaurants: Vec<Restaurant>,
    photos: Vec<Photo>,
    reviews: Vec<Review>,
}

/// InMemoryRepository
///
/// `Repository` backed by plain vectors. Mirrors the Postgres constraints the
/// application relies on: unique username/email and the restaurant/user foreign keys.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    /// When set, every reputation increment fails like a lost database connection.
    pub fail_reputation: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reputation_of(&self, user_id: i64) -> i64 {
        let tables = self.tables.lock().unwrap();
        tables
            .users
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.reputation)
            .unwrap_or_default()
    }

    pub fn status_of(&self, restaurant_id: i64) -> Option<RestaurantStatus> {
        let tables = self.tables.lock().unwrap();
        tables
            .restaurants
            .iter()
            .find(|r| r.id == restaurant_id)
            .map(|r| r.status)
    }

    pub fn user_by_username(&self, username: &str) -> Option<User> {
        let tables = self.tables.lock().unwrap();
        tables.users.iter().find(|u| u.username == username).cloned()
    }

    pub fn photo_count(&self, restaurant_id: i64) -> usize {
        let tables = self.tables.lock().unwrap();
        tables
            .photos
            .iter()
            .filter(|p| p.restaurant_id == restaurant_id)
            .count()
    }

    /// Inserts a restaurant directly, bypassing moderation.
    pub fn seed_restaurant(&self, name: &str, category: &str, status: RestaurantStatus) -> i64 {
        let mut tables = self.tables.lock().unwrap();
        let id = tables.restaurants.len() as i64 + 1;
        let now = Utc::now();
        tables.restaurants.push(Restaurant {
            id,
            name: name.to_string(),
            address: "1 Main St".to_string(),
            category: category.to_string(),
            description: "seeded".to_string(),
            status,
            created_by: 1,
            created_at: now,
            updated_at: now,
            ..Default::default()
        });
        id
    }

    fn with_children(tables: &Tables, mut restaurant: Restaurant) -> Restaurant {
        restaurant.photos = tables
            .photos
            .iter()
            .filter(|p| p.restaurant_id == restaurant.id)
            .cloned()
            .collect();
        restaurant.reviews = tables
            .reviews
            .iter()
            .filter(|r| r.restaurant_id == restaurant.id)
            .cloned()
            .collect();
        restaurant
    }
}

fn contains_ci(haystack: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> RepoResult<User> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::UniqueViolation("users_username_key".to_string()));
        }
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::UniqueViolation("users_email_key".to_string()));
        }
        let now = Utc::now();
        let created = User {
            id: tables.users.len() as i64 + 1,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            reputation: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_user(&self, id: i64) -> RepoResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn increment_reputation(&self, user_id: i64, amount: i64) -> RepoResult<bool> {
        if self.fail_reputation.load(Ordering::SeqCst) {
            return Err(RepoError::Database(sqlx::Error::PoolTimedOut));
        }
        let mut tables = self.tables.lock().unwrap();
        match tables.users.iter_mut().find(|u| u.id == user_id) {
            Some(user) => {
                user.reputation += amount;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_restaurant(
        &self,
        req: CreateRestaurantRequest,
        created_by: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Restaurant> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.iter().any(|u| u.id == created_by) {
            return Err(RepoError::ForeignKeyViolation(
                "restaurants_created_by_fkey".to_string(),
            ));
        }
        let now = Utc::now();
        let restaurant = Restaurant {
            id: tables.restaurants.len() as i64 + 1,
            name: req.name.trim().to_string(),
            address: req.address.trim().to_string(),
            category: req.category.trim().to_string(),
            description: req.description.trim().to_string(),
            status,
            created_by,
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        tables.restaurants.push(restaurant.clone());
        Ok(restaurant)
    }

    async fn get_restaurant(&self, id: i64) -> RepoResult<Option<Restaurant>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .restaurants
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .map(|r| Self::with_children(&tables, r)))
    }

    async fn list_approved_restaurants(
        &self,
        filter: &RestaurantFilter,
    ) -> RepoResult<Vec<Restaurant>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .restaurants
            .iter()
            .filter(|r| r.status == RestaurantStatus::Approved)
            .filter(|r| contains_ci(&r.name, &filter.name))
            .filter(|r| contains_ci(&r.category, &filter.category))
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .cloned()
            .map(|r| Self::with_children(&tables, r))
            .collect())
    }

    async fn list_pending_restaurants(&self) -> RepoResult<Vec<Restaurant>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .restaurants
            .iter()
            .filter(|r| r.status == RestaurantStatus::Pending)
            .cloned()
            .map(|r| Self::with_children(&tables, r))
            .collect())
    }

    async fn set_restaurant_status(
        &self,
        id: i64,
        status: RestaurantStatus,
    ) -> RepoResult<Option<Restaurant>> {
        let mut tables = self.tables.lock().unwrap();
        let Some(restaurant) = tables.restaurants.iter_mut().find(|r| r.id == id) else {
            return Ok(None);
        };
        restaurant.status = status;
        restaurant.updated_at = Utc::now();
        let updated = restaurant.clone();
        Ok(Some(Self::with_children(&tables, updated)))
    }

    async fn add_photos(&self, restaurant_id: i64, urls: Vec<String>) -> RepoResult<Vec<Photo>> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.restaurants.iter().any(|r| r.id == restaurant_id) {
            return Err(RepoError::ForeignKeyViolation(
                "photos_restaurant_id_fkey".to_string(),
            ));
        }
        let now = Utc::now();
        let mut photos = Vec::with_capacity(urls.len());
        for url in urls {
            let photo = Photo {
                id: tables.photos.len() as i64 + 1,
                url,
                restaurant_id,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            tables.photos.push(photo.clone());
            photos.push(photo);
        }
        Ok(photos)
    }

    async fn create_review(&self, req: CreateReviewRequest, user_id: i64) -> RepoResult<Review> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.restaurants.iter().any(|r| r.id == req.restaurant_id) {
            return Err(RepoError::ForeignKeyViolation(
                "reviews_restaurant_id_fkey".to_string(),
            ));
        }
        let now = Utc::now();
        let review = Review {
            id: tables.reviews.len() as i64 + 1,
            rating: req.rating,
            comment: req.comment.trim().to_string(),
            user_id,
            restaurant_id: req.restaurant_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        tables.reviews.push(review.clone());
        Ok(review)
    }
}

// --- State & Router Helpers ---

pub struct TestContext {
    pub repo: Arc<InMemoryRepository>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_storage(Arc::new(MockStorageService::new()))
    }

    pub fn with_storage(storage: StorageState) -> Self {
        Self::with_config(storage, AppConfig::default())
    }

    pub fn with_config(storage: StorageState, config: AppConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let state = AppState::new(repo.clone() as RepositoryState, storage, config)
        .expect("test config has a signing secret");
        Self { repo, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Creates an account with the given role directly and returns a token for it.
    pub async fn account(&self, username: &str, role: Role) -> (User, String) {
        let credentials = self.state.credentials();
        let email = format!("{username}@example.com");
        let user = match role {
            Role::Admin => credentials
                .create_admin(username, &email, "password123")
                .await
                .unwrap(),
            Role::User => credentials
                .register(restaurant_reviews::models::RegisterRequest {
                    username: username.to_string(),
                    email,
                    password: "password123".to_string(),
                })
                .await
                .unwrap(),
        };
        let token = self.state.tokens.issue(&user).unwrap();
        (user, token)
    }
}

/// Sends one request through the router and returns the status and parsed JSON body
/// (`Value::Null` for an empty or non-JSON body).
pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response: Response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}
