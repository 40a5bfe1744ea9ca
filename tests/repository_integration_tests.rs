//! Postgres-backed repository tests. Ignored by default; run with
//! `DATABASE_URL=... cargo test -- --ignored`.

use restaurant_reviews::{
    models::{CreateRestaurantRequest, CreateReviewRequest, NewUser, RestaurantStatus, Role, User},
    moderation::RestaurantFilter,
    repository::{PostgresRepository, RepoError, Repository},
};
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Unique per run so tests can share one database.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

async fn create_test_user(repo: &PostgresRepository) -> User {
    let name = unique("user");
    repo.create_user(NewUser {
        username: name.clone(),
        email: format!("{name}@test.com"),
        password_hash: "$2b$04$not-a-real-hash".to_string(),
        role: Role::User,
    })
    .await
    .expect("Failed to create test user")
}

fn restaurant_request(name: &str, category: &str) -> CreateRestaurantRequest {
    CreateRestaurantRequest {
        name: name.to_string(),
        address: "1 Test Way".to_string(),
        category: category.to_string(),
        description: "integration".to_string(),
    }
}

// --- Tests ---

#[test]
#[ignore]
async fn test_unique_constraints_surface_as_unique_violation() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;

    let err = repo
        .create_user(NewUser {
            username: unique("other"),
            email: user.email.clone(),
            password_hash: "x".to_string(),
            role: Role::User,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::UniqueViolation(c) if c == "users_email_key"));

    let found = repo.find_user_by_email(&user.email).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.reputation, 0);
}

#[test]
#[ignore]
async fn test_reputation_increment_is_atomic_add() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let repo = ctx.repository();
        let id = user.id;
        handles.push(tokio::spawn(async move {
            repo.increment_reputation(id, 5).await.unwrap()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    let reloaded = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(reloaded.reputation, 50);
    assert!(!repo.increment_reputation(-1, 5).await.unwrap());
}

#[test]
#[ignore]
async fn test_restaurant_lifecycle_and_public_listing() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let marker = unique("Bistro");

    let restaurant = repo
        .create_restaurant(restaurant_request(&marker, "French"), user.id, RestaurantStatus::Pending)
        .await
        .unwrap();
    assert_eq!(restaurant.status, RestaurantStatus::Pending);

    let filter = RestaurantFilter {
        name: Some(marker.to_lowercase()),
        ..Default::default()
    };
    assert!(repo.list_approved_restaurants(&filter).await.unwrap().is_empty());
    assert!(
        repo.list_pending_restaurants()
            .await
            .unwrap()
            .iter()
            .any(|r| r.id == restaurant.id)
    );

    let approved = repo
        .set_restaurant_status(restaurant.id, RestaurantStatus::Approved)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.status, RestaurantStatus::Approved);

    let listing = repo.list_approved_restaurants(&filter).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].id, restaurant.id);

    assert!(
        repo.set_restaurant_status(i64::MAX, RestaurantStatus::Approved)
            .await
            .unwrap()
            .is_none()
    );
}

#[test]
#[ignore]
async fn test_listing_embeds_photos_and_reviews() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let marker = unique("Trattoria");

    let restaurant = repo
        .create_restaurant(restaurant_request(&marker, "Italian"), user.id, RestaurantStatus::Approved)
        .await
        .unwrap();
    let photos = repo
        .add_photos(
            restaurant.id,
            vec!["/uploads/a.jpg".to_string(), "/uploads/b.jpg".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(photos.len(), 2);

    repo.create_review(
        CreateReviewRequest {
            rating: 4,
            comment: "Great pasta".to_string(),
            restaurant_id: restaurant.id,
        },
        user.id,
    )
    .await
    .unwrap();

    let filter = RestaurantFilter {
        name: Some(marker.clone()),
        ..Default::default()
    };
    let listing = repo.list_approved_restaurants(&filter).await.unwrap();
    assert_eq!(listing[0].photos.len(), 2);
    assert_eq!(listing[0].reviews.len(), 1);
    assert_eq!(listing[0].reviews[0].rating, 4);
}

#[test]
#[ignore]
async fn test_review_for_missing_restaurant_is_foreign_key_violation() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;

    let err = repo
        .create_review(
            CreateReviewRequest {
                rating: 3,
                comment: "ghost".to_string(),
                restaurant_id: i64::MAX,
            },
            user.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::ForeignKeyViolation(c) if c.contains("restaurant_id")));
}

#[test]
#[ignore]
async fn test_search_treats_wildcards_literally() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo).await;
    let marker = unique("Wild");

    repo.create_restaurant(
        restaurant_request(&format!("{marker} 100% Vegan"), "Vegan"),
        user.id,
        RestaurantStatus::Approved,
    )
    .await
    .unwrap();
    repo.create_restaurant(
        restaurant_request(&format!("{marker} 100 Burgers"), "Burgers"),
        user.id,
        RestaurantStatus::Approved,
    )
    .await
    .unwrap();

    let filter = RestaurantFilter {
        name: Some(format!("{marker} 100%")),
        ..Default::default()
    };
    let listing = repo.list_approved_restaurants(&filter).await.unwrap();
    assert_eq!(listing.len(), 1);
    assert!(listing[0].name.ends_with("100% Vegan"));
}
