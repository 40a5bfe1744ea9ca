//! Restaurant lifecycle.
//!
//! `pending` is the only initial state. `approved` and `rejected` are reached
//! exclusively through an admin action, and nothing ever moves a listing back to
//! `pending`. The admin actions overwrite the status regardless of its current
//! value, so an approved listing can still be rejected and vice versa.

use crate::{
    error::ApiError,
    models::{CreateRestaurantRequest, Restaurant, RestaurantStatus},
    repository::RepositoryState,
    reputation::{Contribution, ReputationLedger},
};

impl RestaurantStatus {
    /// State assigned to every new listing.
    pub fn initial() -> Self {
        RestaurantStatus::Pending
    }

    /// Only approved listings appear on the public read path.
    pub fn is_publicly_visible(self) -> bool {
        self == RestaurantStatus::Approved
    }
}

/// ModerationAction
///
/// The two admin transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Approve,
    Reject,
}

impl ModerationAction {
    pub fn target(self) -> RestaurantStatus {
        match self {
            ModerationAction::Approve => RestaurantStatus::Approved,
            ModerationAction::Reject => RestaurantStatus::Rejected,
        }
    }

    /// Confirmation message returned to the admin client.
    pub fn message(self) -> &'static str {
        match self {
            ModerationAction::Approve => "Restaurant approved",
            ModerationAction::Reject => "Restaurant rejected",
        }
    }
}

/// RestaurantFilter
///
/// Normalized public listing query. Built from raw query-string values so that
/// anything unparsable or below 1 falls back to the defaults instead of failing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl Default for RestaurantFilter {
    fn default() -> Self {
        Self {
            name: None,
            category: None,
            page: Self::DEFAULT_PAGE,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl RestaurantFilter {
    pub const DEFAULT_PAGE: i64 = 1;
    pub const DEFAULT_LIMIT: i64 = 10;

    pub fn from_query(
        page: Option<&str>,
        limit: Option<&str>,
        name: Option<&str>,
        category: Option<&str>,
    ) -> Self {
        Self {
            name: non_empty(name),
            category: non_empty(category),
            page: positive_or(page, Self::DEFAULT_PAGE),
            limit: positive_or(limit, Self::DEFAULT_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

fn positive_or(raw: Option<&str>, default: i64) -> i64 {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|value| *value >= 1)
        .unwrap_or(default)
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// ModerationService
///
/// Owns every status change a restaurant can go through. Route-level guards
/// decide *who* may call each method; this type decides *what* happens.
#[derive(Clone)]
pub struct ModerationService {
    repo: RepositoryState,
    ledger: ReputationLedger,
}

impl ModerationService {
    pub fn new(repo: RepositoryState) -> Self {
        let ledger = ReputationLedger::new(repo.clone());
        Self { repo, ledger }
    }

    /// Create: always `pending`, then rewards the creator.
    pub async fn create(
        &self,
        req: CreateRestaurantRequest,
        creator_id: i64,
    ) -> Result<Restaurant, ApiError> {
        let restaurant = self
            .repo
            .create_restaurant(req, creator_id, RestaurantStatus::initial())
            .await?;

        self.ledger
            .reward(creator_id, Contribution::RestaurantListing)
            .await;

        tracing::info!(
            restaurant_id = restaurant.id,
            creator_id,
            name = %restaurant.name,
            "restaurant submitted for moderation"
        );
        Ok(restaurant)
    }

    /// Approve / Reject. Unknown ids surface as 404.
    pub async fn transition(
        &self,
        restaurant_id: i64,
        action: ModerationAction,
    ) -> Result<Restaurant, ApiError> {
        let target = action.target();
        let restaurant = self
            .repo
            .set_restaurant_status(restaurant_id, target)
            .await?
            .ok_or_else(|| ApiError::NotFound("restaurant not found".to_string()))?;

        tracing::info!(restaurant_id, status = target.as_str(), "restaurant moderated");
        Ok(restaurant)
    }

    pub async fn list_public(&self, filter: &RestaurantFilter) -> Result<Vec<Restaurant>, ApiError> {
        let restaurants = self.repo.list_approved_restaurants(filter).await?;
        // Approved-only, whatever the store hands back.
        Ok(restaurants
            .into_iter()
            .filter(|r| r.status.is_publicly_visible())
            .collect())
    }

    pub async fn list_pending(&self) -> Result<Vec<Restaurant>, ApiError> {
        let restaurants = self.repo.list_pending_restaurants().await?;
        Ok(restaurants
            .into_iter()
            .filter(|r| r.status == RestaurantStatus::Pending)
            .collect())
    }
}
