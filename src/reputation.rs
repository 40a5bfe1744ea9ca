use crate::repository::{RepoResult, RepositoryState};

/// Contribution
///
/// Actions that earn reputation, with their fixed point values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contribution {
    RestaurantListing,
    Review,
}

impl Contribution {
    pub fn points(self) -> i64 {
        match self {
            Contribution::RestaurantListing => 10,
            Contribution::Review => 5,
        }
    }
}

/// ReputationLedger
///
/// Monotonic per-user counter. Increments are a single atomic statement in the
/// store; rewards run after the contributing write has committed and never fail it.
#[derive(Clone)]
pub struct ReputationLedger {
    repo: RepositoryState,
}

impl ReputationLedger {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// Raw increment. Returns false when the user does not exist.
    pub async fn increment(&self, user_id: i64, amount: i64) -> RepoResult<bool> {
        self.repo.increment_reputation(user_id, amount).await
    }

    /// Fire-and-forget reward: failures are logged and swallowed.
    pub async fn reward(&self, user_id: i64, contribution: Contribution) {
        let amount = contribution.points();
        match self.increment(user_id, amount).await {
            Ok(true) => {
                tracing::debug!(user_id, amount, ?contribution, "reputation incremented");
            }
            Ok(false) => {
                tracing::warn!(user_id, amount, ?contribution, "reputation increment matched no user");
            }
            Err(e) => {
                tracing::error!(user_id, amount, ?contribution, error = %e, "error updating user reputation");
            }
        }
    }
}
