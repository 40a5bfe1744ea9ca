use crate::{
    auth::TokenService,
    error::ApiError,
    models::{LoginRequest, NewUser, RegisterRequest, Role, User},
    repository::RepositoryState,
};

/// bcrypt work factor used for every stored password, admin accounts included.
pub const DEFAULT_BCRYPT_COST: u32 = 14;

// Range accepted by the bcrypt crate.
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// PasswordHasher
///
/// Salted bcrypt hashing. The work runs on the blocking pool so a cost-14 hash
/// does not stall the async workers.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> Result<String, ApiError> {
        let password = password.to_owned();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }

    /// Spends one hash at this cost and discards it, so a login for an unknown
    /// email takes as long as a wrong password.
    pub async fn burn(&self, password: &str) {
        if let Err(e) = self.hash(password).await {
            tracing::warn!(error = %e, "decoy hash failed");
        }
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool, ApiError> {
        let password = password.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(ApiError::internal)?
            .map_err(ApiError::internal)
    }
}

/// CredentialService
///
/// Registration, admin bootstrap and login on top of the credential store.
#[derive(Clone)]
pub struct CredentialService {
    repo: RepositoryState,
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl CredentialService {
    pub fn new(repo: RepositoryState, hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self {
            repo,
            hasher,
            tokens,
        }
    }

    /// Register
    ///
    /// Always creates a `user`. Duplicate username or email → 409 via the
    /// store's unique constraints.
    pub async fn register(&self, req: RegisterRequest) -> Result<User, ApiError> {
        let user = self
            .create_account(&req.username, &req.email, &req.password, Role::User)
            .await?;
        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Creates an admin account. Only reachable from the `create_admin` binary.
    pub async fn create_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, ApiError> {
        let user = self
            .create_account(username, email, password, Role::Admin)
            .await?;
        tracing::info!(user_id = user.id, username = %user.username, "admin account created");
        Ok(user)
    }

    async fn create_account(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<User, ApiError> {
        let password_hash = self.hasher.hash(password).await?;
        let new_user = NewUser {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password_hash,
            role,
        };
        self.repo.create_user(new_user).await.map_err(|e| {
            tracing::warn!(error = %e, "error creating user");
            ApiError::from(e)
        })
    }

    /// Login
    ///
    /// Unknown email and wrong password yield the same 401 "invalid credentials"
    /// after the same bcrypt work; only the server log tells them apart.
    pub async fn login(&self, req: LoginRequest) -> Result<String, ApiError> {
        let email = req.email.trim();
        let Some(user) = self.repo.find_user_by_email(email).await? else {
            tracing::warn!(email, "login for unknown email");
            self.hasher.burn(&req.password).await;
            return Err(ApiError::invalid_credentials());
        };

        if !self.hasher.verify(&req.password, &user.password_hash).await? {
            tracing::warn!(email, "invalid password");
            return Err(ApiError::invalid_credentials());
        }

        let token = self.tokens.issue(&user).map_err(ApiError::internal)?;
        tracing::info!(user_id = user.id, "user logged in");
        Ok(token)
    }
}
