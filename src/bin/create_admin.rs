use restaurant_reviews::{
    auth::TokenService,
    config::AppConfig,
    credentials::{CredentialService, PasswordHasher},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// create_admin
///
/// Interactive bootstrap for admin accounts. Admins cannot be created over HTTP;
/// this binary talks to the database directly with the same hashing as `/register`.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "restaurant_reviews=info".into()),
        )
        .init();

    let config = AppConfig::load();

    let username = prompt("Admin username: ");
    let email = prompt("Admin email: ");
    let password = prompt("Admin password: ");
    if username.is_empty() || email.is_empty() || password.is_empty() {
        eprintln!("username, email and password are all required");
        std::process::exit(1);
    }

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;
    let tokens = TokenService::new(&config.jwt_secret)
        .expect("FATAL: JWT_SECRET is empty.");
    let credentials = CredentialService::new(repo, PasswordHasher::new(config.bcrypt_cost), tokens);

    match credentials.create_admin(&username, &email, &password).await {
        Ok(user) => println!("Admin '{}' created with id {}", user.username, user.id),
        Err(e) => {
            eprintln!("Error creating admin: {e}");
            std::process::exit(1);
        }
    }
}

fn prompt(label: &str) -> String {
    print!("{label}");
    io::stdout().flush().ok();
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok();
    line.trim().to_string()
}
