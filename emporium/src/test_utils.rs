//! Shared fixtures for integration tests.

use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    api::models::users::{CurrentUser, Role},
    auth::{password, token},
    config::{Config, EmailTransportConfig},
    db::handlers::{Repository, Users},
    db::models::users::{UserCreateDBRequest, UserDBResponse},
    Application,
};

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn create_test_config() -> Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("emporium-test-emails-{}", std::process::id()));

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        admin_email: "admin@test.com".to_string(),
        admin_password: None,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        ..Default::default()
    };
    config.email.transport = EmailTransportConfig::File {
        path: temp_dir.to_string_lossy().to_string(),
    };
    config
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with(pool, |_| {}).await
}

pub async fn create_test_app_with(pool: PgPool, customize: impl FnOnce(&mut Config)) -> TestServer {
    let mut config = create_test_config();
    customize(&mut config);

    Application::new_with_pool(config, Some(pool))
        .await
        .expect("Failed to create application")
        .into_test_server()
}

/// Create an active user with a known password.
pub async fn create_test_user(pool: &PgPool, role: Role) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);

    let unique = Uuid::new_v4().simple().to_string();
    let username = format!("testuser_{unique}");
    let email = format!("{username}@example.com");

    users_repo
        .create(&UserCreateDBRequest {
            username,
            email,
            first_name: Some("Test".to_string()),
            last_name: Some("User".to_string()),
            role,
            is_active: true,
            password_hash: Some(password::hash_string(TEST_PASSWORD).expect("Failed to hash test password")),
            created_by: None,
        })
        .await
        .expect("Failed to create test user")
}

/// An access token for a user, signed with the test secret.
pub fn access_token_for(user: &UserDBResponse) -> String {
    let config = create_test_config();
    token::issue_pair(&CurrentUser::from(user.clone()), &config)
        .expect("Failed to issue test tokens")
        .access
}

/// A full access/refresh pair for a user.
pub fn token_pair_for(user: &UserDBResponse) -> token::TokenPair {
    let config = create_test_config();
    token::issue_pair(&CurrentUser::from(user.clone()), &config).expect("Failed to issue test tokens")
}

/// Bearer header value for a user.
pub fn bearer(user: &UserDBResponse) -> String {
    format!("Bearer {}", access_token_for(user))
}
