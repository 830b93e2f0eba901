use crate::domain::models::UserRole;
use anyhow::Result;
use argon2::{
    password_hash::{PasswordHasher, SaltString},
    Argon2,
};
use rand_core::OsRng;
use sqlx::PgPool;

/// Create the bootstrap admin when the users table is empty. Registration is
/// admin-only, so a fresh database would otherwise be unreachable.
pub async fn seed_admin(pool: &PgPool) -> Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let username = std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
    let password = std::env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string());

    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("failed to hash seed password: {e}"))?
        .to_string();

    sqlx::query(
        r#"
        INSERT INTO users (first_name, last_name, username, role, reference_no, hash)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind("System")
    .bind("Administrator")
    .bind(&username)
    .bind(UserRole::Admin)
    .bind("ADM-00001")
    .bind(&hash)
    .execute(pool)
    .await?;

    tracing::info!("Seeded bootstrap admin account '{}'", username);
    Ok(())
}
