use crate::db;
use crate::domain::models::UserRole;
use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::{self, AdminSession};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub user_role: UserRole,
    pub section: Option<Uuid>,
    pub reference_no: String,
    pub password: String,
    pub profile_image: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_name: String,
    pub password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub user_role: UserRole,
    pub section: Option<Uuid>,
    pub reference_no: String,
    pub profile_image: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: UserView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub user_id: Uuid,
    pub current_password: String,
    pub new_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub user_role: Option<UserRole>,
    pub section: Option<Uuid>,
    pub reference_no: Option<String>,
    pub password: Option<String>,
    pub profile_image: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/change-password", post(change_password))
        .route("/users", get(list_users))
        .route("/users/:id", put(update_user).delete(delete_user))
        .with_state(state)
}

fn user_view(user: db::DbUser) -> UserView {
    UserView {
        id: user.id,
        first_name: user.first_name,
        last_name: user.last_name,
        user_name: user.username,
        user_role: user.role,
        section: user.section_id,
        reference_no: user.reference_no,
        profile_image: user.profile_image,
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))?
        .to_string())
}

fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

async fn register(
    AdminSession(_claims): AdminSession,
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if db::find_user_by_username(&state.pool, &payload.user_name)
        .await?
        .is_some()
    {
        return Err(ApiError::Validation("User Name is already taken".into()));
    }

    let reference_taken: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE reference_no = $1)")
            .bind(&payload.reference_no)
            .fetch_one(&state.pool)
            .await?;
    if reference_taken {
        return Err(ApiError::Validation("Reference number already exists".into()));
    }

    let hash = hash_password(&payload.password)?;

    sqlx::query(
        r#"
        INSERT INTO users
            (first_name, last_name, username, role, section_id, reference_no, hash, profile_image)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.user_name)
    .bind(payload.user_role)
    .bind(payload.section)
    .bind(&payload.reference_no)
    .bind(&hash)
    .bind(&payload.profile_image)
    .execute(&state.pool)
    .await?;

    Ok(Json(MessageResponse {
        message: "User registered successfully",
    }))
}

async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    // Unknown user and wrong password must be indistinguishable.
    let user = db::find_user_by_username(&state.pool, &payload.user_name)
        .await?
        .ok_or_else(|| ApiError::Validation("Invalid user name or password".into()))?;

    if !verify_password(&payload.password, &user.hash) {
        return Err(ApiError::Validation("Invalid user name or password".into()));
    }

    let token = session::sign_session(user.id, user.role, &state.session_key)
        .map_err(|e| ApiError::Internal(format!("failed to sign session: {e}")))?;

    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        message: "Login successful",
        token,
        user: user_view(user),
    }))
}

async fn change_password(
    State(state): State<SharedState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user = db::find_user_by_id(&state.pool, payload.user_id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    if !verify_password(&payload.current_password, &user.hash) {
        return Err(ApiError::Validation("Current password is incorrect".into()));
    }

    let hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET hash = $1 WHERE id = $2")
        .bind(&hash)
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

async fn list_users(
    AdminSession(_claims): AdminSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = sqlx::query_as::<_, db::DbUser>(
        r#"
        SELECT
            id,
            first_name,
            last_name,
            username,
            role,
            section_id,
            reference_no,
            hash,
            profile_image
        FROM users
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users.into_iter().map(user_view).collect()))
}

async fn update_user(
    AdminSession(_claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserView>, ApiError> {
    let mut user = db::find_user_by_id(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;

    if let Some(user_name) = payload.user_name {
        if user_name != user.username {
            if db::find_user_by_username(&state.pool, &user_name)
                .await?
                .is_some()
            {
                return Err(ApiError::Validation("User Name is already taken".into()));
            }
            user.username = user_name;
        }
    }

    if let Some(reference_no) = payload.reference_no {
        if reference_no != user.reference_no {
            let taken: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM users WHERE reference_no = $1 AND id <> $2)",
            )
            .bind(&reference_no)
            .bind(user.id)
            .fetch_one(&state.pool)
            .await?;
            if taken {
                return Err(ApiError::Validation("Reference number already exists".into()));
            }
            user.reference_no = reference_no;
        }
    }

    if let Some(first_name) = payload.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = payload.last_name {
        user.last_name = last_name;
    }
    if let Some(role) = payload.user_role {
        user.role = role;
    }
    if let Some(section) = payload.section {
        user.section_id = Some(section);
    }
    if let Some(image) = payload.profile_image {
        user.profile_image = Some(image);
    }
    if let Some(password) = payload.password {
        user.hash = hash_password(&password)?;
    }

    sqlx::query(
        r#"
        UPDATE users
        SET first_name = $1,
            last_name = $2,
            username = $3,
            role = $4,
            section_id = $5,
            reference_no = $6,
            hash = $7,
            profile_image = $8
        WHERE id = $9
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.username)
    .bind(user.role)
    .bind(user.section_id)
    .bind(&user.reference_no)
    .bind(&user.hash)
    .bind(&user.profile_image)
    .bind(user.id)
    .execute(&state.pool)
    .await?;

    Ok(Json(user_view(user)))
}

async fn delete_user(
    AdminSession(_claims): AdminSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("User not found"));
    }
    Ok(Json(MessageResponse {
        message: "User deleted successfully",
    }))
}
