use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct RequirementRow {
    pub id: Uuid,
    pub name: String,
    pub section_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementView {
    pub id: Uuid,
    pub name: String,
    pub section: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct RequirementResponse {
    pub message: &'static str,
    pub requirement: RequirementView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct RequirementPayload {
    pub name: String,
    pub section: Uuid,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_requirements).post(create_requirement))
        .route("/section/:section_id", get(requirements_by_section))
        .route(
            "/:id",
            get(get_requirement)
                .put(update_requirement)
                .delete(delete_requirement),
        )
        .with_state(state)
}

pub fn requirement_view(row: RequirementRow) -> RequirementView {
    RequirementView {
        id: row.id,
        name: row.name,
        section: row.section_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

async fn pair_exists(
    pool: &sqlx::PgPool,
    name: &str,
    section: Uuid,
    exclude: Option<Uuid>,
) -> sqlx::Result<bool> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM requirements
            WHERE name = $1 AND section_id = $2 AND ($3::uuid IS NULL OR id <> $3)
        )
        "#,
    )
    .bind(name)
    .bind(section)
    .bind(exclude)
    .fetch_one(pool)
    .await
}

async fn create_requirement(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<RequirementPayload>,
) -> Result<Json<RequirementResponse>, ApiError> {
    if pair_exists(&state.pool, &payload.name, payload.section, None).await? {
        return Err(ApiError::Validation(
            "Requirement already exists for this section".into(),
        ));
    }

    let row = sqlx::query_as::<_, RequirementRow>(
        r#"
        INSERT INTO requirements (name, section_id)
        VALUES ($1, $2)
        RETURNING id, name, section_id, created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(payload.section)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(RequirementResponse {
        message: "Requirement created successfully",
        requirement: requirement_view(row),
    }))
}

async fn list_requirements(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<RequirementView>>, ApiError> {
    let rows = sqlx::query_as::<_, RequirementRow>(
        r#"
        SELECT id, name, section_id, created_at, updated_at
        FROM requirements
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;
    Ok(Json(rows.into_iter().map(requirement_view).collect()))
}

async fn requirements_by_section(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(section_id): Path<Uuid>,
) -> Result<Json<Vec<RequirementView>>, ApiError> {
    let rows = sqlx::query_as::<_, RequirementRow>(
        r#"
        SELECT id, name, section_id, created_at, updated_at
        FROM requirements
        WHERE section_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(section_id)
    .fetch_all(&state.pool)
    .await?;

    // An empty list is a 404 here; the client relies on it.
    if rows.is_empty() {
        return Err(ApiError::NotFound("No requirements found for this section"));
    }

    Ok(Json(rows.into_iter().map(requirement_view).collect()))
}

async fn get_requirement(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RequirementView>, ApiError> {
    let row = sqlx::query_as::<_, RequirementRow>(
        "SELECT id, name, section_id, created_at, updated_at FROM requirements WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("Requirement not found"))?;
    Ok(Json(requirement_view(row)))
}

async fn update_requirement(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RequirementPayload>,
) -> Result<Json<RequirementResponse>, ApiError> {
    if pair_exists(&state.pool, &payload.name, payload.section, Some(id)).await? {
        return Err(ApiError::Validation(
            "Requirement already exists for this section".into(),
        ));
    }

    let row = sqlx::query_as::<_, RequirementRow>(
        r#"
        UPDATE requirements
        SET name = $1, section_id = $2, updated_at = now()
        WHERE id = $3
        RETURNING id, name, section_id, created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(payload.section)
    .bind(id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(ApiError::NotFound("Requirement not found"))?;

    Ok(Json(RequirementResponse {
        message: "Requirement updated successfully",
        requirement: requirement_view(row),
    }))
}

async fn delete_requirement(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = sqlx::query("DELETE FROM requirements WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Requirement not found"));
    }
    Ok(Json(MessageResponse {
        message: "Requirement deleted successfully",
    }))
}
