use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::requirements::{requirement_view, RequirementRow, RequirementView};
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
pub struct SectionRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape: the human-readable section code travels as `sectionId`,
/// distinct from the generated `id`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionView {
    pub id: Uuid,
    pub section_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithRequirements {
    #[serde(flatten)]
    pub section: SectionView,
    pub requirements: Vec<RequirementView>,
}

#[derive(Serialize)]
pub struct SectionResponse {
    pub message: &'static str,
    pub section: SectionView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSectionRequest {
    pub section_id: String,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSectionRequest {
    pub section_id: Option<String>,
    pub name: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_sections).post(create_section))
        .route(
            "/:id",
            get(get_section).put(update_section).delete(delete_section),
        )
        .with_state(state)
}

fn section_view(row: SectionRow) -> SectionView {
    SectionView {
        id: row.id,
        section_id: row.code,
        name: row.name,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

async fn find_section(pool: &sqlx::PgPool, id: Uuid) -> Result<SectionRow, ApiError> {
    sqlx::query_as::<_, SectionRow>(
        "SELECT id, code, name, created_at, updated_at FROM sections WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound("Section not found"))
}

async fn create_section(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateSectionRequest>,
) -> Result<Json<SectionResponse>, ApiError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sections WHERE code = $1)")
        .bind(&payload.section_id)
        .fetch_one(&state.pool)
        .await?;
    if exists {
        return Err(ApiError::Validation("Section ID already exists".into()));
    }

    let row = sqlx::query_as::<_, SectionRow>(
        r#"
        INSERT INTO sections (code, name)
        VALUES ($1, $2)
        RETURNING id, code, name, created_at, updated_at
        "#,
    )
    .bind(&payload.section_id)
    .bind(&payload.name)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(SectionResponse {
        message: "Section created successfully",
        section: section_view(row),
    }))
}

/// Every section together with its requirements, newest requirement first.
async fn list_sections(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<SectionWithRequirements>>, ApiError> {
    let sections = sqlx::query_as::<_, SectionRow>(
        "SELECT id, code, name, created_at, updated_at FROM sections",
    )
    .fetch_all(&state.pool)
    .await?;

    let mut out = Vec::with_capacity(sections.len());
    for section in sections {
        let requirements = sqlx::query_as::<_, RequirementRow>(
            r#"
            SELECT id, name, section_id, created_at, updated_at
            FROM requirements
            WHERE section_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(section.id)
        .fetch_all(&state.pool)
        .await?;

        out.push(SectionWithRequirements {
            section: section_view(section),
            requirements: requirements.into_iter().map(requirement_view).collect(),
        });
    }

    Ok(Json(out))
}

async fn get_section(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SectionView>, ApiError> {
    let row = find_section(&state.pool, id).await?;
    Ok(Json(section_view(row)))
}

async fn update_section(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateSectionRequest>,
) -> Result<Json<SectionResponse>, ApiError> {
    let mut section = find_section(&state.pool, id).await?;

    if let Some(code) = payload.section_id {
        if code != section.code {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sections WHERE code = $1 AND id <> $2)",
            )
            .bind(&code)
            .bind(section.id)
            .fetch_one(&state.pool)
            .await?;
            if exists {
                return Err(ApiError::Validation("Section ID already exists".into()));
            }
            section.code = code;
        }
    }
    if let Some(name) = payload.name {
        section.name = name;
    }

    let row = sqlx::query_as::<_, SectionRow>(
        r#"
        UPDATE sections
        SET code = $1, name = $2, updated_at = now()
        WHERE id = $3
        RETURNING id, code, name, created_at, updated_at
        "#,
    )
    .bind(&section.code)
    .bind(&section.name)
    .bind(section.id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(SectionResponse {
        message: "Section updated successfully",
        section: section_view(row),
    }))
}

async fn delete_section(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    // No cascade: requirements and inquiries under this section stay behind.
    let deleted = sqlx::query("DELETE FROM sections WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Section not found"));
    }
    Ok(Json(MessageResponse {
        message: "Section deleted successfully",
    }))
}
