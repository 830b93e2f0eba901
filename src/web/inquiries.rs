use crate::db::{self, InquiryFilter, InquiryJoinRow, PageWindow};
use crate::domain::models::UserRole;
use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub acknowledgement: Option<String>,
    pub section: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRef {
    pub id: Uuid,
    pub section_id: String,
    pub name: String,
}

#[derive(Serialize)]
pub struct RequirementRef {
    pub id: Uuid,
    pub name: String,
    pub section: Option<SectionRef>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssigneeRef {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub reference_no: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryView {
    pub id: Uuid,
    pub inquiry_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub nic: String,
    pub requirement: Option<RequirementRef>,
    pub visited_date: DateTime<Utc>,
    pub rating: Option<i32>,
    pub assignee: Option<AssigneeRef>,
    pub acknowledgement: Option<String>,
    pub notes: Option<String>,
    pub status: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct PaginationMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

#[derive(Serialize)]
pub struct InquiryListResponse {
    pub inquiries: Vec<InquiryView>,
    pub pagination: PaginationMeta,
}

#[derive(Serialize)]
pub struct InquiryResponse {
    pub message: &'static str,
    pub inquiry: InquiryView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInquiryRequest {
    pub first_name: String,
    pub last_name: String,
    pub nic: String,
    pub requirement: Uuid,
    pub visited_date: Option<DateTime<Utc>>,
    pub rating: Option<i32>,
    pub assignee: Option<Uuid>,
    pub acknowledgement: Option<String>,
    pub notes: Option<String>,
    pub status: Option<i32>,
    pub inquiry_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInquiryRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub nic: Option<String>,
    pub requirement: Option<Uuid>,
    pub visited_date: Option<DateTime<Utc>>,
    pub rating: Option<i32>,
    pub assignee: Option<Uuid>,
    pub acknowledgement: Option<String>,
    pub notes: Option<String>,
    pub status: Option<i32>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(list_inquiries).post(create_inquiry))
        .route(
            "/:id",
            get(get_inquiry).put(update_inquiry).delete(delete_inquiry),
        )
        .with_state(state)
}

// ============================================
// Query-parameter parsing
// ============================================

fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

fn parse_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|l| *l >= 0)
        .unwrap_or(0)
}

fn parse_int_list(raw: &str) -> Vec<i32> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i32>().ok())
        .collect()
}

fn parse_uuid_list(raw: &str) -> Vec<Uuid> {
    raw.split(',')
        .filter_map(|s| Uuid::parse_str(s.trim()).ok())
        .collect()
}

fn parse_str_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if limit > 0 {
        (total + limit - 1) / limit
    } else {
        1
    }
}

/// Section-staff visibility: keep only rows whose joined section is the
/// requester's own, then apply any explicit section filter on top. The
/// explicit filter can only ever shrink the set further (to empty, when it
/// does not include the requester's section).
fn scope_to_section(rows: Vec<InquiryJoinRow>, own: Uuid, requested: &[Uuid]) -> Vec<InquiryJoinRow> {
    rows.into_iter()
        .filter(|row| match row.section_id {
            Some(sid) => sid == own && (requested.is_empty() || requested.contains(&sid)),
            None => false,
        })
        .collect()
}

fn inquiry_view(row: InquiryJoinRow) -> InquiryView {
    let requirement = row.requirement_name.map(|name| RequirementRef {
        id: row.requirement_id,
        name,
        section: match (row.section_id, row.section_code, row.section_name) {
            (Some(id), Some(section_id), Some(name)) => Some(SectionRef {
                id,
                section_id,
                name,
            }),
            _ => None,
        },
    });

    let assignee = match (
        row.assignee_id,
        row.assignee_first_name,
        row.assignee_last_name,
        row.assignee_reference_no,
    ) {
        (Some(id), Some(first_name), Some(last_name), Some(reference_no)) => Some(AssigneeRef {
            id,
            first_name,
            last_name,
            reference_no,
        }),
        _ => None,
    };

    InquiryView {
        id: row.id,
        inquiry_id: row.display_id,
        first_name: row.first_name,
        last_name: row.last_name,
        nic: row.nic,
        requirement,
        visited_date: row.visited_date,
        rating: row.rating,
        assignee,
        acknowledgement: row.acknowledgement,
        notes: row.notes,
        status: row.status,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn validate_rating(rating: Option<i32>) -> Result<(), ApiError> {
    if let Some(r) = rating {
        if !(1..=10).contains(&r) {
            return Err(ApiError::Validation("Rating must be between 1 and 10".into()));
        }
    }
    Ok(())
}

async fn find_inquiry_joined(
    pool: &sqlx::PgPool,
    id: Uuid,
) -> Result<Option<InquiryJoinRow>, ApiError> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(db::INQUIRY_JOIN_SELECT);
    qb.push(" AND i.id = ");
    qb.push_bind(id);
    Ok(qb
        .build_query_as::<InquiryJoinRow>()
        .fetch_optional(pool)
        .await?)
}

// ============================================
// Handlers
// ============================================

/// The role-scoped, filtered, paginated listing. Section staff see only
/// their own section's inquiries; the page window is applied in the
/// database BEFORE that scoping, so their pages can come back short of
/// `limit` and `total` is the count of retained rows. All other roles get
/// a real count query and full pages.
async fn list_inquiries(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Query(params): Query<ListParams>,
) -> Result<Json<InquiryListResponse>, ApiError> {
    let page = parse_page(params.page.as_deref());
    let limit = parse_limit(params.limit.as_deref());
    let window = PageWindow::new(page, limit);

    let filter = InquiryFilter {
        status: params
            .status
            .as_deref()
            .map(parse_int_list)
            .unwrap_or_default(),
        assignees: params
            .assignee
            .as_deref()
            .map(parse_uuid_list)
            .unwrap_or_default(),
        acknowledgements: params
            .acknowledgement
            .as_deref()
            .map(parse_str_list)
            .unwrap_or_default(),
    };
    let section_filter: Vec<Uuid> = params
        .section
        .as_deref()
        .map(parse_uuid_list)
        .unwrap_or_default();

    let (rows, total) = match claims.role {
        UserRole::SectionStaff => {
            let user = db::find_user_by_id(&state.pool, claims.user_id)
                .await?
                .ok_or(ApiError::NotFound("User not found"))?;

            let fetched = db::fetch_inquiry_page(&state.pool, &filter, None, window).await?;
            let scoped = match user.section_id {
                Some(own) => scope_to_section(fetched, own, &section_filter),
                // Staff without a section can match nothing.
                None => Vec::new(),
            };
            let total = scoped.len() as i64;
            (scoped, total)
        }
        UserRole::Admin | UserRole::Reporter => {
            let requirement_ids = if section_filter.is_empty() {
                None
            } else {
                Some(db::requirement_ids_for_sections(&state.pool, &section_filter).await?)
            };
            let total =
                db::count_inquiries(&state.pool, &filter, requirement_ids.as_ref()).await?;
            let rows =
                db::fetch_inquiry_page(&state.pool, &filter, requirement_ids.as_ref(), window)
                    .await?;
            (rows, total)
        }
    };

    Ok(Json(InquiryListResponse {
        inquiries: rows.into_iter().map(inquiry_view).collect(),
        pagination: PaginationMeta {
            page,
            limit,
            total,
            pages: total_pages(total, limit),
        },
    }))
}

async fn create_inquiry(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<CreateInquiryRequest>,
) -> Result<Json<InquiryResponse>, ApiError> {
    validate_rating(payload.rating)?;

    let display_id = match payload.inquiry_id {
        Some(id) => id,
        None => db::next_display_id(&state.pool).await?,
    };

    let id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO inquiries
            (display_id, first_name, last_name, nic, requirement_id, visited_date,
             rating, assignee_id, acknowledgement, notes, status)
        VALUES ($1, $2, $3, $4, $5, COALESCE($6, now()), $7, $8, $9, $10, $11)
        RETURNING id
        "#,
    )
    .bind(&display_id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.nic)
    .bind(payload.requirement)
    .bind(payload.visited_date)
    .bind(payload.rating)
    .bind(payload.assignee)
    .bind(&payload.acknowledgement)
    .bind(&payload.notes)
    .bind(payload.status)
    .fetch_one(&state.pool)
    .await?;

    let row = find_inquiry_joined(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Inquiry not found"))?;

    Ok(Json(InquiryResponse {
        message: "Inquiry created successfully",
        inquiry: inquiry_view(row),
    }))
}

async fn get_inquiry(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The detail view is the one place the assignee's profile image travels.
    #[derive(sqlx::FromRow)]
    struct ProfileImageRow {
        profile_image: Option<String>,
    }

    let row = find_inquiry_joined(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Inquiry not found"))?;

    let image = match row.assignee_id {
        Some(assignee_id) => {
            sqlx::query_as::<_, ProfileImageRow>(
                "SELECT profile_image FROM users WHERE id = $1",
            )
            .bind(assignee_id)
            .fetch_optional(&state.pool)
            .await?
            .and_then(|r| r.profile_image)
        }
        None => None,
    };

    let mut value = serde_json::to_value(inquiry_view(row))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Some(assignee) = value
        .get_mut("assignee")
        .filter(|a| !a.is_null())
        .and_then(|a| a.as_object_mut())
    {
        assignee.insert("profileImage".to_string(), serde_json::json!(image));
    }

    Ok(Json(value))
}

async fn update_inquiry(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInquiryRequest>,
) -> Result<Json<InquiryResponse>, ApiError> {
    validate_rating(payload.rating)?;

    let updated = sqlx::query(
        r#"
        UPDATE inquiries
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            nic = COALESCE($4, nic),
            requirement_id = COALESCE($5, requirement_id),
            visited_date = COALESCE($6, visited_date),
            rating = COALESCE($7, rating),
            assignee_id = COALESCE($8, assignee_id),
            acknowledgement = COALESCE($9, acknowledgement),
            notes = COALESCE($10, notes),
            status = COALESCE($11, status),
            updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(&payload.first_name)
    .bind(&payload.last_name)
    .bind(&payload.nic)
    .bind(payload.requirement)
    .bind(payload.visited_date)
    .bind(payload.rating)
    .bind(payload.assignee)
    .bind(&payload.acknowledgement)
    .bind(&payload.notes)
    .bind(payload.status)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound("Inquiry not found"));
    }

    let row = find_inquiry_joined(&state.pool, id)
        .await?
        .ok_or(ApiError::NotFound("Inquiry not found"))?;

    Ok(Json(InquiryResponse {
        message: "Inquiry updated successfully",
        inquiry: inquiry_view(row),
    }))
}

async fn delete_inquiry(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    let deleted = sqlx::query("DELETE FROM inquiries WHERE id = $1")
        .bind(id)
        .execute(&state.pool)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::NotFound("Inquiry not found"));
    }
    Ok(Json(MessageResponse {
        message: "Inquiry deleted successfully",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(section: Option<Uuid>) -> InquiryJoinRow {
        let when = Utc.with_ymd_and_hms(2024, 3, 14, 9, 0, 0).unwrap();
        InquiryJoinRow {
            id: Uuid::new_v4(),
            display_id: Some("INQ - 00001".into()),
            first_name: "A".into(),
            last_name: "B".into(),
            nic: "900000000V".into(),
            requirement_id: Uuid::new_v4(),
            visited_date: when,
            rating: None,
            acknowledgement: None,
            notes: None,
            status: Some(1),
            created_at: when,
            updated_at: when,
            requirement_name: Some("Permit".into()),
            section_id: section,
            section_code: section.map(|_| "SEC-01".into()),
            section_name: section.map(|_| "Licensing".into()),
            assignee_id: None,
            assignee_first_name: None,
            assignee_last_name: None,
            assignee_reference_no: None,
        }
    }

    #[test]
    fn page_defaults_and_rejects_garbage() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("abc")), 1);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-3")), 1);
        assert_eq!(parse_page(Some("2")), 2);
    }

    #[test]
    fn limit_defaults_to_unbounded() {
        assert_eq!(parse_limit(None), 0);
        assert_eq!(parse_limit(Some("abc")), 0);
        assert_eq!(parse_limit(Some("-5")), 0);
        assert_eq!(parse_limit(Some("25")), 25);
    }

    #[test]
    fn int_list_drops_unparsable_entries() {
        assert_eq!(parse_int_list("1, 2,x ,3"), vec![1, 2, 3]);
        assert_eq!(parse_int_list(""), Vec::<i32>::new());
        assert_eq!(parse_int_list("a,b"), Vec::<i32>::new());
    }

    #[test]
    fn uuid_list_drops_invalid_entries() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let raw = format!("{a}, nonsense ,{b},");
        assert_eq!(parse_uuid_list(&raw), vec![a, b]);
    }

    #[test]
    fn string_list_drops_blank_entries() {
        // An empty string slipped into the acknowledgement filter must not
        // widen it to unacknowledged records.
        assert_eq!(parse_str_list(",, done ,seen"), vec!["done", "seen"]);
        assert_eq!(parse_str_list(" , "), Vec::<String>::new());
    }

    #[test]
    fn pages_arithmetic() {
        assert_eq!(total_pages(10, 3), 4);
        assert_eq!(total_pages(9, 3), 3);
        assert_eq!(total_pages(0, 5), 0);
        // limit=0 returns everything as a single page no matter the total.
        assert_eq!(total_pages(0, 0), 1);
        assert_eq!(total_pages(1000, 0), 1);
    }

    #[test]
    fn scoping_drops_other_sections_and_orphans() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![row(Some(own)), row(Some(other)), row(None), row(Some(own))];
        let kept = scope_to_section(rows, own, &[]);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.section_id == Some(own)));
    }

    #[test]
    fn explicit_section_filter_cannot_widen_staff_scope() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let rows = vec![row(Some(own)), row(Some(other))];
        // Requesting another section yields nothing, not that section's rows.
        let kept = scope_to_section(rows, own, &[other]);
        assert!(kept.is_empty());

        let rows = vec![row(Some(own)), row(Some(other))];
        // Requesting a set containing the own section is a no-op.
        let kept = scope_to_section(rows, own, &[own, other]);
        assert_eq!(kept.len(), 1);
    }

    // Deliberate: the page window runs in the database before section
    // scoping, so a staff page may hold fewer rows than `limit` and
    // `total` reports the retained count.
    #[test]
    fn section_staff_page_can_run_short_after_scoping() {
        let own = Uuid::new_v4();
        let other = Uuid::new_v4();
        let limit = 5usize;
        let fetched: Vec<InquiryJoinRow> = (0..limit)
            .map(|i| row(Some(if i % 2 == 0 { own } else { other })))
            .collect();
        let kept = scope_to_section(fetched, own, &[]);
        assert!(kept.len() < limit);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn view_hides_missing_joins() {
        let mut orphan = row(None);
        orphan.requirement_name = None;
        let view = inquiry_view(orphan);
        assert!(view.requirement.is_none());
        assert!(view.assignee.is_none());

        let joined = inquiry_view(row(Some(Uuid::new_v4())));
        let requirement = joined.requirement.expect("requirement populated");
        assert!(requirement.section.is_some());
    }

    #[test]
    fn rating_bounds() {
        assert!(validate_rating(None).is_ok());
        assert!(validate_rating(Some(1)).is_ok());
        assert!(validate_rating(Some(10)).is_ok());
        assert!(validate_rating(Some(0)).is_err());
        assert!(validate_rating(Some(11)).is_err());
    }
}
