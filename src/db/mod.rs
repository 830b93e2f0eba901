pub mod seed;

use crate::domain::models::UserRole;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

#[derive(Debug, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub role: UserRole,
    pub section_id: Option<Uuid>,
    pub reference_no: String,
    pub hash: String,
    pub profile_image: Option<String>,
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<DbUser>> {
    sqlx::query_as::<_, DbUser>(
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
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn find_user_by_username(pool: &PgPool, username: &str) -> sqlx::Result<Option<DbUser>> {
    sqlx::query_as::<_, DbUser>(
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
        WHERE username = $1
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

// ============================================
// Inquiry listing
// ============================================

/// Base filter shared by the count and page queries. Empty vecs mean
/// "no constraint". Acknowledgement filtering is AND-composed: the value
/// must be non-null, non-empty, and in the requested set.
#[derive(Debug, Default, Clone)]
pub struct InquiryFilter {
    pub status: Vec<i32>,
    pub assignees: Vec<Uuid>,
    pub acknowledgements: Vec<String>,
}

/// Skip/take derived from page and limit. `limit = 0` fetches everything
/// from row zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub skip: i64,
    pub take: Option<i64>,
}

impl PageWindow {
    pub fn new(page: i64, limit: i64) -> Self {
        if limit > 0 {
            PageWindow {
                skip: (page - 1) * limit,
                take: Some(limit),
            }
        } else {
            PageWindow { skip: 0, take: None }
        }
    }
}

/// One inquiry joined to its requirement, that requirement's section, and
/// the assignee. Left joins throughout: the schema carries no foreign keys,
/// so any of the joined sides can be missing.
#[derive(Debug, FromRow)]
pub struct InquiryJoinRow {
    pub id: Uuid,
    pub display_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub nic: String,
    pub requirement_id: Uuid,
    pub visited_date: DateTime<Utc>,
    pub rating: Option<i32>,
    pub acknowledgement: Option<String>,
    pub notes: Option<String>,
    pub status: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub requirement_name: Option<String>,
    pub section_id: Option<Uuid>,
    pub section_code: Option<String>,
    pub section_name: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub assignee_first_name: Option<String>,
    pub assignee_last_name: Option<String>,
    pub assignee_reference_no: Option<String>,
}

pub const INQUIRY_JOIN_SELECT: &str = r#"
SELECT
    i.id,
    i.display_id,
    i.first_name,
    i.last_name,
    i.nic,
    i.requirement_id,
    i.visited_date,
    i.rating,
    i.acknowledgement,
    i.notes,
    i.status,
    i.created_at,
    i.updated_at,
    r.name AS requirement_name,
    s.id AS section_id,
    s.code AS section_code,
    s.name AS section_name,
    a.id AS assignee_id,
    a.first_name AS assignee_first_name,
    a.last_name AS assignee_last_name,
    a.reference_no AS assignee_reference_no
FROM inquiries i
LEFT JOIN requirements r ON r.id = i.requirement_id
LEFT JOIN sections s ON s.id = r.section_id
LEFT JOIN users a ON a.id = i.assignee_id
WHERE TRUE
"#;

fn push_inquiry_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    filter: &InquiryFilter,
    requirement_ids: Option<&Vec<Uuid>>,
) {
    if !filter.status.is_empty() {
        qb.push(" AND i.status = ANY(");
        qb.push_bind(filter.status.clone());
        qb.push(")");
    }
    if !filter.assignees.is_empty() {
        qb.push(" AND i.assignee_id = ANY(");
        qb.push_bind(filter.assignees.clone());
        qb.push(")");
    }
    if !filter.acknowledgements.is_empty() {
        qb.push(" AND i.acknowledgement IS NOT NULL AND i.acknowledgement <> ''");
        qb.push(" AND i.acknowledgement = ANY(");
        qb.push_bind(filter.acknowledgements.clone());
        qb.push(")");
    }
    if let Some(ids) = requirement_ids {
        qb.push(" AND i.requirement_id = ANY(");
        qb.push_bind(ids.clone());
        qb.push(")");
    }
}

/// Fetch one page of joined inquiries, newest first. Section scoping for
/// section staff is deliberately NOT part of this query; the caller applies
/// it to the fetched rows, so the page window runs before the section
/// restriction and staff pages can come back short.
pub async fn fetch_inquiry_page(
    pool: &PgPool,
    filter: &InquiryFilter,
    requirement_ids: Option<&Vec<Uuid>>,
    window: PageWindow,
) -> sqlx::Result<Vec<InquiryJoinRow>> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(INQUIRY_JOIN_SELECT);
    push_inquiry_filters(&mut qb, filter, requirement_ids);
    qb.push(" ORDER BY i.created_at DESC");
    if let Some(take) = window.take {
        qb.push(" LIMIT ");
        qb.push_bind(take);
        qb.push(" OFFSET ");
        qb.push_bind(window.skip);
    }
    qb.build_query_as::<InquiryJoinRow>().fetch_all(pool).await
}

/// Count over the fully composed filter, independent of pagination.
pub async fn count_inquiries(
    pool: &PgPool,
    filter: &InquiryFilter,
    requirement_ids: Option<&Vec<Uuid>>,
) -> sqlx::Result<i64> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("SELECT COUNT(*) FROM inquiries i WHERE TRUE");
    push_inquiry_filters(&mut qb, filter, requirement_ids);
    qb.build_query_scalar::<i64>().fetch_one(pool).await
}

/// Resolve a section filter to the requirement ids it covers.
pub async fn requirement_ids_for_sections(
    pool: &PgPool,
    section_ids: &[Uuid],
) -> sqlx::Result<Vec<Uuid>> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM requirements WHERE section_id = ANY($1)")
        .bind(section_ids)
        .fetch_all(pool)
        .await
}

// ============================================
// Display id
// ============================================

pub fn format_display_id(n: i64) -> String {
    format!("INQ - {:05}", n)
}

/// Atomic increment-and-fetch for the human-facing inquiry id. Concurrent
/// creations cannot collide or skip a number.
pub async fn next_display_id(pool: &PgPool) -> sqlx::Result<String> {
    let value: i64 =
        sqlx::query_scalar("UPDATE inquiry_counter SET value = value + 1 RETURNING value")
            .fetch_one(pool)
            .await?;
    Ok(format_display_id(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_id_is_zero_padded() {
        assert_eq!(format_display_id(1), "INQ - 00001");
        assert_eq!(format_display_id(42), "INQ - 00042");
        assert_eq!(format_display_id(99999), "INQ - 99999");
        // Past five digits the counter keeps going rather than wrapping.
        assert_eq!(format_display_id(123456), "INQ - 123456");
    }

    #[test]
    fn window_with_limit_pages_normally() {
        assert_eq!(
            PageWindow::new(1, 10),
            PageWindow {
                skip: 0,
                take: Some(10)
            }
        );
        assert_eq!(
            PageWindow::new(3, 25),
            PageWindow {
                skip: 50,
                take: Some(25)
            }
        );
    }

    #[test]
    fn zero_limit_means_everything_from_the_start() {
        assert_eq!(PageWindow::new(7, 0), PageWindow { skip: 0, take: None });
    }
}
