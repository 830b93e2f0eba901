use crate::error::ApiError;
use crate::state::SharedState;
use crate::web::session::UserSession;
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, sqlx::FromRow)]
pub struct StatRow {
    pub status: Option<i32>,
    pub rating: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub users_count: i64,
    pub inquiries_count: i64,
    pub sections_count: i64,
    pub requirements_count: i64,
    pub monthly_counts: [i64; 12],
    pub status_counts: HashMap<String, i64>,
    pub avg_rating: f64,
}

pub fn router(state: SharedState) -> Router {
    Router::new().route("/", get(dashboard)).with_state(state)
}

/// Month-of-year histogram (accumulated across years), status counts keyed
/// by the code as a string ("unknown" for null), and the average rating of
/// status-2 inquiries with missing ratings counted as zero.
fn aggregate(rows: &[StatRow]) -> ([i64; 12], HashMap<String, i64>, f64) {
    let mut monthly = [0i64; 12];
    let mut status_counts: HashMap<String, i64> = HashMap::new();

    for row in rows {
        monthly[row.created_at.month0() as usize] += 1;
        let key = match row.status {
            Some(code) => code.to_string(),
            None => "unknown".to_string(),
        };
        *status_counts.entry(key).or_insert(0) += 1;
    }

    let work_done: Vec<&StatRow> = rows.iter().filter(|r| r.status == Some(2)).collect();
    let avg_rating = if work_done.is_empty() {
        0.0
    } else {
        let sum: i64 = work_done.iter().map(|r| r.rating.unwrap_or(0) as i64).sum();
        sum as f64 / work_done.len() as f64
    };

    (monthly, status_counts, avg_rating)
}

async fn dashboard(
    UserSession(_claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let users_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(&state.pool)
        .await?;
    let sections_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections")
        .fetch_one(&state.pool)
        .await?;
    let requirements_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM requirements")
        .fetch_one(&state.pool)
        .await?;

    let rows = sqlx::query_as::<_, StatRow>("SELECT status, rating, created_at FROM inquiries")
        .fetch_all(&state.pool)
        .await?;
    let inquiries_count = rows.len() as i64;

    let (monthly_counts, status_counts, avg_rating) = aggregate(&rows);

    Ok(Json(DashboardResponse {
        users_count,
        inquiries_count,
        sections_count,
        requirements_count,
        monthly_counts,
        status_counts,
        avg_rating,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(status: Option<i32>, rating: Option<i32>, year: i32, month: u32) -> StatRow {
        StatRow {
            status,
            rating,
            created_at: Utc.with_ymd_and_hms(year, month, 15, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn months_accumulate_across_years() {
        let rows = vec![
            row(Some(1), None, 2023, 3),
            row(Some(1), None, 2024, 3),
            row(Some(1), None, 2024, 12),
        ];
        let (monthly, _, _) = aggregate(&rows);
        assert_eq!(monthly[2], 2);
        assert_eq!(monthly[11], 1);
        assert_eq!(monthly.iter().sum::<i64>(), 3);
    }

    #[test]
    fn null_status_counts_as_unknown() {
        let rows = vec![
            row(Some(0), None, 2024, 1),
            row(None, None, 2024, 1),
            row(None, None, 2024, 2),
        ];
        let (_, status_counts, _) = aggregate(&rows);
        assert_eq!(status_counts.get("0"), Some(&1));
        assert_eq!(status_counts.get("unknown"), Some(&2));
    }

    #[test]
    fn average_counts_missing_ratings_as_zero() {
        // Ratings [4, missing, 6] on status 2 average to 10/3, not 5.
        let rows = vec![
            row(Some(2), Some(4), 2024, 1),
            row(Some(2), None, 2024, 1),
            row(Some(2), Some(6), 2024, 1),
            row(Some(1), Some(10), 2024, 1), // other statuses excluded
        ];
        let (_, _, avg) = aggregate(&rows);
        assert!((avg - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn average_is_zero_without_status_two() {
        let rows = vec![row(Some(1), Some(9), 2024, 1), row(None, Some(8), 2024, 2)];
        let (_, _, avg) = aggregate(&rows);
        assert_eq!(avg, 0.0);
    }
}
