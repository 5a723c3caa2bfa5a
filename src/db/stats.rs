use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, BackendResultExt};
use crate::models::{BatchOverview, StudentAttendanceRow};

pub async fn student_attendance(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<StudentAttendanceRow>, AppError> {
    sqlx::query_as::<_, StudentAttendanceRow>(
        r#"
        SELECT student_name, email, present_count, total_sessions, last_attended
        FROM training_dashboard.get_batch_attendance_stats($1)
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
    .or_fail("load attendance statistics")
}

pub async fn overview(pool: &PgPool, batch_id: Uuid) -> Result<BatchOverview, AppError> {
    sqlx::query_as::<_, BatchOverview>(
        r#"
        SELECT student_count, session_count, average_attendance, last_session_date
        FROM training_dashboard.get_batch_overview($1)
        "#,
    )
    .bind(batch_id)
    .fetch_one(pool)
    .await
    .or_fail("load batch overview")
}
