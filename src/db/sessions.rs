use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::batches;
use crate::error::{backend_failure, AppError, BackendResultExt};
use crate::models::{AttendanceRecord, AttendanceSession, Batch};
use crate::sessions::{self, SessionConflict};

const SESSION_COLUMNS: &str =
    "s.id, s.session_date, s.code, s.name, s.batch_id, s.is_active, s.expires_at, s.public_id, s.created_at";

/// Generated codes and public ids are retried this many times on collision.
const CREATE_ATTEMPTS: u32 = 5;

/// Creates the one session allowed for this batch and date.
pub async fn create(
    pool: &PgPool,
    batch: &Batch,
    date: NaiveDate,
    name: Option<&str>,
) -> Result<AttendanceSession, AppError> {
    let name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| sessions::default_name(&batch.name, date));

    let query = format!(
        "INSERT INTO training_dashboard.attendance_sessions AS s \
         (id, session_date, code, name, batch_id, is_active, expires_at, public_id) \
         VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7) \
         RETURNING {SESSION_COLUMNS}"
    );
    let mut attempt = 1;
    loop {
        let code = sessions::generate_code();
        let public_id = crate::links::generate_public_id(batch.id, Utc::now());
        let result = sqlx::query_as::<_, AttendanceSession>(&query)
            .bind(Uuid::new_v4())
            .bind(date)
            .bind(&code)
            .bind(&name)
            .bind(batch.id)
            .bind(sessions::end_of_day(date))
            .bind(public_id)
            .fetch_one(pool)
            .await;

        match result {
            Ok(session) => {
                tracing::info!(batch = %batch.name, %date, code = %session.code, "session created");
                return Ok(session);
            }
            Err(err)
                if attempt < CREATE_ATTEMPTS
                    && sessions::conflict(&err) == Some(SessionConflict::Generated) =>
            {
                tracing::warn!(attempt, %code, "generated session code already taken; retrying");
                attempt += 1;
                // Public ids embed the creation millisecond.
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(err) => return Err(sessions::insert_failure(err, &batch.name, date)),
        }
    }
}

pub async fn find_by_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<AttendanceSession>, AppError> {
    let query = format!(
        "SELECT {SESSION_COLUMNS} FROM training_dashboard.attendance_sessions s WHERE s.code = $1"
    );
    sqlx::query_as::<_, AttendanceSession>(&query)
        .bind(code.trim().to_ascii_uppercase())
        .fetch_optional(pool)
        .await
        .or_fail("load session")
}

pub async fn require_by_code(pool: &PgPool, code: &str) -> Result<AttendanceSession, AppError> {
    find_by_code(pool, code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session {code}")))
}

/// Sessions between two dates inclusive, oldest first, optionally for one batch.
pub async fn list_between(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
    batch_id: Option<Uuid>,
) -> Result<Vec<AttendanceSession>, AppError> {
    let query = format!(
        "SELECT {SESSION_COLUMNS} FROM training_dashboard.attendance_sessions s \
         WHERE s.session_date BETWEEN $1 AND $2 \
         AND ($3::uuid IS NULL OR s.batch_id = $3) \
         ORDER BY s.session_date ASC, s.created_at ASC"
    );
    sqlx::query_as::<_, AttendanceSession>(&query)
        .bind(from)
        .bind(to)
        .bind(batch_id)
        .fetch_all(pool)
        .await
        .or_fail("load sessions")
}

/// Sessions in range paired with their record counts, for the calendar.
pub async fn counts_between(
    pool: &PgPool,
    from: NaiveDate,
    to: NaiveDate,
    batch_id: Option<Uuid>,
) -> Result<Vec<(AttendanceSession, i64)>, AppError> {
    let sessions = list_between(pool, from, to, batch_id).await?;
    if sessions.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = sessions.iter().map(|s| s.id).collect();
    let rows = sqlx::query(
        r#"
        SELECT session_id, COUNT(*) AS present
        FROM training_dashboard.attendance_records
        WHERE session_id = ANY($1)
        GROUP BY session_id
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await
    .or_fail("load attendance counts")?;

    let counts: std::collections::HashMap<Uuid, i64> = rows
        .into_iter()
        .map(|row| (row.get("session_id"), row.get("present")))
        .collect();

    Ok(sessions
        .into_iter()
        .map(|session| {
            let count = counts.get(&session.id).copied().unwrap_or(0);
            (session, count)
        })
        .collect())
}

pub async fn find_for_date(
    pool: &PgPool,
    date: NaiveDate,
    batch_id: Option<Uuid>,
) -> Result<Option<AttendanceSession>, AppError> {
    Ok(list_between(pool, date, date, batch_id).await?.into_iter().next())
}

pub async fn update(
    pool: &PgPool,
    session: &AttendanceSession,
    name: Option<&str>,
    date: Option<NaiveDate>,
) -> Result<AttendanceSession, AppError> {
    let date = date.unwrap_or(session.session_date);
    let query = format!(
        "UPDATE training_dashboard.attendance_sessions AS s \
         SET name = COALESCE($2, s.name), session_date = $3, expires_at = $4 \
         WHERE s.id = $1 \
         RETURNING {SESSION_COLUMNS}"
    );
    sqlx::query_as::<_, AttendanceSession>(&query)
        .bind(session.id)
        .bind(name)
        .bind(date)
        .bind(sessions::end_of_day(date))
        .fetch_one(pool)
        .await
        .map_err(|err| match sessions::conflict(&err) {
            Some(SessionConflict::Date) => AppError::AlreadyExists(format!(
                "An attendance session already exists for this batch on {date}"
            )),
            _ => backend_failure("update session", err),
        })
}

pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), AppError> {
    sqlx::query("UPDATE training_dashboard.attendance_sessions SET is_active = $2 WHERE id = $1")
        .bind(id)
        .bind(is_active)
        .execute(pool)
        .await
        .or_fail("update session")?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query("DELETE FROM training_dashboard.attendance_sessions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .or_fail("delete session")?;
    Ok(())
}

pub async fn records(pool: &PgPool, session_id: Uuid) -> Result<Vec<AttendanceRecord>, AppError> {
    sqlx::query_as::<_, AttendanceRecord>(
        r#"
        SELECT id, session_id, student_name, marked_at, status
        FROM training_dashboard.attendance_records
        WHERE session_id = $1
        ORDER BY marked_at ASC
        "#,
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
    .or_fail("load attendance records")
}

/// Append-only insert from the public marking form. Names on the batch
/// roster are stored with the roster's spelling.
pub async fn mark_present(
    pool: &PgPool,
    session: &AttendanceSession,
    student_name: &str,
) -> Result<AttendanceRecord, AppError> {
    if student_name.trim().is_empty() {
        return Err(AppError::Invalid("student name cannot be empty".to_string()));
    }
    let roster = batches::list_students(pool, session.batch_id).await?;
    let student_name =
        sessions::roster_spelling(roster.iter().map(|s| s.name.as_str()), student_name);
    sqlx::query_as::<_, AttendanceRecord>(
        r#"
        INSERT INTO training_dashboard.attendance_records (id, session_id, student_name)
        VALUES ($1, $2, $3)
        RETURNING id, session_id, student_name, marked_at, status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session.id)
    .bind(student_name)
    .fetch_one(pool)
    .await
    .or_duplicate("mark attendance", || {
        format!("{student_name} is already marked present for {}", session.name)
    })
}
