use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, BackendResultExt};
use crate::models::{Batch, BatchStudent};

const BATCH_COLUMNS: &str =
    "id, name, description, is_active, created_by, created_at, updated_at";

pub async fn list(pool: &PgPool, include_inactive: bool) -> Result<Vec<Batch>, AppError> {
    let query = format!(
        "SELECT {BATCH_COLUMNS} FROM training_dashboard.batches \
         WHERE is_active OR $1 \
         ORDER BY created_at DESC"
    );
    sqlx::query_as::<_, Batch>(&query)
        .bind(include_inactive)
        .fetch_all(pool)
        .await
        .or_fail("load batches")
}

pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Batch, AppError> {
    let query = format!("SELECT {BATCH_COLUMNS} FROM training_dashboard.batches WHERE name = $1");
    sqlx::query_as::<_, Batch>(&query)
        .bind(name)
        .fetch_optional(pool)
        .await
        .or_fail("load batch")?
        .ok_or_else(|| AppError::NotFound(format!("Batch '{name}'")))
}

pub async fn find(pool: &PgPool, id: Uuid) -> Result<Batch, AppError> {
    let query = format!("SELECT {BATCH_COLUMNS} FROM training_dashboard.batches WHERE id = $1");
    sqlx::query_as::<_, Batch>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .or_fail("load batch")?
        .ok_or_else(|| AppError::NotFound(format!("Batch {id}")))
}

pub async fn create(
    pool: &PgPool,
    name: &str,
    description: &str,
    created_by: Option<&str>,
) -> Result<Batch, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Invalid("batch name cannot be empty".to_string()));
    }
    let query = format!(
        "INSERT INTO training_dashboard.batches (id, name, description, created_by) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {BATCH_COLUMNS}"
    );
    sqlx::query_as::<_, Batch>(&query)
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(description)
        .bind(created_by)
        .fetch_one(pool)
        .await
        .or_duplicate("create batch", || format!("A batch named '{name}' already exists"))
}

pub async fn update(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Batch, AppError> {
    let query = format!(
        "UPDATE training_dashboard.batches \
         SET name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             updated_at = NOW() \
         WHERE id = $1 \
         RETURNING {BATCH_COLUMNS}"
    );
    sqlx::query_as::<_, Batch>(&query)
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_optional(pool)
        .await
        .or_duplicate("update batch", || {
            format!("A batch named '{}' already exists", name.unwrap_or_default())
        })?
        .ok_or_else(|| AppError::NotFound(format!("Batch {id}")))
}

pub async fn set_active(pool: &PgPool, id: Uuid, is_active: bool) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE training_dashboard.batches SET is_active = $2, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(is_active)
    .execute(pool)
    .await
    .or_fail("update batch")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Batch {id}")));
    }
    Ok(())
}

/// Students, sessions, records and share links go with it.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM training_dashboard.batches WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .or_fail("delete batch")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Batch {id}")));
    }
    Ok(())
}

pub async fn list_students(pool: &PgPool, batch_id: Uuid) -> Result<Vec<BatchStudent>, AppError> {
    sqlx::query_as::<_, BatchStudent>(
        r#"
        SELECT id, batch_id, name, email, created_at
        FROM training_dashboard.batch_students
        WHERE batch_id = $1
        ORDER BY name ASC
        "#,
    )
    .bind(batch_id)
    .fetch_all(pool)
    .await
    .or_fail("load students")
}

pub async fn add_student(
    pool: &PgPool,
    batch: &Batch,
    name: &str,
    email: Option<&str>,
) -> Result<BatchStudent, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Invalid("student name cannot be empty".to_string()));
    }
    sqlx::query_as::<_, BatchStudent>(
        r#"
        INSERT INTO training_dashboard.batch_students (id, batch_id, name, email)
        VALUES ($1, $2, $3, $4)
        RETURNING id, batch_id, name, email, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(batch.id)
    .bind(name)
    .bind(email.map(str::trim).filter(|e| !e.is_empty()))
    .fetch_one(pool)
    .await
    .or_duplicate("add student", || {
        format!("{name} is already enrolled in {}", batch.name)
    })
}

pub async fn remove_student(pool: &PgPool, batch_id: Uuid, name: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        "DELETE FROM training_dashboard.batch_students WHERE batch_id = $1 AND name = $2",
    )
    .bind(batch_id)
    .bind(name)
    .execute(pool)
    .await
    .or_fail("remove student")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Student '{name}'")));
    }
    Ok(())
}
