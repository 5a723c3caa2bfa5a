use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, BackendResultExt};
use crate::links;
use crate::models::BatchPublicUrl;

const LINK_COLUMNS: &str =
    "id, batch_id, public_id, is_active, expires_at, last_accessed_at, created_at";

pub async fn create(pool: &PgPool, batch_id: Uuid) -> Result<BatchPublicUrl, AppError> {
    let now = Utc::now();
    let query = format!(
        "INSERT INTO training_dashboard.batch_public_urls \
         (id, batch_id, public_id, is_active, expires_at, created_at) \
         VALUES ($1, $2, $3, TRUE, $4, $5) \
         RETURNING {LINK_COLUMNS}"
    );
    let link = sqlx::query_as::<_, BatchPublicUrl>(&query)
        .bind(Uuid::new_v4())
        .bind(batch_id)
        .bind(links::generate_public_id(batch_id, now))
        .bind(links::expiry_for(now))
        .bind(now)
        .fetch_one(pool)
        .await
        .or_duplicate("create share link", || {
            "A share link was just generated for this batch; try again".to_string()
        })?;
    tracing::info!(%batch_id, public_id = %link.public_id, "share link created");
    Ok(link)
}

/// Newest first.
pub async fn list_for_batch(
    pool: &PgPool,
    batch_id: Uuid,
) -> Result<Vec<BatchPublicUrl>, AppError> {
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM training_dashboard.batch_public_urls \
         WHERE batch_id = $1 ORDER BY created_at DESC"
    );
    sqlx::query_as::<_, BatchPublicUrl>(&query)
        .bind(batch_id)
        .fetch_all(pool)
        .await
        .or_fail("load share links")
}

pub async fn find(pool: &PgPool, public_id: &str) -> Result<Option<BatchPublicUrl>, AppError> {
    let query = format!(
        "SELECT {LINK_COLUMNS} FROM training_dashboard.batch_public_urls WHERE public_id = $1"
    );
    sqlx::query_as::<_, BatchPublicUrl>(&query)
        .bind(public_id)
        .fetch_optional(pool)
        .await
        .or_fail("load share link")
}

pub async fn revoke(pool: &PgPool, public_id: &str) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE training_dashboard.batch_public_urls SET is_active = FALSE WHERE public_id = $1",
    )
    .bind(public_id)
    .execute(pool)
    .await
    .or_fail("revoke share link")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Share link {public_id}")));
    }
    tracing::info!(%public_id, "share link revoked");
    Ok(())
}

pub async fn touch(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE training_dashboard.batch_public_urls SET last_accessed_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .or_fail("record share link access")?;
    Ok(())
}
