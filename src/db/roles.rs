use sqlx::{PgPool, Row};

use crate::error::{AppError, BackendResultExt};
use crate::models::UserRole;
use crate::roles::{Operator, Role};

/// Resolves the operator's role. An empty roles table means nobody has been
/// granted anything yet, so the operator is treated as admin until the first
/// grant lands.
pub async fn resolve_operator(pool: &PgPool, email: Option<&str>) -> Result<Operator, AppError> {
    let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM training_dashboard.user_roles")
        .fetch_one(pool)
        .await
        .or_fail("load roles")?
        .get("total");

    if total == 0 {
        tracing::warn!("no roles granted yet; running with admin privileges");
        return Ok(Operator {
            email: email.map(str::to_string),
            role: Role::Admin,
        });
    }

    let role = match email {
        Some(email) => sqlx::query("SELECT role FROM training_dashboard.user_roles WHERE email = $1")
            .bind(email.trim().to_lowercase())
            .fetch_optional(pool)
            .await
            .or_fail("load role")?
            .map(|row| row.get::<String, _>("role").parse::<Role>())
            .transpose()?
            .unwrap_or(Role::Viewer),
        None => Role::Viewer,
    };

    tracing::debug!(email = email.unwrap_or("<none>"), %role, "operator resolved");
    Ok(Operator {
        email: email.map(str::to_string),
        role,
    })
}

pub async fn grant(pool: &PgPool, email: &str, role: Role) -> Result<(), AppError> {
    let email = email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::Invalid(format!("'{email}' is not an email address")));
    }
    sqlx::query(
        r#"
        INSERT INTO training_dashboard.user_roles (email, role)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        "#,
    )
    .bind(&email)
    .bind(role.as_str())
    .execute(pool)
    .await
    .or_fail("grant role")?;
    Ok(())
}

pub async fn revoke(pool: &PgPool, email: &str) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM training_dashboard.user_roles WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .execute(pool)
        .await
        .or_fail("revoke role")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Role for {email}")));
    }
    Ok(())
}

pub async fn list(pool: &PgPool) -> Result<Vec<UserRole>, AppError> {
    sqlx::query_as::<_, UserRole>(
        "SELECT email, role, created_at FROM training_dashboard.user_roles ORDER BY email",
    )
    .fetch_all(pool)
    .await
    .or_fail("load roles")
}
