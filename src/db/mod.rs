pub mod batches;
pub mod boards;
pub mod links;
pub mod roles;
pub mod sessions;
pub mod stats;

use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let url = config.require_database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    tracing::info!(max_connections = config.max_connections, "connected to Postgres");
    Ok(pool)
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Demo data: one batch, two students, three sessions, one of each board.
pub async fn seed(pool: &PgPool, operator_email: Option<&str>) -> anyhow::Result<()> {
    let batch_id = Uuid::parse_str("6a2f0e91-7c4d-4b8a-a3e5-1d9c8b7f2e40")?;
    sqlx::query(
        r#"
        INSERT INTO training_dashboard.batches (id, name, description, created_by)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(batch_id)
    .bind("Cohort Alpha")
    .bind("Spring backend engineering cohort")
    .bind(operator_email)
    .execute(pool)
    .await?;

    let students = [
        ("Mina Okafor", "mina.okafor@example.com"),
        ("Tomas Rieger", "tomas.rieger@example.com"),
    ];
    for (name, email) in students {
        sqlx::query(
            r#"
            INSERT INTO training_dashboard.batch_students (id, batch_id, name, email)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (batch_id, name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v5(&batch_id, name.as_bytes()))
        .bind(batch_id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let sessions = vec![
        ("SEED01", NaiveDate::from_ymd_opt(2026, 2, 2).context("invalid date")?),
        ("SEED02", NaiveDate::from_ymd_opt(2026, 2, 3).context("invalid date")?),
        ("SEED03", NaiveDate::from_ymd_opt(2026, 2, 4).context("invalid date")?),
    ];
    for (index, (code, date)) in sessions.iter().enumerate() {
        let session_id = Uuid::new_v5(&batch_id, code.as_bytes());
        sqlx::query(
            r#"
            INSERT INTO training_dashboard.attendance_sessions
            (id, session_date, code, name, batch_id, is_active, expires_at, public_id)
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(date)
        .bind(code)
        .bind(crate::sessions::default_name("Cohort Alpha", *date))
        .bind(batch_id)
        .bind(crate::sessions::end_of_day(*date))
        .bind(format!("seed-session-{}", index + 1))
        .execute(pool)
        .await?;

        // Mina attends every session, Tomas only the first.
        let attendees: &[&str] = if index == 0 {
            &["Mina Okafor", "Tomas Rieger"]
        } else {
            &["Mina Okafor"]
        };
        for name in attendees {
            sqlx::query(
                r#"
                INSERT INTO training_dashboard.attendance_records
                (id, session_id, student_name)
                VALUES ($1, $2, $3)
                ON CONFLICT (session_id, student_name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(session_id)
            .bind(name)
            .execute(pool)
            .await?;
        }
    }

    let leaderboard_id = Uuid::parse_str("9b1c7c7e-5a0e-4d0f-9f55-2b6f0c6c1a01")?;
    sqlx::query(
        r#"
        INSERT INTO training_dashboard.leaderboards (id, name, description, public_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(leaderboard_id)
    .bind("Mock Interviews")
    .bind("Weekly mock interview scores")
    .bind("seed-leaderboard")
    .execute(pool)
    .await?;

    let rounds = vec![
        ("Mina Okafor", 88, "Priya Nair", 1, "Strong system design"),
        ("Tomas Rieger", 72, "Sam Ortiz", 1, "Needs work on testing"),
        ("Mina Okafor", 91, "Sam Ortiz", 2, "Clear communication"),
    ];
    for (student, score, interviewer, round_number, notes) in rounds {
        let key = format!("{student}-{round_number}");
        sqlx::query(
            r#"
            INSERT INTO training_dashboard.interview_rounds
            (id, leaderboard_id, student_name, score, interviewer, round_number, interview_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v5(&leaderboard_id, key.as_bytes()))
        .bind(leaderboard_id)
        .bind(student)
        .bind(score)
        .bind(interviewer)
        .bind(round_number)
        .bind(NaiveDate::from_ymd_opt(2026, 2, 6).context("invalid date")?)
        .bind(notes)
        .execute(pool)
        .await?;
    }

    let board_id = Uuid::parse_str("4e2d8f10-7a3b-4c6e-8d21-6f5a9b0c3e02")?;
    sqlx::query(
        r#"
        INSERT INTO training_dashboard.activeness_boards (id, name, description, public_id)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(board_id)
    .bind("Module Engagement")
    .bind("Participation per module")
    .bind("seed-activeness")
    .execute(pool)
    .await?;

    let scores = vec![
        ("Mina Okafor", "Rust Basics", 9),
        ("Mina Okafor", "Async", 8),
        ("Tomas Rieger", "Rust Basics", 6),
    ];
    for (student, module_name, score) in scores {
        let key = format!("{student}-{module_name}");
        sqlx::query(
            r#"
            INSERT INTO training_dashboard.module_scores
            (id, board_id, student_name, module_name, score)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v5(&board_id, key.as_bytes()))
        .bind(board_id)
        .bind(student)
        .bind(module_name)
        .bind(score)
        .execute(pool)
        .await?;
    }

    if let Some(email) = operator_email {
        sqlx::query(
            r#"
            INSERT INTO training_dashboard.user_roles (email, role)
            VALUES ($1, 'admin')
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email.trim().to_lowercase())
        .execute(pool)
        .await?;
    }

    Ok(())
}
