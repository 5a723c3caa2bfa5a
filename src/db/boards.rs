//! Leaderboards with their interview rounds, and activeness boards with
//! their module scores.

use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, BackendResultExt};
use crate::models::{ActivenessBoard, InterviewRound, Leaderboard, ModuleScore};
use crate::ranking;

const BOARD_COLUMNS: &str = "id, name, description, public_id, is_public, created_at";
const ROUND_COLUMNS: &str =
    "id, leaderboard_id, student_name, score, interviewer, round_number, interview_date, notes";
const SCORE_COLUMNS: &str = "id, board_id, student_name, module_name, score, created_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardKind {
    Leaderboard,
    Activeness,
}

impl BoardKind {
    fn table(self) -> &'static str {
        match self {
            BoardKind::Leaderboard => "training_dashboard.leaderboards",
            BoardKind::Activeness => "training_dashboard.activeness_boards",
        }
    }

    fn label(self) -> &'static str {
        match self {
            BoardKind::Leaderboard => "Leaderboard",
            BoardKind::Activeness => "Activeness board",
        }
    }
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Invalid("board name cannot be empty".to_string()));
    }
    Ok(name)
}

pub async fn create_leaderboard(
    pool: &PgPool,
    name: &str,
    description: &str,
) -> Result<Leaderboard, AppError> {
    let name = validate_name(name)?;
    let id = Uuid::new_v4();
    let query = format!(
        "INSERT INTO {} (id, name, description, public_id) VALUES ($1, $2, $3, $4) \
         RETURNING {BOARD_COLUMNS}",
        BoardKind::Leaderboard.table()
    );
    sqlx::query_as::<_, Leaderboard>(&query)
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(crate::links::generate_public_id(id, Utc::now()))
        .fetch_one(pool)
        .await
        .or_fail("create leaderboard")
}

pub async fn create_activeness_board(
    pool: &PgPool,
    name: &str,
    description: &str,
) -> Result<ActivenessBoard, AppError> {
    let name = validate_name(name)?;
    let id = Uuid::new_v4();
    let query = format!(
        "INSERT INTO {} (id, name, description, public_id) VALUES ($1, $2, $3, $4) \
         RETURNING {BOARD_COLUMNS}",
        BoardKind::Activeness.table()
    );
    sqlx::query_as::<_, ActivenessBoard>(&query)
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(crate::links::generate_public_id(id, Utc::now()))
        .fetch_one(pool)
        .await
        .or_fail("create activeness board")
}

pub async fn list_leaderboards(pool: &PgPool) -> Result<Vec<Leaderboard>, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} ORDER BY created_at DESC",
        BoardKind::Leaderboard.table()
    );
    sqlx::query_as::<_, Leaderboard>(&query)
        .fetch_all(pool)
        .await
        .or_fail("load leaderboards")
}

pub async fn list_activeness_boards(pool: &PgPool) -> Result<Vec<ActivenessBoard>, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} ORDER BY created_at DESC",
        BoardKind::Activeness.table()
    );
    sqlx::query_as::<_, ActivenessBoard>(&query)
        .fetch_all(pool)
        .await
        .or_fail("load activeness boards")
}

pub async fn leaderboard(pool: &PgPool, id: Uuid) -> Result<Leaderboard, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} WHERE id = $1",
        BoardKind::Leaderboard.table()
    );
    sqlx::query_as::<_, Leaderboard>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .or_fail("load leaderboard")?
        .ok_or_else(|| AppError::NotFound(format!("Leaderboard {id}")))
}

pub async fn activeness_board(pool: &PgPool, id: Uuid) -> Result<ActivenessBoard, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} WHERE id = $1",
        BoardKind::Activeness.table()
    );
    sqlx::query_as::<_, ActivenessBoard>(&query)
        .bind(id)
        .fetch_optional(pool)
        .await
        .or_fail("load activeness board")?
        .ok_or_else(|| AppError::NotFound(format!("Activeness board {id}")))
}

pub async fn leaderboard_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<Leaderboard>, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} WHERE public_id = $1",
        BoardKind::Leaderboard.table()
    );
    sqlx::query_as::<_, Leaderboard>(&query)
        .bind(public_id)
        .fetch_optional(pool)
        .await
        .or_fail("load leaderboard")
}

pub async fn activeness_board_by_public_id(
    pool: &PgPool,
    public_id: &str,
) -> Result<Option<ActivenessBoard>, AppError> {
    let query = format!(
        "SELECT {BOARD_COLUMNS} FROM {} WHERE public_id = $1",
        BoardKind::Activeness.table()
    );
    sqlx::query_as::<_, ActivenessBoard>(&query)
        .bind(public_id)
        .fetch_optional(pool)
        .await
        .or_fail("load activeness board")
}

pub async fn set_public(
    pool: &PgPool,
    kind: BoardKind,
    id: Uuid,
    is_public: bool,
) -> Result<(), AppError> {
    let query = format!("UPDATE {} SET is_public = $2 WHERE id = $1", kind.table());
    let result = sqlx::query(&query)
        .bind(id)
        .bind(is_public)
        .execute(pool)
        .await
        .or_fail("update board")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} {id}", kind.label())));
    }
    Ok(())
}

pub async fn delete_board(pool: &PgPool, kind: BoardKind, id: Uuid) -> Result<(), AppError> {
    let query = format!("DELETE FROM {} WHERE id = $1", kind.table());
    let result = sqlx::query(&query)
        .bind(id)
        .execute(pool)
        .await
        .or_fail("delete board")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} {id}", kind.label())));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct NewRound<'a> {
    pub student_name: &'a str,
    pub score: i32,
    pub interviewer: &'a str,
    pub round_number: i32,
    pub interview_date: NaiveDate,
    pub notes: &'a str,
}

pub async fn add_round(
    pool: &PgPool,
    leaderboard_id: Uuid,
    round: NewRound<'_>,
) -> Result<InterviewRound, AppError> {
    ranking::validate_interview_score(round.score)?;
    ranking::validate_round_number(round.round_number)?;
    let query = format!(
        "INSERT INTO training_dashboard.interview_rounds ({ROUND_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {ROUND_COLUMNS}"
    );
    sqlx::query_as::<_, InterviewRound>(&query)
        .bind(Uuid::new_v4())
        .bind(leaderboard_id)
        .bind(round.student_name.trim())
        .bind(round.score)
        .bind(round.interviewer.trim())
        .bind(round.round_number)
        .bind(round.interview_date)
        .bind(round.notes)
        .fetch_one(pool)
        .await
        .or_fail("add interview round")
}

/// Highest score first.
pub async fn rounds(pool: &PgPool, leaderboard_id: Uuid) -> Result<Vec<InterviewRound>, AppError> {
    let query = format!(
        "SELECT {ROUND_COLUMNS} FROM training_dashboard.interview_rounds \
         WHERE leaderboard_id = $1 ORDER BY score DESC"
    );
    sqlx::query_as::<_, InterviewRound>(&query)
        .bind(leaderboard_id)
        .fetch_all(pool)
        .await
        .or_fail("load interview rounds")
}

pub async fn delete_round(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM training_dashboard.interview_rounds WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .or_fail("delete interview round")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Interview round {id}")));
    }
    Ok(())
}

pub async fn add_score(
    pool: &PgPool,
    board_id: Uuid,
    student_name: &str,
    module_name: &str,
    score: i32,
) -> Result<ModuleScore, AppError> {
    ranking::validate_module_score(score)?;
    let query = format!(
        "INSERT INTO training_dashboard.module_scores (id, board_id, student_name, module_name, score) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {SCORE_COLUMNS}"
    );
    sqlx::query_as::<_, ModuleScore>(&query)
        .bind(Uuid::new_v4())
        .bind(board_id)
        .bind(student_name.trim())
        .bind(module_name.trim())
        .bind(score)
        .fetch_one(pool)
        .await
        .or_fail("add module score")
}

/// Highest score first.
pub async fn scores(pool: &PgPool, board_id: Uuid) -> Result<Vec<ModuleScore>, AppError> {
    let query = format!(
        "SELECT {SCORE_COLUMNS} FROM training_dashboard.module_scores \
         WHERE board_id = $1 ORDER BY score DESC"
    );
    sqlx::query_as::<_, ModuleScore>(&query)
        .bind(board_id)
        .fetch_all(pool)
        .await
        .or_fail("load module scores")
}

pub async fn delete_score(pool: &PgPool, id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM training_dashboard.module_scores WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .or_fail("delete module score")?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Module score {id}")));
    }
    Ok(())
}
