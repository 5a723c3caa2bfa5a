use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Batch {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BatchStudent {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttendanceSession {
    pub id: Uuid,
    pub session_date: NaiveDate,
    pub code: String,
    pub name: String,
    pub batch_id: Uuid,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub public_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub student_name: String,
    pub marked_at: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Leaderboard {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub public_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InterviewRound {
    pub id: Uuid,
    pub leaderboard_id: Uuid,
    pub student_name: String,
    pub score: i32,
    pub interviewer: String,
    pub round_number: i32,
    pub interview_date: NaiveDate,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ActivenessBoard {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub public_id: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ModuleScore {
    pub id: Uuid,
    pub board_id: Uuid,
    pub student_name: String,
    pub module_name: String,
    pub score: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BatchPublicUrl {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub public_id: String,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One row of `get_batch_attendance_stats`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StudentAttendanceRow {
    pub student_name: String,
    pub email: Option<String>,
    pub present_count: i64,
    pub total_sessions: i64,
    pub last_attended: Option<NaiveDate>,
}

/// The single row of `get_batch_overview`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct BatchOverview {
    pub student_count: i64,
    pub session_count: i64,
    pub average_attendance: f64,
    pub last_session_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserRole {
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}
