//! Public read-only views and the attendance marking form, served as JSON.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::AppConfig;
use crate::db;
use crate::error::{AppError, PublicAccessError};
use crate::links;
use crate::models::{BatchOverview, InterviewRound, ModuleScore};
use crate::ranking::{self, ActivenessSummary, LeaderboardSummary, StudentAverage};
use crate::sessions;
use crate::stats::{self, StudentStats};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
}

#[derive(Debug)]
pub enum ApiError {
    Access(PublicAccessError),
    App(AppError),
}

impl From<PublicAccessError> for ApiError {
    fn from(err: PublicAccessError) -> Self {
        ApiError::Access(err)
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::App(AppError::Invalid(rejection.body_text()))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    reason: &'static str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Access(PublicAccessError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Access(PublicAccessError::Revoked(_) | PublicAccessError::Expired(_)) => {
                StatusCode::GONE
            }
            ApiError::App(AppError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ApiError::App(AppError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::App(AppError::Invalid(_)) => StatusCode::BAD_REQUEST,
            ApiError::App(AppError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ApiError::App(AppError::Backend { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ApiError::Access(PublicAccessError::NotFound(_)) => "not_found",
            ApiError::Access(PublicAccessError::Revoked(_)) => "revoked",
            ApiError::Access(PublicAccessError::Expired(_)) => "expired",
            ApiError::App(AppError::AlreadyExists(_)) => "already_exists",
            ApiError::App(AppError::NotFound(_)) => "not_found",
            ApiError::App(AppError::Invalid(_)) => "invalid",
            ApiError::App(AppError::Forbidden { .. }) => "forbidden",
            ApiError::App(AppError::Backend { .. }) => "backend",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Access(err) => err.to_string(),
            ApiError::App(err) => err.to_string(),
        };
        let body = ErrorBody {
            error: message,
            reason: self.reason(),
        };
        (self.status(), Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/public/batch/:public_id", get(batch_view))
        .route("/public/leaderboard/:public_id", get(leaderboard_view))
        .route("/public/activeness/:public_id", get(activeness_view))
        .route("/attendance/:code", get(session_view).post(mark_attendance))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "public views listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct BatchView {
    pub batch_name: String,
    pub overview: BatchOverview,
    pub students: Vec<StudentStats>,
    pub expires_at: chrono::DateTime<Utc>,
    pub refresh_secs: u64,
}

pub async fn batch_view(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> ApiResult<BatchView> {
    let link = db::links::find(&state.pool, &public_id).await?;
    let link = links::classify(link.as_ref(), Utc::now()).map_err(|err| {
        warn!(%public_id, %err, "public batch view refused");
        err
    })?;

    let batch = db::batches::find(&state.pool, link.batch_id).await?;
    let overview = db::stats::overview(&state.pool, batch.id).await?;
    let students =
        stats::build_student_stats(db::stats::student_attendance(&state.pool, batch.id).await?);
    if let Err(err) = db::links::touch(&state.pool, link.id).await {
        warn!(%public_id, %err, "could not record share link access");
    }

    Ok(Json(BatchView {
        batch_name: batch.name,
        overview,
        students,
        expires_at: link.expires_at,
        refresh_secs: state.config.public_refresh_secs,
    }))
}

#[derive(Debug, Serialize)]
pub struct LeaderboardView {
    pub name: String,
    pub description: String,
    pub summary: LeaderboardSummary,
    pub rounds: Vec<InterviewRound>,
}

pub async fn leaderboard_view(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> ApiResult<LeaderboardView> {
    let board = db::boards::leaderboard_by_public_id(&state.pool, &public_id).await?;
    links::check_board(board.as_ref().map(|b| b.is_public))?;
    let Some(board) = board else {
        return Err(PublicAccessError::NotFound(links::BOARD_SUBJECT).into());
    };

    let rounds = db::boards::rounds(&state.pool, board.id).await?;
    Ok(Json(LeaderboardView {
        name: board.name,
        description: board.description,
        summary: ranking::summarize_rounds(&rounds),
        rounds,
    }))
}

#[derive(Debug, Serialize)]
pub struct ActivenessView {
    pub name: String,
    pub description: String,
    pub summary: ActivenessSummary,
    pub ranking: Vec<StudentAverage>,
    pub scores: Vec<ModuleScore>,
}

pub async fn activeness_view(
    State(state): State<AppState>,
    Path(public_id): Path<String>,
) -> ApiResult<ActivenessView> {
    let board = db::boards::activeness_board_by_public_id(&state.pool, &public_id).await?;
    links::check_board(board.as_ref().map(|b| b.is_public))?;
    let Some(board) = board else {
        return Err(PublicAccessError::NotFound(links::BOARD_SUBJECT).into());
    };

    let scores = db::boards::scores(&state.pool, board.id).await?;
    Ok(Json(ActivenessView {
        name: board.name,
        description: board.description,
        summary: ranking::summarize_scores(&scores),
        ranking: ranking::student_averages(&scores),
        scores,
    }))
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub name: String,
    pub session_date: NaiveDate,
    pub code: String,
    pub expires_at: chrono::DateTime<Utc>,
}

pub async fn session_view(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<SessionView> {
    let session = db::sessions::find_by_code(&state.pool, &code).await?;
    let session = sessions::check_markable(session.as_ref(), Utc::now())?;
    Ok(Json(SessionView {
        name: session.name.clone(),
        session_date: session.session_date,
        code: session.code.clone(),
        expires_at: session.expires_at,
    }))
}

#[derive(Debug, Deserialize)]
pub struct MarkAttendance {
    pub student_name: String,
}

#[derive(Debug, Serialize)]
pub struct MarkedView {
    pub student_name: String,
    pub session: String,
    pub marked_at: chrono::DateTime<Utc>,
}

pub async fn mark_attendance(
    State(state): State<AppState>,
    Path(code): Path<String>,
    form: Result<Json<MarkAttendance>, JsonRejection>,
) -> Result<(StatusCode, Json<MarkedView>), ApiError> {
    let Json(form) = form?;
    let session = db::sessions::find_by_code(&state.pool, &code).await?;
    let session = sessions::check_markable(session.as_ref(), Utc::now())?;
    let record = db::sessions::mark_present(&state.pool, session, &form.student_name).await?;
    tracing::info!(code = %session.code, student = %record.student_name, "attendance marked");
    Ok((
        StatusCode::CREATED,
        Json(MarkedView {
            student_name: record.student_name,
            session: session.name.clone(),
            marked_at: record.marked_at,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_errors_map_to_distinct_reasons() {
        let cases = [
            (PublicAccessError::NotFound("x"), StatusCode::NOT_FOUND, "not_found"),
            (PublicAccessError::Revoked("x"), StatusCode::GONE, "revoked"),
            (PublicAccessError::Expired("x"), StatusCode::GONE, "expired"),
        ];
        for (err, status, reason) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.reason(), reason);
        }
    }

    #[test]
    fn duplicate_marking_is_a_conflict() {
        let api = ApiError::from(AppError::AlreadyExists("already marked".to_string()));
        assert_eq!(api.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_marking_body_uses_error_body() {
        use axum::body::Body;
        use axum::extract::FromRequest;
        use axum::http::{header, Request};

        let request = Request::builder()
            .method("POST")
            .uri("/attendance/ABC123")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"student_name\": "))
            .unwrap();
        let rejection = Json::<MarkAttendance>::from_request(request, &())
            .await
            .unwrap_err();

        let response = ApiError::from(rejection).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["reason"], "invalid");
        assert!(body["error"].as_str().unwrap().starts_with("Invalid input: "));
    }

    #[test]
    fn backend_failures_stay_generic() {
        let api = ApiError::from(AppError::Backend {
            action: "load batch overview",
            source: sqlx::Error::RowNotFound,
        });
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.reason(), "backend");
    }
}
