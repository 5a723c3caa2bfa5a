use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::error::{self, AppError, PublicAccessError};
use crate::models::AttendanceSession;

const CODE_LEN: usize = 6;
const SESSION_SUBJECT: &str = "This attendance session";

const DATE_CONSTRAINT: &str = "attendance_sessions_batch_date_key";
const CODE_CONSTRAINT: &str = "attendance_sessions_code_key";
const PUBLIC_ID_CONSTRAINT: &str = "attendance_sessions_public_id_key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Inactive,
    Expired,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Active => "active",
            SessionState::Inactive => "inactive",
            SessionState::Expired => "expired",
        }
    }
}

/// Short uppercase code students type into the marking form.
pub fn generate_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(CODE_LEN)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Last second of `date` in UTC.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default()).and_utc();
    midnight + Duration::days(1) - Duration::seconds(1)
}

pub fn state(session: &AttendanceSession, now: DateTime<Utc>) -> SessionState {
    if !session.is_active {
        SessionState::Inactive
    } else if now > session.expires_at {
        SessionState::Expired
    } else {
        SessionState::Active
    }
}

/// Gate for the public marking form.
pub fn check_markable(
    session: Option<&AttendanceSession>,
    now: DateTime<Utc>,
) -> Result<&AttendanceSession, PublicAccessError> {
    let session = session.ok_or(PublicAccessError::NotFound(SESSION_SUBJECT))?;
    match state(session, now) {
        SessionState::Active => Ok(session),
        SessionState::Inactive => Err(PublicAccessError::Revoked(SESSION_SUBJECT)),
        SessionState::Expired => Err(PublicAccessError::Expired(SESSION_SUBJECT)),
    }
}

pub fn share_url(public_base_url: &str, code: &str) -> String {
    format!("{}/attendance/{}", public_base_url.trim_end_matches('/'), code)
}

pub fn default_name(batch_name: &str, date: NaiveDate) -> String {
    format!("{batch_name} {}", date.format("%a %d %b %Y"))
}

pub fn duplicate_message(batch_name: &str, date: NaiveDate) -> String {
    format!("An attendance session already exists for {batch_name} on {date}")
}

/// Which unique constraint a session write ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionConflict {
    /// The batch already has a session on that date.
    Date,
    /// A generated code or public id is already taken.
    Generated,
}

pub fn conflict(err: &sqlx::Error) -> Option<SessionConflict> {
    match error::unique_constraint(err)? {
        DATE_CONSTRAINT => Some(SessionConflict::Date),
        CODE_CONSTRAINT | PUBLIC_ID_CONSTRAINT => Some(SessionConflict::Generated),
        _ => None,
    }
}

/// Error for a session insert that will not be retried.
pub fn insert_failure(err: sqlx::Error, batch_name: &str, date: NaiveDate) -> AppError {
    match conflict(&err) {
        Some(SessionConflict::Date) => AppError::AlreadyExists(duplicate_message(batch_name, date)),
        _ => error::backend_failure("create session", err),
    }
}

/// The roster's spelling of `typed`, compared case-insensitively after
/// trimming. Names not on the roster are kept as typed.
pub fn roster_spelling<'a>(roster: impl IntoIterator<Item = &'a str>, typed: &'a str) -> &'a str {
    let typed = typed.trim();
    roster
        .into_iter()
        .find(|name| name.trim().to_lowercase() == typed.to_lowercase())
        .unwrap_or(typed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::tests::{db_error, unique_violation_on};
    use chrono::TimeZone;

    fn session(is_active: bool, date: NaiveDate) -> AttendanceSession {
        AttendanceSession {
            id: Uuid::new_v4(),
            session_date: date,
            code: "ABC123".to_string(),
            name: "Day one".to_string(),
            batch_id: Uuid::new_v4(),
            is_active,
            expires_at: end_of_day(date),
            public_id: "pub".to_string(),
            created_at: Utc::now(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn codes_are_short_and_uppercase() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn expiry_is_last_second_of_day() {
        let expiry = end_of_day(date(2026, 2, 28));
        assert_eq!(expiry, Utc.with_ymd_and_hms(2026, 2, 28, 23, 59, 59).unwrap());
    }

    #[test]
    fn state_follows_flag_then_expiry() {
        let day = date(2026, 3, 2);
        let during = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap();

        assert_eq!(state(&session(true, day), during), SessionState::Active);
        assert_eq!(state(&session(true, day), after), SessionState::Expired);
        assert_eq!(state(&session(false, day), during), SessionState::Inactive);
        assert_eq!(state(&session(false, day), after), SessionState::Inactive);
    }

    #[test]
    fn marking_requires_an_open_session() {
        let day = date(2026, 3, 2);
        let during = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();

        assert!(check_markable(Some(&session(true, day)), during).is_ok());
        assert!(matches!(
            check_markable(None, during),
            Err(PublicAccessError::NotFound(_))
        ));
        assert!(matches!(
            check_markable(Some(&session(false, day)), during),
            Err(PublicAccessError::Revoked(_))
        ));
        assert!(matches!(
            check_markable(Some(&session(true, day)), after),
            Err(PublicAccessError::Expired(_))
        ));
    }

    #[test]
    fn taken_date_reports_the_existing_session() {
        let day = date(2026, 3, 2);
        let err = insert_failure(unique_violation_on(DATE_CONSTRAINT), "Cohort Alpha", day);
        assert_eq!(
            err.to_string(),
            "An attendance session already exists for Cohort Alpha on 2026-03-02"
        );
        assert!(matches!(err, AppError::AlreadyExists(_)));
    }

    #[test]
    fn generated_value_collisions_are_not_date_duplicates() {
        let code = unique_violation_on(CODE_CONSTRAINT);
        let public_id = unique_violation_on(PUBLIC_ID_CONSTRAINT);
        assert_eq!(conflict(&code), Some(SessionConflict::Generated));
        assert_eq!(conflict(&public_id), Some(SessionConflict::Generated));
        assert_eq!(
            conflict(&unique_violation_on(DATE_CONSTRAINT)),
            Some(SessionConflict::Date)
        );

        let err = insert_failure(code, "Cohort Alpha", date(2026, 3, 2));
        assert!(matches!(err, AppError::Backend { .. }));
        assert_eq!(err.to_string(), "Failed to create session");
    }

    #[test]
    fn unnamed_unique_violations_are_not_classified() {
        assert_eq!(conflict(&db_error(crate::error::UNIQUE_VIOLATION)), None);
        assert_eq!(conflict(&sqlx::Error::RowNotFound), None);
    }

    #[test]
    fn marked_names_take_the_roster_spelling() {
        let roster = ["Mina Okafor", "Tomas Rieger"];
        assert_eq!(roster_spelling(roster, "  mina OKAFOR "), "Mina Okafor");
        assert_eq!(roster_spelling(roster, "Walk In"), "Walk In");
        assert_eq!(roster_spelling([], " Lena Park "), "Lena Park");
    }

    #[test]
    fn share_url_drops_trailing_slash() {
        assert_eq!(
            share_url("https://dash.example.com/", "XYZ789"),
            "https://dash.example.com/attendance/XYZ789"
        );
    }
}
