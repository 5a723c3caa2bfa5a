//! Expiring public share links for batch statistics, plus the public gate
//! for leaderboards and activeness boards.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::PublicAccessError;
use crate::models::BatchPublicUrl;

pub const LINK_TTL_HOURS: i64 = 24;

const LINK_SUBJECT: &str = "This share link";
pub const BOARD_SUBJECT: &str = "This board";

/// Batch id prefix plus a base36 millisecond timestamp.
pub fn generate_public_id(batch_id: Uuid, now: DateTime<Utc>) -> String {
    let prefix: String = batch_id.simple().to_string().chars().take(8).collect();
    let millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
    format!("{prefix}-{}", to_base36(millis))
}

pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(LINK_TTL_HOURS)
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

/// Revocation is reported ahead of expiry.
pub fn classify(
    link: Option<&BatchPublicUrl>,
    now: DateTime<Utc>,
) -> Result<&BatchPublicUrl, PublicAccessError> {
    let link = link.ok_or(PublicAccessError::NotFound(LINK_SUBJECT))?;
    if !link.is_active {
        return Err(PublicAccessError::Revoked(LINK_SUBJECT));
    }
    if now >= link.expires_at {
        return Err(PublicAccessError::Expired(LINK_SUBJECT));
    }
    Ok(link)
}

pub fn is_live(link: &BatchPublicUrl, now: DateTime<Utc>) -> bool {
    classify(Some(link), now).is_ok()
}

/// First active and unexpired link, in the order given (newest first from the backend).
pub fn active_link(links: &[BatchPublicUrl], now: DateTime<Utc>) -> Option<&BatchPublicUrl> {
    links.iter().find(|link| is_live(link, now))
}

pub fn status_label(link: &BatchPublicUrl, now: DateTime<Utc>) -> &'static str {
    match classify(Some(link), now) {
        Ok(_) => "active",
        Err(PublicAccessError::Revoked(_)) => "revoked",
        Err(_) => "expired",
    }
}

/// Boards have no expiry; they are either published or not.
pub fn check_board(is_public: Option<bool>) -> Result<(), PublicAccessError> {
    match is_public {
        None => Err(PublicAccessError::NotFound(BOARD_SUBJECT)),
        Some(false) => Err(PublicAccessError::Revoked(BOARD_SUBJECT)),
        Some(true) => Ok(()),
    }
}

pub fn public_url(public_base_url: &str, kind: &str, public_id: &str) -> String {
    format!(
        "{}/public/{kind}/{public_id}",
        public_base_url.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn link(is_active: bool, created_at: DateTime<Utc>) -> BatchPublicUrl {
        let batch_id = Uuid::new_v4();
        BatchPublicUrl {
            id: Uuid::new_v4(),
            batch_id,
            public_id: generate_public_id(batch_id, created_at),
            is_active,
            expires_at: expiry_for(created_at),
            last_accessed_at: None,
            created_at,
        }
    }

    #[test]
    fn public_id_uses_batch_prefix() {
        let batch_id = Uuid::parse_str("6a2f0e91-7c4d-4b8a-a3e5-1d9c8b7f2e40").unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let id = generate_public_id(batch_id, now);
        assert!(id.starts_with("6a2f0e91-"));
        assert_eq!(id, format!("6a2f0e91-{}", to_base36(1_767_225_600_000)));
    }

    #[test]
    fn base36_encodes() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }

    #[test]
    fn revoked_link_is_not_reported_missing() {
        let now = Utc::now();
        let mut revoked = link(true, now);
        revoked.is_active = false;
        assert_eq!(
            classify(Some(&revoked), now).unwrap_err(),
            PublicAccessError::Revoked(LINK_SUBJECT)
        );
        assert_eq!(
            classify(None, now).unwrap_err(),
            PublicAccessError::NotFound(LINK_SUBJECT)
        );
    }

    #[test]
    fn link_expires_after_a_day() {
        let created = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let fresh = link(true, created);
        assert!(classify(Some(&fresh), created + Duration::hours(23)).is_ok());
        assert_eq!(
            classify(Some(&fresh), created + Duration::hours(24)).unwrap_err(),
            PublicAccessError::Expired(LINK_SUBJECT)
        );
    }

    #[test]
    fn revocation_takes_precedence_over_expiry() {
        let created = Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap();
        let stale = link(false, created);
        assert_eq!(
            classify(Some(&stale), created + Duration::days(3)).unwrap_err(),
            PublicAccessError::Revoked(LINK_SUBJECT)
        );
    }

    #[test]
    fn active_link_skips_dead_ones() {
        let now = Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap();
        let revoked = link(false, now - Duration::hours(1));
        let expired = link(true, now - Duration::hours(30));
        let live = link(true, now - Duration::hours(2));
        let older_live = link(true, now - Duration::hours(5));
        let links = vec![revoked, expired, live.clone(), older_live];

        let found = active_link(&links, now).unwrap();
        assert_eq!(found.id, live.id);
        assert!(active_link(&links[..2], now).is_none());
    }

    #[test]
    fn board_gate() {
        assert!(check_board(Some(true)).is_ok());
        assert!(matches!(check_board(Some(false)), Err(PublicAccessError::Revoked(_))));
        assert!(matches!(check_board(None), Err(PublicAccessError::NotFound(_))));
    }
}
