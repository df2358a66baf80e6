use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BoardId, UserHash};

/// Per-board binding of an identity to a display alias.
/// At most one exists per `(board_id, user_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub board_id: BoardId,
    pub user_hash: UserHash,
    pub alias: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl UserSession {
    pub fn new(board_id: BoardId, user_hash: UserHash, alias: String, is_admin: bool) -> Self {
        let now = Utc::now();
        Self {
            board_id,
            user_hash,
            alias,
            is_admin,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_active_at <= window
    }
}

/// Public view of a session; the identity hash is not exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveUser {
    pub alias: String,
    pub is_admin: bool,
    pub last_active_at: DateTime<Utc>,
}

impl From<UserSession> for ActiveUser {
    fn from(s: UserSession) -> Self {
        Self {
            alias: s.alias,
            is_admin: s.is_admin,
            last_active_at: s.last_active_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_active_within_window() {
        let mut session = UserSession::new(
            BoardId::generate(),
            UserHash::new("u1"),
            "Ada".to_string(),
            false,
        );
        let now = Utc::now();
        session.last_active_at = now - Duration::seconds(30);
        assert!(session.is_active(now, Duration::seconds(120)));

        session.last_active_at = now - Duration::seconds(300);
        assert!(!session.is_active(now, Duration::seconds(120)));
    }
}
