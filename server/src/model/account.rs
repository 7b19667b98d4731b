use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A connected mailbox with decrypted credentials
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub history_id: Option<String>,
    pub watch_expiration: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn has_watch(&self) -> bool {
        self.watch_expiration.is_some_and(|exp| exp > Utc::now())
    }

    /// Watches last at most seven days and must be renewed before they lapse
    pub fn watch_expires_within(&self, window: chrono::Duration) -> bool {
        match self.watch_expiration {
            Some(exp) => exp - Utc::now() < window,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(watch_expiration: Option<DateTime<Utc>>) -> Account {
        Account {
            user_id: Uuid::new_v4(),
            email: "ann@example.com".to_string(),
            access_token: None,
            refresh_token: None,
            history_id: None,
            watch_expiration,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_watch_expiry_window() {
        let day = chrono::Duration::hours(24);
        assert!(account(None).watch_expires_within(day));
        assert!(account(Some(Utc::now() + chrono::Duration::hours(2))).watch_expires_within(day));
        assert!(!account(Some(Utc::now() + chrono::Duration::days(6))).watch_expires_within(day));
        assert!(!account(Some(Utc::now() - chrono::Duration::hours(1))).has_watch());
    }
}
