use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// The authenticated user as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
}

// Phone-only accounts come back with `"email": null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }

    pub fn display_name(&self) -> &str {
        if self.email.is_empty() {
            &self.id
        } else {
            &self.email
        }
    }
}

/// A live session issued by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: Identity,
}

impl Session {
    /// Seconds before `expires_at` at which a session counts as expiring.
    pub const EXPIRY_MARGIN_SECS: i64 = 60;

    pub fn is_expired(&self) -> bool {
        self.is_expiring_at(Utc::now())
    }

    pub fn is_expiring_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(Self::EXPIRY_MARGIN_SECS) >= self.expires_at
    }

    /// Time left until the session should be refreshed.
    pub fn refresh_in(&self, now: DateTime<Utc>) -> std::time::Duration {
        let deadline = self.expires_at - Duration::seconds(Self::EXPIRY_MARGIN_SECS);
        (deadline - now).to_std().unwrap_or_default()
    }

    pub fn same_user(&self, other: &Session) -> bool {
        self.user.id == other.user.id
    }
}
