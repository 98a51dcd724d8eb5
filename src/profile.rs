//! Profile records and authentication status.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timestamp;

const SECS_PER_DAY: f64 = 86_400.0;

/// A named authentication identity with its own browser state and library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable slug, unique within the registry.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Account email, if known.
    #[serde(default)]
    pub email: Option<String>,
    /// When the profile was created. Never changes.
    #[serde(with = "timestamp::epoch")]
    pub created_at: DateTime<Utc>,
    /// Last successful interactive login.
    #[serde(default, with = "timestamp::epoch_option")]
    pub authenticated_at: Option<DateTime<Utc>>,
    /// Last successful non-interactive validation.
    #[serde(default, with = "timestamp::epoch_option")]
    pub last_validated: Option<DateTime<Utc>>,
}

impl Profile {
    /// New, unauthenticated profile.
    pub fn new(id: impl Into<String>, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            created_at,
            authenticated_at: None,
            last_validated: None,
        }
    }

    /// Time since the last login, as of `now`.
    pub fn auth_age_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.authenticated_at
            .map(|at| (now - at).to_std().unwrap_or(Duration::ZERO))
    }

    /// Authentication status as of `now`.
    pub fn status_at(&self, now: DateTime<Utc>, thresholds: &ExpiryThresholds) -> AuthStatus {
        match self.auth_age_at(now) {
            None => AuthStatus::NotAuthenticated,
            Some(age) if age > thresholds.expiry => AuthStatus::Expired,
            Some(age) if age > thresholds.warning => AuthStatus::ExpiringSoon,
            Some(_) => AuthStatus::Valid,
        }
    }
}

/// Derive a profile id from a display name.
///
/// Lowercases and maps spaces and underscores to hyphens; nothing else is
/// rewritten.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

/// Whether `id` is usable as a profile directory name.
///
/// Ids are restricted to `[a-z0-9-]`, so they never carry separators or
/// dot segments and always name a direct child of `profiles/`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Login age thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryThresholds {
    /// Older than this is expired.
    pub expiry: Duration,
    /// Older than this is expiring soon.
    pub warning: Duration,
}

impl Default for ExpiryThresholds {
    fn default() -> Self {
        Self {
            expiry: Duration::from_secs(7 * 86_400),
            warning: Duration::from_secs(5 * 86_400),
        }
    }
}

impl From<&crate::config::AuthConfig> for ExpiryThresholds {
    fn from(config: &crate::config::AuthConfig) -> Self {
        Self {
            expiry: config.expiry,
            warning: config.warning,
        }
    }
}

/// Derived authentication status of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    /// Never logged in, or auth was cleared.
    NotAuthenticated,
    /// Login is older than the expiry threshold.
    Expired,
    /// Login is past the warning threshold.
    ExpiringSoon,
    /// Login is recent.
    Valid,
}

impl AuthStatus {
    /// Whether the user should re-authenticate.
    pub fn needs_reauth(&self) -> bool {
        matches!(self, AuthStatus::NotAuthenticated | AuthStatus::Expired)
    }
}

impl std::fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuthStatus::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthStatus::Expired => "EXPIRED",
            AuthStatus::ExpiringSoon => "EXPIRING_SOON",
            AuthStatus::Valid => "VALID",
        };
        f.write_str(s)
    }
}

/// Partial update of a profile's mutable fields.
///
/// `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New email.
    pub email: Option<Option<String>>,
    /// New login timestamp.
    pub authenticated_at: Option<Option<DateTime<Utc>>>,
    /// New validation timestamp.
    pub last_validated: Option<Option<DateTime<Utc>>>,
}

impl ProfileUpdate {
    /// Set `authenticated_at`.
    pub fn authenticated_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.authenticated_at = Some(at);
        self
    }

    /// Set `last_validated`.
    pub fn last_validated(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.last_validated = Some(at);
        self
    }

    /// Set `email`.
    pub fn email(mut self, email: Option<String>) -> Self {
        self.email = Some(email);
        self
    }

    /// Set `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn apply(self, profile: &mut Profile) {
        if let Some(name) = self.name {
            profile.name = name;
        }
        if let Some(email) = self.email {
            profile.email = email;
        }
        if let Some(at) = self.authenticated_at {
            profile.authenticated_at = at;
        }
        if let Some(at) = self.last_validated {
            profile.last_validated = at;
        }
    }
}

/// Read-only view of a profile for listings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSummary {
    /// The profile record.
    pub profile: Profile,
    /// Derived status.
    pub status: AuthStatus,
    /// Whether this is the active profile.
    pub is_active: bool,
    /// Days since last login, one decimal.
    pub auth_age_days: Option<f64>,
    /// Days until expiry; negative once expired.
    pub expires_in_days: Option<f64>,
}

impl ProfileSummary {
    /// Summarize `profile` as of `now`.
    pub fn at(
        profile: &Profile,
        is_active: bool,
        now: DateTime<Utc>,
        thresholds: &ExpiryThresholds,
    ) -> Self {
        let age_days = profile
            .auth_age_at(now)
            .map(|age| age.as_secs_f64() / SECS_PER_DAY);
        let expiry_days = thresholds.expiry.as_secs_f64() / SECS_PER_DAY;
        Self {
            profile: profile.clone(),
            status: profile.status_at(now, thresholds),
            is_active,
            auth_age_days: age_days.map(round1),
            expires_in_days: age_days.map(|age| round1(expiry_days - age)),
        }
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
