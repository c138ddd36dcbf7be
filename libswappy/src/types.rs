//! Core types for Swappy sessions

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Which login mechanism produced the current identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSource {
    #[serde(rename = "oauth")]
    OAuth,
    Otp,
}

impl std::fmt::Display for SessionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionSource::OAuth => f.write_str("oauth"),
            SessionSource::Otp => f.write_str("otp"),
        }
    }
}

/// Identity backed by a hosted (federated) session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthIdentity {
    pub user_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Identity provider that issued the login, e.g. "google"
    pub provider: Option<String>,
}

/// Identity backed by local one-time-code markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpIdentity {
    pub phone: String,
    pub email: Option<String>,
}

/// The authenticated actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Identity {
    #[serde(rename = "oauth")]
    OAuth(OAuthIdentity),
    Otp(OtpIdentity),
}

impl Identity {
    pub fn source(&self) -> SessionSource {
        match self {
            Identity::OAuth(_) => SessionSource::OAuth,
            Identity::Otp(_) => SessionSource::Otp,
        }
    }

    /// Human-facing identifier: email for OAuth users, phone for OTP users
    pub fn display_id(&self) -> &str {
        match self {
            Identity::OAuth(oauth) => oauth
                .email
                .as_deref()
                .or(oauth.phone.as_deref())
                .unwrap_or(&oauth.user_id),
            Identity::Otp(otp) => &otp.phone,
        }
    }

    pub fn email(&self) -> Option<&str> {
        match self {
            Identity::OAuth(oauth) => oauth.email.as_deref(),
            Identity::Otp(otp) => otp.email.as_deref(),
        }
    }
}

/// User record returned by the hosted auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default)]
    pub provider: Option<String>,
}

impl From<&HostedUser> for Identity {
    fn from(user: &HostedUser) -> Self {
        Identity::OAuth(OAuthIdentity {
            user_id: user.id.clone(),
            email: user.email.clone().filter(|e| !e.is_empty()),
            phone: user.phone.clone().filter(|p| !p.is_empty()),
            provider: user.app_metadata.provider.clone(),
        })
    }
}

/// A live hosted session. Tokens are opaque to Swappy and never logged.
pub struct Session {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// Unix timestamp (seconds)
    pub expires_at: i64,
    pub user: HostedUser,
}

impl Session {
    pub fn identity(&self) -> Identity {
        Identity::from(&self.user)
    }

    /// True when the session expires within `margin_secs` of `now`
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at - margin_secs <= now
    }

    pub(crate) fn to_stored(&self) -> StoredSession {
        StoredSession {
            access_token: self.access_token.expose_secret().to_string(),
            refresh_token: self.refresh_token.expose_secret().to_string(),
            expires_at: self.expires_at,
            user: self.user.clone(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user.id)
            .finish()
    }
}

/// On-disk form of a hosted session
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: HostedUser,
}

impl From<StoredSession> for Session {
    fn from(stored: StoredSession) -> Self {
        Self {
            access_token: SecretString::from(stored.access_token),
            refresh_token: SecretString::from(stored.refresh_token),
            expires_at: stored.expires_at,
            user: stored.user,
        }
    }
}

/// Reconciled answer to "who is logged in"
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No determination made yet
    #[default]
    Unknown,
    Authenticated(Identity),
    Unauthenticated,
}

/// What the session manager publishes to its subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub status: SessionStatus,
    pub loading: bool,
    pub error: Option<AuthError>,
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self {
            status: SessionStatus::Unknown,
            loading: true,
            error: None,
        }
    }
}

impl AuthSnapshot {
    pub fn user(&self) -> Option<&Identity> {
        match &self.status {
            SessionStatus::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    pub fn source(&self) -> Option<SessionSource> {
        self.user().map(Identity::source)
    }
}
