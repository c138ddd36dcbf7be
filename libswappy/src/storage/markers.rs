//! Key names for the local login markers
//!
//! The one-time-code login has no hosted session; it is represented
//! entirely by these keys. A completed OTP login needs `isLoggedIn`,
//! `hasCompletedOnboarding` and `userMobile` all present.

use crate::error::Result;
use crate::storage::KeyValueStore;
use crate::types::OtpIdentity;

pub const IS_LOGGED_IN: &str = "isLoggedIn";
pub const HAS_COMPLETED_ONBOARDING: &str = "hasCompletedOnboarding";
pub const USER_MOBILE: &str = "userMobile";
pub const USER_EMAIL: &str = "userEmail";
pub const USER_INTERESTS: &str = "userInterests";
pub const USER_ID: &str = "userId";
pub const USER_PROFILE: &str = "userProfile";

/// Teardown journal: present while a sign-out has started but not finished
pub const SIGN_OUT_PENDING: &str = "signOutPending";

pub const TRUE: &str = "true";

/// Every key removed on sign-out. The journal marker is last so it is
/// only gone once everything before it is.
pub const OTP_SESSION_KEYS: &[&str] = &[
    IS_LOGGED_IN,
    USER_MOBILE,
    USER_EMAIL,
    USER_INTERESTS,
    HAS_COMPLETED_ONBOARDING,
    USER_ID,
    USER_PROFILE,
    SIGN_OUT_PENDING,
];

/// Raw view of the OTP markers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OtpMarkers {
    pub is_logged_in: bool,
    pub has_completed_onboarding: bool,
    pub mobile: Option<String>,
    pub email: Option<String>,
}

impl OtpMarkers {
    pub async fn read(store: &dyn KeyValueStore) -> Result<Self> {
        let is_logged_in = store.get(IS_LOGGED_IN).await?;
        let has_completed_onboarding = store.get(HAS_COMPLETED_ONBOARDING).await?;
        let mobile = store.get(USER_MOBILE).await?;
        let email = store.get(USER_EMAIL).await?;

        Ok(Self {
            is_logged_in: is_logged_in.as_deref() == Some(TRUE),
            has_completed_onboarding: has_completed_onboarding.as_deref() == Some(TRUE),
            mobile: mobile.filter(|m| !m.is_empty()),
            email: email.filter(|e| !e.is_empty()),
        })
    }

    /// The OTP identity, if the markers describe a completed login
    pub fn identity(&self) -> Option<OtpIdentity> {
        if !(self.is_logged_in && self.has_completed_onboarding) {
            return None;
        }
        self.mobile.as_ref().map(|phone| OtpIdentity {
            phone: phone.clone(),
            email: self.email.clone(),
        })
    }

    /// Logged in with a phone number but interests not chosen yet
    pub fn onboarding_pending(&self) -> bool {
        self.is_logged_in && self.mobile.is_some() && !self.has_completed_onboarding
    }
}
