//! Phone one-time-code login
//!
//! A verified phone login has no hosted session. It is represented by the
//! local markers in `storage::markers`, written by
//! `SessionManager::verify_otp` and `SessionManager::complete_onboarding`.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::error::{AuthError, Result};

pub const MOBILE_LENGTH: usize = 10;
pub const CODE_LENGTH: usize = 6;

/// Interests a user must pick before onboarding is complete
pub const MINIMUM_INTERESTS: usize = 3;

/// Input to `SessionManager::verify_otp`
#[derive(Debug, Clone, Default)]
pub struct OtpLogin {
    pub mobile: String,
    pub code: String,
    pub email: Option<String>,
    /// The profile service already has interests for this number
    pub onboarded: bool,
}

/// Sends and checks one-time codes
#[async_trait]
pub trait OtpProvider: Send + Sync {
    async fn send_code(&self, phone: &str) -> Result<()>;

    /// Fails with `AuthError::InvalidCode` when the code is wrong or expired
    async fn verify_code(&self, phone: &str, code: &str) -> Result<()>;
}

/// Keep only the digits of a typed mobile number
pub fn normalize_mobile(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalized mobile number, or `AuthError::InvalidInput`
pub fn validate_mobile(input: &str) -> std::result::Result<String, AuthError> {
    let digits = normalize_mobile(input);
    if digits.len() != MOBILE_LENGTH {
        return Err(AuthError::InvalidInput(format!(
            "Please enter a valid {}-digit mobile number",
            MOBILE_LENGTH
        )));
    }
    Ok(digits)
}

pub fn validate_code(code: &str) -> std::result::Result<(), AuthError> {
    let code = code.trim();
    if code.len() != CODE_LENGTH || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(AuthError::InvalidInput(format!(
            "Please enter the complete {}-digit code",
            CODE_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_interests(interests: &[String]) -> std::result::Result<(), AuthError> {
    let chosen = interests.iter().filter(|i| !i.trim().is_empty()).count();
    if chosen < MINIMUM_INTERESTS {
        return Err(AuthError::InvalidInput(format!(
            "Select at least {} interests ({} selected)",
            MINIMUM_INTERESTS, chosen
        )));
    }
    Ok(())
}

/// In-memory code provider for tests
///
/// Accepts exactly `accepted_code` for any number.
#[derive(Clone)]
pub struct MockOtpProvider {
    accepted_code: String,
    send_error: Option<AuthError>,
    sent_to: Arc<Mutex<Vec<String>>>,
    verify_call_count: Arc<Mutex<usize>>,
}

impl MockOtpProvider {
    pub fn accepting(code: &str) -> Self {
        Self {
            accepted_code: code.to_string(),
            send_error: None,
            sent_to: Arc::new(Mutex::new(Vec::new())),
            verify_call_count: Arc::new(Mutex::new(0)),
        }
    }

    /// Provider whose `send_code` always fails with `error`
    pub fn failing_send(error: AuthError) -> Self {
        Self {
            send_error: Some(error),
            ..Self::accepting("000000")
        }
    }

    pub fn sent_to(&self) -> Vec<String> {
        self.sent_to.lock().unwrap().clone()
    }

    pub fn verify_call_count(&self) -> usize {
        *self.verify_call_count.lock().unwrap()
    }
}

impl Default for MockOtpProvider {
    fn default() -> Self {
        Self::accepting("123456")
    }
}

#[async_trait]
impl OtpProvider for MockOtpProvider {
    async fn send_code(&self, phone: &str) -> Result<()> {
        if let Some(err) = &self.send_error {
            return Err(err.clone().into());
        }
        self.sent_to.lock().unwrap().push(phone.to_string());
        Ok(())
    }

    async fn verify_code(&self, _phone: &str, code: &str) -> Result<()> {
        *self.verify_call_count.lock().unwrap() += 1;
        if code == self.accepted_code {
            Ok(())
        } else {
            Err(AuthError::InvalidCode("Invalid OTP. Please try again.".to_string()).into())
        }
    }
}
