//! Mock hosted auth service for testing
//!
//! Simulates the hosted service in memory: a single current user, a
//! configurable authorize URL, failure injection per operation, latency,
//! and scripted probe results so tests can make an earlier probe finish
//! after a later one.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{AuthError, Result};
use crate::hosted::{AuthEvent, AuthEventBus, AuthEventReceiver, HostedAuth};
use crate::types::{AppMetadata, HostedUser, Session};

/// Configuration for mock hosted behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// URL returned by `authorize_url`; an empty string simulates the
    /// service returning no URL
    pub authorize_url: String,

    /// User that a successful code exchange or token login signs in
    pub login_user: HostedUser,

    /// Error returned by `get_session`
    pub session_error: Option<AuthError>,

    /// Error returned by `exchange_code_for_session`
    pub exchange_error: Option<AuthError>,

    /// Error returned by `set_session`
    pub set_session_error: Option<AuthError>,

    /// Error returned by `sign_out` after the local session is cleared
    pub sign_out_error: Option<AuthError>,

    /// Latency applied to every call without a scripted delay
    pub delay: Duration,

    /// Number of times get_session has been called
    pub session_call_count: Arc<Mutex<usize>>,

    /// Number of times exchange_code_for_session has been called
    pub exchange_call_count: Arc<Mutex<usize>>,

    /// Number of times set_session has been called
    pub set_session_call_count: Arc<Mutex<usize>>,

    /// Number of times sign_out has been called
    pub sign_out_call_count: Arc<Mutex<usize>>,

    /// Codes passed to exchange_code_for_session
    pub exchanged_codes: Arc<Mutex<Vec<String>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            authorize_url: "https://auth.example.test/authorize?provider=google".to_string(),
            login_user: mock_user("oauth-user", "ana@example.com"),
            session_error: None,
            exchange_error: None,
            set_session_error: None,
            sign_out_error: None,
            delay: Duration::from_millis(0),
            session_call_count: Arc::new(Mutex::new(0)),
            exchange_call_count: Arc::new(Mutex::new(0)),
            set_session_call_count: Arc::new(Mutex::new(0)),
            sign_out_call_count: Arc::new(Mutex::new(0)),
            exchanged_codes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// One scripted `get_session` answer: wait `delay`, then report `user`
#[derive(Debug, Clone)]
pub struct ProbeStep {
    pub delay: Duration,
    pub user: Option<HostedUser>,
}

/// Build a hosted user record signed in through Google
pub fn mock_user(id: &str, email: &str) -> HostedUser {
    HostedUser {
        id: id.to_string(),
        email: Some(email.to_string()),
        phone: None,
        app_metadata: AppMetadata {
            provider: Some("google".to_string()),
        },
    }
}

pub struct MockHostedAuth {
    config: MockConfig,
    current: Mutex<Option<HostedUser>>,
    script: Mutex<VecDeque<ProbeStep>>,
    events: AuthEventBus,
}

impl MockHostedAuth {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            current: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            events: AuthEventBus::default(),
        }
    }

    /// Nobody signed in, every call succeeds
    pub fn signed_out() -> Self {
        Self::new(MockConfig::default())
    }

    /// `user` already holds a hosted session
    pub fn signed_in(user: HostedUser) -> Self {
        let mock = Self::signed_out();
        mock.set_current_user(Some(user));
        mock
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self::new(MockConfig {
            delay,
            ..Default::default()
        })
    }

    /// Replace the hosted user without emitting an event, as if the
    /// session changed on another device
    pub fn set_current_user(&self, user: Option<HostedUser>) {
        *self.current.lock().unwrap() = user;
    }

    pub fn current_user(&self) -> Option<HostedUser> {
        self.current.lock().unwrap().clone()
    }

    /// Queue a scripted answer for the next `get_session` call
    pub fn push_probe(&self, delay: Duration, user: Option<HostedUser>) {
        self.script.lock().unwrap().push_back(ProbeStep { delay, user });
    }

    /// Emit an auth event as the hosted service would
    pub fn emit(&self, event: AuthEvent) {
        self.events.emit(event);
    }

    pub fn session_call_count(&self) -> usize {
        *self.config.session_call_count.lock().unwrap()
    }

    pub fn exchange_call_count(&self) -> usize {
        *self.config.exchange_call_count.lock().unwrap()
    }

    pub fn set_session_call_count(&self) -> usize {
        *self.config.set_session_call_count.lock().unwrap()
    }

    pub fn sign_out_call_count(&self) -> usize {
        *self.config.sign_out_call_count.lock().unwrap()
    }

    pub fn exchanged_codes(&self) -> Vec<String> {
        self.config.exchanged_codes.lock().unwrap().clone()
    }

    async fn latency(&self) {
        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }
    }

    fn session_for(user: HostedUser) -> Session {
        Session {
            access_token: SecretString::from("mock-access-token".to_string()),
            refresh_token: SecretString::from("mock-refresh-token".to_string()),
            expires_at: chrono::Utc::now().timestamp() + 3_600,
            user,
        }
    }

    fn sign_in(&self) -> Session {
        let user = self.config.login_user.clone();
        self.set_current_user(Some(user.clone()));
        self.events.emit(AuthEvent::SignedIn { user: user.clone() });
        Self::session_for(user)
    }
}

#[async_trait]
impl HostedAuth for MockHostedAuth {
    async fn get_session(&self) -> Result<Option<Session>> {
        *self.config.session_call_count.lock().unwrap() += 1;

        let scripted = self.script.lock().unwrap().pop_front();
        if let Some(step) = scripted {
            if !step.delay.is_zero() {
                sleep(step.delay).await;
            }
            return Ok(step.user.map(Self::session_for));
        }

        self.latency().await;
        if let Some(err) = &self.config.session_error {
            return Err(err.clone().into());
        }
        Ok(self.current_user().map(Self::session_for))
    }

    async fn authorize_url(&self, _provider: &str, _redirect_to: &str) -> Result<String> {
        self.latency().await;
        Ok(self.config.authorize_url.clone())
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session> {
        *self.config.exchange_call_count.lock().unwrap() += 1;
        self.config
            .exchanged_codes
            .lock()
            .unwrap()
            .push(code.to_string());

        self.latency().await;
        if let Some(err) = &self.config.exchange_error {
            return Err(err.clone().into());
        }
        Ok(self.sign_in())
    }

    async fn set_session(
        &self,
        _access_token: &SecretString,
        _refresh_token: &SecretString,
    ) -> Result<Session> {
        *self.config.set_session_call_count.lock().unwrap() += 1;

        self.latency().await;
        if let Some(err) = &self.config.set_session_error {
            return Err(err.clone().into());
        }
        Ok(self.sign_in())
    }

    async fn sign_out(&self) -> Result<()> {
        *self.config.sign_out_call_count.lock().unwrap() += 1;

        self.latency().await;
        let had_session = self.current.lock().unwrap().take().is_some();
        if had_session {
            self.events.emit(AuthEvent::SignedOut);
        }
        match &self.config.sign_out_error {
            Some(err) => Err(err.clone().into()),
            None => Ok(()),
        }
    }

    fn subscribe(&self) -> AuthEventReceiver {
        self.events.subscribe()
    }

    fn name(&self) -> &str {
        "mock"
    }
}
