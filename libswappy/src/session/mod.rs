//! Session reconciliation
//!
//! `SessionManager` is the single source of truth for "who is logged in".
//! Two independent login mechanisms feed it:
//!
//! - federated OAuth through the hosted auth service (browser round trip
//!   or deep-link callback)
//! - phone one-time codes, tracked only by local markers
//!
//! A probe asks the hosted service first and reads the OTP markers only
//! when there is no hosted session, so a hosted session always wins.
//!
//! Reconciliation is event driven: the initial probe (`start`), hosted
//! auth events (`spawn_auth_listener`), deep links (`handle_deep_link`)
//! and foreground transitions (`handle_app_state`). Every write to the
//! local markers is followed by an explicit re-probe.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use libswappy::browser::MockBrowser;
//! use libswappy::hosted::mock::MockHostedAuth;
//! use libswappy::otp::MockOtpProvider;
//! use libswappy::session::{SessionManager, SessionOptions};
//! use libswappy::storage::MemoryStore;
//!
//! # async fn example() -> libswappy::Result<()> {
//! let manager = SessionManager::new(
//!     Arc::new(MockHostedAuth::signed_out()),
//!     Arc::new(MockOtpProvider::default()),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MockBrowser::new()),
//!     SessionOptions::default(),
//! );
//!
//! let mut updates = manager.subscribe();
//! manager.start().await?;
//! println!("{:?}", updates.borrow_and_update().status);
//! # Ok(())
//! # }
//! ```

pub mod lifecycle;
mod state;

pub use lifecycle::AppLifecycle;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use self::state::SessionState;
use crate::browser::{AuthBrowser, BrowserOutcome};
use crate::callback::{parse_callback, CallbackPayload};
use crate::config::Config;
use crate::error::{AuthError, Result, StorageError};
use crate::hosted::{AuthEvent, HostedAuth};
use crate::otp::{self, OtpLogin, OtpProvider};
use crate::storage::markers::{self, OtpMarkers};
use crate::storage::KeyValueStore;
use crate::types::{AuthSnapshot, Identity, Session, SessionStatus};

/// Knobs for the OAuth round trip
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Identity provider passed to the hosted authorize endpoint
    pub provider: String,
    /// Deep link the provider returns to
    pub redirect_url: String,
    /// Upper bound on waiting for the external browser
    pub oauth_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            redirect_url: "swappy://oauth-callback".to_string(),
            oauth_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            provider: config.auth.provider.clone(),
            redirect_url: config.auth.redirect_url.clone(),
            oauth_timeout: config.oauth_timeout()?,
        })
    }
}

/// Where a verified phone login stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtpProgress {
    SignedIn(Identity),
    /// Verified, but interests must be chosen before the login counts
    OnboardingRequired,
}

struct Inner {
    hosted: Arc<dyn HostedAuth>,
    otp: Arc<dyn OtpProvider>,
    store: Arc<dyn KeyValueStore>,
    browser: Arc<dyn AuthBrowser>,
    options: SessionOptions,
    state: Arc<SessionState>,
    app_state: Mutex<AppLifecycle>,
    /// Last callback URL acted on; the browser result and the deep link
    /// can deliver the same redirect twice
    last_callback: Mutex<Option<String>>,
    /// Held by anything that establishes or tears down a login: sign-out,
    /// journal recovery, the callback exchange and the OTP marker writes
    transition: AsyncMutex<()>,
    /// Signalled on resume; a browser round trip still waiting gives up
    resumed: Notify,
}

/// Reconciles the hosted and OTP sessions into one published snapshot
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        hosted: Arc<dyn HostedAuth>,
        otp: Arc<dyn OtpProvider>,
        store: Arc<dyn KeyValueStore>,
        browser: Arc<dyn AuthBrowser>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                hosted,
                otp,
                store,
                browser,
                options,
                state: Arc::new(SessionState::new()),
                app_state: Mutex::new(AppLifecycle::Active),
                last_callback: Mutex::new(None),
                transition: AsyncMutex::new(()),
                resumed: Notify::new(),
            }),
        }
    }

    /// Current snapshot
    pub fn state(&self) -> AuthSnapshot {
        self.inner.state.snapshot()
    }

    /// Alias for [`SessionManager::state`]
    pub fn snapshot(&self) -> AuthSnapshot {
        self.state()
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.state.subscribe()
    }

    /// Initial determination, `Unknown` → authenticated or not
    pub async fn start(&self) -> Result<SessionStatus> {
        tracing::info!(
            hosted = self.inner.hosted.name(),
            store = self.inner.store.backend_name(),
            "Starting session reconciliation"
        );
        self.refresh().await
    }

    /// Full re-probe: hosted session first, OTP markers only if absent.
    ///
    /// Returns this probe's own determination. It is published only if no
    /// newer result has been published in the meantime.
    pub async fn refresh(&self) -> Result<SessionStatus> {
        let _guard = self.inner.state.begin();
        let ticket = self.inner.state.ticket();

        match self.probe().await {
            Ok(status) => {
                if !self.inner.state.commit(ticket, status.clone()) {
                    tracing::debug!("Probe result superseded by a newer one");
                }
                Ok(status)
            }
            Err(err) => {
                tracing::warn!("Session probe failed: {}", err);
                self.inner.state.commit_failure(ticket, err.to_auth_error());
                Err(err)
            }
        }
    }

    async fn probe(&self) -> Result<SessionStatus> {
        let store = self.inner.store.as_ref();

        if store.contains(markers::SIGN_OUT_PENDING).await? && self.finish_sign_out().await? {
            return Ok(SessionStatus::Unauthenticated);
        }

        match self.inner.hosted.get_session().await {
            Ok(Some(session)) => {
                tracing::debug!(user = %session.user.id, "Hosted session found");
                Ok(SessionStatus::Authenticated(session.identity()))
            }
            Ok(None) => match OtpMarkers::read(store).await?.identity() {
                Some(identity) => {
                    tracing::debug!("No hosted session, OTP markers complete");
                    Ok(SessionStatus::Authenticated(Identity::Otp(identity)))
                }
                None => Ok(SessionStatus::Unauthenticated),
            },
            // An unreachable service cannot rule out a phone login
            Err(err) => match OtpMarkers::read(store).await?.identity() {
                Some(identity) => {
                    tracing::warn!("Hosted session check failed, using OTP markers: {}", err);
                    self.inner.state.report(err.to_auth_error());
                    Ok(SessionStatus::Authenticated(Identity::Otp(identity)))
                }
                None => Err(err),
            },
        }
    }

    /// Complete a sign-out interrupted before its journal was removed.
    ///
    /// Returns false when a login committed since the journal was seen;
    /// that login removed the journal and must not be torn down.
    async fn finish_sign_out(&self) -> Result<bool> {
        let _transition = self.inner.transition.lock().await;
        let store = self.inner.store.as_ref();
        if !store.contains(markers::SIGN_OUT_PENDING).await? {
            tracing::debug!("Unfinished sign-out was superseded by a login");
            return Ok(false);
        }

        tracing::info!("Found an unfinished sign-out, completing it");
        if let Err(e) = self.inner.hosted.sign_out().await {
            tracing::warn!("Hosted sign-out during recovery failed: {}", e);
        }
        // The journal stays behind on failure, so the next probe retries
        if let Err(e) = store.remove_many(markers::OTP_SESSION_KEYS).await {
            tracing::warn!("Clearing local markers during recovery failed: {}", e);
            self.inner.state.report(e.to_auth_error());
        }
        Ok(true)
    }

    /// Federated login through the external browser.
    ///
    /// Cancellation, dismissal, provider errors and timeouts are reported
    /// through `error` and leave the session untouched.
    pub async fn sign_in_with_oauth(&self) -> Result<Identity> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();

        let result = self.oauth_round_trip().await;
        if let Err(err) = &result {
            self.fail("OAuth sign-in", err);
        }
        result
    }

    async fn oauth_round_trip(&self) -> Result<Identity> {
        let options = &self.inner.options;
        // Registered before any await so a resume at any point is seen
        let resumed = self.inner.resumed.notified();
        tokio::pin!(resumed);
        resumed.as_mut().enable();

        let url = self
            .inner
            .hosted
            .authorize_url(&options.provider, &options.redirect_url)
            .await?;
        if url.is_empty() {
            return Err(AuthError::MissingAuthorizeUrl.into());
        }

        tracing::info!(provider = %options.provider, "Opening browser for sign-in");
        let browser = tokio::time::timeout(
            options.oauth_timeout,
            self.inner.browser.open_auth_session(&url, &options.redirect_url),
        );
        let outcome = tokio::select! {
            outcome = browser => outcome.map_err(|_| AuthError::Timeout(options.oauth_timeout))??,
            _ = &mut resumed => {
                tracing::info!("App resumed while the browser was open, abandoning sign-in");
                return Err(AuthError::Dismissed.into());
            }
        };

        match outcome {
            BrowserOutcome::Success(redirect) => match self.apply_callback(&redirect).await? {
                Some(identity) => Ok(identity),
                // The hosted client may have picked the session up itself
                None => match self.refresh().await? {
                    SessionStatus::Authenticated(identity @ Identity::OAuth(_)) => Ok(identity),
                    _ => Err(AuthError::Hosted("Login callback carried no credentials".to_string()).into()),
                },
            },
            BrowserOutcome::Cancel => Err(AuthError::Cancelled.into()),
            BrowserOutcome::Dismiss => Err(AuthError::Dismissed.into()),
        }
    }

    /// Handle a redirect delivered to the app's URL scheme.
    ///
    /// Returns the signed-in identity, or `None` when the link carried no
    /// credentials.
    pub async fn handle_deep_link(&self, url: &str) -> Result<Option<Identity>> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();

        let result = self.apply_callback(url).await;
        if let Err(err) = &result {
            self.fail("Deep link", err);
        }
        result
    }

    async fn apply_callback(&self, url: &str) -> Result<Option<Identity>> {
        let payload = parse_callback(url);
        tracing::debug!(kind = payload.kind(), "Handling OAuth callback");

        let credentials = matches!(payload, CallbackPayload::Tokens { .. } | CallbackPayload::Code(_));
        if credentials && !self.claim_callback(Some(url)) {
            tracing::debug!("Callback already handled");
            return Ok(self.state().user().cloned());
        }

        let _transition = if credentials {
            Some(self.inner.transition.lock().await)
        } else {
            None
        };
        let session = match payload {
            CallbackPayload::Tokens {
                access_token,
                refresh_token,
            } => self.inner.hosted.set_session(&access_token, &refresh_token).await,
            CallbackPayload::Code(code) => self.inner.hosted.exchange_code_for_session(&code).await,
            CallbackPayload::Error { code, description } => {
                return Err(AuthError::Provider { code, description }.into());
            }
            CallbackPayload::Empty => return Ok(None),
        };

        match session {
            Ok(session) => self.commit_oauth(&session).await.map(Some),
            Err(err) => {
                // Let the same link be retried
                self.claim_callback(None);
                Err(err)
            }
        }
    }

    /// Record `url` as the callback being handled; false if it already is.
    /// `None` forgets the last one.
    fn claim_callback(&self, url: Option<&str>) -> bool {
        let mut last = self
            .inner
            .last_callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match url {
            Some(url) if last.as_deref() == Some(url) => false,
            Some(url) => {
                *last = Some(url.to_string());
                true
            }
            None => {
                *last = None;
                true
            }
        }
    }

    async fn commit_oauth(&self, session: &Session) -> Result<Identity> {
        // A fresh login supersedes any unfinished sign-out
        self.inner.store.remove(markers::SIGN_OUT_PENDING).await?;

        let identity = session.identity();
        tracing::info!(user = identity.display_id(), "Signed in with OAuth");
        self.inner
            .state
            .commit_now(SessionStatus::Authenticated(identity.clone()));
        Ok(identity)
    }

    /// Feed a lifecycle transition; background/inactive → active re-probes.
    ///
    /// Returns whether a re-probe ran. The re-probe supersedes a sign-in
    /// still waiting on the browser: that attempt ends as `Dismissed`.
    pub async fn handle_app_state(&self, next: AppLifecycle) -> Result<bool> {
        let previous = {
            let mut current = self
                .inner
                .app_state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *current, next)
        };

        if !AppLifecycle::is_resume(previous, next) {
            return Ok(false);
        }
        tracing::debug!(?previous, "App returned to foreground, re-probing session");
        self.inner.resumed.notify_waiters();
        self.refresh().await?;
        Ok(true)
    }

    /// Listen for hosted auth events in the background.
    ///
    /// `SignedIn` and `TokenRefreshed` trigger a re-probe; `SignedOut` is
    /// only logged since teardown belongs to [`SessionManager::sign_out`].
    /// The task ends when the hosted event channel closes.
    pub fn spawn_auth_listener(&self) -> JoinHandle<()> {
        let manager = self.clone();
        let mut events = self.inner.hosted.subscribe();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event @ (AuthEvent::SignedIn { .. } | AuthEvent::TokenRefreshed { .. })) => {
                        tracing::debug!("Auth event {}, re-probing", event.name());
                        if let Err(e) = manager.refresh().await {
                            tracing::warn!("Re-probe after {} failed: {}", event.name(), e);
                        }
                    }
                    Ok(AuthEvent::SignedOut) => {
                        tracing::debug!("Auth event SIGNED_OUT");
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Auth listener lagged, re-probing");
                        if let Err(e) = manager.refresh().await {
                            tracing::warn!("Re-probe after lag failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("Auth listener stopped");
        })
    }

    /// Sign out of both sources. Signing out while signed out is a no-op
    /// that succeeds.
    ///
    /// Order: journal marker, hosted sign-out, local markers (journal
    /// removed last), then the in-memory user. A hosted failure is
    /// reported after the local teardown has still run.
    pub async fn sign_out(&self) -> Result<()> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();
        let _transition = self.inner.transition.lock().await;
        let store = self.inner.store.as_ref();

        if let Err(err) = store.set(markers::SIGN_OUT_PENDING, markers::TRUE).await {
            self.fail("Sign-out", &err);
            return Err(err);
        }

        let hosted = self.inner.hosted.sign_out().await;
        if let Err(e) = &hosted {
            tracing::warn!("Hosted sign-out failed, clearing local session anyway: {}", e);
        }
        let local = store.remove_many(markers::OTP_SESSION_KEYS).await;

        // The journal marker keeps later probes unauthenticated even if
        // clearing the markers failed
        self.inner.state.commit_now(SessionStatus::Unauthenticated);
        self.claim_callback(None);

        match local.and(hosted) {
            Ok(()) => {
                tracing::info!("Signed out");
                Ok(())
            }
            Err(err) => {
                self.fail("Sign-out", &err);
                Err(err)
            }
        }
    }

    /// Request a one-time code for `mobile`
    pub async fn send_otp(&self, mobile: &str) -> Result<()> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();

        let result = self.request_code(mobile).await;
        if let Err(err) = &result {
            self.fail("Sending code", err);
        }
        result
    }

    async fn request_code(&self, mobile: &str) -> Result<()> {
        let phone = otp::validate_mobile(mobile)?;
        self.inner.otp.send_code(&phone).await?;
        tracing::info!("Sent one-time code");
        Ok(())
    }

    /// Verify a one-time code and record the phone login.
    ///
    /// Writes `isLoggedIn`, `userMobile`, `userEmail` (when given) and
    /// `hasCompletedOnboarding` (when already onboarded), then re-probes.
    pub async fn verify_otp(&self, login: OtpLogin) -> Result<OtpProgress> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();

        let result = self.verify_and_record(login).await;
        if let Err(err) = &result {
            self.fail("Code verification", err);
        }
        result
    }

    async fn verify_and_record(&self, login: OtpLogin) -> Result<OtpProgress> {
        let phone = otp::validate_mobile(&login.mobile)?;
        otp::validate_code(&login.code)?;
        self.inner.otp.verify_code(&phone, login.code.trim()).await?;

        let email = login.email.as_deref().map(str::trim).filter(|e| !e.is_empty());
        let mut entries = vec![(markers::IS_LOGGED_IN, markers::TRUE), (markers::USER_MOBILE, phone.as_str())];
        if let Some(email) = email {
            entries.push((markers::USER_EMAIL, email));
        }
        if login.onboarded {
            entries.push((markers::HAS_COMPLETED_ONBOARDING, markers::TRUE));
        }

        {
            let _transition = self.inner.transition.lock().await;
            let store = self.inner.store.as_ref();
            store.remove(markers::SIGN_OUT_PENDING).await?;
            store.set_many(&entries).await?;
        }
        tracing::info!(onboarded = login.onboarded, "Phone login verified");

        self.otp_progress().await
    }

    /// Store chosen interests and mark onboarding complete, then re-probe
    pub async fn complete_onboarding(&self, interests: &[String]) -> Result<OtpProgress> {
        let _guard = self.inner.state.begin();
        self.inner.state.clear_error();

        let result = self.record_interests(interests).await;
        if let Err(err) = &result {
            self.fail("Onboarding", err);
        }
        result
    }

    async fn record_interests(&self, interests: &[String]) -> Result<OtpProgress> {
        otp::validate_interests(interests)?;
        let chosen: Vec<&str> = interests
            .iter()
            .map(|i| i.trim())
            .filter(|i| !i.is_empty())
            .collect();
        let json = serde_json::to_string(&chosen).map_err(StorageError::Serialization)?;

        {
            let _transition = self.inner.transition.lock().await;
            self.inner
                .store
                .set_many(&[
                    (markers::USER_INTERESTS, json.as_str()),
                    (markers::HAS_COMPLETED_ONBOARDING, markers::TRUE),
                ])
                .await?;
        }
        tracing::info!(count = chosen.len(), "Onboarding completed");
        self.otp_progress().await
    }

    /// Re-probe after an OTP marker write and classify the phone login
    async fn otp_progress(&self) -> Result<OtpProgress> {
        if let SessionStatus::Authenticated(identity) = self.refresh().await? {
            return Ok(OtpProgress::SignedIn(identity));
        }
        if OtpMarkers::read(self.inner.store.as_ref()).await?.onboarding_pending() {
            return Ok(OtpProgress::OnboardingRequired);
        }
        Err(AuthError::InvalidInput("No verified phone login; verify a code first".to_string()).into())
    }

    fn fail(&self, operation: &str, err: &crate::SwappyError) {
        let auth = err.to_auth_error();
        if auth.is_recoverable() {
            tracing::info!("{} did not complete: {}", operation, auth);
        } else {
            tracing::error!("{} failed: {}", operation, auth);
        }
        self.inner.state.report(auth);
    }

    #[cfg(test)]
    fn ticket(&self) -> state::Ticket {
        self.inner.state.ticket()
    }
}
