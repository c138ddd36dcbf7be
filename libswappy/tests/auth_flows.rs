//! Integration tests for the login flows around SessionManager
//!
//! Covers the browser round trip, the interrupted sign-out journal,
//! lifecycle re-probes, the hosted event listener and phone onboarding.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use libswappy::browser::{BrowserOutcome, MockBrowser};
use libswappy::error::{Result, StorageError};
use libswappy::hosted::mock::{mock_user, MockConfig, MockHostedAuth};
use libswappy::hosted::AuthEvent;
use libswappy::otp::{MockOtpProvider, OtpLogin};
use libswappy::routing;
use libswappy::storage::markers;
use libswappy::storage::{FileStore, KeyValueStore, MemoryStore};
use libswappy::{
    AppLifecycle, AuthError, AuthSnapshot, Identity, OtpProgress, SessionManager, SessionOptions,
    SessionSource, SessionStatus,
};
use tempfile::TempDir;

fn manager_with(
    hosted: Arc<MockHostedAuth>,
    store: Arc<dyn KeyValueStore>,
    browser: MockBrowser,
    options: SessionOptions,
) -> SessionManager {
    SessionManager::new(
        hosted,
        Arc::new(MockOtpProvider::accepting("123456")),
        store,
        Arc::new(browser),
        options,
    )
}

fn manager(hosted: Arc<MockHostedAuth>, store: MemoryStore, browser: MockBrowser) -> SessionManager {
    manager_with(hosted, Arc::new(store), browser, SessionOptions::default())
}

async fn wait_for(
    manager: &SessionManager,
    predicate: impl FnMut(&AuthSnapshot) -> bool,
) -> AuthSnapshot {
    let mut updates = manager.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(2), updates.wait_for(predicate))
        .await
        .expect("Timed out waiting for session state")
        .expect("Session manager dropped")
        .clone();
    snapshot
}

/// Memory store whose bulk removals can be made to fail
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_removals: Arc<AtomicBool>,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }

    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
            return Err(StorageError::Io(io).into());
        }
        self.inner.remove_many(keys).await
    }

    fn backend_name(&self) -> &str {
        "flaky"
    }
}

// Browser round trip

#[tokio::test]
async fn test_oauth_round_trip_with_code() {
    let hosted = Arc::new(MockHostedAuth::signed_out());
    let browser = MockBrowser::returning(BrowserOutcome::Success(
        "swappy://oauth-callback?code=XYZ".to_string(),
    ));
    let manager = manager(hosted.clone(), MemoryStore::new(), browser.clone());
    manager.start().await.unwrap();

    let identity = manager.sign_in_with_oauth().await.unwrap();

    assert_eq!(identity.source(), SessionSource::OAuth);
    assert_eq!(hosted.exchanged_codes(), vec!["XYZ".to_string()]);
    assert_eq!(
        browser.opened_urls(),
        vec![MockConfig::default().authorize_url]
    );
    assert!(manager.state().is_authenticated());
}

#[tokio::test]
async fn test_oauth_cancel_is_recoverable() {
    let hosted = Arc::new(MockHostedAuth::signed_out());
    let manager = manager(
        hosted.clone(),
        MemoryStore::new(),
        MockBrowser::returning(BrowserOutcome::Cancel),
    );
    manager.start().await.unwrap();

    let err = manager.sign_in_with_oauth().await.unwrap_err();

    assert_eq!(err.to_auth_error(), AuthError::Cancelled);
    let snapshot = manager.state();
    assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
    assert_eq!(snapshot.error, Some(AuthError::Cancelled));
    assert!(!snapshot.loading);
    assert_eq!(hosted.exchange_call_count(), 0);
}

#[tokio::test]
async fn test_oauth_dismiss_and_provider_error() {
    let browser = MockBrowser::new();
    browser.push(Duration::ZERO, BrowserOutcome::Dismiss);
    browser.push(
        Duration::ZERO,
        BrowserOutcome::Success("swappy://oauth-callback#error=server_error&error_description=Try+later".to_string()),
    );
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), MemoryStore::new(), browser);
    manager.start().await.unwrap();

    let err = manager.sign_in_with_oauth().await.unwrap_err();
    assert_eq!(err.to_auth_error(), AuthError::Dismissed);

    let err = manager.sign_in_with_oauth().await.unwrap_err();
    assert_eq!(
        err.to_auth_error(),
        AuthError::Provider {
            code: "server_error".to_string(),
            description: Some("Try later".to_string()),
        }
    );
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn test_oauth_round_trip_times_out() {
    let browser = MockBrowser::new();
    browser.push(Duration::from_secs(5), BrowserOutcome::Cancel);
    let options = SessionOptions {
        oauth_timeout: Duration::from_millis(50),
        ..Default::default()
    };
    let manager = manager_with(
        Arc::new(MockHostedAuth::signed_out()),
        Arc::new(MemoryStore::new()),
        browser,
        options,
    );
    manager.start().await.unwrap();

    let err = manager.sign_in_with_oauth().await.unwrap_err();

    assert_eq!(err.to_auth_error(), AuthError::Timeout(Duration::from_millis(50)));
    assert!(!manager.state().loading);
}

#[tokio::test]
async fn test_missing_authorize_url_does_not_open_browser() {
    let hosted = Arc::new(MockHostedAuth::new(MockConfig {
        authorize_url: String::new(),
        ..Default::default()
    }));
    let browser = MockBrowser::new();
    let manager = manager(hosted, MemoryStore::new(), browser.clone());

    let err = manager.sign_in_with_oauth().await.unwrap_err();

    assert_eq!(err.to_auth_error(), AuthError::MissingAuthorizeUrl);
    assert!(browser.opened_urls().is_empty());
}

// Interrupted sign-out

#[tokio::test]
async fn test_journal_marker_completes_teardown_on_start() {
    // State left by a crash after the journal was written
    let hosted = Arc::new(MockHostedAuth::signed_in(mock_user("u1", "ana@example.com")));
    let store = MemoryStore::with_entries([
        (markers::SIGN_OUT_PENDING, markers::TRUE),
        (markers::IS_LOGGED_IN, markers::TRUE),
        (markers::HAS_COMPLETED_ONBOARDING, markers::TRUE),
        (markers::USER_MOBILE, "9876543210"),
    ]);
    let manager = manager(hosted.clone(), store.clone(), MockBrowser::new());

    let status = manager.start().await.unwrap();

    assert_eq!(status, SessionStatus::Unauthenticated);
    assert!(store.is_empty());
    assert!(hosted.current_user().is_none());
    assert_eq!(hosted.sign_out_call_count(), 1);
}

#[tokio::test]
async fn test_hosted_sign_out_failure_still_clears_locally() {
    let hosted = Arc::new(MockHostedAuth::new(MockConfig {
        sign_out_error: Some(AuthError::Network("offline".to_string())),
        ..Default::default()
    }));
    hosted.set_current_user(Some(mock_user("u1", "ana@example.com")));
    let store = MemoryStore::with_entries([(markers::USER_INTERESTS, "[]")]);
    let manager = manager(hosted, store.clone(), MockBrowser::new());
    manager.start().await.unwrap();

    let err = manager.sign_out().await.unwrap_err();

    assert_eq!(err.to_auth_error(), AuthError::Network("offline".to_string()));
    assert!(store.is_empty());
    let snapshot = manager.state();
    assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
    assert!(snapshot.error.is_some());
}

#[tokio::test]
async fn test_failed_local_clear_never_leaves_user_signed_in() {
    let store = FlakyStore {
        inner: MemoryStore::with_entries([
            (markers::IS_LOGGED_IN, markers::TRUE),
            (markers::HAS_COMPLETED_ONBOARDING, markers::TRUE),
            (markers::USER_MOBILE, "9876543210"),
        ]),
        ..Default::default()
    };
    let hosted = Arc::new(MockHostedAuth::signed_out());
    let manager = manager_with(
        hosted.clone(),
        Arc::new(store.clone()),
        MockBrowser::new(),
        SessionOptions::default(),
    );
    manager.start().await.unwrap();
    assert_eq!(manager.state().source(), Some(SessionSource::Otp));

    store.fail_removals.store(true, Ordering::SeqCst);
    assert!(manager.sign_out().await.is_err());
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);

    // Markers survived, but the journal keeps the probe unauthenticated
    assert!(store.contains(markers::USER_MOBILE).await.unwrap());
    assert_eq!(manager.refresh().await.unwrap(), SessionStatus::Unauthenticated);

    store.fail_removals.store(false, Ordering::SeqCst);
    assert_eq!(manager.refresh().await.unwrap(), SessionStatus::Unauthenticated);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_new_login_discards_stale_journal() {
    let store = MemoryStore::with_entries([(markers::SIGN_OUT_PENDING, markers::TRUE)]);
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), store.clone(), MockBrowser::new());

    manager
        .verify_otp(OtpLogin {
            mobile: "9876543210".to_string(),
            code: "123456".to_string(),
            email: None,
            onboarded: true,
        })
        .await
        .unwrap();

    assert!(!store.contains(markers::SIGN_OUT_PENDING).await.unwrap());
    assert_eq!(manager.refresh().await.unwrap(), manager.state().status);
    assert_eq!(manager.state().source(), Some(SessionSource::Otp));
}

#[tokio::test]
async fn test_login_during_unfinished_sign_out_survives() {
    // A deep link arrives on a cold start that also finds the journal
    let hosted = Arc::new(MockHostedAuth::with_delay(Duration::from_millis(50)));
    let store = MemoryStore::with_entries([(markers::SIGN_OUT_PENDING, markers::TRUE)]);
    let manager = manager(hosted.clone(), store.clone(), MockBrowser::new());

    let link = manager.clone();
    let deep_link =
        tokio::spawn(async move { link.handle_deep_link("swappy://oauth-callback?code=ABC").await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = manager.start().await.unwrap();
    let signed_in = deep_link.await.unwrap().unwrap();

    assert!(matches!(signed_in, Some(Identity::OAuth(_))));
    assert!(matches!(started, SessionStatus::Authenticated(Identity::OAuth(_))));
    assert_eq!(hosted.sign_out_call_count(), 0);
    assert!(hosted.current_user().is_some());
    assert!(!store.contains(markers::SIGN_OUT_PENDING).await.unwrap());

    assert_eq!(manager.state().source(), Some(SessionSource::OAuth));
    assert_eq!(manager.refresh().await.unwrap(), started);
}

#[tokio::test]
async fn test_phone_login_during_unfinished_sign_out_survives() {
    let hosted = Arc::new(MockHostedAuth::with_delay(Duration::from_millis(50)));
    let store = MemoryStore::with_entries([(markers::SIGN_OUT_PENDING, markers::TRUE)]);
    let manager = manager(hosted.clone(), store.clone(), MockBrowser::new());

    let verifying = manager.clone();
    let verify = tokio::spawn(async move {
        verifying
            .verify_otp(OtpLogin {
                mobile: "9876543210".to_string(),
                code: "123456".to_string(),
                email: None,
                onboarded: true,
            })
            .await
    });
    // Recovery takes the journal first and holds it through the hosted sign-out
    manager.start().await.unwrap();
    let progress = verify.await.unwrap().unwrap();

    assert!(matches!(progress, OtpProgress::SignedIn(Identity::Otp(_))));
    assert!(store.contains(markers::IS_LOGGED_IN).await.unwrap());
    assert_eq!(manager.state().source(), Some(SessionSource::Otp));
}

#[tokio::test]
async fn test_sign_out_through_file_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileStore::new(temp_dir.path().join("session.json")));
    store
        .set_many(&[
            (markers::IS_LOGGED_IN, markers::TRUE),
            (markers::HAS_COMPLETED_ONBOARDING, markers::TRUE),
            (markers::USER_MOBILE, "9876543210"),
        ])
        .await
        .unwrap();

    let manager = manager_with(
        Arc::new(MockHostedAuth::signed_out()),
        store.clone(),
        MockBrowser::new(),
        SessionOptions::default(),
    );
    assert!(manager.start().await.unwrap() != SessionStatus::Unauthenticated);

    manager.sign_out().await.unwrap();

    let reopened = FileStore::new(temp_dir.path().join("session.json"));
    for key in markers::OTP_SESSION_KEYS {
        assert!(reopened.get(key).await.unwrap().is_none());
    }
}

// Lifecycle and hosted events

#[tokio::test]
async fn test_foreground_picks_up_external_changes() {
    let hosted = Arc::new(MockHostedAuth::signed_out());
    let manager = manager(hosted.clone(), MemoryStore::new(), MockBrowser::new());
    manager.start().await.unwrap();

    hosted.set_current_user(Some(mock_user("u1", "ana@example.com")));
    manager.handle_app_state(AppLifecycle::Background).await.unwrap();
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);

    assert!(manager.handle_app_state(AppLifecycle::Active).await.unwrap());
    assert_eq!(manager.state().source(), Some(SessionSource::OAuth));

    // Expired elsewhere while in the background
    hosted.set_current_user(None);
    manager.handle_app_state(AppLifecycle::Inactive).await.unwrap();
    manager.handle_app_state(AppLifecycle::Active).await.unwrap();
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn test_resume_abandons_pending_oauth() {
    let browser = MockBrowser::new();
    browser.push(Duration::from_secs(3), BrowserOutcome::Cancel);
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), MemoryStore::new(), browser.clone());
    manager.start().await.unwrap();

    let signing_in = manager.clone();
    let attempt = tokio::spawn(async move { signing_in.sign_in_with_oauth().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(manager.state().loading);
    assert_eq!(browser.opened_urls().len(), 1);

    manager.handle_app_state(AppLifecycle::Background).await.unwrap();
    assert!(manager.handle_app_state(AppLifecycle::Active).await.unwrap());

    let result = tokio::time::timeout(Duration::from_secs(1), attempt)
        .await
        .expect("Sign-in still waiting after resume")
        .unwrap();
    assert_eq!(result.unwrap_err().to_auth_error(), AuthError::Dismissed);

    let snapshot = manager.state();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.status, SessionStatus::Unauthenticated);
    assert_eq!(
        routing::guard(&snapshot, routing::Route::Main),
        routing::RouteDecision::ToLogin
    );
}

#[tokio::test]
async fn test_auth_listener_reprobes_on_sign_in_event() {
    let hosted = Arc::new(MockHostedAuth::signed_out());
    let manager = manager(hosted.clone(), MemoryStore::new(), MockBrowser::new());
    manager.start().await.unwrap();
    let listener = manager.spawn_auth_listener();

    let user = mock_user("u2", "bo@example.com");
    hosted.set_current_user(Some(user.clone()));
    hosted.emit(AuthEvent::SignedIn { user });

    let snapshot = wait_for(&manager, |s| s.is_authenticated() && !s.loading).await;
    match snapshot.user() {
        Some(Identity::OAuth(identity)) => assert_eq!(identity.user_id, "u2"),
        other => panic!("Expected OAuth identity, got {:?}", other),
    }

    listener.abort();
}

#[tokio::test]
async fn test_auth_listener_leaves_sign_out_to_sign_out() {
    let hosted = Arc::new(MockHostedAuth::signed_in(mock_user("u1", "ana@example.com")));
    let manager = manager(hosted.clone(), MemoryStore::new(), MockBrowser::new());
    manager.start().await.unwrap();
    let listener = manager.spawn_auth_listener();

    hosted.emit(AuthEvent::SignedOut);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(manager.state().is_authenticated());
    assert_eq!(hosted.session_call_count(), 1);
    listener.abort();
}

// Phone login and onboarding

#[tokio::test]
async fn test_phone_login_requires_onboarding() {
    let store = MemoryStore::new();
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), store.clone(), MockBrowser::new());
    manager.start().await.unwrap();

    let progress = manager
        .verify_otp(OtpLogin {
            mobile: "9876543210".to_string(),
            code: "123456".to_string(),
            email: None,
            onboarded: false,
        })
        .await
        .unwrap();
    assert_eq!(progress, OtpProgress::OnboardingRequired);
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);
    assert_eq!(
        store.get(markers::USER_MOBILE).await.unwrap().as_deref(),
        Some("9876543210")
    );

    let too_few = vec!["Cooking".to_string(), "Guitar".to_string()];
    let err = manager.complete_onboarding(&too_few).await.unwrap_err();
    assert!(matches!(err.to_auth_error(), AuthError::InvalidInput(_)));
    assert_eq!(err.exit_code(), 3);

    let interests = vec!["Cooking".to_string(), "Guitar".to_string(), "Yoga".to_string()];
    let progress = manager.complete_onboarding(&interests).await.unwrap();
    assert!(matches!(progress, OtpProgress::SignedIn(Identity::Otp(_))));
    assert_eq!(
        store.get(markers::USER_INTERESTS).await.unwrap().as_deref(),
        Some(r#"["Cooking","Guitar","Yoga"]"#)
    );
    assert!(manager.state().error.is_none());
}

#[tokio::test]
async fn test_wrong_code_writes_nothing() {
    let store = MemoryStore::new();
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), store.clone(), MockBrowser::new());
    manager.start().await.unwrap();

    let err = manager
        .verify_otp(OtpLogin {
            mobile: "9876543210".to_string(),
            code: "000000".to_string(),
            email: None,
            onboarded: true,
        })
        .await
        .unwrap_err();

    assert!(matches!(err.to_auth_error(), AuthError::InvalidCode(_)));
    assert!(store.is_empty());
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);
}

#[tokio::test]
async fn test_onboarding_without_phone_login_is_rejected() {
    let store = MemoryStore::new();
    let manager = manager(Arc::new(MockHostedAuth::signed_out()), store.clone(), MockBrowser::new());
    manager.start().await.unwrap();

    let interests = vec!["Cooking".to_string(), "Guitar".to_string(), "Yoga".to_string()];
    let err = manager.complete_onboarding(&interests).await.unwrap_err();

    assert!(matches!(err.to_auth_error(), AuthError::InvalidInput(_)));
    assert_eq!(manager.state().status, SessionStatus::Unauthenticated);
    assert!(manager.state().error.is_some());
}
