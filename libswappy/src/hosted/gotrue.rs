//! REST client for the hosted auth service (`/auth/v1`)
//!
//! The client persists its session through the same `KeyValueStore` the
//! OTP markers live in, so a cold start can restore it without a network
//! round trip. Federated logins use PKCE: the verifier is generated and
//! stored when the authorize URL is built and consumed by the code
//! exchange.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::error::{AuthError, Result, StorageError};
use crate::hosted::{AuthEvent, AuthEventBus, AuthEventReceiver, HostedAuth};
use crate::otp::OtpProvider;
use crate::storage::KeyValueStore;
use crate::types::{HostedUser, Session, StoredSession};

/// Store key holding the serialized hosted session
pub const SESSION_KEY: &str = "swappy.auth.session";
/// Store key holding the pending PKCE verifier
pub const CODE_VERIFIER_KEY: &str = "swappy.auth.code_verifier";

/// Refresh sessions this close to expiry
const REFRESH_MARGIN_SECS: i64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CODE_VERIFIER_LEN: usize = 64;
/// Access token lifetime the service issues by default
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3_600;

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: HostedUser,
}

impl TokenResponse {
    fn into_session(self, now: i64) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| now + secs))
            .unwrap_or(now + DEFAULT_TOKEN_LIFETIME_SECS);
        Session {
            access_token: SecretString::from(self.access_token),
            refresh_token: SecretString::from(self.refresh_token),
            expires_at,
            user: self.user,
        }
    }
}

/// Error body shapes returned by the service
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn code(&self) -> Option<&str> {
        self.error_code.as_deref().or(self.error.as_deref())
    }

    fn message(&self) -> Option<&str> {
        self.error_description
            .as_deref()
            .or(self.msg.as_deref())
            .or(self.message.as_deref())
    }
}

/// A non-2xx answer from the service
struct HttpFailure {
    status: StatusCode,
    body: ErrorBody,
    raw: String,
}

impl HttpFailure {
    fn describe(&self) -> String {
        match (self.body.code(), self.body.message()) {
            (Some(code), Some(message)) => format!("HTTP {}: {} ({})", self.status, message, code),
            (None, Some(message)) => format!("HTTP {}: {}", self.status, message),
            (Some(code), None) => format!("HTTP {}: {}", self.status, code),
            (None, None) if !self.raw.is_empty() => format!("HTTP {}: {}", self.status, self.raw),
            (None, None) => format!("HTTP {}", self.status),
        }
    }

    fn is_client_error(&self) -> bool {
        self.status.is_client_error()
    }

    /// Session already revoked or unknown to the service
    fn is_gone(&self) -> bool {
        [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN, StatusCode::NOT_FOUND].contains(&self.status)
    }

    fn into_auth_error(self) -> AuthError {
        AuthError::Hosted(self.describe())
    }
}

fn map_request_error(err: reqwest::Error, context: &str) -> AuthError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        AuthError::Network(format!("{} failed: {}", context, err))
    } else if err.is_decode() {
        AuthError::Hosted(format!("{}: unexpected response body: {}", context, err))
    } else {
        AuthError::Hosted(format!("{} failed: {}", context, err))
    }
}

pub struct GoTrueClient {
    http: reqwest::Client,
    auth_url: String,
    anon_key: String,
    store: Arc<dyn KeyValueStore>,
    events: AuthEventBus,
}

impl GoTrueClient {
    pub fn new(backend: &BackendConfig, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("swappy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AuthError::Hosted(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            auth_url: format!("{}/auth/v1", backend.url.trim_end_matches('/')),
            anon_key: backend.anon_key.clone(),
            store,
            events: AuthEventBus::default(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.auth_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, self.endpoint(path))
            .header("apikey", &self.anon_key)
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<std::result::Result<reqwest::Response, HttpFailure>> {
        let response = builder
            .send()
            .await
            .map_err(|e| map_request_error(e, context))?;
        let status = response.status();
        if status.is_success() {
            return Ok(Ok(response));
        }

        let raw = response.text().await.unwrap_or_default();
        tracing::warn!(status = %status, "{} rejected by hosted auth service", context);
        Ok(Err(HttpFailure {
            status,
            body: ErrorBody::parse(&raw),
            raw,
        }))
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
        context: &str,
    ) -> Result<std::result::Result<Session, HttpFailure>> {
        let builder = self
            .request(reqwest::Method::POST, "token")
            .query(&[("grant_type", grant_type)])
            .json(&body);

        match self.send(builder, context).await? {
            Ok(response) => {
                let token: TokenResponse = response
                    .json()
                    .await
                    .map_err(|e| map_request_error(e, context))?;
                Ok(Ok(token.into_session(now())))
            }
            Err(failure) => Ok(Err(failure)),
        }
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<std::result::Result<Session, HttpFailure>> {
        tracing::debug!("Refreshing hosted session");
        self.token_request(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token.expose_secret() }),
            "Session refresh",
        )
        .await
    }

    async fn fetch_user(&self, access_token: &SecretString) -> Result<HostedUser> {
        let builder = self
            .request(reqwest::Method::GET, "user")
            .bearer_auth(access_token.expose_secret());
        match self.send(builder, "User lookup").await? {
            Ok(response) => response
                .json::<HostedUser>()
                .await
                .map_err(|e| map_request_error(e, "User lookup").into()),
            Err(failure) => Err(failure.into_auth_error().into()),
        }
    }

    async fn load_stored(&self) -> Result<Option<Session>> {
        let Some(raw) = self.store.get(SESSION_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) => Ok(Some(stored.into())),
            Err(e) => {
                tracing::warn!("Discarding unreadable stored session: {}", e);
                self.store.remove(SESSION_KEY).await?;
                Ok(None)
            }
        }
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(&session.to_stored()).map_err(StorageError::Serialization)?;
        self.store.set(SESSION_KEY, &json).await
    }

    async fn clear_stored(&self) -> Result<()> {
        self.store.remove_many(&[SESSION_KEY, CODE_VERIFIER_KEY]).await
    }
}

#[async_trait]
impl HostedAuth for GoTrueClient {
    async fn get_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.load_stored().await? else {
            return Ok(None);
        };

        if !session.expires_within(now(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }

        match self.refresh(&session.refresh_token).await? {
            Ok(refreshed) => {
                self.persist(&refreshed).await?;
                self.events.emit(AuthEvent::TokenRefreshed {
                    user: refreshed.user.clone(),
                });
                Ok(Some(refreshed))
            }
            Err(failure) if failure.is_client_error() => {
                tracing::info!("Stored session can no longer be refreshed: {}", failure.describe());
                self.clear_stored().await?;
                self.events.emit(AuthEvent::SignedOut);
                Ok(None)
            }
            Err(failure) => Err(failure.into_auth_error().into()),
        }
    }

    async fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String> {
        let verifier = generate_code_verifier();
        self.store.set(CODE_VERIFIER_KEY, &verifier).await?;

        let url = format!(
            "{}?provider={}&redirect_to={}&code_challenge={}&code_challenge_method=s256",
            self.endpoint("authorize"),
            urlencoding::encode(provider),
            urlencoding::encode(redirect_to),
            code_challenge(&verifier),
        );
        tracing::debug!("Built authorize URL for provider {}", provider);
        Ok(url)
    }

    async fn exchange_code_for_session(&self, code: &str) -> Result<Session> {
        let verifier = self.store.get(CODE_VERIFIER_KEY).await?.ok_or_else(|| {
            AuthError::Hosted("No pending login for this code; start the sign-in again".to_string())
        })?;

        let session = self
            .token_request(
                "pkce",
                serde_json::json!({ "auth_code": code, "code_verifier": verifier }),
                "Code exchange",
            )
            .await?
            .map_err(HttpFailure::into_auth_error)?;

        self.store.remove(CODE_VERIFIER_KEY).await?;
        self.persist(&session).await?;
        self.events.emit(AuthEvent::SignedIn {
            user: session.user.clone(),
        });
        Ok(session)
    }

    async fn set_session(
        &self,
        access_token: &SecretString,
        refresh_token: &SecretString,
    ) -> Result<Session> {
        let session = match jwt_expiry(access_token.expose_secret()) {
            Some(exp) if exp > now() => {
                let user = self.fetch_user(access_token).await?;
                Session {
                    access_token: SecretString::from(access_token.expose_secret().to_string()),
                    refresh_token: SecretString::from(refresh_token.expose_secret().to_string()),
                    expires_at: exp,
                    user,
                }
            }
            // Expired or undecodable: the refresh token decides
            _ => self
                .refresh(refresh_token)
                .await?
                .map_err(HttpFailure::into_auth_error)?,
        };

        self.persist(&session).await?;
        self.events.emit(AuthEvent::SignedIn {
            user: session.user.clone(),
        });
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let stored = self.load_stored().await?;
        self.clear_stored().await?;

        let Some(session) = stored else {
            return Ok(());
        };
        self.events.emit(AuthEvent::SignedOut);

        let builder = self
            .request(reqwest::Method::POST, "logout")
            .bearer_auth(session.access_token.expose_secret());
        match self.send(builder, "Sign-out").await? {
            Ok(_) => Ok(()),
            // Already revoked or expired server side
            Err(failure) if failure.is_gone() => Ok(()),
            Err(failure) => Err(failure.into_auth_error().into()),
        }
    }

    fn subscribe(&self) -> AuthEventReceiver {
        self.events.subscribe()
    }

    fn name(&self) -> &str {
        "gotrue"
    }
}

#[async_trait]
impl OtpProvider for GoTrueClient {
    async fn send_code(&self, phone: &str) -> Result<()> {
        let builder = self
            .request(reqwest::Method::POST, "otp")
            .json(&serde_json::json!({ "phone": phone }));
        self.send(builder, "Send code")
            .await?
            .map(|_| ())
            .map_err(|failure| failure.into_auth_error().into())
    }

    async fn verify_code(&self, phone: &str, code: &str) -> Result<()> {
        let builder = self
            .request(reqwest::Method::POST, "verify")
            .json(&serde_json::json!({ "type": "sms", "phone": phone, "token": code }));
        match self.send(builder, "Code verification").await? {
            // The returned session is not kept: phone logins are tracked by local markers
            Ok(_) => Ok(()),
            Err(failure) if failure.is_client_error() => {
                Err(AuthError::InvalidCode(failure.describe()).into())
            }
            Err(failure) => Err(failure.into_auth_error().into()),
        }
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn generate_code_verifier() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CODE_VERIFIER_LEN)
        .map(char::from)
        .collect()
}

/// S256 challenge: unpadded base64url of the verifier's SHA-256
fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// `exp` claim of a JWT, without verifying the signature
fn jwt_expiry(token: &str) -> Option<i64> {
    #[derive(Deserialize)]
    struct Claims {
        exp: i64,
    }

    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice::<Claims>(&bytes).ok().map(|c| c.exp)
}
