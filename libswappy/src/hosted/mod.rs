//! Hosted identity/session service
//!
//! Swappy does not own user accounts; a hosted auth service does. This
//! module defines the narrow surface the session manager consumes and two
//! implementations of it:
//!
//! - `gotrue::GoTrueClient`: REST client for the hosted service
//! - `mock::MockHostedAuth`: configurable double for tests
//!
//! Implementations are expected to be idempotent on retry, and `sign_out`
//! must invalidate server-side state when a session exists.

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::Result;
use crate::types::Session;

pub mod events;
pub mod gotrue;
// Mock is available for all builds (not just tests) to support integration tests
pub mod mock;

pub use events::{AuthEvent, AuthEventBus, AuthEventReceiver};

#[async_trait]
pub trait HostedAuth: Send + Sync {
    /// The current session, refreshed if it is about to expire.
    /// `None` when nobody is signed in with the hosted service.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// URL to open in the external browser to start a federated login
    /// with `provider`, returning to `redirect_to` when done
    async fn authorize_url(&self, provider: &str, redirect_to: &str) -> Result<String>;

    /// Trade an authorization code (PKCE flow) for a session
    async fn exchange_code_for_session(&self, code: &str) -> Result<Session>;

    /// Establish a session from an access/refresh token pair (implicit flow)
    async fn set_session(
        &self,
        access_token: &SecretString,
        refresh_token: &SecretString,
    ) -> Result<Session>;

    /// Invalidate the session locally and on the server. Signing out
    /// without a session is a no-op.
    async fn sign_out(&self) -> Result<()>;

    /// Auth-state-change notifications
    fn subscribe(&self) -> AuthEventReceiver;

    /// Implementation name for logs
    fn name(&self) -> &str;
}
