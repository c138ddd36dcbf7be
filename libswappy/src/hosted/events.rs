//! Auth-state-change events
//!
//! Hosted implementations emit an event whenever their session changes
//! underneath the session manager (sign-in completed elsewhere, token
//! refreshed, session revoked). Delivery uses `tokio::sync::broadcast`:
//! with no subscribers the event is dropped, and a lagging subscriber
//! misses the oldest events instead of blocking the emitter.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::HostedUser;

pub type AuthEventReceiver = broadcast::Receiver<AuthEvent>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn { user: HostedUser },
    TokenRefreshed { user: HostedUser },
    SignedOut,
}

impl AuthEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuthEvent::SignedIn { .. } => "SIGNED_IN",
            AuthEvent::TokenRefreshed { .. } => "TOKEN_REFRESHED",
            AuthEvent::SignedOut => "SIGNED_OUT",
        }
    }
}

#[derive(Clone)]
pub struct AuthEventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEventBus {
    /// `capacity` is the per-subscriber buffer before lagging kicks in
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> AuthEventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: AuthEvent) {
        tracing::debug!("Auth state changed: {}", event.name());
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new(32)
    }
}
