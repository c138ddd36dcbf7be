//! External browser round trip for federated login
//!
//! The session manager hands an authorize URL to an `AuthBrowser` and
//! waits for the redirect back to the app. How the browser is shown is up
//! to the embedding: the CLI prints the URL and reads the redirect from
//! stdin, tests use `MockBrowser`.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::Result;

/// How an auth session in the external browser ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOutcome {
    /// The provider redirected back; carries the full redirect URL
    Success(String),
    /// The user cancelled the flow
    Cancel,
    /// The browser was closed without a redirect
    Dismiss,
}

#[async_trait]
pub trait AuthBrowser: Send + Sync {
    /// Open `url` and wait until the browser returns to `redirect_url`
    /// or the user gives up
    async fn open_auth_session(&self, url: &str, redirect_url: &str) -> Result<BrowserOutcome>;
}

/// Scripted browser for tests
///
/// Each call pops the next `(delay, outcome)` pair; with nothing queued
/// it reports `Dismiss`.
#[derive(Clone, Default)]
pub struct MockBrowser {
    outcomes: Arc<Mutex<VecDeque<(Duration, BrowserOutcome)>>>,
    opened: Arc<Mutex<Vec<String>>>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Browser that immediately returns `outcome`
    pub fn returning(outcome: BrowserOutcome) -> Self {
        let browser = Self::new();
        browser.push(Duration::from_millis(0), outcome);
        browser
    }

    pub fn push(&self, delay: Duration, outcome: BrowserOutcome) {
        self.outcomes.lock().unwrap().push_back((delay, outcome));
    }

    /// URLs passed to `open_auth_session`, oldest first
    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBrowser for MockBrowser {
    async fn open_auth_session(&self, url: &str, _redirect_url: &str) -> Result<BrowserOutcome> {
        self.opened.lock().unwrap().push(url.to_string());

        let next = self.outcomes.lock().unwrap().pop_front();
        let (delay, outcome) = next.unwrap_or((Duration::from_millis(0), BrowserOutcome::Dismiss));
        if !delay.is_zero() {
            sleep(delay).await;
        }
        Ok(outcome)
    }
}
