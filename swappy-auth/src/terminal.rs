//! Browser round trip driven from the terminal
//!
//! There is no embedded browser in a CLI. The authorize URL is printed,
//! the user completes the login in any browser and pastes the URL they
//! were redirected to.

use async_trait::async_trait;
use libswappy::browser::{AuthBrowser, BrowserOutcome};
use libswappy::error::{AuthError, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct TerminalBrowser;

#[async_trait]
impl AuthBrowser for TerminalBrowser {
    async fn open_auth_session(&self, url: &str, redirect_url: &str) -> Result<BrowserOutcome> {
        let interactive = atty::is(atty::Stream::Stdin);
        if interactive {
            eprintln!("Open this URL in your browser to sign in:\n\n  {}\n", url);
            eprintln!(
                "Then paste the {} URL you were redirected to (empty line cancels):",
                redirect_url
            );
        } else {
            println!("{}", url);
        }

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::Hosted(format!("Failed to read redirect URL: {}", e)))?;

        Ok(classify(read, line.trim()))
    }
}

/// EOF dismisses, an empty line cancels, anything else is the redirect
fn classify(bytes_read: usize, line: &str) -> BrowserOutcome {
    if bytes_read == 0 {
        BrowserOutcome::Dismiss
    } else if line.is_empty() {
        BrowserOutcome::Cancel
    } else {
        BrowserOutcome::Success(line.to_string())
    }
}
