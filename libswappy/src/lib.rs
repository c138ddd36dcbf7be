//! Swappy - session reconciliation for the skill-swapping app
//!
//! This library decides who is logged in when two independent login
//! mechanisms exist: federated OAuth through a hosted auth service and a
//! phone one-time-code flow tracked in local storage. It also carries the
//! small client-side helpers the feed screens use.

pub mod browser;
pub mod callback;
pub mod config;
pub mod error;
pub mod feed;
pub mod hosted;
pub mod logging;
pub mod otp;
pub mod routing;
pub mod session;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AuthError, Result, SwappyError};
pub use session::{AppLifecycle, OtpProgress, SessionManager, SessionOptions};
pub use types::{AuthSnapshot, Identity, SessionSource, SessionStatus};
