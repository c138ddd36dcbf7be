//! swappy-auth - Inspect and drive the Swappy login session
//!
//! Uses the same session manager as the app, backed by the hosted auth
//! service and a local session file.

mod terminal;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use libswappy::hosted::gotrue::GoTrueClient;
use libswappy::logging::LoggingConfig;
use libswappy::otp::OtpLogin;
use libswappy::storage::FileStore;
use libswappy::{Config, Identity, OtpProgress, SessionManager, SessionOptions, SessionStatus, SwappyError};
use std::sync::Arc;
use tracing::error;

use crate::terminal::TerminalBrowser;

#[derive(Parser)]
#[command(name = "swappy-auth")]
#[command(about = "Inspect and drive the Swappy login session", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show who is signed in
    Status,

    /// Sign in with the configured OAuth provider
    Login,

    /// Complete a sign-in from a redirect URL
    Callback {
        /// Redirect URL, e.g. swappy://oauth-callback?code=...
        url: String,
    },

    /// Phone one-time-code login
    Otp {
        #[command(subcommand)]
        action: OtpAction,
    },

    /// Choose interests to finish onboarding after a phone login
    Onboard {
        /// At least three interests
        #[arg(required = true)]
        interests: Vec<String>,
    },

    /// Sign out of every login source
    Logout,
}

#[derive(Subcommand)]
enum OtpAction {
    /// Send a code to a mobile number
    Send {
        mobile: String,
    },

    /// Verify a received code
    Verify {
        mobile: String,

        code: String,

        /// Email to associate with the phone login
        #[arg(long)]
        email: Option<String>,

        /// The account already picked its interests
        #[arg(long)]
        onboarded: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose).init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// Library errors carry their own exit code; anything else is 1
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SwappyError>())
        .map(SwappyError::exit_code)
        .unwrap_or(1)
}

fn build_manager(config: &Config) -> Result<SessionManager> {
    let store = Arc::new(FileStore::new(config.storage.expand_path()));
    let hosted = Arc::new(GoTrueClient::new(&config.backend, store.clone())?);
    let options = SessionOptions::from_config(config)?;

    Ok(SessionManager::new(
        hosted.clone(),
        hosted,
        store,
        Arc::new(TerminalBrowser),
        options,
    ))
}

async fn run(cli: Cli) -> Result<()> {
    // Missing backend settings abort before any command runs
    let config = Config::load().context("Failed to load configuration")?;
    let manager = build_manager(&config)?;
    let format = cli.format;

    match cli.command {
        Commands::Status => {
            let status = manager.start().await?;
            print_status(&status, format)
        }
        Commands::Login => {
            let identity = manager.sign_in_with_oauth().await?;
            print_signed_in(&identity, format)
        }
        Commands::Callback { url } => match manager.handle_deep_link(&url).await? {
            Some(identity) => print_signed_in(&identity, format),
            None => anyhow::bail!("Redirect URL carried no credentials"),
        },
        Commands::Otp { action } => match action {
            OtpAction::Send { mobile } => {
                manager.send_otp(&mobile).await?;
                println!("Code sent");
                Ok(())
            }
            OtpAction::Verify {
                mobile,
                code,
                email,
                onboarded,
            } => {
                let progress = manager
                    .verify_otp(OtpLogin {
                        mobile,
                        code,
                        email,
                        onboarded,
                    })
                    .await?;
                print_progress(&progress, format)
            }
        },
        Commands::Onboard { interests } => {
            let progress = manager.complete_onboarding(&interests).await?;
            print_progress(&progress, format)
        }
        Commands::Logout => {
            manager.sign_out().await?;
            println!("Signed out");
            Ok(())
        }
    }
}

fn print_status(status: &SessionStatus, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let user = match status {
                SessionStatus::Authenticated(identity) => Some(identity),
                _ => None,
            };
            println!("{}", serde_json::to_string(&serde_json::json!({ "user": user }))?);
        }
        OutputFormat::Text => match status {
            SessionStatus::Authenticated(identity) => {
                println!("Signed in ({}): {}", identity.source(), identity.display_id());
            }
            _ => println!("Not signed in"),
        },
    }
    Ok(())
}

fn print_signed_in(identity: &Identity, format: OutputFormat) -> Result<()> {
    print_status(&SessionStatus::Authenticated(identity.clone()), format)
}

fn print_progress(progress: &OtpProgress, format: OutputFormat) -> Result<()> {
    match (progress, format) {
        (OtpProgress::SignedIn(identity), _) => print_signed_in(identity, format),
        (OtpProgress::OnboardingRequired, OutputFormat::Json) => {
            println!("{}", serde_json::to_string(&progress_json(progress))?);
            Ok(())
        }
        (OtpProgress::OnboardingRequired, OutputFormat::Text) => {
            println!("Code verified. Choose your interests with `swappy-auth onboard` to finish.");
            Ok(())
        }
    }
}

fn progress_json(progress: &OtpProgress) -> serde_json::Value {
    match progress {
        OtpProgress::SignedIn(identity) => serde_json::json!({ "user": identity }),
        OtpProgress::OnboardingRequired => serde_json::json!({
            "user": null,
            "onboarding_required": true,
        }),
    }
}
