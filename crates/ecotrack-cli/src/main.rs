//! EcoTrack CLI - account and session commands for the EcoTrack API.
//!
//! Tokens persist between runs in the configured token store, so `login`
//! once and later commands reuse (and transparently refresh) the session.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ecotrack_core::api::{ApiClient, ApiError};
use ecotrack_core::auth::{SessionManager, SessionState};
use ecotrack_core::config::Config;
use ecotrack_core::models::{
    LoginRequest, MyCollection, PasswordChange, ProfileUpdate, SignupRequest, UserRecord,
};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ecotrack", version, about = "EcoTrack account and session commands")]
struct Cli {
    /// API base URL (overrides config and ECOTRACK_API_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Log out and forget stored tokens
    Logout,
    /// Show the current user
    Whoami,
    /// Show session state without failing when logged out
    Status,
    /// Create a new account
    Signup {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "")]
        first_name: String,
        #[arg(long, default_value = "")]
        last_name: String,
    },
    /// Update profile fields of the current user
    UpdateProfile {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        bio: Option<String>,
        #[arg(long)]
        phone_number: Option<String>,
        #[arg(long)]
        date_of_birth: Option<String>,
        #[arg(long)]
        gender: Option<String>,
        #[arg(long)]
        city: Option<i64>,
    },
    /// Change the current user's password
    ChangePassword,
    /// List your actions, challenges or leaderboard entries
    List {
        #[arg(value_enum)]
        collection: CollectionArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CollectionArg {
    Actions,
    Challenges,
    Leaderboard,
}

impl From<CollectionArg> for MyCollection {
    fn from(arg: CollectionArg) -> Self {
        match arg {
            CollectionArg::Actions => MyCollection::Actions,
            CollectionArg::Challenges => MyCollection::Challenges,
            CollectionArg::Leaderboard => MyCollection::Leaderboard,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.base_url {
        config.api_base_url = url;
    }
    debug!(base_url = %config.api_base_url, storage = ?config.storage, "Loaded config");

    let tokens = config.token_store()?;
    let api = ApiClient::new(&config.api_base_url, tokens, config.request_timeout())
        .context("Failed to create API client")?;
    let session = SessionManager::new(api);

    match cli.command {
        Command::Login { email } => login(&session, &mut config, email).await,
        Command::Logout => {
            session.logout().await;
            println!("Logged out.");
            Ok(())
        }
        Command::Whoami => {
            let user = require_user(&session).await?;
            print_json(&user)
        }
        Command::Status => status(&session).await,
        Command::Signup {
            username,
            email,
            first_name,
            last_name,
        } => {
            let password = prompt_new_password("Password")?;
            let request = SignupRequest {
                username,
                email,
                password,
                first_name,
                last_name,
                ..Default::default()
            };
            let user = session
                .api()
                .signup(&request)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Signup failed.")))?;
            println!("Account created for {}. Run `ecotrack login` to sign in.", user.display_name());
            Ok(())
        }
        Command::UpdateProfile {
            username,
            email,
            first_name,
            last_name,
            bio,
            phone_number,
            date_of_birth,
            gender,
            city,
        } => {
            let update = ProfileUpdate {
                username,
                email,
                first_name,
                last_name,
                avatar: None,
                bio,
                phone_number,
                date_of_birth,
                gender,
                city,
            };
            if update.is_empty() {
                bail!("Nothing to update. Pass at least one field, e.g. --bio.");
            }
            require_user(&session).await?;
            let user = session
                .update_profile(&update)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Profile update failed.")))?;
            print_json(&user)
        }
        Command::ChangePassword => {
            require_user(&session).await?;
            let current_password = rpassword::prompt_password("Current password: ")?;
            let new_password = prompt_new_password("New password")?;
            let change = PasswordChange {
                current_password,
                re_new_password: new_password.clone(),
                new_password,
            };
            let detail = session
                .change_password(&change)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message("Password change failed.")))?;
            let message = if detail.detail.is_empty() {
                "Password changed."
            } else {
                detail.detail.as_str()
            };
            println!("{}", message);
            Ok(())
        }
        Command::List { collection } => {
            require_user(&session).await?;
            let items = session.my_collection(collection.into()).await?;
            print_json(&items)
        }
    }
}

async fn login(session: &SessionManager, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let credentials = LoginRequest::new(email.clone(), password);
    let current = session
        .login(&credentials)
        .await
        .map_err(|e| anyhow::anyhow!(login_message(&e)))?;

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        debug!(error = %e, "Failed to save config");
    }

    let name = current
        .user
        .as_ref()
        .map(UserRecord::display_name)
        .unwrap_or_default();
    info!(user_id = ?current.user_id(), "Logged in");
    println!("Logged in as {}.", name);
    Ok(())
}

fn login_message(err: &ApiError) -> String {
    if err.is_transport() {
        return format!("Could not reach the server: {}", err);
    }
    err.user_message("Login failed. Check your email and password.")
}

/// Restore the stored session and return the confirmed user.
async fn require_user(session: &SessionManager) -> Result<UserRecord> {
    let current = session.restore().await.map_err(|e| {
        debug!(error = %e, "Session restore failed");
        anyhow::anyhow!("Your session has expired. Run `ecotrack login` again.")
    })?;
    match current.user {
        Some(user) => Ok(user),
        None => bail!("Not logged in. Run `ecotrack login` first."),
    }
}

async fn status(session: &SessionManager) -> Result<()> {
    let current = match session.restore().await {
        Ok(current) => current,
        Err(e) => {
            debug!(error = %e, "Session restore failed");
            session.session()
        }
    };
    match current.state() {
        SessionState::Authenticated => {
            let name = current
                .user
                .as_ref()
                .map(UserRecord::display_name)
                .unwrap_or_default();
            let since = current
                .authenticated_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_default();
            println!("Authenticated as {} (confirmed {}).", name, since);
        }
        SessionState::Pending => println!("Token stored but not confirmed."),
        SessionState::Anonymous => println!("Not logged in."),
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("{} is required", label.trim_end_matches(": "));
    }
    Ok(value)
}

fn prompt_new_password(label: &str) -> Result<String> {
    let first = rpassword::prompt_password(format!("{}: ", label))?;
    let second = rpassword::prompt_password(format!("Repeat {}: ", label.to_lowercase()))?;
    if first != second {
        bail!("Passwords do not match.");
    }
    if first.is_empty() {
        bail!("Password cannot be empty.");
    }
    Ok(first)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
