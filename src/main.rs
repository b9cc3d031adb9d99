mod api;
mod chat;
mod config;
mod logging;
mod paths;
mod prefs;
mod session;
mod stream;
mod tui;
mod uploads;
mod util;

use crate::api::{ApiClient, UserRole, UserStatus, UserUpdate};
use crate::config::Config;
use crate::session::StoredSession;
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "deepchat", version)]
#[command(about = "Deepchat — terminal client for a multi-agent research assistant", long_about = None)]
struct Cli {
    /// Backend base URL (overrides the config file)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and store the session for later runs
    Login {
        /// Username (prompted if omitted)
        username: Option<String>,
    },
    /// Log out and clear the stored session
    Logout,
    /// Show the currently authenticated user
    Whoami,
    /// Manage users (admin only)
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    /// List all users
    List,
    /// Create a user (password is prompted)
    Create {
        username: String,

        /// Grant the admin role
        #[arg(long, default_value_t = false)]
        admin: bool,
    },
    /// Change a user's role
    SetRole {
        id: String,
        role: RoleArg,
    },
    /// Enable or disable a user
    SetStatus {
        id: String,
        status: StatusArg,
    },
    /// Reset a user's password (prompted)
    ResetPassword {
        id: String,
    },
    /// Delete a user
    Delete {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RoleArg {
    Admin,
    User,
}

impl From<RoleArg> for UserRole {
    fn from(value: RoleArg) -> Self {
        match value {
            RoleArg::Admin => UserRole::Admin,
            RoleArg::User => UserRole::User,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusArg {
    Active,
    Disabled,
}

impl From<StatusArg> for UserStatus {
    fn from(value: StatusArg) -> Self {
        match value {
            StatusArg::Active => UserStatus::Active,
            StatusArg::Disabled => UserStatus::Disabled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (mut config, config_path) = Config::load_with_path().unwrap_or_else(|e| {
        eprintln!("Warning: failed to load config, using defaults: {e}");
        (Config::default(), None)
    });

    let cli = Cli::parse();
    if let Some(server) = cli.server {
        config.server.base_url = server;
    }
    config.validate()?;

    // Lightweight subcommands, no tracing needed.
    match cli.cmd {
        Some(Command::Login { username }) => return cmd_login(&config, username).await,
        Some(Command::Logout) => return cmd_logout(&config).await,
        Some(Command::Whoami) => return cmd_whoami(&config).await,
        Some(Command::Admin { action }) => return cmd_admin(&config, action).await,
        None => {}
    }

    // Default: the chat TUI. Suppress stdout logging, ratatui owns the
    // terminal.
    match logging::setup_tracing_with_settings(logging::LoggingSettings {
        level: config.logging.level.as_deref(),
        directory: config.logging.directory.as_deref(),
        retention_days: config.logging.retention_days,
        suppress_stdout: true,
    }) {
        Ok(dir) => tracing::info!("Log directory: {}", dir.display()),
        Err(e) => eprintln!("Failed to initialize logging: {e}"),
    }
    if let Some(path) = config_path.as_ref() {
        tracing::info!("Config file: {}", path.display());
    }
    tracing::info!("Server: {}", config.server.base_url);

    let session = StoredSession::load(&paths::session_file());
    if !session.is_logged_in() {
        anyhow::bail!("Not logged in — run `deepchat login` first");
    }
    tracing::debug!("Loaded session: {:?}", session.redacted());
    let client = Arc::new(ApiClient::with_session(
        &config.server.base_url,
        session.token.as_deref(),
    )?);
    if !client.health_check().await {
        eprintln!(
            "Warning: backend at {} is not responding",
            config.server.base_url
        );
    }
    let user = client
        .current_user()
        .await
        .map_err(|e| anyhow!("Session check failed: {e}"))?;
    tracing::info!("Authenticated as {} ({:?})", user.username, user.role);

    tui::run_tui(&config, client, user).await
}

async fn cmd_login(config: &Config, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(u) => u,
        None => prompt_line("Username: ")?,
    };
    let password = prompt_password("Password: ")?;

    let client = ApiClient::new(&config.server.base_url)?;
    let outcome = client.login(&username, &password).await?;
    let Some(cookie) = outcome.session_cookie else {
        anyhow::bail!("Server did not return a session cookie");
    };

    StoredSession {
        token: Some(cookie),
        username: Some(outcome.user.username.clone()),
    }
    .save(&paths::session_file())?;
    println!(
        "Logged in as {} ({:?})",
        outcome.user.username, outcome.user.role
    );
    Ok(())
}

async fn cmd_logout(config: &Config) -> Result<()> {
    let session = StoredSession::load(&paths::session_file());
    if session.is_logged_in() {
        let client =
            ApiClient::with_session(&config.server.base_url, session.token.as_deref())?;
        // Best effort; the local session is cleared regardless.
        if let Err(e) = client.logout().await {
            eprintln!("Warning: server logout failed: {e}");
        }
    }
    StoredSession::clear(&paths::session_file())?;
    println!("Logged out.");
    Ok(())
}

async fn cmd_whoami(config: &Config) -> Result<()> {
    let client = authed_client(config)?;
    let user = client.current_user().await?;
    println!("{} ({:?}, {:?})", user.username, user.role, user.status);
    Ok(())
}

async fn cmd_admin(config: &Config, action: AdminAction) -> Result<()> {
    let client = authed_client(config)?;
    match action {
        AdminAction::List => {
            let users = client.list_users().await?;
            println!(
                "{:<24} {:<20} {:<8} {:<9} {}",
                "ID", "USERNAME", "ROLE", "STATUS", "CREATED"
            );
            for user in users {
                println!(
                    "{:<24} {:<20} {:<8} {:<9} {}",
                    user.id,
                    user.username,
                    format!("{:?}", user.role).to_lowercase(),
                    format!("{:?}", user.status).to_lowercase(),
                    user.created_at,
                );
            }
        }
        AdminAction::Create { username, admin } => {
            let password = prompt_password("Password for new user: ")?;
            let role = if admin { UserRole::Admin } else { UserRole::User };
            let user = client.create_user(&username, &password, role).await?;
            println!("Created user {} (id {})", user.username, user.id);
        }
        AdminAction::SetRole { id, role } => {
            let user = client
                .update_user(
                    &id,
                    &UserUpdate {
                        role: Some(role.into()),
                        ..Default::default()
                    },
                )
                .await?;
            println!("{} is now {:?}", user.username, user.role);
        }
        AdminAction::SetStatus { id, status } => {
            let user = client
                .update_user(
                    &id,
                    &UserUpdate {
                        status: Some(status.into()),
                        ..Default::default()
                    },
                )
                .await?;
            println!("{} is now {:?}", user.username, user.status);
        }
        AdminAction::ResetPassword { id } => {
            let password = prompt_password("New password: ")?;
            let user = client
                .update_user(
                    &id,
                    &UserUpdate {
                        password: Some(password),
                        ..Default::default()
                    },
                )
                .await?;
            println!("Password reset for {}", user.username);
        }
        AdminAction::Delete { id } => {
            client.delete_user(&id).await?;
            println!("Deleted user {id}");
        }
    }
    Ok(())
}

fn authed_client(config: &Config) -> Result<ApiClient> {
    let session = StoredSession::load(&paths::session_file());
    if !session.is_logged_in() {
        anyhow::bail!("Not logged in — run `deepchat login` first");
    }
    ApiClient::with_session(&config.server.base_url, session.token.as_deref())
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Read a password without echoing, via raw-mode key events.
fn prompt_password(prompt: &str) -> Result<String> {
    use crossterm::event::{read, Event, KeyCode, KeyEventKind, KeyModifiers};

    print!("{prompt}");
    std::io::stdout().flush()?;

    crossterm::terminal::enable_raw_mode()?;
    let mut password = String::new();
    let outcome = loop {
        match read() {
            Ok(Event::Key(key)) => {
                if key.kind == KeyEventKind::Release {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => break Ok(()),
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        break Err(anyhow!("Interrupted"));
                    }
                    KeyCode::Char(ch) => password.push(ch),
                    KeyCode::Backspace => {
                        password.pop();
                    }
                    _ => {}
                }
            }
            Ok(_) => {}
            Err(e) => break Err(e.into()),
        }
    };
    crossterm::terminal::disable_raw_mode()?;
    println!();
    outcome.map(|_| password)
}
