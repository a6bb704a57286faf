//! authsession - log in to the API, register accounts, and inspect or end the
//! stored session from the terminal.
//!
//! Every invocation activates the session manager first, so a stored
//! credential is always re-validated before the command runs.

use std::io::{self, Write};

use anyhow::{bail, Result};
use authsession_core::auth::{KeyValueStore, SessionManager};
use authsession_core::Config;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Directory for an additional log file; unset means stderr only
const LOG_DIR_ENV: &str = "AUTHSESSION_LOG_DIR";

const LOG_FILE: &str = "authsession.log";

const USAGE: &str = "\
Usage: authsession <command>

Commands:
  login [username]            Log in and store the credential
  register <username> <email> Create an account (does not log in)
  logout                      Forget the stored credential
  whoami                      Show the logged-in user
  status                      Print the session state as JSON
  help                        Show this message

Environment:
  API_BASE_URL                API host (default http://localhost)
  RUST_LOG                    Log filter (default warn)
  AUTHSESSION_LOG_DIR         Also write logs to <dir>/authsession.log";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { username: Option<String> },
    Register { username: String, email: String },
    Logout,
    Whoami,
    Status,
    Help,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let mut args = args.iter().map(String::as_str);
    let command = match (args.next(), args.next(), args.next()) {
        (Some("login"), username, None) => Command::Login {
            username: username.map(str::to_string),
        },
        (Some("register"), Some(username), Some(email)) => Command::Register {
            username: username.to_string(),
            email: email.to_string(),
        },
        (Some("logout"), None, None) => Command::Logout,
        (Some("whoami"), None, None) => Command::Whoami,
        (Some("status"), None, None) => Command::Status,
        (None | Some("help" | "-h" | "--help"), _, _) => Command::Help,
        (Some(other), _, _) => bail!("Unrecognized arguments starting at '{}'\n\n{}", other, USAGE),
    };

    if args.next().is_some() {
        bail!("Too many arguments\n\n{}", USAGE);
    }
    Ok(command)
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(LOG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_args(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let _log_guard = init_tracing();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        }
    };

    let api = config.api_client()?;
    let store = config.open_store()?;
    info!(api = %api.base_url(), storage = ?config.storage, "authsession starting");

    let mut session = SessionManager::activate(api, store).await;
    run(command, &mut session).await
}

async fn run<S: KeyValueStore>(command: Command, session: &mut SessionManager<S>) -> Result<()> {
    match command {
        Command::Login { username } => {
            let username = match username {
                Some(u) => u,
                None => prompt("Username: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            if username.is_empty() || password.is_empty() {
                bail!("Username and password required");
            }

            println!("Authenticating...");
            match session.login(&username, &password).await {
                Ok(user) => println!("Logged in as {}", user.display_line()),
                Err(e) => {
                    let message = session
                        .error()
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string());
                    bail!("Login failed: {}", message);
                }
            }
        }
        Command::Register { username, email } => {
            let password = rpassword::prompt_password("Password: ")?;
            if password.is_empty() {
                bail!("Password required");
            }

            let user = session.register(&username, &email, &password).await?;
            println!("Registered {}", user.display_line());
            println!("Run `authsession login {}` to start a session.", user.username);
        }
        Command::Logout => {
            session.logout();
            println!("Logged out");
        }
        Command::Whoami => match (session.user(), session.error()) {
            (Some(user), _) => println!("{}", user.display_line()),
            (None, Some(error)) => bail!("{}", error),
            (None, None) => bail!("Not logged in"),
        },
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&session.state())?);
        }
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}
