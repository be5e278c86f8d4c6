//! sessionguard - command-line host for the session guard layer.
//!
//! Wires the credential store, navigation guard, session tracker and API
//! client together the same way a web front-end would, so sessions can be
//! inspected and exercised from a terminal.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use sessionguard_core::api::{ApiClient, ApiError, Method, RequestOptions};
use sessionguard_core::auth::{CredentialKind, CredentialStore, SessionTracker};
use sessionguard_core::config::Config;
use sessionguard_core::routing::{NavigationGuard, Router};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "sessionguard", version, about = "Exercise a session guard from the terminal")]
struct Cli {
    /// Overrides `api_base_url` from the config file
    #[arg(long, global = true, env = "SESSIONGUARD_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a credential
    Login {
        token: String,
        /// Act on the admin credential instead of the user one
        #[arg(long)]
        admin: bool,
    },
    /// Remove a credential
    Logout {
        #[arg(long)]
        admin: bool,
    },
    /// Show which credentials are present and when they were stored
    Status,
    /// Run a navigation through the guard
    Navigate { path: String },
    /// Call an API endpoint with the stored credential
    Request {
        url: String,
        #[arg(long)]
        admin: bool,
        /// HTTP method; defaults to GET, or POST when --data is given
        #[arg(long, value_parser = parse_method)]
        method: Option<Method>,
        /// JSON request body
        #[arg(long, value_parser = parse_json)]
        data: Option<serde_json::Value>,
        /// Extra header as 'Name: value'; may be repeated
        #[arg(long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {}", raw))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("must be valid JSON: {}", e))
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("header must look like 'Name: value', got {:?}", raw)),
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();
    guard
}

/// Everything a page of the front-end would have access to.
struct Host {
    store: Arc<dyn CredentialStore>,
    tracker: Arc<SessionTracker>,
    router: Arc<Router>,
    api: ApiClient,
}

impl Host {
    fn build(config: &Config) -> Result<Self> {
        let store = config.open_store()?;

        let router = Arc::new(Router::new(config.route_table()));
        router.before_each(Arc::new(NavigationGuard::new(store.clone())));

        let tracker = Arc::new(SessionTracker::new(store.clone()));
        tracker.attach(&router)?;

        let api = ApiClient::new(store.clone(), router.clone(), config.client_settings())?;

        Ok(Self {
            store,
            tracker,
            router,
            api,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    let _log_guard = init_tracing();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_base_url = Some(url);
    }
    let host = Host::build(&config)?;
    debug!(command = ?cli.command, "sessionguard starting");

    match cli.command {
        Command::Login { token, admin } => {
            login(&host, &token, CredentialKind::from_admin_flag(admin))
        }
        Command::Logout { admin } => logout(&host, CredentialKind::from_admin_flag(admin)),
        Command::Status => status(&host),
        Command::Navigate { path } => navigate(&host, &path),
        Command::Request {
            url,
            admin,
            method,
            data,
            headers,
        } => {
            let options = request_options(method, data, headers);
            request(&host, &url, options, CredentialKind::from_admin_flag(admin)).await
        }
    }
}

fn login(host: &Host, token: &str, kind: CredentialKind) -> Result<()> {
    match kind {
        CredentialKind::User => host.tracker.login(token)?,
        CredentialKind::Admin => {
            host.store.set(CredentialKind::Admin, token)?;
            info!("Admin logged in");
        }
    }
    println!("Stored {} credential", kind);
    Ok(())
}

fn logout(host: &Host, kind: CredentialKind) -> Result<()> {
    match kind {
        CredentialKind::User => host.tracker.logout()?,
        CredentialKind::Admin => {
            host.store.clear(CredentialKind::Admin)?;
            info!("Admin logged out");
        }
    }
    println!("Removed {} credential", kind);
    Ok(())
}

fn status(host: &Host) -> Result<()> {
    let logged_in = host.tracker.check_auth_state()?;
    let user_at = host.store.stored_at(CredentialKind::User)?;
    let admin = host.store.has(CredentialKind::Admin)?;
    let admin_at = host.store.stored_at(CredentialKind::Admin)?;

    println!("{}", status_line(CredentialKind::User, logged_in, user_at));
    println!("{}", status_line(CredentialKind::Admin, admin, admin_at));
    Ok(())
}

fn status_line(kind: CredentialKind, present: bool, stored_at: Option<DateTime<Utc>>) -> String {
    let label = format!("{}:", kind);
    match (present, stored_at) {
        (true, Some(at)) => format!(
            "{:<6} logged in (stored {})",
            label,
            at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        (true, None) => format!("{:<6} logged in", label),
        (false, _) => format!("{:<6} logged out", label),
    }
}

fn navigate(host: &Host, path: &str) -> Result<()> {
    let nav = host.router.push(path)?;

    match &nav.redirected_from {
        Some(from) => println!("{} (redirected from {})", nav.route.path, from),
        None => println!("{}", nav.route.path),
    }
    Ok(())
}

fn request_options(
    method: Option<Method>,
    data: Option<serde_json::Value>,
    headers: Vec<(String, String)>,
) -> RequestOptions {
    let mut options = match data {
        Some(body) => RequestOptions::post(body),
        None => RequestOptions::get(),
    };
    if let Some(method) = method {
        options = options.method(method);
    }
    for (name, value) in headers {
        options = options.header(name, value);
    }
    options
}

async fn request(
    host: &Host,
    url: &str,
    options: RequestOptions,
    kind: CredentialKind,
) -> Result<()> {
    match host.api.api_request(url, options, kind).await {
        Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Err(ApiError::SessionInvalidated) => {
            let landed = host.router.current().map(|r| r.path).unwrap_or_default();
            bail!("{} (now at {})", ApiError::SessionInvalidated, landed);
        }
        Err(e) => Err(e.into()),
    }
}
