//! CLI command implementations

use anyhow::{bail, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{self, expiry, Credentials, SessionManager, TokenScope};
use crate::cli::{
    describe_user, error, format_phase, info, print_status_table, success, warn, OutputFormat,
    StatusReport,
};
use crate::client::{AuthApi, HttpAuthApi};
use crate::config::{self, loader::CONFIG_FILENAME, Config, StorageBackend};
use crate::devserver;
use crate::storage::{FileStorage, MemoryStorage, StorageArea};

/// Initialize a new screener.toml configuration file
pub async fn init() -> Result<()> {
    let config_path = Path::new(CONFIG_FILENAME);

    if config_path.exists() {
        warn(&format!("{} already exists", CONFIG_FILENAME));
        return Ok(());
    }

    let content = config::loader::default_config_content();
    fs::write(config_path, content)?;

    success(&format!("Created {}", CONFIG_FILENAME));
    info("Run 'screener serve' for a local auth server, then 'screener login'");

    Ok(())
}

/// Log in and store the issued tokens
pub async fn login(email: Option<String>, password: Option<String>, remember_me: bool) -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = open_session(&config)?.session;
    let theme = ColorfulTheme::default();

    let email = match email {
        Some(email) => email,
        None => Input::with_theme(&theme)
            .with_prompt("Email")
            .interact_text()?,
    };
    let password = match password {
        Some(password) => password,
        None => Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()?,
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(format!("Signing in to {}...", config.api.base_url));

    let credentials = Credentials::new(email, password).remember_me(remember_me);
    match session.login(&credentials).await {
        Ok(user) => {
            pb.finish_and_clear();
            success(&format!("Logged in as {}", describe_user(&user)));
            if remember_me {
                info("Session will be remembered");
            }
            Ok(())
        }
        Err(e) => {
            pb.finish_and_clear();
            error(&format!("Login failed: {}", e));
            Err(e.into())
        }
    }
}

/// Log out and clear every stored token
pub async fn logout() -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = open_session(&config)?.session;

    if session.initialize() != auth::AuthPhase::Authenticated {
        info("No active session; clearing any stored tokens");
    }

    // Local logout is already done; give the backend call a moment before exiting
    if let Some(handle) = session.logout() {
        let _ = tokio::time::timeout(Duration::from_secs(config.api.timeout_secs), handle).await;
    }

    success("Logged out");
    Ok(())
}

/// Exchange the refresh token for a new token pair
pub async fn refresh() -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = open_session(&config)?.session;
    session.initialize();

    match session.refresh().await {
        Ok(()) => {
            match session.user() {
                Some(user) => success(&format!("Session refreshed for {}", describe_user(&user))),
                None => success("Session refreshed"),
            }
            Ok(())
        }
        Err(e) => {
            error(&format!("Refresh failed, you have been logged out: {}", e));
            Err(e.into())
        }
    }
}

/// Show the current session
pub async fn status(format: OutputFormat) -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = open_session(&config)?.session;
    session.initialize();

    let report = status_report(&session)?;

    match format {
        OutputFormat::Table => print_status_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&report)?),
    }

    Ok(())
}

fn status_report(session: &SessionManager) -> Result<StatusReport> {
    let store = session.token_store();
    let now = expiry::now();

    let claims = store
        .access_token()?
        .and_then(|token| auth::decode(&token).ok());
    let exp = claims.as_ref().and_then(|claims| claims.exp);

    Ok(StatusReport {
        phase: session.phase(),
        user: session.user(),
        expires_at: exp
            .and_then(|exp| chrono::DateTime::from_timestamp(exp, 0))
            .map(|at| at.to_rfc3339()),
        expires_in_secs: exp.map(|exp| exp - now),
        should_refresh: claims
            .as_ref()
            .is_some_and(|claims| auth::should_refresh(claims, now)),
        has_refresh_token: store.refresh_token()?.is_some(),
        remembered: store.get(TokenScope::Persistent)?.is_some(),
    })
}

/// Ask the backend who the current token belongs to
pub async fn whoami() -> Result<()> {
    let config = config::load_config_or_default()?;
    let opened = open_session(&config)?;
    opened.session.initialize();

    opened.session.ensure_fresh().await?;
    let Some(token) = opened.session.access_token() else {
        bail!("Not logged in. Run 'screener login' first.");
    };

    let user = opened.api.me(&token).await?;
    success(&format!("Backend says you are {}", describe_user(&user)));
    if !user.permissions.is_empty() {
        info(&format!("Permissions: {}", user.permissions.join(", ")));
    }
    Ok(())
}

/// Print the Authorization header for the current session
pub async fn header() -> Result<()> {
    let config = config::load_config_or_default()?;
    let session = open_session(&config)?.session;
    session.initialize();

    let headers = session.authorized_headers().await?;
    match headers.get(reqwest::header::AUTHORIZATION) {
        Some(value) => {
            println!("Authorization: {}", value.to_str()?);
            Ok(())
        }
        None => bail!("Not logged in. Run 'screener login' first."),
    }
}

/// Follow session changes made by other processes
pub async fn watch(interval_ms: u64) -> Result<()> {
    let config = config::load_config_or_default()?;
    let opened = open_session(&config)?;
    let Some(file) = opened.file else {
        bail!("'watch' needs the file storage backend");
    };

    let session = opened.session;
    session.initialize();
    let mut changes = session.subscribe();
    let sync = session.spawn_sync();
    let poller = file.spawn_poller(Duration::from_millis(interval_ms));

    info(&format!("Watching {} (Ctrl-C to stop)", config.storage.path.display()));
    print_session_line(&session);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                print_session_line(&session);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
    sync.abort();
    Ok(())
}

fn print_session_line(session: &SessionManager) {
    let state = session.state();
    let who = state
        .user
        .as_ref()
        .map(describe_user)
        .unwrap_or_else(|| "-".dimmed().to_string());
    println!(
        "{} {} {}",
        chrono::Local::now().format("%H:%M:%S").to_string().dimmed(),
        format_phase(state.phase()),
        who
    );
}

/// Start the development auth server
pub async fn serve(host: Option<String>, port: Option<u16>) -> Result<()> {
    let config = config::load_config_or_default()?;
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    if config.server.users.is_empty() {
        warn("No [[server.users]] configured; every login will be rejected");
    }

    info(&format!("Starting auth server on {}:{}", host, port));
    devserver::run_server(config.server, &host, port).await?;
    Ok(())
}

/// A session wired to the configured storage and API
struct OpenedSession {
    session: Arc<SessionManager>,
    api: Arc<HttpAuthApi>,
    file: Option<Arc<FileStorage>>,
}

fn open_session(config: &Config) -> Result<OpenedSession> {
    let (storage, file): (Arc<dyn StorageArea>, Option<Arc<FileStorage>>) =
        match config.storage.backend {
            StorageBackend::File => {
                let file = Arc::new(FileStorage::open(&config.storage.path)?);
                let shared: Arc<dyn StorageArea> = file.clone();
                (shared, Some(file))
            }
            StorageBackend::Memory => (Arc::new(MemoryStorage::new()) as Arc<dyn StorageArea>, None),
        };

    let api = Arc::new(HttpAuthApi::new(&config.api)?);
    let session = Arc::new(SessionManager::new(storage, api.clone()));

    Ok(OpenedSession { session, api, file })
}
