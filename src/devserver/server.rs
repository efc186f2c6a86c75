//! HTTP server for the development auth backend

use axum::{
    routing::{get, post},
    Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::jwt::TokenIssuer;
use super::routes;
use super::users::UserDirectory;
use crate::config::ServerConfig;
use crate::error::Result;

/// Keys remembered until their own expiry time (epoch seconds)
#[derive(Debug, Default)]
pub struct ExpiringSet {
    entries: HashMap<String, i64>,
}

impl ExpiringSet {
    /// Insert `key` until `expires_at`, dropping entries that have lapsed.
    /// Returns false if the key was already present and live.
    pub fn insert(&mut self, key: String, expires_at: i64, now: i64) -> bool {
        self.entries.retain(|_, exp| *exp > now);
        match self.entries.get_mut(&key) {
            Some(exp) => {
                *exp = (*exp).max(expires_at);
                false
            }
            None => {
                self.entries.insert(key, expires_at);
                true
            }
        }
    }

    pub fn contains(&self, key: &str, now: i64) -> bool {
        self.entries.get(key).is_some_and(|exp| *exp > now)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub issuer: TokenIssuer,
    pub users: UserDirectory,
    /// Longest lifetime of any token minted for a login session
    session_ttl_secs: i64,
    /// Login sessions ended by logout or refresh-token replay
    revoked_sessions: RwLock<ExpiringSet>,
    /// Refresh token IDs already exchanged, kept until the token would expire
    used_refresh_tokens: RwLock<ExpiringSet>,
}

impl AppState {
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Ok(Self {
            issuer: TokenIssuer::new(
                config.secret.as_bytes(),
                config.access_ttl_secs,
                config.refresh_ttl_secs,
            ),
            users: UserDirectory::from_config(config)?,
            session_ttl_secs: config.access_ttl_secs.max(config.refresh_ttl_secs),
            revoked_sessions: RwLock::new(ExpiringSet::default()),
            used_refresh_tokens: RwLock::new(ExpiringSet::default()),
        })
    }

    /// End a login session; every token it minted is refused from now on
    pub async fn revoke_session(&self, sid: &str) {
        let now = chrono::Utc::now().timestamp();
        self.revoked_sessions
            .write()
            .await
            .insert(sid.to_string(), now + self.session_ttl_secs, now);
    }

    pub async fn is_revoked(&self, sid: &str) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.revoked_sessions.read().await.contains(sid, now)
    }

    /// Record a refresh token exchange. Returns false on replay.
    pub async fn mark_refresh_used(&self, jti: &str, expires_at: i64) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.used_refresh_tokens
            .write()
            .await
            .insert(jti.to_string(), expires_at, now)
    }
}

pub type SharedState = Arc<AppState>;

/// Run the development auth server on the configured address
pub async fn run_server(config: ServerConfig, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    serve(config, listener).await
}

/// Serve on an already bound listener
pub async fn serve(config: ServerConfig, listener: TcpListener) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    let app = create_router(state);

    tracing::info!("Auth server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Bind an ephemeral port on localhost and serve in the background
pub async fn spawn_local(config: ServerConfig) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        if let Err(e) = serve(config, listener).await {
            tracing::error!("Auth server error: {}", e);
        }
    });
    Ok((addr, handle))
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/auth/login", post(routes::login))
        .route("/auth/refresh", post(routes::refresh))
        .route("/auth/logout", post(routes::logout))
        .route("/auth/me", get(routes::me))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
