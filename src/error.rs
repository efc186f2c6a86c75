//! Error types for screener-session

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Auth API error ({status}): {message}")]
    AuthApi { status: u16, message: String },

    #[error("Refresh response discarded: session changed while the refresh was in flight")]
    RefreshSuperseded,

    #[error("Login response discarded: the session was ended while the login was in flight")]
    LoginSuperseded,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file not found. Run 'screener init' first.")]
    ConfigNotFound,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an API error from a status code and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Error::AuthApi {
            status,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
