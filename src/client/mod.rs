//! Auth API client
//!
//! The session manager only talks to the backend through [`AuthApi`], so tests
//! and alternative transports can stand in for [`HttpAuthApi`].

use crate::auth::models::{TokenPair, User};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: i64,
}

impl AuthResponse {
    pub fn token_pair(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }
}

/// Error body understood by [`HttpAuthApi`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Network operations of the authentication backend
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse>;

    /// `POST /auth/refresh`
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse>;

    /// `POST /auth/logout`
    async fn logout(&self, access_token: Option<&str>) -> Result<()>;

    /// `GET /auth/me`
    async fn me(&self, access_token: &str) -> Result<User>;
}

/// [`AuthApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(status = %status, url = %response.url(), "Auth API response");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::api(status.as_u16(), error_message(status, &body)))
    }
}

/// Pick the most useful message out of an error response
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

fn bearer(access_token: &str) -> String {
    format!("Bearer {}", access_token)
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        let response = self
            .send(self.client.post(self.url("/auth/login")).json(request))
            .await?;
        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .send(self.client.post(self.url("/auth/refresh")).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn logout(&self, access_token: Option<&str>) -> Result<()> {
        let mut request = self.client.post(self.url("/auth/logout"));
        if let Some(token) = access_token {
            request = request.header(AUTHORIZATION, bearer(token));
        }
        self.send(request).await?;
        Ok(())
    }

    async fn me(&self, access_token: &str) -> Result<User> {
        let response = self
            .send(
                self.client
                    .get(self.url("/auth/me"))
                    .header(AUTHORIZATION, bearer(access_token)),
            )
            .await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_error_message_prefers_body() {
        let msg = error_message(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid credentials"}"#);
        assert_eq!(msg, "Invalid credentials");

        let msg = error_message(StatusCode::BAD_REQUEST, r#"{"error":"bad input"}"#);
        assert_eq!(msg, "bad input");
    }

    #[test]
    fn test_error_message_falls_back_to_reason() {
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, "<html>"), "Bad Gateway");
        assert_eq!(error_message(StatusCode::UNAUTHORIZED, ""), "Unauthorized");
    }

    #[test]
    fn test_auth_response_wire_format() {
        let json = r#"{"user":{"id":"1","email":"a@b.com","name":"A","role":"user"},
            "accessToken":"a","refreshToken":"r","expiresIn":900}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.token_pair(), TokenPair::new("a", "r"));
        assert_eq!(response.expires_in, 900);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpAuthApi::with_client(Client::new(), "http://localhost:3457/");
        assert_eq!(api.url("/auth/me"), "http://localhost:3457/auth/me");
    }
}
