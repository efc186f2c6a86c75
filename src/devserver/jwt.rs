//! JWT issuing for the development auth server

use crate::auth::models::{TokenPair, User};
use crate::error::{Error, Result};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Which half of a pair a token is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims issued by the development server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IssuedClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub permissions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Login session shared by every pair minted from one login
    pub sid: String,
    /// Unique token ID
    pub jti: String,
    pub typ: TokenKind,
    /// Issued at
    pub iat: i64,
    /// Expiration time
    pub exp: i64,
}

impl IssuedClaims {
    fn for_user(user: &User, sid: &str, typ: TokenKind, ttl_secs: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.to_string(),
            permissions: user.permissions.clone(),
            avatar: user.avatar.clone(),
            created_at: user.created_at.clone(),
            sid: sid.to_string(),
            jti: uuid::Uuid::new_v4().to_string(),
            typ,
            iat: now,
            exp: now + ttl_secs,
        }
    }
}

/// A freshly minted pair and the access token lifetime
#[derive(Debug, Clone)]
pub struct IssuedPair {
    pub tokens: TokenPair,
    pub expires_in: i64,
}

/// Signs and verifies HS256 tokens
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Mint an access/refresh pair for a login session
    pub fn issue_pair(&self, user: &User, sid: &str) -> Result<IssuedPair> {
        let access = self.sign(&IssuedClaims::for_user(
            user,
            sid,
            TokenKind::Access,
            self.access_ttl_secs,
        ))?;
        let refresh = self.sign(&IssuedClaims::for_user(
            user,
            sid,
            TokenKind::Refresh,
            self.refresh_ttl_secs,
        ))?;

        Ok(IssuedPair {
            tokens: TokenPair::new(access, refresh),
            expires_in: self.access_ttl_secs,
        })
    }

    fn sign(&self, claims: &IssuedClaims) -> Result<String> {
        encode(&Header::default(), claims, &self.encoding)
            .map_err(|e| Error::Config(format!("Failed to create token: {}", e)))
    }

    /// Validate signature, expiry and kind
    pub fn validate(&self, token: &str, kind: TokenKind) -> Result<IssuedClaims> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        self.decode_with(token, kind, &validation)
    }

    /// Validate signature and kind but accept expired tokens (logout)
    pub fn validate_allow_expired(&self, token: &str, kind: TokenKind) -> Result<IssuedClaims> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        self.decode_with(token, kind, &validation)
    }

    fn decode_with(
        &self,
        token: &str,
        kind: TokenKind,
        validation: &Validation,
    ) -> Result<IssuedClaims> {
        let claims = decode::<IssuedClaims>(token, &self.decoding, validation)
            .map(|data| data.claims)
            .map_err(|e| Error::api(401, format!("Invalid token: {}", e)))?;

        if claims.typ != kind {
            return Err(Error::api(401, "Wrong token type"));
        }
        Ok(claims)
    }
}
