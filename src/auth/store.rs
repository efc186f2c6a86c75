//! Token pair persistence on top of a shared storage area

use crate::auth::models::TokenPair;
use crate::error::Result;
use crate::storage::{StorageArea, TabId};
use std::fmt;
use std::sync::Arc;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const PERSISTENT_ACCESS_TOKEN_KEY: &str = "accessToken_persistent";
pub const PERSISTENT_REFRESH_TOKEN_KEY: &str = "refreshToken_persistent";

/// Which of the two token slots to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScope {
    /// Current session, cleared at will
    Default,
    /// Remember-me copy, written only on request
    Persistent,
}

impl TokenScope {
    fn keys(self) -> (&'static str, &'static str) {
        match self {
            TokenScope::Default => (ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY),
            TokenScope::Persistent => (PERSISTENT_ACCESS_TOKEN_KEY, PERSISTENT_REFRESH_TOKEN_KEY),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenScope::Default => write!(f, "default"),
            TokenScope::Persistent => write!(f, "persistent"),
        }
    }
}

/// Key/value facade over the token slots. Performs no validation.
#[derive(Clone)]
pub struct TokenStore {
    storage: Arc<dyn StorageArea>,
    tab: TabId,
}

impl TokenStore {
    /// Create a store writing on behalf of `tab`
    pub fn new(storage: Arc<dyn StorageArea>, tab: TabId) -> Self {
        Self { storage, tab }
    }

    pub fn storage(&self) -> &Arc<dyn StorageArea> {
        &self.storage
    }

    /// Read a pair; both halves must be present
    pub fn get(&self, scope: TokenScope) -> Result<Option<TokenPair>> {
        let (access_key, refresh_key) = scope.keys();
        let access = self.storage.get(access_key)?;
        let refresh = self.storage.get(refresh_key)?;
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair::new(access, refresh)),
            _ => None,
        })
    }

    /// Overwrite a pair unconditionally
    pub fn set(&self, scope: TokenScope, pair: &TokenPair) -> Result<()> {
        let (access_key, refresh_key) = scope.keys();
        self.storage.set_items(
            self.tab,
            &[
                (access_key, pair.access_token.as_str()),
                (refresh_key, pair.refresh_token.as_str()),
            ],
        )
    }

    /// Write the same pair into several scopes as one storage write, so a
    /// failure leaves none of them changed
    pub fn set_scopes(&self, scopes: &[TokenScope], pair: &TokenPair) -> Result<()> {
        let items: Vec<(&str, &str)> = scopes
            .iter()
            .flat_map(|scope| {
                let (access_key, refresh_key) = scope.keys();
                [
                    (access_key, pair.access_token.as_str()),
                    (refresh_key, pair.refresh_token.as_str()),
                ]
            })
            .collect();
        self.storage.set_items(self.tab, &items)
    }

    /// Remove both scopes in a single storage write
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_items(
            self.tab,
            &[
                ACCESS_TOKEN_KEY,
                REFRESH_TOKEN_KEY,
                PERSISTENT_ACCESS_TOKEN_KEY,
                PERSISTENT_REFRESH_TOKEN_KEY,
            ],
        )
    }

    /// Default-scope access token
    pub fn access_token(&self) -> Result<Option<String>> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    /// Default-scope refresh token
    pub fn refresh_token(&self) -> Result<Option<String>> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }
}
