//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use screener_session::auth::{expiry, SessionManager, User, UserRole};
use screener_session::client::{AuthApi, AuthResponse, LoginRequest};
use screener_session::error::{Error, Result};
use screener_session::storage::{MemoryStorage, StorageArea, StorageEvent, TabId};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

/// Build an unsigned compact token around a JSON payload
pub fn token_with_claims(claims: &Value) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        URL_SAFE_NO_PAD.encode("signature")
    )
}

/// Token for `user` expiring `ttl_secs` from now
pub fn token_for(user: &User, ttl_secs: i64) -> String {
    token_with_claims(&json!({
        "sub": user.id,
        "email": user.email,
        "name": user.name,
        "role": user.role.to_string(),
        "permissions": user.permissions,
        "exp": expiry::now() + ttl_secs,
        "jti": uuid::Uuid::new_v4().to_string(),
    }))
}

pub fn user(id: &str, role: UserRole) -> User {
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        name: id.to_uppercase(),
        role,
        avatar: None,
        permissions: Vec::new(),
        created_at: None,
    }
}

/// In-memory stand-in for the Auth API that counts every call
pub struct MockAuthApi {
    users: Mutex<Vec<(String, User)>>,
    pub access_ttl_secs: i64,
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
    /// When set, login waits for a notification before answering
    pub login_gate: Mutex<Option<Arc<Notify>>>,
    /// When set, refresh waits for a notification before answering
    pub refresh_gate: Mutex<Option<Arc<Notify>>>,
    pub logout_delay: Mutex<Duration>,
}

impl MockAuthApi {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(Vec::new()),
            access_ttl_secs: 3600,
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            login_gate: Mutex::new(None),
            refresh_gate: Mutex::new(None),
            logout_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn with_access_ttl(mut self, secs: i64) -> Self {
        self.access_ttl_secs = secs;
        self
    }

    pub fn with_user(self, password: &str, user: User) -> Self {
        self.users.lock().push((password.to_string(), user));
        self
    }

    pub fn network_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
            + self.refresh_calls.load(Ordering::SeqCst)
            + self.logout_calls.load(Ordering::SeqCst)
            + self.me_calls.load(Ordering::SeqCst)
    }

    fn issue(&self, user: &User) -> AuthResponse {
        AuthResponse {
            user: user.clone(),
            access_token: token_for(user, self.access_ttl_secs),
            refresh_token: format!("refresh:{}:{}", user.id, uuid::Uuid::new_v4()),
            expires_in: self.access_ttl_secs,
        }
    }

    fn find_by_id(&self, id: &str) -> Option<User> {
        self.users
            .lock()
            .iter()
            .find(|(_, u)| u.id == id)
            .map(|(_, u)| u.clone())
    }
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.login_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let found = self
            .users
            .lock()
            .iter()
            .find(|(pw, u)| u.email == request.email && *pw == request.password)
            .map(|(_, u)| u.clone());

        match found {
            Some(user) => Ok(self.issue(&user)),
            None => Err(Error::api(401, "Invalid email or password")),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::api(401, "Invalid refresh token"));
        }

        let user_id = refresh_token.split(':').nth(1).unwrap_or_default();
        match self.find_by_id(user_id) {
            Some(user) => Ok(self.issue(&user)),
            None => Err(Error::api(401, "Invalid refresh token")),
        }
    }

    async fn logout(&self, _access_token: Option<&str>) -> Result<()> {
        let delay = *self.logout_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::api(503, "backend unavailable"))
    }

    async fn me(&self, access_token: &str) -> Result<User> {
        self.me_calls.fetch_add(1, Ordering::SeqCst);
        let claims = screener_session::auth::decode(access_token)?;
        claims.to_user()
    }
}

/// A storage area plus the API shared by every tab
pub struct Browser {
    pub storage: Arc<MemoryStorage>,
    pub api: Arc<MockAuthApi>,
}

impl Browser {
    pub fn new(api: MockAuthApi) -> Self {
        Self {
            storage: Arc::new(MemoryStorage::new()),
            api: Arc::new(api),
        }
    }

    /// Open a new tab on the shared storage
    pub fn open_tab(&self) -> Arc<SessionManager> {
        let storage: Arc<dyn StorageArea> = self.storage.clone();
        Arc::new(SessionManager::new(storage, self.api.clone()))
    }
}

/// Memory storage that rejects any write touching `failing_key`
pub struct FailingStorage {
    pub inner: MemoryStorage,
    failing_key: &'static str,
}

impl FailingStorage {
    pub fn new(failing_key: &'static str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            failing_key,
        }
    }
}

impl StorageArea for FailingStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set_items(&self, origin: TabId, items: &[(&str, &str)]) -> Result<()> {
        if items.iter().any(|(key, _)| *key == self.failing_key) {
            return Err(Error::Storage(format!("quota exceeded writing {}", self.failing_key)));
        }
        self.inner.set_items(origin, items)
    }

    fn remove_items(&self, origin: TabId, keys: &[&str]) -> Result<()> {
        self.inner.remove_items(origin, keys)
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.inner.subscribe()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
