//! Session management
//!
//! [`SessionManager`] owns the current user, runs login/logout/refresh against
//! the Auth API and follows logins and logouts made by sibling tabs through
//! the shared storage area. Construct one per tab and pass it around as an
//! `Arc<SessionManager>`.

use crate::auth::codec;
use crate::auth::expiry::{self, is_expired, token_is_expired, token_should_refresh};
use crate::auth::models::{Credentials, TokenPair, User, UserRole};
use crate::auth::state::{AuthPhase, SessionState, Transition};
use crate::auth::store::{TokenScope, TokenStore};
use crate::auth::sync::{RemoteChange, SessionSync};
use crate::client::{AuthApi, LoginRequest};
use crate::error::{Error, Result};
use crate::storage::{StorageArea, TabId};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

struct Inner {
    state: SessionState,
    /// Bumped whenever the session is replaced or ended
    generation: u64,
}

/// Session manager for one tab
pub struct SessionManager {
    tab: TabId,
    store: TokenStore,
    api: Arc<dyn AuthApi>,
    inner: Mutex<Inner>,
    changes: watch::Sender<SessionState>,
    /// Serialises refreshes so a rotated refresh token is never replayed
    refreshing: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Create a new session manager attached to a shared storage area
    pub fn new(storage: Arc<dyn StorageArea>, api: Arc<dyn AuthApi>) -> Self {
        let tab = TabId::new();
        let (changes, _) = watch::channel(SessionState::default());
        Self {
            tab,
            store: TokenStore::new(storage, tab),
            api,
            inner: Mutex::new(Inner {
                state: SessionState::default(),
                generation: 0,
            }),
            changes,
            refreshing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.store
    }

    /// Rehydrate the user from the stored default-scope tokens
    pub fn initialize(&self) -> AuthPhase {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, Transition::Begin);

        let user = match self.store.get(TokenScope::Default) {
            Ok(Some(pair)) => self.restore_user(&pair),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Could not read stored tokens");
                None
            }
        };

        self.commit(&mut inner, Transition::Restored(user));
        inner.state.phase()
    }

    fn restore_user(&self, pair: &TokenPair) -> Option<User> {
        let restored = codec::decode(&pair.access_token).and_then(|claims| {
            if is_expired(&claims, expiry::now()) {
                Ok(None)
            } else {
                claims.to_user().map(Some)
            }
        });

        match restored {
            Ok(Some(user)) => {
                info!(user_id = %user.id, "Restored session");
                Some(user)
            }
            Ok(None) => {
                debug!("Stored access token is expired");
                None
            }
            Err(e) => {
                warn!(error = %e, "Discarding corrupted tokens");
                if let Err(e) = self.store.clear() {
                    error!(error = %e, "Failed to clear corrupted tokens");
                }
                None
            }
        }
    }

    /// Log in and store the issued tokens.
    ///
    /// The user comes from the API response, not from the token. On failure
    /// the session is left as it was.
    pub async fn login(&self, credentials: &Credentials) -> Result<User> {
        let generation = {
            let mut inner = self.inner.lock();
            self.commit(&mut inner, Transition::Begin);
            inner.generation
        };

        let request = LoginRequest {
            email: credentials.email.clone(),
            password: credentials.password.clone(),
        };
        let result = self.api.login(&request).await;

        let mut inner = self.inner.lock();
        // A logout (here or in another tab) while the request was in flight wins
        if inner.generation != generation {
            debug!("Discarding login response for a replaced session");
            self.commit(&mut inner, Transition::Aborted);
            return Err(Error::LoginSuperseded);
        }

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                warn!(email = %credentials.email, error = %e, "Login failed");
                self.commit(&mut inner, Transition::Aborted);
                return Err(e);
            }
        };

        let scopes: &[TokenScope] = if credentials.remember_me {
            &[TokenScope::Default, TokenScope::Persistent]
        } else {
            &[TokenScope::Default]
        };
        if let Err(e) = self.store.set_scopes(scopes, &response.token_pair()) {
            error!(error = %e, "Failed to store tokens after login");
            self.commit(&mut inner, Transition::Aborted);
            return Err(e);
        }

        self.commit(&mut inner, Transition::LoggedIn(response.user.clone()));
        info!(
            user_id = %response.user.id,
            remember_me = credentials.remember_me,
            "Logged in"
        );
        Ok(response.user)
    }

    /// Drop the session locally, then tell the backend in the background.
    ///
    /// The local part is immediate and cannot be undone by the network call.
    /// The returned handle belongs to the background call; dropping it is fine.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let access_token = {
            let mut inner = self.inner.lock();
            self.end_session(&mut inner, Transition::LoggedOut)
        };
        info!("Logged out");
        self.notify_backend_logout(access_token)
    }

    /// Exchange the refresh token for a new pair.
    ///
    /// A missing or rejected refresh token forces a logout and the error is
    /// returned so the caller can send the user to the login screen.
    pub async fn refresh(&self) -> Result<()> {
        let _guard = self.refreshing.lock().await;
        self.refresh_locked().await
    }

    /// Refresh only when the access token is inside the lead time
    pub async fn ensure_fresh(&self) -> Result<()> {
        if !self.needs_refresh() {
            return Ok(());
        }
        let _guard = self.refreshing.lock().await;
        // Another caller may have refreshed while we waited
        if !self.needs_refresh() {
            return Ok(());
        }
        self.refresh_locked().await
    }

    /// Due only when the access token is near expiry and there is something to exchange
    fn needs_refresh(&self) -> bool {
        match (self.store.access_token(), self.store.refresh_token()) {
            (Ok(Some(token)), Ok(Some(_))) => token_should_refresh(&token, expiry::now()),
            (Ok(_), Ok(_)) => false,
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Could not read stored tokens");
                false
            }
        }
    }

    async fn refresh_locked(&self) -> Result<()> {
        let (refresh_token, generation) = {
            let inner = self.inner.lock();
            (self.store.refresh_token(), inner.generation)
        };

        let refresh_token = match refresh_token {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!("Refresh requested without a refresh token");
                self.force_logout();
                return Err(Error::NoRefreshToken);
            }
            Err(e) => {
                error!(error = %e, "Could not read refresh token");
                self.force_logout();
                return Err(e);
            }
        };

        self.apply(Transition::Begin);
        let result = self.api.refresh(&refresh_token).await;

        let mut inner = self.inner.lock();
        if inner.generation != generation {
            debug!("Discarding refresh response for a replaced session");
            self.commit(&mut inner, Transition::Aborted);
            return Err(Error::RefreshSuperseded);
        }

        let stored = result.and_then(|response| {
            let scopes: &[TokenScope] = if self.store.get(TokenScope::Persistent)?.is_some() {
                &[TokenScope::Default, TokenScope::Persistent]
            } else {
                &[TokenScope::Default]
            };
            self.store.set_scopes(scopes, &response.token_pair())?;
            Ok(response.user)
        });

        match stored {
            Ok(user) => {
                debug!(user_id = %user.id, "Tokens refreshed");
                self.commit(&mut inner, Transition::Refreshed(user));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, ending session");
                let access_token = self.end_session(&mut inner, Transition::ForcedLogout);
                drop(inner);
                self.notify_backend_logout(access_token);
                Err(e)
            }
        }
    }

    fn force_logout(&self) {
        let access_token = {
            let mut inner = self.inner.lock();
            self.end_session(&mut inner, Transition::ForcedLogout)
        };
        self.notify_backend_logout(access_token);
    }

    /// Clear storage and state; returns the access token that was in use
    fn end_session(&self, inner: &mut Inner, transition: Transition) -> Option<String> {
        let access_token = self.store.access_token().ok().flatten();
        if let Err(e) = self.store.clear() {
            error!(error = %e, "Failed to clear stored tokens");
        }
        self.commit(inner, transition);
        access_token
    }

    fn notify_backend_logout(&self, access_token: Option<String>) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, skipping backend logout");
            return None;
        };
        let api = Arc::clone(&self.api);
        Some(runtime.spawn(async move {
            if let Err(e) = api.logout(access_token.as_deref()).await {
                debug!(error = %e, "Backend logout failed (ignored)");
            }
        }))
    }

    /// `Authorization: Bearer <token>` when a live access token is stored,
    /// otherwise an empty map
    pub fn auth_header(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.access_token() {
            match HeaderValue::from_str(&format!("Bearer {}", token)) {
                Ok(value) => {
                    headers.insert(AUTHORIZATION, value);
                }
                Err(e) => warn!(error = %e, "Stored access token is not a valid header value"),
            }
        }
        headers
    }

    /// Refresh first if the token is about to expire, then build the header
    pub async fn authorized_headers(&self) -> Result<HeaderMap> {
        self.ensure_fresh().await?;
        Ok(self.auth_header())
    }

    /// The stored access token, if it has not expired
    pub fn access_token(&self) -> Option<String> {
        match self.store.access_token() {
            Ok(token) => token.filter(|t| !token_is_expired(t, expiry::now())),
            Err(e) => {
                warn!(error = %e, "Could not read access token");
                None
            }
        }
    }

    /// Current state; an expired access token ends the session on read
    pub fn state(&self) -> SessionState {
        let mut inner = self.inner.lock();
        if inner.state.user.is_some() && self.access_token().is_none() {
            debug!("Access token expired");
            self.commit(&mut inner, Transition::Expired);
        }
        inner.state.clone()
    }

    pub fn user(&self) -> Option<User> {
        self.state().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().state.loading
    }

    pub fn phase(&self) -> AuthPhase {
        self.state().phase()
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.user().is_some_and(|u| u.has_role(role))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.user().is_some_and(|u| u.has_permission(permission))
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.changes.subscribe()
    }

    /// A consumer for this tab's cross-tab notifications
    pub fn sync(&self) -> SessionSync {
        SessionSync::new(self.store.storage().as_ref(), self.tab)
    }

    /// Start following other tabs in the background
    pub fn spawn_sync(self: &Arc<Self>) -> JoinHandle<()> {
        self.sync().spawn(self)
    }

    /// Apply a change another tab made to the access token. Never touches the network.
    ///
    /// A notification that no longer matches storage is skipped: a later write
    /// replaced it, and that write either came from this tab or has its own
    /// notification queued behind this one.
    pub fn apply_remote(&self, change: RemoteChange) {
        let stale = match (&change, self.store.access_token()) {
            (RemoteChange::Removed, Ok(current)) => current.is_some(),
            (RemoteChange::Replaced(token), Ok(current)) => {
                current.as_deref() != Some(token.as_str())
            }
            (_, Err(_)) => false,
        };
        if stale {
            debug!(tab = %self.tab, "Skipping superseded storage notification");
            return;
        }

        let transition = match change {
            RemoteChange::Removed => Transition::RemoteLogout,
            RemoteChange::Replaced(token) => match user_from_token(&token) {
                Some(user) => Transition::RemoteLogin(user),
                None => Transition::RemoteLogout,
            },
        };
        let mut inner = self.inner.lock();
        self.commit(&mut inner, transition);
    }

    /// Re-read the access token after missed notifications
    pub fn resync(&self) {
        let change = match self.store.access_token() {
            Ok(Some(token)) => RemoteChange::Replaced(token),
            Ok(None) => RemoteChange::Removed,
            Err(e) => {
                warn!(error = %e, "Could not resync session from storage");
                return;
            }
        };
        self.apply_remote(change);
    }

    fn apply(&self, transition: Transition) {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, transition);
    }

    fn commit(&self, inner: &mut Inner, transition: Transition) {
        let name = transition.name();
        if transition.ends_session() {
            inner.generation += 1;
        }

        let before = inner.state.phase();
        inner.state = std::mem::take(&mut inner.state).apply(transition);
        let after = inner.state.phase();

        debug!(
            tab = %self.tab,
            transition = name,
            from = %before,
            to = %after,
            "Session transition"
        );
        self.changes.send_replace(inner.state.clone());
    }
}

/// Project a live, decodable token into a user
fn user_from_token(token: &str) -> Option<User> {
    let claims = codec::decode(token).ok()?;
    if is_expired(&claims, expiry::now()) {
        return None;
    }
    claims.to_user().ok()
}
