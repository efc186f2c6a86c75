//! Session state and its transitions
//!
//! ```text
//!                   Begin                 Restored(Some) / LoggedIn / Refreshed
//! Unauthenticated ────────► Loading ────────────────────────────────────────► Authenticated
//!        ▲                     │  Restored(None) / Aborted                          │
//!        │                     └──────────────────────────► (previous state)        │
//!        │  LoggedOut / ForcedLogout / RemoteLogout / Expired                        │
//!        └──────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::auth::models::User;
use serde::Serialize;
use std::fmt;

/// Observable session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    Unauthenticated,
    Loading,
    Authenticated,
}

impl fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthPhase::Unauthenticated => write!(f, "unauthenticated"),
            AuthPhase::Loading => write!(f, "loading"),
            AuthPhase::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Named session transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// An initialize, login or refresh started
    Begin,
    /// Start-up rehydration finished
    Restored(Option<User>),
    LoggedIn(User),
    /// The operation ended without changing the session (failed login, stale refresh)
    Aborted,
    Refreshed(User),
    /// Refresh impossible or rejected; the session is unrecoverable
    ForcedLogout,
    LoggedOut,
    /// Another tab stored a new access token
    RemoteLogin(User),
    /// Another tab removed the access token
    RemoteLogout,
    /// The stored access token was found expired on read
    Expired,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Begin => "begin",
            Transition::Restored(_) => "restored",
            Transition::LoggedIn(_) => "logged_in",
            Transition::Aborted => "aborted",
            Transition::Refreshed(_) => "refreshed",
            Transition::ForcedLogout => "forced_logout",
            Transition::LoggedOut => "logged_out",
            Transition::RemoteLogin(_) => "remote_login",
            Transition::RemoteLogout => "remote_logout",
            Transition::Expired => "expired",
        }
    }

    /// Whether this transition replaces the session, invalidating in-flight refreshes
    pub(crate) fn ends_session(&self) -> bool {
        matches!(
            self,
            Transition::LoggedIn(_)
                | Transition::ForcedLogout
                | Transition::LoggedOut
                | Transition::RemoteLogin(_)
                | Transition::RemoteLogout
        )
    }
}

/// Current user plus the loading flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
}

impl SessionState {
    pub fn phase(&self) -> AuthPhase {
        if self.loading {
            AuthPhase::Loading
        } else if self.user.is_some() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Pure reducer
    pub fn apply(self, transition: Transition) -> SessionState {
        match transition {
            Transition::Begin => SessionState {
                loading: true,
                ..self
            },
            Transition::Aborted => SessionState {
                loading: false,
                ..self
            },
            Transition::Restored(user) => SessionState {
                user,
                loading: false,
            },
            Transition::LoggedIn(user)
            | Transition::Refreshed(user)
            | Transition::RemoteLogin(user) => SessionState {
                user: Some(user),
                loading: false,
            },
            Transition::ForcedLogout | Transition::LoggedOut => SessionState::default(),
            // Remote changes and read-time expiry do not touch an in-flight operation
            Transition::RemoteLogout | Transition::Expired => SessionState {
                user: None,
                ..self
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            name: id.to_string(),
            role: UserRole::User,
            avatar: None,
            permissions: Vec::new(),
            created_at: None,
        }
    }

    #[test]
    fn test_login_cycle() {
        let state = SessionState::default();
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);

        let state = state.apply(Transition::Begin);
        assert_eq!(state.phase(), AuthPhase::Loading);

        let state = state.apply(Transition::LoggedIn(user("u1")));
        assert_eq!(state.phase(), AuthPhase::Authenticated);

        let state = state.apply(Transition::LoggedOut);
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn test_failed_login_keeps_previous_user() {
        let state = SessionState::default()
            .apply(Transition::LoggedIn(user("u1")))
            .apply(Transition::Begin)
            .apply(Transition::Aborted);

        assert_eq!(state.user, Some(user("u1")));
        assert!(!state.loading);
    }

    #[test]
    fn test_remote_logout_during_refresh_keeps_loading() {
        let state = SessionState::default()
            .apply(Transition::LoggedIn(user("u1")))
            .apply(Transition::Begin)
            .apply(Transition::RemoteLogout);

        assert!(state.user.is_none());
        assert_eq!(state.phase(), AuthPhase::Loading);
    }

    #[test]
    fn test_forced_logout_clears_everything() {
        let state = SessionState::default()
            .apply(Transition::LoggedIn(user("u1")))
            .apply(Transition::Begin)
            .apply(Transition::ForcedLogout);
        assert_eq!(state.phase(), AuthPhase::Unauthenticated);
    }

    #[test]
    fn test_session_ending_transitions() {
        assert!(Transition::LoggedOut.ends_session());
        assert!(Transition::RemoteLogin(user("x")).ends_session());
        assert!(!Transition::Begin.ends_session());
        assert!(!Transition::Refreshed(user("x")).ends_session());
        assert!(!Transition::Expired.ends_session());
    }
}
