//! Cross-tab session replication
//!
//! Only one topic matters: the default-scope access token changed in another
//! tab. Everything else published on the storage area is ignored.

use crate::auth::session::SessionManager;
use crate::auth::store::ACCESS_TOKEN_KEY;
use crate::storage::{StorageArea, StorageEvent, TabId};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What another tab did to the access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteChange {
    Removed,
    Replaced(String),
}

impl RemoteChange {
    /// Filter a storage event down to the access-token topic, skipping our own writes
    pub fn from_event(event: &StorageEvent, own_tab: TabId) -> Option<Self> {
        if event.key != ACCESS_TOKEN_KEY || event.origin == own_tab {
            return None;
        }
        Some(match &event.new_value {
            Some(token) => RemoteChange::Replaced(token.clone()),
            None => RemoteChange::Removed,
        })
    }
}

/// Consumer of the storage channel for one session
pub struct SessionSync {
    rx: Receiver<StorageEvent>,
    tab: TabId,
}

impl SessionSync {
    pub fn new(storage: &dyn StorageArea, tab: TabId) -> Self {
        Self {
            rx: storage.subscribe(),
            tab,
        }
    }

    /// Apply every notification already queued. Returns how many were applied.
    pub fn drain(&mut self, session: &SessionManager) -> usize {
        let mut applied = 0;
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(change) = RemoteChange::from_event(&event, self.tab) {
                        session.apply_remote(change);
                        applied += 1;
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session sync lagged, resynchronising from storage");
                    session.resync();
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return applied,
            }
        }
    }

    /// Apply notifications as they arrive until the session is dropped
    pub async fn run(mut self, session: Weak<SessionManager>) {
        debug!(tab = %self.tab, "Session sync started");
        loop {
            let outcome = self.rx.recv().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            match outcome {
                Ok(event) => {
                    if let Some(change) = RemoteChange::from_event(&event, self.tab) {
                        session.apply_remote(change);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session sync lagged, resynchronising from storage");
                    session.resync();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!(tab = %self.tab, "Session sync stopped");
    }

    /// Run in the background for `session`
    pub fn spawn(self, session: &Arc<SessionManager>) -> JoinHandle<()> {
        tokio::spawn(self.run(Arc::downgrade(session)))
    }
}
