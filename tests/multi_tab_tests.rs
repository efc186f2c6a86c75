//! Cross-tab session replication tests

mod common;

use common::{eventually, token_for, user, Browser, MockAuthApi};
use screener_session::auth::{AuthPhase, Credentials, SessionManager, TokenPair, TokenScope, UserRole};
use screener_session::storage::{FileStorage, StorageArea, TabId};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn browser() -> Browser {
    Browser::new(
        MockAuthApi::new()
            .with_user("pw-one", user("u1", UserRole::User))
            .with_user("pw-two", user("u2", UserRole::Admin)),
    )
}

#[tokio::test]
async fn test_logout_in_one_tab_logs_out_the_other_without_network() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let mut sync_b = tab_b.sync();

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();
    assert_eq!(sync_b.drain(&tab_b), 1);
    assert_eq!(tab_b.user().map(|u| u.id), Some("u1".to_string()));

    if let Some(handle) = tab_a.logout() {
        handle.await.unwrap();
    }
    let calls = browser.api.network_calls();

    assert_eq!(sync_b.drain(&tab_b), 1);
    assert!(tab_b.user().is_none());
    assert_eq!(tab_b.phase(), AuthPhase::Unauthenticated);
    assert_eq!(browser.api.network_calls(), calls);
}

#[tokio::test]
async fn test_own_writes_are_not_replayed() {
    let browser = browser();
    let tab = browser.open_tab();
    let mut sync = tab.sync();

    tab.login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();
    tab.refresh().await.unwrap();

    assert_eq!(sync.drain(&tab), 0);
    assert!(tab.is_authenticated());
}

#[tokio::test]
async fn test_refresh_token_changes_are_ignored() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let mut sync_b = tab_b.sync();

    browser
        .storage
        .set(TabId::new(), "refreshToken", "something")
        .unwrap();
    browser
        .storage
        .set(TabId::new(), "accessToken_persistent", "something")
        .unwrap();

    assert_eq!(sync_b.drain(&tab_b), 0);
    assert!(tab_a.user().is_none());
}

#[tokio::test]
async fn test_two_tabs_converge_on_last_login() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let mut sync_a = tab_a.sync();
    let mut sync_b = tab_b.sync();

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();
    tab_b
        .login(&Credentials::new("u2@example.com", "pw-two"))
        .await
        .unwrap();

    sync_a.drain(&tab_a);
    sync_b.drain(&tab_b);

    let stored = tab_a.token_store().access_token().unwrap();
    assert_eq!(stored, tab_b.token_store().access_token().unwrap());
    assert_eq!(tab_a.user().map(|u| u.id), Some("u2".to_string()));
    assert_eq!(tab_b.user().map(|u| u.id), Some("u2".to_string()));
    assert!(tab_a.has_role(UserRole::Admin));
}

#[tokio::test]
async fn test_login_then_logout_elsewhere_converges_to_logged_out() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let mut sync_b = tab_b.sync();

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();
    tab_a.logout();

    // Both notifications are queued; the login one is already stale
    sync_b.drain(&tab_b);
    assert!(tab_b.user().is_none());
}

#[tokio::test]
async fn test_remote_token_that_is_expired_logs_out() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let mut sync_b = tab_b.sync();

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();
    sync_b.drain(&tab_b);
    assert!(tab_b.is_authenticated());

    let expired = TokenPair::new(token_for(&user("u1", UserRole::User), -5), "r");
    tab_a.token_store().set(TokenScope::Default, &expired).unwrap();
    sync_b.drain(&tab_b);

    assert!(tab_b.user().is_none());
}

#[tokio::test]
async fn test_background_sync_follows_other_tab() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let sync = tab_b.spawn_sync();

    tab_a
        .login(&Credentials::new("u2@example.com", "pw-two"))
        .await
        .unwrap();
    assert!(eventually(|| tab_b.is_authenticated()).await);
    assert!(tab_b.has_role(UserRole::Admin));

    tab_a.logout();
    assert!(eventually(|| !tab_b.is_authenticated()).await);
    assert_eq!(browser.api.login_calls.load(Ordering::SeqCst), 1);
    assert_eq!(browser.api.refresh_calls.load(Ordering::SeqCst), 0);

    sync.abort();
}

#[tokio::test]
async fn test_background_sync_stops_when_session_dropped() {
    let browser = browser();
    let tab_a = browser.open_tab();
    let tab_b = browser.open_tab();
    let sync = tab_b.spawn_sync();
    drop(tab_b);

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one"))
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(2), sync)
        .await
        .expect("sync task should stop")
        .unwrap();
}

#[tokio::test]
async fn test_file_storage_shares_session_between_processes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let api = Arc::new(
        MockAuthApi::new().with_user("pw-one", user("u1", UserRole::User)),
    );

    let file_a = Arc::new(FileStorage::open(&path).unwrap());
    let file_b = Arc::new(FileStorage::open(&path).unwrap());
    let storage_a: Arc<dyn StorageArea> = file_a.clone();
    let storage_b: Arc<dyn StorageArea> = file_b.clone();
    let tab_a = SessionManager::new(storage_a, api.clone());
    let tab_b = SessionManager::new(storage_b, api.clone());
    let mut sync_b = tab_b.sync();

    tab_a
        .login(&Credentials::new("u1@example.com", "pw-one").remember_me(true))
        .await
        .unwrap();

    // Nothing reaches the other handle until it looks at the file
    assert_eq!(sync_b.drain(&tab_b), 0);
    assert!(file_b.poll_changes().unwrap() >= 4);
    assert_eq!(sync_b.drain(&tab_b), 1);
    assert_eq!(tab_b.user().map(|u| u.id), Some("u1".to_string()));

    tab_a.logout();
    file_b.poll_changes().unwrap();
    sync_b.drain(&tab_b);
    assert!(tab_b.user().is_none());

    // A fresh process starts logged out
    let tab_c = SessionManager::new(Arc::new(FileStorage::open(&path).unwrap()), api);
    assert_eq!(tab_c.initialize(), AuthPhase::Unauthenticated);
}
