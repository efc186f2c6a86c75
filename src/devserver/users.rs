//! Account directory for the development auth server

use crate::auth::models::{User, UserRole};
use crate::config::ServerConfig;
use crate::error::{Error, Result};
use std::collections::HashMap;
use tracing::debug;

struct Account {
    user: User,
    password_hash: String,
}

/// Configured accounts keyed by lower-cased email
pub struct UserDirectory {
    accounts: HashMap<String, Account>,
}

impl UserDirectory {
    /// Hash every configured password
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let mut accounts = HashMap::new();

        for (index, account) in config.users.iter().enumerate() {
            let password_hash = bcrypt::hash(&account.password, config.bcrypt_cost)
                .map_err(|e| Error::Config(format!("Failed to hash password: {}", e)))?;

            let email = account.email.trim().to_lowercase();
            let user = User {
                id: format!("user-{}", index + 1),
                email: email.clone(),
                name: account.name.clone().unwrap_or_else(|| email.clone()),
                role: UserRole::parse(&account.role),
                avatar: account.avatar.clone(),
                permissions: account.permissions.clone(),
                created_at: Some(created_at.clone()),
            };

            debug!(email = %email, role = %user.role, "Registered account");
            accounts.insert(email, Account { user, password_hash });
        }

        Ok(Self { accounts })
    }

    /// Check credentials
    pub fn authenticate(&self, email: &str, password: &str) -> Option<&User> {
        let account = self.accounts.get(&email.trim().to_lowercase())?;
        match bcrypt::verify(password, &account.password_hash) {
            Ok(true) => Some(&account.user),
            _ => None,
        }
    }

    pub fn find(&self, id: &str) -> Option<&User> {
        self.accounts
            .values()
            .map(|a| &a.user)
            .find(|u| u.id == id)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAccount;

    fn directory() -> UserDirectory {
        let mut admin = UserAccount::new("Admin@Example.com", "s3cret");
        admin.role = "admin".to_string();
        let config = ServerConfig {
            bcrypt_cost: 4,
            users: vec![admin, UserAccount::new("bob@example.com", "pw")],
            ..Default::default()
        };
        UserDirectory::from_config(&config).unwrap()
    }

    #[test]
    fn test_authenticate() {
        let users = directory();
        let admin = users.authenticate("admin@example.com", "s3cret").unwrap();
        assert!(admin.is_admin());
        assert_eq!(admin.name, "admin@example.com");

        assert!(users.authenticate("admin@example.com", "wrong").is_none());
        assert!(users.authenticate("nobody@example.com", "s3cret").is_none());
    }

    #[test]
    fn test_find_by_id() {
        let users = directory();
        let bob = users.authenticate("bob@example.com", "pw").unwrap().clone();
        assert_eq!(users.find(&bob.id), Some(&bob));
        assert!(users.find("user-99").is_none());
        assert_eq!(users.len(), 2);
    }
}
