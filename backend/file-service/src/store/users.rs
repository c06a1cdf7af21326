//! Account directory: user records keyed by username

use crate::error::{FileServiceError, Result};
use crate::security::{hash_password, verify_password};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

/// A user account. Immutable once created.
#[derive(Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub role: String,
    password_hash: String,
}

impl User {
    /// Create a user, hashing `password` with Argon2id
    pub fn new(username: &str, password: &str, role: &str) -> Result<Self> {
        if username.is_empty() {
            return Err(FileServiceError::InvalidArgument(
                "username must not be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            username: username.to_string(),
            role: role.to_string(),
            password_hash: hash_password(password)?,
        })
    }

    pub fn is_correct_password(&self, password: &str) -> bool {
        match verify_password(password, &self.password_hash) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(username = %self.username, error = %e, "Stored password hash is unusable");
                false
            }
        }
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user
    ///
    /// ## Errors
    ///
    /// `UsernameAlreadyExists` if the username is taken.
    async fn save(&self, user: User) -> Result<()>;

    async fn find(&self, username: &str) -> Result<Option<User>>;
}

/// Process-local user store
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: DashMap<String, User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn save(&self, user: User) -> Result<()> {
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Err(FileServiceError::UsernameAlreadyExists(user.username)),
            Entry::Vacant(slot) => {
                slot.insert(user);
                Ok(())
            }
        }
    }

    async fn find(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.get(username).map(|entry| entry.value().clone()))
    }
}

/// Account created at server start
#[derive(Debug, Clone)]
pub struct UserSeed {
    pub username: String,
    pub password: String,
    pub role: String,
}

impl UserSeed {
    pub fn new(username: &str, password: &str, role: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            role: role.to_string(),
        }
    }
}

/// The two administrator accounts the server ships with
pub fn default_seeds() -> Vec<UserSeed> {
    vec![
        UserSeed::new("admin", "secret", "admin"),
        UserSeed::new("admin1", "secret", "admin"),
    ]
}

pub async fn seed_users(store: &dyn UserStore, seeds: &[UserSeed]) -> Result<()> {
    for seed in seeds {
        let user = User::new(&seed.username, &seed.password, &seed.role)?;
        store.save(user).await?;
        info!(username = %seed.username, role = %seed.role, "Seeded user");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_hashes_password() {
        let user = User::new("admin", "secret", "admin").unwrap();

        assert!(user.is_correct_password("secret"));
        assert!(!user.is_correct_password("wrong"));
        assert!(!format!("{:?}", user).contains("argon2"));
    }

    #[test]
    fn test_empty_username_rejected() {
        assert!(matches!(
            User::new("", "secret", "admin"),
            Err(FileServiceError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let store = InMemoryUserStore::new();
        store.save(User::new("admin", "secret", "admin").unwrap()).await.unwrap();

        let found = store.find("admin").await.unwrap().unwrap();
        assert_eq!(found.role, "admin");
        assert!(store.find("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = InMemoryUserStore::new();
        store.save(User::new("admin", "secret", "admin").unwrap()).await.unwrap();

        let result = store.save(User::new("admin", "other", "user").unwrap()).await;
        assert!(matches!(result, Err(FileServiceError::UsernameAlreadyExists(name)) if name == "admin"));

        // First record wins
        let found = store.find("admin").await.unwrap().unwrap();
        assert!(found.is_correct_password("secret"));
    }

    #[tokio::test]
    async fn test_seed_default_users() {
        let store = InMemoryUserStore::new();
        seed_users(&store, &default_seeds()).await.unwrap();

        for name in ["admin", "admin1"] {
            let user = store.find(name).await.unwrap().unwrap();
            assert_eq!(user.role, "admin");
            assert!(user.is_correct_password("secret"));
        }
    }
}
