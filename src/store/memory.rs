//! In-memory [`CredentialStore`] for tests and local development.
//!
//! Every operation takes the single map lock once, so the same atomicity
//! the SQL backend gets from single statements holds here too.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::CredentialStore;
use crate::account::Account;
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    accounts: Mutex<HashMap<Uuid, Account>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<Uuid, Account>) -> Result<T>) -> Result<T> {
        let mut map = self
            .accounts
            .lock()
            .map_err(|_| Error::Storage(anyhow!("account map lock poisoned")))?;
        f(&mut map)
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        self.with_map(|map| Ok(map.get(&id).cloned()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        self.with_map(|map| Ok(map.values().find(|a| a.username == username).cloned()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.with_map(|map| Ok(map.values().find(|a| a.email == email).cloned()))
    }

    async fn find_by_reset_token_hash(&self, token_hash: &[u8]) -> Result<Option<Account>> {
        self.with_map(|map| {
            Ok(map
                .values()
                .find(|a| a.reset_token_hash.as_deref() == Some(token_hash))
                .cloned())
        })
    }

    async fn find_by_verification_token_hash(&self, token_hash: &[u8]) -> Result<Option<Account>> {
        self.with_map(|map| {
            Ok(map
                .values()
                .find(|a| a.verification_token_hash.as_deref() == Some(token_hash))
                .cloned())
        })
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        self.with_map(|map| Ok(map.values().any(|a| a.username == username)))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        self.with_map(|map| Ok(map.values().any(|a| a.email == email)))
    }

    async fn insert(&self, account: &Account) -> Result<()> {
        self.with_map(|map| {
            if map.values().any(|a| a.username == account.username) {
                return Err(Error::AlreadyExists { field: "username" });
            }
            if map.values().any(|a| a.email == account.email) {
                return Err(Error::AlreadyExists { field: "email" });
            }
            map.insert(account.id, account.clone());
            Ok(())
        })
    }

    async fn save(&self, account: &Account) -> Result<()> {
        self.with_map(|map| {
            if !map.contains_key(&account.id) {
                return Err(Error::NotFound);
            }
            let mut account = account.clone();
            account.updated_at = Utc::now();
            map.insert(account.id, account);
            Ok(())
        })
    }

    async fn record_login_failure(&self, id: Uuid) -> Result<u32> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            account.failed_login_attempts += 1;
            account.updated_at = Utc::now();
            Ok(account.failed_login_attempts)
        })
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            account.failed_login_attempts = 0;
            account.locked_until = None;
            account.last_login_at = Some(now);
            account.updated_at = now;
            Ok(())
        })
    }

    async fn lock_until(&self, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            account.locked_until = Some(until);
            account.updated_at = Utc::now();
            Ok(())
        })
    }

    async fn consume_verification_token(&self, id: Uuid, expected_hash: &[u8]) -> Result<bool> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            if account.verification_token_hash.as_deref() != Some(expected_hash) {
                return Ok(false);
            }
            account.verification_token_hash = None;
            account.verification_token_expires_at = None;
            account.email_verified = true;
            account.status = crate::account::AccountStatus::Active;
            account.updated_at = Utc::now();
            Ok(true)
        })
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_password_hash: &str,
    ) -> Result<bool> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            if account.reset_token_hash.as_deref() != Some(expected_hash) {
                return Ok(false);
            }
            account.password_hash = new_password_hash.to_string();
            account.reset_token_hash = None;
            account.reset_token_expires_at = None;
            account.failed_login_attempts = 0;
            account.locked_until = None;
            account.updated_at = Utc::now();
            Ok(true)
        })
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        self.with_map(|map| {
            let account = map.get_mut(&id).ok_or(Error::NotFound)?;
            let before = account.backup_code_hashes.len();
            account.backup_code_hashes.retain(|h| h != code_hash);
            if account.backup_code_hashes.len() == before {
                return Ok(false);
            }
            account.updated_at = Utc::now();
            Ok(true)
        })
    }

    async fn unlock_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.with_map(|map| {
            let mut unlocked = 0;
            for account in map.values_mut() {
                if matches!(account.locked_until, Some(at) if at <= now) {
                    account.locked_until = None;
                    account.failed_login_attempts = 0;
                    account.updated_at = now;
                    unlocked += 1;
                }
            }
            Ok(unlocked)
        })
    }

    async fn clear_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        self.with_map(|map| {
            let mut cleared = 0;
            for account in map.values_mut() {
                if matches!(account.reset_token_expires_at, Some(at) if at <= now) {
                    account.reset_token_hash = None;
                    account.reset_token_expires_at = None;
                    account.updated_at = now;
                    cleared += 1;
                }
            }
            Ok(cleared)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryCredentialStore;
    use crate::account::{Account, Role};
    use crate::error::Error;
    use crate::store::CredentialStore;
    use chrono::{Duration, Utc};

    fn account(username: &str, email: &str) -> Account {
        Account::new(
            username.to_string(),
            email.to_string(),
            "$argon2id$fake".to_string(),
            Role::Provider,
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_username_and_email() {
        let store = MemoryCredentialStore::new();
        store.insert(&account("alice", "alice@example.com")).await.unwrap();

        let err = store
            .insert(&account("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { field: "username" }));

        let err = store
            .insert(&account("alice2", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { field: "email" }));
    }

    #[tokio::test]
    async fn failure_counter_increments_and_resets() {
        let store = MemoryCredentialStore::new();
        let account = account("bob", "bob@example.com");
        store.insert(&account).await.unwrap();

        assert_eq!(store.record_login_failure(account.id).await.unwrap(), 1);
        assert_eq!(store.record_login_failure(account.id).await.unwrap(), 2);

        let now = Utc::now();
        store.record_login_success(account.id, now).await.unwrap();
        let loaded = store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.failed_login_attempts, 0);
        assert_eq!(loaded.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn reset_completion_is_single_use() {
        let store = MemoryCredentialStore::new();
        let mut account = account("carol", "carol@example.com");
        account.reset_token_hash = Some(vec![7u8; 32]);
        account.reset_token_expires_at = Some(Utc::now() + Duration::hours(24));
        store.insert(&account).await.unwrap();

        assert!(store
            .complete_password_reset(account.id, &[7u8; 32], "$argon2id$new")
            .await
            .unwrap());
        assert!(!store
            .complete_password_reset(account.id, &[7u8; 32], "$argon2id$other")
            .await
            .unwrap());

        let loaded = store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.password_hash, "$argon2id$new");
        assert!(loaded.reset_token_hash.is_none());
    }

    #[tokio::test]
    async fn backup_code_consumption_removes_exactly_one_digest() {
        let store = MemoryCredentialStore::new();
        let mut account = account("dan", "dan@example.com");
        account.backup_code_hashes = vec!["h1".to_string(), "h2".to_string()];
        store.insert(&account).await.unwrap();

        assert!(store.consume_backup_code(account.id, "h1").await.unwrap());
        assert!(!store.consume_backup_code(account.id, "h1").await.unwrap());
        let loaded = store.find_by_id(account.id).await.unwrap().unwrap();
        assert_eq!(loaded.backup_code_hashes, vec!["h2".to_string()]);
    }

    #[tokio::test]
    async fn expired_lockouts_are_swept() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();
        let mut account = account("gus", "gus@example.com");
        account.locked_until = Some(now - Duration::minutes(1));
        account.failed_login_attempts = 5;
        store.insert(&account).await.unwrap();

        assert_eq!(store.unlock_expired(now).await.unwrap(), 1);
        let loaded = store.find_by_id(account.id).await.unwrap().unwrap();
        assert!(loaded.locked_until.is_none());
        assert_eq!(loaded.failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn expired_reset_tokens_are_swept() {
        let store = MemoryCredentialStore::new();
        let now = Utc::now();

        let mut expired = account("eve", "eve@example.com");
        expired.reset_token_hash = Some(vec![1u8; 32]);
        expired.reset_token_expires_at = Some(now - Duration::minutes(1));
        store.insert(&expired).await.unwrap();

        let mut live = account("frank", "frank@example.com");
        live.reset_token_hash = Some(vec![2u8; 32]);
        live.reset_token_expires_at = Some(now + Duration::hours(1));
        store.insert(&live).await.unwrap();

        assert_eq!(store.clear_expired_reset_tokens(now).await.unwrap(), 1);
        let loaded = store.find_by_id(live.id).await.unwrap().unwrap();
        assert!(loaded.reset_token_hash.is_some());
    }
}
