//! Credential persistence.
//!
//! [`CredentialStore`] is the only seam between the authentication flows
//! and storage. Mutations that must be atomic under concurrent logins
//! (failure counting, token consumption, backup-code removal) are dedicated
//! operations rather than read-modify-write on a loaded [`Account`], so
//! every backend can make them single-step.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::account::Account;
use crate::error::Result;

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

pub trait CredentialStore: Send + Sync {
    fn find_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn find_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    /// Lookup by normalized email.
    fn find_by_email(&self, email: &str) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn find_by_reset_token_hash(
        &self,
        token_hash: &[u8],
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn find_by_verification_token_hash(
        &self,
        token_hash: &[u8],
    ) -> impl Future<Output = Result<Option<Account>>> + Send;

    fn exists_by_username(&self, username: &str) -> impl Future<Output = Result<bool>> + Send;

    fn exists_by_email(&self, email: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Insert a new account. Fails with [`crate::Error::AlreadyExists`] when
    /// the username or email is taken.
    fn insert(&self, account: &Account) -> impl Future<Output = Result<()>> + Send;

    /// Persist the full current state of an existing account.
    fn save(&self, account: &Account) -> impl Future<Output = Result<()>> + Send;

    /// Atomically bump the failure counter and return its new value.
    fn record_login_failure(&self, id: Uuid) -> impl Future<Output = Result<u32>> + Send;

    /// Clear the failure counter and lockout, stamp `last_login_at`.
    fn record_login_success(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn lock_until(
        &self,
        id: Uuid,
        until: DateTime<Utc>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Atomically clear the verification token if it still matches
    /// `expected_hash`, marking the email verified and the account active.
    /// Returns false when another request consumed it first.
    fn consume_verification_token(
        &self,
        id: Uuid,
        expected_hash: &[u8],
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically finish a password reset: if the stored reset token still
    /// matches `expected_hash`, set the new password digest, clear the token
    /// and any lockout, and return true. Returns false when the token was
    /// already consumed.
    fn complete_password_reset(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_password_hash: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically remove one backup-code digest. Returns false when the
    /// digest was no longer present.
    fn consume_backup_code(
        &self,
        id: Uuid,
        code_hash: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Clear lockouts whose deadline has passed, resetting the failure
    /// counter. The lockout check is lazy so this is maintenance, not a
    /// correctness requirement. Returns the number of accounts touched.
    fn unlock_expired(&self, now: DateTime<Utc>) -> impl Future<Output = Result<u64>> + Send;

    /// Drop reset tokens whose expiry has passed. Returns the number of
    /// accounts touched.
    fn clear_expired_reset_tokens(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64>> + Send;
}
