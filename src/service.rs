//! Authentication and account-security flows.
//!
//! [`AuthService`] wires the credential store, hashing, policy, lockout,
//! token, audit, and notification pieces into the operations the rest of
//! the platform calls. It is generic over the store so the same flows run
//! against PostgreSQL in production and the in-memory store in tests.

use std::sync::{Arc, OnceLock};

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::account::{Account, AccountStatus, Role};
use crate::audit::{AuditAction, AuditEntry, AuditSink, RequestMetadata, TracingAuditSink};
use crate::config::SecurityConfig;
use crate::error::{Error, Result};
use crate::mfa::{self, BackupCodeBatch};
use crate::notify::{NoopDispatcher, Notification, NotificationDispatcher};
use crate::store::CredentialStore;
use crate::{lockout, password, policy, token, util};

/// Credentials submitted at login. The identifier may be a username or an
/// email address.
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub identifier: String,
    pub password: String,
    pub metadata: RequestMetadata,
}

/// Tokens handed back on successful authentication or refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub metadata: RequestMetadata,
}

/// Material returned from MFA enrollment. Shown to the member once; only
/// digests of the backup codes persist.
#[derive(Debug)]
pub struct MfaEnrollment {
    pub secret: String,
    pub backup_codes: Vec<String>,
}

pub struct AuthService<S> {
    store: S,
    config: SecurityConfig,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatcher>,
    // Digest verified against when no account matches, so unknown
    // identifiers cost the same as a password mismatch.
    dummy_digest: OnceLock<String>,
}

impl<S: CredentialStore> AuthService<S> {
    pub fn new(store: S, config: SecurityConfig) -> Self {
        Self {
            store,
            config,
            audit: Arc::new(TracingAuditSink),
            notifier: Arc::new(NoopDispatcher),
            dummy_digest: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &SecurityConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create a new account in `Pending` status and send its verification
    /// email. The password is policy-checked before any hashing happens.
    pub async fn register(&self, input: RegisterInput) -> Result<Account> {
        let email = util::normalize_email(&input.email);
        if !util::valid_email(&email) {
            return Err(Error::InvalidEmail);
        }
        policy::validate(&input.password, self.config.password_min_length())?;

        let password_hash = password::hash(&input.password, self.config.pepper())?;
        let mut account = Account::new(input.username, email, password_hash, input.role);

        let verification_token = util::generate_token()?;
        account.verification_token_hash = Some(util::hash_token(&verification_token));
        account.verification_token_expires_at = Some(
            Utc::now() + Duration::seconds(self.config.verification_token_ttl_seconds()),
        );

        self.store.insert(&account).await?;

        self.audit.record(
            AuditEntry::new(AuditAction::AccountRegistered)
                .account(account.id)
                .subject(account.username.clone())
                .metadata(input.metadata),
        );
        self.notifier.dispatch(Notification::VerificationEmail {
            email: account.email.clone(),
            token: verification_token,
        });
        Ok(account)
    }

    /// Verify an email address from the token sent at registration.
    pub async fn verify_email(&self, raw_token: &str) -> Result<Account> {
        let token_hash = util::hash_token(raw_token);
        let account = self
            .store
            .find_by_verification_token_hash(&token_hash)
            .await?
            .ok_or(Error::InvalidToken)?;

        if matches!(account.verification_token_expires_at, Some(at) if at <= Utc::now()) {
            return Err(Error::TokenExpired);
        }
        if !self
            .store
            .consume_verification_token(account.id, &token_hash)
            .await?
        {
            return Err(Error::InvalidToken);
        }

        self.audit.record(
            AuditEntry::new(AuditAction::EmailVerified)
                .account(account.id)
                .subject(account.username.clone()),
        );
        self.store
            .find_by_id(account.id)
            .await?
            .ok_or(Error::NotFound)
    }

    /// Administrative override that activates an account without email
    /// verification.
    pub async fn activate(&self, id: Uuid) -> Result<Account> {
        let mut account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;
        account.status = AccountStatus::Active;
        account.email_verified = true;
        account.verification_token_hash = None;
        account.verification_token_expires_at = None;
        self.store.save(&account).await?;
        self.audit.record(
            AuditEntry::new(AuditAction::AccountActivated)
                .account(account.id)
                .subject(account.username.clone())
                .resource("account", account.id.to_string()),
        );
        Ok(account)
    }

    /// Authenticate by username or email and issue a token pair.
    ///
    /// The lockout check runs before password verification, so a locked
    /// account answers [`Error::AccountLocked`] even for a correct password.
    /// Unknown identifiers and wrong passwords both answer
    /// [`Error::InvalidCredentials`].
    pub async fn authenticate(&self, input: LoginInput) -> Result<TokenPair> {
        let account = self.lookup_identifier(&input.identifier).await?;
        let Some(account) = account else {
            self.burn_password_hash(&input.password);
            self.audit.record(
                AuditEntry::new(AuditAction::LoginFailed)
                    .subject(input.identifier.clone())
                    .detail("unknown identifier")
                    .metadata(input.metadata),
            );
            return Err(Error::InvalidCredentials);
        };

        let now = Utc::now();
        lockout::ensure_unlocked(&account, now)?;

        if !password::verify(&input.password, &account.password_hash, self.config.pepper())? {
            let failures = self.store.record_login_failure(account.id).await?;
            if lockout::threshold_reached(&self.config, failures) {
                let until = lockout::lockout_expiry(&self.config, now);
                self.store.lock_until(account.id, until).await?;
                self.audit.record(
                    AuditEntry::new(AuditAction::AccountLocked)
                        .account(account.id)
                        .subject(account.username.clone())
                        .detail(format!("{failures} consecutive failures"))
                        .metadata(input.metadata.clone()),
                );
                self.notifier.dispatch(Notification::LockoutNotice {
                    email: account.email.clone(),
                    until,
                });
            }
            self.audit.record(
                AuditEntry::new(AuditAction::LoginFailed)
                    .account(account.id)
                    .subject(account.username.clone())
                    .detail("password mismatch")
                    .metadata(input.metadata),
            );
            return Err(Error::InvalidCredentials);
        }

        match account.status {
            AccountStatus::Pending => return Err(Error::AccountNotVerified),
            AccountStatus::Disabled => return Err(Error::AccountDisabled),
            AccountStatus::Active => {}
        }

        self.store.record_login_success(account.id, now).await?;
        self.audit.record(
            AuditEntry::new(AuditAction::LoginSucceeded)
                .account(account.id)
                .subject(account.username.clone())
                .metadata(input.metadata),
        );
        self.issue_pair(&account, now.timestamp())
    }

    /// Exchange a refresh token for a fresh token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let now = Utc::now();
        let claims = token::validate_refresh_token(refresh_token, &self.config, now.timestamp())?;
        let id = Uuid::parse_str(&claims.sub).map_err(|_| Error::InvalidToken)?;
        let account = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(Error::InvalidToken)?;

        lockout::ensure_unlocked(&account, now)?;
        match account.status {
            AccountStatus::Pending => return Err(Error::AccountNotVerified),
            AccountStatus::Disabled => return Err(Error::AccountDisabled),
            AccountStatus::Active => {}
        }

        self.audit.record(
            AuditEntry::new(AuditAction::TokenRefreshed)
                .account(account.id)
                .subject(account.username.clone()),
        );
        self.issue_pair(&account, now.timestamp())
    }

    /// Change a password with proof of the current one.
    pub async fn change_password(
        &self,
        id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let mut account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;
        if !password::verify(current_password, &account.password_hash, self.config.pepper())? {
            return Err(Error::InvalidCredentials);
        }
        policy::validate(new_password, self.config.password_min_length())?;

        account.password_hash = password::hash(new_password, self.config.pepper())?;
        account.failed_login_attempts = 0;
        account.locked_until = None;
        self.store.save(&account).await?;

        self.audit.record(
            AuditEntry::new(AuditAction::PasswordChanged)
                .account(account.id)
                .subject(account.username.clone()),
        );
        self.notifier.dispatch(Notification::PasswordChangedNotice {
            email: account.email.clone(),
        });
        Ok(())
    }

    /// Start a password reset. Unknown emails return Ok with no side
    /// effects visible to the caller, so the endpoint cannot be used to
    /// probe for accounts. A prior unconsumed token is replaced.
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = util::normalize_email(email);
        let Some(mut account) = self.store.find_by_email(&email).await? else {
            tracing::debug!("password reset requested for unknown email");
            return Ok(());
        };

        let raw_token = util::generate_token()?;
        account.reset_token_hash = Some(util::hash_token(&raw_token));
        account.reset_token_expires_at =
            Some(Utc::now() + Duration::seconds(self.config.reset_token_ttl_seconds()));
        self.store.save(&account).await?;

        self.audit.record(
            AuditEntry::new(AuditAction::PasswordResetRequested)
                .account(account.id)
                .subject(account.username.clone()),
        );
        self.notifier.dispatch(Notification::PasswordResetEmail {
            email: account.email.clone(),
            token: raw_token,
        });
        Ok(())
    }

    /// Finish a password reset from the emailed token.
    ///
    /// Policy runs before the token is consumed, so a rejected new password
    /// leaves the token usable for another attempt. Completion also clears
    /// any lockout.
    pub async fn complete_password_reset(&self, raw_token: &str, new_password: &str) -> Result<()> {
        let token_hash = util::hash_token(raw_token);
        let account = self
            .store
            .find_by_reset_token_hash(&token_hash)
            .await?
            .ok_or(Error::InvalidToken)?;

        if matches!(account.reset_token_expires_at, Some(at) if at <= Utc::now()) {
            return Err(Error::TokenExpired);
        }
        policy::validate(new_password, self.config.password_min_length())?;

        let new_hash = password::hash(new_password, self.config.pepper())?;
        if !self
            .store
            .complete_password_reset(account.id, &token_hash, &new_hash)
            .await?
        {
            return Err(Error::InvalidToken);
        }

        self.audit.record(
            AuditEntry::new(AuditAction::PasswordResetCompleted)
                .account(account.id)
                .subject(account.username.clone()),
        );
        self.notifier
            .dispatch(Notification::PasswordResetConfirmation {
                email: account.email.clone(),
            });
        Ok(())
    }

    /// Enroll in MFA with a caller-supplied shared secret (the transport
    /// layer renders it as a QR code) and a fresh batch of single-use
    /// backup codes. Re-enrolling replaces both. [`mfa::generate_secret`]
    /// produces a suitable secret.
    pub async fn enable_mfa(&self, id: Uuid, shared_secret: String) -> Result<MfaEnrollment> {
        let mut account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;

        let batch = BackupCodeBatch::generate(self.config.backup_code_count(), self.config.pepper())?;

        account.mfa_enabled = true;
        account.mfa_secret = Some(shared_secret.clone());
        account.backup_code_hashes = batch.hashes;
        self.store.save(&account).await?;

        self.audit.record(
            AuditEntry::new(AuditAction::MfaEnabled)
                .account(account.id)
                .subject(account.username.clone()),
        );
        Ok(MfaEnrollment {
            secret: shared_secret,
            backup_codes: batch.plaintext,
        })
    }

    /// Disable MFA and discard all enrollment material.
    pub async fn disable_mfa(&self, id: Uuid) -> Result<()> {
        let mut account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;
        account.mfa_enabled = false;
        account.mfa_secret = None;
        account.backup_code_hashes = Vec::new();
        self.store.save(&account).await?;
        self.audit.record(
            AuditEntry::new(AuditAction::MfaDisabled)
                .account(account.id)
                .subject(account.username.clone()),
        );
        Ok(())
    }

    /// Replace the remaining backup codes with a fresh batch.
    pub async fn regenerate_backup_codes(&self, id: Uuid) -> Result<Vec<String>> {
        let mut account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;
        if !account.mfa_enabled {
            return Err(Error::NotFound);
        }
        let batch = BackupCodeBatch::generate(self.config.backup_code_count(), self.config.pepper())?;
        account.backup_code_hashes = batch.hashes;
        self.store.save(&account).await?;
        self.audit.record(
            AuditEntry::new(AuditAction::BackupCodesRegenerated)
                .account(account.id)
                .subject(account.username.clone()),
        );
        Ok(batch.plaintext)
    }

    /// Redeem one backup code. Each code works exactly once; replays and
    /// unknown codes answer [`Error::InvalidCredentials`].
    pub async fn consume_backup_code(&self, id: Uuid, submitted: &str) -> Result<()> {
        let account = self.store.find_by_id(id).await?.ok_or(Error::NotFound)?;
        let Some(matched) = mfa::find_matching_hash(
            submitted,
            &account.backup_code_hashes,
            self.config.pepper(),
        )?
        else {
            return Err(Error::InvalidCredentials);
        };

        if !self.store.consume_backup_code(account.id, matched).await? {
            return Err(Error::InvalidCredentials);
        }
        self.audit.record(
            AuditEntry::new(AuditAction::BackupCodeConsumed)
                .account(account.id)
                .subject(account.username.clone()),
        );
        Ok(())
    }

    /// Availability probe for signup forms.
    pub async fn is_username_available(&self, username: &str) -> Result<bool> {
        Ok(!self.store.exists_by_username(username).await?)
    }

    /// Availability probe for signup forms. Expects any casing; the check
    /// runs against the normalized form.
    pub async fn is_email_available(&self, email: &str) -> Result<bool> {
        Ok(!self
            .store
            .exists_by_email(&util::normalize_email(email))
            .await?)
    }

    /// Maintenance sweep clearing lockouts past their deadline.
    pub async fn unlock_expired_accounts(&self) -> Result<u64> {
        let unlocked = self.store.unlock_expired(Utc::now()).await?;
        if unlocked > 0 {
            tracing::info!(unlocked, "cleared expired lockouts");
        }
        Ok(unlocked)
    }

    /// Maintenance sweep for reset tokens past their expiry.
    pub async fn sweep_expired_reset_tokens(&self) -> Result<u64> {
        let cleared = self.store.clear_expired_reset_tokens(Utc::now()).await?;
        if cleared > 0 {
            tracing::info!(cleared, "swept expired reset tokens");
        }
        Ok(cleared)
    }

    /// Verify the submitted password against a throwaway digest so the
    /// unknown-identifier path takes as long as a real mismatch. The
    /// outcome is discarded; the caller answers `InvalidCredentials`
    /// either way.
    fn burn_password_hash(&self, submitted: &str) {
        let digest = match self.dummy_digest.get() {
            Some(digest) => digest,
            None => {
                let Ok(digest) = password::hash("not-a-real-password", self.config.pepper())
                else {
                    return;
                };
                self.dummy_digest.get_or_init(|| digest)
            }
        };
        let _ = password::verify(submitted, digest, self.config.pepper());
    }

    async fn lookup_identifier(&self, identifier: &str) -> Result<Option<Account>> {
        if let Some(account) = self.store.find_by_username(identifier).await? {
            return Ok(Some(account));
        }
        self.store
            .find_by_email(&util::normalize_email(identifier))
            .await
    }

    fn issue_pair(&self, account: &Account, now_unix_seconds: i64) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: token::issue_access_token(account, &self.config, now_unix_seconds)?,
            refresh_token: token::issue_refresh_token(account, &self.config, now_unix_seconds)?,
        })
    }
}
