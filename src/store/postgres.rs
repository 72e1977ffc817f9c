//! PostgreSQL-backed [`CredentialStore`].
//!
//! Concurrency-sensitive mutations are single statements with a guard in
//! the WHERE clause, so two racing requests can never both consume the same
//! token or both miss a failure increment. Schema lives in `db/schema.sql`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::CredentialStore;
use crate::account::{Account, AccountStatus, Role};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str = r"
    id, username, email, password_hash, role::text AS role, status::text AS status,
    email_verified, failed_login_attempts, locked_until,
    reset_token_hash, reset_token_expires_at,
    verification_token_hash, verification_token_expires_at,
    mfa_enabled, mfa_secret, backup_code_hashes,
    last_login_at, created_at, updated_at
";

fn row_to_account(row: &sqlx::postgres::PgRow) -> anyhow::Result<Account> {
    let role: String = row.get("role");
    let status: String = row.get("status");
    let failed: i32 = row.get("failed_login_attempts");
    Ok(Account {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: Role::from_str(&role).context("unknown role in accounts row")?,
        status: AccountStatus::from_str(&status).context("unknown status in accounts row")?,
        email_verified: row.get("email_verified"),
        failed_login_attempts: u32::try_from(failed).unwrap_or(0),
        locked_until: row.get("locked_until"),
        reset_token_hash: row.get("reset_token_hash"),
        reset_token_expires_at: row.get("reset_token_expires_at"),
        verification_token_hash: row.get("verification_token_hash"),
        verification_token_expires_at: row.get("verification_token_expires_at"),
        mfa_enabled: row.get("mfa_enabled"),
        mfa_secret: row.get("mfa_secret"),
        backup_code_hashes: row.get("backup_code_hashes"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn unique_violation_field(err: &sqlx::Error) -> &'static str {
    if let sqlx::Error::Database(db_err) = err {
        if db_err
            .constraint()
            .is_some_and(|name| name.contains("email"))
        {
            return "email";
        }
    }
    "username"
}

fn query_span(operation: &'static str, query: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = query
    )
}

fn map_row(row: Option<sqlx::postgres::PgRow>) -> Result<Option<Account>> {
    row.map(|row| row_to_account(&row))
        .transpose()
        .map_err(Error::Storage)
}

impl CredentialStore for PgCredentialStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = query_span("SELECT", &query);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by id")?;
        map_row(row)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        let span = query_span("SELECT", &query);
        let row = sqlx::query(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by username")?;
        map_row(row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let span = query_span("SELECT", &query);
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by email")?;
        map_row(row)
    }

    async fn find_by_reset_token_hash(&self, token_hash: &[u8]) -> Result<Option<Account>> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE reset_token_hash = $1");
        let span = query_span("SELECT", &query);
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by reset token")?;
        map_row(row)
    }

    async fn find_by_verification_token_hash(&self, token_hash: &[u8]) -> Result<Option<Account>> {
        let query =
            format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE verification_token_hash = $1");
        let span = query_span("SELECT", &query);
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load account by verification token")?;
        map_row(row)
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool> {
        let query = "SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1) AS taken";
        let span = query_span("SELECT", query);
        let row = sqlx::query(query)
            .bind(username)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check username availability")?;
        Ok(row.get("taken"))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool> {
        let query = "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1) AS taken";
        let span = query_span("SELECT", query);
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check email availability")?;
        Ok(row.get("taken"))
    }

    async fn insert(&self, account: &Account) -> Result<()> {
        let query = r"
            INSERT INTO accounts
                (id, username, email, password_hash, role, status,
                 email_verified, failed_login_attempts, locked_until,
                 reset_token_hash, reset_token_expires_at,
                 verification_token_hash, verification_token_expires_at,
                 mfa_enabled, mfa_secret, backup_code_hashes,
                 last_login_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19)
        ";
        let span = query_span("INSERT", query);
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.status.as_str())
            .bind(account.email_verified)
            .bind(account.failed_login_attempts as i32)
            .bind(account.locked_until)
            .bind(&account.reset_token_hash)
            .bind(account.reset_token_expires_at)
            .bind(&account.verification_token_hash)
            .bind(account.verification_token_expires_at)
            .bind(account.mfa_enabled)
            .bind(&account.mfa_secret)
            .bind(&account.backup_code_hashes)
            .bind(account.last_login_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(Error::AlreadyExists {
                field: unique_violation_field(&err),
            }),
            Err(err) => Err(Error::Storage(
                anyhow::Error::new(err).context("failed to insert account"),
            )),
        }
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let query = r"
            UPDATE accounts SET
                email = $2, password_hash = $3, role = $4, status = $5,
                email_verified = $6, failed_login_attempts = $7, locked_until = $8,
                reset_token_hash = $9, reset_token_expires_at = $10,
                verification_token_hash = $11, verification_token_expires_at = $12,
                mfa_enabled = $13, mfa_secret = $14, backup_code_hashes = $15,
                last_login_at = $16, updated_at = now()
            WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .bind(account.status.as_str())
            .bind(account.email_verified)
            .bind(account.failed_login_attempts as i32)
            .bind(account.locked_until)
            .bind(&account.reset_token_hash)
            .bind(account.reset_token_expires_at)
            .bind(&account.verification_token_hash)
            .bind(account.verification_token_expires_at)
            .bind(account.mfa_enabled)
            .bind(&account.mfa_secret)
            .bind(&account.backup_code_hashes)
            .bind(account.last_login_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save account")?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn record_login_failure(&self, id: Uuid) -> Result<u32> {
        let query = r"
            UPDATE accounts
            SET failed_login_attempts = failed_login_attempts + 1, updated_at = now()
            WHERE id = $1
            RETURNING failed_login_attempts
        ";
        let span = query_span("UPDATE", query);
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?
            .ok_or(Error::NotFound)?;
        let failed: i32 = row.get("failed_login_attempts");
        Ok(u32::try_from(failed).unwrap_or(u32::MAX))
    }

    async fn record_login_success(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET failed_login_attempts = 0, locked_until = NULL,
                last_login_at = $2, updated_at = now()
            WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn lock_until(&self, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE accounts SET locked_until = $2, updated_at = now() WHERE id = $1
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to lock account")?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    async fn consume_verification_token(&self, id: Uuid, expected_hash: &[u8]) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET verification_token_hash = NULL, verification_token_expires_at = NULL,
                email_verified = TRUE, status = 'active', updated_at = now()
            WHERE id = $1 AND verification_token_hash = $2
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(expected_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume verification token")?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        expected_hash: &[u8],
        new_password_hash: &str,
    ) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET password_hash = $3,
                reset_token_hash = NULL, reset_token_expires_at = NULL,
                failed_login_attempts = 0, locked_until = NULL, updated_at = now()
            WHERE id = $1 AND reset_token_hash = $2
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(expected_hash)
            .bind(new_password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to complete password reset")?;
        Ok(result.rows_affected() == 1)
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        let query = r"
            UPDATE accounts
            SET backup_code_hashes = array_remove(backup_code_hashes, $2), updated_at = now()
            WHERE id = $1 AND $2 = ANY(backup_code_hashes)
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(id)
            .bind(code_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to consume backup code")?;
        Ok(result.rows_affected() == 1)
    }

    async fn unlock_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE accounts
            SET locked_until = NULL, failed_login_attempts = 0, updated_at = now()
            WHERE locked_until IS NOT NULL AND locked_until <= $1
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to unlock expired accounts")?;
        Ok(result.rows_affected())
    }

    async fn clear_expired_reset_tokens(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = r"
            UPDATE accounts
            SET reset_token_hash = NULL, reset_token_expires_at = NULL, updated_at = now()
            WHERE reset_token_expires_at IS NOT NULL AND reset_token_expires_at <= $1
        ";
        let span = query_span("UPDATE", query);
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear expired reset tokens")?;
        Ok(result.rows_affected())
    }
}
