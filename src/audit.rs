//! Append-only security audit trail.
//!
//! Recording is fire-and-forget: sinks must never fail the operation being
//! audited, so the trait is infallible and implementations swallow or log
//! their own errors. Entries carry the acting account (when known) and the
//! request metadata captured at the transport edge.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// What happened. Serialized as snake_case strings in sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountRegistered,
    EmailVerified,
    AccountActivated,
    LoginSucceeded,
    LoginFailed,
    AccountLocked,
    PasswordChanged,
    PasswordResetRequested,
    PasswordResetCompleted,
    MfaEnabled,
    MfaDisabled,
    BackupCodeConsumed,
    BackupCodesRegenerated,
    TokenRefreshed,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountRegistered => "account_registered",
            Self::EmailVerified => "email_verified",
            Self::AccountActivated => "account_activated",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::AccountLocked => "account_locked",
            Self::PasswordChanged => "password_changed",
            Self::PasswordResetRequested => "password_reset_requested",
            Self::PasswordResetCompleted => "password_reset_completed",
            Self::MfaEnabled => "mfa_enabled",
            Self::MfaDisabled => "mfa_disabled",
            Self::BackupCodeConsumed => "backup_code_consumed",
            Self::BackupCodesRegenerated => "backup_codes_regenerated",
            Self::TokenRefreshed => "token_refreshed",
        }
    }
}

/// Transport-edge context attached to each entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub client_addr: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub action: AuditAction,
    pub account_id: Option<Uuid>,
    /// Identifier as submitted, for failures where no account resolved.
    pub subject: Option<String>,
    /// What was acted on, when it is not the acting account itself.
    pub resource_type: Option<&'static str>,
    pub resource_id: Option<String>,
    pub detail: Option<String>,
    pub metadata: RequestMetadata,
}

impl AuditEntry {
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            action,
            account_id: None,
            subject: None,
            resource_type: None,
            resource_id: None,
            detail: None,
            metadata: RequestMetadata::default(),
        }
    }

    #[must_use]
    pub fn account(mut self, id: Uuid) -> Self {
        self.account_id = Some(id);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn resource(mut self, resource_type: &'static str, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type);
        self.resource_id = Some(resource_id.into());
        self
    }

    #[must_use]
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Destination for audit entries. Implementations must not block the
/// caller on slow backends.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry);
}

/// Emits entries as structured tracing events. Default sink.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, entry: AuditEntry) {
        tracing::info!(
            audit.action = entry.action.as_str(),
            audit.account_id = ?entry.account_id,
            audit.subject = ?entry.subject,
            audit.detail = ?entry.detail,
            client.addr = ?entry.metadata.client_addr,
            session.id = ?entry.metadata.session_id,
            "audit"
        );
    }
}

/// In-memory sink for tests and assertions.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<AuditAction> {
        self.entries().iter().map(|e| e.action).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

/// Persists entries to the `audit_entries` table. Inserts run on a spawned
/// task so the authentication path never waits on the database; a failed
/// insert is logged and dropped.
#[derive(Debug, Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, entry: AuditEntry) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let query = r#"
                INSERT INTO audit_entries
                    (id, occurred_at, action, account_id, subject,
                     resource_type, resource_id, detail,
                     client_addr, user_agent, session_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#;
            let result = sqlx::query(query)
                .bind(entry.id)
                .bind(entry.occurred_at)
                .bind(entry.action.as_str())
                .bind(entry.account_id)
                .bind(&entry.subject)
                .bind(entry.resource_type)
                .bind(&entry.resource_id)
                .bind(&entry.detail)
                .bind(&entry.metadata.client_addr)
                .bind(&entry.metadata.user_agent)
                .bind(&entry.metadata.session_id)
                .execute(&pool)
                .await;
            if let Err(err) = result {
                tracing::error!(
                    audit.action = entry.action.as_str(),
                    "failed to persist audit entry: {err}"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditAction, AuditEntry, AuditSink, MemoryAuditSink, RequestMetadata};
    use uuid::Uuid;

    #[test]
    fn memory_sink_preserves_order() {
        let sink = MemoryAuditSink::new();
        sink.record(AuditEntry::new(AuditAction::LoginFailed).subject("bob"));
        sink.record(AuditEntry::new(AuditAction::AccountLocked).subject("bob"));
        assert_eq!(
            sink.actions(),
            vec![AuditAction::LoginFailed, AuditAction::AccountLocked]
        );
    }

    #[test]
    fn builder_attaches_context() {
        let id = Uuid::new_v4();
        let entry = AuditEntry::new(AuditAction::LoginSucceeded)
            .account(id)
            .resource("account", id.to_string())
            .detail("mfa bypass code")
            .metadata(RequestMetadata {
                client_addr: Some("198.51.100.7".to_string()),
                user_agent: Some("test".to_string()),
                session_id: Some("sess-42".to_string()),
            });
        assert_eq!(entry.account_id, Some(id));
        assert_eq!(entry.resource_type, Some("account"));
        assert_eq!(entry.detail.as_deref(), Some("mfa bypass code"));
        assert_eq!(entry.metadata.client_addr.as_deref(), Some("198.51.100.7"));
        assert_eq!(entry.metadata.session_id.as_deref(), Some("sess-42"));
    }

    #[test]
    fn actions_have_stable_names() {
        assert_eq!(AuditAction::PasswordResetRequested.as_str(), "password_reset_requested");
        assert_eq!(AuditAction::BackupCodesRegenerated.as_str(), "backup_codes_regenerated");
    }
}
