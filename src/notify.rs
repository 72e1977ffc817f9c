//! Outbound member notifications.
//!
//! Dispatch is fire-and-forget: delivery failures never fail the security
//! operation that triggered them, so the trait is infallible and the actual
//! transport (SMTP relay, queue, webhook) lives behind an implementation
//! provided at wiring time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

/// Messages the security core needs delivered to a member.
///
/// Token-bearing variants carry the raw token, which exists only in this
/// message; the store holds digests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    VerificationEmail {
        email: String,
        token: String,
    },
    PasswordResetEmail {
        email: String,
        token: String,
    },
    PasswordResetConfirmation {
        email: String,
    },
    PasswordChangedNotice {
        email: String,
    },
    LockoutNotice {
        email: String,
        until: DateTime<Utc>,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerificationEmail { .. } => "verification_email",
            Self::PasswordResetEmail { .. } => "password_reset_email",
            Self::PasswordResetConfirmation { .. } => "password_reset_confirmation",
            Self::PasswordChangedNotice { .. } => "password_changed_notice",
            Self::LockoutNotice { .. } => "lockout_notice",
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Self::VerificationEmail { email, .. }
            | Self::PasswordResetEmail { email, .. }
            | Self::PasswordResetConfirmation { email }
            | Self::PasswordChangedNotice { email }
            | Self::LockoutNotice { email, .. } => email,
        }
    }
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Logs the notification kind and drops it. Default dispatcher; raw tokens
/// are never written to the log.
#[derive(Debug, Default)]
pub struct NoopDispatcher;

impl NotificationDispatcher for NoopDispatcher {
    fn dispatch(&self, notification: Notification) {
        tracing::debug!(
            notify.kind = notification.kind(),
            notify.email = notification.email(),
            "notification dropped (no dispatcher configured)"
        );
    }
}

/// Captures notifications for tests.
#[derive(Debug, Default)]
pub struct MemoryDispatcher {
    sent: Mutex<Vec<Notification>>,
}

impl MemoryDispatcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Raw token from the most recent token-bearing message, if any.
    pub fn last_token(&self) -> Option<String> {
        self.sent().iter().rev().find_map(|n| match n {
            Notification::VerificationEmail { token, .. }
            | Notification::PasswordResetEmail { token, .. } => Some(token.clone()),
            _ => None,
        })
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn dispatch(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryDispatcher, Notification, NotificationDispatcher};

    #[test]
    fn memory_dispatcher_records_in_order() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.dispatch(Notification::VerificationEmail {
            email: "a@example.com".to_string(),
            token: "tok-1".to_string(),
        });
        dispatcher.dispatch(Notification::PasswordChangedNotice {
            email: "a@example.com".to_string(),
        });
        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind(), "verification_email");
        assert_eq!(sent[1].kind(), "password_changed_notice");
    }

    #[test]
    fn last_token_skips_tokenless_messages() {
        let dispatcher = MemoryDispatcher::new();
        dispatcher.dispatch(Notification::PasswordResetEmail {
            email: "a@example.com".to_string(),
            token: "tok-reset".to_string(),
        });
        dispatcher.dispatch(Notification::PasswordResetConfirmation {
            email: "a@example.com".to_string(),
        });
        assert_eq!(dispatcher.last_token().as_deref(), Some("tok-reset"));
    }
}
