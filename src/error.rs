//! Error taxonomy for the account-security core.
//!
//! Every failure a component can produce is an explicit variant here; nothing
//! in the core panics or leaks a storage fault past its boundary. Callers that
//! front a login form are expected to collapse `NotFound`,
//! `InvalidCredentials`, `AccountNotVerified`, and `AccountDisabled` into one
//! uniform denial so the response never reveals which accounts exist; the
//! audit log keeps the precise kind for operators.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::policy::PolicyRule;

#[derive(Debug, Error)]
pub enum Error {
    #[error("account not found")]
    NotFound,

    #[error("account already exists: {field}")]
    AlreadyExists { field: &'static str },

    #[error("account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("account email is not verified")]
    AccountNotVerified,

    #[error("account is disabled")]
    AccountDisabled,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("invalid token")]
    InvalidToken,

    #[error("token has expired")]
    TokenExpired,

    #[error("password policy violation: {}", format_rules(.0))]
    PolicyViolation(Vec<PolicyRule>),

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

fn format_rules(rules: &[PolicyRule]) -> String {
    rules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;
    use crate::policy::PolicyRule;

    #[test]
    fn policy_violation_names_every_failed_rule() {
        let err = Error::PolicyViolation(vec![
            PolicyRule::MinLength { min: 12, actual: 7 },
            PolicyRule::Uppercase,
        ]);
        let message = err.to_string();
        assert!(message.contains("at least 12 characters"));
        assert!(message.contains("uppercase"));
    }

    #[test]
    fn locked_error_carries_expiry() {
        let until = chrono::Utc::now();
        let err = Error::AccountLocked { until };
        assert!(err.to_string().contains("locked until"));
    }
}
