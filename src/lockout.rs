//! Failed-login lockout state machine.
//!
//! The check runs before any password verification so a locked account
//! leaks nothing about credential correctness. Expiry is lazy: a lockout
//! whose deadline has passed simply stops applying, and the counter is
//! cleared the next time the store touches the row.

use chrono::{DateTime, Duration, Utc};

use crate::account::Account;
use crate::config::SecurityConfig;
use crate::error::{Error, Result};

/// Reject with [`Error::AccountLocked`] while an unexpired lockout applies.
pub fn ensure_unlocked(account: &Account, now: DateTime<Utc>) -> Result<()> {
    match account.locked_until {
        Some(until) if until > now => Err(Error::AccountLocked { until }),
        _ => Ok(()),
    }
}

/// Deadline for a lockout starting at `now`.
pub fn lockout_expiry(config: &SecurityConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(config.lockout_duration_seconds())
}

/// Whether `failures` consecutive failed attempts trip the lockout.
pub fn threshold_reached(config: &SecurityConfig, failures: u32) -> bool {
    failures >= config.lockout_threshold()
}

#[cfg(test)]
mod tests {
    use super::{ensure_unlocked, lockout_expiry, threshold_reached};
    use crate::account::{Account, Role};
    use crate::config::SecurityConfig;
    use crate::error::Error;
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    fn config() -> SecurityConfig {
        SecurityConfig::new("medigate.test", SecretString::from("secret".to_string()))
    }

    fn account() -> Account {
        Account::new(
            "bob".to_string(),
            "bob@example.com".to_string(),
            "$argon2id$fake".to_string(),
            Role::Company,
        )
    }

    #[test]
    fn unlocked_account_passes() {
        let account = account();
        assert!(ensure_unlocked(&account, Utc::now()).is_ok());
    }

    #[test]
    fn active_lockout_rejects_with_deadline() {
        let now = Utc::now();
        let until = now + Duration::minutes(30);
        let mut account = account();
        account.locked_until = Some(until);
        match ensure_unlocked(&account, now) {
            Err(Error::AccountLocked { until: reported }) => assert_eq!(reported, until),
            other => panic!("expected AccountLocked, got {other:?}"),
        }
    }

    #[test]
    fn elapsed_lockout_no_longer_applies() {
        let now = Utc::now();
        let mut account = account();
        account.locked_until = Some(now - Duration::seconds(1));
        assert!(ensure_unlocked(&account, now).is_ok());
    }

    #[test]
    fn expiry_uses_configured_duration() {
        let config = config();
        let now = Utc::now();
        assert_eq!(lockout_expiry(&config, now), now + Duration::minutes(30));
    }

    #[test]
    fn threshold_trips_at_five_by_default() {
        let config = config();
        assert!(!threshold_reached(&config, 4));
        assert!(threshold_reached(&config, 5));
        assert!(threshold_reached(&config, 6));
    }
}
