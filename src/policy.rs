//! Password complexity policy.
//!
//! Rejections name every rule that failed rather than returning a generic
//! error, so callers can tell users exactly what to fix.

use std::fmt;

use crate::error::{Error, Result};

/// A single password rule that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyRule {
    MinLength { min: usize, actual: usize },
    Uppercase,
    Lowercase,
    Digit,
    Symbol,
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinLength { min, actual } => {
                write!(f, "must be at least {min} characters (got {actual})")
            }
            Self::Uppercase => write!(f, "must contain an uppercase letter"),
            Self::Lowercase => write!(f, "must contain a lowercase letter"),
            Self::Digit => write!(f, "must contain a digit"),
            Self::Symbol => write!(f, "must contain a symbol"),
        }
    }
}

/// Validate a candidate password against the complexity rules.
///
/// Collects every violated rule instead of stopping at the first, and
/// returns them inside [`Error::PolicyViolation`].
pub fn validate(password: &str, min_length: usize) -> Result<()> {
    let mut violations = Vec::new();

    let length = password.chars().count();
    if length < min_length {
        violations.push(PolicyRule::MinLength {
            min: min_length,
            actual: length,
        });
    }
    if !password.chars().any(char::is_uppercase) {
        violations.push(PolicyRule::Uppercase);
    }
    if !password.chars().any(char::is_lowercase) {
        violations.push(PolicyRule::Lowercase);
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        violations.push(PolicyRule::Digit);
    }
    if !password.chars().any(|ch| !ch.is_alphanumeric()) {
        violations.push(PolicyRule::Symbol);
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::PolicyViolation(violations))
    }
}
