//! Authentication and account-security core for the medigate platform.
//!
//! This crate owns credentials, password hashing and policy, login lockout,
//! password-reset and email-verification tokens, MFA enrollment material,
//! signed access/refresh tokens, and the audit trail. Transport layers sit
//! on top of [`AuthService`]; storage sits behind [`CredentialStore`].

pub mod account;
pub mod audit;
pub mod config;
pub mod error;
pub mod lockout;
pub mod mfa;
pub mod notify;
pub mod password;
pub mod policy;
pub mod service;
pub mod store;
pub mod token;
pub mod util;

pub use account::{Account, AccountStatus, Permission, Role};
pub use audit::{AuditAction, AuditEntry, AuditSink, RequestMetadata};
pub use config::SecurityConfig;
pub use error::{Error, Result};
pub use notify::{Notification, NotificationDispatcher};
pub use service::{AuthService, LoginInput, MfaEnrollment, RegisterInput, TokenPair};
pub use store::{CredentialStore, MemoryCredentialStore, PgCredentialStore};
