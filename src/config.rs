//! Security configuration.
//!
//! Every tunable of the core is an explicit named field here, injected at
//! construction; components never read ambient/global state. Secrets (the
//! JWT signing key and the optional Argon2 pepper) are wrapped in
//! [`secrecy::SecretString`] so they stay out of debug output.

use secrecy::SecretString;

const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_REFRESH_TTL_MULTIPLIER: i64 = 7;
const DEFAULT_LOCKOUT_THRESHOLD: u32 = 5;
const DEFAULT_LOCKOUT_DURATION_SECONDS: i64 = 30 * 60;
const DEFAULT_PASSWORD_MIN_LENGTH: usize = 12;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_BACKUP_CODE_COUNT: usize = 10;

#[derive(Debug)]
pub struct SecurityConfig {
    issuer: String,
    signing_secret: SecretString,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
    lockout_threshold: u32,
    lockout_duration_seconds: i64,
    password_min_length: usize,
    reset_token_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    backup_code_count: usize,
    pepper: Option<SecretString>,
}

impl SecurityConfig {
    /// Build a configuration with production defaults.
    ///
    /// `issuer` lands in the `iss` claim of every token; `signing_secret` is
    /// the HMAC-SHA-512 key used to sign and verify them.
    #[must_use]
    pub fn new(issuer: impl Into<String>, signing_secret: SecretString) -> Self {
        Self {
            issuer: issuer.into(),
            signing_secret,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS
                * DEFAULT_REFRESH_TTL_MULTIPLIER,
            lockout_threshold: DEFAULT_LOCKOUT_THRESHOLD,
            lockout_duration_seconds: DEFAULT_LOCKOUT_DURATION_SECONDS,
            password_min_length: DEFAULT_PASSWORD_MIN_LENGTH,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            backup_code_count: DEFAULT_BACKUP_CODE_COUNT,
            pepper: None,
        }
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_lockout_threshold(mut self, threshold: u32) -> Self {
        self.lockout_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_seconds(mut self, seconds: i64) -> Self {
        self.lockout_duration_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_password_min_length(mut self, length: usize) -> Self {
        self.password_min_length = length;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_backup_code_count(mut self, count: usize) -> Self {
        self.backup_code_count = count;
        self
    }

    /// Server-side pepper mixed into password and backup-code hashes.
    #[must_use]
    pub fn with_pepper(mut self, pepper: SecretString) -> Self {
        self.pepper = Some(pepper);
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub(crate) fn signing_secret(&self) -> &SecretString {
        &self.signing_secret
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }

    #[must_use]
    pub fn lockout_threshold(&self) -> u32 {
        self.lockout_threshold
    }

    #[must_use]
    pub fn lockout_duration_seconds(&self) -> i64 {
        self.lockout_duration_seconds
    }

    #[must_use]
    pub fn password_min_length(&self) -> usize {
        self.password_min_length
    }

    #[must_use]
    pub fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    #[must_use]
    pub fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    #[must_use]
    pub fn backup_code_count(&self) -> usize {
        self.backup_code_count
    }

    pub(crate) fn pepper(&self) -> Option<&SecretString> {
        self.pepper.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::SecurityConfig;
    use secrecy::SecretString;

    fn config() -> SecurityConfig {
        SecurityConfig::new("medigate.test", SecretString::from("secret".to_string()))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config();
        assert_eq!(config.issuer(), "medigate.test");
        assert_eq!(config.access_token_ttl_seconds(), 24 * 60 * 60);
        assert_eq!(
            config.refresh_token_ttl_seconds(),
            7 * config.access_token_ttl_seconds()
        );
        assert_eq!(config.lockout_threshold(), 5);
        assert_eq!(config.lockout_duration_seconds(), 30 * 60);
        assert_eq!(config.password_min_length(), 12);
        assert_eq!(config.reset_token_ttl_seconds(), 24 * 60 * 60);
        assert_eq!(config.backup_code_count(), 10);
        assert!(config.pepper().is_none());
    }

    #[test]
    fn builders_override_defaults() {
        let config = config()
            .with_access_token_ttl_seconds(900)
            .with_lockout_threshold(3)
            .with_lockout_duration_seconds(60)
            .with_password_min_length(16)
            .with_backup_code_count(12)
            .with_pepper(SecretString::from("pepper".to_string()));
        assert_eq!(config.access_token_ttl_seconds(), 900);
        assert_eq!(config.lockout_threshold(), 3);
        assert_eq!(config.lockout_duration_seconds(), 60);
        assert_eq!(config.password_min_length(), 16);
        assert_eq!(config.backup_code_count(), 12);
        assert!(config.pepper().is_some());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = config().with_pepper(SecretString::from("pepper".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("pepper\""));
    }
}
