//! Signed access/refresh token issuance and validation.
//!
//! Tokens are HS512 JWTs signed with the server-side secret from
//! [`SecurityConfig`]. Issuance and verification are pure with respect to
//! shared state, so they are safe under arbitrary concurrency. Validation
//! fails closed: any defect in format, signature, issuer, type, or expiry
//! collapses to [`Error::InvalidToken`] at the public boundary.

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use uuid::Uuid;

use crate::account::Account;
use crate::config::SecurityConfig;
use crate::error::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

impl TokenHeader {
    fn hs512() -> Self {
        Self {
            alg: "HS512".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject: account ID (UUID string).
    pub sub: String,
    pub username: String,
    /// Flattened permission names from the account role.
    pub authorities: Vec<String>,
    pub role: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Always [`TOKEN_TYPE_ACCESS`]; prevents refresh-token misuse.
    pub typ: String,
}

/// Narrower claim set for refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Always [`TOKEN_TYPE_REFRESH`].
    pub typ: String,
}

/// Validation failures, kept internal so the public surface stays fail-closed.
#[derive(Debug, PartialEq, Eq)]
enum Defect {
    Malformed,
    Expired,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value).map_err(|_| Error::InvalidToken)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(segment: &str) -> std::result::Result<T, Defect> {
    let bytes = Base64UrlUnpadded::decode_vec(segment).map_err(|_| Defect::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| Defect::Malformed)
}

fn sign(signing_input: &str, config: &SecurityConfig) -> Result<String> {
    let mut mac = HmacSha512::new_from_slice(config.signing_secret().expose_secret().as_bytes())
        .map_err(|err| Error::Hash(format!("hmac key: {err}")))?;
    mac.update(signing_input.as_bytes());
    Ok(Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes()))
}

fn encode<T: Serialize>(claims: &T, config: &SecurityConfig) -> Result<String> {
    let header_b64 = b64e_json(&TokenHeader::hs512())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature_b64 = sign(&signing_input, config)?;
    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Issue a signed access token for an authenticated account.
pub fn issue_access_token(
    account: &Account,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> Result<String> {
    let claims = AccessClaims {
        sub: account.id.to_string(),
        username: account.username.clone(),
        authorities: account.role.authorities(),
        role: account.role.as_str().to_string(),
        iss: config.issuer().to_string(),
        iat: now_unix_seconds,
        exp: now_unix_seconds + config.access_token_ttl_seconds(),
        jti: Uuid::new_v4().to_string(),
        typ: TOKEN_TYPE_ACCESS.to_string(),
    };
    encode(&claims, config)
}

/// Issue a signed refresh token bound to the account's subject ID.
pub fn issue_refresh_token(
    account: &Account,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> Result<String> {
    let claims = RefreshClaims {
        sub: account.id.to_string(),
        iss: config.issuer().to_string(),
        iat: now_unix_seconds,
        exp: now_unix_seconds + config.refresh_token_ttl_seconds(),
        jti: Uuid::new_v4().to_string(),
        typ: TOKEN_TYPE_REFRESH.to_string(),
    };
    encode(&claims, config)
}

/// Split, verify the HS512 signature, and return the raw claims segment.
fn verify_signature<'t>(
    token: &'t str,
    config: &SecurityConfig,
) -> std::result::Result<&'t str, Defect> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(Defect::Malformed)?;
    let claims_b64 = parts.next().ok_or(Defect::Malformed)?;
    let sig_b64 = parts.next().ok_or(Defect::Malformed)?;
    if parts.next().is_some() {
        return Err(Defect::Malformed);
    }

    let header: TokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS512" {
        return Err(Defect::Malformed);
    }

    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| Defect::Malformed)?;
    let mut mac = HmacSha512::new_from_slice(config.signing_secret().expose_secret().as_bytes())
        .map_err(|_| Defect::Malformed)?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(claims_b64.as_bytes());
    // Constant-time comparison via the hmac crate.
    mac.verify_slice(&signature).map_err(|_| Defect::Malformed)?;

    Ok(claims_b64)
}

fn decode_access(
    token: &str,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> std::result::Result<AccessClaims, Defect> {
    let claims_b64 = verify_signature(token, config)?;
    let claims: AccessClaims = b64d_json(claims_b64)?;
    if claims.iss != config.issuer() || claims.typ != TOKEN_TYPE_ACCESS {
        return Err(Defect::Malformed);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Defect::Expired);
    }
    Ok(claims)
}

fn decode_refresh(
    token: &str,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> std::result::Result<RefreshClaims, Defect> {
    let claims_b64 = verify_signature(token, config)?;
    let claims: RefreshClaims = b64d_json(claims_b64)?;
    if claims.iss != config.issuer() || claims.typ != TOKEN_TYPE_REFRESH {
        return Err(Defect::Malformed);
    }
    if claims.exp <= now_unix_seconds {
        return Err(Defect::Expired);
    }
    Ok(claims)
}

/// Validate an access token and return its claims.
///
/// Every failure, from malformed input and bad signatures to wrong issuer,
/// wrong token type, or expiry, is reported as [`Error::InvalidToken`]; the caller is
/// never told which check failed.
pub fn validate_access_token(
    token: &str,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> Result<AccessClaims> {
    decode_access(token, config, now_unix_seconds).map_err(|_| Error::InvalidToken)
}

/// Validate a refresh token and return its claims.
///
/// Presenting an access token here fails just like any other defect.
pub fn validate_refresh_token(
    token: &str,
    config: &SecurityConfig,
    now_unix_seconds: i64,
) -> Result<RefreshClaims> {
    decode_refresh(token, config, now_unix_seconds).map_err(|_| Error::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::{
        issue_access_token, issue_refresh_token, validate_access_token, validate_refresh_token,
        TOKEN_TYPE_ACCESS,
    };
    use crate::account::{Account, Role};
    use crate::config::SecurityConfig;
    use crate::error::Error;
    use secrecy::SecretString;

    const NOW: i64 = 1_700_000_000;

    fn config() -> SecurityConfig {
        SecurityConfig::new(
            "medigate.test",
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        )
    }

    fn account() -> Account {
        Account::new(
            "alice".to_string(),
            "alice@example.com".to_string(),
            "$argon2id$fake".to_string(),
            Role::Provider,
        )
    }

    #[test]
    fn access_token_round_trip_preserves_subject_and_authorities() {
        let config = config();
        let account = account();
        let token = issue_access_token(&account, &config, NOW).unwrap();
        let claims = validate_access_token(&token, &config, NOW + 10).unwrap();
        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.authorities, account.role.authorities());
        assert_eq!(claims.role, "provider");
        assert_eq!(claims.typ, TOKEN_TYPE_ACCESS);
        assert_eq!(claims.exp, NOW + config.access_token_ttl_seconds());
    }

    #[test]
    fn expired_access_token_is_invalid() {
        let config = config();
        let token = issue_access_token(&account(), &config, NOW).unwrap();
        let result = validate_access_token(
            &token,
            &config,
            NOW + config.access_token_ttl_seconds() + 1,
        );
        assert!(matches!(result, Err(Error::InvalidToken)));
    }

    #[test]
    fn flipping_any_single_character_invalidates_the_token() {
        let config = config();
        let token = issue_access_token(&account(), &config, NOW).unwrap();

        for idx in 0..token.len() {
            let mut mutated: Vec<u8> = token.bytes().collect();
            mutated[idx] = if mutated[idx] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(mutated).unwrap();
            if mutated == token {
                continue;
            }
            let result = validate_access_token(&mutated, &config, NOW);
            assert!(
                matches!(result, Err(Error::InvalidToken)),
                "mutation at byte {idx} was accepted"
            );
        }
    }

    #[test]
    fn wrong_secret_rejects_token() {
        let config = config();
        let token = issue_access_token(&account(), &config, NOW).unwrap();
        let other = SecurityConfig::new(
            "medigate.test",
            SecretString::from("another-secret-another-secret-00".to_string()),
        );
        assert!(matches!(
            validate_access_token(&token, &other, NOW),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn wrong_issuer_rejects_token() {
        let config = config();
        let token = issue_access_token(&account(), &config, NOW).unwrap();
        let other = SecurityConfig::new(
            "someone-else",
            SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
        );
        assert!(matches!(
            validate_access_token(&token, &other, NOW),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn access_token_is_not_a_refresh_token() {
        let config = config();
        let account = account();
        let access = issue_access_token(&account, &config, NOW).unwrap();
        assert!(matches!(
            validate_refresh_token(&access, &config, NOW),
            Err(Error::InvalidToken)
        ));

        let refresh = issue_refresh_token(&account, &config, NOW).unwrap();
        assert!(matches!(
            validate_access_token(&refresh, &config, NOW),
            Err(Error::InvalidToken)
        ));
    }

    #[test]
    fn refresh_token_outlives_access_token() {
        let config = config();
        let account = account();
        let refresh = issue_refresh_token(&account, &config, NOW).unwrap();
        let past_access_expiry = NOW + config.access_token_ttl_seconds() + 1;
        let claims = validate_refresh_token(&refresh, &config, past_access_expiry).unwrap();
        assert_eq!(claims.sub, account.id.to_string());
        assert_eq!(claims.exp, NOW + config.refresh_token_ttl_seconds());
    }

    #[test]
    fn jti_is_unique_per_issuance() {
        let config = config();
        let account = account();
        let first = issue_access_token(&account, &config, NOW).unwrap();
        let second = issue_access_token(&account, &config, NOW).unwrap();
        assert_ne!(first, second);
    }
}
