//! Password hashing and verification using Argon2id.
//!
//! Parameters follow the OWASP recommendation (memory 19 MiB, iterations 2,
//! parallelism 1), tuned so a single verification costs on the order of
//! 100 ms on commodity hardware. Salt is random per hash; an optional
//! server-side pepper is mixed in as the Argon2 secret.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Error, Result};

fn hasher(pepper: Option<&SecretString>) -> Result<Argon2<'_>> {
    // OWASP ASVS recommended: m=19456 (19 MiB), t=2, p=1
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|err| Error::Hash(format!("argon2 params: {err}")))?;
    match pepper {
        Some(pepper) => Argon2::new_with_secret(
            pepper.expose_secret().as_bytes(),
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        )
        .map_err(|err| Error::Hash(format!("argon2 init: {err}"))),
        None => Ok(Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        )),
    }
}

/// Hash a plaintext password into a PHC-format Argon2id digest.
///
/// The salt is freshly generated, so hashing the same plaintext twice
/// yields different digests.
pub fn hash(password: &str, pepper: Option<&SecretString>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let digest = hasher(pepper)?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| Error::Hash(format!("password hash: {err}")))?
        .to_string();
    Ok(digest)
}

/// Verify a plaintext password against a stored PHC-format digest.
///
/// Returns `Ok(true)` on match, `Ok(false)` on mismatch; the comparison is
/// the constant-time check of the `password_hash` framework. A malformed
/// stored digest is an error, not a mismatch.
pub fn verify(password: &str, digest: &str, pepper: Option<&SecretString>) -> Result<bool> {
    let parsed =
        PasswordHash::new(digest).map_err(|err| Error::Hash(format!("invalid digest: {err}")))?;
    match hasher(pepper)?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(Error::Hash(format!("password verify: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::{hash, verify};
    use secrecy::SecretString;

    #[test]
    fn correct_password_matches() {
        let digest = hash("hunter2hunter2", None).unwrap();
        assert!(verify("hunter2hunter2", &digest, None).unwrap());
    }

    #[test]
    fn wrong_password_does_not_match() {
        let digest = hash("hunter2hunter2", None).unwrap();
        assert!(!verify("wrong-password", &digest, None).unwrap());
    }

    #[test]
    fn same_plaintext_yields_different_digests() {
        let first = hash("hunter2hunter2", None).unwrap();
        let second = hash("hunter2hunter2", None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn pepper_is_required_to_verify() {
        let pepper = SecretString::from("pepper".to_string());
        let digest = hash("hunter2hunter2", Some(&pepper)).unwrap();
        assert!(verify("hunter2hunter2", &digest, Some(&pepper)).unwrap());
        assert!(!verify("hunter2hunter2", &digest, None).unwrap());
    }

    #[test]
    fn malformed_digest_is_an_error() {
        assert!(verify("pw", "not-a-digest", None).is_err());
    }
}
