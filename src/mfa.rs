//! Multi-factor enrollment material: shared secrets and backup codes.
//!
//! Backup codes are single-use bypass credentials handed to the member at
//! enrollment time. Only Argon2id digests of the codes are ever persisted;
//! the plaintext batch exists once, at generation, and is shown to the
//! member exactly once.

use rand::{rngs::OsRng, RngCore};
use secrecy::SecretString;

use crate::error::{Error, Result};
use crate::password;

/// Unambiguous alphabet, 32 symbols. Excludes 0/O/1/I so codes survive
/// being read over the phone or copied by hand.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Symbols per backup code. 16 symbols over a 32-symbol alphabet gives
/// 80 bits of entropy per code.
const CODE_LEN: usize = 16;

/// Display grouping: XXXX-XXXX-XXXX-XXXX.
const GROUP: usize = 4;

/// Symbols in a shared secret: 32 symbols, 160 bits.
const SECRET_LEN: usize = 32;

fn random_symbols(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| Error::Hash(format!("rng: {err}")))?;
    Ok(bytes
        .iter()
        .map(|b| ALPHABET[(b % 32) as usize] as char)
        .collect())
}

/// Generate a fresh shared secret for authenticator enrollment.
pub fn generate_secret() -> Result<String> {
    random_symbols(SECRET_LEN)
}

/// A freshly generated batch of backup codes.
///
/// `plaintext` is returned to the member once; `hashes` is what the
/// credential store persists.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub plaintext: Vec<String>,
    pub hashes: Vec<String>,
}

impl BackupCodeBatch {
    /// Generate `count` codes and their Argon2id digests.
    pub fn generate(count: usize, pepper: Option<&SecretString>) -> Result<Self> {
        let mut plaintext = Vec::with_capacity(count);
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            let code = random_symbols(CODE_LEN)?;
            hashes.push(password::hash(&code, pepper)?);
            plaintext.push(format_code(&code));
        }
        Ok(Self { plaintext, hashes })
    }
}

/// Insert separators for display: `ABCDEFGHJKLMNPQR` -> `ABCD-EFGH-JKLM-NPQR`.
fn format_code(code: &str) -> String {
    code.as_bytes()
        .chunks(GROUP)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("-")
}

/// Canonicalize member input: strip separators and whitespace, uppercase.
pub fn normalize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check a submitted code against a stored digest. Returns the matching
/// digest so the caller can remove it from the remaining set.
pub fn find_matching_hash<'h>(
    submitted: &str,
    hashes: &'h [String],
    pepper: Option<&SecretString>,
) -> Result<Option<&'h String>> {
    let normalized = normalize_code(submitted);
    if normalized.len() != CODE_LEN {
        return Ok(None);
    }
    for digest in hashes {
        if password::verify(&normalized, digest, pepper)? {
            return Ok(Some(digest));
        }
    }
    Ok(None)
}
