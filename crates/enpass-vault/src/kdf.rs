//! Master password to database key derivation.
//!
//! Enpass 6 unlocks its SQLCipher store with a raw key rather than a
//! passphrase. The key is PBKDF2-HMAC-SHA512 over the master secret (the
//! password, followed by the decoded keyfile bytes when the vault uses a
//! keyfile), salted with the database header salt and run for the
//! `kdf_iter` rounds recorded in `vault.json`. SQLCipher consumes the first
//! 32 bytes of the 64-byte output.

use std::path::Path;

use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::info::VaultInfo;
use crate::keyfile;

/// Length of the PBKDF2 output.
pub const DERIVED_KEY_LEN: usize = 64;

/// Length of the raw SQLCipher key taken from the PBKDF2 output.
pub const DATABASE_KEY_LEN: usize = 32;

/// Reject keyfile/vault combinations that would silently derive a wrong key.
pub fn check_keyfile_policy(info: &VaultInfo, keyfile: Option<&Path>) -> Result<()> {
    match (info.requires_keyfile, keyfile.is_some()) {
        (true, false) => Err(VaultError::KeyfileRequired),
        (false, true) => Err(VaultError::KeyfileNotNeeded),
        _ => Ok(()),
    }
}

/// Password bytes followed by the keyfile bytes, if any.
pub fn master_secret(password: &str, keyfile_key: Option<&[u8]>) -> Zeroizing<Vec<u8>> {
    let extra = keyfile_key.map_or(0, <[u8]>::len);
    let mut secret = Zeroizing::new(Vec::with_capacity(password.len() + extra));
    secret.extend_from_slice(password.as_bytes());
    if let Some(key) = keyfile_key {
        secret.extend_from_slice(key);
    }
    secret
}

/// Stretch a master secret into the raw database key.
pub fn derive_from_secret(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut derived = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    crypto::pbkdf2_sha512(secret, salt, iterations, derived.as_mut_slice())?;
    Ok(Zeroizing::new(derived[..DATABASE_KEY_LEN].to_vec()))
}

/// Derive the database key for `info` from a password and optional keyfile.
///
/// # Errors
///
/// - [`VaultError::CredentialsIncomplete`] for an empty password.
/// - [`VaultError::KeyfileRequired`] / [`VaultError::KeyfileNotNeeded`] when
///   the keyfile argument contradicts `vault.json`.
/// - [`VaultError::KeyfileUnreadable`] / [`VaultError::KeyfileMalformed`]
///   from loading the keyfile.
pub fn derive_database_key(
    password: &str,
    keyfile_path: Option<&Path>,
    info: &VaultInfo,
) -> Result<Zeroizing<Vec<u8>>> {
    if password.is_empty() {
        return Err(VaultError::CredentialsIncomplete {
            reason: "empty vault password provided".into(),
        });
    }
    check_keyfile_policy(info, keyfile_path)?;

    let keyfile_key = keyfile_path.map(keyfile::load).transpose()?;
    let secret = master_secret(password, keyfile_key.as_deref().map(Vec::as_slice));

    tracing::debug!(
        iterations = info.kdf_iterations,
        with_keyfile = keyfile_key.is_some(),
        "deriving database key"
    );
    derive_from_secret(&secret, info.salt(), info.kdf_iterations)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
