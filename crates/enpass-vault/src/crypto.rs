//! AES-256-GCM and PBKDF2 primitives built on `ring`.
//!
//! - **AEAD**: AES-256-GCM with caller-supplied 96-bit nonces and additional
//!   authenticated data. Ciphertexts are in the combined form
//!   `ciphertext || tag`, which is how Enpass stores field values and how the
//!   PIN cache stores the wrapped database key.
//! - **Key derivation**: PBKDF2-HMAC-SHA512 for the vault key and
//!   PBKDF2-HMAC-SHA256 for the PIN wrapping key.
//! - **Random generation**: salts and nonces for the PIN cache via
//!   `ring::rand::SystemRandom`.

use std::num::NonZeroU32;

use ring::aead::{
    self, Aad, BoundKey, NONCE_LEN, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey,
};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{Result, VaultError};

/// Length of an AES-256-GCM key in bytes.
pub const KEY_LEN: usize = 32;

/// Length of an AES-256-GCM nonce in bytes (96 bits).
pub const NONCE_LEN_BYTES: usize = NONCE_LEN;

/// Length of the GCM authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

static AEAD_ALG: &aead::Algorithm = &aead::AES_256_GCM;

// ---------------------------------------------------------------------------
// Nonce handling
// ---------------------------------------------------------------------------

/// A nonce sequence that yields exactly one nonce and then errors, so every
/// bound key is used for a single seal/open.
struct SingleNonce(Option<[u8; NONCE_LEN_BYTES]>);

impl SingleNonce {
    fn new(bytes: [u8; NONCE_LEN_BYTES]) -> Self {
        Self(Some(bytes))
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.0
            .take()
            .map(Nonce::assume_unique_for_key)
            .ok_or(ring::error::Unspecified)
    }
}

fn nonce_array(nonce: &[u8]) -> Option<[u8; NONCE_LEN_BYTES]> {
    nonce.try_into().ok()
}

// ---------------------------------------------------------------------------
// AEAD
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key`/`nonce`, binding `aad`.
///
/// Returns `ciphertext || tag`.
///
/// # Errors
///
/// Returns [`VaultError::EncryptionFailed`] for a wrong key or nonce length.
pub fn seal(key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::EncryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }
    let nonce = nonce_array(nonce).ok_or_else(|| VaultError::EncryptionFailed {
        reason: format!("nonce must be {} bytes, got {}", NONCE_LEN_BYTES, nonce.len()),
    })?;

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::EncryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = plaintext.to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::from(aad), &mut in_out)
        .map_err(|_| VaultError::EncryptionFailed {
            reason: "seal_in_place failed".into(),
        })?;

    tracing::trace!(
        plaintext_len = plaintext.len(),
        ciphertext_len = in_out.len(),
        "sealed data"
    );
    Ok(in_out)
}

/// Decrypt and verify `ciphertext_and_tag` under `key`/`nonce` with `aad`.
///
/// Nothing is returned unless the tag verifies.
///
/// # Errors
///
/// Returns [`VaultError::DecryptionFailed`] on a wrong key/nonce length, a
/// truncated input, or an authentication failure.
pub fn open(
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext_and_tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if key.len() != KEY_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: format!("key must be {} bytes, got {}", KEY_LEN, key.len()),
        });
    }
    let nonce = nonce_array(nonce).ok_or_else(|| VaultError::DecryptionFailed {
        reason: format!("nonce must be {} bytes, got {}", NONCE_LEN_BYTES, nonce.len()),
    })?;
    if ciphertext_and_tag.len() < TAG_LEN {
        return Err(VaultError::DecryptionFailed {
            reason: "ciphertext is shorter than the authentication tag".into(),
        });
    }

    let unbound_key = UnboundKey::new(AEAD_ALG, key).map_err(|_| VaultError::DecryptionFailed {
        reason: "failed to create AES-256-GCM key".into(),
    })?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce::new(nonce));

    let mut in_out = Zeroizing::new(ciphertext_and_tag.to_vec());
    let plaintext_len = opening_key
        .open_in_place(Aad::from(aad), in_out.as_mut_slice())
        .map_err(|_| VaultError::DecryptionFailed {
            reason: "authentication failed".into(),
        })?
        .len();
    in_out.truncate(plaintext_len);

    tracing::trace!(
        ciphertext_len = ciphertext_and_tag.len(),
        plaintext_len,
        "opened data"
    );
    Ok(in_out)
}

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

fn iterations(count: u32) -> Result<NonZeroU32> {
    NonZeroU32::new(count).ok_or_else(|| VaultError::KeyDerivationFailed {
        reason: "PBKDF2 iteration count must be non-zero".into(),
    })
}

/// PBKDF2-HMAC-SHA512 over `secret`, filling `out` completely.
pub fn pbkdf2_sha512(secret: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) -> Result<()> {
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA512, iterations(rounds)?, salt, secret, out);
    Ok(())
}

/// PBKDF2-HMAC-SHA256 over `secret`, filling `out` completely.
pub fn pbkdf2_sha256(secret: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) -> Result<()> {
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iterations(rounds)?, salt, secret, out);
    Ok(())
}

// ---------------------------------------------------------------------------
// Random bytes
// ---------------------------------------------------------------------------

/// Generate `len` cryptographically secure random bytes.
///
/// # Errors
///
/// Returns [`VaultError::Internal`] if the system CSPRNG fails.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)
        .map_err(|_| VaultError::Internal("failed to generate random bytes".into()))?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = &[0xa2, 0xec, 0x30, 0xc0];

    fn fixture() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let key = random_bytes(KEY_LEN).unwrap();
        let nonce = random_bytes(NONCE_LEN_BYTES).unwrap();
        let sealed = seal(&key, &nonce, AAD, b"S3cr3t!").unwrap();
        (key, nonce, sealed)
    }

    fn flip_first_bit(bytes: &[u8]) -> Vec<u8> {
        let mut copy = bytes.to_vec();
        copy[0] ^= 0x01;
        copy
    }

    #[test]
    fn seal_open_roundtrip() {
        let (key, nonce, sealed) = fixture();
        assert_eq!(sealed.len(), b"S3cr3t!".len() + TAG_LEN);

        let plaintext = open(&key, &nonce, AAD, &sealed).unwrap();
        assert_eq!(plaintext.as_slice(), b"S3cr3t!");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = random_bytes(KEY_LEN).unwrap();
        let nonce = random_bytes(NONCE_LEN_BYTES).unwrap();
        let sealed = seal(&key, &nonce, &[], b"").unwrap();
        assert!(open(&key, &nonce, &[], &sealed).unwrap().is_empty());
    }

    #[test]
    fn flipped_ciphertext_bit_fails() {
        let (key, nonce, sealed) = fixture();
        assert!(open(&key, &nonce, AAD, &flip_first_bit(&sealed)).is_err());
    }

    #[test]
    fn flipped_tag_bit_fails() {
        let (key, nonce, mut sealed) = fixture();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x80;
        assert!(open(&key, &nonce, AAD, &sealed).is_err());
    }

    #[test]
    fn flipped_key_bit_fails() {
        let (key, nonce, sealed) = fixture();
        assert!(open(&flip_first_bit(&key), &nonce, AAD, &sealed).is_err());
    }

    #[test]
    fn flipped_nonce_bit_fails() {
        let (key, nonce, sealed) = fixture();
        assert!(open(&key, &flip_first_bit(&nonce), AAD, &sealed).is_err());
    }

    #[test]
    fn flipped_aad_bit_fails() {
        let (key, nonce, sealed) = fixture();
        assert!(open(&key, &nonce, &flip_first_bit(AAD), &sealed).is_err());
    }

    #[test]
    fn truncated_input_rejected() {
        let (key, nonce, _) = fixture();
        let result = open(&key, &nonce, AAD, &[0u8; TAG_LEN - 1]);
        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn invalid_key_length_rejected() {
        let nonce = random_bytes(NONCE_LEN_BYTES).unwrap();
        let result = seal(&[0u8; 16], &nonce, &[], b"test");
        assert!(matches!(result, Err(VaultError::EncryptionFailed { .. })));
    }

    #[test]
    fn invalid_nonce_length_rejected() {
        let key = random_bytes(KEY_LEN).unwrap();
        let result = open(&key, &[0u8; 8], &[], &[0u8; 32]);
        assert!(matches!(result, Err(VaultError::DecryptionFailed { .. })));
    }

    #[test]
    fn pbkdf2_is_deterministic() {
        let mut a = [0u8; 64];
        let mut b = [0u8; 64];
        pbkdf2_sha512(b"password", b"0123456789abcdef", 1_000, &mut a).unwrap();
        pbkdf2_sha512(b"password", b"0123456789abcdef", 1_000, &mut b).unwrap();
        assert_eq!(a, b);

        let mut c = [0u8; 64];
        pbkdf2_sha512(b"password", b"0123456789abcdeg", 1_000, &mut c).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn pbkdf2_sha256_known_vector() {
        // RFC 7914 section 11, first PBKDF2-HMAC-SHA256 vector.
        let mut out = [0u8; 64];
        pbkdf2_sha256(b"passwd", b"salt", 1, &mut out).unwrap();
        assert_eq!(
            hex::encode(&out[..16]),
            "55ac046e56e3089fec1691c22544b605"
        );
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut out = [0u8; 32];
        let result = pbkdf2_sha256(b"pin", b"salt", 0, &mut out);
        assert!(matches!(result, Err(VaultError::KeyDerivationFailed { .. })));
    }
}
