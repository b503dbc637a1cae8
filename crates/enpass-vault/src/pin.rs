//! PIN-gated cache of the database key.
//!
//! Deriving the database key from the master password takes many PBKDF2 rounds and
//! requires the password. With the PIN cache enabled, the derived key is
//! wrapped under a key stretched from a short PIN and stored through a
//! [`SecretStore`]. Later runs unwrap it with the PIN instead.
//!
//! # Blob layout
//!
//! ```text
//! [16 bytes: PBKDF2 salt]
//! [12 bytes: AES-256-GCM nonce]
//! [remaining: AES-256-GCM ciphertext + 16-byte tag]
//! ```
//!
//! The wrapping key is PBKDF2-HMAC-SHA256 over `pin || pepper` and the AAD is
//! the cache identity, so a blob copied between vaults does not unwrap.

use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Result, VaultError};
use crate::keychain::SecretStore;

/// Shortest PIN accepted unless overridden.
pub const DEFAULT_MIN_PIN_LEN: usize = 8;

/// PBKDF2 rounds for the wrapping key unless overridden.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const BLOB_SALT_LEN: usize = 16;

const BLOB_HEADER_LEN: usize = BLOB_SALT_LEN + crypto::NONCE_LEN_BYTES;

/// A PIN-unlocked view of one vault's cached key.
pub struct PinCache<S: SecretStore> {
    store: S,
    identity: String,
    secret: Zeroizing<Vec<u8>>,
    iterations: u32,
    /// Set after a successful [`PinCache::read`], so the key just read is not
    /// written straight back.
    fresh: bool,
}

impl<S: SecretStore> std::fmt::Debug for PinCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinCache")
            .field("identity", &self.identity)
            .field("iterations", &self.iterations)
            .field("fresh", &self.fresh)
            .finish_non_exhaustive()
    }
}

impl<S: SecretStore> PinCache<S> {
    /// Prepare the cache for `identity` with the given PIN and pepper.
    ///
    /// # Errors
    ///
    /// - [`VaultError::PinTooShort`] when the PIN has fewer than
    ///   `min_pin_len` characters. An empty PIN is always too short.
    /// - [`VaultError::KeyDerivationFailed`] for a zero iteration count.
    pub fn initialize(
        store: S,
        identity: impl Into<String>,
        pin: &str,
        pepper: &str,
        iterations: u32,
        min_pin_len: usize,
    ) -> Result<Self> {
        let min = min_pin_len.max(1);
        if pin.chars().count() < min {
            return Err(VaultError::PinTooShort { min });
        }
        if iterations == 0 {
            return Err(VaultError::KeyDerivationFailed {
                reason: "PIN iteration count must be non-zero".into(),
            });
        }

        let mut secret = Zeroizing::new(Vec::with_capacity(pin.len() + pepper.len()));
        secret.extend_from_slice(pin.as_bytes());
        secret.extend_from_slice(pepper.as_bytes());

        let identity = identity.into();
        tracing::debug!(identity = %identity, iterations, "initialized PIN cache");
        Ok(Self {
            store,
            identity,
            secret,
            iterations,
            fresh: false,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Unwrap the cached database key.
    ///
    /// Returns `Ok(None)` when nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::CacheCorrupt`] if the blob is truncated or does
    /// not authenticate, which includes a wrong PIN or pepper.
    pub fn read(&mut self) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let Some(blob) = self.store.load()? else {
            tracing::debug!(identity = %self.identity, "no cached key");
            return Ok(None);
        };
        let blob = Zeroizing::new(blob);

        if blob.len() < BLOB_HEADER_LEN + crypto::TAG_LEN {
            return Err(VaultError::CacheCorrupt {
                reason: format!("cached blob is only {} bytes", blob.len()),
            });
        }
        let (salt, rest) = blob.split_at(BLOB_SALT_LEN);
        let (nonce, sealed) = rest.split_at(crypto::NONCE_LEN_BYTES);

        let wrapping_key = self.wrapping_key(salt)?;
        let key = crypto::open(
            wrapping_key.as_slice(),
            nonce,
            self.identity.as_bytes(),
            sealed,
        )
        .map_err(|_| VaultError::CacheCorrupt {
            reason: "wrong PIN or damaged cache".into(),
        })?;

        self.fresh = true;
        tracing::info!(identity = %self.identity, "unlocked cached database key");
        Ok(Some(key))
    }

    /// Wrap `database_key` and replace whatever the store holds.
    ///
    /// Returns `false` without writing when the same key was just read from
    /// this cache.
    pub fn write(&mut self, database_key: &[u8]) -> Result<bool> {
        if self.fresh {
            tracing::debug!(identity = %self.identity, "cached key is current, skipping write");
            return Ok(false);
        }

        let salt = crypto::random_bytes(BLOB_SALT_LEN)?;
        let nonce = crypto::random_bytes(crypto::NONCE_LEN_BYTES)?;
        let wrapping_key = self.wrapping_key(&salt)?;
        let sealed = crypto::seal(
            wrapping_key.as_slice(),
            &nonce,
            self.identity.as_bytes(),
            database_key,
        )?;

        let mut blob = Vec::with_capacity(BLOB_HEADER_LEN + sealed.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        self.store.store(&blob)?;

        self.fresh = true;
        tracing::info!(identity = %self.identity, "cached database key");
        Ok(true)
    }

    /// Remove the cached blob.
    pub fn clear(&mut self) -> Result<()> {
        self.store.delete()?;
        self.fresh = false;
        tracing::info!(identity = %self.identity, "cleared cached database key");
        Ok(())
    }

    fn wrapping_key(&self, salt: &[u8]) -> Result<Zeroizing<[u8; crypto::KEY_LEN]>> {
        let mut key = Zeroizing::new([0u8; crypto::KEY_LEN]);
        crypto::pbkdf2_sha256(&self.secret, salt, self.iterations, key.as_mut_slice())?;
        Ok(key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
