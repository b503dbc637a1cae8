//! Platform storage for the PIN-wrapped database key.
//!
//! The [`SecretStore`] trait abstracts over where the wrapped blob lives.
//! The blob is already encrypted by [`crate::pin`]; a store only has to keep
//! it whole and private.
//!
//! - **macOS**: Keychain Services via `security-framework`
//! - **Everywhere else**: [`FileSecretStore`], a 0600 file under the user
//!   cache directory
//!
//! Writes replace the whole blob. Two processes writing at once is not
//! coordinated: the last completed write wins.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, VaultError};

/// Directory (under the user cache dir) and keychain service name.
pub const APP_NAME: &str = "enpass-cli";

/// Extension of cache files written by [`FileSecretStore`].
const CACHE_EXTENSION: &str = "pin";

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Opaque blob storage for one vault identity.
pub trait SecretStore {
    /// Return the stored blob, or `None` if nothing has been stored.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Store (or overwrite) the blob.
    fn store(&self, blob: &[u8]) -> Result<()>;

    /// Check whether a blob has been stored.
    fn exists(&self) -> Result<bool>;

    /// Delete the stored blob. Deleting a missing blob is not an error.
    fn delete(&self) -> Result<()>;
}

impl<S: SecretStore + ?Sized> SecretStore for Box<S> {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        (**self).load()
    }

    fn store(&self, blob: &[u8]) -> Result<()> {
        (**self).store(blob)
    }

    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }

    fn delete(&self) -> Result<()> {
        (**self).delete()
    }
}

/// Reduce a vault identity to characters safe in file and account names.
pub fn sanitize_identity(identity: &str) -> String {
    let cleaned: String = identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "vault".to_string()
    } else {
        cleaned.to_string()
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// Blob stored in a single file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    /// Store the blob at `path`. Parent directories are created on write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<identity>.pin`.
    pub fn in_dir(dir: &Path, identity: &str) -> Self {
        let file = format!("{}.{CACHE_EXTENSION}", sanitize_identity(identity));
        Self::new(dir.join(file))
    }

    /// `<user cache dir>/enpass-cli/<identity>.pin`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::KeychainUnavailable`] when the platform has no
    /// cache directory for the current user.
    pub fn for_identity(identity: &str) -> Result<Self> {
        let base = directories::BaseDirs::new().ok_or_else(|| VaultError::KeychainUnavailable {
            reason: "no cache directory for the current user".into(),
        })?;
        Ok(Self::in_dir(&base.cache_dir().join(APP_NAME), identity))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretStore for FileSecretStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(blob) => {
                tracing::debug!(path = %self.path.display(), "read cached key blob");
                Ok(Some(blob))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, blob: &[u8]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;

        // NamedTempFile is created 0600 on Unix; the rename keeps the mode.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(blob)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| VaultError::Io(e.error))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(path = %self.path.display(), "stored key blob in file cache");
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.is_file())
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "deleted key blob from file cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// macOS Keychain Services
// ---------------------------------------------------------------------------

/// `errSecItemNotFound`.
#[cfg(target_os = "macos")]
const MACOS_ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

/// Generic password item in the login keychain, one per vault identity.
#[cfg(target_os = "macos")]
#[derive(Debug, Clone)]
pub struct MacOSKeychain {
    service: String,
    account: String,
}

#[cfg(target_os = "macos")]
impl MacOSKeychain {
    pub fn for_identity(identity: &str) -> Self {
        Self::with_names(APP_NAME, &sanitize_identity(identity))
    }

    pub fn with_names(service: &str, account: &str) -> Self {
        Self {
            service: service.to_string(),
            account: account.to_string(),
        }
    }
}

#[cfg(target_os = "macos")]
impl SecretStore for MacOSKeychain {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        use security_framework::passwords::get_generic_password;

        match get_generic_password(&self.service, &self.account) {
            Ok(blob) => {
                tracing::debug!(account = %self.account, "read cached key blob from keychain");
                Ok(Some(blob))
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(None),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain read failed: {e}"),
            }),
        }
    }

    fn store(&self, blob: &[u8]) -> Result<()> {
        use security_framework::passwords::set_generic_password;

        set_generic_password(&self.service, &self.account, blob).map_err(|e| {
            VaultError::KeychainUnavailable {
                reason: format!("macOS keychain write failed: {e}"),
            }
        })?;
        tracing::info!(account = %self.account, "stored key blob in keychain");
        Ok(())
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.load()?.is_some())
    }

    fn delete(&self) -> Result<()> {
        use security_framework::passwords::delete_generic_password;

        match delete_generic_password(&self.service, &self.account) {
            Ok(()) => {
                tracing::info!(account = %self.account, "deleted key blob from keychain");
                Ok(())
            }
            Err(e) if e.code() == MACOS_ERR_SEC_ITEM_NOT_FOUND => Ok(()),
            Err(e) => Err(VaultError::KeychainUnavailable {
                reason: format!("macOS keychain delete failed: {e}"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// The preferred store for `identity` on this platform.
pub fn platform_store(identity: &str) -> Result<Box<dyn SecretStore>> {
    #[cfg(target_os = "macos")]
    {
        tracing::debug!("using macOS Keychain Services for the PIN cache");
        Ok(Box::new(MacOSKeychain::for_identity(identity)))
    }
    #[cfg(not(target_os = "macos"))]
    {
        let store = FileSecretStore::for_identity(identity)?;
        tracing::debug!(path = %store.path().display(), "using file cache for the PIN cache");
        Ok(Box::new(store))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
