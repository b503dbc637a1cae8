//! Locating a vault and holding an unlocked session.
//!
//! [`Vault::locate`] validates the directory and loads `vault.json`.
//! [`Vault::open`] turns complete [`VaultCredentials`] into a [`Session`]
//! that owns the database handle until [`Session::close`] or drop.

use std::path::Path;

use zeroize::Zeroizing;

use crate::credentials::VaultCredentials;
use crate::entry::Entry;
use crate::error::{Result, VaultError};
use crate::info::{VaultInfo, VaultPaths};
use crate::keychain::sanitize_identity;
use crate::query::EntryFilter;
use crate::repository::{EntryRepository, QueryResult, SqlCipherRepository};

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// A validated vault directory and its metadata. Nothing is decrypted yet.
#[derive(Debug, Clone)]
pub struct Vault {
    paths: VaultPaths,
    info: VaultInfo,
}

impl Vault {
    /// Resolve `dir` and load its metadata.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultNotFound`] or [`VaultError::VaultInfoCorrupt`].
    pub fn locate(dir: impl AsRef<Path>) -> Result<Self> {
        let paths = VaultPaths::resolve(dir)?;
        let info = VaultInfo::load(&paths)?;
        Ok(Self { paths, info })
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn info(&self) -> &VaultInfo {
        &self.info
    }

    /// Name under which this vault's key is cached.
    pub fn identity(&self) -> String {
        sanitize_identity(&self.paths.identity())
    }

    /// Unlock the database with `credentials`.
    ///
    /// A cached database key is used as is. Otherwise the key is derived from
    /// the password (and keyfile).
    ///
    /// # Errors
    ///
    /// - [`VaultError::CredentialsIncomplete`] when neither a key nor a
    ///   password is present.
    /// - Keyfile policy and loading errors from derivation.
    /// - [`VaultError::InvalidCredentials`] when the key does not open the
    ///   database.
    pub fn open(&self, credentials: &VaultCredentials) -> Result<Session> {
        let database_key = credentials.resolve_key(&self.info)?;
        let repository = SqlCipherRepository::open(&self.paths.database, &database_key)?;

        tracing::info!(vault = %self.info.name, "vault session opened");
        Ok(Session::from_repository(repository, database_key))
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// An unlocked vault. Read-only.
pub struct Session<R: EntryRepository = SqlCipherRepository> {
    repository: Option<R>,
    database_key: Zeroizing<Vec<u8>>,
}

impl<R: EntryRepository> Session<R> {
    /// Wrap an opened repository and the key that unlocked it.
    pub fn from_repository(repository: R, database_key: Zeroizing<Vec<u8>>) -> Self {
        Self {
            repository: Some(repository),
            database_key,
        }
    }

    pub fn is_open(&self) -> bool {
        self.repository.is_some()
    }

    /// The raw key that unlocked this session.
    pub fn database_key(&self) -> &[u8] {
        &self.database_key
    }

    /// Run `filter` and decrypt every returned entry.
    ///
    /// Decryption is strict: one undecryptable entry fails the whole query.
    ///
    /// # Errors
    ///
    /// [`VaultError::SessionClosed`], database errors, and the decryption
    /// errors of [`Entry::decrypt`].
    pub fn query(&self, filter: &EntryFilter) -> Result<QueryResult> {
        let repository = self.repository.as_ref().ok_or(VaultError::SessionClosed)?;
        let mut result = repository.find_entries(filter)?;
        for entry in &mut result.entries {
            entry.decrypt()?;
        }
        Ok(result)
    }

    /// The single live entry matching `filter`.
    ///
    /// Trashed and deleted entries are skipped. With `unique`, more than one
    /// match is an error; otherwise the first match in query order wins.
    ///
    /// # Errors
    ///
    /// [`VaultError::EntryNotFound`], [`VaultError::AmbiguousEntry`], and any
    /// error of [`Session::query`].
    pub fn find_one(&self, filter: &EntryFilter, unique: bool) -> Result<Entry> {
        let mut live: Vec<Entry> = self
            .query(filter)?
            .entries
            .into_iter()
            .filter(|e| !e.is_trashed() && !e.is_deleted())
            .collect();

        match live.len() {
            0 => Err(VaultError::EntryNotFound),
            n if unique && n > 1 => Err(VaultError::AmbiguousEntry { count: n }),
            _ => Ok(live.swap_remove(0)),
        }
    }

    /// Release the database handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        match self.repository.take() {
            Some(repository) => {
                repository.close()?;
                tracing::info!("vault session closed");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<R: EntryRepository> Drop for Session<R> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close vault session");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
