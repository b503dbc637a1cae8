//! Vault location and `vault.json` metadata.
//!
//! An Enpass vault is a directory holding the SQLCipher database
//! (`vault.enpassdb`) and a small JSON document (`vault.json`) with the
//! key-derivation parameters. The PBKDF2 salt is not in the JSON: it is the
//! 16-byte SQLCipher salt at the start of the database file.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, VaultError};

/// File name of the encrypted database inside a vault directory.
pub const DATABASE_FILE: &str = "vault.enpassdb";

/// File name of the vault metadata inside a vault directory.
pub const INFO_FILE: &str = "vault.json";

/// Length of the SQLCipher file salt used as the PBKDF2 salt.
pub const SALT_LEN: usize = 16;

/// The only key-derivation algorithm this reader understands.
const SUPPORTED_KDF: &str = "pbkdf2";

/// Location of Enpass' default vault relative to the home directory.
const DEFAULT_VAULT_SUBPATH: &str = "Documents/Enpass/Vaults/primary";

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Resolved paths of one vault directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub dir: PathBuf,
    pub database: PathBuf,
    pub info: PathBuf,
}

impl VaultPaths {
    /// Resolve symlinks in `dir` and check that both vault files exist.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] naming the first missing path.
    pub fn resolve(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let dir = dir.canonicalize().map_err(|_| VaultError::VaultNotFound {
            path: dir.to_path_buf(),
        })?;
        if !dir.is_dir() {
            return Err(VaultError::VaultNotFound { path: dir });
        }

        let paths = Self {
            database: dir.join(DATABASE_FILE),
            info: dir.join(INFO_FILE),
            dir,
        };
        for file in [&paths.database, &paths.info] {
            if !file.is_file() {
                return Err(VaultError::VaultNotFound { path: file.clone() });
            }
        }

        tracing::debug!(
            db_path = %paths.database.display(),
            info_path = %paths.info.display(),
            "resolved vault paths"
        );
        Ok(paths)
    }

    /// Name identifying this vault in the credential cache: the vault
    /// directory's final component.
    pub fn identity(&self) -> String {
        self.dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "vault".to_string())
    }
}

/// The default Enpass vault directory, `~/Documents/Enpass/Vaults/primary`.
///
/// Returns `None` when the home directory cannot be determined.
pub fn default_vault_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(DEFAULT_VAULT_SUBPATH))
}

// ---------------------------------------------------------------------------
// VaultInfo
// ---------------------------------------------------------------------------

/// On-disk shape of `vault.json`. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct RawVaultInfo {
    #[serde(default)]
    have_keyfile: i64,
    #[serde(default = "default_kdf_algo")]
    kdf_algo: String,
    kdf_iter: u32,
    #[serde(default)]
    vault_name: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    encryption_algo: Option<String>,
    #[serde(default)]
    vault_items_count: Option<i64>,
}

fn default_kdf_algo() -> String {
    SUPPORTED_KDF.to_string()
}

/// Key-derivation parameters and display metadata of one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultInfo {
    /// Display name of the vault.
    pub name: String,
    /// Format version reported by `vault.json`.
    pub version: i64,
    /// PBKDF2 iteration count.
    pub kdf_iterations: u32,
    /// Whether a keyfile is part of the master secret.
    pub requires_keyfile: bool,
    /// Informational cipher name (e.g. `aes-256-cbc` for the SQLCipher layer).
    pub encryption_algo: Option<String>,
    /// Item count as last recorded by Enpass.
    pub item_count: Option<i64>,
    salt: [u8; SALT_LEN],
}

impl VaultInfo {
    /// Load `vault.json` and the database salt from resolved vault paths.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] if a file vanished since
    /// resolution, or [`VaultError::VaultInfoCorrupt`] if either file cannot
    /// be parsed.
    pub fn load(paths: &VaultPaths) -> Result<Self> {
        let json =
            std::fs::read_to_string(&paths.info).map_err(|e| not_found_or(&paths.info, e))?;

        let mut header = [0u8; SALT_LEN];
        let mut db = File::open(&paths.database).map_err(|e| not_found_or(&paths.database, e))?;
        db.read_exact(&mut header).map_err(|e| {
            corrupt(format!(
                "could not read {SALT_LEN}-byte salt from database header: {e}"
            ))
        })?;

        let info = Self::from_parts(&json, header)?;
        tracing::debug!(
            vault_name = %info.name,
            version = info.version,
            kdf_iterations = info.kdf_iterations,
            requires_keyfile = info.requires_keyfile,
            "loaded vault info"
        );
        Ok(info)
    }

    /// Build a [`VaultInfo`] from the text of `vault.json` and the salt.
    pub fn from_parts(json: &str, salt: [u8; SALT_LEN]) -> Result<Self> {
        let raw: RawVaultInfo = serde_json::from_str(json)
            .map_err(|e| corrupt(format!("{INFO_FILE}: {e}")))?;

        if !raw.kdf_algo.eq_ignore_ascii_case(SUPPORTED_KDF) {
            return Err(corrupt(format!("unsupported kdf_algo {:?}", raw.kdf_algo)));
        }
        if raw.kdf_iter == 0 {
            return Err(corrupt("kdf_iter must be non-zero"));
        }

        Ok(Self {
            name: raw.vault_name,
            version: raw.version,
            kdf_iterations: raw.kdf_iter,
            requires_keyfile: raw.have_keyfile != 0,
            encryption_algo: raw.encryption_algo,
            item_count: raw.vault_items_count,
            salt,
        })
    }

    /// The PBKDF2 salt.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

fn corrupt(reason: impl Into<String>) -> VaultError {
    VaultError::VaultInfoCorrupt {
        reason: reason.into(),
    }
}

fn not_found_or(path: &Path, err: std::io::Error) -> VaultError {
    if err.kind() == std::io::ErrorKind::NotFound {
        VaultError::VaultNotFound {
            path: path.to_path_buf(),
        }
    } else {
        VaultError::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
